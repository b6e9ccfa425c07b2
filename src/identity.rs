//! Managed identity credentials.
//!
//! A [`ManagedIdentityCredential`] requests bearer tokens from the managed
//! identity endpoint of the host: the Azure Instance Metadata Service by
//! default (which AAD Pod Identity's NMI intercepts inside a cluster), or
//! the endpoint named by `IDENTITY_ENDPOINT` on App Service style hosts.
//!
//! Tokens are cached per scope and reused until shortly before they expire.
//!
//! See <https://learn.microsoft.com/en-us/azure/active-directory/managed-identities-azure-resources/how-to-use-vm-token>

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::config::IdentityConfig;

/// IMDS managed identity token endpoint.
pub const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// Managed identity API version.
const MSI_API_VERSION: &str = "2019-08-01";

/// OAuth scope for Azure Storage data plane access.
pub const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";

/// Tokens this close to expiry are refreshed before use.
const EXPIRY_MARGIN_SECS: i64 = 300;

/// Failures while obtaining a token.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The token endpoint is not a usable URL.
    #[error("invalid managed identity endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// The token endpoint could not be reached.
    #[error("managed identity endpoint unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    /// The identity provider answered with a non-success status.
    #[error("managed identity request rejected: HTTP {status} - {body}")]
    Rejected { status: u16, body: String },

    /// The identity provider answered with something that is not a token.
    #[error("invalid managed identity response: {0}")]
    InvalidResponse(String),
}

/// A bearer token and the instant it stops being valid.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    /// Whether the token expires within the refresh margin of `now`.
    pub fn is_expiring(&self, now: DateTime<Utc>) -> bool {
        self.expires_on - chrono::Duration::seconds(EXPIRY_MARGIN_SECS) <= now
    }
}

/// Token provider contract: `get_token(scope) -> (token, expiry)`.
pub trait TokenCredential: Send + Sync + 'static {
    fn get_token(
        &self,
        scope: &str,
    ) -> Pin<Box<dyn Future<Output = Result<AccessToken, CredentialError>> + Send + '_>>;
}

/// Wire format of the managed identity token response.
///
/// `expires_on` is Unix seconds, sent as a string by IMDS and as a number
/// by some App Service versions.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_on: NumberOrString,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(i64),
    String(String),
}

impl NumberOrString {
    fn as_secs(&self) -> Result<i64, CredentialError> {
        match self {
            NumberOrString::Number(n) => Ok(*n),
            NumberOrString::String(s) => s.trim().parse().map_err(|_| {
                CredentialError::InvalidResponse(format!("expires_on is not a timestamp: '{s}'"))
            }),
        }
    }
}

/// Credential backed by the host's managed identity endpoint.
pub struct ManagedIdentityCredential {
    client: reqwest::Client,
    endpoint: String,
    identity_header: Option<String>,
    client_id: Option<String>,
    cache: RwLock<HashMap<String, AccessToken>>,
    /// Held while a token request is in flight; the cache lock never is.
    refresh: Mutex<()>,
}

impl ManagedIdentityCredential {
    /// Build a credential for `client_id` (empty selects the default
    /// identity).  `endpoint` replaces IMDS; `identity_header` is sent as
    /// `X-IDENTITY-HEADER` when present.  No request is made here.
    pub fn new(
        client_id: &str,
        endpoint: Option<String>,
        identity_header: Option<String>,
    ) -> Result<Self, CredentialError> {
        let endpoint = endpoint.unwrap_or_else(|| IMDS_ENDPOINT.to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CredentialError::InvalidEndpoint {
                endpoint: endpoint.clone(),
                reason: format!("failed to create HTTP client: {e}"),
            })?;

        let client_id = Some(client_id.trim().to_string()).filter(|id| !id.is_empty());

        Ok(Self {
            client,
            endpoint,
            identity_header,
            client_id,
            cache: RwLock::new(HashMap::new()),
            refresh: Mutex::new(()),
        })
    }

    /// The endpoint tokens are requested from.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build the token request URL for `scope`.
    fn token_url(&self, scope: &str) -> Result<reqwest::Url, CredentialError> {
        let resource = scope_to_resource(scope);
        let mut query: Vec<(&str, &str)> =
            vec![("api-version", MSI_API_VERSION), ("resource", resource)];
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id.as_str()));
        }

        reqwest::Url::parse_with_params(&self.endpoint, &query).map_err(|e| {
            CredentialError::InvalidEndpoint {
                endpoint: self.endpoint.clone(),
                reason: e.to_string(),
            }
        })
    }

    /// Request a fresh token from the endpoint.
    async fn cached(&self, scope: &str) -> Option<AccessToken> {
        self.cache.read().await.get(scope).cloned()
    }

    async fn fetch_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let url = self.token_url(scope)?;

        let mut req = self.client.get(url).header("Metadata", "true");
        if let Some(secret) = &self.identity_header {
            req = req.header("X-IDENTITY-HEADER", secret);
        }

        let resp = req.send().await.map_err(CredentialError::Unreachable)?;
        let status = resp.status();
        let body = resp.text().await.map_err(CredentialError::Unreachable)?;

        if !status.is_success() {
            return Err(CredentialError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| CredentialError::InvalidResponse(e.to_string()))?;
        let secs = parsed.expires_on.as_secs()?;
        let expires_on = Utc.timestamp_opt(secs, 0).single().ok_or_else(|| {
            CredentialError::InvalidResponse(format!("expires_on out of range: {secs}"))
        })?;

        debug!("Managed identity token acquired, expires at {}", expires_on);

        Ok(AccessToken {
            token: parsed.access_token,
            expires_on,
        })
    }
}

impl TokenCredential for ManagedIdentityCredential {
    fn get_token(
        &self,
        scope: &str,
    ) -> Pin<Box<dyn Future<Output = Result<AccessToken, CredentialError>> + Send + '_>> {
        let scope = scope.to_string();
        Box::pin(async move {
            if let Some(cached) = self.cached(&scope).await {
                if !cached.is_expiring(Utc::now()) {
                    return Ok(cached);
                }
            }

            let _refresh = match self.refresh.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    // A refresh is in flight: a token inside its expiry margin
                    // is still usable meanwhile.
                    if let Some(cached) = self.cached(&scope).await {
                        if cached.expires_on > Utc::now() {
                            return Ok(cached);
                        }
                    }
                    self.refresh.lock().await
                }
            };

            // Another request may have refreshed while we waited for the lock.
            if let Some(cached) = self.cached(&scope).await {
                if !cached.is_expiring(Utc::now()) {
                    return Ok(cached);
                }
            }

            let token = self.fetch_token(&scope).await?;
            self.cache.write().await.insert(scope, token.clone());
            Ok(token)
        })
    }
}

/// Managed identity endpoints take a resource URI, not a `/.default` scope.
fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

/// Configure the credential for the identity named in `config`.
pub fn resolve_credential(
    config: &IdentityConfig,
) -> Result<Arc<dyn TokenCredential>, CredentialError> {
    info!("Managed identity {}", config.client_id);

    let credential = ManagedIdentityCredential::new(
        &config.client_id,
        config.endpoint.clone(),
        config.identity_header.clone(),
    )?;

    debug!("Managed identity endpoint: {}", credential.endpoint());

    Ok(Arc::new(credential))
}

// -- Tests --------------------------------------------------------------------
