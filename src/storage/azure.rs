//! Azure Blob Storage container client.
//!
//! Talks to the Azure Blob REST API with `reqwest`, authorising every call
//! with a bearer token from a [`TokenCredential`].
//!
//! Construction is lazy: building a [`BlobServiceClient`] or narrowing it to
//! an [`AzureBlobContainer`] performs no I/O, and a malformed endpoint only
//! surfaces as [`StorageError::Configuration`] on the first operation.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use bytes::Bytes;
use md5::{Digest, Md5};
use reqwest::StatusCode;
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info};

use super::container::BlobContainer;
use super::error::{is_transient_status, StorageError};
use crate::identity::{TokenCredential, STORAGE_SCOPE};

/// Azure REST API version used for all requests.
const AZURE_API_VERSION: &str = "2023-11-03";

/// Percent-encoding for blob names: everything but unreserved characters
/// and '/', which Azure keeps as a virtual directory separator.
const AZURE_BLOB_ENCODE_SET: percent_encoding::AsciiSet = percent_encoding::NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// The blob service endpoint for a storage account.
pub fn service_endpoint(account_name: &str) -> String {
    format!("https://{}.blob.core.windows.net", account_name)
}

/// Client bound to one blob service endpoint and credential.
#[derive(Clone)]
pub struct BlobServiceClient {
    /// HTTP client for Azure Blob REST API calls.
    client: reqwest::Client,
    /// Base URL of the blob service, without trailing slash.
    endpoint: String,
    /// Source of bearer tokens.
    credential: Arc<dyn TokenCredential>,
}

impl BlobServiceClient {
    /// Create a client for `endpoint`.  No request is made.
    pub fn new(
        endpoint: impl Into<String>,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| StorageError::Configuration {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            credential,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Narrow the client to `container`.
    pub fn container_client(&self, container: impl Into<String>) -> AzureBlobContainer {
        AzureBlobContainer {
            service: self.clone(),
            container: container.into(),
        }
    }
}

/// Build a container handle for `container_name` in `account_name`.
pub fn build_container_handle(
    account_name: &str,
    container_name: &str,
    credential: Arc<dyn TokenCredential>,
) -> Result<AzureBlobContainer, StorageError> {
    let service = BlobServiceClient::new(service_endpoint(account_name), credential)?;
    Ok(service.container_client(container_name))
}

/// Handle to a single Azure Blob Storage container.
#[derive(Clone)]
pub struct AzureBlobContainer {
    service: BlobServiceClient,
    container: String,
}

/// Body of an Azure error response: `<Error><Code/><Message/></Error>`.
#[derive(Debug, Default, Deserialize)]
struct AzureErrorBody {
    #[serde(rename = "Code", default)]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

impl AzureErrorBody {
    /// Parse an error body, tolerating a leading BOM and empty or non-XML
    /// payloads.
    fn parse(body: &str) -> Self {
        quick_xml::de::from_str(body.trim_start_matches('\u{feff}')).unwrap_or_default()
    }
}

impl AzureBlobContainer {
    /// Blob service endpoint this container lives under.
    pub fn endpoint(&self) -> &str {
        self.service.endpoint()
    }

    /// Build the full URL for a blob.
    fn blob_url(&self, blob_name: &str) -> String {
        let encoded_blob =
            percent_encoding::utf8_percent_encode(blob_name, &AZURE_BLOB_ENCODE_SET).to_string();
        format!(
            "{}/{}/{}",
            self.service.endpoint, self.container, encoded_blob
        )
    }

    /// Get the current UTC date in RFC 1123 format for Azure headers.
    fn rfc1123_date() -> String {
        httpdate::fmt_http_date(std::time::SystemTime::now())
    }

    /// Base64 MD5 digest of `data`, as expected by `Content-MD5`.
    fn content_md5(data: &[u8]) -> String {
        let mut hasher = Md5::new();
        hasher.update(data);
        BASE64_STANDARD.encode(hasher.finalize())
    }

    /// `Authorization` header value for the storage scope.
    async fn bearer(&self) -> Result<String, StorageError> {
        let token = self.service.credential.get_token(STORAGE_SCOPE).await?;
        Ok(format!("Bearer {}", token.token))
    }

    /// Map an unsuccessful Azure response to a classified error.
    fn classify_response(
        context: &str,
        blob_name: &str,
        status: StatusCode,
        body: &str,
    ) -> StorageError {
        let error = AzureErrorBody::parse(body);
        let detail = if error.code.is_empty() {
            format!("Azure {}: HTTP {}", context, status)
        } else {
            format!(
                "Azure {}: HTTP {} - {}: {}",
                context,
                status,
                error.code,
                error.message.lines().next().unwrap_or_default()
            )
        };

        match status.as_u16() {
            404 if error.code == "ContainerNotFound" => StorageError::Configuration {
                message: detail,
            },
            404 => StorageError::NotFound {
                name: blob_name.to_string(),
            },
            401 | 403 => StorageError::Authentication {
                status: Some(status.as_u16()),
                message: detail,
            },
            s if is_transient_status(s) => StorageError::Transient {
                status: Some(s),
                message: detail,
            },
            _ => StorageError::Unexpected(anyhow::anyhow!(detail)),
        }
    }

    /// Download a blob (Get Blob).
    async fn azure_download(&self, blob_name: &str) -> Result<Bytes, StorageError> {
        let url = self.blob_url(blob_name);
        let auth_header = self.bearer().await?;

        let resp = self
            .service
            .client
            .get(&url)
            .header("x-ms-date", Self::rfc1123_date())
            .header("x-ms-version", AZURE_API_VERSION)
            .header("Authorization", auth_header)
            .send()
            .await
            .map_err(|e| StorageError::from_transport("download request failed", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::classify_response("download", blob_name, status, &body));
        }

        resp.bytes()
            .await
            .map_err(|e| StorageError::from_transport("download body read failed", e))
    }

    /// Upload a blob (Put Blob) as a single block blob.
    async fn azure_upload(&self, blob_name: &str, data: Bytes) -> Result<(), StorageError> {
        let url = self.blob_url(blob_name);
        let auth_header = self.bearer().await?;
        let content_md5 = Self::content_md5(&data);

        let resp = self
            .service
            .client
            .put(&url)
            .header("x-ms-date", Self::rfc1123_date())
            .header("x-ms-version", AZURE_API_VERSION)
            .header("x-ms-blob-type", "BlockBlob")
            .header("Content-Type", "application/octet-stream")
            .header("Content-MD5", content_md5)
            .header("Authorization", auth_header)
            .body(data)
            .send()
            .await
            .map_err(|e| StorageError::from_transport("upload request failed", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::classify_response("upload", blob_name, status, &body));
        }

        Ok(())
    }
}

impl BlobContainer for AzureBlobContainer {
    fn name(&self) -> &str {
        &self.container
    }

    fn download(
        &self,
        blob_name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Bytes, StorageError>> + Send + '_>> {
        let blob_name = blob_name.to_string();
        Box::pin(async move {
            debug!(
                "Azure download: container={} blob={}",
                self.container, blob_name
            );
            self.azure_download(&blob_name).await
        })
    }

    fn upload(
        &self,
        blob_name: &str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>> {
        let blob_name = blob_name.to_string();
        Box::pin(async move {
            debug!(
                "Azure upload: container={} blob={} bytes={}",
                self.container,
                blob_name,
                data.len()
            );
            self.azure_upload(&blob_name, data).await?;
            info!("Uploaded blob {} to container {}", blob_name, self.container);
            Ok(())
        })
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{AccessToken, CredentialError};

    struct StaticToken;

    impl TokenCredential for StaticToken {
        fn get_token(
            &self,
            _scope: &str,
        ) -> Pin<Box<dyn Future<Output = Result<AccessToken, CredentialError>> + Send + '_>>
        {
            Box::pin(async {
                Ok(AccessToken {
                    token: "token".to_string(),
                    expires_on: chrono::Utc::now() + chrono::Duration::hours(1),
                })
            })
        }
    }

    fn container(endpoint: &str, name: &str) -> AzureBlobContainer {
        BlobServiceClient::new(endpoint, Arc::new(StaticToken))
            .unwrap()
            .container_client(name)
    }

    #[test]
    fn test_service_endpoint() {
        assert_eq!(
            service_endpoint("mystorage"),
            "https://mystorage.blob.core.windows.net"
        );
    }

    #[test]
    fn test_build_container_handle_is_lazy() {
        // A nonsense account name still produces a handle.
        let handle = build_container_handle("not a host!", "files", Arc::new(StaticToken)).unwrap();
        assert_eq!(handle.name(), "files");
        assert_eq!(
            handle.endpoint(),
            "https://not a host!.blob.core.windows.net"
        );
    }

    #[test]
    fn test_endpoint_trailing_slash_trimmed() {
        let handle = container("http://127.0.0.1:10000/devstoreaccount1/", "c");
        assert_eq!(
            handle.blob_url("a.txt"),
            "http://127.0.0.1:10000/devstoreaccount1/c/a.txt"
        );
    }

    #[test]
    fn test_blob_url_simple_name() {
        let handle = container("https://acct.blob.core.windows.net", "quickstart");
        assert_eq!(
            handle.blob_url("quickstart-1234.txt"),
            "https://acct.blob.core.windows.net/quickstart/quickstart-1234.txt"
        );
    }

    #[test]
    fn test_blob_url_encoding() {
        let handle = container("https://acct.blob.core.windows.net", "c");
        let url = handle.blob_url("dir/key with spaces?.txt");
        assert!(url.ends_with("/c/dir/key%20with%20spaces%3F.txt"));
    }

    #[test]
    fn test_content_md5_empty() {
        // MD5("") = d41d8cd98f00b204e9800998ecf8427e
        assert_eq!(
            AzureBlobContainer::content_md5(b""),
            "1B2M2Y8AsgTpgAmY7PhCfg=="
        );
    }

    #[test]
    fn test_content_md5_hello() {
        // MD5("hello") = 5d41402abc4b2a76b9719d911017c592
        assert_eq!(
            AzureBlobContainer::content_md5(b"hello"),
            "XUFAKrxLKna5cZ2REBfFkg=="
        );
    }

    #[test]
    fn test_rfc1123_date_format() {
        let date = AzureBlobContainer::rfc1123_date();
        assert!(date.ends_with("GMT"));
        assert!(date.contains(','));
    }

    #[test]
    fn test_parse_error_body() {
        let body = "\u{feff}<?xml version=\"1.0\" encoding=\"utf-8\"?><Error><Code>BlobNotFound</Code><Message>The specified blob does not exist.\nRequestId:abc\nTime:2024-01-01T00:00:00Z</Message></Error>";
        let parsed = AzureErrorBody::parse(body);
        assert_eq!(parsed.code, "BlobNotFound");
        assert!(parsed.message.starts_with("The specified blob does not exist."));
    }

    #[test]
    fn test_parse_error_body_not_xml() {
        let parsed = AzureErrorBody::parse("");
        assert!(parsed.code.is_empty());
    }

    #[test]
    fn test_classify_blob_not_found() {
        let body = "<Error><Code>BlobNotFound</Code><Message>nope</Message></Error>";
        let err =
            AzureBlobContainer::classify_response("download", "a.txt", StatusCode::NOT_FOUND, body);
        assert!(matches!(err, StorageError::NotFound { ref name } if name == "a.txt"));
    }

    #[test]
    fn test_classify_container_not_found() {
        let body = "<Error><Code>ContainerNotFound</Code><Message>nope</Message></Error>";
        let err =
            AzureBlobContainer::classify_response("download", "a.txt", StatusCode::NOT_FOUND, body);
        assert!(matches!(err, StorageError::Configuration { .. }));
    }

    #[test]
    fn test_classify_auth_failures() {
        let body = "<Error><Code>AuthorizationPermissionMismatch</Code><Message>no</Message></Error>";
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            let err = AzureBlobContainer::classify_response("upload", "a.txt", status, body);
            assert!(matches!(err, StorageError::Authentication { .. }));
        }
    }

    #[test]
    fn test_classify_transient() {
        let err = AzureBlobContainer::classify_response(
            "upload",
            "a.txt",
            StatusCode::SERVICE_UNAVAILABLE,
            "<Error><Code>ServerBusy</Code><Message>busy</Message></Error>",
        );
        assert!(matches!(err, StorageError::Transient { status: Some(503), .. }));
    }

    #[test]
    fn test_classify_other() {
        let err = AzureBlobContainer::classify_response(
            "upload",
            "a.txt",
            StatusCode::CONFLICT,
            "<Error><Code>LeaseIdMissing</Code><Message>lease</Message></Error>",
        );
        assert!(matches!(err, StorageError::Unexpected(_)));
        assert!(err.to_string().contains("LeaseIdMissing"));
    }

    #[tokio::test]
    async fn test_invalid_endpoint_surfaces_on_first_call() {
        let handle = build_container_handle("not a host!", "files", Arc::new(StaticToken)).unwrap();
        let err = handle.download("a.txt").await.unwrap_err();
        assert!(matches!(err, StorageError::Configuration { .. }), "{err:?}");
    }
}
