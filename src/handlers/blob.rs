//! Blob read/write handlers.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use garde::Validate;
use metrics::counter;
use serde::Deserialize;
use tracing::debug;

use crate::errors::ApiError;
use crate::metrics::{BLOB_OPERATIONS_TOTAL, BYTES_DOWNLOADED_TOTAL, BYTES_UPLOADED_TOTAL};
use crate::storage::StorageError;
use crate::AppState;

/// Query parameter naming the blob to read.
pub const FILE_NAME_PARAM: &str = "fileName";

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Query string of a read request.
///
/// Decoded as `application/x-www-form-urlencoded`, so `+` reads as a space.
/// When `fileName` repeats, the first occurrence is used.
#[derive(Debug, Default, Deserialize)]
#[serde(from = "Vec<(String, String)>")]
pub struct ReadBlobQuery {
    pub file_name: Option<String>,
}

impl From<Vec<(String, String)>> for ReadBlobQuery {
    fn from(pairs: Vec<(String, String)>) -> Self {
        let file_name = pairs
            .into_iter()
            .find(|(key, _)| key == FILE_NAME_PARAM)
            .map(|(_, value)| value);
        Self { file_name }
    }
}

/// Validated read request.
#[derive(Debug, Validate)]
pub struct ReadBlobInput {
    /// Blob name: 1-1024 characters (the Azure blob name limit).
    #[garde(length(chars, min = 1, max = 1024))]
    pub file_name: String,
}

/// Generate a fresh name for an uploaded blob: `quickstart-<uuid>.txt`.
pub fn generate_blob_name() -> String {
    format!("quickstart-{}.txt", uuid::Uuid::new_v4())
}

fn record_operation(operation: &'static str, result: &Result<(), &StorageError>) {
    let outcome = match result {
        Ok(()) => "success",
        Err(e) => e.kind().as_str(),
    };
    counter!(BLOB_OPERATIONS_TOTAL, "operation" => operation, "outcome" => outcome).increment(1);
}

/// `GET /?fileName=<name>` -- Return the content of the named blob as text.
#[utoipa::path(
    get,
    path = "/",
    tag = "Blob",
    operation_id = "ReadBlob",
    params(
        ("fileName" = String, Query, description = "Name of the blob to read"),
    ),
    responses(
        (status = 200, description = "Blob content", body = String, content_type = "text/plain"),
        (status = 400, description = "Missing or invalid fileName"),
        (status = 403, description = "Storage access denied to the service identity"),
        (status = 404, description = "Blob not found"),
        (status = 503, description = "Storage temporarily unavailable"),
        (status = 500, description = "Internal error")
    )
)]
pub async fn read_blob(
    state: Arc<AppState>,
    query: ReadBlobQuery,
) -> Result<Response, ApiError> {
    let file_name = query.file_name.ok_or(ApiError::MissingParameter {
        name: FILE_NAME_PARAM,
    })?;

    let input = ReadBlobInput { file_name };
    input.validate().map_err(|report| ApiError::InvalidArgument {
        message: format!("Invalid {FILE_NAME_PARAM}: {report}"),
    })?;

    debug!("Reading blob {}", input.file_name);

    let result = state.container.download(&input.file_name).await;
    record_operation("download", &result.as_ref().map(|_| ()));
    let data = result?;

    counter!(BYTES_DOWNLOADED_TOTAL).increment(data.len() as u64);

    let text = String::from_utf8_lossy(&data).into_owned();
    Ok((StatusCode::OK, [("content-type", TEXT_PLAIN)], text).into_response())
}

/// `POST /` -- Store the request body under a freshly generated blob name.
#[utoipa::path(
    post,
    path = "/",
    tag = "Blob",
    operation_id = "WriteBlob",
    request_body(content = String, description = "Raw blob content", content_type = "text/plain"),
    responses(
        (status = 200, description = "Blob stored; body names the generated blob", body = String, content_type = "text/plain"),
        (status = 403, description = "Storage access denied to the service identity"),
        (status = 503, description = "Storage temporarily unavailable"),
        (status = 500, description = "Internal error")
    )
)]
pub async fn write_blob(state: Arc<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let file_name = generate_blob_name();
    let len = body.len() as u64;

    debug!("Writing blob {} ({} bytes)", file_name, len);

    let result = state.container.upload(&file_name, body).await;
    record_operation("upload", &result.as_ref().map(|_| ()));
    result?;

    counter!(BYTES_UPLOADED_TOTAL).increment(len);

    Ok((
        StatusCode::OK,
        [("content-type", TEXT_PLAIN)],
        format!("file {} was uploaded", file_name),
    )
        .into_response())
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_blob_name_format() {
        let name = generate_blob_name();
        let uuid_part = name
            .strip_prefix("quickstart-")
            .and_then(|rest| rest.strip_suffix(".txt"))
            .unwrap();
        assert!(uuid::Uuid::parse_str(uuid_part).is_ok());
    }

    #[test]
    fn test_generate_blob_name_unique() {
        let names: HashSet<String> = (0..1000).map(|_| generate_blob_name()).collect();
        assert_eq!(names.len(), 1000);
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_read_query_first_file_name_wins() {
        let query = ReadBlobQuery::from(pairs(&[
            ("other", "x"),
            ("fileName", "first.txt"),
            ("fileName", "second.txt"),
        ]));
        assert_eq!(query.file_name.as_deref(), Some("first.txt"));
    }

    #[test]
    fn test_read_query_without_file_name() {
        let query = ReadBlobQuery::from(pairs(&[("filename", "a.txt")]));
        assert!(query.file_name.is_none());
    }

    #[test]
    fn test_validate_file_name() {
        let ok = ReadBlobInput {
            file_name: "quickstart-1.txt".to_string(),
        };
        assert!(ok.validate().is_ok());

        let empty = ReadBlobInput {
            file_name: String::new(),
        };
        assert!(empty.validate().is_err());

        let long = ReadBlobInput {
            file_name: "a".repeat(1025),
        };
        assert!(long.validate().is_err());

        let max = ReadBlobInput {
            file_name: "é".repeat(1024),
        };
        assert!(max.validate().is_ok());
    }
}
