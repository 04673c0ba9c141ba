//! Structured S3 error responses.
//!
//! [`decode`] turns any non-success response into an [`ErrorResponse`]:
//! the XML `<Error>` body wins when it parses, otherwise an equivalent
//! record is synthesized from the status code and the `x-amz-*` response
//! headers.  Some deployments send no body at all on 404/409, and the
//! harness still needs something comparable.

use std::fmt;

use http::{HeaderMap, StatusCode};
use thiserror::Error;

use crate::xml::{self, ErrorDocument};

/// Request ID response header.
pub const X_AMZ_REQUEST_ID: &str = "x-amz-request-id";

/// Extended request ID (host ID) response header.
pub const X_AMZ_ID_2: &str = "x-amz-id-2";

/// Bucket region response header.
pub const X_AMZ_BUCKET_REGION: &str = "x-amz-bucket-region";

/// S3 error codes the harness reasons about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoSuchBucket,
    NoSuchKey,
    AccessDenied,
    Conflict,
    /// Any other code, kept verbatim.  When synthesized from a bare status
    /// `status` is set and `code` is the status line text, e.g.
    /// `500 Internal Server Error`.
    Other { status: Option<u16>, code: String },
}

impl ErrorCode {
    /// Map a wire code string onto the enum.
    pub fn from_code(code: &str) -> Self {
        match code {
            "NoSuchBucket" => ErrorCode::NoSuchBucket,
            "NoSuchKey" => ErrorCode::NoSuchKey,
            "AccessDenied" => ErrorCode::AccessDenied,
            "Conflict" => ErrorCode::Conflict,
            other => ErrorCode::Other {
                status: None,
                code: other.to_string(),
            },
        }
    }

    /// The code as it appears in the `<Code>` element.
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::NoSuchBucket => "NoSuchBucket",
            ErrorCode::NoSuchKey => "NoSuchKey",
            ErrorCode::AccessDenied => "AccessDenied",
            ErrorCode::Conflict => "Conflict",
            ErrorCode::Other { code, .. } => code,
        }
    }

    /// HTTP status the code was synthesized from, if it was.
    pub fn status(&self) -> Option<u16> {
        match self {
            ErrorCode::Other { status, .. } => *status,
            _ => None,
        }
    }
}

impl Default for ErrorCode {
    fn default() -> Self {
        ErrorCode::Other {
            status: None,
            code: String::new(),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded S3 error.
///
/// An empty `message` means "no error expected"; verifiers use
/// [`ErrorResponse::none`] as that sentinel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
    pub bucket_name: String,
    pub key: String,
    pub request_id: String,
    pub host_id: String,
    /// Only ever filled from the `x-amz-bucket-region` header.
    pub region: String,
}

impl ErrorResponse {
    /// The "no error expected" sentinel.
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether this record describes an actual expected error.
    pub fn is_expected(&self) -> bool {
        !self.message.is_empty()
    }

    /// The documented error for a bucket that does not exist.
    pub fn no_such_bucket(bucket_name: &str) -> Self {
        Self {
            code: ErrorCode::NoSuchBucket,
            message: "The specified bucket does not exist".to_string(),
            bucket_name: bucket_name.to_string(),
            ..Self::default()
        }
    }

    /// Render as an S3 `<Error>` document.  `region` is not part of the
    /// document and is dropped.
    pub fn to_xml(&self) -> String {
        xml::render_error(&ErrorDocument {
            code: self.code.as_str().to_string(),
            message: self.message.clone(),
            bucket_name: self.bucket_name.clone(),
            key: self.key.clone(),
            request_id: self.request_id.clone(),
            host_id: self.host_id.clone(),
        })
    }
}

impl From<ErrorDocument> for ErrorResponse {
    fn from(doc: ErrorDocument) -> Self {
        Self {
            code: ErrorCode::from_code(&doc.code),
            message: doc.message,
            bucket_name: doc.bucket_name,
            key: doc.key,
            request_id: doc.request_id,
            host_id: doc.host_id,
            region: String::new(),
        }
    }
}

/// Decode an error response.
///
/// A body that parses as an `<Error>` document is returned as-is,
/// whatever the status.  Otherwise the record is synthesized from
/// `status`; `object_name` decides between `NoSuchBucket` and
/// `NoSuchKey` on 404.  Missing headers become empty strings.
pub fn decode(
    body: &[u8],
    status: StatusCode,
    headers: &HeaderMap,
    bucket_name: &str,
    object_name: &str,
) -> ErrorResponse {
    match xml::parse_document::<ErrorDocument>(body, "Error") {
        Ok(doc) => return doc.into(),
        Err(e) => tracing::debug!(%status, "falling back to status-derived error: {e}"),
    }

    let (code, message, key) = match status {
        StatusCode::NOT_FOUND if object_name.is_empty() => (
            ErrorCode::NoSuchBucket,
            "The specified bucket does not exist.".to_string(),
            "",
        ),
        StatusCode::NOT_FOUND => (
            ErrorCode::NoSuchKey,
            "The specified key does not exist.".to_string(),
            object_name,
        ),
        StatusCode::FORBIDDEN => (
            ErrorCode::AccessDenied,
            "Access Denied.".to_string(),
            object_name,
        ),
        StatusCode::CONFLICT => (
            ErrorCode::Conflict,
            "Bucket not empty.".to_string(),
            "",
        ),
        other => {
            let text = status_text(other);
            let code = ErrorCode::Other {
                status: Some(other.as_u16()),
                code: text.clone(),
            };
            (code, text, "")
        }
    };

    ErrorResponse {
        code,
        message,
        bucket_name: bucket_name.to_string(),
        key: key.to_string(),
        request_id: header_string(headers, X_AMZ_REQUEST_ID),
        host_id: header_string(headers, X_AMZ_ID_2),
        region: header_string(headers, X_AMZ_BUCKET_REGION),
    }
}

/// Status line text, e.g. `404 Not Found`.
pub fn status_text(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {reason}", status.as_u16()),
        None => status.as_u16().to_string(),
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
