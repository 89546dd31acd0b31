//! Typed registry errors and their JSON wire envelope.
//!
//! Every failure surfaced to a client carries one of the OCI
//! distribution error codes. Codes come with a default HTTP status and
//! message; builder modifiers override those per call site, later
//! modifiers winning over earlier ones.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;
use std::io;

pub type Result<T, E = RegistryError> = std::result::Result<T, E>;

/// Error codes of the OCI distribution specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Unknown,
    Unsupported,
    DigestInvalid,
    SizeInvalid,
    NameInvalid,
    TagInvalid,
    NameUnknown,
    ManifestUnknown,
    ManifestInvalid,
    ManifestUnverified,
    ManifestBlobUnknown,
    BlobUnknown,
    BlobUploadUnknown,
    BlobUploadInvalid,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Unsupported => "UNSUPPORTED",
            Self::DigestInvalid => "DIGEST_INVALID",
            Self::SizeInvalid => "SIZE_INVALID",
            Self::NameInvalid => "NAME_INVALID",
            Self::TagInvalid => "TAG_INVALID",
            Self::NameUnknown => "NAME_UNKNOWN",
            Self::ManifestUnknown => "MANIFEST_UNKNOWN",
            Self::ManifestInvalid => "MANIFEST_INVALID",
            Self::ManifestUnverified => "MANIFEST_UNVERIFIED",
            Self::ManifestBlobUnknown => "MANIFEST_BLOB_UNKNOWN",
            Self::BlobUnknown => "BLOB_UNKNOWN",
            Self::BlobUploadUnknown => "BLOB_UPLOAD_UNKNOWN",
            Self::BlobUploadInvalid => "BLOB_UPLOAD_INVALID",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unsupported => StatusCode::METHOD_NOT_ALLOWED,
            Self::DigestInvalid
            | Self::SizeInvalid
            | Self::NameInvalid
            | Self::TagInvalid
            | Self::ManifestInvalid
            | Self::ManifestUnverified
            | Self::ManifestBlobUnknown => StatusCode::BAD_REQUEST,
            Self::NameUnknown | Self::ManifestUnknown | Self::BlobUnknown => StatusCode::NOT_FOUND,
            Self::BlobUploadUnknown => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::BlobUploadInvalid => StatusCode::NOT_FOUND,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown error",
            Self::Unsupported => "The operation is unsupported.",
            Self::DigestInvalid => "provided digest did not match uploaded content",
            Self::SizeInvalid => "provided length did not match content length",
            Self::NameInvalid => "invalid repository name",
            Self::TagInvalid => "manifest tag did not match URI",
            Self::NameUnknown => "repository name not known to registry",
            Self::ManifestUnknown => "manifest unknown",
            Self::ManifestInvalid => "manifest invalid",
            Self::ManifestUnverified => "manifest failed signature verification",
            Self::ManifestBlobUnknown => "blob unknown to registry",
            Self::BlobUnknown => "blob unknown to registry",
            Self::BlobUploadUnknown => "blob upload unknown to registry",
            Self::BlobUploadInvalid => "blob upload invalid",
        }
    }
}

/// A registry failure: OCI code, HTTP status, message, optional detail
/// payload and optional underlying cause.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct RegistryError {
    code: ErrorCode,
    status: StatusCode,
    message: String,
    detail: Option<Value>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl RegistryError {
    pub fn from_code(code: ErrorCode) -> Self {
        RegistryError {
            code,
            status: code.status(),
            message: code.default_message().to_owned(),
            detail: None,
            source: None,
        }
    }

    /// Wraps an underlying cause with a registry code.
    pub fn wrap<E>(source: E, code: ErrorCode) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let mut err = Self::from_code(code);
        err.source = Some(source.into());
        err
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<io::Error> for RegistryError {
    fn from(err: io::Error) -> Self {
        Self::wrap(err, ErrorCode::Unknown)
    }
}

impl From<axum::Error> for RegistryError {
    fn from(err: axum::Error) -> Self {
        Self::wrap(err, ErrorCode::Unknown)
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<&'a Value>,
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code.as_str(), error = ?self, "request failed");
        } else {
            tracing::debug!(code = self.code.as_str(), "{}", self);
        }
        let body = serde_json::to_vec(&Envelope {
            code: self.code.as_str(),
            message: &self.message,
            detail: self.detail.as_ref(),
        })
        .unwrap_or_else(|_| b"{}".to_vec());
        Response::builder()
            .status(self.status)
            .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
            .body(Body::from(body))
            .unwrap()
    }
}
