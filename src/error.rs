// error.rs
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use std::path::PathBuf;

/// Startup faults. Any of these stops the process before it starts serving.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no shared secret configured (set HOOK_SHARED_SECRET or HOOK_SHARED_SECRET_FILE)")]
    MissingSecret,
    #[error("shared secret is empty")]
    EmptySecret,
    #[error("failed to read shared secret file {path}: {source}")]
    SecretFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no public key configured (set HOOK_PUBLIC_KEY or HOOK_PUBLIC_KEY_FILE)")]
    MissingPublicKey,
    #[error("invalid RSA public key: {0}")]
    PublicKey(String),
    #[error("failed to read public key file {path}: {source}")]
    PublicKeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("key material does not fit signature scheme {0}")]
    KeySchemeMismatch(crate::SignatureScheme),
    #[error("unknown signature scheme: {0}")]
    UnknownScheme(String),
    #[error("invalid bind address {0}")]
    InvalidBindAddress(String),
    #[error("invalid webhook path {0}: must start with '/' and not shadow /health")]
    InvalidWebhookPath(String),
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Per-request rejections, mapped onto HTTP responses by the adapter layer.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("unsupported method {0}")]
    UnsupportedMethod(Method),
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
    #[error("failed to read request body: {0}")]
    BodyRead(String),
    #[error("bad webhook signature")]
    InvalidSignature,
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::UnsupportedMethod(_) => StatusCode::METHOD_NOT_ALLOWED,
            WebhookError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            WebhookError::BodyRead(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WebhookError::InvalidSignature => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            WebhookError::UnsupportedMethod(_) => (
                status,
                [(header::ALLOW, "POST")],
                "Only POST is supported",
            )
                .into_response(),
            WebhookError::BodyTooLarge { .. } => (status, "Request body too large").into_response(),
            // Transport details stay in the logs.
            WebhookError::BodyRead(_) => (status, "Failed to read request body").into_response(),
            WebhookError::InvalidSignature => (status, "Bad webhook signature").into_response(),
        }
    }
}
