use std::{path::PathBuf, time::Duration};

/// Core error type.
///
/// Adapter crates map their own failures into [`ClientError`] for session calls;
/// everything around the run (config, files) uses this type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid path: {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a directory search session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("rate limited, retry after {}s", wait.as_secs())]
    RateLimited { wait: Duration },

    #[error("two-step password required")]
    PasswordRequired,

    #[error("authorization key invalid")]
    AuthKeyInvalid,

    #[error("phone number invalid")]
    PhoneNumberInvalid,

    #[error("transient error: {0}")]
    Transient(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

/// How the run reacts to a [`ClientError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry with exponential backoff inside a bounded budget.
    Transient,
    /// Sleep for the mandated wait, then retry outside the generic budget.
    RateLimited(Duration),
    /// The account can never work again: dead-letter it.
    AccountFatal,
    /// Unknown cause: abandon the account but leave it on disk.
    Unexpected,
}

impl ClientError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ClientError::RateLimited { wait } => ErrorClass::RateLimited(*wait),
            ClientError::PasswordRequired
            | ClientError::AuthKeyInvalid
            | ClientError::PhoneNumberInvalid => ErrorClass::AccountFatal,
            ClientError::Transient(_) => ErrorClass::Transient,
            ClientError::Unexpected(_) => ErrorClass::Unexpected,
        }
    }

    pub fn is_account_fatal(&self) -> bool {
        self.class() == ErrorClass::AccountFatal
    }
}
