use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authorization window could not be opened: {0}")]
    SurfaceBlocked(String),

    #[error("Authorization for {provider} could not be started: {reason}")]
    AuthorizationSetup { provider: String, reason: String },

    #[error("Authorization window could not be navigated: {0}")]
    Navigation(String),

    #[error("Authorization timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Authorization window was closed before completing")]
    Closed,

    #[error("Authorization cancelled")]
    Cancelled,

    #[error("Provider {provider} denied authorization: {message}")]
    Denied { provider: String, message: String },

    #[error("Authorization succeeded but no account id was returned")]
    MissingAccount,

    #[error("Authorization already in progress for {provider}")]
    InProgress { provider: String },
}

impl AuthError {
    /// Whether starting a fresh handshake may succeed without host changes.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AuthError::Timeout { .. }
                | AuthError::Closed
                | AuthError::Cancelled
                | AuthError::Denied { .. }
                | AuthError::InProgress { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
