use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Authentication error: {0}")]
    Auth(#[from] core_auth::AuthError),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),
}

impl CoreError {
    /// Whether the user can simply try the operation again.
    pub fn is_recoverable(&self) -> bool {
        match self {
            CoreError::Auth(e) | CoreError::Sync(core_sync::SyncError::Auth(e)) => {
                e.is_recoverable()
            }
            CoreError::Sync(core_sync::SyncError::AccountListing(_)) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
