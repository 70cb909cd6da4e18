use core_auth::AuthError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to list accounts: {0}")]
    AccountListing(String),

    #[error("Failed to create demo account: {0}")]
    DemoAccountCreation(String),

    #[error("Sync attempt failed: {0}")]
    Attempt(String),

    #[error("Sync for {label} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        label: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Binding accounts requires a surface launcher and a message channel")]
    BindingUnavailable,

    #[error(transparent)]
    Auth(#[from] AuthError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
