//! # Host Bridge Traits
//!
//! Collaborator contracts the inbox core needs the host to provide.
//!
//! ## Overview
//!
//! The core never talks to the network, opens windows, or listens for
//! cross-window messages itself. Each of those capabilities is a trait here,
//! implemented once per host (desktop shell, web app, tests).
//!
//! ## Traits
//!
//! ### Remote API
//! - [`AccountService`](accounts::AccountService) - Account listing/creation, per-account sync, authorization start
//!
//! ### Authorization Handshake
//! - [`SurfaceLauncher`](surface::SurfaceLauncher) / [`AuthSurface`](surface::AuthSurface) - External authorization window
//! - [`MessageChannel`](message::MessageChannel) - Origin-tagged inbound messages
//!
//! ### Utilities
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! convert their transport errors into it and keep the message actionable.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single adapter can be shared
//! behind an `Arc` by every component of the core.

pub mod accounts;
pub mod error;
pub mod logging;
pub mod message;
pub mod surface;

pub use error::BridgeError;

pub use accounts::{
    Account, AccountId, AccountService, AuthorizationStart, NewAccount, ProviderKind, SyncReport,
    UnknownProvider,
};
pub use logging::{LogEntry, LogLevel, LoggerSink};
pub use message::{InboundMessage, MessageChannel, MessageSubscription};
pub use surface::{AuthSurface, SurfaceLauncher};
