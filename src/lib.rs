//! Workspace umbrella crate.
//!
//! Re-exports the inbox core façade so host applications can depend on
//! `sender-inbox` and pick features here instead of wiring each crate.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
