//! # Desktop Bridge Implementations
//!
//! Bridge implementations for desktop hosts (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `SurfaceLauncher` using the system browser via the `open` crate
//! - `MessageChannel` as an in-process hub the shell posts redirect results into
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{BrowserSurfaceLauncher, LocalMessageChannel};
//! use std::sync::Arc;
//!
//! let messages = LocalMessageChannel::new();
//! let config = CoreConfig::builder()
//!     .account_service(Arc::new(api_client))
//!     .surface_launcher(Arc::new(BrowserSurfaceLauncher::new()))
//!     .message_channel(Arc::new(messages.clone()))
//!     .build()?;
//!
//! // Later, from the redirect listener:
//! messages.post("http://localhost:8765", payload);
//! ```

mod message;
mod surface;

pub use message::LocalMessageChannel;
pub use surface::BrowserSurfaceLauncher;
