//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the inbox core crates:
//! - Logging and tracing setup
//! - Configuration (bridges, sync and handshake settings)
//! - Event bus for progress and authorization events
//!
//! ## Overview
//!
//! Nothing in here knows how a sync or a handshake works. The orchestrator
//! and handshake crates read their settings from [`config`], publish through
//! [`events`], and log with the conventions set up by [`logging`].

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
