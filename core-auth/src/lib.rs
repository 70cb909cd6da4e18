//! # Authorization Module
//!
//! Binds new mail accounts through an external authorization handshake.
//!
//! ## Overview
//!
//! The provider's consent screen runs in a surface the core does not control
//! (popup, browser tab). Its outcome comes back as an untrusted message over
//! the host's message channel. This crate turns that into a single
//! `Result<Authorized>`:
//!
//! - Result messages must carry the configured source tag and come from the
//!   origin of the redirect target embedded in the authorization URL
//! - The user closing the surface, the timeout, or an explicit cancellation
//!   rejects the handshake
//! - Exactly one outcome is delivered; listeners and timers are released as
//!   soon as it is known

pub mod error;
pub mod handshake;
pub mod origin;
pub mod surface;
pub mod types;

pub use error::{AuthError, Result};
pub use handshake::HandshakeChannel;
pub use surface::SurfaceHandle;
pub use types::{AuthorizationRequest, AuthorizationResult, Authorized, HandshakeState};
