//! Authorization Surface Abstraction
//!
//! An authorization surface is an out-of-process window (popup, system browser
//! tab, embedded web view) that the user drives through a provider's consent
//! screen. The core only opens it, points it at a URL, checks whether the user
//! has closed it, and closes it.
//!
//! Opening is synchronous: hosts that only allow new windows while handling a
//! user gesture must get the open call inside that gesture.

use crate::error::Result;

/// An opened authorization surface
pub trait AuthSurface: Send + Sync {
    /// Point the surface at `url`
    fn navigate(&self, url: &str) -> Result<()>;

    /// Whether the user (or host) has closed the surface
    ///
    /// Surfaces that cannot observe closure return `false` forever.
    fn is_closed(&self) -> bool;

    /// Close the surface. Calling this on a closed surface is a no-op.
    fn close(&self);
}

/// Opens authorization surfaces
///
/// # Example
///
/// ```ignore
/// use bridge_traits::surface::SurfaceLauncher;
///
/// fn on_connect_clicked(launcher: &dyn SurfaceLauncher) -> Result<()> {
///     let surface = launcher.open()?;
///     surface.navigate("https://accounts.example.com/authorize")?;
///     Ok(())
/// }
/// ```
pub trait SurfaceLauncher: Send + Sync {
    /// Open a blank surface
    ///
    /// Returns `BridgeError::NotAvailable` when the host refuses (e.g. a popup
    /// blocker).
    fn open(&self) -> Result<Box<dyn AuthSurface>>;
}
