//! System browser authorization surface.

use bridge_traits::error::{BridgeError, Result};
use bridge_traits::{AuthSurface, SurfaceLauncher};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Launches authorization in the user's default browser.
///
/// A browser tab is outside the process, so closure cannot be observed and
/// `close` only stops us from navigating again. Handshakes through this
/// launcher end by result message or timeout.
#[derive(Debug, Clone, Default)]
pub struct BrowserSurfaceLauncher;

impl BrowserSurfaceLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl SurfaceLauncher for BrowserSurfaceLauncher {
    fn open(&self) -> Result<Box<dyn AuthSurface>> {
        // Nothing to show until there is a URL.
        Ok(Box::new(BrowserSurface::default()))
    }
}

#[derive(Debug, Default)]
struct BrowserSurface {
    released: AtomicBool,
}

impl AuthSurface for BrowserSurface {
    fn navigate(&self, url: &str) -> Result<()> {
        if self.released.load(Ordering::SeqCst) {
            return Err(BridgeError::NotAvailable(
                "browser surface already closed".to_string(),
            ));
        }

        open::that(url).map_err(|e| {
            warn!(error = %e, "Failed to open system browser");
            BridgeError::Io(e)
        })?;
        info!("Opened authorization page in system browser");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }

    fn close(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}
