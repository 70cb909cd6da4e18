use bridge_traits::error::Result as BridgeResult;
use bridge_traits::AuthSurface;
use std::fmt;

/// Owned handle to an opened authorization surface.
///
/// Closes the surface on drop unless [`detach`](SurfaceHandle::detach) was
/// called. `close` is idempotent.
pub struct SurfaceHandle {
    surface: Option<Box<dyn AuthSurface>>,
    closed: bool,
}

impl SurfaceHandle {
    pub fn new(surface: Box<dyn AuthSurface>) -> Self {
        Self {
            surface: Some(surface),
            closed: false,
        }
    }

    pub fn navigate(&self, url: &str) -> BridgeResult<()> {
        match &self.surface {
            Some(surface) => surface.navigate(url),
            None => Err(bridge_traits::BridgeError::NotAvailable(
                "authorization surface already released".to_string(),
            )),
        }
    }

    /// Closed by us or by the user.
    pub fn is_closed(&self) -> bool {
        self.closed
            || self
                .surface
                .as_ref()
                .map_or(true, |surface| surface.is_closed())
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(surface) = &self.surface {
            surface.close();
        }
    }

    /// Give up ownership without closing the surface.
    pub fn detach(mut self) -> Option<Box<dyn AuthSurface>> {
        self.surface.take()
    }
}

impl Drop for SurfaceHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceHandle")
            .field("closed", &self.closed)
            .field("attached", &self.surface.is_some())
            .finish()
    }
}
