//! Shared zoom level
//!
//! One [`ZoomLevel`] exists per open document. Every page mapper holds a
//! receiver on it, so a zoom change is visible to all pages at once and
//! mounted page renderers can await it to re-render.

use annotator_core::{CoreError, CoreResult};
use std::sync::Arc;
use tokio::sync::watch;

/// Inclusive zoom range requests are clamped into
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ZoomBounds {
    pub min: f64,
    pub max: f64,
}

impl ZoomBounds {
    pub fn new(min: f64, max: f64) -> CoreResult<Self> {
        if !(min.is_finite() && max.is_finite() && min > 0.0 && min <= max) {
            return Err(CoreError::InvalidArgument(format!("zoom bounds {min}..={max}")));
        }
        Ok(Self { min, max })
    }

    pub fn clamp(&self, zoom: f64) -> f64 {
        zoom.clamp(self.min, self.max)
    }
}

impl Default for ZoomBounds {
    fn default() -> Self {
        Self { min: 0.1, max: 16.0 }
    }
}

/// Read-by-many, write-by-one zoom factor
#[derive(Debug, Clone)]
pub struct ZoomLevel {
    tx: Arc<watch::Sender<f64>>,
    bounds: ZoomBounds,
}

impl ZoomLevel {
    /// `initial` is clamped into `bounds`
    pub fn new(initial: f64, bounds: ZoomBounds) -> CoreResult<Self> {
        let initial = ensure_zoom(initial).map(|z| bounds.clamp(z))?;
        let (tx, _) = watch::channel(initial);
        Ok(Self { tx: Arc::new(tx), bounds })
    }

    pub fn get(&self) -> f64 {
        *self.tx.borrow()
    }

    pub fn bounds(&self) -> ZoomBounds {
        self.bounds
    }

    /// Request a new zoom; the value is clamped into bounds
    ///
    /// Returns the applied zoom. Subscribers are only woken when it changed.
    pub fn request(&self, zoom: f64) -> CoreResult<f64> {
        let zoom = self.bounds.clamp(ensure_zoom(zoom)?);
        self.tx.send_if_modified(|current| {
            if *current == zoom {
                false
            } else {
                *current = zoom;
                true
            }
        });
        tracing::debug!(zoom, "zoom level set");
        Ok(zoom)
    }

    /// Multiply the current zoom by `step` (use `1.0 / step` to zoom out)
    pub fn step(&self, step: f64) -> CoreResult<f64> {
        self.request(self.get() * ensure_zoom(step)?)
    }

    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.tx.subscribe()
    }
}

fn ensure_zoom(zoom: f64) -> CoreResult<f64> {
    if zoom.is_finite() && zoom > 0.0 {
        Ok(zoom)
    } else {
        Err(CoreError::InvalidArgument(format!("zoom must be > 0, got {zoom}")))
    }
}

/// Zoom at which a page of `page_width` document pixels fills the container
///
/// `margin_px` is kept free on each side. Returns `None` when the inputs
/// leave no positive width to fit into.
pub fn fit_width_zoom(container_width_px: f64, page_width: f64, margin_px: f64) -> Option<f64> {
    let available = container_width_px - 2.0 * margin_px.max(0.0);
    if !(available > 0.0 && page_width > 0.0) || !available.is_finite() {
        return None;
    }
    Some(available / page_width)
}
