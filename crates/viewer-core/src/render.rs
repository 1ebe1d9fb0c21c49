//! Per-page render lifecycle
//!
//! Mounting a page registers its coordinate mapper and renders the raster at
//! the current zoom. A zoom change re-renders every mounted page without
//! touching its token layer. Each page keeps a render generation: starting a
//! render cancels the page's in-flight one, and a finished render is only
//! applied if no newer one was started in the meantime.

use crate::error::RenderError;
use crate::mapper::{CanvasOffset, PageCoordinateMapper};
use crate::registry::PageRegistry;
use crate::zoom::{fit_width_zoom, ZoomLevel};
use annotator_core::TokenIndex;
use annotator_scheduler::{CancellationRegistry, CancellationToken};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Opaque handle of the canvas a page draws into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTarget(pub u64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page: u32,
    pub scale: f64,
    pub target: RenderTarget,
}

/// Size of the rendered canvas in screen pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderedPage {
    pub width: f64,
    pub height: f64,
}

/// Raster backend that draws one page into a canvas
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Render `request`; implementations should stop early once `cancel` fires
    async fn render(
        &self,
        request: RenderRequest,
        cancel: CancellationToken,
    ) -> Result<RenderedPage, RenderError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Applied { page: u32, scale: f64, size: RenderedPage },
    /// A newer render for the page started before this one finished
    Superseded,
}

/// Container geometry for the automatic fit-to-width on first load
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitWidth {
    pub container_width_px: f64,
    pub margin_px: f64,
}

#[derive(Debug)]
struct MountedPage {
    target: RenderTarget,
    generation: u64,
    last: Option<(f64, RenderedPage)>,
}

pub struct PageRenderCoordinator {
    renderer: Arc<dyn PageRenderer>,
    zoom: ZoomLevel,
    registry: PageRegistry,
    renders: CancellationRegistry<u32>,
    pages: Mutex<BTreeMap<u32, MountedPage>>,
    pending_fit: Mutex<Option<FitWidth>>,
}

impl PageRenderCoordinator {
    pub fn new(renderer: Arc<dyn PageRenderer>, zoom: ZoomLevel, registry: PageRegistry) -> Self {
        Self {
            renderer,
            zoom,
            registry,
            renders: CancellationRegistry::new(),
            pages: Mutex::new(BTreeMap::new()),
            pending_fit: Mutex::new(None),
        }
    }

    /// Fit the first page that finishes rendering to the container width
    pub fn fit_width_on_first_load(&self, fit: FitWidth) {
        *self.pending_fit.lock() = Some(fit);
    }

    pub fn zoom(&self) -> &ZoomLevel {
        &self.zoom
    }

    pub fn registry(&self) -> &PageRegistry {
        &self.registry
    }

    pub fn mounted_pages(&self) -> Vec<u32> {
        self.pages.lock().keys().copied().collect()
    }

    /// Scale and canvas size of the last applied render
    pub fn last_render(&self, page: u32) -> Option<(f64, RenderedPage)> {
        self.pages.lock().get(&page).and_then(|m| m.last)
    }

    /// Register the page's mapper and render it at the current zoom
    pub async fn mount(
        &self,
        index: Arc<TokenIndex>,
        offset: CanvasOffset,
        target: RenderTarget,
    ) -> Result<RenderOutcome, RenderError> {
        let page = index.page();
        self.registry.register(PageCoordinateMapper::new(index, &self.zoom, offset));
        self.pages.lock().insert(page, MountedPage { target, generation: 0, last: None });

        tracing::debug!(page, "page mounted");
        self.render_page(page).await
    }

    /// Cancel the page's render and drop its mapper
    pub fn unmount(&self, page: u32) -> bool {
        self.renders.cancel(&page);
        self.registry.unregister(page);
        let removed = self.pages.lock().remove(&page).is_some();
        if removed {
            tracing::debug!(page, "page unmounted");
        }
        removed
    }

    pub fn set_offset(&self, page: u32, offset: CanvasOffset) -> bool {
        self.registry.set_offset(page, offset)
    }

    /// Render `page` at the current zoom, superseding any render in flight
    pub async fn render_page(&self, page: u32) -> Result<RenderOutcome, RenderError> {
        let (generation, target) = {
            let mut pages = self.pages.lock();
            let mounted = pages.get_mut(&page).ok_or(RenderError::NotMounted(page))?;
            mounted.generation += 1;
            (mounted.generation, mounted.target)
        };

        let cancel = self.renders.replace(page);
        let scale = self.zoom.get();
        let request = RenderRequest { page, scale, target };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RenderError::Cancelled),
            rendered = self.renderer.render(request, cancel.clone()) => rendered,
        };
        self.renders.release(&page, &cancel);

        let size = match result {
            Ok(size) => size,
            Err(RenderError::Cancelled) => {
                tracing::debug!(page, scale, "render superseded");
                return Ok(RenderOutcome::Superseded);
            }
            Err(err) => {
                tracing::warn!(page, scale, %err, "page render failed");
                return Err(err);
            }
        };

        {
            let mut pages = self.pages.lock();
            match pages.get_mut(&page) {
                Some(mounted) if mounted.generation == generation => mounted.last = Some((scale, size)),
                _ => return Ok(RenderOutcome::Superseded),
            }
        }

        self.apply_pending_fit(scale, size);
        Ok(RenderOutcome::Applied { page, scale, size })
    }

    /// Re-render every mounted page at the current zoom
    pub async fn rescale_all(&self) -> Vec<(u32, Result<RenderOutcome, RenderError>)> {
        let mut results = Vec::new();
        for page in self.mounted_pages() {
            results.push((page, self.render_page(page).await));
        }
        results
    }

    /// Re-render mounted pages whenever the shared zoom changes
    ///
    /// The task ends once the coordinator is dropped.
    pub fn spawn_zoom_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut changes = self.zoom.subscribe();
        let weak = Arc::downgrade(self);

        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let Some(this) = weak.upgrade() else {
                    break;
                };
                let zoom = *changes.borrow_and_update();
                tracing::debug!(zoom, pages = this.mounted_pages().len(), "rescaling mounted pages");

                for page in this.mounted_pages() {
                    let this = Arc::clone(&this);
                    tokio::spawn(async move {
                        if let Err(err) = this.render_page(page).await {
                            tracing::debug!(page, %err, "rescale render dropped");
                        }
                    });
                }
            }
        })
    }

    fn apply_pending_fit(&self, scale: f64, size: RenderedPage) {
        let Some(fit) = self.pending_fit.lock().take() else {
            return;
        };

        let page_width = size.width / scale;
        match fit_width_zoom(fit.container_width_px, page_width, fit.margin_px) {
            Some(zoom) => match self.zoom.request(zoom) {
                Ok(applied) => tracing::info!(zoom = applied, page_width, "fit to width on first load"),
                Err(err) => tracing::warn!(%err, "fit to width rejected"),
            },
            None => tracing::warn!(page_width, container = fit.container_width_px, "cannot fit page to width"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zoom::ZoomBounds;
    use std::time::Duration;

    struct FakeRenderer {
        page_width: f64,
        delay: Duration,
        calls: Mutex<Vec<RenderRequest>>,
    }

    impl FakeRenderer {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self { page_width: 600.0, delay, calls: Mutex::new(Vec::new()) })
        }

        fn scales_for(&self, page: u32) -> Vec<f64> {
            self.calls.lock().iter().filter(|r| r.page == page).map(|r| r.scale).collect()
        }
    }

    #[async_trait]
    impl PageRenderer for FakeRenderer {
        async fn render(
            &self,
            request: RenderRequest,
            cancel: CancellationToken,
        ) -> Result<RenderedPage, RenderError> {
            self.calls.lock().push(request);
            tokio::time::sleep(self.delay).await;
            if cancel.is_cancelled() {
                return Err(RenderError::Cancelled);
            }
            Ok(RenderedPage { width: self.page_width * request.scale, height: 800.0 * request.scale })
        }
    }

    fn coordinator(renderer: Arc<FakeRenderer>) -> Arc<PageRenderCoordinator> {
        let zoom = ZoomLevel::new(1.0, ZoomBounds::default()).unwrap();
        Arc::new(PageRenderCoordinator::new(renderer, zoom, PageRegistry::new()))
    }

    fn blank(page: u32) -> Arc<TokenIndex> {
        Arc::new(TokenIndex::unavailable(page))
    }

    #[tokio::test]
    async fn test_mount_registers_mapper_and_renders() {
        let renderer = FakeRenderer::new(Duration::ZERO);
        let coordinator = coordinator(renderer.clone());

        let outcome = coordinator.mount(blank(2), CanvasOffset::new(0.0, 1600.0), RenderTarget(7)).await.unwrap();

        assert!(matches!(outcome, RenderOutcome::Applied { page: 2, scale, .. } if scale == 1.0));
        assert_eq!(coordinator.registry().get(2).unwrap().offset(), CanvasOffset::new(0.0, 1600.0));
        assert_eq!(renderer.calls.lock()[0].target, RenderTarget(7));
    }

    #[tokio::test]
    async fn test_newer_render_supersedes_in_flight_one() {
        let renderer = FakeRenderer::new(Duration::from_millis(30));
        let coordinator = coordinator(renderer.clone());
        coordinator.mount(blank(0), CanvasOffset::default(), RenderTarget(0)).await.unwrap();

        let first = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.render_page(0).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        coordinator.zoom().request(2.0).unwrap();
        let second = coordinator.render_page(0).await.unwrap();

        assert_eq!(first.await.unwrap().unwrap(), RenderOutcome::Superseded);
        assert!(matches!(second, RenderOutcome::Applied { scale, .. } if scale == 2.0));
        assert_eq!(coordinator.last_render(0).map(|(scale, _)| scale), Some(2.0));
    }

    #[tokio::test]
    async fn test_render_of_unmounted_page_fails() {
        let coordinator = coordinator(FakeRenderer::new(Duration::ZERO));
        coordinator.mount(blank(1), CanvasOffset::default(), RenderTarget(1)).await.unwrap();

        assert!(coordinator.unmount(1));
        assert!(coordinator.registry().get(1).is_none());
        assert_eq!(coordinator.render_page(1).await, Err(RenderError::NotMounted(1)));
    }

    #[tokio::test]
    async fn test_first_load_fits_page_to_width() {
        let coordinator = coordinator(FakeRenderer::new(Duration::ZERO));
        coordinator.fit_width_on_first_load(FitWidth { container_width_px: 1240.0, margin_px: 20.0 });

        coordinator.mount(blank(0), CanvasOffset::default(), RenderTarget(0)).await.unwrap();
        assert_eq!(coordinator.zoom().get(), 2.0);

        // Only the first load fits
        coordinator.zoom().request(1.0).unwrap();
        coordinator.mount(blank(1), CanvasOffset::default(), RenderTarget(1)).await.unwrap();
        assert_eq!(coordinator.zoom().get(), 1.0);
    }

    #[tokio::test]
    async fn test_zoom_change_rerenders_mounted_pages() {
        let renderer = FakeRenderer::new(Duration::ZERO);
        let coordinator = coordinator(renderer.clone());
        coordinator.mount(blank(0), CanvasOffset::default(), RenderTarget(0)).await.unwrap();
        coordinator.mount(blank(1), CanvasOffset::default(), RenderTarget(1)).await.unwrap();

        let listener = coordinator.spawn_zoom_listener();
        coordinator.zoom().request(1.5).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(renderer.scales_for(0), vec![1.0, 1.5]);
        assert_eq!(renderer.scales_for(1), vec![1.0, 1.5]);
        assert_eq!(coordinator.last_render(1).map(|(scale, _)| scale), Some(1.5));

        listener.abort();
    }

    #[tokio::test]
    async fn test_rescale_all_reports_every_page() {
        let coordinator = coordinator(FakeRenderer::new(Duration::ZERO));
        coordinator.mount(blank(0), CanvasOffset::default(), RenderTarget(0)).await.unwrap();
        coordinator.mount(blank(3), CanvasOffset::default(), RenderTarget(3)).await.unwrap();

        coordinator.zoom().request(0.5).unwrap();
        let results = coordinator.rescale_all().await;

        let pages: Vec<u32> = results.iter().map(|(page, _)| *page).collect();
        assert_eq!(pages, vec![0, 3]);
        assert!(results.iter().all(|(_, r)| matches!(r, Ok(RenderOutcome::Applied { .. }))));
    }
}
