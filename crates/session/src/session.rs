//! Open-document session
//!
//! Ties the token layers, the shared zoom, the page render coordinator, the
//! selection machine and the annotation store together for one document at a
//! time. Opening a new document or closing the current one bumps the
//! document generation, so completions belonging to the previous document
//! are dropped.

use crate::api::{AnnotationApi, DocumentInfo, TokenLoader};
use crate::config::ViewerConfig;
use crate::error::{SessionError, SessionResult};
use crate::notify::{Notification, NotificationSink};
use crate::store::AnnotationStore;
use annotator_core::{
    Annotation, AnnotationId, CoreError, Label, LabelId, PageSelection, PdfAnnotations, Permission,
    ScreenBox, SpanDraft, TokenIndex, TokenMatch, VisibilitySettings,
};
use annotator_scheduler::DocumentGeneration;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::task::JoinHandle;
use viewer_core::{
    CanvasOffset, PageRegistry, PageRenderCoordinator, PageRenderer, PointerUp, QueuedSelection,
    RenderOutcome, RenderTarget, SelectionMachine, SelectionPhase, ZoomLevel,
};

/// Settings pushed in by the UI
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSnapshot {
    pub show_structural_only: bool,
    pub show_selected_only: bool,
    pub label_filter: Option<BTreeSet<LabelId>>,
    /// Requested zoom; clamped into the configured bounds
    pub zoom: Option<f64>,
}

impl SettingsSnapshot {
    fn visibility(&self) -> VisibilitySettings {
        VisibilitySettings {
            show_structural_only: self.show_structural_only,
            show_selected_only: self.show_selected_only,
            label_filter: self.label_filter.clone(),
        }
    }
}

/// Result of opening a document
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenSummary {
    pub page_count: u32,
    /// Pages without a token layer; only freeform annotation works there
    pub unavailable_pages: Vec<u32>,
}

pub struct DocumentSession {
    config: ViewerConfig,
    loader: Arc<dyn TokenLoader>,
    sink: Arc<dyn NotificationSink>,
    generation: DocumentGeneration,
    store: AnnotationStore,
    coordinator: Arc<PageRenderCoordinator>,
    document: RwLock<Option<DocumentInfo>>,
    indexes: RwLock<BTreeMap<u32, Arc<TokenIndex>>>,
    selection: Mutex<SelectionMachine>,
    visibility: RwLock<VisibilitySettings>,
    active_label: RwLock<Option<Label>>,
    rescaler: Mutex<Option<JoinHandle<()>>>,
}

impl DocumentSession {
    pub fn new(
        config: ViewerConfig,
        loader: Arc<dyn TokenLoader>,
        api: Arc<dyn AnnotationApi>,
        renderer: Arc<dyn PageRenderer>,
        sink: Arc<dyn NotificationSink>,
    ) -> SessionResult<Self> {
        config.validate()?;
        let zoom = config.zoom_level()?;
        let generation = DocumentGeneration::new();

        Ok(Self {
            store: AnnotationStore::new(api, Arc::clone(&sink), generation.clone()),
            coordinator: Arc::new(PageRenderCoordinator::new(renderer, zoom, PageRegistry::new())),
            config,
            loader,
            sink,
            generation,
            document: RwLock::new(None),
            indexes: RwLock::new(BTreeMap::new()),
            selection: Mutex::new(SelectionMachine::new()),
            visibility: RwLock::new(VisibilitySettings::default()),
            active_label: RwLock::new(None),
            rescaler: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<PageRenderCoordinator> {
        &self.coordinator
    }

    pub fn zoom(&self) -> &ZoomLevel {
        self.coordinator.zoom()
    }

    pub fn document(&self) -> Option<DocumentInfo> {
        self.document.read().clone()
    }

    // ---------------------------------------------------------------------
    // Document lifecycle
    // ---------------------------------------------------------------------

    /// Open `info` with its persisted annotations and load its token layers
    ///
    /// A failed or empty token load does not fail the open: affected pages
    /// fall back to freeform annotation and the sink receives one warning.
    /// With `container_width_px` set the first rendered page is fitted to it.
    pub async fn open(
        &self,
        info: DocumentInfo,
        annotations: PdfAnnotations,
        container_width_px: Option<f64>,
    ) -> SessionResult<OpenSummary> {
        if self.document.read().is_some() {
            self.close();
        }

        let ticket = self.generation.advance();
        self.start_rescaling();
        self.store.load(info.id.clone(), annotations);
        *self.document.write() = Some(info.clone());
        tracing::info!(document = %info.id, pages = info.page_count, "opening document");

        let payload = match self.loader.load_tokens(&info).await {
            Ok(pages) => pages,
            Err(err) => {
                tracing::warn!(document = %info.id, error = %err, "token layer failed to load");
                self.sink.notify(Notification::warning("load token layer", err.message));
                Vec::new()
            }
        };

        if !ticket.is_current() {
            return Err(SessionError::DocumentClosed);
        }

        let mut by_page: BTreeMap<u32, Arc<TokenIndex>> = payload
            .into_iter()
            .filter(|p| p.page < info.page_count)
            .map(|p| (p.page, Arc::new(TokenIndex::from_page_tokens(p))))
            .collect();

        let mut unavailable_pages = Vec::new();
        for page in 0..info.page_count {
            let index = by_page.entry(page).or_insert_with(|| Arc::new(TokenIndex::unavailable(page)));
            if !index.is_available() {
                unavailable_pages.push(page);
            }
        }
        *self.indexes.write() = by_page;

        if !unavailable_pages.is_empty() {
            tracing::warn!(document = %info.id, pages = ?unavailable_pages, "pages without token layer");
            self.sink.notify(Notification::warning(
                "load token layer",
                format!(
                    "{} of {} pages have no text layer; selections there will be freeform",
                    unavailable_pages.len(),
                    info.page_count
                ),
            ));
        }

        if let Some(fit) = container_width_px.and_then(|width| self.config.fit_width(width)) {
            self.coordinator.fit_width_on_first_load(fit);
        }

        Ok(OpenSummary { page_count: info.page_count, unavailable_pages })
    }

    /// Drop every piece of per-document state
    ///
    /// In-flight renders are cancelled and pending remote completions are
    /// discarded when they arrive.
    pub fn close(&self) {
        self.generation.advance();
        self.stop_rescaling();
        self.selection.lock().cancel();
        self.store.reset();
        for page in self.coordinator.mounted_pages() {
            self.coordinator.unmount(page);
        }
        self.indexes.write().clear();

        if let Some(info) = self.document.write().take() {
            tracing::info!(document = %info.id, "document closed");
        }
    }

    /// Re-render mounted pages on every zoom change until the document closes
    fn start_rescaling(&self) {
        let handle = self.coordinator.spawn_zoom_listener();
        if let Some(previous) = self.rescaler.lock().replace(handle) {
            previous.abort();
        }
    }

    fn stop_rescaling(&self) {
        if let Some(handle) = self.rescaler.lock().take() {
            handle.abort();
        }
    }

    // ---------------------------------------------------------------------
    // Pages
    // ---------------------------------------------------------------------

    /// Token layer of `page`; unknown pages get an empty layer
    pub fn index(&self, page: u32) -> Arc<TokenIndex> {
        self.indexes
            .read()
            .get(&page)
            .cloned()
            .unwrap_or_else(|| Arc::new(TokenIndex::unavailable(page)))
    }

    pub async fn mount_page(
        &self,
        page: u32,
        offset: CanvasOffset,
        target: RenderTarget,
    ) -> SessionResult<RenderOutcome> {
        let info = self.document().ok_or(SessionError::NoDocument)?;
        if page >= info.page_count {
            return Err(CoreError::not_found("page", page).into());
        }

        Ok(self.coordinator.mount(self.index(page), offset, target).await?)
    }

    pub fn unmount_page(&self, page: u32) -> bool {
        self.coordinator.unmount(page)
    }

    /// Record where a mounted page's canvas sits relative to the pointer origin
    pub fn set_page_offset(&self, page: u32, offset: CanvasOffset) -> SessionResult<()> {
        if self.coordinator.set_offset(page, offset) {
            Ok(())
        } else {
            Err(SessionError::PageNotMounted(page))
        }
    }

    // ---------------------------------------------------------------------
    // Settings
    // ---------------------------------------------------------------------

    pub fn apply_settings(&self, settings: &SettingsSnapshot) -> SessionResult<()> {
        *self.visibility.write() = settings.visibility();
        if let Some(zoom) = settings.zoom {
            self.zoom().request(zoom)?;
        }
        Ok(())
    }

    pub fn visibility(&self) -> VisibilitySettings {
        self.visibility.read().clone()
    }

    pub fn zoom_in(&self) -> SessionResult<f64> {
        Ok(self.zoom().step(self.config.zoom_step)?)
    }

    pub fn zoom_out(&self) -> SessionResult<f64> {
        Ok(self.zoom().step(1.0 / self.config.zoom_step)?)
    }

    pub fn set_active_label(&self, label: Option<Label>) {
        *self.active_label.write() = label;
    }

    /// Whether the current user may add annotations to the open document
    pub fn can_annotate(&self) -> bool {
        self.document
            .read()
            .as_ref()
            .is_some_and(|info| info.permissions.can(Permission::CanUpdate))
    }

    // ---------------------------------------------------------------------
    // Pointer selection
    // ---------------------------------------------------------------------

    pub fn selection_phase(&self) -> SelectionPhase {
        self.selection.lock().phase().clone()
    }

    pub fn pointer_down(&self, page: u32, at: (f64, f64)) -> SessionResult<()> {
        let can_annotate = self.can_annotate();
        let label = self.active_label.read().clone();
        self.selection.lock().pointer_down(page, at, can_annotate, label.as_ref())?;
        Ok(())
    }

    pub fn pointer_move(&self, at: (f64, f64)) -> Option<ScreenBox> {
        self.selection.lock().pointer_move(at)
    }

    /// Finish a drag on `page`
    ///
    /// Returns the saved annotation when the pointer-up commits the gesture.
    /// The queue is cleared whether or not the commit succeeds.
    pub async fn pointer_up(&self, page: u32, at: (f64, f64), extend: bool) -> SessionResult<Option<Annotation>> {
        let mapper = self.coordinator.registry().get(page).ok_or(SessionError::PageNotMounted(page))?;
        let outcome = self.selection.lock().pointer_up(&mapper, at, extend)?;

        let PointerUp::Commit(queued) = outcome else {
            return Ok(None);
        };

        let committing = CommitGuard(&self.selection);
        let result = self.commit(queued).await;
        drop(committing);
        if let Err(err) = &result {
            tracing::warn!(%err, "selection commit failed");
        }
        result
    }

    pub fn cancel_selection(&self) {
        self.selection.lock().cancel();
    }

    async fn commit(&self, queued: QueuedSelection) -> SessionResult<Option<Annotation>> {
        let pages = queued.boxes.len();
        let Some(annotation) = queued.into_annotation(|page| self.index(page))? else {
            tracing::debug!(pages, "selection covered no tokens");
            return Ok(None);
        };

        self.store.create_annotation(annotation).await.map(Some)
    }

    // ---------------------------------------------------------------------
    // Rendering and search
    // ---------------------------------------------------------------------

    /// Annotations that render on `page` under the current settings
    pub fn visible_annotations(&self, page: u32) -> Vec<Annotation> {
        self.store.visible_on(page, &self.visibility())
    }

    /// Screen rectangles of the visible annotations on a mounted page
    pub fn screen_boxes(&self, page: u32) -> SessionResult<Vec<(AnnotationId, ScreenBox)>> {
        let mapper = self.coordinator.registry().get(page).ok_or(SessionError::PageNotMounted(page))?;

        let mut boxes = Vec::new();
        for annotation in self.visible_annotations(page) {
            if let Some(bounds) = annotation.bounds_on(page) {
                boxes.push((annotation.id, mapper.doc_to_screen(&bounds)?));
            }
        }
        Ok(boxes)
    }

    /// Phrase search over every loaded token layer, in page order
    pub fn search(&self, query: &str, case_sensitive: bool) -> Vec<TokenMatch> {
        self.indexes
            .read()
            .values()
            .flat_map(|index| index.search(query, case_sensitive))
            .collect()
    }

    /// Annotate a search match with the active label
    pub async fn create_from_match(&self, hit: &TokenMatch) -> SessionResult<Annotation> {
        if !self.can_annotate() {
            return Err(SessionError::NotPermitted("update"));
        }
        let label = self
            .active_label
            .read()
            .clone()
            .ok_or(viewer_core::SelectionError::NoActiveLabel)?;

        let index = self.index(hit.page);
        let mut draft = SpanDraft::new(label);
        draft.add_selection(
            &index,
            PageSelection {
                page: hit.page,
                token_ids: hit.token_ids.clone(),
                doc_box: hit.bounds,
                layer: index.status(),
            },
        )?;

        let annotation = draft
            .build(|_, ids| index.bounds_of(ids))
            .ok_or(CoreError::EmptyInput("search match"))?;
        self.store.create_annotation(annotation).await
    }
}

impl Drop for DocumentSession {
    fn drop(&mut self) {
        self.stop_rescaling();
    }
}

/// Leaves `Committing` when dropped, including when the commit future is cancelled
struct CommitGuard<'a>(&'a Mutex<SelectionMachine>);

impl Drop for CommitGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().finish_commit();
    }
}
