//! Shared registry of mounted page mappers
//!
//! A page registers its mapper when it mounts and removes it when it
//! unmounts. Pointer handling and annotation drawing look mappers up here
//! instead of reaching into page renderers.

use crate::mapper::{CanvasOffset, PageCoordinateMapper};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct PageRegistry {
    pages: Arc<RwLock<BTreeMap<u32, PageCoordinateMapper>>>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mapper, replacing any previous one for the same page
    pub fn register(&self, mapper: PageCoordinateMapper) {
        let page = mapper.page();
        self.pages.write().insert(page, mapper);
    }

    pub fn unregister(&self, page: u32) -> Option<PageCoordinateMapper> {
        self.pages.write().remove(&page)
    }

    pub fn get(&self, page: u32) -> Option<PageCoordinateMapper> {
        self.pages.read().get(&page).cloned()
    }

    pub fn contains(&self, page: u32) -> bool {
        self.pages.read().contains_key(&page)
    }

    /// Update a mounted page's canvas offset; `false` if the page is not mounted
    pub fn set_offset(&self, page: u32, offset: CanvasOffset) -> bool {
        match self.pages.write().get_mut(&page) {
            Some(mapper) => {
                mapper.set_offset(offset);
                true
            }
            None => false,
        }
    }

    /// Mounted page numbers, ascending
    pub fn pages(&self) -> Vec<u32> {
        self.pages.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.pages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.read().is_empty()
    }

    pub fn clear(&self) {
        self.pages.write().clear();
    }
}
