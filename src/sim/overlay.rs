use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use crate::overlay::{OverlayHost, OverlayId, OverlayKind, OverlayView};

/// Overlay host that keeps mounted views in memory
#[derive(Default)]
pub struct RecordingHost {
    views: RefCell<BTreeMap<OverlayId, OverlayView>>,
    next_id: Cell<u64>,
    mounts: Cell<usize>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self, id: OverlayId) -> Option<OverlayView> {
        self.views.borrow().get(&id).cloned()
    }

    /// Mounted views of one kind, in mount order
    pub fn of_kind(&self, kind: OverlayKind) -> Vec<OverlayView> {
        self.views
            .borrow()
            .values()
            .filter(|view| view.kind == kind)
            .cloned()
            .collect()
    }

    /// Text of every mounted, visible view
    pub fn visible_texts(&self) -> Vec<String> {
        self.views
            .borrow()
            .values()
            .filter(|view| view.placement.is_visible())
            .map(|view| view.text.clone())
            .collect()
    }

    pub fn mounted(&self) -> usize {
        self.views.borrow().len()
    }

    /// Total mounts ever made
    pub fn mount_count(&self) -> usize {
        self.mounts.get()
    }
}

impl OverlayHost for RecordingHost {
    fn mount(&self, view: &OverlayView) -> OverlayId {
        let id = OverlayId(self.next_id.get() + 1);
        self.next_id.set(id.0);
        self.views.borrow_mut().insert(id, view.clone());
        self.mounts.set(self.mounts.get() + 1);
        id
    }

    fn update(&self, id: OverlayId, view: &OverlayView) {
        if let Some(existing) = self.views.borrow_mut().get_mut(&id) {
            *existing = view.clone();
        }
    }

    fn unmount(&self, id: OverlayId) {
        self.views.borrow_mut().remove(&id);
    }
}
