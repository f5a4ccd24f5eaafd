// SPDX-License-Identifier: MIT OR Apache-2.0
//! Mutable animation state shared by every command.

use crate::layers::{LayerNode, LayerPath, LayerStack, Rect};
use std::fmt;
use xsheet_timeline::{LayerId, TimeLine};

/// Name given to layers synthesized to keep the stack drawable
pub const REPLACEMENT_LAYER_NAME: &str = "Layer";

/// Document-changed callback
pub type DocumentObserver = Box<dyn FnMut() + Send>;

/// Canvas-region-changed callback
pub type CanvasObserver = Box<dyn FnMut(Rect) + Send>;

/// Observer lists notified after state changes
#[derive(Default)]
pub struct Observers {
    document: Vec<DocumentObserver>,
    canvas: Vec<CanvasObserver>,
}

impl Observers {
    /// Register a document-changed callback
    pub fn on_document(&mut self, observer: DocumentObserver) {
        self.document.push(observer);
    }

    /// Register a canvas-area callback
    pub fn on_canvas(&mut self, observer: CanvasObserver) {
        self.canvas.push(observer);
    }

    /// Fire the document-changed callbacks
    pub fn notify_document(&mut self) {
        for observer in &mut self.document {
            observer();
        }
    }

    /// Fire the canvas-area callbacks
    pub fn notify_canvas(&mut self, rect: Rect) {
        for observer in &mut self.canvas {
            observer(rect);
        }
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("document", &self.document.len())
            .field("canvas", &self.canvas.len())
            .finish()
    }
}

/// Timeline plus the layer stack it refers to
#[derive(Debug)]
pub struct AnimationState {
    /// The exposure sheet
    pub timeline: TimeLine,
    /// The document's layers
    pub layers: LayerStack,
    /// Registered callbacks
    pub observers: Observers,
    /// Set when structural edits invalidate cached presentation
    pub cleared: bool,
}

impl AnimationState {
    /// Wrap a timeline and a layer stack
    pub fn new(timeline: TimeLine, layers: LayerStack) -> Self {
        Self {
            timeline,
            layers,
            observers: Observers::default(),
            cleared: false,
        }
    }

    /// Push the onion-skin opacities onto the cel layers
    pub fn update_opacities(&mut self) {
        let opacities = self.timeline.get_opacities();
        for (cel, opacity, visible) in opacities.iter() {
            let Some(node) = self.layers.get_mut(cel) else {
                continue;
            };
            node.opacity = opacity;
            node.visible = visible;
            let rect = node.pixel_bbox();
            self.observers.notify_canvas(rect);
        }
    }

    /// Hide every cel layer
    pub fn hide_all_frames(&mut self) {
        for cel in self.timeline.all_cels() {
            self.set_cel_visibility(cel, false, None);
        }
    }

    /// Hide every cel except the ones shown at `idx`
    pub fn show_only_frame(&mut self, idx: i64) {
        self.hide_all_frames();
        for cel in self.timeline.cels_at(idx) {
            self.set_cel_visibility(cel, true, Some(1.0));
        }
    }

    /// Swap visibility from the cels at `prev` to the cels at `current`
    pub fn change_visible_frame(&mut self, prev: i64, current: i64) {
        let changes: Vec<(Option<LayerId>, Option<LayerId>)> = self
            .timeline
            .layers()
            .iter()
            .map(|track| (track.cel_at(prev), track.cel_at(current)))
            .filter(|(before, after)| before != after)
            .collect();
        for (before, after) in changes {
            if let Some(cel) = before {
                self.set_cel_visibility(cel, false, None);
            }
            if let Some(cel) = after {
                self.set_cel_visibility(cel, true, Some(1.0));
            }
        }
    }

    fn set_cel_visibility(&mut self, cel: LayerId, visible: bool, opacity: Option<f32>) {
        let Some(node) = self.layers.get_mut(cel) else {
            return;
        };
        node.visible = visible;
        if let Some(opacity) = opacity {
            node.opacity = opacity;
        }
        let rect = node.pixel_bbox();
        self.observers.notify_canvas(rect);
    }

    /// Fire the document-changed callbacks
    pub fn notify_document(&mut self) {
        self.observers.notify_document();
    }

    /// Put a detached layer back where it was
    pub fn reattach(&mut self, path: &[usize], node: LayerNode) -> crate::layers::Result<LayerPath> {
        self.layers.deep_insert(path, node)
    }
}

/// A layer synthesized so the stack never runs out of raster layers.
///
/// Holds the node between undo and redo so its identity is stable.
#[derive(Debug, Default)]
pub(crate) struct Replacement {
    id: Option<LayerId>,
    held: Option<LayerNode>,
}

impl Replacement {
    /// Insert the replacement on top of the stack and select it
    pub(crate) fn insert(&mut self, state: &mut AnimationState) -> LayerId {
        let node = self
            .held
            .take()
            .unwrap_or_else(|| state.layers.new_raster(REPLACEMENT_LAYER_NAME));
        let id = node.id;
        let path = state.layers.append(node);
        state.layers.set_current_path(&path);
        tracing::debug!(layer = %id, "Inserted replacement layer");
        self.id = Some(id);
        id
    }

    /// Insert only when the stack has no raster layer left
    pub(crate) fn insert_if_needed(&mut self, state: &mut AnimationState) -> Option<LayerId> {
        (state.layers.raster_count() == 0).then(|| self.insert(state))
    }

    /// Take the replacement back out, if one was inserted
    pub(crate) fn remove(&mut self, state: &mut AnimationState) {
        if let Some(id) = self.id.take() {
            if let Some((_, node)) = state.layers.remove(id) {
                self.held = Some(node);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use xsheet_timeline::Frame;

    fn state_with_cels() -> (AnimationState, LayerId, LayerId) {
        let a = LayerNode::raster("a", 4, 4);
        let b = LayerNode::raster("b", 4, 4);
        let (ia, ib) = (a.id, b.id);
        let mut timeline = TimeLine::new();
        timeline.layer_mut().set(0, Frame::with_cel(ia));
        timeline.layer_mut().set(1, Frame::with_cel(ib));
        (AnimationState::new(timeline, LayerStack::from_nodes(4, 4, vec![a, b])), ia, ib)
    }

    #[test]
    fn test_update_opacities_applies_to_layers() {
        let (mut state, a, b) = state_with_cels();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        state.observers.on_canvas(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        state.update_opacities();
        assert_eq!(state.layers.get(a).unwrap().opacity, 1.0);
        assert_eq!(state.layers.get(b).unwrap().opacity, 0.5);
        assert!(state.layers.get(b).unwrap().visible);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_change_visible_frame() {
        let (mut state, a, b) = state_with_cels();
        state.hide_all_frames();
        assert!(!state.layers.get(a).unwrap().visible);

        state.change_visible_frame(0, 1);
        assert!(!state.layers.get(a).unwrap().visible);
        assert!(state.layers.get(b).unwrap().visible);
        assert_eq!(state.layers.get(b).unwrap().opacity, 1.0);
    }

    #[test]
    fn test_replacement_keeps_identity() {
        let mut state = AnimationState::new(TimeLine::new(), LayerStack::from_nodes(4, 4, Vec::new()));
        let mut replacement = Replacement::default();
        let id = replacement.insert_if_needed(&mut state).unwrap();
        assert!(replacement.insert_if_needed(&mut state).is_none());

        replacement.remove(&mut state);
        assert_eq!(state.layers.raster_count(), 0);
        assert_eq!(replacement.insert(&mut state), id);
    }
}
