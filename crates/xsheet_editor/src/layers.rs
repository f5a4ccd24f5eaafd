// SPDX-License-Identifier: MIT OR Apache-2.0
//! Paint layer stack.
//!
//! A tree of raster layers and groups addressed by paths of child indices
//! from the root. Raster layers carry an RGBA buffer; cels on the timeline
//! are the [`LayerId`] of such layers.

use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use thiserror::Error;
use xsheet_timeline::{LayerId, DEFAULT_COMPOSITE};

/// Path of child indices from the root
pub type LayerPath = Vec<usize>;

/// Layer stack errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayerStackError {
    /// Path does not address a slot in a group
    #[error("Invalid layer path: {0:?}")]
    InvalidPath(LayerPath),

    /// No layer with this id
    #[error("Layer not found: {0}")]
    NotFound(LayerId),
}

/// Result type for layer stack operations
pub type Result<T> = std::result::Result<T, LayerStackError>;

/// Pixel rectangle in canvas coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Width
    pub w: u32,
    /// Height
    pub h: u32,
}

impl Rect {
    /// Whether the rectangle covers no pixel
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }
}

/// Pixel content of a raster layer
#[derive(Debug, Clone, PartialEq)]
pub struct RasterLayer {
    /// RGBA buffer, canvas sized
    pub pixels: RgbaImage,
}

impl RasterLayer {
    /// Transparent buffer of the given size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
        }
    }

    /// Bounding box of every pixel with non-zero alpha
    pub fn pixel_bbox(&self) -> Rect {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, pixel) in self.pixels.enumerate_pixels() {
            if pixel.0[3] == 0 {
                continue;
            }
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
        match bounds {
            Some((x0, y0, x1, y1)) => Rect {
                x: x0,
                y: y0,
                w: x1 - x0 + 1,
                h: y1 - y0 + 1,
            },
            None => Rect::default(),
        }
    }

    /// Whether every pixel is fully transparent
    pub fn is_blank(&self) -> bool {
        self.pixels.pixels().all(|p| p.0[3] == 0)
    }

    /// Composite this layer over `dst` (source-over)
    pub fn merge_into(&self, dst: &mut RasterLayer) {
        image::imageops::overlay(&mut dst.pixels, &self.pixels, 0, 0);
    }

    /// Fill a rectangle with one colour
    pub fn fill_rect(&mut self, rect: Rect, colour: Rgba<u8>) {
        let (width, height) = self.pixels.dimensions();
        for y in rect.y..(rect.y + rect.h).min(height) {
            for x in rect.x..(rect.x + rect.w).min(width) {
                self.pixels.put_pixel(x, y, colour);
            }
        }
    }
}

/// What a node holds
#[derive(Debug, Clone, PartialEq)]
pub enum LayerContent {
    /// Paintable pixels
    Raster(RasterLayer),
    /// Child nodes, topmost first
    Group(Vec<LayerNode>),
}

/// One node of the layer tree
#[derive(Debug, Clone, PartialEq)]
pub struct LayerNode {
    /// Stable identity
    pub id: LayerId,
    /// Display name
    pub name: String,
    /// Whether the node is shown
    pub visible: bool,
    /// Node opacity (0..1)
    pub opacity: f32,
    /// Composite operation name
    pub composite: String,
    /// Pixels or children
    pub content: LayerContent,
}

impl LayerNode {
    /// New transparent raster layer
    pub fn raster(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self::with_content(name, LayerContent::Raster(RasterLayer::new(width, height)))
    }

    /// New empty group
    pub fn group(name: impl Into<String>) -> Self {
        Self::with_content(name, LayerContent::Group(Vec::new()))
    }

    fn with_content(name: impl Into<String>, content: LayerContent) -> Self {
        Self {
            id: LayerId::new(),
            name: name.into(),
            visible: true,
            opacity: 1.0,
            composite: DEFAULT_COMPOSITE.to_string(),
            content,
        }
    }

    /// Whether this node is a group
    pub fn is_group(&self) -> bool {
        matches!(self.content, LayerContent::Group(_))
    }

    /// Whether this node is a raster layer
    pub fn is_raster(&self) -> bool {
        matches!(self.content, LayerContent::Raster(_))
    }

    /// Raster content
    pub fn as_raster(&self) -> Option<&RasterLayer> {
        match &self.content {
            LayerContent::Raster(raster) => Some(raster),
            LayerContent::Group(_) => None,
        }
    }

    /// Mutable raster content
    pub fn as_raster_mut(&mut self) -> Option<&mut RasterLayer> {
        match &mut self.content {
            LayerContent::Raster(raster) => Some(raster),
            LayerContent::Group(_) => None,
        }
    }

    /// Children of a group
    pub fn children(&self) -> Option<&[LayerNode]> {
        match &self.content {
            LayerContent::Group(children) => Some(children),
            LayerContent::Raster(_) => None,
        }
    }

    /// Mutable children of a group
    pub fn children_mut(&mut self) -> Option<&mut Vec<LayerNode>> {
        match &mut self.content {
            LayerContent::Group(children) => Some(children),
            LayerContent::Raster(_) => None,
        }
    }

    /// Deep copy with fresh ids throughout
    pub fn duplicate(&self) -> LayerNode {
        let mut copy = self.clone();
        copy.refresh_ids();
        copy
    }

    fn refresh_ids(&mut self) {
        self.id = LayerId::new();
        if let Some(children) = self.children_mut() {
            for child in children {
                child.refresh_ids();
            }
        }
    }

    /// Bounding box of the painted pixels below this node
    pub fn pixel_bbox(&self) -> Rect {
        match &self.content {
            LayerContent::Raster(raster) => raster.pixel_bbox(),
            LayerContent::Group(children) => children
                .iter()
                .map(LayerNode::pixel_bbox)
                .filter(|r| !r.is_empty())
                .reduce(union)
                .unwrap_or_default(),
        }
    }
}

fn union(a: Rect, b: Rect) -> Rect {
    let x0 = a.x.min(b.x);
    let y0 = a.y.min(b.y);
    let x1 = (a.x + a.w).max(b.x + b.w);
    let y1 = (a.y + a.h).max(b.y + b.h);
    Rect {
        x: x0,
        y: y0,
        w: x1 - x0,
        h: y1 - y0,
    }
}

/// Structure-only copy of a subtree, used to restore a reordering
#[derive(Debug, Clone, PartialEq)]
pub enum Arrangement {
    /// A raster layer and the name it had
    Layer {
        /// Layer identity
        id: LayerId,
        /// Name at snapshot time
        name: String,
    },
    /// A group with its properties and children
    Group {
        /// Group identity
        id: LayerId,
        /// Name at snapshot time
        name: String,
        /// Visibility at snapshot time
        visible: bool,
        /// Opacity at snapshot time
        opacity: f32,
        /// Composite operation
        composite: String,
        /// Child arrangement
        children: Vec<Arrangement>,
    },
}

/// The document's layer tree
#[derive(Debug, Clone, PartialEq)]
pub struct LayerStack {
    root: Vec<LayerNode>,
    current_path: LayerPath,
    width: u32,
    height: u32,
}

impl LayerStack {
    /// Stack with one empty raster layer
    pub fn new(width: u32, height: u32) -> Self {
        Self::from_nodes(width, height, vec![LayerNode::raster("Layer 1", width, height)])
    }

    /// Stack holding `nodes` at the root
    pub fn from_nodes(width: u32, height: u32, nodes: Vec<LayerNode>) -> Self {
        let current_path = if nodes.is_empty() { Vec::new() } else { vec![0] };
        Self {
            root: nodes,
            current_path,
            width,
            height,
        }
    }

    /// Canvas size
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// New transparent raster layer sized to the canvas (not inserted)
    pub fn new_raster(&self, name: impl Into<String>) -> LayerNode {
        LayerNode::raster(name, self.width, self.height)
    }

    /// Root nodes, topmost first
    pub fn root(&self) -> &[LayerNode] {
        &self.root
    }

    // ---- path addressing ----

    /// Node at `path`
    pub fn deep_get(&self, path: &[usize]) -> Option<&LayerNode> {
        let (first, rest) = path.split_first()?;
        let mut node = self.root.get(*first)?;
        for idx in rest {
            node = node.children()?.get(*idx)?;
        }
        Some(node)
    }

    /// Mutable node at `path`
    pub fn deep_get_mut(&mut self, path: &[usize]) -> Option<&mut LayerNode> {
        let (first, rest) = path.split_first()?;
        let mut node = self.root.get_mut(*first)?;
        for idx in rest {
            node = node.children_mut()?.get_mut(*idx)?;
        }
        Some(node)
    }

    fn container_mut(&mut self, parent: &[usize]) -> Option<&mut Vec<LayerNode>> {
        if parent.is_empty() {
            return Some(&mut self.root);
        }
        self.deep_get_mut(parent)?.children_mut()
    }

    /// Insert `node` at `path`; the last index is clamped to the group size.
    ///
    /// Returns the path the node ended up at.
    pub fn deep_insert(&mut self, path: &[usize], node: LayerNode) -> Result<LayerPath> {
        let (last, parent) = path
            .split_last()
            .ok_or_else(|| LayerStackError::InvalidPath(path.to_vec()))?;
        let container = self
            .container_mut(parent)
            .ok_or_else(|| LayerStackError::InvalidPath(path.to_vec()))?;
        let idx = (*last).min(container.len());
        container.insert(idx, node);
        let mut result = parent.to_vec();
        result.push(idx);
        Ok(result)
    }

    /// Remove and return the node at `path`
    pub fn deep_pop(&mut self, path: &[usize]) -> Option<LayerNode> {
        let (last, parent) = path.split_last()?;
        let container = self.container_mut(parent)?;
        if *last >= container.len() {
            return None;
        }
        let node = container.remove(*last);
        self.fix_current_path();
        Some(node)
    }

    /// Swap the node at `path` for `node`, returning the old one
    pub fn replace(&mut self, path: &[usize], node: LayerNode) -> Option<LayerNode> {
        let slot = self.deep_get_mut(path)?;
        Some(std::mem::replace(slot, node))
    }

    /// Path of the node with `id` (depth first)
    pub fn deep_index(&self, id: LayerId) -> Option<LayerPath> {
        fn search(nodes: &[LayerNode], id: LayerId, path: &mut LayerPath) -> bool {
            for (i, node) in nodes.iter().enumerate() {
                path.push(i);
                if node.id == id {
                    return true;
                }
                if let Some(children) = node.children() {
                    if search(children, id, path) {
                        return true;
                    }
                }
                path.pop();
            }
            false
        }
        let mut path = Vec::new();
        search(&self.root, id, &mut path).then_some(path)
    }

    /// Node with `id`
    pub fn get(&self, id: LayerId) -> Option<&LayerNode> {
        let path = self.deep_index(id)?;
        self.deep_get(&path)
    }

    /// Mutable node with `id`
    pub fn get_mut(&mut self, id: LayerId) -> Option<&mut LayerNode> {
        let path = self.deep_index(id)?;
        self.deep_get_mut(&path)
    }

    /// Whether a node with `id` is in the stack
    pub fn contains(&self, id: LayerId) -> bool {
        self.deep_index(id).is_some()
    }

    /// Detach the node with `id`, returning where it was
    pub fn remove(&mut self, id: LayerId) -> Option<(LayerPath, LayerNode)> {
        let path = self.deep_index(id)?;
        let node = self.deep_pop(&path)?;
        Some((path, node))
    }

    /// Put `node` on top of the root
    pub fn append(&mut self, node: LayerNode) -> LayerPath {
        self.root.push(node);
        vec![self.root.len() - 1]
    }

    /// Insert at the current selection, or on top when nothing is selected
    pub fn insert_at_current(&mut self, node: LayerNode) -> Result<LayerPath> {
        if self.deep_get(&self.current_path).is_none() {
            return Ok(self.append(node));
        }
        let path = self.current_path.clone();
        self.deep_insert(&path, node)
    }

    // ---- selection ----

    /// Path of the selected node
    pub fn current_path(&self) -> &[usize] {
        &self.current_path
    }

    /// Select the node at `path`; invalid paths are ignored
    pub fn set_current_path(&mut self, path: &[usize]) -> bool {
        if self.deep_get(path).is_none() {
            return false;
        }
        self.current_path = path.to_vec();
        true
    }

    /// Selected node
    pub fn current_layer(&self) -> Option<&LayerNode> {
        self.deep_get(&self.current_path)
    }

    fn fix_current_path(&mut self) {
        if self.deep_get(&self.current_path).is_some() {
            return;
        }
        let old = std::mem::take(&mut self.current_path);
        let mut path = Vec::with_capacity(old.len());
        let mut nodes: &[LayerNode] = &self.root;
        for idx in old {
            if nodes.is_empty() {
                break;
            }
            let idx = idx.min(nodes.len() - 1);
            path.push(idx);
            match nodes[idx].children() {
                Some(children) => nodes = children,
                None => break,
            }
        }
        self.current_path = path;
    }

    // ---- flat views ----

    /// Ids of every raster layer, depth first
    pub fn raster_ids(&self) -> Vec<LayerId> {
        fn walk(nodes: &[LayerNode], out: &mut Vec<LayerId>) {
            for node in nodes {
                match &node.content {
                    LayerContent::Raster(_) => out.push(node.id),
                    LayerContent::Group(children) => walk(children, out),
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.root, &mut out);
        out
    }

    /// Number of raster layers
    pub fn raster_count(&self) -> usize {
        self.raster_ids().len()
    }

    /// Drop every empty group whose id is not in `keep`
    pub fn prune_empty_groups(&mut self, keep: &[LayerId]) -> usize {
        fn prune(nodes: &mut Vec<LayerNode>, keep: &[LayerId]) -> usize {
            let mut removed = 0;
            for node in nodes.iter_mut() {
                if let Some(children) = node.children_mut() {
                    removed += prune(children, keep);
                }
            }
            let before = nodes.len();
            nodes.retain(|node| {
                !(node.children().map_or(false, <[LayerNode]>::is_empty) && !keep.contains(&node.id))
            });
            removed + before - nodes.len()
        }
        let removed = prune(&mut self.root, keep);
        if removed > 0 {
            self.fix_current_path();
        }
        removed
    }

    // ---- arrangement ----

    /// Snapshot of the tree structure and names
    pub fn arrangement(&self) -> Vec<Arrangement> {
        fn snapshot(nodes: &[LayerNode]) -> Vec<Arrangement> {
            nodes
                .iter()
                .map(|node| match &node.content {
                    LayerContent::Raster(_) => Arrangement::Layer {
                        id: node.id,
                        name: node.name.clone(),
                    },
                    LayerContent::Group(children) => Arrangement::Group {
                        id: node.id,
                        name: node.name.clone(),
                        visible: node.visible,
                        opacity: node.opacity,
                        composite: node.composite.clone(),
                        children: snapshot(children),
                    },
                })
                .collect()
        }
        snapshot(&self.root)
    }

    /// Rebuild the tree from a snapshot, keeping the current raster layers.
    ///
    /// Raster layers absent from the snapshot end up on top of the root.
    pub fn restore(&mut self, arrangement: &[Arrangement]) {
        fn collect(nodes: Vec<LayerNode>, pool: &mut HashMap<LayerId, LayerNode>, order: &mut Vec<LayerId>) {
            for node in nodes {
                match node.content {
                    LayerContent::Group(children) => collect(children, pool, order),
                    LayerContent::Raster(_) => {
                        order.push(node.id);
                        pool.insert(node.id, node);
                    }
                }
            }
        }
        fn build(items: &[Arrangement], pool: &mut HashMap<LayerId, LayerNode>) -> Vec<LayerNode> {
            let mut nodes = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Arrangement::Layer { id, name } => {
                        if let Some(mut node) = pool.remove(id) {
                            node.name.clone_from(name);
                            nodes.push(node);
                        }
                    }
                    Arrangement::Group {
                        id,
                        name,
                        visible,
                        opacity,
                        composite,
                        children,
                    } => nodes.push(LayerNode {
                        id: *id,
                        name: name.clone(),
                        visible: *visible,
                        opacity: *opacity,
                        composite: composite.clone(),
                        content: LayerContent::Group(build(children, pool)),
                    }),
                }
            }
            nodes
        }

        let mut pool = HashMap::new();
        let mut order = Vec::new();
        collect(std::mem::take(&mut self.root), &mut pool, &mut order);
        self.root = build(arrangement, &mut pool);
        for id in order {
            if let Some(node) = pool.remove(&id) {
                tracing::warn!(layer = %id, "Layer missing from arrangement, placing it on top");
                self.root.push(node);
            }
        }
        self.fix_current_path();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested_stack() -> (LayerStack, LayerId, LayerId, LayerId) {
        let a = LayerNode::raster("a", 4, 4);
        let b = LayerNode::raster("b", 4, 4);
        let c = LayerNode::raster("c", 4, 4);
        let (ia, ib, ic) = (a.id, b.id, c.id);
        let mut group = LayerNode::group("g");
        group.children_mut().unwrap().extend([b, c]);
        (LayerStack::from_nodes(4, 4, vec![a, group]), ia, ib, ic)
    }

    #[test]
    fn test_deep_index_and_get() {
        let (stack, a, b, c) = nested_stack();
        assert_eq!(stack.deep_index(a), Some(vec![0]));
        assert_eq!(stack.deep_index(b), Some(vec![1, 0]));
        assert_eq!(stack.deep_index(c), Some(vec![1, 1]));
        assert_eq!(stack.deep_get(&[1, 1]).unwrap().name, "c");
        assert!(stack.deep_get(&[0, 0]).is_none());
        assert_eq!(stack.raster_ids(), vec![a, b, c]);
    }

    #[test]
    fn test_insert_and_pop() {
        let (mut stack, a, _, _) = nested_stack();
        let d = LayerNode::raster("d", 4, 4);
        let id = d.id;
        let path = stack.deep_insert(&[1, 9], d).unwrap();
        assert_eq!(path, vec![1, 2]);
        assert_eq!(stack.deep_index(id), Some(vec![1, 2]));

        assert!(stack.deep_insert(&[0, 0], LayerNode::raster("x", 4, 4)).is_err());

        let (path, node) = stack.remove(a).unwrap();
        assert_eq!(path, vec![0]);
        assert_eq!(node.name, "a");
        assert_eq!(stack.deep_index(id), Some(vec![0, 2]));
    }

    #[test]
    fn test_current_path_survives_removal() {
        let (mut stack, _, _, c) = nested_stack();
        assert!(stack.set_current_path(&[1, 1]));
        stack.remove(c);
        assert_eq!(stack.current_path(), &[1, 0]);
        assert!(!stack.set_current_path(&[5]));
    }

    #[test]
    fn test_pixel_bbox_and_merge() {
        let mut top = RasterLayer::new(8, 8);
        top.fill_rect(Rect { x: 2, y: 3, w: 2, h: 1 }, Rgba([255, 0, 0, 255]));
        assert_eq!(top.pixel_bbox(), Rect { x: 2, y: 3, w: 2, h: 1 });

        let mut bottom = RasterLayer::new(8, 8);
        assert!(bottom.is_blank());
        assert!(bottom.pixel_bbox().is_empty());
        top.merge_into(&mut bottom);
        assert_eq!(bottom.pixels.get_pixel(2, 3), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_arrangement_restore() {
        let (mut stack, a, b, _) = nested_stack();
        let snapshot = stack.arrangement();

        let (_, node) = stack.remove(b).unwrap();
        stack.append(node);
        stack.deep_get_mut(&[0]).unwrap().name = "renamed".into();
        assert_ne!(stack.arrangement(), snapshot);

        stack.restore(&snapshot);
        assert_eq!(stack.arrangement(), snapshot);
        assert_eq!(stack.get(a).unwrap().name, "a");
        assert_eq!(stack.deep_index(b), Some(vec![1, 0]));
    }

    #[test]
    fn test_prune_empty_groups() {
        let mut stack = LayerStack::new(4, 4);
        let keep = LayerNode::group("keep");
        let keep_id = keep.id;
        stack.append(keep);
        stack.append(LayerNode::group("drop"));
        assert_eq!(stack.prune_empty_groups(&[keep_id]), 1);
        assert_eq!(stack.root().len(), 2);
    }

    #[test]
    fn test_duplicate_gives_fresh_ids() {
        let (stack, _, _, _) = nested_stack();
        let group = stack.deep_get(&[1]).unwrap();
        let copy = group.duplicate();
        assert_ne!(copy.id, group.id);
        assert_ne!(copy.children().unwrap()[0].id, group.children().unwrap()[0].id);
        assert_eq!(copy.children().unwrap()[0].as_raster(), group.children().unwrap()[0].as_raster());
    }
}
