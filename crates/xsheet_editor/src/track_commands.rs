// SPDX-License-Identifier: MIT OR Apache-2.0
//! Undoable commands acting on whole animated layers (tracks).

use crate::commands::{AnimationCommand, CommandError};
use crate::layers::{Arrangement, LayerNode, LayerPath, LayerStack};
use crate::sort::{sort_layers, SortReport};
use crate::state::{AnimationState, Replacement};
use std::collections::{BTreeSet, HashMap};
use xsheet_timeline::{Frame, FrameList, LayerId, TimeLine};

fn refresh(state: &mut AnimationState) {
    state.cleared = true;
    state.update_opacities();
    state.notify_document();
}

fn detach_orphans(state: &mut AnimationState, cels: &[LayerId]) -> Vec<(LayerPath, LayerNode)> {
    let mut detached = Vec::new();
    for cel in cels {
        if state.timeline.cel_references(*cel) > 0 {
            continue;
        }
        if let Some(entry) = state.layers.remove(*cel) {
            detached.push(entry);
        }
    }
    detached
}

fn reattach_all(state: &mut AnimationState, detached: Vec<(LayerPath, LayerNode)>) -> Result<(), CommandError> {
    for (path, node) in detached.into_iter().rev() {
        state.reattach(&path, node)?;
    }
    Ok(())
}

/// Add an empty track
#[derive(Debug)]
pub struct InsertAnimatedLayer {
    idx: usize,
    held: Option<FrameList>,
    inserted_at: Option<usize>,
    prev_layer_idx: usize,
}

impl InsertAnimatedLayer {
    /// Insert a track at `idx`
    pub fn new(idx: usize) -> Self {
        Self {
            idx,
            held: None,
            inserted_at: None,
            prev_layer_idx: 0,
        }
    }
}

impl AnimationCommand for InsertAnimatedLayer {
    fn description(&self) -> &str {
        "Insert Animated Layer"
    }

    fn redo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        self.prev_layer_idx = state.timeline.layer_idx();
        let track = self.held.take().unwrap_or_default();
        let at = state.timeline.insert_layer(self.idx, track);
        state.timeline.select_layer(at)?;
        self.inserted_at = Some(at);
        refresh(state);
        Ok(())
    }

    fn undo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        let Some(at) = self.inserted_at.take() else {
            return Ok(());
        };
        self.held = Some(state.timeline.remove_layer(at)?);
        state.timeline.select_layer(self.prev_layer_idx)?;
        refresh(state);
        Ok(())
    }
}

/// Delete a track and every cel layer only it referred to
#[derive(Debug)]
pub struct RemoveAnimatedLayer {
    idx: usize,
    removed: Option<FrameList>,
    replaced_track: bool,
    detached: Vec<(LayerPath, LayerNode)>,
    replacement: Replacement,
    prev_layer_idx: usize,
}

impl RemoveAnimatedLayer {
    /// Remove the track at `idx`
    pub fn new(idx: usize) -> Self {
        Self {
            idx,
            removed: None,
            replaced_track: false,
            detached: Vec::new(),
            replacement: Replacement::default(),
            prev_layer_idx: 0,
        }
    }
}

impl AnimationCommand for RemoveAnimatedLayer {
    fn description(&self) -> &str {
        "Remove Animated Layer"
    }

    fn redo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        self.prev_layer_idx = state.timeline.layer_idx();
        self.replaced_track = state.timeline.layer_count() == 1;
        let removed = state.timeline.remove_layer(self.idx)?;
        self.detached = detach_orphans(state, &removed.all_cels());
        self.replacement.insert_if_needed(state);
        self.removed = Some(removed);
        refresh(state);
        Ok(())
    }

    fn undo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        let Some(removed) = self.removed.take() else {
            return Ok(());
        };
        self.replacement.remove(state);
        reattach_all(state, std::mem::take(&mut self.detached))?;
        let at = state.timeline.insert_layer(self.idx, removed);
        if self.replaced_track {
            state.timeline.remove_layer(at + 1)?;
        }
        state.timeline.select_layer(self.prev_layer_idx)?;
        refresh(state);
        Ok(())
    }
}

/// Copy a track, giving every cel its own copy of the layer
#[derive(Debug)]
pub struct DuplicateAnimatedLayer {
    idx: usize,
    held: Option<(FrameList, Vec<LayerNode>)>,
    inserted: Vec<LayerId>,
    prev_layer_idx: usize,
    applied: bool,
}

impl DuplicateAnimatedLayer {
    /// Duplicate the track at `idx`; the copy lands right after it
    pub fn new(idx: usize) -> Self {
        Self {
            idx,
            held: None,
            inserted: Vec::new(),
            prev_layer_idx: 0,
            applied: false,
        }
    }

    fn build(&self, state: &AnimationState) -> Result<(FrameList, Vec<LayerNode>), CommandError> {
        let source = state.timeline.get_layer(self.idx)?;
        let mut copies: HashMap<LayerId, LayerId> = HashMap::new();
        let mut nodes = Vec::new();
        for cel in source.all_cels() {
            let Some(node) = state.layers.get(cel) else {
                tracing::warn!(layer = %cel, "Cel missing from the layer stack, not duplicated");
                continue;
            };
            let copy = node.duplicate();
            copies.insert(cel, copy.id);
            nodes.push(copy);
        }

        let mut track = FrameList::new(format!("{} copy", source.name));
        track.visible = source.visible;
        track.opacity = source.opacity;
        track.locked = source.locked;
        track.composite.clone_from(&source.composite);
        for (n, frame) in source.iter() {
            let mut frame = frame.clone();
            frame.cel = frame.cel.and_then(|cel| copies.get(&cel).copied());
            track.set(n, frame);
        }
        Ok((track, nodes))
    }
}

impl AnimationCommand for DuplicateAnimatedLayer {
    fn description(&self) -> &str {
        "Duplicate Animated Layer"
    }

    fn redo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        let (track, nodes) = match self.held.take() {
            Some(held) => held,
            None => self.build(state)?,
        };
        self.prev_layer_idx = state.timeline.layer_idx();
        self.inserted = nodes.iter().map(|node| node.id).collect();
        for node in nodes {
            state.layers.insert_at_current(node)?;
        }
        let at = state.timeline.insert_layer(self.idx + 1, track);
        state.timeline.select_layer(at)?;
        self.applied = true;
        refresh(state);
        Ok(())
    }

    fn undo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        if !std::mem::take(&mut self.applied) {
            return Ok(());
        }
        let track = state.timeline.remove_layer(self.idx + 1)?;
        let mut nodes = Vec::with_capacity(self.inserted.len());
        for id in self.inserted.drain(..) {
            let (_, node) = state.layers.remove(id).ok_or(CommandError::LayerNotFound(id))?;
            nodes.push(node);
        }
        self.held = Some((track, nodes));
        state.timeline.select_layer(self.prev_layer_idx)?;
        refresh(state);
        Ok(())
    }
}

/// Move a track to another position
#[derive(Debug)]
pub struct MoveAnimatedLayer {
    from: usize,
    to: usize,
    prev_layer_idx: Option<usize>,
}

impl MoveAnimatedLayer {
    /// Move the track at `from` to `to`
    pub fn new(from: usize, to: usize) -> Self {
        Self {
            from,
            to,
            prev_layer_idx: None,
        }
    }
}

impl AnimationCommand for MoveAnimatedLayer {
    fn description(&self) -> &str {
        "Move Animated Layer"
    }

    fn redo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        let prev = state.timeline.layer_idx();
        state.timeline.move_layer(self.from, self.to)?;
        self.prev_layer_idx = Some(prev);
        refresh(state);
        Ok(())
    }

    fn undo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        let Some(prev) = self.prev_layer_idx.take() else {
            return Ok(());
        };
        state.timeline.move_layer(self.to, self.from)?;
        state.timeline.select_layer(prev)?;
        refresh(state);
        Ok(())
    }
}

/// Combine several tracks into one.
///
/// The merged track has a frame at every index stored on any input. A new
/// composite layer is created only where the combination of input cels
/// changes; inputs are composited bottom to top in track order.
#[derive(Debug)]
pub struct MergeAnimatedLayers {
    tracks: Vec<usize>,
    merged: Option<(FrameList, Vec<LayerNode>)>,
    merged_ids: Vec<LayerId>,
    removed: Vec<FrameList>,
    detached: Vec<(LayerPath, LayerNode)>,
    prev_layer_idx: usize,
}

impl MergeAnimatedLayers {
    /// Merge the tracks at `tracks`
    pub fn new(mut tracks: Vec<usize>) -> Self {
        tracks.sort_unstable();
        tracks.dedup();
        Self {
            tracks,
            merged: None,
            merged_ids: Vec::new(),
            removed: Vec::new(),
            detached: Vec::new(),
            prev_layer_idx: 0,
        }
    }

    /// Tracks being merged, ascending
    pub fn tracks(&self) -> &[usize] {
        &self.tracks
    }
}

/// Build the merged track and its composite layers without touching the state
pub fn merge_tracks(
    timeline: &TimeLine,
    stack: &LayerStack,
    tracks: &[usize],
) -> Result<(FrameList, Vec<LayerNode>), CommandError> {
    let inputs = tracks
        .iter()
        .map(|t| timeline.get_layer(*t))
        .collect::<Result<Vec<_>, _>>()?;
    let indices: BTreeSet<i64> = inputs.iter().flat_map(|track| track.keys()).collect();

    let mut merged = FrameList::new(inputs.first().map(|t| t.name.clone()).unwrap_or_default());
    let mut nodes: Vec<LayerNode> = Vec::new();
    let mut last_combo: Option<Vec<Option<LayerId>>> = None;

    for n in indices {
        let frames: Vec<Option<&Frame>> = inputs.iter().map(|track| track.peek(n)).collect();
        let is_key = frames.iter().flatten().any(|f| f.is_key);
        let skip_visible = frames.iter().all(|f| f.map_or(false, |f| f.skip_visible));
        let description = frames
            .iter()
            .flatten()
            .map(|f| f.description.as_str())
            .filter(|d| !d.is_empty())
            .collect::<Vec<_>>()
            .join(", ");

        let combo: Vec<Option<LayerId>> = inputs.iter().map(|track| track.cel_at(n)).collect();
        let changed = last_combo.as_ref() != Some(&combo);
        let cel = if changed && combo.iter().any(Option::is_some) {
            let mut node = stack.new_raster(crate::sort::generate_layername(0, n, &description));
            if let Some(target) = node.as_raster_mut() {
                for id in combo.iter().flatten() {
                    match stack.get(*id).and_then(LayerNode::as_raster) {
                        Some(source) => source.merge_into(target),
                        None => tracing::warn!(layer = %id, "Cel missing from the layer stack, skipped in merge"),
                    }
                }
            }
            let id = node.id;
            nodes.push(node);
            Some(id)
        } else {
            None
        };
        last_combo = Some(combo);

        merged.set(
            n,
            Frame {
                is_key,
                skip_visible,
                description,
                cel,
            },
        );
    }
    merged.cleanup();
    Ok((merged, nodes))
}

impl AnimationCommand for MergeAnimatedLayers {
    fn description(&self) -> &str {
        "Merge Animated Layers"
    }

    fn redo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        if self.tracks.len() < 2 {
            return Err(CommandError::InvalidOperation(
                "Merging needs at least two animated layers".to_string(),
            ));
        }
        let (track, nodes) = match self.merged.take() {
            Some(merged) => merged,
            None => merge_tracks(&state.timeline, &state.layers, &self.tracks)?,
        };
        let first = self.tracks[0];
        self.prev_layer_idx = state.timeline.layer_idx();

        self.merged_ids = nodes.iter().map(|node| node.id).collect();
        for node in nodes {
            state.layers.append(node);
        }
        state.timeline.insert_layer(first, track);

        self.removed.clear();
        let mut cels = Vec::new();
        for idx in self.tracks.iter().rev() {
            let removed = state.timeline.remove_layer(idx + 1)?;
            cels.extend(removed.all_cels());
            self.removed.push(removed);
        }
        self.removed.reverse();
        self.detached = detach_orphans(state, &cels);

        state.timeline.select_layer(first)?;
        tracing::debug!(tracks = ?self.tracks, layers = self.merged_ids.len(), "Merged animated layers");
        refresh(state);
        Ok(())
    }

    fn undo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        if self.removed.is_empty() {
            return Ok(());
        }
        reattach_all(state, std::mem::take(&mut self.detached))?;
        for (idx, track) in self.tracks.iter().zip(std::mem::take(&mut self.removed)) {
            state.timeline.insert_layer(idx + 1, track);
        }
        let track = state.timeline.remove_layer(self.tracks[0])?;
        let mut nodes = Vec::with_capacity(self.merged_ids.len());
        for id in self.merged_ids.drain(..) {
            let (_, node) = state.layers.remove(id).ok_or(CommandError::LayerNotFound(id))?;
            nodes.push(node);
        }
        self.merged = Some((track, nodes));
        state.timeline.select_layer(self.prev_layer_idx)?;
        refresh(state);
        Ok(())
    }
}

/// Regroup and rename the layer stack after the timeline
#[derive(Debug, Default)]
pub struct SortLayers {
    before: Option<Vec<Arrangement>>,
    prev_path: LayerPath,
    report: Option<SortReport>,
}

impl SortLayers {
    /// Sort on the next redo
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcome of the last redo
    pub fn report(&self) -> Option<&SortReport> {
        self.report.as_ref()
    }
}

impl AnimationCommand for SortLayers {
    fn description(&self) -> &str {
        "Sort Layers"
    }

    fn redo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        self.before = Some(state.layers.arrangement());
        self.prev_path = state.layers.current_path().to_vec();
        self.report = Some(sort_layers(&state.timeline, &mut state.layers)?);
        state.notify_document();
        Ok(())
    }

    fn undo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        if let Some(before) = self.before.take() {
            state.layers.restore(&before);
            state.layers.set_current_path(&self.prev_path);
        }
        state.notify_document();
        Ok(())
    }
}
