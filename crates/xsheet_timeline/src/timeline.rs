// SPDX-License-Identifier: MIT OR Apache-2.0
//! The exposure sheet: tracks, playhead and onion-skin opacities.

use crate::error::{Result, TimelineError};
use crate::frame::{Frame, LayerId};
use crate::frame_list::{Direction, FrameList};
use crate::opacity::{OpacityCategory, OpacityConfig, Opacities};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The timeline containing all the animation data.
///
/// It has no fixed start, end, or length. Each track is a [`FrameList`];
/// the current frame is shared by all tracks. There is always at least
/// one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeLine {
    layers: Vec<FrameList>,
    idx: i64,
    layer_idx: usize,
    /// Onion-skin configuration
    pub opacity: OpacityConfig,
}

impl TimeLine {
    /// Create a timeline with one empty track
    pub fn new() -> Self {
        Self::with_config(OpacityConfig::default())
    }

    /// Create a timeline with one empty track and the given opacity setup
    pub fn with_config(opacity: OpacityConfig) -> Self {
        Self::from_layers(Vec::new(), opacity)
    }

    /// Build a timeline from existing tracks
    pub fn from_layers(mut layers: Vec<FrameList>, opacity: OpacityConfig) -> Self {
        if layers.is_empty() {
            layers.push(FrameList::default());
        }
        Self {
            layers,
            idx: 0,
            layer_idx: 0,
            opacity,
        }
    }

    // ---- playhead ----

    /// Current frame index
    pub fn idx(&self) -> i64 {
        self.idx
    }

    /// Current track index
    pub fn layer_idx(&self) -> usize {
        self.layer_idx
    }

    /// Select frame `n` on every track.
    ///
    /// No clamping happens; the frame is materialized on the current track.
    pub fn select(&mut self, n: i64) {
        self.idx = n;
        self.check();
    }

    /// Move the playhead to `n` without materializing anything.
    ///
    /// Used by playback, which must not leave blank frames behind.
    pub fn seek(&mut self, n: i64) {
        self.idx = n;
    }

    /// Materialize the current frame of the current track
    pub fn check(&mut self) {
        let idx = self.idx;
        self.layer_mut().get_or_create(idx);
    }

    /// Current frame of the current track, if stored
    pub fn selected(&self) -> Option<&Frame> {
        self.layer().peek(self.idx)
    }

    /// Current frame of the current track, materialized on demand
    pub fn selected_mut(&mut self) -> &mut Frame {
        let idx = self.idx;
        self.layer_mut().get_or_create(idx)
    }

    /// Whether `key` lies inside the stored range of `track` as seen from the playhead
    pub fn check_key(&self, key: i64, track: usize) -> bool {
        let Some(layer) = self.layers.get(track) else {
            return false;
        };
        if key < self.idx {
            layer.first().map_or(false, |first| key >= first)
        } else if key > self.idx {
            layer.last().map_or(false, |last| key <= last)
        } else {
            true
        }
    }

    /// Lowest stored frame over all tracks
    pub fn first(&self) -> Option<i64> {
        self.layers.iter().filter_map(FrameList::first).min()
    }

    /// Highest stored frame over all tracks
    pub fn last(&self) -> Option<i64> {
        self.layers.iter().filter_map(FrameList::last).max()
    }

    /// Frame span over all tracks
    pub fn length(&self) -> usize {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => (last - first + 1) as usize,
            _ => 0,
        }
    }

    /// Move one frame forward, or to the next different cel.
    ///
    /// Returns whether the new frame lies outside the stored range of the
    /// current track.
    pub fn goto_next(&mut self, with_cel: bool) -> Result<bool> {
        let target = if with_cel {
            self.next_cel(self.layer_idx).ok_or(TimelineError::NoNextCel)?
        } else {
            self.idx + 1
        };
        Ok(self.jump(target))
    }

    /// Move one frame back, or to the previous different cel
    pub fn goto_previous(&mut self, with_cel: bool) -> Result<bool> {
        let target = if with_cel {
            self.previous_cel(self.layer_idx).ok_or(TimelineError::NoPreviousCel)?
        } else {
            self.idx - 1
        };
        Ok(self.jump(target))
    }

    /// Whether [`Self::goto_next`] has somewhere to go
    pub fn has_next(&self, with_cel: bool) -> bool {
        if with_cel {
            return self.next_cel(self.layer_idx).is_some();
        }
        self.last().map_or(false, |last| self.idx < last)
    }

    /// Whether [`Self::goto_previous`] has somewhere to go
    pub fn has_previous(&self, with_cel: bool) -> bool {
        if with_cel {
            return self.previous_cel(self.layer_idx).is_some();
        }
        self.first().map_or(false, |first| self.idx > first)
    }

    fn jump(&mut self, target: i64) -> bool {
        let new = !self.check_key(target, self.layer_idx);
        self.idx = target;
        self.check();
        new
    }

    // ---- cel and key search ----

    fn differing_cel(&self, track: usize, direction: Direction) -> Option<i64> {
        let layer = self.layers.get(track)?;
        let current = layer.cel_at(self.idx);
        layer
            .key_range(self.idx, direction, None)
            .into_iter()
            .find(|f| {
                layer.peek(*f).map_or(false, |frame| {
                    frame.cel.is_some() && frame.cel != current && !frame.skip_visible
                })
            })
    }

    /// Next frame on `track` whose cel differs from the current one
    pub fn next_cel(&self, track: usize) -> Option<i64> {
        self.differing_cel(track, Direction::Next)
    }

    /// Previous frame on `track` whose cel differs from the current one
    pub fn previous_cel(&self, track: usize) -> Option<i64> {
        self.differing_cel(track, Direction::Previous)
    }

    fn key_in(layer: &FrameList, idx: i64, direction: Direction) -> Option<i64> {
        layer
            .key_range(idx, direction, None)
            .into_iter()
            .find(|f| layer.peek(*f).map_or(false, |frame| frame.is_key && !frame.skip_visible))
    }

    fn key(&self, track: usize, recursive: bool, direction: Direction) -> Option<i64> {
        if let Some(key) = self.layers.get(track).and_then(|l| Self::key_in(l, self.idx, direction)) {
            return Some(key);
        }
        if !recursive {
            return None;
        }
        let others = self
            .layers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != track)
            .filter_map(|(_, layer)| Self::key_in(layer, self.idx, direction));
        match direction {
            Direction::Next => others.min(),
            Direction::Previous => others.max(),
        }
    }

    /// Next key frame on `track`; with `recursive`, fall back to the nearest key on any other track
    pub fn next_key(&self, track: usize, recursive: bool) -> Option<i64> {
        self.key(track, recursive, Direction::Next)
    }

    /// Previous key frame on `track`; with `recursive`, fall back to the nearest key on any other track
    pub fn previous_key(&self, track: usize, recursive: bool) -> Option<i64> {
        self.key(track, recursive, Direction::Previous)
    }

    /// Jump to the next key frame
    pub fn goto_next_key(&mut self) -> Result<bool> {
        let key = self.next_key(self.layer_idx, true).ok_or(TimelineError::NoNextKey)?;
        Ok(self.jump(key))
    }

    /// Jump to the previous key frame
    pub fn goto_previous_key(&mut self) -> Result<bool> {
        let key = self
            .previous_key(self.layer_idx, true)
            .ok_or(TimelineError::NoPreviousKey)?;
        Ok(self.jump(key))
    }

    /// Whether a next key frame exists
    pub fn has_next_key(&self) -> bool {
        self.next_key(self.layer_idx, true).is_some()
    }

    /// Whether a previous key frame exists
    pub fn has_previous_key(&self) -> bool {
        self.previous_key(self.layer_idx, true).is_some()
    }

    // ---- cels ----

    /// Cels shown at frame `n`, one per track at most
    pub fn cels_at(&self, n: i64) -> Vec<LayerId> {
        self.layers.iter().filter_map(|layer| layer.cel_at(n)).collect()
    }

    /// Distinct cels over all tracks, in track then frame order
    pub fn all_cels(&self) -> Vec<LayerId> {
        let mut cels = Vec::new();
        for cel in self.layers.iter().flat_map(FrameList::all_cels) {
            if !cels.contains(&cel) {
                cels.push(cel);
            }
        }
        cels
    }

    /// First `(track, frame)` showing `cel`
    pub fn position_of(&self, cel: LayerId) -> Option<(usize, i64)> {
        self.layers
            .iter()
            .enumerate()
            .find_map(|(t, layer)| layer.index_of(cel).map(|f| (t, f)))
    }

    /// Number of frames referencing `cel`
    pub fn cel_references(&self, cel: LayerId) -> usize {
        self.layers
            .iter()
            .flat_map(FrameList::iter)
            .filter(|(_, frame)| frame.cel == Some(cel))
            .count()
    }

    /// One row per frame from first to last: `(frame, cell per track)`
    pub fn exposure_matrix(&self) -> Vec<(i64, Vec<Option<&Frame>>)> {
        let (Some(first), Some(last)) = (self.first(), self.last()) else {
            return Vec::new();
        };
        (first..=last)
            .map(|n| (n, self.layers.iter().map(|layer| layer.peek(n)).collect()))
            .collect()
    }

    /// Drop unneeded frames on every track
    pub fn cleanup(&mut self) {
        for layer in &mut self.layers {
            layer.cleanup();
        }
    }

    // ---- tracks ----

    /// Current track
    pub fn layer(&self) -> &FrameList {
        &self.layers[self.layer_idx]
    }

    /// Mutable current track
    pub fn layer_mut(&mut self) -> &mut FrameList {
        &mut self.layers[self.layer_idx]
    }

    /// All tracks
    pub fn layers(&self) -> &[FrameList] {
        &self.layers
    }

    /// Track by index
    pub fn get_layer(&self, track: usize) -> Result<&FrameList> {
        let count = self.layers.len();
        self.layers
            .get(track)
            .ok_or(TimelineError::LayerOutOfRange { index: track, count })
    }

    /// Mutable track by index
    pub fn get_layer_mut(&mut self, track: usize) -> Result<&mut FrameList> {
        let count = self.layers.len();
        self.layers
            .get_mut(track)
            .ok_or(TimelineError::LayerOutOfRange { index: track, count })
    }

    /// Number of tracks
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Append a track, returning its index
    pub fn append_layer(&mut self, layer: FrameList) -> usize {
        self.layers.push(layer);
        self.layers.len() - 1
    }

    /// Insert a track at `idx` (clamped to the end).
    ///
    /// The current track stays selected.
    pub fn insert_layer(&mut self, idx: usize, layer: FrameList) -> usize {
        let idx = idx.min(self.layers.len());
        self.layers.insert(idx, layer);
        if idx <= self.layer_idx {
            self.layer_idx += 1;
        }
        idx
    }

    /// Remove the track at `idx`.
    ///
    /// Removing the only track leaves a fresh empty one in its place. The
    /// current track stays selected; when it is the one removed, the track
    /// that takes its place is selected.
    pub fn remove_layer(&mut self, idx: usize) -> Result<FrameList> {
        let count = self.layers.len();
        if idx >= count {
            return Err(TimelineError::LayerOutOfRange { index: idx, count });
        }
        let removed = self.layers.remove(idx);
        if self.layers.is_empty() {
            tracing::debug!("Removed the only track, adding an empty one");
            self.layers.push(FrameList::default());
        }
        if idx < self.layer_idx {
            self.layer_idx -= 1;
        }
        if self.layer_idx >= self.layers.len() {
            self.layer_idx = self.layers.len() - 1;
        }
        Ok(removed)
    }

    /// Move the track at `from` to position `to`; the current track stays selected
    pub fn move_layer(&mut self, from: usize, to: usize) -> Result<()> {
        let count = self.layers.len();
        if from >= count || to >= count {
            return Err(TimelineError::LayerOutOfRange {
                index: from.max(to),
                count,
            });
        }
        let layer = self.layers.remove(from);
        self.layers.insert(to, layer);
        let current = self.layer_idx;
        self.layer_idx = if current == from {
            to
        } else if from < current && current <= to {
            current - 1
        } else if to <= current && current < from {
            current + 1
        } else {
            current
        };
        Ok(())
    }

    /// Make track `n` current
    pub fn select_layer(&mut self, n: usize) -> Result<()> {
        let count = self.layers.len();
        if n >= count {
            return Err(TimelineError::LayerOutOfRange { index: n, count });
        }
        self.layer_idx = n;
        Ok(())
    }

    /// Make the next track current
    pub fn goto_next_layer(&mut self) -> Result<()> {
        if !self.has_next_layer() {
            return Err(TimelineError::NoNextLayer);
        }
        self.layer_idx += 1;
        self.check();
        Ok(())
    }

    /// Make the previous track current
    pub fn goto_previous_layer(&mut self) -> Result<()> {
        if !self.has_previous_layer() {
            return Err(TimelineError::NoPreviousLayer);
        }
        self.layer_idx -= 1;
        self.check();
        Ok(())
    }

    /// Whether a track follows the current one
    pub fn has_next_layer(&self) -> bool {
        self.layer_idx + 1 < self.layers.len()
    }

    /// Whether a track precedes the current one
    pub fn has_previous_layer(&self) -> bool {
        self.layer_idx > 0
    }

    // ---- opacity configuration ----

    /// Change the global opacity factor.
    ///
    /// This is a live preview setting and is not recorded in any history.
    pub fn set_opacity_factor(&mut self, factor: f32) {
        self.opacity.set_factor(factor);
    }

    /// Enable or disable one opacity category
    pub fn set_category_active(&mut self, category: OpacityCategory, active: bool) {
        self.opacity.active.set(category, active);
    }

    /// Enable or disable one direction
    pub fn set_direction_active(&mut self, direction: Direction, active: bool) {
        self.opacity.nextprev.set(direction, active);
    }

    /// Replace some base weights
    pub fn setup_opacities(&mut self, weights: &[(OpacityCategory, f32)]) {
        self.opacity.setup_opacities(weights);
    }

    // ---- onion skin ----

    /// Opacity every cel should have while painting at the current frame.
    ///
    /// Rules are applied in priority order and the first one to classify a
    /// cel wins: cels at the current frame (1.0), skip-visible cels (0),
    /// adjacent differing cels, nearest keys, inbetweens, everything beyond.
    /// Read-only: no frame is materialized.
    pub fn get_opacities(&self) -> Opacities {
        let mut opacity: IndexMap<LayerId, f32> = IndexMap::new();
        let config = &self.opacity;
        let idx = self.idx;

        for cel in self.cels_at(idx) {
            assign(&mut opacity, cel, 1.0);
        }

        for layer in &self.layers {
            for (_, frame) in layer.iter() {
                if let (true, Some(cel)) = (frame.skip_visible, frame.cel) {
                    assign(&mut opacity, cel, 0.0);
                }
            }
        }

        for (track, layer) in self.layers.iter().enumerate() {
            let cel_of = |f: i64| layer.peek(f).and_then(|frame| frame.cel);

            for direction in [Direction::Next, Direction::Previous] {
                if let Some(f) = self.differing_cel(track, direction) {
                    if let Some(cel) = cel_of(f) {
                        let value = config.opacity_for(direction, OpacityCategory::Cel, f - idx);
                        assign(&mut opacity, cel, value);
                    }
                }
            }

            let mut bounds = Vec::with_capacity(2);
            for direction in [Direction::Next, Direction::Previous] {
                let bound = match self.key(track, false, direction) {
                    Some(key) => {
                        if let Some(cel) = cel_of(key) {
                            let value = config.opacity_for(direction, OpacityCategory::Key, key - idx);
                            assign(&mut opacity, cel, value);
                        }
                        Some(key)
                    }
                    None => match direction {
                        Direction::Next => layer.last(),
                        Direction::Previous => layer.first(),
                    },
                };
                bounds.push((direction, bound));
            }

            for &(direction, bound) in &bounds {
                let Some(bound) = bound else { continue };
                for f in layer.key_range(idx, direction, Some(bound)) {
                    if let Some(cel) = cel_of(f) {
                        let value = config.opacity_for(direction, OpacityCategory::Inbetweens, f - idx);
                        assign(&mut opacity, cel, value);
                    }
                }
            }

            for &(direction, bound) in &bounds {
                let Some(bound) = bound else { continue };
                for f in layer.key_range(bound, direction, None) {
                    let Some(frame) = layer.peek(f) else { continue };
                    let Some(cel) = frame.cel else { continue };
                    let category = if frame.is_key {
                        OpacityCategory::OtherKeys
                    } else {
                        OpacityCategory::Other
                    };
                    assign(&mut opacity, cel, config.opacity_for(direction, category, f - idx));
                }
            }
        }

        let visible = opacity.iter().map(|(cel, opa)| (*cel, *opa != 0.0)).collect();
        Opacities { opacity, visible }
    }
}

impl Default for TimeLine {
    fn default() -> Self {
        Self::new()
    }
}

fn assign(map: &mut IndexMap<LayerId, f32>, cel: LayerId, value: f32) {
    map.entry(cel).or_insert(value);
}
