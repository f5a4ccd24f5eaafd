// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sparse frame storage for one animated layer.

use crate::frame::{Frame, LayerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Bound;

/// Default composite operation for new tracks
pub const DEFAULT_COMPOSITE: &str = "svg:src-over";

/// Default name for new tracks
pub const DEFAULT_TRACK_NAME: &str = "Untitled layer";

/// Search direction along the frame axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Towards higher frame indices
    Next,
    /// Towards lower frame indices
    Previous,
}

impl Direction {
    /// Signed unit step for this direction
    pub fn step(self) -> i64 {
        match self {
            Direction::Next => 1,
            Direction::Previous => -1,
        }
    }
}

/// One animated layer (track) of the exposure sheet.
///
/// Only frames carrying information need to be stored. Indices are not
/// required to be contiguous and may be negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameList {
    /// Track name
    pub name: String,
    /// Whether the track is shown
    pub visible: bool,
    /// Track opacity (0..1)
    pub opacity: f32,
    /// Whether the track is locked
    pub locked: bool,
    /// Composite operation name
    pub composite: String,
    frames: BTreeMap<i64, Frame>,
}

impl FrameList {
    /// Create an empty track
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visible: true,
            opacity: 1.0,
            locked: false,
            composite: DEFAULT_COMPOSITE.to_string(),
            frames: BTreeMap::new(),
        }
    }

    /// Frame span from the first to the last stored frame.
    ///
    /// Gaps count towards the length; an empty track has length 0.
    pub fn len(&self) -> usize {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => (last - first + 1) as usize,
            _ => 0,
        }
    }

    /// Whether no frame is stored
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of materialized frames
    pub fn stored_count(&self) -> usize {
        self.frames.len()
    }

    /// Whether a frame is materialized at `idx`
    pub fn contains(&self, idx: i64) -> bool {
        self.frames.contains_key(&idx)
    }

    /// Lowest stored frame index
    pub fn first(&self) -> Option<i64> {
        self.frames.keys().next().copied()
    }

    /// Highest stored frame index
    pub fn last(&self) -> Option<i64> {
        self.frames.keys().next_back().copied()
    }

    /// Stored frame at `idx`, without creating it
    pub fn peek(&self, idx: i64) -> Option<&Frame> {
        self.frames.get(&idx)
    }

    /// Mutable stored frame at `idx`, without creating it
    pub fn peek_mut(&mut self, idx: i64) -> Option<&mut Frame> {
        self.frames.get_mut(&idx)
    }

    /// Frame at `idx`, materializing an empty one if none is stored.
    ///
    /// Calling this twice returns the same stored frame.
    pub fn get_or_create(&mut self, idx: i64) -> &mut Frame {
        self.frames.entry(idx).or_default()
    }

    /// Named access to a single frame; materializes like [`Self::get_or_create`]
    pub fn frame_at(&mut self, idx: i64) -> &mut Frame {
        self.get_or_create(idx)
    }

    /// Materialize and return every requested frame
    pub fn frames_at_many(&mut self, indices: &[i64]) -> Vec<(i64, &Frame)> {
        for &idx in indices {
            self.frames.entry(idx).or_default();
        }
        indices
            .iter()
            .filter_map(|idx| self.frames.get(idx).map(|f| (*idx, f)))
            .collect()
    }

    /// Already materialized frames in `[start, stop]` taken every `step` frames.
    ///
    /// Missing bounds default to the first and last stored frame. Never creates
    /// frames, so it is safe to call while rendering.
    pub fn frames_in_range(
        &self,
        start: Option<i64>,
        stop: Option<i64>,
        step: usize,
    ) -> Vec<(i64, &Frame)> {
        let (Some(start), Some(stop)) = (start.or(self.first()), stop.or(self.last())) else {
            return Vec::new();
        };
        if start > stop {
            return Vec::new();
        }
        let step = step.max(1) as i64;
        self.frames
            .range(start..=stop)
            .filter(|(idx, _)| (**idx - start) % step == 0)
            .map(|(idx, frame)| (*idx, frame))
            .collect()
    }

    /// Iterate over stored frames in index order
    pub fn iter(&self) -> impl Iterator<Item = (i64, &Frame)> {
        self.frames.iter().map(|(idx, frame)| (*idx, frame))
    }

    /// Stored frame indices in ascending order
    pub fn keys(&self) -> impl Iterator<Item = i64> + '_ {
        self.frames.keys().copied()
    }

    /// Store `frame` at `idx`, returning the frame it replaces
    pub fn set(&mut self, idx: i64, frame: Frame) -> Option<Frame> {
        self.frames.insert(idx, frame)
    }

    /// Remove the stored frame at `idx` without shifting
    pub fn take(&mut self, idx: i64) -> Option<Frame> {
        self.frames.remove(&idx)
    }

    /// Drop every frame that carries no information
    pub fn cleanup(&mut self) {
        self.frames.retain(|_, frame| frame.is_needed());
    }

    /// Shift the keys in `[start, end]` by `amount`.
    ///
    /// Shifted frames overwrite frames already stored at their destination.
    pub fn change_keys(&mut self, amount: i64, start: i64, end: Option<i64>) {
        let tail = self.frames.split_off(&start);
        let mut shifted = BTreeMap::new();
        for (idx, frame) in tail {
            if end.map_or(true, |end| idx <= end) {
                shifted.insert(idx + amount, frame);
            } else {
                self.frames.insert(idx, frame);
            }
        }
        self.frames.extend(shifted);
    }

    /// Remove the frames in `[idx, idx + length)` and close the gap.
    ///
    /// Returns one slot per removed index, `None` where nothing was stored.
    pub fn remove_frames(&mut self, idx: i64, length: usize) -> Vec<Option<Frame>> {
        let length_i = length as i64;
        let removed = (idx..idx + length_i)
            .map(|n| self.frames.remove(&n))
            .collect();
        self.change_keys(-length_i, idx, None);
        removed
    }

    /// Insert `frames` at `idx`, moving everything from `idx` on out of the way.
    ///
    /// `None` slots open a gap without materializing a frame, so the slots
    /// returned by [`Self::remove_frames`] restore the exact previous keys.
    pub fn insert_frames(&mut self, idx: i64, frames: Vec<Option<Frame>>) {
        self.change_keys(frames.len() as i64, idx, None);
        for (offset, frame) in frames.into_iter().enumerate() {
            if let Some(frame) = frame {
                self.frames.insert(idx + offset as i64, frame);
            }
        }
    }

    /// Insert `count` empty frames at `idx`
    pub fn insert_blank_frames(&mut self, idx: i64, count: usize) {
        self.insert_frames(idx, vec![Some(Frame::new()); count]);
    }

    /// Cel shown at frame `n`: the cel of the closest stored frame at or before `n`
    pub fn cel_at(&self, n: i64) -> Option<LayerId> {
        self.frames.range(..=n).rev().find_map(|(_, frame)| frame.cel)
    }

    /// Stored indices strictly past `idx` in `direction`, nearest first.
    ///
    /// When `bound` is given the result stops at it, inclusive.
    pub fn key_range(&self, idx: i64, direction: Direction, bound: Option<i64>) -> Vec<i64> {
        match direction {
            Direction::Next => {
                let upper = match bound {
                    Some(bound) if bound < idx => return Vec::new(),
                    Some(bound) => Bound::Included(bound),
                    None => Bound::Unbounded,
                };
                self.frames
                    .range((Bound::Excluded(idx), upper))
                    .map(|(k, _)| *k)
                    .collect()
            }
            Direction::Previous => {
                let lower = match bound {
                    Some(bound) if bound > idx => return Vec::new(),
                    Some(bound) => Bound::Included(bound),
                    None => Bound::Unbounded,
                };
                self.frames
                    .range((lower, Bound::Excluded(idx)))
                    .rev()
                    .map(|(k, _)| *k)
                    .collect()
            }
        }
    }

    /// First stored index whose frame shows `cel`
    pub fn index_of(&self, cel: LayerId) -> Option<i64> {
        self.frames
            .iter()
            .find(|(_, frame)| frame.cel == Some(cel))
            .map(|(idx, _)| *idx)
    }

    /// Distinct cels in frame order
    pub fn all_cels(&self) -> Vec<LayerId> {
        let mut cels = Vec::new();
        for cel in self.frames.values().filter_map(|frame| frame.cel) {
            if !cels.contains(&cel) {
                cels.push(cel);
            }
        }
        cels
    }

    /// Indices of stored frames that have a cel
    pub fn all_cel_keys(&self) -> Vec<i64> {
        self.frames
            .iter()
            .filter(|(_, frame)| frame.has_cel())
            .map(|(idx, _)| *idx)
            .collect()
    }
}

impl Default for FrameList {
    fn default() -> Self {
        Self::new(DEFAULT_TRACK_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track_with_keys(keys: &[i64]) -> FrameList {
        let mut track = FrameList::default();
        for &k in keys {
            track.get_or_create(k).description = format!("f{k}");
        }
        track
    }

    #[test]
    fn test_get_or_create_materializes_once() {
        let mut track = FrameList::default();
        assert!(track.peek(4).is_none());
        track.get_or_create(4).description = "pose".to_string();
        assert_eq!(track.get_or_create(4).description, "pose");
        assert_eq!(track.stored_count(), 1);
    }

    #[test]
    fn test_range_does_not_create() {
        let mut track = track_with_keys(&[0, 3, 6]);
        let found: Vec<i64> = track.frames_in_range(Some(0), Some(6), 1).iter().map(|(i, _)| *i).collect();
        assert_eq!(found, vec![0, 3, 6]);
        assert_eq!(track.stored_count(), 3);

        let stepped: Vec<i64> = track.frames_in_range(None, None, 3).iter().map(|(i, _)| *i).collect();
        assert_eq!(stepped, vec![0, 3, 6]);

        let many = track.frames_at_many(&[1, 3]);
        assert_eq!(many.len(), 2);
        assert_eq!(track.stored_count(), 4);
    }

    #[test]
    fn test_len_counts_gaps() {
        let track = track_with_keys(&[2, 9]);
        assert_eq!(track.len(), 8);
        assert_eq!(FrameList::default().len(), 0);
    }

    #[test]
    fn test_remove_frames_shifts_down() {
        let mut track = track_with_keys(&[0, 1, 2, 3, 4]);
        let removed = track.remove_frames(2, 2);
        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0].as_ref().map(|f| f.description.as_str()), Some("f2"));
        assert_eq!(track.keys().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(track.peek(2).map(|f| f.description.as_str()), Some("f4"));
    }

    #[test]
    fn test_insert_then_remove_round_trip() {
        let mut track = track_with_keys(&[0, 2, 5]);
        let before = track.clone();
        track.insert_blank_frames(1, 3);
        assert_eq!(track.keys().collect::<Vec<_>>(), vec![0, 1, 2, 3, 5, 8]);
        track.remove_frames(1, 3);
        assert_eq!(track, before);
    }

    #[test]
    fn test_remove_then_reinsert_preserves_gaps() {
        let mut track = track_with_keys(&[0, 2, 5]);
        let before = track.clone();
        let removed = track.remove_frames(1, 3);
        assert!(removed[0].is_none());
        track.insert_frames(1, removed);
        assert_eq!(track, before);
    }

    #[test]
    fn test_cel_at_holds_until_superseded() {
        let mut track = FrameList::default();
        let l1 = LayerId::new();
        let l2 = LayerId::new();
        track.get_or_create(0).add_cel(l1);
        track.get_or_create(5).add_cel(l2);
        track.get_or_create(4).set_key();

        assert_eq!(track.cel_at(-1), None);
        assert_eq!(track.cel_at(3), Some(l1));
        assert_eq!(track.cel_at(4), Some(l1));
        assert_eq!(track.cel_at(5), Some(l2));
        assert_eq!(track.cel_at(7), Some(l2));
    }

    #[test]
    fn test_key_range() {
        let track = track_with_keys(&[0, 2, 4, 6, 8]);
        assert_eq!(track.key_range(4, Direction::Next, None), vec![6, 8]);
        assert_eq!(track.key_range(4, Direction::Previous, None), vec![2, 0]);
        assert_eq!(track.key_range(4, Direction::Next, Some(6)), vec![6]);
        assert_eq!(track.key_range(4, Direction::Previous, Some(2)), vec![2]);
        assert!(track.key_range(4, Direction::Next, Some(3)).is_empty());
        assert!(track.key_range(4, Direction::Previous, Some(4)).is_empty());
    }

    #[test]
    fn test_cleanup_drops_unneeded() {
        let mut track = track_with_keys(&[0]);
        track.get_or_create(1);
        track.get_or_create(2).set_key();
        track.cleanup();
        assert_eq!(track.keys().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn test_all_cels_unique_in_order() {
        let mut track = FrameList::default();
        let a = LayerId::new();
        let b = LayerId::new();
        track.get_or_create(3).add_cel(b);
        track.get_or_create(1).add_cel(a);
        track.get_or_create(5).add_cel(a);
        assert_eq!(track.all_cels(), vec![a, b]);
        assert_eq!(track.all_cel_keys(), vec![1, 3, 5]);
        assert_eq!(track.index_of(b), Some(3));
    }
}
