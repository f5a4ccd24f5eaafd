// SPDX-License-Identifier: MIT OR Apache-2.0
//! Undoable frame and cel commands.
//!
//! Every edit to the timeline goes through an [`AnimationCommand`] so it can
//! be recorded in the [`History`](crate::history::History). A command that
//! removes a layer from the stack keeps the detached node until it is undone
//! again; the stack and the command never hold the same node at once.

use crate::layers::{LayerNode, LayerPath, LayerStackError};
use crate::state::{AnimationState, Replacement};
use xsheet_timeline::{LayerId, TimelineError};

/// Error type for command execution
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Timeline error
    #[error("Timeline error: {0}")]
    Timeline(#[from] TimelineError),

    /// Layer stack error
    #[error("Layer stack error: {0}")]
    LayerStack(#[from] LayerStackError),

    /// A cel refers to a layer that is not in the stack
    #[error("Layer not found: {0}")]
    LayerNotFound(LayerId),

    /// Paste was requested without a cut or copy
    #[error("Paste needs a preceding cut or copy")]
    NoEditOperation,

    /// The paste source has no cel
    #[error("Nothing to paste")]
    NothingToPaste,

    /// Invalid operation
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

/// Trait for animation commands that can be undone/redone
pub trait AnimationCommand: std::fmt::Debug + Send {
    /// Get a description of this command
    fn description(&self) -> &str;

    /// Apply the command
    fn redo(&mut self, state: &mut AnimationState) -> Result<(), CommandError>;

    /// Revert the command
    fn undo(&mut self, state: &mut AnimationState) -> Result<(), CommandError>;

    /// Selection changes that merge into the next recorded edit
    fn automatic(&self) -> bool {
        false
    }
}

/// A frame on a given track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramePosition {
    /// Track index
    pub track: usize,
    /// Frame index
    pub frame: i64,
}

impl FramePosition {
    /// Position on `track` at `frame`
    pub fn new(track: usize, frame: i64) -> Self {
        Self { track, frame }
    }
}

/// Pending clipboard operation for [`PasteCel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOperation {
    /// Duplicate the source layer
    Copy,
    /// Move the source cel
    Cut,
}

fn refresh(state: &mut AnimationState) {
    state.update_opacities();
    state.notify_document();
}

fn cel_of(state: &AnimationState, pos: FramePosition) -> Result<Option<LayerId>, CommandError> {
    Ok(state
        .timeline
        .get_layer(pos.track)?
        .peek(pos.frame)
        .and_then(|frame| frame.cel))
}

/// Detach `cel` from the stack when no frame references it anymore
fn detach_if_orphaned(state: &mut AnimationState, cel: LayerId) -> Option<(LayerPath, LayerNode)> {
    if state.timeline.cel_references(cel) > 0 {
        return None;
    }
    state.layers.remove(cel)
}

// ---- selection ----

/// Move the playhead
#[derive(Debug)]
pub struct SelectFrame {
    idx: i64,
    prev_idx: Option<i64>,
    prev_path: Option<LayerPath>,
}

impl SelectFrame {
    /// Select frame `idx`
    pub fn new(idx: i64) -> Self {
        Self {
            idx,
            prev_idx: None,
            prev_path: None,
        }
    }
}

impl AnimationCommand for SelectFrame {
    fn description(&self) -> &str {
        "Select Frame"
    }

    fn redo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        self.prev_idx = Some(state.timeline.idx());
        self.prev_path = Some(state.layers.current_path().to_vec());
        if let Some(cel) = state.timeline.layer().cel_at(self.idx) {
            if let Some(path) = state.layers.deep_index(cel) {
                state.layers.set_current_path(&path);
            }
        }
        state.timeline.select(self.idx);
        refresh(state);
        Ok(())
    }

    fn undo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        if let Some(path) = self.prev_path.take() {
            state.layers.set_current_path(&path);
        }
        if let Some(idx) = self.prev_idx.take() {
            state.timeline.select(idx);
        }
        refresh(state);
        Ok(())
    }

    fn automatic(&self) -> bool {
        true
    }
}

/// Make another track current
#[derive(Debug)]
pub struct SelectAnimatedLayer {
    track: usize,
    prev: Option<usize>,
}

impl SelectAnimatedLayer {
    /// Select track `track`
    pub fn new(track: usize) -> Self {
        Self { track, prev: None }
    }
}

impl AnimationCommand for SelectAnimatedLayer {
    fn description(&self) -> &str {
        "Select Animated Layer"
    }

    fn redo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        let prev = state.timeline.layer_idx();
        state.timeline.select_layer(self.track)?;
        self.prev = Some(prev);
        state.timeline.check();
        refresh(state);
        Ok(())
    }

    fn undo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        if let Some(prev) = self.prev.take() {
            state.timeline.select_layer(prev)?;
        }
        refresh(state);
        Ok(())
    }

    fn automatic(&self) -> bool {
        true
    }
}

// ---- frame flags ----

/// Flip the key flag of a frame
#[derive(Debug)]
pub struct ToggleKey {
    pos: FramePosition,
    prev: Option<bool>,
}

impl ToggleKey {
    /// Toggle the key at `pos`
    pub fn new(pos: FramePosition) -> Self {
        Self { pos, prev: None }
    }
}

impl AnimationCommand for ToggleKey {
    fn description(&self) -> &str {
        "Toggle Key"
    }

    fn redo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        let frame = state.timeline.get_layer_mut(self.pos.track)?.get_or_create(self.pos.frame);
        self.prev = Some(frame.is_key);
        frame.toggle_key();
        refresh(state);
        Ok(())
    }

    fn undo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        if let Some(prev) = self.prev.take() {
            state.timeline.get_layer_mut(self.pos.track)?.get_or_create(self.pos.frame).is_key = prev;
        }
        refresh(state);
        Ok(())
    }
}

/// Flip the skip-visible flag of a frame
#[derive(Debug)]
pub struct ToggleSkipVisible {
    pos: FramePosition,
    prev: Option<bool>,
}

impl ToggleSkipVisible {
    /// Toggle skip-visible at `pos`
    pub fn new(pos: FramePosition) -> Self {
        Self { pos, prev: None }
    }
}

impl AnimationCommand for ToggleSkipVisible {
    fn description(&self) -> &str {
        "Toggle Skip Visible"
    }

    fn redo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        let frame = state.timeline.get_layer_mut(self.pos.track)?.get_or_create(self.pos.frame);
        self.prev = Some(frame.skip_visible);
        frame.toggle_skip_visible();
        refresh(state);
        Ok(())
    }

    fn undo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        if let Some(prev) = self.prev.take() {
            state
                .timeline
                .get_layer_mut(self.pos.track)?
                .get_or_create(self.pos.frame)
                .skip_visible = prev;
        }
        refresh(state);
        Ok(())
    }
}

/// Replace the description of a frame
#[derive(Debug)]
pub struct ChangeDescription {
    pos: FramePosition,
    description: String,
    prev: Option<String>,
}

impl ChangeDescription {
    /// Set the description at `pos`
    pub fn new(pos: FramePosition, description: impl Into<String>) -> Self {
        Self {
            pos,
            description: description.into(),
            prev: None,
        }
    }
}

impl AnimationCommand for ChangeDescription {
    fn description(&self) -> &str {
        "Change Description"
    }

    fn redo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        let frame = state.timeline.get_layer_mut(self.pos.track)?.get_or_create(self.pos.frame);
        self.prev = Some(std::mem::replace(&mut frame.description, self.description.clone()));
        state.notify_document();
        Ok(())
    }

    fn undo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        if let Some(prev) = self.prev.take() {
            state
                .timeline
                .get_layer_mut(self.pos.track)?
                .get_or_create(self.pos.frame)
                .description = prev;
        }
        state.notify_document();
        Ok(())
    }
}

// ---- cels ----

/// Create a fresh layer and bind it as the cel of a frame
#[derive(Debug)]
pub struct AddCel {
    pos: FramePosition,
    cel: Option<LayerId>,
    held: Option<LayerNode>,
    prev_path: LayerPath,
}

impl AddCel {
    /// Add a cel at `pos`
    pub fn new(pos: FramePosition) -> Self {
        Self {
            pos,
            cel: None,
            held: None,
            prev_path: Vec::new(),
        }
    }

    /// Layer created for the cel, once applied
    pub fn cel(&self) -> Option<LayerId> {
        self.cel
    }
}

impl AnimationCommand for AddCel {
    fn description(&self) -> &str {
        "Add Cel"
    }

    fn redo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        if cel_of(state, self.pos)?.is_some() {
            return Err(CommandError::InvalidOperation(format!(
                "Frame {} of track {} already has a cel",
                self.pos.frame, self.pos.track
            )));
        }
        let node = match self.held.take() {
            Some(node) => node,
            None => {
                let description = state
                    .timeline
                    .get_layer(self.pos.track)?
                    .peek(self.pos.frame)
                    .map(|frame| frame.description.clone())
                    .unwrap_or_default();
                let name = crate::sort::generate_layername(self.pos.track, self.pos.frame, &description);
                state.layers.new_raster(name)
            }
        };
        let id = node.id;
        self.prev_path = state.layers.current_path().to_vec();
        let path = state.layers.insert_at_current(node)?;
        state.layers.set_current_path(&path);
        state
            .timeline
            .get_layer_mut(self.pos.track)?
            .get_or_create(self.pos.frame)
            .add_cel(id);
        self.cel = Some(id);
        refresh(state);
        Ok(())
    }

    fn undo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        let Some(id) = self.cel else {
            return Ok(());
        };
        if let Some(frame) = state.timeline.get_layer_mut(self.pos.track)?.peek_mut(self.pos.frame) {
            frame.remove_cel();
        }
        let (_, node) = state.layers.remove(id).ok_or(CommandError::LayerNotFound(id))?;
        self.held = Some(node);
        state.layers.set_current_path(&self.prev_path);
        refresh(state);
        Ok(())
    }
}

/// Unbind the cel of a frame
#[derive(Debug)]
pub struct RemoveCel {
    pos: FramePosition,
    cel: Option<LayerId>,
    detached: Option<(LayerPath, LayerNode)>,
    replacement: Replacement,
    prev_path: LayerPath,
}

impl RemoveCel {
    /// Remove the cel at `pos`
    pub fn new(pos: FramePosition) -> Self {
        Self {
            pos,
            cel: None,
            detached: None,
            replacement: Replacement::default(),
            prev_path: Vec::new(),
        }
    }
}

impl AnimationCommand for RemoveCel {
    fn description(&self) -> &str {
        "Remove Cel"
    }

    fn redo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        let cel = state
            .timeline
            .get_layer_mut(self.pos.track)?
            .peek_mut(self.pos.frame)
            .and_then(|frame| frame.remove_cel())
            .ok_or_else(|| CommandError::InvalidOperation("Frame has no cel".to_string()))?;
        self.cel = Some(cel);
        self.prev_path = state.layers.current_path().to_vec();
        self.detached = detach_if_orphaned(state, cel);
        self.replacement.insert_if_needed(state);
        state.cleared = true;
        refresh(state);
        Ok(())
    }

    fn undo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        let Some(cel) = self.cel.take() else {
            return Ok(());
        };
        self.replacement.remove(state);
        if let Some((path, node)) = self.detached.take() {
            state.reattach(&path, node)?;
        }
        state
            .timeline
            .get_layer_mut(self.pos.track)?
            .get_or_create(self.pos.frame)
            .add_cel(cel);
        state.layers.set_current_path(&self.prev_path);
        state.cleared = true;
        refresh(state);
        Ok(())
    }
}

/// Bind a cel taken from another frame
#[derive(Debug)]
pub struct PasteCel {
    target: FramePosition,
    source: FramePosition,
    mode: Option<EditOperation>,
    cel: Option<LayerId>,
    held: Option<LayerNode>,
    prev_path: LayerPath,
}

impl PasteCel {
    /// Paste the cel of `source` onto `target`
    pub fn new(target: FramePosition, source: FramePosition, mode: Option<EditOperation>) -> Self {
        Self {
            target,
            source,
            mode,
            cel: None,
            held: None,
            prev_path: Vec::new(),
        }
    }
}

impl AnimationCommand for PasteCel {
    fn description(&self) -> &str {
        "Paste Cel"
    }

    fn redo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        let mode = self.mode.ok_or(CommandError::NoEditOperation)?;
        let source = cel_of(state, self.source)?.ok_or(CommandError::NothingToPaste)?;
        if cel_of(state, self.target)?.is_some() {
            return Err(CommandError::InvalidOperation(
                "Paste target already has a cel".to_string(),
            ));
        }

        let pasted = match mode {
            EditOperation::Copy => {
                let node = match self.held.take() {
                    Some(node) => node,
                    None => state
                        .layers
                        .get(source)
                        .ok_or(CommandError::LayerNotFound(source))?
                        .duplicate(),
                };
                let id = node.id;
                self.prev_path = state.layers.current_path().to_vec();
                let path = state.layers.insert_at_current(node)?;
                state.layers.set_current_path(&path);
                id
            }
            EditOperation::Cut => {
                if let Some(frame) = state.timeline.get_layer_mut(self.source.track)?.peek_mut(self.source.frame) {
                    frame.remove_cel();
                }
                source
            }
        };
        state
            .timeline
            .get_layer_mut(self.target.track)?
            .get_or_create(self.target.frame)
            .add_cel(pasted);
        self.cel = Some(pasted);
        refresh(state);
        Ok(())
    }

    fn undo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        let Some(cel) = self.cel.take() else {
            return Ok(());
        };
        if let Some(frame) = state.timeline.get_layer_mut(self.target.track)?.peek_mut(self.target.frame) {
            frame.remove_cel();
        }
        match self.mode {
            Some(EditOperation::Copy) => {
                let (_, node) = state.layers.remove(cel).ok_or(CommandError::LayerNotFound(cel))?;
                self.held = Some(node);
                state.layers.set_current_path(&self.prev_path);
            }
            Some(EditOperation::Cut) => {
                state
                    .timeline
                    .get_layer_mut(self.source.track)?
                    .get_or_create(self.source.frame)
                    .add_cel(cel);
            }
            None => {}
        }
        refresh(state);
        Ok(())
    }
}

// ---- frame structure ----

/// Open blank frames on a track
#[derive(Debug)]
pub struct InsertFrames {
    track: usize,
    idx: i64,
    amount: usize,
}

impl InsertFrames {
    /// Insert `amount` blank frames at `idx`
    pub fn new(track: usize, idx: i64, amount: usize) -> Self {
        Self { track, idx, amount }
    }
}

impl AnimationCommand for InsertFrames {
    fn description(&self) -> &str {
        "Insert Frames"
    }

    fn redo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        state
            .timeline
            .get_layer_mut(self.track)?
            .insert_blank_frames(self.idx, self.amount);
        state.cleared = true;
        refresh(state);
        Ok(())
    }

    fn undo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        state.timeline.get_layer_mut(self.track)?.remove_frames(self.idx, self.amount);
        state.cleared = true;
        refresh(state);
        Ok(())
    }
}

/// Delete one frame and close the gap
#[derive(Debug)]
pub struct RemoveFrame {
    pos: FramePosition,
    removed: Vec<Option<xsheet_timeline::Frame>>,
    detached: Option<(LayerPath, LayerNode)>,
    replacement: Replacement,
    bound_frame: Option<bool>,
    applied: bool,
}

impl RemoveFrame {
    /// Remove the frame at `pos`
    pub fn new(pos: FramePosition) -> Self {
        Self {
            pos,
            removed: Vec::new(),
            detached: None,
            replacement: Replacement::default(),
            bound_frame: None,
            applied: false,
        }
    }
}

impl AnimationCommand for RemoveFrame {
    fn description(&self) -> &str {
        "Remove Frame"
    }

    fn redo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        let had_cels = !state.timeline.get_layer(self.pos.track)?.all_cel_keys().is_empty();
        self.removed = state.timeline.get_layer_mut(self.pos.track)?.remove_frames(self.pos.frame, 1);
        let cel = self.removed.first().and_then(|slot| slot.as_ref()).and_then(|frame| frame.cel);
        self.detached = cel.and_then(|cel| detach_if_orphaned(state, cel));

        let emptied = had_cels && state.timeline.get_layer(self.pos.track)?.all_cel_keys().is_empty();
        self.bound_frame = None;
        if emptied {
            let id = self.replacement.insert(state);
            let track = state.timeline.get_layer_mut(self.pos.track)?;
            let created = track.peek(self.pos.frame).is_none();
            track.get_or_create(self.pos.frame).add_cel(id);
            self.bound_frame = Some(created);
        } else {
            self.replacement.insert_if_needed(state);
        }

        self.applied = true;
        state.cleared = true;
        refresh(state);
        Ok(())
    }

    fn undo(&mut self, state: &mut AnimationState) -> Result<(), CommandError> {
        if !std::mem::take(&mut self.applied) {
            return Ok(());
        }
        let track = state.timeline.get_layer_mut(self.pos.track)?;
        match self.bound_frame.take() {
            Some(true) => {
                track.take(self.pos.frame);
            }
            Some(false) => {
                if let Some(frame) = track.peek_mut(self.pos.frame) {
                    frame.remove_cel();
                }
            }
            None => {}
        }
        self.replacement.remove(state);
        if let Some((path, node)) = self.detached.take() {
            state.reattach(&path, node)?;
        }
        let removed = std::mem::take(&mut self.removed);
        state.timeline.get_layer_mut(self.pos.track)?.insert_frames(self.pos.frame, removed);
        state.cleared = true;
        refresh(state);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::layers::LayerStack;
    use xsheet_timeline::{Frame, TimeLine};

    /// Track 0 has cels at frames 0 and 2, frame 1 is a plain inbetween
    pub(crate) fn sample_state() -> (AnimationState, LayerId, LayerId) {
        let a = LayerNode::raster("a", 4, 4);
        let b = LayerNode::raster("b", 4, 4);
        let (ia, ib) = (a.id, b.id);
        let mut timeline = TimeLine::new();
        let track = timeline.layer_mut();
        track.set(0, Frame::with_cel(ia));
        track.set(1, Frame::new());
        track.set(2, Frame::with_cel(ib));
        (AnimationState::new(timeline, LayerStack::from_nodes(4, 4, vec![a, b])), ia, ib)
    }

    fn cel(state: &AnimationState, track: usize, frame: i64) -> Option<LayerId> {
        cel_of(state, FramePosition::new(track, frame)).unwrap()
    }

    #[test]
    fn test_select_frame_round_trip() {
        let (mut state, _, b) = sample_state();
        let mut cmd = SelectFrame::new(2);
        cmd.redo(&mut state).unwrap();
        assert_eq!(state.timeline.idx(), 2);
        assert_eq!(state.layers.current_layer().unwrap().id, b);
        cmd.undo(&mut state).unwrap();
        assert_eq!(state.timeline.idx(), 0);
        assert_eq!(state.layers.current_path(), &[0]);
        assert!(cmd.automatic());
    }

    #[test]
    fn test_toggle_key_round_trip() {
        let (mut state, _, _) = sample_state();
        let pos = FramePosition::new(0, 1);
        let mut cmd = ToggleKey::new(pos);
        cmd.redo(&mut state).unwrap();
        assert!(state.timeline.layer().peek(1).unwrap().is_key);
        cmd.undo(&mut state).unwrap();
        assert!(!state.timeline.layer().peek(1).unwrap().is_key);
    }

    #[test]
    fn test_change_description_round_trip() {
        let (mut state, _, _) = sample_state();
        let mut cmd = ChangeDescription::new(FramePosition::new(0, 2), "walk");
        cmd.redo(&mut state).unwrap();
        assert_eq!(state.timeline.layer().peek(2).unwrap().description, "walk");
        cmd.undo(&mut state).unwrap();
        assert_eq!(state.timeline.layer().peek(2).unwrap().description, "");
    }

    #[test]
    fn test_add_cel_round_trip() {
        let (mut state, _, _) = sample_state();
        let mut cmd = AddCel::new(FramePosition::new(0, 1));
        cmd.redo(&mut state).unwrap();
        let id = cmd.cel().unwrap();
        assert_eq!(cel(&state, 0, 1), Some(id));
        assert_eq!(state.layers.get(id).unwrap().name, "A002");
        assert_eq!(state.layers.current_layer().unwrap().id, id);

        cmd.undo(&mut state).unwrap();
        assert_eq!(cel(&state, 0, 1), None);
        assert!(!state.layers.contains(id));

        cmd.redo(&mut state).unwrap();
        assert_eq!(cel(&state, 0, 1), Some(id));
    }

    #[test]
    fn test_add_cel_rejects_occupied_frame() {
        let (mut state, _, _) = sample_state();
        let err = AddCel::new(FramePosition::new(0, 0)).redo(&mut state).unwrap_err();
        assert!(matches!(err, CommandError::InvalidOperation(_)));
    }

    #[test]
    fn test_remove_cel_round_trip() {
        let (mut state, a, _) = sample_state();
        let mut cmd = RemoveCel::new(FramePosition::new(0, 0));
        cmd.redo(&mut state).unwrap();
        assert_eq!(cel(&state, 0, 0), None);
        assert!(!state.layers.contains(a));
        assert!(state.cleared);

        cmd.undo(&mut state).unwrap();
        assert_eq!(cel(&state, 0, 0), Some(a));
        assert_eq!(state.layers.deep_index(a), Some(vec![0]));
    }

    #[test]
    fn test_remove_last_cel_synthesizes_layer() {
        let a = LayerNode::raster("a", 4, 4);
        let ia = a.id;
        let mut timeline = TimeLine::new();
        timeline.layer_mut().set(0, Frame::with_cel(ia));
        let mut state = AnimationState::new(timeline, LayerStack::from_nodes(4, 4, vec![a]));

        let mut cmd = RemoveCel::new(FramePosition::new(0, 0));
        cmd.redo(&mut state).unwrap();
        assert_eq!(state.layers.raster_count(), 1);
        assert!(!state.layers.contains(ia));

        cmd.undo(&mut state).unwrap();
        assert_eq!(state.layers.raster_ids(), vec![ia]);
    }

    #[test]
    fn test_paste_requires_edit_operation() {
        let (mut state, _, _) = sample_state();
        let mut cmd = PasteCel::new(FramePosition::new(0, 1), FramePosition::new(0, 0), None);
        assert!(matches!(cmd.redo(&mut state), Err(CommandError::NoEditOperation)));
        assert_eq!(cel(&state, 0, 1), None);
    }

    #[test]
    fn test_paste_copy_duplicates_layer() {
        let (mut state, a, _) = sample_state();
        let mut cmd = PasteCel::new(
            FramePosition::new(0, 1),
            FramePosition::new(0, 0),
            Some(EditOperation::Copy),
        );
        cmd.redo(&mut state).unwrap();
        let pasted = cel(&state, 0, 1).unwrap();
        assert_ne!(pasted, a);
        assert_eq!(cel(&state, 0, 0), Some(a));
        assert_eq!(state.layers.raster_count(), 3);

        cmd.undo(&mut state).unwrap();
        assert_eq!(cel(&state, 0, 1), None);
        assert_eq!(state.layers.raster_count(), 2);
    }

    #[test]
    fn test_paste_cut_moves_cel() {
        let (mut state, a, _) = sample_state();
        let mut cmd = PasteCel::new(
            FramePosition::new(0, 1),
            FramePosition::new(0, 0),
            Some(EditOperation::Cut),
        );
        cmd.redo(&mut state).unwrap();
        assert_eq!(cel(&state, 0, 1), Some(a));
        assert_eq!(cel(&state, 0, 0), None);
        assert_eq!(state.layers.raster_count(), 2);

        cmd.undo(&mut state).unwrap();
        assert_eq!(cel(&state, 0, 0), Some(a));
        assert_eq!(cel(&state, 0, 1), None);
    }

    #[test]
    fn test_paste_from_empty_frame() {
        let (mut state, _, _) = sample_state();
        let mut cmd = PasteCel::new(
            FramePosition::new(0, 3),
            FramePosition::new(0, 1),
            Some(EditOperation::Copy),
        );
        assert!(matches!(cmd.redo(&mut state), Err(CommandError::NothingToPaste)));
    }

    #[test]
    fn test_insert_frames_round_trip() {
        let (mut state, _, b) = sample_state();
        let mut cmd = InsertFrames::new(0, 1, 2);
        cmd.redo(&mut state).unwrap();
        assert_eq!(cel(&state, 0, 4), Some(b));
        cmd.undo(&mut state).unwrap();
        assert_eq!(cel(&state, 0, 2), Some(b));
        assert_eq!(state.timeline.layer().len(), 3);
    }

    #[test]
    fn test_remove_frame_round_trip() {
        let (mut state, a, b) = sample_state();
        let mut cmd = RemoveFrame::new(FramePosition::new(0, 0));
        cmd.redo(&mut state).unwrap();
        assert_eq!(cel(&state, 0, 1), Some(b));
        assert!(!state.layers.contains(a));

        cmd.undo(&mut state).unwrap();
        assert_eq!(cel(&state, 0, 0), Some(a));
        assert_eq!(cel(&state, 0, 2), Some(b));
        assert!(state.layers.contains(a));
        let keys: Vec<i64> = state.timeline.layer().keys().collect();
        assert_eq!(keys, vec![0, 1, 2]);
    }

    #[test]
    fn test_remove_only_frame_binds_replacement() {
        let a = LayerNode::raster("a", 4, 4);
        let ia = a.id;
        let mut timeline = TimeLine::new();
        timeline.layer_mut().set(0, Frame::with_cel(ia));
        let mut state = AnimationState::new(timeline, LayerStack::from_nodes(4, 4, vec![a]));

        let mut cmd = RemoveFrame::new(FramePosition::new(0, 0));
        cmd.redo(&mut state).unwrap();
        let replacement = cel(&state, 0, 0).unwrap();
        assert_ne!(replacement, ia);
        assert_eq!(state.layers.raster_ids(), vec![replacement]);

        cmd.undo(&mut state).unwrap();
        assert_eq!(cel(&state, 0, 0), Some(ia));
        assert_eq!(state.layers.raster_ids(), vec![ia]);

        cmd.redo(&mut state).unwrap();
        assert_eq!(cel(&state, 0, 0), Some(replacement));
    }

    #[test]
    fn test_remove_frame_without_cels_binds_nothing() {
        let background = LayerNode::raster("background", 4, 4);
        let id = background.id;
        let mut timeline = TimeLine::new();
        let mut key = Frame::new();
        key.is_key = true;
        timeline.layer_mut().set(0, key);
        let mut state = AnimationState::new(timeline, LayerStack::from_nodes(4, 4, vec![background]));

        let mut cmd = RemoveFrame::new(FramePosition::new(0, 0));
        cmd.redo(&mut state).unwrap();
        assert!(state.timeline.layer().is_empty());
        assert_eq!(state.layers.raster_ids(), vec![id]);

        cmd.undo(&mut state).unwrap();
        assert!(state.timeline.layer().peek(0).unwrap().is_key);
    }

    #[test]
    fn test_remove_last_cel_frame_keeps_shifted_frame() {
        let a = LayerNode::raster("a", 4, 4);
        let ia = a.id;
        let mut timeline = TimeLine::new();
        timeline.layer_mut().set(0, Frame::with_cel(ia));
        let mut key = Frame::new();
        key.is_key = true;
        timeline.layer_mut().set(1, key);
        let mut state = AnimationState::new(timeline, LayerStack::from_nodes(4, 4, vec![a]));

        let mut cmd = RemoveFrame::new(FramePosition::new(0, 0));
        cmd.redo(&mut state).unwrap();
        let frame = state.timeline.layer().peek(0).unwrap();
        assert!(frame.is_key);
        assert!(frame.cel.is_some_and(|cel| cel != ia));

        cmd.undo(&mut state).unwrap();
        let keys: Vec<i64> = state.timeline.layer().keys().collect();
        assert_eq!(keys, vec![0, 1]);
        assert_eq!(cel(&state, 0, 0), Some(ia));
        assert!(state.timeline.layer().peek(1).unwrap().is_key);
        assert!(state.timeline.layer().peek(1).unwrap().cel.is_none());
    }
}
