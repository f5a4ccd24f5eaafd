// SPDX-License-Identifier: MIT OR Apache-2.0
//! The animation facade.
//!
//! Owns the timeline, the layer stack and the undo history, and exposes the
//! verbs the UI calls. Edits go through commands; live preview settings
//! (opacity factor, category toggles) and playback mutate the state
//! directly.

use crate::commands::{
    AddCel, AnimationCommand, ChangeDescription, CommandError, EditOperation, FramePosition, InsertFrames,
    PasteCel, RemoveCel, RemoveFrame, SelectAnimatedLayer, SelectFrame, ToggleKey, ToggleSkipVisible,
};
use crate::history::{History, HistoryError};
use crate::layers::LayerStack;
use crate::player::{Player, PlayerState, TickOutcome};
use crate::settings::{AnimationSettings, SettingsError};
use crate::state::{AnimationState, Observers};
use crate::track_commands::{
    DuplicateAnimatedLayer, InsertAnimatedLayer, MergeAnimatedLayers, MoveAnimatedLayer, RemoveAnimatedLayer,
    SortLayers,
};
use crate::xsheet::{self, LoadedSheet, XsheetError};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use xsheet_timeline::{Direction, LayerId, OpacityCategory, TimeLine, TimelineError};

/// Facade errors
#[derive(Debug, Error)]
pub enum AnimationError {
    /// Navigation precondition failed
    #[error("Timeline error: {0}")]
    Timeline(#[from] TimelineError),

    /// Command failed
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// Undo/redo failed
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    /// Loading or saving the sheet failed
    #[error("X-sheet error: {0}")]
    Xsheet(#[from] XsheetError),

    /// Settings could not be read or written
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
}

/// Result type for facade verbs
pub type Result<T> = std::result::Result<T, AnimationError>;

/// An animated document
#[derive(Debug)]
pub struct Animation {
    state: AnimationState,
    history: History,
    player: Player,
    framerate: f64,
    play_lightbox: bool,
    edit_operation: Option<EditOperation>,
    edit_frame: Option<FramePosition>,
    edit_cel: Option<LayerId>,
}

impl Animation {
    /// Animate `layers` with an empty sheet
    pub fn new(layers: LayerStack, settings: &AnimationSettings) -> Self {
        let timeline = TimeLine::with_config(settings.opacity_config());
        Self {
            state: AnimationState::new(timeline, layers),
            history: History::with_max_depth(settings.history_depth),
            player: Player::new(settings.framerate),
            framerate: settings.framerate,
            play_lightbox: settings.play_lightbox,
            edit_operation: None,
            edit_frame: None,
            edit_cel: None,
        }
    }

    // ---- accessors ----

    /// Shared state
    pub fn state(&self) -> &AnimationState {
        &self.state
    }

    /// The exposure sheet
    pub fn timeline(&self) -> &TimeLine {
        &self.state.timeline
    }

    /// The document's layers
    pub fn layers(&self) -> &LayerStack {
        &self.state.layers
    }

    /// Register observers
    pub fn observers_mut(&mut self) -> &mut Observers {
        &mut self.state.observers
    }

    /// Undo history
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Frames per second
    pub fn framerate(&self) -> f64 {
        self.framerate
    }

    /// Playback request, `None` when idle
    pub fn player_state(&self) -> Option<PlayerState> {
        self.player.state()
    }

    /// Pending clipboard operation
    pub fn edit_operation(&self) -> Option<EditOperation> {
        self.edit_operation
    }

    /// Read and reset the presentation-invalidated flag
    pub fn take_cleared(&mut self) -> bool {
        std::mem::take(&mut self.state.cleared)
    }

    /// Current track and frame
    pub fn current_position(&self) -> FramePosition {
        FramePosition::new(self.state.timeline.layer_idx(), self.state.timeline.idx())
    }

    fn execute(&mut self, command: impl AnimationCommand + 'static) -> Result<()> {
        self.history.execute(Box::new(command), &mut self.state)?;
        Ok(())
    }

    fn execute_sorted(&mut self, command: impl AnimationCommand + 'static) -> Result<()> {
        let commands: Vec<Box<dyn AnimationCommand>> = vec![Box::new(command), Box::new(SortLayers::new())];
        self.history.execute_all(commands, &mut self.state)?;
        Ok(())
    }

    // ---- frame selection ----

    /// Select frame `n` (undoable)
    pub fn select(&mut self, n: i64) -> Result<()> {
        self.execute(SelectFrame::new(n))
    }

    /// Select frame `n` without recording it
    pub fn select_without_undo(&mut self, n: i64) {
        self.state.timeline.select(n);
        self.state.update_opacities();
        self.state.notify_document();
    }

    /// Step forward one frame, or to the next different cel
    pub fn next_frame(&mut self, with_cel: bool) -> Result<()> {
        let timeline = &self.state.timeline;
        let target = if with_cel {
            timeline.next_cel(timeline.layer_idx()).ok_or(TimelineError::NoNextCel)?
        } else {
            timeline.idx() + 1
        };
        self.select(target)
    }

    /// Step back one frame, or to the previous different cel
    pub fn previous_frame(&mut self, with_cel: bool) -> Result<()> {
        let timeline = &self.state.timeline;
        let target = if with_cel {
            timeline
                .previous_cel(timeline.layer_idx())
                .ok_or(TimelineError::NoPreviousCel)?
        } else {
            timeline.idx() - 1
        };
        self.select(target)
    }

    /// Jump to the next key on any track
    pub fn next_keyframe(&mut self) -> Result<()> {
        let timeline = &self.state.timeline;
        let key = timeline
            .next_key(timeline.layer_idx(), true)
            .ok_or(TimelineError::NoNextKey)?;
        self.select(key)
    }

    /// Jump to the previous key on any track
    pub fn previous_keyframe(&mut self) -> Result<()> {
        let timeline = &self.state.timeline;
        let key = timeline
            .previous_key(timeline.layer_idx(), true)
            .ok_or(TimelineError::NoPreviousKey)?;
        self.select(key)
    }

    // ---- track selection ----

    /// Make track `n` current
    pub fn select_layer(&mut self, n: usize) -> Result<()> {
        self.execute(SelectAnimatedLayer::new(n))
    }

    /// Make the next track current
    pub fn next_layer(&mut self) -> Result<()> {
        if !self.state.timeline.has_next_layer() {
            return Err(TimelineError::NoNextLayer.into());
        }
        self.select_layer(self.state.timeline.layer_idx() + 1)
    }

    /// Make the previous track current
    pub fn previous_layer(&mut self) -> Result<()> {
        if !self.state.timeline.has_previous_layer() {
            return Err(TimelineError::NoPreviousLayer.into());
        }
        self.select_layer(self.state.timeline.layer_idx() - 1)
    }

    // ---- frame edits ----

    /// Flip the key flag of the current frame
    pub fn toggle_key(&mut self) -> Result<()> {
        self.execute(ToggleKey::new(self.current_position()))
    }

    /// Flip the skip-visible flag of the current frame
    pub fn toggle_skip_visible(&mut self) -> Result<()> {
        self.execute(ToggleSkipVisible::new(self.current_position()))
    }

    /// Describe the current frame
    pub fn change_description(&mut self, description: impl Into<String>) -> Result<()> {
        self.execute(ChangeDescription::new(self.current_position(), description))
    }

    /// Give the current frame a fresh cel
    pub fn add_cel(&mut self) -> Result<()> {
        self.execute_sorted(AddCel::new(self.current_position()))
    }

    /// Unbind the cel of the current frame
    pub fn remove_cel(&mut self) -> Result<()> {
        self.execute_sorted(RemoveCel::new(self.current_position()))
    }

    /// Open `amount` blank frames at the current frame
    pub fn insert_frames(&mut self, amount: usize) -> Result<()> {
        let pos = self.current_position();
        self.execute_sorted(InsertFrames::new(pos.track, pos.frame, amount))
    }

    /// Delete the current frame
    pub fn remove_frame(&mut self) -> Result<()> {
        self.execute_sorted(RemoveFrame::new(self.current_position()))
    }

    // ---- track edits ----

    /// Add a track after the current one
    pub fn add_layer(&mut self) -> Result<()> {
        self.execute_sorted(InsertAnimatedLayer::new(self.state.timeline.layer_idx() + 1))
    }

    /// Delete track `idx`
    pub fn remove_layer(&mut self, idx: usize) -> Result<()> {
        self.execute_sorted(RemoveAnimatedLayer::new(idx))
    }

    /// Duplicate track `idx`
    pub fn duplicate_layer(&mut self, idx: usize) -> Result<()> {
        self.execute_sorted(DuplicateAnimatedLayer::new(idx))
    }

    /// Merge `tracks` into one
    pub fn merge_layers(&mut self, tracks: Vec<usize>) -> Result<()> {
        self.execute_sorted(MergeAnimatedLayers::new(tracks))
    }

    /// Move track `from` to `to`
    pub fn move_layer(&mut self, from: usize, to: usize) -> Result<()> {
        self.execute_sorted(MoveAnimatedLayer::new(from, to))
    }

    /// Regroup the layer stack after the timeline
    pub fn sort_layers(&mut self) -> Result<()> {
        self.execute(SortLayers::new())
    }

    // ---- clipboard ----

    /// Whether the current frame has a cel to cut or copy
    pub fn can_cutcopy(&self) -> bool {
        self.state.timeline.selected().map_or(false, |frame| frame.has_cel())
    }

    /// Remember the cel of the current frame as paste source
    pub fn cutcopy_cel(&mut self, operation: EditOperation) -> Result<()> {
        let cel = self
            .state
            .timeline
            .selected()
            .and_then(|frame| frame.cel)
            .ok_or(CommandError::NothingToPaste)?;
        self.edit_operation = Some(operation);
        self.edit_frame = Some(self.current_position());
        self.edit_cel = Some(cel);
        Ok(())
    }

    /// Where the remembered cel sits now.
    ///
    /// Structural edits since the cut or copy can move it; the cel is then
    /// looked up by id.
    fn paste_source(&self) -> Option<FramePosition> {
        let cel = self.edit_cel?;
        let shows_cel = |pos: FramePosition| {
            self.state
                .timeline
                .get_layer(pos.track)
                .ok()
                .and_then(|track| track.peek(pos.frame))
                .and_then(|frame| frame.cel)
                == Some(cel)
        };
        if let Some(pos) = self.edit_frame.filter(|pos| shows_cel(*pos)) {
            return Some(pos);
        }
        self.state
            .timeline
            .position_of(cel)
            .map(|(track, frame)| FramePosition::new(track, frame))
    }

    fn clear_clipboard(&mut self) {
        self.edit_operation = None;
        self.edit_frame = None;
        self.edit_cel = None;
    }

    /// Whether a paste onto the current frame would succeed
    pub fn can_paste(&self) -> bool {
        let target = self.current_position();
        self.edit_operation.is_some()
            && self.paste_source().map_or(false, |source| source != target)
            && !self.state.timeline.selected().map_or(false, |frame| frame.has_cel())
    }

    /// Paste the remembered cel onto the current frame
    pub fn paste_cel(&mut self) -> Result<()> {
        let target = self.current_position();
        let source = self.paste_source().ok_or(CommandError::NothingToPaste)?;
        self.execute_sorted(PasteCel::new(target, source, self.edit_operation))?;
        if self.edit_operation == Some(EditOperation::Cut) {
            self.clear_clipboard();
        }
        Ok(())
    }

    // ---- presentation ----

    /// Change the playback rate
    pub fn set_framerate(&mut self, framerate: f64) {
        self.framerate = framerate;
        self.player.timer_mut().set_framerate(framerate);
        self.state.notify_document();
    }

    /// Change the global onion-skin factor; not recorded in history
    pub fn change_opacity_factor(&mut self, factor: f32) {
        self.state.timeline.set_opacity_factor(factor);
        self.state.update_opacities();
    }

    /// Show or hide one onion-skin category
    pub fn toggle_opacity(&mut self, category: OpacityCategory, active: bool) {
        self.state.timeline.set_category_active(category, active);
        self.state.update_opacities();
    }

    /// Show or hide one onion-skin direction
    pub fn toggle_nextprev(&mut self, direction: Direction, active: bool) {
        self.state.timeline.set_direction_active(direction, active);
        self.state.update_opacities();
    }

    /// Hide every cel layer
    pub fn hide_all_frames(&mut self) {
        self.state.hide_all_frames();
    }

    // ---- history ----

    /// Undo the last step
    pub fn undo(&mut self) -> Result<String> {
        Ok(self.history.undo(&mut self.state)?)
    }

    /// Redo the last undone step
    pub fn redo(&mut self) -> Result<String> {
        Ok(self.history.redo(&mut self.state)?)
    }

    // ---- playback ----

    fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.player.timer().interval_ms() / 1000.0)
    }

    /// Begin playback; the host ticks after the returned delay
    pub fn start_playback(&mut self, from_first_frame: bool, now: Instant) -> TickOutcome {
        self.player.start(self.state.timeline.idx(), self.play_lightbox, now);
        if from_first_frame {
            if let Some(first) = self.state.timeline.first() {
                self.state.timeline.seek(first);
            }
        }
        if self.play_lightbox {
            self.state.update_opacities();
        } else {
            self.state.show_only_frame(self.state.timeline.idx());
        }
        tracing::debug!(frame = self.state.timeline.idx(), framerate = self.framerate, "Playback started");
        TickOutcome {
            keep_playing: true,
            next_delay: self.interval(),
        }
    }

    /// Start, or resume after a pause request
    pub fn play(&mut self, now: Instant) -> TickOutcome {
        if self.player.is_playing() {
            self.player.request(PlayerState::Play);
            return TickOutcome {
                keep_playing: true,
                next_delay: self.interval(),
            };
        }
        self.start_playback(false, now)
    }

    /// Halt at the current frame on the next tick
    pub fn pause(&mut self) {
        self.player.request(PlayerState::Pause);
    }

    /// Pause when playing, play otherwise
    pub fn playpause(&mut self, now: Instant) -> Option<TickOutcome> {
        if self.player.state() == Some(PlayerState::Play) {
            self.pause();
            None
        } else {
            Some(self.play(now))
        }
    }

    /// Halt and go back to the frame shown before playback on the next tick
    pub fn stop(&mut self) {
        self.player.request(PlayerState::Stop);
    }

    /// Advance playback by one frame
    pub fn player_tick(&mut self, now: Instant) -> TickOutcome {
        let Some(request) = self.player.state() else {
            return TickOutcome::stopped();
        };
        let next_delay = self.player.timer_mut().tick(now);
        match request {
            PlayerState::Play => {
                self.player_next();
                TickOutcome {
                    keep_playing: true,
                    next_delay,
                }
            }
            PlayerState::Pause => {
                self.player.finish();
                self.select_without_undo(self.state.timeline.idx());
                tracing::debug!(frame = self.state.timeline.idx(), "Playback paused");
                TickOutcome::stopped()
            }
            PlayerState::Stop => {
                self.player.finish();
                self.select_without_undo(self.player.beforeplay_frame());
                tracing::debug!(frame = self.state.timeline.idx(), "Playback stopped");
                TickOutcome::stopped()
            }
        }
    }

    fn player_next(&mut self) {
        let timeline = &mut self.state.timeline;
        let prev = timeline.idx();
        if timeline.has_next(false) {
            timeline.seek(prev + 1);
        } else {
            timeline.seek(timeline.first().unwrap_or(prev));
        }
        let current = timeline.idx();
        if self.player.use_lightbox() {
            self.state.update_opacities();
        } else {
            self.state.change_visible_frame(prev, current);
        }
    }

    // ---- persistence ----

    /// The sheet as JSON
    pub fn xsheet_as_str(&self) -> Result<String> {
        Ok(xsheet::write_xsheet(&self.state.timeline, self.framerate, &self.state.layers)?)
    }

    /// Replace the sheet with parsed JSON
    pub fn str_to_xsheet(&mut self, data: &str) -> Result<()> {
        let config = self.state.timeline.opacity.clone();
        let loaded = xsheet::read_xsheet(data, &mut self.state.layers, config)?;
        self.install(loaded);
        Ok(())
    }

    fn install(&mut self, loaded: LoadedSheet) {
        self.state.timeline = loaded.timeline;
        self.set_framerate(loaded.framerate);
        self.after_reset();
    }

    fn after_reset(&mut self) {
        self.history.clear();
        self.clear_clipboard();
        self.player.finish();
        self.state.cleared = true;
        self.state.update_opacities();
        self.state.notify_document();
    }

    /// Write the side-car sheet of `document`
    pub fn save_xsheet(&self, document: &Path) -> Result<PathBuf> {
        Ok(xsheet::save_for_document(
            document,
            &self.state.timeline,
            self.framerate,
            &self.state.layers,
        )?)
    }

    /// Read the side-car sheet of `document`; a missing file starts a fresh sheet.
    ///
    /// Returns whether a sheet was found.
    pub fn load_xsheet(&mut self, document: &Path) -> Result<bool> {
        let config = self.state.timeline.opacity.clone();
        match xsheet::load_for_document(document, &mut self.state.layers, config)? {
            Some(loaded) => {
                self.install(loaded);
                Ok(true)
            }
            None => {
                self.clear_xsheet();
                Ok(false)
            }
        }
    }

    /// Start over with an empty sheet
    pub fn clear_xsheet(&mut self) {
        let config = self.state.timeline.opacity.clone();
        self.state.timeline = TimeLine::with_config(config);
        self.after_reset();
    }
}
