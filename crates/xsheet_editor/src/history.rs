// SPDX-License-Identifier: MIT OR Apache-2.0
//! Undo/redo history of animation commands.
//!
//! Commands are applied when pushed and recorded in groups. Groups that only
//! hold automatic commands (playhead and track selection) stay open: the next
//! command joins them, so undoing an edit also restores the selection it was
//! made from.

use crate::commands::{AnimationCommand, CommandError};
use crate::state::AnimationState;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Maximum undo history depth
pub const MAX_HISTORY: usize = 100;

/// Commands an open automatic group takes before it is closed
pub const MAX_AUTOMATIC_RUN: usize = 64;

/// History errors
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Nothing to undo
    #[error("Nothing to undo")]
    NothingToUndo,

    /// Nothing to redo
    #[error("Nothing to redo")]
    NothingToRedo,

    /// A command failed while applying or reverting
    #[error("Command error: {0}")]
    Command(#[from] CommandError),
}

/// Result type for history operations
pub type Result<T> = std::result::Result<T, HistoryError>;

/// Unique operation ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationID(u64);

impl OperationID {
    /// Get the raw ID value
    pub fn value(&self) -> u64 {
        self.0
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Commands that are undone/redone together
#[derive(Debug)]
pub struct CommandGroup {
    /// Group ID
    pub id: OperationID,
    /// Human-readable description
    pub description: String,
    commands: Vec<Box<dyn AnimationCommand>>,
    /// Timestamp
    pub timestamp: u64,
}

impl CommandGroup {
    /// Whether every command in the group is automatic
    pub fn is_automatic(&self) -> bool {
        self.commands.iter().all(|cmd| cmd.automatic())
    }

    /// Number of commands
    pub fn count(&self) -> usize {
        self.commands.len()
    }

    /// Undo every command; on failure the ones already undone are redone
    fn undo_all(&mut self, state: &mut AnimationState) -> std::result::Result<(), CommandError> {
        for i in (0..self.commands.len()).rev() {
            if let Err(err) = self.commands[i].undo(state) {
                for cmd in &mut self.commands[i + 1..] {
                    if let Err(redo_err) = cmd.redo(state) {
                        tracing::warn!(command = cmd.description(), error = %redo_err, "Failed to restore partial undo");
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Redo every command; on failure the ones already redone are undone
    fn redo_all(&mut self, state: &mut AnimationState) -> std::result::Result<(), CommandError> {
        for i in 0..self.commands.len() {
            if let Err(err) = self.commands[i].redo(state) {
                for cmd in self.commands[..i].iter_mut().rev() {
                    if let Err(undo_err) = cmd.undo(state) {
                        tracing::warn!(command = cmd.description(), error = %undo_err, "Failed to revert partial redo");
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }
}

/// History statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryStats {
    /// Groups in the undo stack
    pub undo_count: usize,
    /// Groups in the redo stack
    pub redo_count: usize,
    /// Commands across both stacks
    pub command_count: usize,
    /// Maximum history depth
    pub max_depth: usize,
}

/// Undo/redo history manager
#[derive(Debug)]
pub struct History {
    undo_stack: VecDeque<CommandGroup>,
    redo_stack: VecDeque<CommandGroup>,
    next_id: u64,
    max_depth: usize,
}

impl History {
    /// Create a new history manager
    pub fn new() -> Self {
        Self::with_max_depth(MAX_HISTORY)
    }

    /// Create with custom maximum depth
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            next_id: 1,
            max_depth: max_depth.max(1),
        }
    }

    fn next_id(&mut self) -> OperationID {
        let id = OperationID(self.next_id);
        self.next_id += 1;
        id
    }

    /// Apply `command` and record it.
    ///
    /// A failed command is not recorded and leaves the redo stack alone.
    pub fn execute(&mut self, command: Box<dyn AnimationCommand>, state: &mut AnimationState) -> Result<()> {
        self.execute_all(vec![command], state)
    }

    /// Apply `commands` in order and record them as one undo step.
    ///
    /// When one fails, the ones already applied are reverted.
    pub fn execute_all(&mut self, commands: Vec<Box<dyn AnimationCommand>>, state: &mut AnimationState) -> Result<()> {
        let mut applied: Vec<Box<dyn AnimationCommand>> = Vec::with_capacity(commands.len());
        for mut command in commands {
            if let Err(err) = command.redo(state) {
                for done in applied.iter_mut().rev() {
                    if let Err(undo_err) = done.undo(state) {
                        tracing::warn!(command = done.description(), error = %undo_err, "Failed to revert partial step");
                    }
                }
                return Err(err.into());
            }
            tracing::debug!(command = command.description(), "Executed");
            applied.push(command);
        }
        self.record_group(applied);
        Ok(())
    }

    /// Record an already applied command
    pub fn record(&mut self, command: Box<dyn AnimationCommand>) {
        self.record_group(vec![command]);
    }

    fn record_group(&mut self, commands: Vec<Box<dyn AnimationCommand>>) {
        let Some(first) = commands.first() else {
            return;
        };
        let automatic = commands.iter().all(|cmd| cmd.automatic());
        let description = commands
            .iter()
            .find(|cmd| !cmd.automatic())
            .unwrap_or(first)
            .description()
            .to_string();
        self.redo_stack.clear();

        let run = commands.len();
        if let Some(open) = self
            .undo_stack
            .back_mut()
            .filter(|group| group.is_automatic() && (!automatic || group.count() + run <= MAX_AUTOMATIC_RUN))
        {
            if !automatic {
                open.description = description;
            }
            open.commands.extend(commands);
            open.timestamp = now_secs();
            return;
        }

        let group = CommandGroup {
            id: self.next_id(),
            description,
            commands,
            timestamp: now_secs(),
        };
        self.undo_stack.push_back(group);

        while self.undo_stack.len() > self.max_depth {
            if let Some(old) = self.undo_stack.pop_front() {
                tracing::debug!(description = %old.description, "Dropped oldest history entry");
            }
        }
    }

    /// Undo the last group, returning its description.
    ///
    /// A group that fails to undo stays on the undo stack.
    pub fn undo(&mut self, state: &mut AnimationState) -> Result<String> {
        let mut group = self.undo_stack.pop_back().ok_or(HistoryError::NothingToUndo)?;
        if let Err(err) = group.undo_all(state) {
            self.undo_stack.push_back(group);
            return Err(err.into());
        }
        let description = group.description.clone();
        self.redo_stack.push_back(group);
        Ok(description)
    }

    /// Redo the last undone group, returning its description.
    ///
    /// A group that fails to redo stays on the redo stack.
    pub fn redo(&mut self, state: &mut AnimationState) -> Result<String> {
        let mut group = self.redo_stack.pop_back().ok_or(HistoryError::NothingToRedo)?;
        if let Err(err) = group.redo_all(state) {
            self.redo_stack.push_back(group);
            return Err(err.into());
        }
        let description = group.description.clone();
        self.undo_stack.push_back(group);
        Ok(description)
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Get undo stack depth
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    /// Get redo stack depth
    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Change the maximum depth, dropping the oldest groups if needed
    pub fn set_max_depth(&mut self, max_depth: usize) {
        self.max_depth = max_depth.max(1);
        while self.undo_stack.len() > self.max_depth {
            self.undo_stack.pop_front();
        }
    }

    /// Clear all history
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// Get history statistics
    pub fn stats(&self) -> HistoryStats {
        HistoryStats {
            undo_count: self.undo_stack.len(),
            redo_count: self.redo_stack.len(),
            command_count: self
                .undo_stack
                .iter()
                .chain(self.redo_stack.iter())
                .map(CommandGroup::count)
                .sum(),
            max_depth: self.max_depth,
        }
    }

    /// Get description of next undo operation
    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(|g| g.description.as_str())
    }

    /// Get description of next redo operation
    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.back().map(|g| g.description.as_str())
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::sample_state;
    use crate::commands::{FramePosition, SelectFrame, ToggleKey};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Fails both ways while the flag is set
    #[derive(Debug)]
    struct Failing(Arc<AtomicBool>);

    impl Failing {
        fn check(&self) -> std::result::Result<(), CommandError> {
            if self.0.load(Ordering::SeqCst) {
                return Err(CommandError::InvalidOperation("failing".to_string()));
            }
            Ok(())
        }
    }

    impl AnimationCommand for Failing {
        fn description(&self) -> &str {
            "Failing"
        }

        fn redo(&mut self, _state: &mut AnimationState) -> std::result::Result<(), CommandError> {
            self.check()
        }

        fn undo(&mut self, _state: &mut AnimationState) -> std::result::Result<(), CommandError> {
            self.check()
        }
    }

    fn is_key(state: &AnimationState, frame: i64) -> bool {
        state.timeline.layer().peek(frame).map_or(false, |f| f.is_key)
    }

    #[test]
    fn test_failed_undo_keeps_group() {
        let (mut state, _, _) = sample_state();
        let mut history = History::new();
        let fail = Arc::new(AtomicBool::new(false));
        history
            .execute_all(
                vec![
                    Box::new(ToggleKey::new(FramePosition::new(0, 1))),
                    Box::new(Failing(Arc::clone(&fail))),
                    Box::new(ToggleKey::new(FramePosition::new(0, 2))),
                ],
                &mut state,
            )
            .unwrap();

        fail.store(true, Ordering::SeqCst);
        assert!(matches!(history.undo(&mut state), Err(HistoryError::Command(_))));
        assert!(history.can_undo());
        assert!(!history.can_redo());
        assert!(is_key(&state, 1));
        assert!(is_key(&state, 2));

        fail.store(false, Ordering::SeqCst);
        history.undo(&mut state).unwrap();
        assert!(!is_key(&state, 1));
        assert!(!is_key(&state, 2));

        fail.store(true, Ordering::SeqCst);
        assert!(matches!(history.redo(&mut state), Err(HistoryError::Command(_))));
        assert!(history.can_redo());
        assert!(!history.can_undo());
        assert!(!is_key(&state, 1));

        fail.store(false, Ordering::SeqCst);
        history.redo(&mut state).unwrap();
        assert!(is_key(&state, 1));
        assert!(is_key(&state, 2));
    }

    #[test]
    fn test_automatic_run_is_bounded() {
        let (mut state, _, _) = sample_state();
        let mut history = History::new();
        let total = MAX_AUTOMATIC_RUN * 2 + 1;
        for frame in [0, 1, 2].into_iter().cycle().take(total) {
            history.execute(Box::new(SelectFrame::new(frame)), &mut state).unwrap();
        }
        assert_eq!(history.undo_depth(), 3);
        assert_eq!(history.stats().command_count, total);
        assert!(history.undo_stack.iter().all(|group| group.count() <= MAX_AUTOMATIC_RUN));

        history
            .execute(Box::new(ToggleKey::new(FramePosition::new(0, 1))), &mut state)
            .unwrap();
        assert_eq!(history.undo_depth(), 3);

        while history.can_undo() {
            history.undo(&mut state).unwrap();
        }
        assert_eq!(state.timeline.idx(), 0);
        assert!(!is_key(&state, 1));
    }

    #[test]
    fn test_undo_redo() {
        let (mut state, _, _) = sample_state();
        let mut history = History::new();
        assert!(!history.can_undo());

        history
            .execute(Box::new(ToggleKey::new(FramePosition::new(0, 1))), &mut state)
            .unwrap();
        assert!(history.can_undo());
        assert_eq!(history.undo_description(), Some("Toggle Key"));

        assert_eq!(history.undo(&mut state).unwrap(), "Toggle Key");
        assert!(!state.timeline.layer().peek(1).unwrap().is_key);
        assert!(history.can_redo());

        history.redo(&mut state).unwrap();
        assert!(state.timeline.layer().peek(1).unwrap().is_key);
    }

    #[test]
    fn test_empty_stacks() {
        let (mut state, _, _) = sample_state();
        let mut history = History::new();
        assert!(matches!(history.undo(&mut state), Err(HistoryError::NothingToUndo)));
        assert!(matches!(history.redo(&mut state), Err(HistoryError::NothingToRedo)));
    }

    #[test]
    fn test_selection_joins_next_edit() {
        let (mut state, _, _) = sample_state();
        let mut history = History::new();
        history.execute(Box::new(SelectFrame::new(1)), &mut state).unwrap();
        history.execute(Box::new(SelectFrame::new(2)), &mut state).unwrap();
        history
            .execute(Box::new(ToggleKey::new(FramePosition::new(0, 2))), &mut state)
            .unwrap();
        assert_eq!(history.undo_depth(), 1);
        assert_eq!(history.stats().command_count, 3);
        assert_eq!(history.undo_description(), Some("Toggle Key"));

        history.undo(&mut state).unwrap();
        assert_eq!(state.timeline.idx(), 0);
        assert!(!state.timeline.layer().peek(2).unwrap().is_key);

        history
            .execute(Box::new(ToggleKey::new(FramePosition::new(0, 0))), &mut state)
            .unwrap();
        assert_eq!(history.undo_depth(), 1);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_history_limit() {
        let (mut state, _, _) = sample_state();
        let mut history = History::with_max_depth(3);
        for frame in 0..5 {
            history
                .execute(Box::new(ToggleKey::new(FramePosition::new(0, frame))), &mut state)
                .unwrap();
        }
        assert_eq!(history.undo_depth(), 3);
        for _ in 0..3 {
            history.undo(&mut state).unwrap();
        }
        assert!(!history.can_undo());
        assert!(state.timeline.layer().peek(0).unwrap().is_key);
        assert!(state.timeline.layer().peek(1).unwrap().is_key);
        assert!(!state.timeline.layer().peek(2).unwrap().is_key);
    }

    #[test]
    fn test_execute_all_is_one_step() {
        let (mut state, _, _) = sample_state();
        let mut history = History::new();
        history
            .execute_all(
                vec![
                    Box::new(ToggleKey::new(FramePosition::new(0, 0))),
                    Box::new(ToggleKey::new(FramePosition::new(0, 1))),
                ],
                &mut state,
            )
            .unwrap();
        assert_eq!(history.undo_depth(), 1);
        history.undo(&mut state).unwrap();
        assert!(!state.timeline.layer().peek(0).unwrap().is_key);
        assert!(!state.timeline.layer().peek(1).unwrap().is_key);
    }

    #[test]
    fn test_execute_all_reverts_on_failure() {
        let (mut state, _, _) = sample_state();
        let mut history = History::new();
        let result = history.execute_all(
            vec![
                Box::new(ToggleKey::new(FramePosition::new(0, 0))),
                Box::new(ToggleKey::new(FramePosition::new(3, 0))),
            ],
            &mut state,
        );
        assert!(result.is_err());
        assert!(!state.timeline.layer().peek(0).unwrap().is_key);
        assert!(!history.can_undo());
    }

    #[test]
    fn test_failed_command_not_recorded() {
        let (mut state, _, _) = sample_state();
        let mut history = History::new();
        let result = history.execute(Box::new(ToggleKey::new(FramePosition::new(7, 0))), &mut state);
        assert!(matches!(result, Err(HistoryError::Command(_))));
        assert!(!history.can_undo());
    }
}
