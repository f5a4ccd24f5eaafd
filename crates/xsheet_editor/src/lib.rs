// SPDX-License-Identifier: MIT OR Apache-2.0
//! Frame-by-frame animation editing on top of a paint layer stack.
//!
//! This crate keeps a [`xsheet_timeline::TimeLine`] and a [`LayerStack`] in
//! step:
//! - Undoable frame, cel and track commands with grouped history
//! - Layer stack sorting after the timeline
//! - Onion-skin presentation and frame-timed playback
//! - X-sheet side-car files and RON settings
//!
//! ## Architecture
//!
//! [`Animation`] is the entry point. Every edit it performs is an
//! [`AnimationCommand`] applied to the shared [`AnimationState`] and recorded
//! in the [`History`]; observers registered on the state are told when the
//! document or a canvas region changes.

pub mod animation;
pub mod commands;
pub mod history;
pub mod layers;
pub mod player;
pub mod settings;
pub mod sort;
pub mod state;
pub mod track_commands;
pub mod xsheet;

pub use animation::{Animation, AnimationError};
pub use commands::{AnimationCommand, CommandError, EditOperation, FramePosition};
pub use history::{History, HistoryError, MAX_HISTORY};
pub use layers::{LayerNode, LayerPath, LayerStack, LayerStackError, Rect};
pub use player::{FrameTimer, Player, PlayerState, TickOutcome};
pub use settings::{AnimationSettings, SettingsError};
pub use sort::{sort_layers, SortReport};
pub use state::{AnimationState, Observers};
pub use xsheet::{FormatRevision, LoadedSheet, XsheetError};
