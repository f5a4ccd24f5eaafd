// SPDX-License-Identifier: MIT OR Apache-2.0
//! Navigation errors.
//!
//! These signal broken preconditions: callers are expected to check the
//! matching `has_*` predicate before navigating.

use thiserror::Error;

/// Timeline navigation and track errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimelineError {
    /// No frame with a different cel after the current one
    #[error("There is no next frame with cel")]
    NoNextCel,

    /// No frame with a different cel before the current one
    #[error("There is no previous frame with cel")]
    NoPreviousCel,

    /// No key frame after the current one
    #[error("Trying to go to nonexistent next keyframe")]
    NoNextKey,

    /// No key frame before the current one
    #[error("Trying to go to nonexistent previous keyframe")]
    NoPreviousKey,

    /// Already at the last track
    #[error("Trying to go to next at the last layer")]
    NoNextLayer,

    /// Already at the first track
    #[error("Trying to go to previous at the first layer")]
    NoPreviousLayer,

    /// Track index outside the timeline
    #[error("Layer index out of range: {index} (have {count})")]
    LayerOutOfRange {
        /// Requested track
        index: usize,
        /// Number of tracks
        count: usize,
    },
}

/// Result type for timeline operations
pub type Result<T> = std::result::Result<T, TimelineError>;
