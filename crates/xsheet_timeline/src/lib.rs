// SPDX-License-Identifier: MIT OR Apache-2.0
//! Exposure-sheet (X-sheet) model for the paint animation editor.
//!
//! This crate provides the animation timeline data model:
//! - Frames with key/skip flags, descriptions and a cel handle
//! - Sparse per-track frame storage with index shifting
//! - Playhead navigation by frame, cel and key
//! - Onion-skin opacity computation
//!
//! ## Architecture
//!
//! The timeline never owns raster data. Cels are [`LayerId`] handles into
//! an external layer stack; keeping that stack consistent with the
//! timeline is the job of the editor crate.

pub mod error;
pub mod frame;
pub mod frame_list;
pub mod opacity;
pub mod timeline;

pub use error::TimelineError;
pub use frame::{Frame, LayerId};
pub use frame_list::{Direction, FrameList, DEFAULT_COMPOSITE, DEFAULT_TRACK_NAME};
pub use opacity::{falloff, CategoryTable, NextPrev, OpacityCategory, OpacityConfig, Opacities};
pub use timeline::TimeLine;
