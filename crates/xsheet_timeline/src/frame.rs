// SPDX-License-Identifier: MIT OR Apache-2.0
//! Single cells of the exposure sheet.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Handle to a raster layer owned by the external layer stack.
///
/// Frames never own the layer they show; the handle stays valid only as
/// long as the stack keeps a node with this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerId(pub Uuid);

impl LayerId {
    /// Create a new random layer ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell cels apart in logs
        let simple = self.0.simple().to_string();
        write!(f, "cel:{}", &simple[..8])
    }
}

/// A frame of one animated layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Whether this frame is a key (pose) frame
    pub is_key: bool,
    /// Whether the cel of this frame is hidden from onion-skinning
    pub skip_visible: bool,
    /// Free-form description
    pub description: String,
    /// The raster layer drawn from this frame on
    pub cel: Option<LayerId>,
}

impl Frame {
    /// Create an empty frame
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a frame showing `cel`
    pub fn with_cel(cel: LayerId) -> Self {
        Self {
            cel: Some(cel),
            ..Default::default()
        }
    }

    /// Mark as key frame
    pub fn set_key(&mut self) {
        self.is_key = true;
    }

    /// Clear the key flag
    pub fn unset_key(&mut self) {
        self.is_key = false;
    }

    /// Flip the key flag
    pub fn toggle_key(&mut self) {
        self.is_key = !self.is_key;
    }

    /// Flip the skip-visible flag
    pub fn toggle_skip_visible(&mut self) {
        self.skip_visible = !self.skip_visible;
    }

    /// Bind a cel to this frame
    pub fn add_cel(&mut self, cel: LayerId) {
        self.cel = Some(cel);
    }

    /// Unbind the cel, returning it
    pub fn remove_cel(&mut self) -> Option<LayerId> {
        self.cel.take()
    }

    /// Whether a cel is bound
    pub fn has_cel(&self) -> bool {
        self.cel.is_some()
    }

    /// Whether the frame carries any information worth storing.
    ///
    /// Frames that are not needed are dropped by [`crate::FrameList::cleanup`].
    pub fn is_needed(&self) -> bool {
        self.is_key || self.skip_visible || self.cel.is_some() || !self.description.is_empty()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Frame:")?;
        if self.is_key {
            write!(f, " KEY")?;
        }
        if self.skip_visible {
            write!(f, " skip-visible")?;
        }
        if let Some(cel) = self.cel {
            write!(f, " {cel}")?;
        }
        write!(f, " \"{}\">", self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_frame_not_needed() {
        let frame = Frame::new();
        assert!(!frame.is_needed());
        assert!(!frame.has_cel());
    }

    #[test]
    fn test_needed_flags() {
        let mut frame = Frame::new();
        frame.toggle_key();
        assert!(frame.is_needed());
        frame.unset_key();

        frame.description = "walk".to_string();
        assert!(frame.is_needed());
        frame.description.clear();

        frame.toggle_skip_visible();
        assert!(frame.is_needed());
        frame.toggle_skip_visible();

        let cel = LayerId::new();
        frame.add_cel(cel);
        assert!(frame.is_needed());
        assert_eq!(frame.remove_cel(), Some(cel));
        assert!(!frame.is_needed());
    }

    #[test]
    fn test_display() {
        let mut frame = Frame::new();
        frame.set_key();
        frame.description = "hold".to_string();
        assert_eq!(frame.to_string(), "<Frame: KEY \"hold\">");
    }
}
