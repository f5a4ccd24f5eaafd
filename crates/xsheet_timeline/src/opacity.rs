// SPDX-License-Identifier: MIT OR Apache-2.0
//! Onion-skin opacity configuration.
//!
//! Every cel that is not shown at the current frame falls into one
//! [`OpacityCategory`]. Each category has a base weight, scaled by a global
//! factor, and an on/off toggle. The `next`/`previous` toggles gate whole
//! directions.

use crate::frame::LayerId;
use crate::frame_list::Direction;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Exponent of the distance falloff
pub const FALLOFF_EXPONENT: f32 = -0.1;

/// Classification of a neighbouring cel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpacityCategory {
    /// The immediate next and previous cels
    Cel,
    /// The key cels right after and before the current frame
    Key,
    /// Cels between the current frame and those keys
    Inbetweens,
    /// Keys beyond the nearest ones
    OtherKeys,
    /// Everything else
    Other,
}

impl OpacityCategory {
    /// All categories, in priority order
    pub fn all() -> &'static [OpacityCategory] {
        &[
            OpacityCategory::Cel,
            OpacityCategory::Key,
            OpacityCategory::Inbetweens,
            OpacityCategory::OtherKeys,
            OpacityCategory::Other,
        ]
    }

    /// Name used in settings files
    pub fn name(&self) -> &'static str {
        match self {
            OpacityCategory::Cel => "cel",
            OpacityCategory::Key => "key",
            OpacityCategory::Inbetweens => "inbetweens",
            OpacityCategory::OtherKeys => "other keys",
            OpacityCategory::Other => "other",
        }
    }
}

/// One value per [`OpacityCategory`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryTable<T> {
    /// Immediate neighbours
    pub cel: T,
    /// Nearest keys
    pub key: T,
    /// Frames between the current frame and the nearest keys
    pub inbetweens: T,
    /// Further keys
    pub other_keys: T,
    /// Everything else
    pub other: T,
}

impl<T: Copy> CategoryTable<T> {
    /// Value for `category`
    pub fn get(&self, category: OpacityCategory) -> T {
        match category {
            OpacityCategory::Cel => self.cel,
            OpacityCategory::Key => self.key,
            OpacityCategory::Inbetweens => self.inbetweens,
            OpacityCategory::OtherKeys => self.other_keys,
            OpacityCategory::Other => self.other,
        }
    }

    /// Replace the value for `category`
    pub fn set(&mut self, category: OpacityCategory, value: T) {
        match category {
            OpacityCategory::Cel => self.cel = value,
            OpacityCategory::Key => self.key = value,
            OpacityCategory::Inbetweens => self.inbetweens = value,
            OpacityCategory::OtherKeys => self.other_keys = value,
            OpacityCategory::Other => self.other = value,
        }
    }

    /// Apply `f` to every value
    pub fn map<U>(&self, mut f: impl FnMut(T) -> U) -> CategoryTable<U> {
        CategoryTable {
            cel: f(self.cel),
            key: f(self.key),
            inbetweens: f(self.inbetweens),
            other_keys: f(self.other_keys),
            other: f(self.other),
        }
    }
}

impl CategoryTable<f32> {
    /// Base weights used by a bare timeline
    pub fn default_weights() -> Self {
        Self {
            cel: 0.5,
            key: 0.5,
            inbetweens: 0.25,
            other_keys: 0.25,
            other: 0.0,
        }
    }
}

impl CategoryTable<bool> {
    /// Every category on except `other`
    pub fn default_active() -> Self {
        Self {
            cel: true,
            key: true,
            inbetweens: true,
            other_keys: true,
            other: false,
        }
    }
}

/// Per-direction toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextPrev {
    /// Show cels after the current frame
    pub next: bool,
    /// Show cels before the current frame
    pub previous: bool,
}

impl NextPrev {
    /// Toggle for `direction`
    pub fn get(&self, direction: Direction) -> bool {
        match direction {
            Direction::Next => self.next,
            Direction::Previous => self.previous,
        }
    }

    /// Replace the toggle for `direction`
    pub fn set(&mut self, direction: Direction, active: bool) {
        match direction {
            Direction::Next => self.next = active,
            Direction::Previous => self.previous = active,
        }
    }
}

impl Default for NextPrev {
    fn default() -> Self {
        Self {
            next: true,
            previous: true,
        }
    }
}

/// Complete onion-skin configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpacityConfig {
    weights: CategoryTable<f32>,
    factor: f32,
    converted: CategoryTable<f32>,
    /// Which categories contribute
    pub active: CategoryTable<bool>,
    /// Which directions contribute
    pub nextprev: NextPrev,
}

impl OpacityConfig {
    /// Build a configuration from base weights
    pub fn new(weights: CategoryTable<f32>, active: CategoryTable<bool>, nextprev: NextPrev) -> Self {
        let mut config = Self {
            weights,
            factor: 1.0,
            converted: weights,
            active,
            nextprev,
        };
        config.convert();
        config
    }

    /// Base weights, before the factor
    pub fn weights(&self) -> &CategoryTable<f32> {
        &self.weights
    }

    /// Global factor applied to every weight
    pub fn factor(&self) -> f32 {
        self.factor
    }

    /// Replace some base weights
    pub fn setup_opacities(&mut self, weights: &[(OpacityCategory, f32)]) {
        for &(category, weight) in weights {
            self.weights.set(category, weight);
        }
        self.convert();
    }

    /// Change the global factor
    pub fn set_factor(&mut self, factor: f32) {
        self.factor = factor;
        self.convert();
    }

    /// Weight of `category` after the factor
    pub fn converted(&self, category: OpacityCategory) -> f32 {
        self.converted.get(category)
    }

    fn convert(&mut self) {
        let factor = self.factor;
        self.converted = self.weights.map(|w| w * factor);
    }

    /// Opacity for a cel of `category` found `distance` frames away in `direction`.
    ///
    /// Returns 0 when either toggle is off. The falloff is `|distance|^-0.1`,
    /// rounded to four decimals; distance 0 yields the plain weight.
    pub fn opacity_for(&self, direction: Direction, category: OpacityCategory, distance: i64) -> f32 {
        if !(self.nextprev.get(direction) && self.active.get(category)) {
            return 0.0;
        }
        falloff(self.converted(category), distance)
    }
}

impl Default for OpacityConfig {
    fn default() -> Self {
        Self::new(
            CategoryTable::default_weights(),
            CategoryTable::default_active(),
            NextPrev::default(),
        )
    }
}

/// `weight * |distance|^-0.1`, rounded to four decimals
pub fn falloff(weight: f32, distance: i64) -> f32 {
    let distance = distance.unsigned_abs();
    if distance == 0 {
        return weight;
    }
    let value = weight * (distance as f32).powf(FALLOFF_EXPONENT);
    (value * 10_000.0).round() / 10_000.0
}

/// Opacity and visibility per cel, in assignment order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Opacities {
    /// Opacity for every classified cel
    pub opacity: IndexMap<LayerId, f32>,
    /// Derived visibility (`opacity != 0`)
    pub visible: IndexMap<LayerId, bool>,
}

impl Opacities {
    /// Opacity assigned to `cel`
    pub fn get(&self, cel: LayerId) -> Option<f32> {
        self.opacity.get(&cel).copied()
    }

    /// Visibility assigned to `cel`
    pub fn is_visible(&self, cel: LayerId) -> Option<bool> {
        self.visible.get(&cel).copied()
    }

    /// Number of classified cels
    pub fn len(&self) -> usize {
        self.opacity.len()
    }

    /// Whether nothing was classified
    pub fn is_empty(&self) -> bool {
        self.opacity.is_empty()
    }

    /// Iterate `(cel, opacity, visible)`
    pub fn iter(&self) -> impl Iterator<Item = (LayerId, f32, bool)> + '_ {
        self.opacity
            .iter()
            .map(|(cel, opa)| (*cel, *opa, self.visible.get(cel).copied().unwrap_or(false)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_falloff_monotonic() {
        let values: Vec<f32> = [1, 2, 3, 10].iter().map(|d| falloff(0.5, *d)).collect();
        assert_eq!(values[0], 0.5);
        for pair in values.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
        assert!((values[1] - 0.4665).abs() < 1e-4);
        assert!((values[3] - 0.3972).abs() < 1e-4);
    }

    #[test]
    fn test_falloff_zero_distance() {
        assert_eq!(falloff(0.25, 0), 0.25);
        assert_eq!(falloff(0.25, -1), 0.25);
    }

    #[test]
    fn test_factor_scales_weights() {
        let mut config = OpacityConfig::default();
        config.set_factor(0.5);
        assert_eq!(config.converted(OpacityCategory::Cel), 0.25);
        assert_eq!(config.weights().cel, 0.5);
    }

    #[test]
    fn test_toggles_gate_opacity() {
        let mut config = OpacityConfig::default();
        assert!(config.opacity_for(Direction::Next, OpacityCategory::Cel, 1) > 0.0);
        config.nextprev.set(Direction::Next, false);
        assert_eq!(config.opacity_for(Direction::Next, OpacityCategory::Cel, 1), 0.0);
        assert!(config.opacity_for(Direction::Previous, OpacityCategory::Cel, 1) > 0.0);
        config.active.set(OpacityCategory::Cel, false);
        assert_eq!(config.opacity_for(Direction::Previous, OpacityCategory::Cel, 1), 0.0);
    }
}
