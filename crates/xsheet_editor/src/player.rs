// SPDX-License-Identifier: MIT OR Apache-2.0
//! Playback state and frame timing.
//!
//! The host drives playback: after every tick it schedules the next one
//! after [`TickOutcome::next_delay`]. Lateness accumulates and is taken off
//! the following delays so the average rate stays on target.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Requested playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerState {
    /// Advancing frames
    Play,
    /// Halt at the current frame on the next tick
    Pause,
    /// Halt and return to the frame shown before playback on the next tick
    Stop,
}

/// What the host should do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    /// Schedule another tick
    pub keep_playing: bool,
    /// Delay until that tick
    pub next_delay: Duration,
}

impl TickOutcome {
    /// Outcome ending playback
    pub fn stopped() -> Self {
        Self {
            keep_playing: false,
            next_delay: Duration::ZERO,
        }
    }
}

/// Drift-correcting frame timer
#[derive(Debug, Clone)]
pub struct FrameTimer {
    interval_ms: f64,
    overrun_ms: f64,
    last_tick: Option<Instant>,
}

impl FrameTimer {
    /// Timer for `framerate` frames per second
    pub fn new(framerate: f64) -> Self {
        Self {
            interval_ms: interval_for(framerate),
            overrun_ms: 0.0,
            last_tick: None,
        }
    }

    /// Target milliseconds per frame
    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    /// Accumulated lateness in milliseconds
    pub fn overrun_ms(&self) -> f64 {
        self.overrun_ms
    }

    /// Change the rate; accumulated lateness is kept
    pub fn set_framerate(&mut self, framerate: f64) {
        self.interval_ms = interval_for(framerate);
    }

    /// Reset and start measuring from `now`
    pub fn start(&mut self, now: Instant) {
        self.overrun_ms = 0.0;
        self.last_tick = Some(now);
    }

    /// Account for a tick at `now` and return the delay until the next one
    pub fn tick(&mut self, now: Instant) -> Duration {
        let elapsed_ms = match self.last_tick {
            Some(last) => now.saturating_duration_since(last).as_secs_f64() * 1000.0,
            None => self.interval_ms,
        };
        self.last_tick = Some(now);
        Duration::from_secs_f64(self.advance(elapsed_ms) / 1000.0)
    }

    /// Next delay in milliseconds after a tick that came `elapsed_ms` after the previous one
    pub fn advance(&mut self, elapsed_ms: f64) -> f64 {
        self.overrun_ms += elapsed_ms - self.interval_ms;
        (self.interval_ms - self.overrun_ms).max(0.0)
    }
}

fn interval_for(framerate: f64) -> f64 {
    if framerate > 0.0 {
        1000.0 / framerate
    } else {
        tracing::warn!(framerate, "Invalid frame rate, using 24");
        1000.0 / 24.0
    }
}

/// Playback session bookkeeping
#[derive(Debug, Clone)]
pub struct Player {
    state: Option<PlayerState>,
    timer: FrameTimer,
    beforeplay_frame: i64,
    use_lightbox: bool,
}

impl Player {
    /// Idle player at `framerate`
    pub fn new(framerate: f64) -> Self {
        Self {
            state: None,
            timer: FrameTimer::new(framerate),
            beforeplay_frame: 0,
            use_lightbox: false,
        }
    }

    /// Current request, `None` when idle
    pub fn state(&self) -> Option<PlayerState> {
        self.state
    }

    /// Whether a session is running
    pub fn is_playing(&self) -> bool {
        self.state.is_some()
    }

    /// Whether every tick recomputes the onion skin
    pub fn use_lightbox(&self) -> bool {
        self.use_lightbox
    }

    /// Frame shown when playback started
    pub fn beforeplay_frame(&self) -> i64 {
        self.beforeplay_frame
    }

    /// The frame timer
    pub fn timer(&self) -> &FrameTimer {
        &self.timer
    }

    /// Mutable frame timer
    pub fn timer_mut(&mut self) -> &mut FrameTimer {
        &mut self.timer
    }

    /// Begin a session remembering `current_frame`
    pub fn start(&mut self, current_frame: i64, use_lightbox: bool, now: Instant) {
        self.state = Some(PlayerState::Play);
        self.beforeplay_frame = current_frame;
        self.use_lightbox = use_lightbox;
        self.timer.start(now);
    }

    /// Ask the session to halt at the next tick
    pub fn request(&mut self, state: PlayerState) {
        if self.state.is_some() {
            self.state = Some(state);
        }
    }

    /// End the session, returning the request that ended it
    pub fn finish(&mut self) -> Option<PlayerState> {
        self.state.take()
    }
}
