//! Stop ratchet for trailing positions.
//!
//! A LONG stop level only moves up and a SHORT stop level only moves down.
//! Once trailing is active every proposed stop passes through `apply`, which
//! drops any candidate that would widen the stop.

use serde::Serialize;

use crate::domain::Direction;

/// Stop level that only moves toward the position's favorable side.
///
/// - Long positions: stop can only rise
/// - Short positions: stop can only fall
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RatchetState {
    level: f64,
    direction: Direction,
}

impl RatchetState {
    pub fn new(direction: Direction, initial_level: f64) -> Self {
        Self {
            level: initial_level,
            direction,
        }
    }

    /// Apply the ratchet to a proposed stop and return the resulting level.
    ///
    /// # Example
    /// ```
    /// use exitlab_core::domain::Direction;
    /// use exitlab_core::engine::RatchetState;
    ///
    /// let mut ratchet = RatchetState::new(Direction::Long, 95.0);
    ///
    /// // Tightening: 95 → 100 (allowed)
    /// assert_eq!(ratchet.apply(100.0), 100.0);
    ///
    /// // Loosening: 100 → 90 (blocked, stays at 100)
    /// assert_eq!(ratchet.apply(90.0), 100.0);
    /// ```
    pub fn apply(&mut self, proposed: f64) -> f64 {
        if self.direction.is_tighter(proposed, self.level) {
            self.level = proposed;
        }
        self.level
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}
