//! Turn token rotation and round clock arithmetic.

use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;

use crate::state::room::{Player, PlayerId};

/// Client-local view of the token during one round.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TurnState {
    /// Round not running.
    #[default]
    Idle,
    /// Token assigned, waiting for the holder to act.
    AwaitingPass { holder: PlayerId },
    /// Holder acted; the hand-off animation lock is in effect.
    Thrown { holder: PlayerId },
    /// Round clock ran out while `loser` held the token.
    Expired { loser: Option<PlayerId> },
}

impl TurnState {
    /// A hand-off is in flight and further passes must wait.
    pub fn is_thrown(&self) -> bool {
        matches!(self, TurnState::Thrown { .. })
    }
}

/// First player in turn order.
pub fn first_holder(players: &IndexMap<PlayerId, Player>) -> Option<&PlayerId> {
    players.keys().next()
}

/// Player after `current` in turn order, wrapping around.
///
/// Returns `None` when `current` is not in the roster.
pub fn next_holder<'a>(
    players: &'a IndexMap<PlayerId, Player>,
    current: &str,
) -> Option<&'a PlayerId> {
    let index = players.get_index_of(current)?;
    players
        .get_index((index + 1) % players.len())
        .map(|(id, _)| id)
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

/// Authoritative round window shared by every observer.
///
/// Observers derive the remaining time from the persisted end instead of
/// decrementing their own counters, so they cannot drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundClock {
    pub ends_at_ms: i64,
    pub duration_secs: u32,
}

impl RoundClock {
    pub fn new(ends_at_ms: i64, duration_secs: u32) -> Self {
        Self {
            ends_at_ms,
            duration_secs,
        }
    }

    /// Clock for a round of `duration_secs` starting at `now_ms`.
    pub fn starting_at(now_ms: i64, duration_secs: u32) -> Self {
        Self::new(now_ms + i64::from(duration_secs) * 1_000, duration_secs)
    }

    /// Whole seconds left, rounded up, never above the nominal duration.
    pub fn remaining_secs(&self, now_ms: i64) -> u32 {
        let left_ms = (self.ends_at_ms - now_ms).max(0);
        let secs = (left_ms + 999) / 1_000;
        u32::try_from(secs)
            .unwrap_or(u32::MAX)
            .min(self.duration_secs)
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.ends_at_ms
    }
}

/// Outcome of one countdown tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    Running { remaining: u32, scale: f32 },
    Expired,
}

/// Evaluate the countdown at `remaining` seconds.
pub fn tick(duration_secs: u32, remaining: u32, scale_factor: f32) -> TickOutcome {
    if remaining == 0 {
        return TickOutcome::Expired;
    }
    TickOutcome::Running {
        remaining,
        scale: danger_scale(duration_secs, remaining, scale_factor),
    }
}

/// Presentational "danger" scale that grows as the round runs out.
///
/// Every observer recomputes it from `remaining`; it is never persisted.
pub fn danger_scale(duration_secs: u32, remaining: u32, scale_factor: f32) -> f32 {
    if duration_secs == 0 {
        return 1.0;
    }
    let duration = duration_secs as f32;
    let elapsed = duration - remaining.min(duration_secs) as f32;
    1.0 + (elapsed / duration) * scale_factor
}
