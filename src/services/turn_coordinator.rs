//! Turn token hand-off and round countdown.
//!
//! The holder is persisted at `rooms/{code}/currentPlayer`. A pass moves it to
//! the next player in roster order with a compare-and-swap on the expected
//! holder, so a client acting on a stale snapshot cannot move the token twice.
//! A store failure during the hand-off hands the token back to the thrower and
//! is returned to the caller as [`ServiceError::TransientStore`].

use std::time::Duration;

use serde_json::Value;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{MissedTickBehavior, interval, sleep},
};
use tracing::{debug, info, warn};

use crate::{
    dao::{paths, room::RoomRepository},
    error::ServiceError,
    services::{room_directory::fetch_room, sse_events},
    state::{
        SharedState,
        room::{GameStatus, PlayerId, Room},
        turn::{RoundClock, TickOutcome, TurnState, first_holder, next_holder, now_ms, tick},
    },
};

/// Why a pass did not move the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassRejection {
    /// No round is running in the room.
    RoundNotRunning,
    /// The round clock already ran out.
    RoundExpired,
    /// Fewer than two players; there is nobody to pass to.
    NotEnoughPlayers,
    /// The acting player does not hold the token.
    NotHolder,
    /// The previous hand-off is still animating.
    HandoffInFlight,
    /// The persisted holder is not on the roster.
    DanglingHolder,
}

/// Result of a pass attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// The token moved.
    Passed { from: PlayerId, to: PlayerId },
    /// Nothing was written.
    Rejected(PassRejection),
    /// Another writer moved the token during the hand-off delay.
    Stale,
}

/// Give the token to the first player in roster order.
pub async fn assign_initial_holder(
    state: &SharedState,
    room: &Room,
) -> Result<Option<PlayerId>, ServiceError> {
    let Some(holder) = first_holder(&room.players).cloned() else {
        state.turns().insert(room.code.clone(), TurnState::Idle);
        return Ok(None);
    };

    state
        .store()
        .write(&paths::current_holder(&room.code), Value::from(holder.clone()))
        .await?;
    state.turns().insert(
        room.code.clone(),
        TurnState::AwaitingPass {
            holder: holder.clone(),
        },
    );
    debug!(room = %room.code, player = %holder, "initial holder assigned");
    Ok(Some(holder))
}

/// Hand the token from `acting` to the next player.
///
/// Every rejection leaves the store untouched. On success the token moves
/// after the configured hand-off delay, provided the round is still running
/// and its clock has not run out once the delay is over.
pub async fn pass(
    state: &SharedState,
    code: &str,
    acting: &str,
) -> Result<PassOutcome, ServiceError> {
    let room = fetch_room(state, code).await?;

    if let Some(rejection) = check_pass(&room, acting, now_ms()) {
        if rejection == PassRejection::DanglingHolder {
            warn!(
                room = %code,
                holder = ?room.current_holder,
                "token holder is not on the roster; ignoring pass"
            );
        }
        return Ok(PassOutcome::Rejected(rejection));
    }

    let Some(to) = next_holder(&room.players, acting).cloned() else {
        return Ok(PassOutcome::Rejected(PassRejection::NotHolder));
    };

    {
        let mut turn = state.turns().entry(code.to_owned()).or_default();
        if turn.is_thrown() {
            return Ok(PassOutcome::Rejected(PassRejection::HandoffInFlight));
        }
        *turn = TurnState::Thrown {
            holder: acting.to_owned(),
        };
    }
    sse_events::broadcast_handoff(state, code, acting, &to, sse_events::HandoffStage::Thrown);

    sleep(state.config().handoff_delay).await;

    // The round may have been resolved or run out while the token was in the air.
    let target = to.as_str();
    let committed = state
        .run_transition(code, || async move {
            let room = fetch_room(state, code).await?;
            if let Some(rejection) = check_round(&room, now_ms()) {
                return Ok(Commit::Closed(rejection));
            }
            let swapped = state
                .store()
                .compare_and_swap(
                    &paths::current_holder(code),
                    Some(Value::from(acting)),
                    Value::from(target),
                )
                .await?;
            Ok(if swapped { Commit::Swapped } else { Commit::Lost })
        })
        .await;

    match committed {
        Ok(Commit::Swapped) => {
            state
                .turns()
                .insert(code.to_owned(), TurnState::AwaitingPass { holder: to.clone() });
            sse_events::broadcast_handoff(state, code, acting, &to, sse_events::HandoffStage::Passed);
            info!(room = %code, from = %acting, to = %to, "token passed");
            Ok(PassOutcome::Passed {
                from: acting.to_owned(),
                to,
            })
        }
        Ok(Commit::Lost) => {
            state.turns().remove(code);
            info!(room = %code, player = %acting, "pass lost to a concurrent writer");
            Ok(PassOutcome::Stale)
        }
        Ok(Commit::Closed(rejection)) => {
            settle_thrown(state, code, acting);
            info!(room = %code, player = %acting, ?rejection, "round closed during hand-off");
            Ok(PassOutcome::Rejected(rejection))
        }
        Err(err) => {
            settle_thrown(state, code, acting);
            Err(err)
        }
    }
}

/// How the post-delay hand-off ended.
enum Commit {
    Swapped,
    Lost,
    Closed(PassRejection),
}

/// Give the token back to `acting` unless another transition already
/// replaced the in-flight state.
fn settle_thrown(state: &SharedState, code: &str, acting: &str) {
    if let Some(mut turn) = state.turns().get_mut(code) {
        if matches!(&*turn, TurnState::Thrown { holder } if holder == acting) {
            *turn = TurnState::AwaitingPass {
                holder: acting.to_owned(),
            };
        }
    }
}

/// Round-level checks: a running game whose clock has not run out.
fn check_round(room: &Room, now_ms: i64) -> Option<PassRejection> {
    let game = match &room.game {
        Some(game) if game.status == GameStatus::Running => game,
        _ => return Some(PassRejection::RoundNotRunning),
    };
    match game.ends_at {
        Some(ends_at) if RoundClock::new(ends_at, game.config.duration_secs()).is_expired(now_ms) => {
            Some(PassRejection::RoundExpired)
        }
        _ => None,
    }
}

/// Snapshot checks a pass must clear before anything is written.
fn check_pass(room: &Room, acting: &str, now_ms: i64) -> Option<PassRejection> {
    if let Some(rejection) = check_round(room, now_ms) {
        return Some(rejection);
    }
    if room.players.len() < 2 {
        return Some(PassRejection::NotEnoughPlayers);
    }
    match room.holder() {
        Err(_) => Some(PassRejection::DanglingHolder),
        Ok(Some(holder)) if holder.id == acting => None,
        Ok(_) => Some(PassRejection::NotHolder),
    }
}

/// Countdown notification for one observer.
#[derive(Debug, Clone, PartialEq)]
pub enum CountdownEvent {
    /// One second elapsed; `scale` is the presentational danger scale.
    Tick { remaining: u32, scale: f32 },
    /// The clock ran out while `loser` held the token.
    Expired { loser: Option<PlayerId> },
}

/// Running countdown. Dropping the handle stops the ticker.
pub struct CountdownHandle {
    ends_at_ms: i64,
    events: mpsc::Receiver<CountdownEvent>,
    task: JoinHandle<()>,
}

impl CountdownHandle {
    /// Round end this countdown is derived from.
    pub fn ends_at_ms(&self) -> i64 {
        self.ends_at_ms
    }

    /// Next countdown event, `None` after expiry.
    pub async fn next(&mut self) -> Option<CountdownEvent> {
        self.events.recv().await
    }
}

impl Drop for CountdownHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start a 1 Hz countdown for the running round of `room`.
///
/// Remaining time is always derived from the persisted `endsAt`, so every
/// observer counts down the same window no matter when it started watching.
pub fn start_countdown(
    rooms: RoomRepository,
    room: &Room,
    scale_factor: f32,
) -> Result<CountdownHandle, ServiceError> {
    let clock = room
        .game
        .as_ref()
        .filter(|game| game.status == GameStatus::Running)
        .and_then(|game| {
            game.ends_at
                .map(|ends_at| RoundClock::new(ends_at, game.config.duration_secs()))
        })
        .ok_or_else(|| {
            ServiceError::InvalidState(format!("room `{}` has no running round", room.code))
        })?;

    let (tx, rx) = mpsc::channel(4);
    let code = room.code.clone();
    let task = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let remaining = clock.remaining_secs(now_ms());
            match tick(clock.duration_secs, remaining, scale_factor) {
                TickOutcome::Running { remaining, scale } => {
                    if tx.send(CountdownEvent::Tick { remaining, scale }).await.is_err() {
                        break;
                    }
                }
                TickOutcome::Expired => {
                    let loser = match rooms.find(&code).await {
                        Ok(room) => room.and_then(|room| room.current_holder),
                        Err(err) => {
                            warn!(room = %code, error = %err, "failed to read holder at expiry");
                            None
                        }
                    };
                    debug!(room = %code, loser = ?loser, "round clock expired");
                    let _ = tx.send(CountdownEvent::Expired { loser }).await;
                    break;
                }
            }
        }
    });

    Ok(CountdownHandle {
        ends_at_ms: clock.ends_at_ms,
        events: rx,
        task,
    })
}
