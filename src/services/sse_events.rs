use serde::Serialize;
use tracing::warn;

use crate::{
    dto::{
        room::RoomSummary,
        sse::{ExpiredEvent, HandoffEvent, HandoffStageDto, RedirectEvent, RoomEvent, ServerEvent, TickEvent},
    },
    services::{client_state_machine::Screen, turn_coordinator::CountdownEvent},
    state::{SharedState, room::Room},
};

pub const EVENT_ROOM: &str = "room";
pub const EVENT_REDIRECT: &str = "redirect";
pub const EVENT_TICK: &str = "tick";
pub const EVENT_EXPIRED: &str = "expired";
pub const EVENT_HANDOFF: &str = "handoff";

/// Stage of a token hand-off announced to the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffStage {
    Thrown,
    Passed,
}

/// Announce a hand-off stage to every open stream of room `code`.
pub fn broadcast_handoff(state: &SharedState, code: &str, from: &str, to: &str, stage: HandoffStage) {
    let payload = HandoffEvent {
        from: from.to_owned(),
        to: to.to_owned(),
        stage: match stage {
            HandoffStage::Thrown => HandoffStageDto::Thrown,
            HandoffStage::Passed => HandoffStageDto::Passed,
        },
    };
    if let Some(event) = build_event(EVENT_HANDOFF, &payload) {
        state.room_hub(code).broadcast(event);
    }
}

/// Room snapshot event for a single stream.
pub fn room_event(room: Option<&Room>) -> Option<ServerEvent> {
    build_event(EVENT_ROOM, &RoomEvent(room.map(RoomSummary::from)))
}

/// Redirect event for a single stream.
pub fn redirect_event(screen: &Screen) -> Option<ServerEvent> {
    build_event(
        EVENT_REDIRECT,
        &RedirectEvent {
            path: screen.path(),
        },
    )
}

/// Countdown event for a single stream.
pub fn countdown_event(event: CountdownEvent) -> Option<ServerEvent> {
    match event {
        CountdownEvent::Tick { remaining, scale } => {
            build_event(EVENT_TICK, &TickEvent { remaining, scale })
        }
        CountdownEvent::Expired { loser } => build_event(EVENT_EXPIRED, &ExpiredEvent { loser }),
    }
}

fn build_event<T: Serialize>(name: &str, payload: &T) -> Option<ServerEvent> {
    match ServerEvent::json(Some(name.to_string()), payload) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(event = name, error = %err, "failed to serialise SSE payload");
            None
        }
    }
}
