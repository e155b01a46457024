use thiserror::Error;

use crate::state::room::{GameStatus, Room, RoomStatus};

/// Combined room lifecycle phase, including the nested round status while playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    /// Room exists; nobody opened the lobby yet.
    Created,
    /// Lobby is open and players gather.
    Waiting,
    /// A round is in progress.
    Playing(GameStatus),
    /// Leaderboard between rounds.
    Ranking,
    /// Session finished, results retained.
    Ended,
}

/// Host-driven events that move a room through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomEvent {
    /// Host opens the lobby.
    OpenLobby,
    /// Host selects the next catalog game. Also restarts a stuck round.
    StartRound {
        /// First round of a session resets scores and rotation.
        first_round: bool,
    },
    /// Host starts the countdown of a ready round.
    BeginPlay,
    /// The running round resolved.
    FinishRound {
        /// Every catalog entry has now been played.
        session_complete: bool,
    },
    /// The catalog has nothing left to play.
    SessionExhausted,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the room was in when the event was received.
    pub from: RoomPhase,
    /// The event that cannot be applied from this phase.
    pub event: RoomEvent,
}

impl From<&Room> for RoomPhase {
    fn from(room: &Room) -> Self {
        match room.status {
            RoomStatus::Created => RoomPhase::Created,
            RoomStatus::Waiting => RoomPhase::Waiting,
            RoomStatus::Playing => RoomPhase::Playing(room.game_status().unwrap_or(GameStatus::Ready)),
            RoomStatus::Ranking => RoomPhase::Ranking,
            RoomStatus::Ended => RoomPhase::Ended,
        }
    }
}

impl RoomPhase {
    /// Status persisted on the room document for this phase.
    pub fn status(&self) -> RoomStatus {
        match self {
            RoomPhase::Created => RoomStatus::Created,
            RoomPhase::Waiting => RoomStatus::Waiting,
            RoomPhase::Playing(_) => RoomStatus::Playing,
            RoomPhase::Ranking => RoomStatus::Ranking,
            RoomPhase::Ended => RoomStatus::Ended,
        }
    }

    /// Compute the phase reached by applying `event`, if the transition is valid.
    pub fn transition(self, event: RoomEvent) -> Result<RoomPhase, InvalidTransition> {
        let next = match (self, event) {
            (RoomPhase::Created, RoomEvent::OpenLobby) => RoomPhase::Waiting,
            (
                RoomPhase::Waiting | RoomPhase::Ranking | RoomPhase::Playing(_),
                RoomEvent::StartRound { .. },
            ) => RoomPhase::Playing(GameStatus::Ready),
            (RoomPhase::Ended, RoomEvent::StartRound { first_round: true }) => {
                RoomPhase::Playing(GameStatus::Ready)
            }
            (RoomPhase::Playing(GameStatus::Ready), RoomEvent::BeginPlay) => {
                RoomPhase::Playing(GameStatus::Running)
            }
            (
                RoomPhase::Playing(GameStatus::Running),
                RoomEvent::FinishRound { session_complete },
            ) => {
                if session_complete {
                    RoomPhase::Ended
                } else {
                    RoomPhase::Ranking
                }
            }
            (from, RoomEvent::SessionExhausted) if from != RoomPhase::Ended => RoomPhase::Ended,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}
