use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    services::{
        round_orchestrator::{RoundResolution, RoundStart},
        turn_coordinator::{PassOutcome, PassRejection},
    },
    state::{
        catalog::{GameConfig, GameKey},
        room::{Game, GameStatus, Player, Room, RoomStatus},
        session::SessionState,
    },
};

/// Payload used by the host to create a room and join it.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateRoomRequest {
    /// Display name of the host.
    #[validate(length(min = 1, max = 24), custom(function = "crate::dto::validation::validate_display_name"))]
    pub name: String,
}

/// Payload used by a guest to join an existing room.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinRoomRequest {
    #[validate(length(min = 1, max = 24), custom(function = "crate::dto::validation::validate_display_name"))]
    pub name: String,
}

/// Host request selecting the next catalog game.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartRoundRequest {
    /// Reset scores and game rotation before picking the game.
    #[serde(default)]
    pub first_round: bool,
}

/// Raw numeric result of the calling player for the running round.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SubmitResultRequest {
    #[validate(range(min = 0))]
    pub value: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    pub id: String,
    pub name: String,
    pub is_host: bool,
    pub score: u32,
}

impl From<&Player> for PlayerSummary {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id.clone(),
            name: player.name.clone(),
            is_host: player.is_host,
            score: player.score,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResult {
    pub player_id: String,
    pub value: i64,
}

/// Round currently attached to a room.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    pub id: GameKey,
    pub name: String,
    pub emoji: String,
    pub description: String,
    pub status: GameStatus,
    pub config: GameConfig,
    /// Round end in epoch milliseconds, once play began.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<i64>,
    /// Results in submission order.
    pub results: Vec<PlayerResult>,
}

impl From<&Game> for GameSummary {
    fn from(game: &Game) -> Self {
        Self {
            id: game.id,
            name: game.name.clone(),
            emoji: game.emoji.clone(),
            description: game.description.clone(),
            status: game.status,
            config: game.config.clone(),
            ends_at: game.ends_at,
            results: game
                .results
                .iter()
                .map(|(player_id, value)| PlayerResult {
                    player_id: player_id.clone(),
                    value: *value,
                })
                .collect(),
        }
    }
}

/// Public view of a room document.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub code: String,
    pub status: RoomStatus,
    /// Players in turn order.
    pub players: Vec<PlayerSummary>,
    pub game: Option<GameSummary>,
    pub current_holder: Option<String>,
    pub created_at: String,
}

impl From<&Room> for RoomSummary {
    fn from(room: &Room) -> Self {
        Self {
            code: room.code.clone(),
            status: room.status,
            players: room.players.values().map(PlayerSummary::from).collect(),
            game: room.game.as_ref().map(GameSummary::from),
            current_holder: room.current_holder.clone(),
            created_at: room.created_at.clone(),
        }
    }
}

/// Session handed back after creating or joining a room.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinResponse {
    pub session: SessionState,
    pub room: RoomSummary,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub status: RoomStatus,
}

/// Outcome of a start-round request.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoundStartResponse {
    pub status: RoomStatus,
    /// Selected game; absent when the catalog was exhausted and the room ended.
    pub game: Option<GameSummary>,
    pub session: SessionState,
}

impl RoundStartResponse {
    pub fn new(start: &RoundStart, session: SessionState) -> Self {
        Self {
            status: start.status,
            game: start.game.as_ref().map(GameSummary::from),
            session,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoreAward {
    pub player_id: String,
    pub points: u32,
    /// New cumulative score; absent when the increment failed.
    pub total: Option<i64>,
}

/// Outcome of resolving a round.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoundResolutionResponse {
    pub status: RoomStatus,
    pub loser: Option<String>,
    pub awards: Vec<ScoreAward>,
}

impl From<RoundResolution> for RoundResolutionResponse {
    fn from(resolution: RoundResolution) -> Self {
        let RoundResolution {
            status,
            loser,
            points,
            totals,
        } = resolution;
        let awards = points
            .into_iter()
            .map(|(player_id, points)| {
                let total = totals.get(&player_id).copied();
                ScoreAward {
                    player_id,
                    points,
                    total,
                }
            })
            .collect();
        Self {
            status,
            loser,
            awards,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
    Passed,
    Rejected,
    Stale,
}

/// Result of a pass attempt.
#[derive(Debug, Serialize, ToSchema)]
pub struct PassResponse {
    pub outcome: PassStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Machine-readable rejection reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<PassOutcome> for PassResponse {
    fn from(outcome: PassOutcome) -> Self {
        match outcome {
            PassOutcome::Passed { from, to } => Self {
                outcome: PassStatus::Passed,
                from: Some(from),
                to: Some(to),
                reason: None,
            },
            PassOutcome::Rejected(rejection) => Self {
                outcome: PassStatus::Rejected,
                from: None,
                to: None,
                reason: Some(rejection_reason(rejection).into()),
            },
            PassOutcome::Stale => Self {
                outcome: PassStatus::Stale,
                from: None,
                to: None,
                reason: None,
            },
        }
    }
}

fn rejection_reason(rejection: PassRejection) -> &'static str {
    match rejection {
        PassRejection::RoundNotRunning => "round_not_running",
        PassRejection::RoundExpired => "round_expired",
        PassRejection::NotEnoughPlayers => "not_enough_players",
        PassRejection::NotHolder => "not_holder",
        PassRejection::HandoffInFlight => "handoff_in_flight",
        PassRejection::DanglingHolder => "dangling_holder",
    }
}
