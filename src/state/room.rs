//! Room, player and round records as they are laid out in the shared store.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::state::catalog::{CatalogEntry, GameConfig, GameKey};

/// Opaque per-session player identifier.
pub type PlayerId = String;
/// Short human-enterable room code.
pub type RoomCode = String;

/// Lifecycle of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Room exists, players may join.
    Created,
    /// Players are gathered in the lobby.
    Waiting,
    /// A round is in progress (see [`GameStatus`]).
    Playing,
    /// Leaderboard between two rounds.
    Ranking,
    /// Every catalog entry was played; results stay visible.
    Ended,
}

/// Sub-state of a round while its room is [`RoomStatus::Playing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Ready,
    Running,
    Ranking,
}

/// Member of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    #[serde(default)]
    pub is_host: bool,
    #[serde(default)]
    pub score: u32,
}

impl Player {
    pub fn new(id: impl Into<PlayerId>, name: impl Into<String>, is_host: bool) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_host,
            score: 0,
        }
    }
}

/// One round instance of a catalog mini-game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: GameKey,
    pub name: String,
    pub emoji: String,
    pub description: String,
    pub status: GameStatus,
    pub config: GameConfig,
    /// Raw per-player results, written independently by each client.
    #[serde(default)]
    pub results: IndexMap<PlayerId, i64>,
    /// Authoritative round end (epoch milliseconds), set when play begins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<i64>,
}

impl Game {
    /// Fresh round in the `ready` state for `entry` with the generated `config`.
    pub fn ready(entry: &CatalogEntry, config: GameConfig) -> Self {
        Self {
            id: entry.key,
            name: entry.name.to_string(),
            emoji: entry.emoji.to_string(),
            description: entry.description.to_string(),
            status: GameStatus::Ready,
            config,
            results: IndexMap::new(),
            ends_at: None,
        }
    }
}

/// Shared room document stored under `rooms/{code}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub code: RoomCode,
    /// Insertion order is turn order.
    #[serde(default)]
    pub players: IndexMap<PlayerId, Player>,
    pub status: RoomStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game: Option<Game>,
    #[serde(
        default,
        rename = "currentPlayer",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_holder: Option<PlayerId>,
    pub created_at: String,
}

/// Broken reference inside a room snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomInvariantError {
    #[error("token holder `{holder}` is not a player of room `{code}`")]
    DanglingHolder { code: RoomCode, holder: PlayerId },
    #[error("room `{code}` has {count} hosts")]
    HostCount { code: RoomCode, count: usize },
}

impl Room {
    pub fn new(code: impl Into<RoomCode>, created_at: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            players: IndexMap::new(),
            status: RoomStatus::Created,
            game: None,
            current_holder: None,
            created_at: created_at.into(),
        }
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.get(id)
    }

    /// Whether `id` belongs to the room's host.
    pub fn is_host(&self, id: &str) -> bool {
        self.players.get(id).is_some_and(|player| player.is_host)
    }

    pub fn game_status(&self) -> Option<GameStatus> {
        self.game.as_ref().map(|game| game.status)
    }

    /// Resolve the token holder, rejecting references to unknown players.
    pub fn holder(&self) -> Result<Option<&Player>, RoomInvariantError> {
        match &self.current_holder {
            None => Ok(None),
            Some(holder) => self.players.get(holder).map(Some).ok_or_else(|| {
                RoomInvariantError::DanglingHolder {
                    code: self.code.clone(),
                    holder: holder.clone(),
                }
            }),
        }
    }

    /// Check the structural invariants of the snapshot.
    ///
    /// An empty room has no host yet, so only rooms with players are checked for it.
    pub fn check_invariants(&self) -> Result<(), RoomInvariantError> {
        self.holder()?;
        let hosts = self.players.values().filter(|p| p.is_host).count();
        if !self.players.is_empty() && hosts != 1 {
            return Err(RoomInvariantError::HostCount {
                code: self.code.clone(),
                count: hosts,
            });
        }
        Ok(())
    }
}
