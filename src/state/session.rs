use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::room::{PlayerId, RoomCode};

/// Client-local session record: which room this client sits in, who it is,
/// and how far its catalog rotation has progressed.
///
/// The rotation counters only matter on the client that drives rounds. They
/// are threaded through round operations explicitly instead of living in
/// ambient storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub room_code: Option<RoomCode>,
    pub player_id: Option<PlayerId>,
    #[serde(default)]
    pub is_host: bool,
    #[serde(default)]
    pub games_played: usize,
    #[serde(default)]
    pub current_game_index: usize,
}

impl SessionState {
    /// Session for a client that just joined `room_code` as `player_id`.
    pub fn joined(room_code: impl Into<RoomCode>, player_id: impl Into<PlayerId>, is_host: bool) -> Self {
        Self {
            room_code: Some(room_code.into()),
            player_id: Some(player_id.into()),
            is_host,
            games_played: 0,
            current_game_index: 0,
        }
    }

    /// Whether this client sits in `code`.
    pub fn is_in_room(&self, code: &str) -> bool {
        self.room_code.as_deref() == Some(code)
    }
}
