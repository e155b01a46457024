//! Room creation, join codes and roster membership.
//!
//! A failed store write aborts the operation with
//! [`ServiceError::TransientStore`] (HTTP 503) instead of being logged and dropped.

use rand::{Rng, RngCore};
use serde_json::Map;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{info, warn};

use crate::{
    dao::room::encode,
    error::ServiceError,
    state::{
        SharedState,
        room::{Player, Room, RoomStatus},
        session::SessionState,
        state_machine::{RoomEvent, RoomPhase},
    },
};

/// Letters used for join codes; visually confusable `I` and `O` are left out.
pub const CODE_LETTERS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
/// Digits used for join codes; `0` and `1` are left out.
pub const CODE_DIGITS: &[u8] = b"23456789";

/// Draw a join code: two letters followed by two digits.
pub fn generate_code(rng: &mut dyn RngCore) -> String {
    let mut code = String::with_capacity(4);
    for alphabet in [CODE_LETTERS, CODE_LETTERS, CODE_DIGITS, CODE_DIGITS] {
        code.push(char::from(alphabet[rng.random_range(0..alphabet.len())]));
    }
    code
}

/// Whether `code` could have been produced by [`generate_code`].
pub fn is_valid_code(code: &str) -> bool {
    let bytes = code.as_bytes();
    bytes.len() == 4
        && bytes[..2].iter().all(|b| CODE_LETTERS.contains(b))
        && bytes[2..].iter().all(|b| CODE_DIGITS.contains(b))
}

/// Create an empty room under a code no other room uses.
pub async fn create_room(state: &SharedState) -> Result<Room, ServiceError> {
    let attempts = state.config().code_attempts;
    for attempt in 1..=attempts {
        let code = generate_code(&mut rand::rng());
        if state.rooms().exists(&code).await? {
            warn!(room = %code, attempt, "room code collision; retrying");
            continue;
        }

        let room = Room::new(code, now_rfc3339());
        state.rooms().save(&room).await?;
        info!(room = %room.code, "room created");
        return Ok(room);
    }

    Err(ServiceError::InvalidState(format!(
        "no free room code after {attempts} attempts"
    )))
}

/// Add `player_id` to room `code` and return the player's new session.
///
/// Re-joining with an id already on the roster keeps the existing record
/// (score and host flag included), so a reloaded client resumes where it was.
pub async fn join_room(
    state: &SharedState,
    code: &str,
    player_id: &str,
    name: &str,
    is_host: bool,
) -> Result<SessionState, ServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::InvalidInput("player name must not be empty".into()));
    }

    let room = fetch_room(state, code).await?;

    if let Some(existing) = room.player(player_id) {
        info!(room = %code, player = %player_id, "player rejoined");
        let session = state
            .session(player_id)
            .filter(|session| session.is_in_room(code))
            .unwrap_or_else(|| SessionState::joined(code, player_id, existing.is_host));
        state.save_session(player_id, session.clone());
        return Ok(session);
    }

    if is_host && room.players.values().any(|player| player.is_host) {
        return Err(ServiceError::InvalidState(format!(
            "room `{code}` already has a host"
        )));
    }

    let player = Player::new(player_id, name, is_host);
    state.rooms().save_player(code, &player).await?;
    info!(room = %code, player = %player_id, is_host, "player joined");

    let session = SessionState::joined(code, player_id, is_host);
    state.save_session(player_id, session.clone());
    Ok(session)
}

/// Host opens the lobby of a freshly created room.
pub async fn open_lobby(
    state: &SharedState,
    code: &str,
    session: &SessionState,
) -> Result<RoomStatus, ServiceError> {
    state
        .run_transition(code, || async move {
            let room = fetch_room(state, code).await?;
            require_host(&room, session)?;
            let next = RoomPhase::from(&room).transition(RoomEvent::OpenLobby)?;

            let status = next.status();
            let mut fields = Map::new();
            fields.insert("status".into(), encode("status", &status)?);
            state.rooms().update(code, fields).await?;
            info!(room = %code, ?status, "lobby opened");
            Ok(status)
        })
        .await
}

/// Read room `code`, failing with [`ServiceError::NotFound`] when it does not resolve.
pub async fn fetch_room(state: &SharedState, code: &str) -> Result<Room, ServiceError> {
    state
        .rooms()
        .find(code)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("room `{code}` not found")))
}

/// Ensure `session` belongs to the host of `room`.
pub fn require_host(room: &Room, session: &SessionState) -> Result<(), ServiceError> {
    let player_id = require_member(room, session)?;
    if room.is_host(player_id) {
        Ok(())
    } else {
        Err(ServiceError::Unauthorized(format!(
            "only the host of room `{}` may do this",
            room.code
        )))
    }
}

/// Ensure `session` sits in `room` and return its player id.
pub fn require_member<'a>(room: &Room, session: &'a SessionState) -> Result<&'a str, ServiceError> {
    let player_id = session
        .player_id
        .as_deref()
        .filter(|_| session.is_in_room(&room.code))
        .ok_or_else(|| {
            ServiceError::Unauthorized(format!("not a member of room `{}`", room.code))
        })?;
    if room.player(player_id).is_none() {
        return Err(ServiceError::Unauthorized(format!(
            "player `{player_id}` is not on the roster of room `{}`",
            room.code
        )));
    }
    Ok(player_id)
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
