//! Slash-delimited key paths addressing room data inside the state store.

const ROOMS_ROOT: &str = "rooms";

/// Root path of a room document.
pub fn room(code: &str) -> String {
    format!("{ROOMS_ROOT}/{code}")
}

/// Status field of a room.
pub fn status(code: &str) -> String {
    format!("{ROOMS_ROOT}/{code}/status")
}

/// Map of players keyed by player id.
pub fn players(code: &str) -> String {
    format!("{ROOMS_ROOT}/{code}/players")
}

pub fn player(code: &str, player_id: &str) -> String {
    format!("{ROOMS_ROOT}/{code}/players/{player_id}")
}

pub fn player_score(code: &str, player_id: &str) -> String {
    format!("{ROOMS_ROOT}/{code}/players/{player_id}/score")
}

/// Current game (round instance) of a room.
pub fn game(code: &str) -> String {
    format!("{ROOMS_ROOT}/{code}/game")
}

pub fn game_status(code: &str) -> String {
    format!("{ROOMS_ROOT}/{code}/game/status")
}

pub fn game_result(code: &str, player_id: &str) -> String {
    format!("{ROOMS_ROOT}/{code}/game/results/{player_id}")
}

/// Player currently holding the turn token.
pub fn current_holder(code: &str) -> String {
    format!("{ROOMS_ROOT}/{code}/currentPlayer")
}

/// Split a path into its non-empty segments.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

/// Whether `ancestor` equals `path` or is one of its parents.
pub fn is_prefix(ancestor: &[&str], path: &[&str]) -> bool {
    ancestor.len() <= path.len() && ancestor.iter().zip(path).all(|(a, b)| a == b)
}
