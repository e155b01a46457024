use serde::Serialize;
use utoipa::ToSchema;

use crate::dto::room::RoomSummary;

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
/// Latest room snapshot; `null` once the room no longer resolves.
pub struct RoomEvent(pub Option<RoomSummary>);

#[derive(Debug, Serialize, ToSchema)]
/// Screen the client should navigate to.
pub struct RedirectEvent {
    /// Client-side route, e.g. `/lobby` or `/games/hot-potato`.
    pub path: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// One second of the running round elapsed.
pub struct TickEvent {
    pub remaining: u32,
    /// Presentational danger scale, recomputed by every observer.
    pub scale: f32,
}

#[derive(Debug, Serialize, ToSchema)]
/// The round clock ran out.
pub struct ExpiredEvent {
    /// Player holding the token at expiry.
    pub loser: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
/// Progress of a token hand-off.
pub enum HandoffStageDto {
    /// The holder acted; the hand-off animation runs.
    Thrown,
    /// The new holder is persisted.
    Passed,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast to every stream of a room while the token changes hands.
pub struct HandoffEvent {
    pub from: String,
    pub to: String,
    pub stage: HandoffStageDto,
}
