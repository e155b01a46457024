use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    http::HeaderMap,
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{
    error::AppError,
    routes::rooms::session_in_room,
    services::sse_service,
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/rooms/{code}/events",
    tag = "sse",
    params(
        ("X-Player-Id" = String, Header, description = "Player id of a room member"),
        ("code" = String, Path, description = "Room code")
    ),
    responses(
        (status = 200, description = "Room snapshots, redirects, countdown and hand-off events", content_type = "text/event-stream", body = String),
        (status = 401, description = "Caller has not joined the room")
    )
)]
/// Stream the room as seen by one client.
pub async fn room_events(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let (code, session) = session_in_room(&state, &headers, &code)?;
    info!(room = %code, player = ?session.player_id, "new room SSE connection");
    Ok(sse_service::room_stream(state, code, session).await?)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/rooms/{code}/events", get(room_events))
}
