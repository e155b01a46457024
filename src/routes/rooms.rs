use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use tracing::warn;
use validator::Validate;

use crate::{
    dto::{
        room::{
            CreateRoomRequest, GameSummary, JoinResponse, JoinRoomRequest, PassResponse,
            RoomSummary, RoundResolutionResponse, RoundStartResponse, StartRoundRequest,
            StatusResponse, SubmitResultRequest,
        },
        validation::validate_player_id,
    },
    error::{AppError, ServiceError},
    services::{room_directory, round_orchestrator, turn_coordinator},
    state::{SharedState, session::SessionState},
};

pub(crate) const PLAYER_ID_HEADER: &str = "x-player-id";

/// Room lifecycle endpoints driven by the players' browsers.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/{code}", get(get_room))
        .route("/rooms/{code}/players", post(join_room))
        .route("/rooms/{code}/lobby", post(open_lobby))
        .route("/rooms/{code}/rounds", post(start_round))
        .route("/rooms/{code}/rounds/begin", post(begin_play))
        .route("/rooms/{code}/rounds/resolve", post(resolve_round))
        .route("/rooms/{code}/results", post(submit_result))
        .route("/rooms/{code}/pass", post(pass_token))
}

/// Create a room and join it as host.
#[utoipa::path(
    post,
    path = "/rooms",
    tag = "rooms",
    params(("X-Player-Id" = String, Header, description = "Opaque identifier of the calling player")),
    request_body = CreateRoomRequest,
    responses(
        (status = 201, description = "Room created", body = JoinResponse),
        (status = 400, description = "Invalid name or player id")
    )
)]
pub async fn create_room(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<JoinResponse>), AppError> {
    let player_id = player_id(&headers)?;
    payload.validate()?;

    let room = room_directory::create_room(&state).await?;
    let session =
        room_directory::join_room(&state, &room.code, &player_id, &payload.name, true).await?;
    let room = room_directory::fetch_room(&state, &room.code).await?;
    Ok((
        StatusCode::CREATED,
        Json(JoinResponse {
            session,
            room: RoomSummary::from(&room),
        }),
    ))
}

/// Join an existing room as a guest, or re-join it with a known player id.
#[utoipa::path(
    post,
    path = "/rooms/{code}/players",
    tag = "rooms",
    params(
        ("X-Player-Id" = String, Header, description = "Opaque identifier of the calling player"),
        ("code" = String, Path, description = "Room code")
    ),
    request_body = JoinRoomRequest,
    responses(
        (status = 200, description = "Joined", body = JoinResponse),
        (status = 404, description = "Unknown room"),
        (status = 409, description = "Player cannot join as requested")
    )
)]
pub async fn join_room(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Json(payload): Json<JoinRoomRequest>,
) -> Result<Json<JoinResponse>, AppError> {
    let player_id = player_id(&headers)?;
    let code = room_code(&code)?;
    payload.validate()?;

    let session = room_directory::join_room(&state, &code, &player_id, &payload.name, false).await?;
    let room = room_directory::fetch_room(&state, &code).await?;
    Ok(Json(JoinResponse {
        session,
        room: RoomSummary::from(&room),
    }))
}

#[utoipa::path(
    get,
    path = "/rooms/{code}",
    tag = "rooms",
    params(("code" = String, Path, description = "Room code")),
    responses(
        (status = 200, description = "Current room snapshot", body = RoomSummary),
        (status = 404, description = "Unknown room")
    )
)]
pub async fn get_room(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<RoomSummary>, AppError> {
    let code = room_code(&code)?;
    let room = room_directory::fetch_room(&state, &code).await?;
    Ok(Json(RoomSummary::from(&room)))
}

/// Move a freshly created room to the waiting lobby.
#[utoipa::path(
    post,
    path = "/rooms/{code}/lobby",
    tag = "rooms",
    params(
        ("X-Player-Id" = String, Header, description = "Host player id"),
        ("code" = String, Path, description = "Room code")
    ),
    responses(
        (status = 200, description = "Lobby opened", body = StatusResponse),
        (status = 401, description = "Caller is not the host"),
        (status = 409, description = "Room is past the lobby")
    )
)]
pub async fn open_lobby(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    let (code, session) = session_in_room(&state, &headers, &code)?;
    let status = room_directory::open_lobby(&state, &code, &session).await?;
    Ok(Json(StatusResponse { status }))
}

/// Select the next catalog game, or end the room once every game was played.
#[utoipa::path(
    post,
    path = "/rooms/{code}/rounds",
    tag = "rounds",
    params(
        ("X-Player-Id" = String, Header, description = "Host player id"),
        ("code" = String, Path, description = "Room code")
    ),
    request_body = StartRoundRequest,
    responses(
        (status = 200, description = "Round prepared or room ended", body = RoundStartResponse),
        (status = 401, description = "Caller is not the host"),
        (status = 409, description = "Room cannot start a round now")
    )
)]
pub async fn start_round(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Json(payload): Json<StartRoundRequest>,
) -> Result<Json<RoundStartResponse>, AppError> {
    let (code, session) = session_in_room(&state, &headers, &code)?;
    let (start, session) =
        round_orchestrator::start_round(&state, &code, &session, payload.first_round).await?;
    persist_session(&state, &session);
    Ok(Json(RoundStartResponse::new(&start, session)))
}

/// Start the round clock and hand the token to the first player.
#[utoipa::path(
    post,
    path = "/rooms/{code}/rounds/begin",
    tag = "rounds",
    params(
        ("X-Player-Id" = String, Header, description = "Host player id"),
        ("code" = String, Path, description = "Room code")
    ),
    responses(
        (status = 200, description = "Round running", body = GameSummary),
        (status = 409, description = "No ready round")
    )
)]
pub async fn begin_play(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Result<Json<GameSummary>, AppError> {
    let (code, session) = session_in_room(&state, &headers, &code)?;
    let game = round_orchestrator::begin_play(&state, &code, &session).await?;
    Ok(Json(GameSummary::from(&game)))
}

/// Record the caller's raw result for the running round.
#[utoipa::path(
    post,
    path = "/rooms/{code}/results",
    tag = "rounds",
    params(
        ("X-Player-Id" = String, Header, description = "Reporting player id"),
        ("code" = String, Path, description = "Room code")
    ),
    request_body = SubmitResultRequest,
    responses(
        (status = 204, description = "Result stored"),
        (status = 409, description = "Round is not running")
    )
)]
pub async fn submit_result(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Json(payload): Json<SubmitResultRequest>,
) -> Result<StatusCode, AppError> {
    let (code, session) = session_in_room(&state, &headers, &code)?;
    payload.validate()?;
    round_orchestrator::report_result(&state, &code, &session, payload.value).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Score the finished round exactly once and move the room on.
#[utoipa::path(
    post,
    path = "/rooms/{code}/rounds/resolve",
    tag = "rounds",
    params(
        ("X-Player-Id" = String, Header, description = "Host player id"),
        ("code" = String, Path, description = "Room code")
    ),
    responses(
        (status = 200, description = "Round scored", body = RoundResolutionResponse),
        (status = 409, description = "Round already scored or not running")
    )
)]
pub async fn resolve_round(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Result<Json<RoundResolutionResponse>, AppError> {
    let (code, session) = session_in_room(&state, &headers, &code)?;
    let resolution = round_orchestrator::resolve_round(&state, &code, &session).await?;
    Ok(Json(resolution.into()))
}

/// Pass the hot potato to the next player in turn order.
#[utoipa::path(
    post,
    path = "/rooms/{code}/pass",
    tag = "rounds",
    params(
        ("X-Player-Id" = String, Header, description = "Player holding the token"),
        ("code" = String, Path, description = "Room code")
    ),
    responses((status = 200, description = "Pass outcome", body = PassResponse))
)]
pub async fn pass_token(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Result<Json<PassResponse>, AppError> {
    let (code, session) = session_in_room(&state, &headers, &code)?;
    let acting = session
        .player_id
        .ok_or_else(|| AppError::Unauthorized("session has no player".into()))?;

    // The hand-off runs detached so a dropped request cannot strand the token mid-air.
    let task_state = state.clone();
    let outcome = tokio::spawn(async move {
        turn_coordinator::pass(&task_state, &code, &acting).await
    })
    .await
    .map_err(|err| {
        warn!(error = %err, "pass task failed");
        AppError::Internal("pass task failed".into())
    })??;
    Ok(Json(outcome.into()))
}

/// Read and validate the caller's player id header.
fn player_id(headers: &HeaderMap) -> Result<String, AppError> {
    let value = headers
        .get(PLAYER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing player id header `X-Player-Id`".into()))?;
    validate_player_id(value).map_err(|err| {
        AppError::BadRequest(
            err.message
                .map(|message| message.into_owned())
                .unwrap_or_else(|| "invalid player id".into()),
        )
    })?;
    Ok(value.to_owned())
}

/// Normalise a room code taken from the path.
pub(crate) fn room_code(raw: &str) -> Result<String, AppError> {
    let code = raw.trim().to_ascii_uppercase();
    if room_directory::is_valid_code(&code) {
        Ok(code)
    } else {
        Err(AppError::BadRequest(format!("`{raw}` is not a room code")))
    }
}

/// Resolve the session the caller holds for room `raw_code`.
pub(crate) fn session_in_room(
    state: &SharedState,
    headers: &HeaderMap,
    raw_code: &str,
) -> Result<(String, SessionState), AppError> {
    let player_id = player_id(headers)?;
    let code = room_code(raw_code)?;
    let session = state
        .session(&player_id)
        .filter(|session| session.is_in_room(&code))
        .ok_or_else(|| {
            AppError::from(ServiceError::Unauthorized(format!(
                "player `{player_id}` has not joined room `{code}`"
            )))
        })?;
    Ok((code, session))
}

fn persist_session(state: &SharedState, session: &SessionState) {
    if let Some(player_id) = session.player_id.as_deref() {
        state.save_session(player_id, session.clone());
    }
}
