use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document of the party rooms backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rooms::create_room,
        crate::routes::rooms::join_room,
        crate::routes::rooms::get_room,
        crate::routes::rooms::open_lobby,
        crate::routes::rooms::start_round,
        crate::routes::rooms::begin_play,
        crate::routes::rooms::submit_result,
        crate::routes::rooms::resolve_round,
        crate::routes::rooms::pass_token,
        crate::routes::sse::room_events,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::room::CreateRoomRequest,
            crate::dto::room::JoinRoomRequest,
            crate::dto::room::StartRoundRequest,
            crate::dto::room::SubmitResultRequest,
            crate::dto::room::JoinResponse,
            crate::dto::room::RoomSummary,
            crate::dto::room::PlayerSummary,
            crate::dto::room::GameSummary,
            crate::dto::room::StatusResponse,
            crate::dto::room::RoundStartResponse,
            crate::dto::room::RoundResolutionResponse,
            crate::dto::room::ScoreAward,
            crate::dto::room::PassResponse,
            crate::dto::sse::RedirectEvent,
            crate::dto::sse::TickEvent,
            crate::dto::sse::ExpiredEvent,
            crate::dto::sse::HandoffEvent,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Room creation, joining and lobby"),
        (name = "rounds", description = "Round lifecycle, results and token passing"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;
