/// Per-client redirect controller.
pub mod client_state_machine;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Room creation, joining and lobby.
pub mod room_directory;
/// Round selection, play, results and resolution.
pub mod round_orchestrator;
pub mod score_ledger;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Per-connection room event streams.
pub mod sse_service;
/// Token ownership, hand-offs and the round countdown.
pub mod turn_coordinator;
