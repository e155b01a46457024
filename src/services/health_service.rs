use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe the state store and report `degraded` while it is unreachable.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.store().health_check().await {
        Ok(()) => HealthResponse::ok(),
        Err(err) => {
            warn!(error = %err, "state store health check failed (degraded mode)");
            HealthResponse::degraded()
        }
    }
}
