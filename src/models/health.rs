use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Liveness / readiness report
#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub service: String,
    pub status: String,
    pub message: String,
}
