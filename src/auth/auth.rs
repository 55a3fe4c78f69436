use axum::{http::StatusCode, Json};

use crate::models::ErrorResponse;
use crate::services::auth_service::AuthClaims;

pub fn ensure_role(claims: &AuthClaims, role: &str) -> Result<String, (StatusCode, Json<ErrorResponse>)> {
    if claims.has_role(role) {
        return Ok(claims.uid.clone());
    }
    Err(ErrorResponse::rejection(
        StatusCode::FORBIDDEN,
        format!("Role '{}' required", role),
    ))
}
