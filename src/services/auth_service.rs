use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde_json::Value;
use tracing::info;

/// Identity carried by a validated token
#[derive(Clone, Debug)]
pub struct AuthClaims {
    pub uid: String,
    pub roles: Vec<String>,
    pub claims: Value,
}

impl AuthClaims {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

// Get the auth token from the request headers, falling back to a query parameter
pub fn get_auth_token(headers: &HeaderMap, query_token: Option<&str>) -> Result<String, String> {
    // 1. Try to get token from Authorization header
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        let auth_str = auth_header.to_str().map_err(|_| "Invalid Authorization header".to_string())?;
        return Ok(auth_str
            .strip_prefix("Bearer ")
            .unwrap_or(auth_str)
            .to_string());
    }

    // 2. Try to get token from cookies
    if let Some(cookie_header) = headers.get(header::COOKIE) {
        let cookie_str = cookie_header.to_str().map_err(|_| "Invalid Cookie header".to_string())?;
        for c in cookie::Cookie::split_parse(cookie_str).flatten() {
            if c.name() == "auth_token" {
                return Ok(c.value().to_string());
            }
        }
    }

    // 3. Browsers can't set headers on a websocket upgrade, so accept ?token=
    query_token
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| "Missing Authorization header, auth_token cookie or token parameter".to_string())
}

// Validate a JWT token and return the token data
pub fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<Value>(token, &decoding_key, &validation)
}

// Validate the token and extract the user and roles
pub fn authenticate(token: &str, secret: &str) -> Result<AuthClaims, String> {
    let token_data = validate_jwt(token, secret).map_err(|e| format!("JWT validation failed: {}", e))?;
    let claims = token_data.claims;

    let uid = claims
        .get("sub")
        .and_then(|v| v.as_str())
        .ok_or_else(|| "Can't extract a UID from the JWT token".to_string())?
        .to_string();

    let mut roles: Vec<String> = match claims.get("roles").and_then(|v| v.as_array()) {
        Some(roles_array) => roles_array.iter().filter_map(|r| r.as_str().map(|s| s.to_string())).collect(),
        None => Vec::new(),
    };
    if let Some(role) = claims.get("role").and_then(|v| v.as_str()) {
        if !roles.iter().any(|r| r == role) {
            roles.push(role.to_string());
        }
    }

    info!("JWT token validated successfully for user: {}", uid);
    Ok(AuthClaims { uid, roles, claims })
}
