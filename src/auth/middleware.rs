use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, COOKIE},
        HeaderMap,
    },
    middleware::Next,
    response::Response,
};
use tracing::{debug, instrument, warn};

use super::types::AuthUser;
use crate::shared::{AppError, AppState};

pub const AUTH_COOKIE: &str = "auth_token";

/// Authentication middleware - resolves the caller from the `auth_token` cookie,
/// falling back to an `Authorization: Bearer` header, and adds `AuthUser` to the request.
/// Usage: .route_layer(middleware::from_fn_with_state(app_state.clone(), auth::require_auth))
/// Handlers can then extract Extension(user): Extension<AuthUser>.
#[instrument(skip(state, req, next), fields(uri = %req.uri()))]
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(req.headers())?;

    let user_id = state.token_service.verify(&token).map_err(|e| {
        warn!("Token verification failed");
        e
    })?;

    debug!(user_id, "Request authenticated");
    req.extensions_mut().insert(AuthUser { user_id });

    Ok(next.run(req).await)
}

/// Finds the identity token: cookie first, then bearer header
pub fn extract_token(headers: &HeaderMap) -> Result<String, AppError> {
    if let Some(token) = cookie_token(headers) {
        return Ok(token);
    }

    let header = headers.get(AUTHORIZATION).ok_or_else(|| {
        warn!("Missing authentication token");
        AppError::Authentication("Authorization token required".to_string())
    })?;

    header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            warn!("Invalid Authorization header format (expected Bearer token)");
            AppError::Authentication("Invalid authorization header format".to_string())
        })
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == AUTH_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}
