use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::SET_COOKIE, HeaderValue},
    response::Response,
    Extension, Json,
};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{
    middleware::AUTH_COOKIE,
    service::AuthService,
    types::{AuthUser, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse},
};
use crate::shared::{
    response::{created, ok, ok_empty},
    AppError, AppState,
};

fn auth_service(state: &AppState) -> AuthService {
    AuthService::new(
        Arc::clone(&state.user_repository),
        Arc::clone(&state.token_service),
        state.auth_settings.bcrypt_cost,
    )
}

/// HTTP handler for user registration
///
/// POST /register
/// Returns the created user without its password hash
#[instrument(name = "register", skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload?;
    let user = auth_service(&state).register(request).await?;

    Ok(created(
        "User created successfully",
        RegisterResponse { user },
    ))
}

/// HTTP handler for login
///
/// POST /login
/// Returns the token in the body and sets it as an HTTP-only cookie
#[instrument(name = "login", skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload?;
    let token = auth_service(&state).login(request).await?;

    let cookie = session_cookie(
        &token,
        state.token_service.ttl_seconds(),
        state.auth_settings.cookie_secure,
    );

    let mut response = ok("Login successful", LoginResponse { token });
    response.headers_mut().insert(SET_COOKIE, cookie?);
    Ok(response)
}

/// POST /api/logout
#[instrument(name = "logout", skip(state))]
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Response, AppError> {
    info!(user_id = user.user_id, "User logged out");

    let mut response = ok_empty("Logged out successfully");
    response.headers_mut().insert(
        SET_COOKIE,
        session_cookie("", 0, state.auth_settings.cookie_secure)?,
    );
    Ok(response)
}

/// GET /api/me
#[instrument(name = "me", skip(state))]
pub async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Response, AppError> {
    let user = auth_service(&state).current_user(user.user_id).await?;
    Ok(ok("User retrieved successfully", user))
}

fn session_cookie(token: &str, max_age: i64, secure: bool) -> Result<HeaderValue, AppError> {
    let mut cookie = format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        AUTH_COOKIE, token, max_age
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).map_err(|e| AppError::internal("Failed to build cookie", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repository::InMemoryUserRepository;
    use crate::shared::test_utils::AppStateBuilder;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::post,
        Router,
    };
    use tower::ServiceExt;

    fn app() -> (Router, Arc<InMemoryUserRepository>) {
        let repo = Arc::new(InMemoryUserRepository::new());
        let state = AppStateBuilder::new()
            .with_user_repository(repo.clone())
            .build();
        let router = Router::new()
            .route("/register", post(register))
            .route("/login", post(login))
            .with_state(state);
        (router, repo)
    }

    fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_register_handler_hides_password() {
        let (app, repo) = app();
        let response = app
            .oneshot(json_request(
                "/register",
                serde_json::json!({"username": "alice", "email": "a@x.com", "password": "Secret123!"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["data"]["user"]["username"], "alice");
        assert_eq!(body["data"]["user"]["role"], "user");
        assert!(body["data"]["user"].get("password_hash").is_none());
        assert!(!body.to_string().contains("Secret123!"));
        assert_eq!(repo.user_count(), 1);
    }

    #[tokio::test]
    async fn test_register_handler_malformed_json() {
        let (app, _) = app();
        let request = Request::builder()
            .method("POST")
            .uri("/register")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"username": "alice""#))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Invalid request data");
        assert_eq!(body["error"], "validation error");
    }

    #[tokio::test]
    async fn test_login_sets_http_only_cookie() {
        let (app, _) = app();
        app.clone()
            .oneshot(json_request(
                "/register",
                serde_json::json!({"username": "alice", "email": "a@x.com", "password": "Secret123!"}),
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(json_request(
                "/login",
                serde_json::json!({"email": "a@x.com", "password": "Secret123!"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(cookie.starts_with("auth_token="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=86400"));

        let body = body_json(response).await;
        let token = body["data"]["token"].as_str().unwrap();
        assert!(cookie.contains(token));
    }

    #[tokio::test]
    async fn test_login_handler_invalid_credentials() {
        let (app, _) = app();
        let response = app
            .oneshot(json_request(
                "/login",
                serde_json::json!({"email": "nouser@y.com", "password": "anything"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(SET_COOKIE).is_none());
        let body = body_json(response).await;
        assert_eq!(body["message"], "Invalid credentials");
    }

    #[test]
    fn test_clearing_cookie() {
        let cookie = session_cookie("", 0, true).unwrap();
        let value = cookie.to_str().unwrap();
        assert!(value.starts_with("auth_token=;"));
        assert!(value.contains("Max-Age=0"));
        assert!(value.ends_with("; Secure"));
    }
}
