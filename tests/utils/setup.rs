use axum::{
    body::Body,
    http::{header, Method, Request},
    Router,
};
use std::sync::Arc;
use tower::ServiceExt;

use trackle::{
    auth::{repository::InMemoryUserRepository, token::TokenService},
    build_router,
    exercise::repository::InMemoryExerciseRepository,
    template::repository::InMemoryTemplateRepository,
    workout::repository::InMemoryWorkoutRepository,
    AppState, AuthSettings,
};

use super::assertions::TestResponse;

pub const TEST_SECRET: &str = "integration-test-secret";

/// Lowest cost bcrypt accepts
pub const TEST_BCRYPT_COST: u32 = 4;

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

/// Full router over in-memory repositories. The repository handles stay
/// reachable so tests can check what was (not) persisted.
pub struct TestSetup {
    pub app: Router,
    pub users: Arc<InMemoryUserRepository>,
    pub templates: Arc<InMemoryTemplateRepository>,
    pub workouts: Arc<InMemoryWorkoutRepository>,
    pub token_service: TokenService,
}

pub struct TestSetupBuilder {
    token_ttl_hours: i64,
    cookie_secure: bool,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            token_ttl_hours: 24,
            cookie_secure: false,
        }
    }

    pub fn with_secure_cookie(mut self) -> Self {
        self.cookie_secure = true;
        self
    }

    pub fn build(self) -> TestSetup {
        let users = Arc::new(InMemoryUserRepository::new());
        let templates = Arc::new(InMemoryTemplateRepository::new());
        let workouts = Arc::new(InMemoryWorkoutRepository::new());

        let state = AppState::new(
            users.clone(),
            Arc::new(InMemoryExerciseRepository::new()),
            templates.clone(),
            workouts.clone(),
            Arc::new(TokenService::new(TEST_SECRET, self.token_ttl_hours).unwrap()),
            AuthSettings {
                bcrypt_cost: TEST_BCRYPT_COST,
                cookie_secure: self.cookie_secure,
            },
        );

        TestSetup {
            app: build_router(state),
            users,
            templates,
            workouts,
            token_service: TokenService::new(TEST_SECRET, self.token_ttl_hours).unwrap(),
        }
    }
}

/// JSON request with an optional bearer token
pub fn build_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

impl TestSetup {
    /// Sends one request through the router. The token, when given, travels
    /// as a bearer header.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> TestResponse {
        self.dispatch(build_request(method, uri, token, body)).await
    }

    pub async fn dispatch(&self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().oneshot(request).await.unwrap();
        TestResponse::from_response(response).await
    }
}
