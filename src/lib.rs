// Library crate for the Trackle workout tracking API
// This file exposes the router and modules for the binary and integration tests

pub mod aggregate;
pub mod auth;
pub mod config;
pub mod db;
pub mod exercise;
pub mod shared;
pub mod stats;
pub mod template;
pub mod workout;

use axum::{
    middleware,
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

// Re-export commonly used types for easier access in tests
pub use config::AppConfig;
pub use shared::{AppError, AppState, AuthSettings};

/// GET /health
async fn health() -> Response {
    shared::response::ok("Service is healthy", serde_json::json!({ "status": "ok" }))
}

fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout))
        .route(
            "/exercises",
            get(exercise::list_exercises).post(exercise::create_exercise),
        )
        .route(
            "/exercises/:id",
            get(exercise::get_exercise)
                .put(exercise::update_exercise)
                .delete(exercise::delete_exercise),
        )
        .route(
            "/me/templates",
            get(template::list_templates).post(template::create_template),
        )
        .route(
            "/me/templates/:id",
            get(template::get_template).delete(template::delete_template),
        )
        .route(
            "/me/workouts",
            get(workout::list_workouts).post(workout::create_workout),
        )
        .route(
            "/me/workouts/:id",
            get(workout::get_workout)
                .put(workout::update_workout)
                .delete(workout::delete_workout),
        )
        .route("/stats/workouts", get(stats::workout_stats))
        .route("/stats/exercises/:id", get(stats::exercise_progress))
        .route("/stats/aggregate", get(stats::aggregate_stats))
        .route_layer(middleware::from_fn_with_state(state, auth::require_auth))
}

/// Full application router: public auth routes plus everything under `/api`
/// behind the auth middleware
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .nest("/api", protected_routes(state.clone()))
        .layer(CatchPanicLayer::custom(shared::error::handle_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
