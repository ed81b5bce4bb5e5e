use axum::{
    extract::{Path, Query, State},
    response::Response,
    Extension,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;

use super::{service::StatsService, types::StatsQuery};
use crate::auth::AuthUser;
use crate::shared::{parse_id, response::ok, AppError, AppState};

fn stats_service(state: &AppState) -> StatsService {
    StatsService::new(
        Arc::clone(&state.workout_repository),
        Arc::clone(&state.exercise_repository),
    )
}

/// GET /api/stats/workouts?timeRange=week|month|year
#[instrument(name = "workout_stats", skip(state))]
pub async fn workout_stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<StatsQuery>,
) -> Result<Response, AppError> {
    let frequency = stats_service(&state)
        .workout_frequency(user.user_id, query.range(), Utc::now().date_naive())
        .await?;
    Ok(ok("Workout statistics retrieved successfully", frequency))
}

/// GET /api/stats/exercises/:id?timeRange=week|month|year
#[instrument(name = "exercise_progress", skip(state))]
pub async fn exercise_progress(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(exercise_id): Path<String>,
    Query(query): Query<StatsQuery>,
) -> Result<Response, AppError> {
    let exercise_id = parse_id(&exercise_id, "exercise")?;
    let progress = stats_service(&state)
        .exercise_progress(
            user.user_id,
            exercise_id,
            query.range(),
            Utc::now().date_naive(),
        )
        .await?;
    Ok(ok("Exercise progress retrieved successfully", progress))
}

/// GET /api/stats/aggregate
#[instrument(name = "aggregate_stats", skip(state))]
pub async fn aggregate_stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Response, AppError> {
    let stats = stats_service(&state).aggregate(user.user_id).await?;
    Ok(ok("Aggregate statistics retrieved successfully", stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_utils::{seed_exercise, AppStateBuilder};
    use crate::workout::models::{NewWorkoutEntry, WorkoutDraft};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    fn router(state: AppState, user_id: i64) -> Router {
        Router::new()
            .route("/stats/workouts", get(workout_stats))
            .route("/stats/exercises/:id", get(exercise_progress))
            .route("/stats/aggregate", get(aggregate_stats))
            .layer(Extension(AuthUser { user_id }))
            .with_state(state)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_workout_stats_defaults_to_month() {
        let app = router(AppStateBuilder::new().build(), 1);

        let response = app
            .oneshot(get_request("/stats/workouts?timeRange=fortnight"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["message"], "Workout statistics retrieved successfully");
        assert_eq!(body["data"]["time_range"], "month");
        assert_eq!(body["data"]["labels"].as_array().unwrap().len(), 30);
        assert_eq!(body["data"]["data"].as_array().unwrap().len(), 30);
    }

    #[tokio::test]
    async fn test_exercise_progress_handler() {
        let state = AppStateBuilder::new().build();
        let bench = seed_exercise(&state, "Bench Press").await;
        state
            .workout_repository
            .create_with_entries(
                1,
                &WorkoutDraft {
                    template_id: 1,
                    name: "Monday".to_string(),
                    notes: String::new(),
                },
                &[NewWorkoutEntry {
                    exercise_id: bench.id,
                    set_number: 1,
                    reps: 5,
                    weight: 80.0,
                }],
            )
            .await
            .unwrap();
        let app = router(state, 1);

        let uri = format!("/stats/exercises/{}?time_range=week", bench.id);
        let response = app.oneshot(get_request(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["data"]["exercise_name"], "Bench Press");
        assert_eq!(body["data"]["time_range"], "week");
        assert_eq!(body["data"]["weights"], serde_json::json!([80.0]));
    }

    #[tokio::test]
    async fn test_exercise_progress_invalid_and_unknown_id() {
        let app = router(AppStateBuilder::new().build(), 1);

        let response = app
            .clone()
            .oneshot(get_request("/stats/exercises/abc"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], "Invalid exercise ID");

        let response = app
            .oneshot(get_request("/stats/exercises/99"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_aggregate_stats_empty() {
        let app = router(AppStateBuilder::new().build(), 1);

        let response = app.oneshot(get_request("/stats/aggregate")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["data"]["total_workouts"], 0);
        assert_eq!(body["data"]["total_entries"], 0);
        assert_eq!(body["data"]["exercises"], serde_json::json!([]));
    }
}
