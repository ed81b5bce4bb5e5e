use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::Response,
    Extension, Json,
};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{
    service::WorkoutService,
    types::{WorkoutRequest, WorkoutSummary},
};
use crate::auth::AuthUser;
use crate::shared::{
    pagination::{PageParams, PageQuery},
    parse_id,
    response::{created, ok, ok_empty, PaginatedResponse},
    AppError, AppState,
};

fn workout_service(state: &AppState) -> WorkoutService {
    WorkoutService::new(
        Arc::clone(&state.workout_repository),
        Arc::clone(&state.template_repository),
        Arc::clone(&state.exercise_repository),
        Arc::clone(&state.reference_gate),
    )
}

/// HTTP handler for logging a workout
///
/// POST /api/me/workouts
/// The template must belong to the caller
#[instrument(name = "create_workout", skip(state, payload))]
pub async fn create_workout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<WorkoutRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload?;
    let workout = workout_service(&state)
        .create_workout(user.user_id, request)
        .await?;
    Ok(created("Workout created successfully", workout))
}

/// GET /api/me/workouts?page=&limit=
#[instrument(name = "list_workouts", skip(state))]
pub async fn list_workouts(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(page): Query<PageQuery>,
) -> Result<PaginatedResponse<WorkoutSummary>, AppError> {
    let params = PageParams::from(&page);
    let (workouts, total) = workout_service(&state)
        .list_workouts(user.user_id, params)
        .await?;

    info!(count = workouts.len(), total, "Workouts listed");
    Ok(PaginatedResponse::new(
        "Workouts retrieved successfully",
        workouts,
        params,
        total,
    ))
}

/// GET /api/me/workouts/:id
#[instrument(name = "get_workout", skip(state))]
pub async fn get_workout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(workout_id): Path<String>,
) -> Result<Response, AppError> {
    let workout_id = parse_id(&workout_id, "workout")?;
    let workout = workout_service(&state)
        .get_workout(user.user_id, workout_id)
        .await?;
    Ok(ok("Workout retrieved successfully", workout))
}

/// HTTP handler for replacing a workout and all of its entries
///
/// PUT /api/me/workouts/:id
#[instrument(name = "update_workout", skip(state, payload))]
pub async fn update_workout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(workout_id): Path<String>,
    payload: Result<Json<WorkoutRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let workout_id = parse_id(&workout_id, "workout")?;
    let Json(request) = payload?;
    let workout = workout_service(&state)
        .update_workout(user.user_id, workout_id, request)
        .await?;
    Ok(ok("Workout updated successfully", workout))
}

/// DELETE /api/me/workouts/:id
#[instrument(name = "delete_workout", skip(state))]
pub async fn delete_workout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(workout_id): Path<String>,
) -> Result<Response, AppError> {
    let workout_id = parse_id(&workout_id, "workout")?;
    workout_service(&state)
        .delete_workout(user.user_id, workout_id)
        .await?;
    Ok(ok_empty("Workout deleted successfully"))
}
