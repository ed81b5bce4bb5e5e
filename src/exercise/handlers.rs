use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::Response,
    Json,
};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{
    models::{ExerciseFilter, ExerciseInput},
    service::ExerciseService,
    types::ExerciseResponse,
};
use crate::shared::{
    pagination::{PageParams, PageQuery},
    parse_id,
    response::{created, ok, ok_empty, PaginatedResponse},
    AppError, AppState,
};

fn exercise_service(state: &AppState) -> ExerciseService {
    ExerciseService::new(
        Arc::clone(&state.exercise_repository),
        Arc::clone(&state.template_repository),
        Arc::clone(&state.workout_repository),
        Arc::clone(&state.reference_gate),
    )
}

/// HTTP handler for browsing the catalog
///
/// GET /api/exercises?category=&search=&page=&limit=
#[instrument(name = "list_exercises", skip(state))]
pub async fn list_exercises(
    State(state): State<AppState>,
    Query(filter): Query<ExerciseFilter>,
    Query(page): Query<PageQuery>,
) -> Result<PaginatedResponse<ExerciseResponse>, AppError> {
    let params = PageParams::from(&page);
    let (exercises, total) = exercise_service(&state)
        .list_exercises(&filter, params)
        .await?;

    info!(count = exercises.len(), total, "Exercises listed");
    Ok(PaginatedResponse::new(
        "Exercises retrieved successfully",
        exercises,
        params,
        total,
    ))
}

/// GET /api/exercises/:id
#[instrument(name = "get_exercise", skip(state))]
pub async fn get_exercise(
    State(state): State<AppState>,
    Path(exercise_id): Path<String>,
) -> Result<Response, AppError> {
    let exercise_id = parse_id(&exercise_id, "exercise")?;
    let exercise = exercise_service(&state).get_exercise(exercise_id).await?;
    Ok(ok("Exercise retrieved successfully", exercise))
}

/// HTTP handler for adding a catalog exercise
///
/// POST /api/exercises
#[instrument(name = "create_exercise", skip(state, payload))]
pub async fn create_exercise(
    State(state): State<AppState>,
    payload: Result<Json<ExerciseInput>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(input) = payload?;
    let exercise = exercise_service(&state).create_exercise(input).await?;
    Ok(created("Exercise created successfully", exercise))
}

/// PUT /api/exercises/:id
#[instrument(name = "update_exercise", skip(state, payload))]
pub async fn update_exercise(
    State(state): State<AppState>,
    Path(exercise_id): Path<String>,
    payload: Result<Json<ExerciseInput>, JsonRejection>,
) -> Result<Response, AppError> {
    let exercise_id = parse_id(&exercise_id, "exercise")?;
    let Json(input) = payload?;
    let exercise = exercise_service(&state)
        .update_exercise(exercise_id, input)
        .await?;
    Ok(ok("Exercise updated successfully", exercise))
}

/// DELETE /api/exercises/:id
#[instrument(name = "delete_exercise", skip(state))]
pub async fn delete_exercise(
    State(state): State<AppState>,
    Path(exercise_id): Path<String>,
) -> Result<Response, AppError> {
    let exercise_id = parse_id(&exercise_id, "exercise")?;
    exercise_service(&state).delete_exercise(exercise_id).await?;
    Ok(ok_empty("Exercise deleted successfully"))
}
