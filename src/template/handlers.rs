use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::Response,
    Extension, Json,
};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{
    service::TemplateService,
    types::{CreateTemplateRequest, TemplateSummary},
};
use crate::auth::AuthUser;
use crate::shared::{
    pagination::{PageParams, PageQuery},
    parse_id,
    response::{created, ok, ok_empty, PaginatedResponse},
    AppError, AppState,
};

fn template_service(state: &AppState) -> TemplateService {
    TemplateService::new(
        Arc::clone(&state.template_repository),
        Arc::clone(&state.exercise_repository),
        Arc::clone(&state.workout_repository),
        Arc::clone(&state.reference_gate),
    )
}

/// HTTP handler for creating a template with its exercises
///
/// POST /api/me/templates
/// Returns the stored aggregate
#[instrument(name = "create_template", skip(state, payload))]
pub async fn create_template(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<CreateTemplateRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload?;
    let template = template_service(&state)
        .create_template(user.user_id, request)
        .await?;
    Ok(created("Template created successfully", template))
}

/// GET /api/me/templates?page=&limit=
#[instrument(name = "list_templates", skip(state))]
pub async fn list_templates(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(page): Query<PageQuery>,
) -> Result<PaginatedResponse<TemplateSummary>, AppError> {
    let params = PageParams::from(&page);
    let (templates, total) = template_service(&state)
        .list_templates(user.user_id, params)
        .await?;

    info!(count = templates.len(), total, "Templates listed");
    Ok(PaginatedResponse::new(
        "Templates retrieved successfully",
        templates,
        params,
        total,
    ))
}

/// GET /api/me/templates/:id
#[instrument(name = "get_template", skip(state))]
pub async fn get_template(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(template_id): Path<String>,
) -> Result<Response, AppError> {
    let template_id = parse_id(&template_id, "template")?;
    let template = template_service(&state)
        .get_template(user.user_id, template_id)
        .await?;
    Ok(ok("Template retrieved successfully", template))
}

/// DELETE /api/me/templates/:id
#[instrument(name = "delete_template", skip(state))]
pub async fn delete_template(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(template_id): Path<String>,
) -> Result<Response, AppError> {
    let template_id = parse_id(&template_id, "template")?;
    template_service(&state)
        .delete_template(user.user_id, template_id)
        .await?;
    Ok(ok_empty("Template deleted successfully"))
}
