use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use super::pagination::PageParams;

/// Success envelope shared by every endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// Success envelope for list endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Vec<T>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> PaginatedResponse<T> {
    pub fn new(message: impl Into<String>, data: Vec<T>, params: PageParams, total: i64) -> Self {
        let total_pages = params.total_pages(total);
        Self {
            success: true,
            message: message.into(),
            data,
            page: params.page,
            limit: params.limit,
            total,
            total_pages,
            has_next: params.page < total_pages,
            has_prev: params.page > 1,
        }
    }
}

impl<T: Serialize> IntoResponse for PaginatedResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// 200 with a payload
pub fn ok<T: Serialize>(message: impl Into<String>, data: T) -> Response {
    respond(StatusCode::OK, message, Some(data))
}

/// 201 with the created resource
pub fn created<T: Serialize>(message: impl Into<String>, data: T) -> Response {
    respond(StatusCode::CREATED, message, Some(data))
}

/// 200 without a payload
pub fn ok_empty(message: impl Into<String>) -> Response {
    respond::<()>(StatusCode::OK, message, None)
}

fn respond<T: Serialize>(status: StatusCode, message: impl Into<String>, data: Option<T>) -> Response {
    let body = ApiResponse {
        success: true,
        message: message.into(),
        data,
    };
    (status, Json(body)).into_response()
}
