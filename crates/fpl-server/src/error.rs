// API errors and their rendering as `{"detail": ...}` JSON.

use serde::Serialize;
use std::convert::Infallible;
use thiserror::Error;
use tracing::{error, warn};
use warp::http::StatusCode;
use warp::{Rejection, Reply};

use fpl_core::planner::PlanError;

use crate::upstream::UpstreamError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl warp::reject::Reject for ApiError {}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::NotFound => ApiError::NotFound("Resource not found".to_string()),
            other => {
                warn!(error = %other, "upstream failure");
                ApiError::Upstream("Upstream FPL API error".to_string())
            }
        }
    }
}

impl From<PlanError> for ApiError {
    fn from(err: PlanError) -> Self {
        error!(error = %err, "plan failed verification");
        ApiError::Internal(format!("Planner validation failed: {err}"))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

/// Render rejections. Errors raised by the handlers keep their status; bad
/// query strings are validation errors.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, detail) = if let Some(api) = err.find::<ApiError>() {
        (api.status(), api.to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not Found".to_string())
    } else if let Some(invalid) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::UNPROCESSABLE_ENTITY, invalid.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed".to_string())
    } else {
        error!(?err, "unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorBody { detail }),
        status,
    ))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
