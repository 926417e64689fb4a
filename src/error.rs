//! The error funnel. Handlers return [`AppError`]; its response carries the
//! error itself as a marker, and [`normalize_errors`] turns that marker into
//! the final body for the request's surface and the configured mode.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Html, IntoResponse, Response},
    Json,
};
use axum_extra::extract::WithRejection;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

use crate::auth::token::TokenError;
use crate::state::AppState;
use crate::store::StoreError;

pub const GENERIC_API_MESSAGE: &str = "Something went wrong.";
pub const GENERIC_PAGE_MESSAGE: &str = "Please try again.";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid {field}: {value}.")]
    InvalidId { field: String, value: String },

    #[error("Invalid input data. {}", .0.join(". "))]
    Validation(Vec<String>),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Invalid token! Please log in again.")]
    InvalidToken,

    #[error("Your token has expired! Please log in again.")]
    ExpiredToken,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Duplicate field value: {value}. Please use another value!")]
    Conflict { field: String, value: String },

    /// A request body the extractor refused, with the status it chose.
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },

    /// An outbound collaborator failed in an anticipated way.
    #[error("{0}")]
    Dependency(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidId { .. } | AppError::Validation(_) | AppError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthorized(_) | AppError::InvalidToken | AppError::ExpiredToken => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Rejected { status, .. } => *status,
            AppError::Dependency(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Operational errors carry a message that is safe to show to callers.
    pub fn is_operational(&self) -> bool {
        !matches!(self, AppError::Internal(_))
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidId { .. } => "InvalidId",
            AppError::Validation(_) => "Validation",
            AppError::BadRequest(_) => "BadRequest",
            AppError::Unauthorized(_) => "Unauthorized",
            AppError::InvalidToken => "InvalidToken",
            AppError::ExpiredToken => "ExpiredToken",
            AppError::Forbidden(_) => "Forbidden",
            AppError::NotFound(_) => "NotFound",
            AppError::Conflict { .. } => "Conflict",
            AppError::Rejected { .. } => "Rejected",
            AppError::Dependency(_) => "Dependency",
            AppError::Internal(_) => "Internal",
        }
    }
}

fn status_label(status: StatusCode) -> &'static str {
    if status.is_client_error() {
        "fail"
    } else {
        "error"
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidId { field, value } => AppError::InvalidId { field, value },
            StoreError::Duplicate { field, value } => AppError::Conflict { field, value },
            StoreError::Validation(errors) => AppError::Validation(errors),
            StoreError::Db(e) => AppError::Internal(e.into()),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => AppError::InvalidToken,
            TokenError::Expired => AppError::ExpiredToken,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => AppError::Validation(vec![e.body_text()]),
            JsonRejection::JsonSyntaxError(e) => AppError::BadRequest(e.body_text()),
            other => AppError::Rejected {
                status: other.status(),
                message: other.body_text(),
            },
        }
    }
}

/// A JSON request body whose rejections go through [`normalize_errors`].
pub type JsonBody<T> = WithRejection<Json<T>, AppError>;

/// Carries the handler's error to [`normalize_errors`].
#[derive(Clone)]
pub struct ErrorMarker(pub Arc<AppError>);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let err = Arc::new(self);
        let mut res = strict_api(&err).into_response();
        res.extensions_mut().insert(ErrorMarker(err));
        res
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Surface {
    Api,
    Page,
}

impl Surface {
    fn of(path: &str) -> Self {
        if path == "/api" || path.starts_with("/api/") {
            Surface::Api
        } else {
            Surface::Page
        }
    }
}

fn strict_api(err: &AppError) -> (StatusCode, Json<Value>) {
    if err.is_operational() {
        let status = err.status();
        (
            status,
            Json(json!({ "status": status_label(status), "message": err.to_string() })),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "message": GENERIC_API_MESSAGE })),
        )
    }
}

fn verbose_api(err: &AppError) -> (StatusCode, Json<Value>) {
    let status = err.status();
    (
        status,
        Json(json!({
            "status": status_label(status),
            "message": err.to_string(),
            "error": {
                "kind": err.kind(),
                "statusCode": status.as_u16(),
                "isOperational": err.is_operational(),
            },
            "stack": format!("{err:?}"),
        })),
    )
}

fn page(state: &AppState, status: StatusCode, msg: &str) -> Response {
    let bag = json!({ "title": "Something went wrong!", "msg": msg });
    match state.renderer.render("error", &bag) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            error!(error = %e, "error page failed to render");
            (status, msg.to_string()).into_response()
        }
    }
}

/// Shapes every failed response. Non-operational errors are always logged;
/// outside development they collapse to a fixed 500 with a generic message.
pub async fn normalize_errors(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let surface = Surface::of(req.uri().path());
    let mut res = next.run(req).await;
    let Some(ErrorMarker(err)) = res.extensions_mut().remove::<ErrorMarker>() else {
        return res;
    };

    if !err.is_operational() {
        error!(error = ?err, "unhandled error");
    }

    let verbose = state.config.environment.is_development();
    match (surface, verbose) {
        (Surface::Api, true) => verbose_api(&err).into_response(),
        (Surface::Api, false) => strict_api(&err).into_response(),
        (Surface::Page, true) => page(&state, err.status(), &err.to_string()),
        (Surface::Page, false) if err.is_operational() => {
            page(&state, err.status(), &err.to_string())
        }
        (Surface::Page, false) => page(&state, StatusCode::INTERNAL_SERVER_ERROR, GENERIC_PAGE_MESSAGE),
    }
}
