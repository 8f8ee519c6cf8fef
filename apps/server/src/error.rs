use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use colloquy_chat::ChatError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Chat(#[from] ChatError),
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            ApiError::Chat(e) => match e {
                ChatError::Provider(_) => (StatusCode::BAD_GATEWAY, e.to_string()),
                ChatError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
                ChatError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            },
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };
        let body = Json(ErrorBody {
            code: status.as_u16(),
            message: msg,
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
