use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use peerdrop_shared::RoomId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Room not found: {0}")]
    RoomNotFound(RoomId),

    #[error("Invalid room id: {0}")]
    InvalidRoom(String),

    #[error("Body is not valid JSON: {0}")]
    InvalidBody(String),

    #[error("Relay is full ({0} rooms)")]
    RoomsFull(usize),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::RoomNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidRoom(_) | ServerError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ServerError::RoomsFull(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}
