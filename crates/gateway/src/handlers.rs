use axum::{http::StatusCode, Json};
use shared_types::MessageResponse;

pub async fn health_check() -> StatusCode {
    StatusCode::OK
}

pub async fn ping() -> Json<MessageResponse> {
    Json(MessageResponse::new("pong"))
}
