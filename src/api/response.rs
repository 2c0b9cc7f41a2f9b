//! The `{ data, meta }` envelope every route answers with.

use axum::Json;
use axum::http::StatusCode;
use chrono::Utc;
use serde::Serialize;

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    pub meta: ResponseMeta,
}

#[derive(Serialize)]
pub struct ResponseMeta {
    pub status: &'static str,
    pub status_code: u16,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ResponseMeta {
    fn new(status: StatusCode, message: Option<String>) -> Self {
        Self {
            status: if status.is_success() { "success" } else { "error" },
            status_code: status.as_u16(),
            timestamp: Utc::now().to_rfc3339(),
            message,
        }
    }
}

pub type Envelope<T> = (StatusCode, Json<ApiResponse<T>>);

fn envelope<T>(status: StatusCode, data: Option<T>, message: Option<String>) -> Envelope<T> {
    let meta = ResponseMeta::new(status, message);
    (status, Json(ApiResponse { data, meta }))
}

pub fn success<T: Serialize>(data: T) -> Envelope<T> {
    envelope(StatusCode::OK, Some(data), None)
}

/// 201 for routes that store something new.
pub fn created<T: Serialize>(data: T) -> Envelope<T> {
    envelope(StatusCode::CREATED, Some(data), None)
}

pub fn error<T>(status: StatusCode, message: impl Into<String>) -> Envelope<T> {
    envelope(status, None, Some(message.into()))
}
