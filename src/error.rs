use axum::{
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::response::ApiResponse;
use crate::users::model::ValidationError;
use crate::users::repo::{StoreError, UniqueField};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    /// Transition not allowed from the current state.
    #[error("{0}")]
    State(String),
    #[error("{context}")]
    Storage {
        context: &'static str,
        #[source]
        source: StoreError,
    },
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }

    pub fn user_not_found(phone: &str) -> Self {
        ApiError::NotFound(format!("User with phone {} not found", phone))
    }

    /// Maps a store failure, keeping uniqueness violations apart from the rest.
    pub fn store(context: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |err| match err {
            StoreError::UniqueViolation(field) => ApiError::Conflict(conflict_message(field).into()),
            source => ApiError::Storage { context, source },
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::State(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub fn conflict_message(field: UniqueField) -> &'static str {
    match field {
        UniqueField::Email => "Email already in use",
        UniqueField::Phone => "Phone already registered",
        UniqueField::Other => "User already exists",
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Storage { context, source } => {
                tracing::error!(error = %source, "{}", context);
            }
            ApiError::Conflict(msg) => tracing::warn!(%status, "{}", msg),
            _ => tracing::debug!(%status, error = %self, "request rejected"),
        }
        let body = ApiResponse::<()>::error(self.to_string());
        (status, Json(body)).into_response()
    }
}

/// Wraps error responses produced outside the handlers (unknown route,
/// wrong method, oversized body, timeout) in the JSON envelope.
pub async fn envelope_errors(response: Response) -> Response {
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) || is_json(&response) {
        return response;
    }

    let (parts, _) = response.into_parts();
    let message = status.canonical_reason().unwrap_or("Request failed");
    tracing::debug!(%status, "enveloping framework error");

    let mut rebuilt = (status, Json(ApiResponse::<()>::error(message))).into_response();
    for (name, value) in parts.headers.iter() {
        if name != CONTENT_TYPE && name != CONTENT_LENGTH {
            rebuilt.headers_mut().append(name.clone(), value.clone());
        }
    }
    rebuilt
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::header::ALLOW};
    use http_body_util::BodyExt;

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn bare_error_responses_get_the_envelope() {
        let bare = Response::builder()
            .status(StatusCode::REQUEST_TIMEOUT)
            .body(Body::empty())
            .unwrap();
        let response = envelope_errors(bare).await;

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert!(is_json(&response));
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Request Timeout");
    }

    #[tokio::test]
    async fn enveloping_keeps_other_headers() {
        let bare = Response::builder()
            .status(StatusCode::METHOD_NOT_ALLOWED)
            .header(ALLOW, "GET,HEAD")
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(Body::from("nope"))
            .unwrap();
        let response = envelope_errors(bare).await;

        assert_eq!(response.headers()[ALLOW], "GET,HEAD");
        assert!(is_json(&response));
        assert_eq!(json_body(response).await["message"], "Method Not Allowed");
    }

    #[tokio::test]
    async fn api_errors_and_successes_pass_through() {
        let response = envelope_errors(ApiError::user_not_found("999").into_response()).await;
        assert_eq!(
            json_body(response).await["message"],
            "User with phone 999 not found"
        );

        let ok = envelope_errors("ok".into_response()).await;
        assert_eq!(ok.status(), StatusCode::OK);
        assert!(!is_json(&ok));
    }

    #[test]
    fn validation_errors_keep_their_message() {
        let err = ApiError::from(ValidationError::EmailFormat);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Invalid email format");
    }

    #[test]
    fn unique_violations_become_conflicts() {
        let err = ApiError::store("Failed to create user")(StoreError::UniqueViolation(
            UniqueField::Phone,
        ));
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), "Phone already registered");
    }

    #[test]
    fn storage_errors_hide_the_source() {
        let err = ApiError::store("Failed to update user")(StoreError::RowMissing(7));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Failed to update user");
    }

    #[test]
    fn state_errors_are_bad_requests() {
        let err = ApiError::State("User is already active".into());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
