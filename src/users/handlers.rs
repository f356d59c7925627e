use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use bytes::Bytes;
use tracing::instrument;

use crate::{
    error::ApiError,
    response::ApiResponse,
    state::AppState,
    users::{
        dto::{create_request, parse_object, update_request},
        model::UserResponse,
        services,
    },
};

type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:phone",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/:phone/restore", patch(restore_user))
}

#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Vec<UserResponse>> {
    let users = services::list_enabled(state.store.as_ref()).await?;
    let items: Vec<UserResponse> = users.iter().map(|u| u.to_representation()).collect();
    Ok((StatusCode::OK, Json(ApiResponse::list(items))))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(phone): Path<String>,
) -> ApiResult<UserResponse> {
    let user = services::get_by_phone(state.store.as_ref(), &phone).await?;
    Ok((StatusCode::OK, Json(ApiResponse::data(user.to_representation()))))
}

#[instrument(skip(state, body))]
pub async fn create_user(State(state): State<AppState>, body: Bytes) -> ApiResult<UserResponse> {
    let payload = parse_object(&body)?;
    let new_user = create_request(&payload)?;
    let user = services::create(state.store.as_ref(), new_user).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::data(user.to_representation()).with_message("User created successfully")),
    ))
}

#[instrument(skip(state, body))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(phone): Path<String>,
    body: Bytes,
) -> ApiResult<UserResponse> {
    let parse = move || update_request(&parse_object(&body)?);
    let user = services::update_by_phone(state.store.as_ref(), &phone, parse).await?;
    Ok((
        StatusCode::OK,
        Json(ApiResponse::data(user.to_representation()).with_message("User updated successfully")),
    ))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(phone): Path<String>,
) -> ApiResult<()> {
    services::disable_by_phone(state.store.as_ref(), &phone).await?;
    Ok((
        StatusCode::OK,
        Json(ApiResponse::<()>::message("User removed successfully")),
    ))
}

#[instrument(skip(state))]
pub async fn restore_user(
    State(state): State<AppState>,
    Path(phone): Path<String>,
) -> ApiResult<UserResponse> {
    let user = services::restore_by_phone(state.store.as_ref(), &phone).await?;
    Ok((
        StatusCode::OK,
        Json(ApiResponse::data(user.to_representation()).with_message("User restored successfully")),
    ))
}
