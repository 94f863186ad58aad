use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use muster_types::api::{Claims, SetTypingRequest};

use crate::error::ApiError;
use crate::state::{AppState, blocking};

pub async fn set_typing(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SetTypingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    blocking(&state, move |s| s.authorize_chat(chat_id, user_id).map(|_| ())).await?;

    state
        .typing
        .set_typing(chat_id, user_id, req.typing_type, state.typing_ttl);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_typing(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    blocking(&state, move |s| s.authorize_chat(chat_id, user_id).map(|_| ())).await?;

    Ok(Json(state.typing.list_active(chat_id)))
}
