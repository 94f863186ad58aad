use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use muster_types::api::Claims;

use crate::error::ApiError;
use crate::state::{AppState, blocking};

pub async fn pin_message(
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(Uuid, i64)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    blocking(&state, move |s| {
        s.authorize_chat(chat_id, user_id)?;
        Ok(s.db.pin_message(chat_id, message_id, user_id)?)
    })
    .await?;

    info!(%chat_id, message_id, %user_id, "Pin requested");
    Ok(StatusCode::NO_CONTENT)
}

/// Unpinning a message that is not pinned (or does not exist) still succeeds.
pub async fn unpin_message(
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(Uuid, i64)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let removed = blocking(&state, move |s| {
        s.authorize_chat(chat_id, user_id)?;
        Ok(s.db.unpin_message(chat_id, message_id)?)
    })
    .await?;

    if removed {
        info!(%chat_id, message_id, %user_id, "Message unpinned");
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_pinned(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let pinned = blocking(&state, move |s| {
        s.authorize_chat(chat_id, user_id)?;
        Ok(s.db.list_pinned(chat_id)?)
    })
    .await?;

    Ok(Json(pinned))
}
