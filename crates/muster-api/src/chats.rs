use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use muster_types::api::{ChatResponse, Claims, MarkReadResponse, UnreadResponse};

use crate::error::ApiError;
use crate::state::{AppState, blocking};

/// Open a project's chat, creating it on first access. The caller is
/// registered as a member so their unread count is tracked from here on.
pub async fn get_chat(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let response = blocking(&state, move |s| {
        s.authorize_project(project_id, user_id)?;
        let chat = s.db.get_or_create_chat(project_id)?;
        let read_state = s.db.register_member(chat.id, user_id)?;
        Ok(ChatResponse {
            chat,
            unread_count: read_state.unread_count,
        })
    })
    .await?;

    Ok(Json(response))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let read_state = blocking(&state, move |s| {
        s.authorize_chat(chat_id, user_id)?;
        Ok(s.db.mark_read(chat_id, user_id)?)
    })
    .await?;

    Ok(Json(MarkReadResponse {
        last_read_message_id: read_state.last_read_message_id,
        unread_count: read_state.unread_count,
    }))
}

pub async fn get_unread(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let unread_count = blocking(&state, move |s| {
        s.authorize_chat(chat_id, user_id)?;
        Ok(s.db.unread_count(chat_id, user_id)?)
    })
    .await?;

    Ok(Json(UnreadResponse { unread_count }))
}
