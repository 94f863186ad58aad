use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use muster_types::api::{Claims, SendMessageRequest};

use crate::error::ApiError;
use crate::state::{AppState, blocking};

pub const DEFAULT_PAGE: u32 = 50;
pub const MAX_PAGE: u32 = 200;
pub const MAX_TEXT_LEN: usize = 4000;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    /// Messages to skip counting back from the newest one.
    #[serde(default)]
    pub offset: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Delta mode: only messages with an id greater than this. Overrides `offset`.
    pub since: Option<i64>,
}

fn default_limit() -> u32 {
    DEFAULT_PAGE
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let reader = claims.sub;
    let limit = query.limit.clamp(1, MAX_PAGE);

    let messages = blocking(&state, move |s| {
        s.authorize_chat(chat_id, reader)?;
        let mut messages = match query.since {
            Some(since) => s.db.fetch_messages_since(chat_id, since, limit)?,
            None => s.db.fetch_messages(chat_id, query.offset, limit)?,
        };

        // Everything from other senders in this window has now reached the reader.
        if let (Some(first), Some(last)) = (messages.first(), messages.last()) {
            if let Err(e) = s.db.mark_delivered(chat_id, reader, first.id, last.id) {
                warn!(%chat_id, "Failed to record delivery: {}", e);
            } else {
                for m in messages.iter_mut().filter(|m| m.sender_id != reader) {
                    m.delivered = true;
                }
            }
        }
        Ok(messages)
    })
    .await?;

    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let text = req
        .text
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty());
    if text.is_none() && req.media.is_none() {
        return Err(ApiError::BadRequest("message needs text or media".into()));
    }
    if text.as_ref().is_some_and(|t| t.chars().count() > MAX_TEXT_LEN) {
        return Err(ApiError::BadRequest(format!(
            "text longer than {} characters",
            MAX_TEXT_LEN
        )));
    }
    if req.media.as_ref().is_some_and(|m| m.reference.trim().is_empty()) {
        return Err(ApiError::BadRequest("empty media reference".into()));
    }

    let sender = claims.sub;
    let media = req.media;
    let message = blocking(&state, move |s| {
        s.authorize_chat(chat_id, sender)?;
        Ok(s.db.append_message(chat_id, sender, text.as_deref(), media.as_ref())?)
    })
    .await?;

    info!(%chat_id, message_id = message.id, %sender, "Message sent");
    Ok((StatusCode::CREATED, Json(message)))
}
