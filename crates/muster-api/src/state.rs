use std::sync::Arc;
use std::time::Duration;

use tracing::error;
use uuid::Uuid;

use muster_db::Database;
use muster_presence::TypingRegistry;
use muster_types::models::Chat;

use crate::access::AccessPolicy;
use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub typing: TypingRegistry,
    pub access: Box<dyn AccessPolicy>,
    pub jwt_secret: String,
    /// How long a typing indicator stays live without a refresh.
    pub typing_ttl: Duration,
}

impl AppStateInner {
    /// Resolve a chat and check the caller may use it.
    pub fn authorize_chat(&self, chat_id: Uuid, user_id: Uuid) -> Result<Chat, ApiError> {
        let chat = self.db.require_chat(chat_id)?;
        self.authorize_project(chat.project_id, user_id)?;
        Ok(chat)
    }

    pub fn authorize_project(&self, project_id: Uuid, user_id: Uuid) -> Result<(), ApiError> {
        if self.access.can_access(&self.db, project_id, user_id)? {
            Ok(())
        } else {
            Err(ApiError::Unauthorized)
        }
    }
}

/// Run blocking DB work off the async runtime.
pub async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppStateInner) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal("blocking task failed".into())
        })?
}
