pub mod access;
pub mod chats;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod pins;
pub mod state;
pub mod typing;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// Chat routes. Everything except `/health` requires a bearer token.
pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/projects/{project_id}/chat", get(chats::get_chat))
        .route(
            "/chats/{chat_id}/messages",
            get(messages::list_messages).post(messages::send_message),
        )
        .route("/chats/{chat_id}/read", post(chats::mark_read))
        .route("/chats/{chat_id}/unread", get(chats::get_unread))
        .route(
            "/chats/{chat_id}/typing",
            get(typing::list_typing).put(typing::set_typing),
        )
        .route("/chats/{chat_id}/pins", get(pins::list_pinned))
        .route(
            "/chats/{chat_id}/pins/{message_id}",
            put(pins::pin_message).delete(pins::unpin_message),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
