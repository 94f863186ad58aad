use std::future::Future;

use uuid::Uuid;

use muster_types::api::{ChatResponse, MarkReadResponse, SendMessageRequest};
use muster_types::models::{Message, PinnedMessage, TypingState, TypingType};

use crate::error::TransportError;

/// The chat server as seen by a client. `HttpTransport` is the real one; tests
/// drive the poller with an in-memory fake.
pub trait ChatTransport: Send + Sync + 'static {
    fn get_chat(
        &self,
        project_id: Uuid,
    ) -> impl Future<Output = Result<ChatResponse, TransportError>> + Send;

    /// Newest `limit` messages after skipping `offset`, ascending by id.
    fn list_messages(
        &self,
        chat_id: Uuid,
        offset: u32,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Message>, TransportError>> + Send;

    fn send_message(
        &self,
        chat_id: Uuid,
        request: SendMessageRequest,
    ) -> impl Future<Output = Result<Message, TransportError>> + Send;

    fn mark_read(
        &self,
        chat_id: Uuid,
    ) -> impl Future<Output = Result<MarkReadResponse, TransportError>> + Send;

    fn unread_count(&self, chat_id: Uuid) -> impl Future<Output = Result<u64, TransportError>> + Send;

    fn set_typing(
        &self,
        chat_id: Uuid,
        typing_type: TypingType,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn list_typing(
        &self,
        chat_id: Uuid,
    ) -> impl Future<Output = Result<Vec<TypingState>, TransportError>> + Send;

    fn pin_message(
        &self,
        chat_id: Uuid,
        message_id: i64,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn unpin_message(
        &self,
        chat_id: Uuid,
        message_id: i64,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn list_pinned(
        &self,
        chat_id: Uuid,
    ) -> impl Future<Output = Result<Vec<PinnedMessage>, TransportError>> + Send;
}
