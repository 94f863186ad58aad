use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Chat, MediaRef, TypingType};

// -- JWT Claims --

/// Bearer token claims. Tokens are minted by the account service; chat only
/// verifies them and trusts `sub` as the caller's user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
}

// -- Chats --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub chat: Chat,
    pub unread_count: u64,
}

// -- Messages --

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media: Option<MediaRef>,
}

// -- Read state --

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub last_read_message_id: i64,
    pub unread_count: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UnreadResponse {
    pub unread_count: u64,
}

// -- Typing --

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetTypingRequest {
    pub typing_type: TypingType,
}
