use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use muster_types::api::{
    ChatResponse, MarkReadResponse, SendMessageRequest, SetTypingRequest, UnreadResponse,
};
use muster_types::models::{Message, PinnedMessage, TypingState, TypingType};

use crate::error::TransportError;
use crate::transport::ChatTransport;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// `ChatTransport` over the HTTP/JSON API, authenticated with a bearer token.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(client, base_url, token))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, TransportError> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        // Error bodies are `{"error": "..."}`; fall back to the status text.
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
        };
        Err(TransportError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, TransportError> {
        let response = self.execute(request).await?;
        response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

impl ChatTransport for HttpTransport {
    async fn get_chat(&self, project_id: Uuid) -> Result<ChatResponse, TransportError> {
        let url = self.url(&format!("/projects/{}/chat", project_id));
        self.json(self.client.get(url)).await
    }

    async fn list_messages(
        &self,
        chat_id: Uuid,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Message>, TransportError> {
        let url = self.url(&format!("/chats/{}/messages", chat_id));
        let request = self
            .client
            .get(url)
            .query(&[("offset", offset), ("limit", limit)]);
        self.json(request).await
    }

    async fn send_message(
        &self,
        chat_id: Uuid,
        request: SendMessageRequest,
    ) -> Result<Message, TransportError> {
        let url = self.url(&format!("/chats/{}/messages", chat_id));
        self.json(self.client.post(url).json(&request)).await
    }

    async fn mark_read(&self, chat_id: Uuid) -> Result<MarkReadResponse, TransportError> {
        let url = self.url(&format!("/chats/{}/read", chat_id));
        self.json(self.client.post(url)).await
    }

    async fn unread_count(&self, chat_id: Uuid) -> Result<u64, TransportError> {
        let url = self.url(&format!("/chats/{}/unread", chat_id));
        let body: UnreadResponse = self.json(self.client.get(url)).await?;
        Ok(body.unread_count)
    }

    async fn set_typing(&self, chat_id: Uuid, typing_type: TypingType) -> Result<(), TransportError> {
        let url = self.url(&format!("/chats/{}/typing", chat_id));
        self.execute(self.client.put(url).json(&SetTypingRequest { typing_type }))
            .await?;
        Ok(())
    }

    async fn list_typing(&self, chat_id: Uuid) -> Result<Vec<TypingState>, TransportError> {
        let url = self.url(&format!("/chats/{}/typing", chat_id));
        self.json(self.client.get(url)).await
    }

    async fn pin_message(&self, chat_id: Uuid, message_id: i64) -> Result<(), TransportError> {
        let url = self.url(&format!("/chats/{}/pins/{}", chat_id, message_id));
        self.execute(self.client.put(url)).await?;
        Ok(())
    }

    async fn unpin_message(&self, chat_id: Uuid, message_id: i64) -> Result<(), TransportError> {
        let url = self.url(&format!("/chats/{}/pins/{}", chat_id, message_id));
        self.execute(self.client.delete(url)).await?;
        Ok(())
    }

    async fn list_pinned(&self, chat_id: Uuid) -> Result<Vec<PinnedMessage>, TransportError> {
        let url = self.url(&format!("/chats/{}/pins", chat_id));
        self.json(self.client.get(url)).await
    }
}
