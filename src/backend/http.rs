//! JSON-over-HTTP chat backend

use super::{BackendError, ChatBackend};
use crate::registry::Chat;
use crate::store::Message;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageBody<'a> {
    #[serde(flatten)]
    message: &'a Message,
    chat_id: &'a str,
}

#[derive(Serialize)]
struct RenderBody<'a> {
    code: &'a str,
}

#[derive(Deserialize)]
struct RenderResponse {
    video_url: String,
}

pub struct HttpChatBackend {
    client: Client,
    base_url: String,
}

impl HttpChatBackend {
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Request {
                operation: "client setup",
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<reqwest::Response, BackendError> {
        let response = request.send().await.map_err(|e| BackendError::Request {
            operation,
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(operation, status = status.as_u16(), "Backend request rejected");
            return Err(BackendError::Status {
                operation,
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        Self::send(operation, request)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse {
                operation,
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn list_conversations(&self) -> Result<Vec<Chat>, BackendError> {
        Self::send_json("list chats", self.client.get(self.url("/api/chats"))).await
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, BackendError> {
        let request = self
            .client
            .get(self.url("/api/messages"))
            .query(&[("chatId", conversation_id)]);
        Self::send_json("list messages", request).await
    }

    async fn create_conversation(&self, chat: &Chat) -> Result<(), BackendError> {
        let request = self.client.post(self.url("/api/chats")).json(chat);
        Self::send("create chat", request).await.map(drop)
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        message: &Message,
    ) -> Result<(), BackendError> {
        let body = SendMessageBody {
            message,
            chat_id: conversation_id,
        };
        let request = self.client.post(self.url("/api/send")).json(&body);
        Self::send("send message", request).await.map(drop)
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), BackendError> {
        let request = self
            .client
            .delete(self.url(&format!("/api/chats/{conversation_id}")));
        Self::send("delete chat", request).await.map(drop)
    }

    async fn render_video(&self, message_id: &str, code: &str) -> Result<String, BackendError> {
        let request = self
            .client
            .post(self.url(&format!("/api/v1/{message_id}/render")))
            .json(&RenderBody { code });
        let response: RenderResponse = Self::send_json("render video", request).await?;
        Ok(response.video_url)
    }
}
