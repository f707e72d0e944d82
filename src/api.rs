// REST client for the marketplace messaging endpoints. Every request
// carries the stored bearer token; a 401 is reported as a session-expired
// error so the caller can route to re-authentication instead of retrying.

use crate::error::{ChatError, Result};
use crate::models::{Conversation, Message, MessagePage};
use log::debug;
use reqwest::StatusCode;
use serde_json::json;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Strip the API path suffix from the configured API origin, leaving just
/// `scheme://host[:port]`. The socket connects to this base endpoint.
pub fn socket_origin(api_origin: &str) -> String {
    let trimmed = api_origin.trim_end_matches('/');
    let after_scheme = match trimmed.find("://") {
        Some(idx) => idx + 3,
        None => 0,
    };
    match trimmed[after_scheme..].find('/') {
        Some(idx) => trimmed[..after_scheme + idx].to_string(),
        None => trimmed.to_string(),
    }
}

/// Socket handshake URL with the auth token attached.
pub fn socket_url(api_origin: &str, token: &str) -> String {
    let origin = socket_origin(api_origin);
    let ws_origin = if let Some(rest) = origin.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = origin.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        origin
    };
    format!("{}/socket?token={}", ws_origin, urlencoding::encode(token))
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(api_origin: &str, token: &str) -> Result<Self> {
        if token.is_empty() {
            return Err(ChatError::SessionExpired);
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(ApiClient {
            http,
            base_url: api_origin.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn expect_ok(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ChatError::SessionExpired);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ChatError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    pub async fn list_conversations(&self, archived: bool) -> Result<Vec<Conversation>> {
        debug!("Fetching conversation list (archived={})", archived);
        let response = self
            .http
            .get(self.url("/conversations"))
            .query(&[("archived", archived)])
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(Self::expect_ok(response).await?.json().await?)
    }

    pub async fn get_conversation(&self, conversation_id: &str) -> Result<Conversation> {
        let response = self
            .http
            .get(self.url(&format!("/conversations/{}", conversation_id)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(Self::expect_ok(response).await?.json().await?)
    }

    /// Fetch one page of history. Page 1 is the most recent; messages
    /// within a page come oldest-first.
    pub async fn fetch_messages(&self, conversation_id: &str, page: u32) -> Result<MessagePage> {
        debug!(
            "Fetching messages page {} for conversation {}",
            page, conversation_id
        );
        let response = self
            .http
            .get(self.url(&format!("/conversations/{}/messages", conversation_id)))
            .query(&[("page", page)])
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(Self::expect_ok(response).await?.json().await?)
    }

    /// Persist a message; the returned message carries the server-assigned
    /// id that reconciles the optimistic entry.
    pub async fn send_message(&self, conversation_id: &str, content: &str) -> Result<Message> {
        let response = self
            .http
            .post(self.url(&format!("/conversations/{}/messages", conversation_id)))
            .bearer_auth(&self.token)
            .json(&json!({ "content": content }))
            .send()
            .await?;
        Ok(Self::expect_ok(response).await?.json().await?)
    }

    pub async fn mark_read(&self, conversation_id: &str) -> Result<()> {
        let response = self
            .http
            .post(self.url(&format!("/conversations/{}/read", conversation_id)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::expect_ok(response).await?;
        Ok(())
    }

    pub async fn delete_message(&self, conversation_id: &str, message_id: &str) -> Result<()> {
        let response = self
            .http
            .delete(self.url(&format!(
                "/conversations/{}/messages/{}",
                conversation_id, message_id
            )))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::expect_ok(response).await?;
        Ok(())
    }

    /// Archive or restore a conversation.
    pub async fn set_archived(&self, conversation_id: &str, archived: bool) -> Result<()> {
        let action = if archived { "archive" } else { "restore" };
        let response = self
            .http
            .post(self.url(&format!("/conversations/{}/{}", conversation_id, action)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::expect_ok(response).await?;
        Ok(())
    }

    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        let response = self
            .http
            .delete(self.url(&format!("/conversations/{}", conversation_id)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::expect_ok(response).await?;
        Ok(())
    }

    /// Out-of-band offer resolution: records `status` against the proposing
    /// message. The server echoes a status-update message back through the
    /// socket for everyone else.
    pub async fn update_offer_status(
        &self,
        conversation_id: &str,
        message_id: &str,
        status: &str,
    ) -> Result<()> {
        let response = self
            .http
            .put(self.url(&format!(
                "/conversations/{}/messages/{}/offer-status",
                conversation_id, message_id
            )))
            .bearer_auth(&self.token)
            .json(&json!({ "status": status }))
            .send()
            .await?;
        Self::expect_ok(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_origin_strips_api_suffix() {
        assert_eq!(
            socket_origin("https://market.example.com/api"),
            "https://market.example.com"
        );
        assert_eq!(
            socket_origin("https://market.example.com/api/v1/"),
            "https://market.example.com"
        );
        assert_eq!(
            socket_origin("http://localhost:5000"),
            "http://localhost:5000"
        );
    }

    #[test]
    fn socket_url_swaps_scheme_and_attaches_token() {
        let url = socket_url("https://market.example.com/api", "abc 123");
        assert_eq!(url, "wss://market.example.com/socket?token=abc%20123");

        let url = socket_url("http://localhost:5000/api", "tok");
        assert_eq!(url, "ws://localhost:5000/socket?token=tok");
    }
}
