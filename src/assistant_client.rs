//! Assistant client (C5, §4.5): forwards authorized text to the webhook and
//! returns its reply verbatim.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;

use crate::error::AssistantClientError;

pub struct AssistantClient {
    http: reqwest::Client,
    webhook_url: String,
    auth_header: String,
}

#[derive(Serialize)]
struct AssistantRequest<'a> {
    #[serde(rename = "chatInput")]
    chat_input: &'a str,
    action: &'static str,
    #[serde(rename = "sessionId")]
    session_id: String,
}

impl AssistantClient {
    pub fn new(http: reqwest::Client, webhook_url: String, auth_token: &str) -> Self {
        let auth_header = format!("Basic {}", STANDARD.encode(auth_token));
        Self {
            http,
            webhook_url,
            auth_header,
        }
    }

    /// Posts `chat_input` for `user_id` and returns the webhook's response
    /// body, treated as the reply text regardless of content type (§4.5).
    pub async fn send(&self, chat_input: &str, user_id: &str) -> Result<String, AssistantClientError> {
        let body = AssistantRequest {
            chat_input,
            action: "sendMessage",
            session_id: format!("intelligence-{user_id}"),
        };

        let response = self
            .http
            .post(&self.webhook_url)
            .header("Authorization", &self.auth_header)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AssistantClientError::Status { status, body: text });
        }
        Ok(text)
    }
}
