//! Signal client (C4, §4.4): outbound HTTP calls to the gateway.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::archive::ArchiveHandle;
use crate::error::SignalClientError;
use crate::model::MessageRecord;

pub struct SignalClient {
    http: reqwest::Client,
    base_url: String,
    account: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    message: &'a str,
    number: &'a str,
    recipients: Vec<&'a str>,
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(deserialize_with = "deserialize_timestamp")]
    timestamp: i64,
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    // The gateway returns `timestamp` as either a JSON integer or a string
    // encoding one (§4.4). Accept both.
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom("timestamp out of range")),
        Value::String(s) => s
            .parse()
            .map_err(|_| serde::de::Error::custom("timestamp string is not an integer")),
        other => Err(serde::de::Error::custom(format!(
            "unexpected timestamp type: {other}"
        ))),
    }
}

#[derive(Serialize)]
struct TypingRequest<'a> {
    recipient: &'a str,
}

impl SignalClient {
    pub fn new(http: reqwest::Client, gateway_base_url: String, account: String) -> Self {
        Self {
            http,
            base_url: gateway_base_url,
            account,
        }
    }

    /// Sends `message` to `recipients_target` (the resolved group public id
    /// when the conversation is a group, otherwise the sender's identifier),
    /// then archives one outbound [`MessageRecord`] per intended end
    /// recipient. `archival_source` is the conversational correspondent used
    /// for the archived row's `target` field — this is the sender's
    /// identifier even for group sends (§9 open question, resolved: the
    /// archived `target` always names who the human conversation was with).
    pub async fn send_message(
        &self,
        message: &str,
        recipients_target: &str,
        archival_source: &str,
        group_chat: Option<&str>,
        archive: &ArchiveHandle,
    ) -> Result<(), SignalClientError> {
        let body = SendRequest {
            message,
            number: &self.account,
            recipients: vec![recipients_target],
        };

        let response = self
            .http
            .post(format!("{}/v2/send", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SignalClientError::Status { status, body });
        }

        let parsed: SendResponse = response.json().await?;
        let signal_received_timestamp = crate::model::millis_to_utc(parsed.timestamp);

        // §4.4: one archival attempt per intended end recipient. The
        // `recipients` array always carries exactly one element here, so
        // this is one record.
        let record = MessageRecord {
            timestamp: Utc::now(),
            signal_received_timestamp,
            signal_delivered_timestamp: None,
            target: archival_source.to_owned(),
            source: self.account.clone(),
            group_chat: group_chat.map(str::to_owned),
            mentions: None,
            content: Some(message.to_owned()),
        };
        archive.enqueue(record).await;

        Ok(())
    }

    pub async fn indicate_typing(&self, recipient: &str) -> Result<(), SignalClientError> {
        let response = self
            .http
            .put(format!("{}/v1/typing-indicator/{}", self.base_url, self.account))
            .json(&TypingRequest { recipient })
            .send()
            .await?;
        Self::check_status(response).await
    }

    pub async fn hide_indicator(&self, recipient: &str) -> Result<(), SignalClientError> {
        let response = self
            .http
            .delete(format!("{}/v1/typing-indicator/{}", self.base_url, self.account))
            .json(&TypingRequest { recipient })
            .send()
            .await?;
        Self::check_status(response).await
    }

    async fn check_status(response: reqwest::Response) -> Result<(), SignalClientError> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(SignalClientError::Status { status, body })
        }
    }
}
