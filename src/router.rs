//! Message router (C8, §4.8): the per-envelope decision procedure tying
//! every other component together.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::archive::ArchiveHandle;
use crate::assistant_client::AssistantClient;
use crate::auth::AuthorizationPolicy;
use crate::error::DecodeError;
use crate::group_cache::GroupResolver;
use crate::model::{effective_text, Envelope, MessageRecord};
use crate::signal_client::SignalClient;

pub struct MessageRouter {
    account: String,
    auth: AuthorizationPolicy,
    groups: GroupResolver,
    archive: ArchiveHandle,
    signal: SignalClient,
    assistant: AssistantClient,
}

impl MessageRouter {
    pub fn new(
        account: String,
        auth: AuthorizationPolicy,
        groups: GroupResolver,
        archive: ArchiveHandle,
        signal: SignalClient,
        assistant: AssistantClient,
    ) -> Self {
        Self {
            account,
            auth,
            groups,
            archive,
            signal,
            assistant,
        }
    }

    /// Decodes and processes one raw gateway payload. Decode and archive
    /// failures never propagate out of here — the receive loop must keep
    /// running regardless of what one bad envelope does (§4.6, §7).
    pub async fn handle_payload(&self, raw: &str) {
        let envelope: Envelope = match serde_json::from_str(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                let err = DecodeError::from(err);
                warn!(error = %err, payload = %raw, "failed to decode envelope, dropping");
                return;
            }
        };
        self.handle_envelope(envelope).await;
    }

    async fn handle_envelope(&self, envelope: Envelope) {
        let Some(data_message) = envelope.data_message.as_ref() else {
            debug!(source = %envelope.source, "envelope carries no dataMessage, dropping");
            return;
        };

        let text = effective_text(data_message);

        if !self.auth.is_authorized(&envelope.source) {
            warn!(source = %envelope.source, "source not in authorization whitelist, dropping");
            return;
        }

        let group_id = match &data_message.group_info {
            Some(info) => match self.groups.resolve(&info.group_id).await {
                Ok(public_id) => Some(public_id),
                Err(err) => {
                    warn!(error = %err, internal_id = %info.group_id, "group resolution failed, continuing without group id");
                    None
                }
            },
            None => None,
        };

        let record = MessageRecord {
            timestamp: Utc::now(),
            signal_received_timestamp: crate::model::millis_to_utc(envelope.server_received_timestamp),
            signal_delivered_timestamp: if envelope.server_delivered_timestamp > 0 {
                Some(crate::model::millis_to_utc(envelope.server_delivered_timestamp))
            } else {
                None
            },
            target: self.account.clone(),
            source: envelope.source.clone(),
            group_chat: group_id.clone(),
            mentions: mentions_to_string(data_message),
            content: text.clone(),
        };
        self.archive.enqueue(record).await;

        if data_message.group_info.is_some() {
            let mentioned = data_message
                .mentions
                .iter()
                .any(|m| m.name.as_deref() == Some(self.account.as_str()));
            if !mentioned {
                debug!(source = %envelope.source, "group message without a mention of the account, archived only");
                return;
            }
        }

        let Some(text) = text else {
            debug!(source = %envelope.source, "no text, sticker, or attachment to forward");
            return;
        };

        let recipient = group_id.as_deref().unwrap_or(&envelope.source);
        let user_id = recipient;

        if let Err(err) = self.signal.indicate_typing(recipient).await {
            warn!(error = %err, recipient = %recipient, "failed to indicate typing, continuing");
        }

        match self.assistant.send(&text, user_id).await {
            Ok(reply) if !reply.is_empty() => {
                if let Err(err) = self
                    .signal
                    .send_message(&reply, recipient, &envelope.source, group_id.as_deref(), &self.archive)
                    .await
                {
                    warn!(error = %err, recipient = %recipient, "failed to send assistant reply");
                }
            }
            Ok(_) => {
                info!(recipient = %recipient, "assistant returned an empty reply, nothing to send");
            }
            Err(err) => {
                warn!(error = %err, recipient = %recipient, "assistant call failed");
                if let Err(err) = self.signal.hide_indicator(recipient).await {
                    warn!(error = %err, recipient = %recipient, "failed to hide typing indicator after assistant failure");
                }
            }
        }
    }
}

fn mentions_to_string(data_message: &crate::model::DataMessage) -> Option<String> {
    if data_message.mentions.is_empty() {
        return None;
    }
    let names: Vec<&str> = data_message
        .mentions
        .iter()
        .filter_map(|m| m.name.as_deref().or(m.number.as_deref()))
        .collect();
    if names.is_empty() {
        None
    } else {
        Some(names.join(","))
    }
}
