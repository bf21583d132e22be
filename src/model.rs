//! Wire and archival data model (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The outer JSON object delivered by the gateway wrapping one message event.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Envelope {
    pub account: String,
    pub source: String,
    #[serde(default, rename = "sourceNumber")]
    pub source_number: Option<String>,
    #[serde(default, rename = "sourceUuid")]
    pub source_uuid: Option<String>,
    #[serde(default, rename = "sourceName")]
    pub source_name: Option<String>,
    #[serde(default, rename = "sourceDevice")]
    pub source_device: Option<i64>,
    pub timestamp: i64,
    #[serde(rename = "serverReceivedTimestamp")]
    pub server_received_timestamp: i64,
    #[serde(default, rename = "serverDeliveredTimestamp")]
    pub server_delivered_timestamp: i64,
    #[serde(default, rename = "dataMessage")]
    pub data_message: Option<DataMessage>,
    #[serde(default, rename = "syncMessage")]
    pub sync_message: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataMessage {
    pub timestamp: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub sticker: Option<Sticker>,
    #[serde(default)]
    pub mentions: Vec<Mention>,
    #[serde(default, rename = "groupInfo")]
    pub group_info: Option<GroupInfo>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Attachment {
    #[serde(default, rename = "contentType")]
    pub content_type: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Sticker {
    #[serde(rename = "packId")]
    pub pack_id: String,
    #[serde(rename = "stickerId")]
    pub sticker_id: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Mention {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    pub start: i64,
    pub length: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroupInfo {
    #[serde(rename = "groupId")]
    pub group_id: String,
    #[serde(default, rename = "groupName")]
    pub group_name: Option<String>,
    #[serde(default)]
    pub revision: Option<i64>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// Text synthesized for `dataMessage.message` when the inbound payload carries
/// no text body but does carry a sticker or an attachment (§3, step 2 of §4.8).
pub const STICKER_PLACEHOLDER: &str = "STICKER";
pub const ATTACHMENT_PLACEHOLDER: &str = "ATTACHMENT";

/// Returns the text to use for a data message, synthesizing a placeholder
/// when `message` is absent but a sticker or attachment is present.
pub fn effective_text(data_message: &DataMessage) -> Option<String> {
    if let Some(text) = &data_message.message {
        return Some(text.clone());
    }
    if data_message.sticker.is_some() {
        return Some(STICKER_PLACEHOLDER.to_owned());
    }
    if !data_message.attachments.is_empty() {
        return Some(ATTACHMENT_PLACEHOLDER.to_owned());
    }
    None
}

/// An archival row for the `signal_messages` table (§4.1).
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    pub timestamp: DateTime<Utc>,
    pub signal_received_timestamp: DateTime<Utc>,
    pub signal_delivered_timestamp: Option<DateTime<Utc>>,
    pub target: String,
    pub source: String,
    pub group_chat: Option<String>,
    pub mentions: Option<String>,
    pub content: Option<String>,
}

/// Converts epoch milliseconds to a UTC timestamp. Out-of-range values clamp
/// to the Unix epoch rather than panicking — archival is best-effort (§7).
pub fn millis_to_utc(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(|| DateTime::from_timestamp(0, 0).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_text_prefers_explicit_message() {
        let dm = DataMessage {
            timestamp: 1,
            message: Some("hello".to_owned()),
            attachments: vec![Attachment {
                content_type: None,
                filename: None,
            }],
            sticker: Some(Sticker {
                pack_id: "x".to_owned(),
                sticker_id: 1,
            }),
            mentions: vec![],
            group_info: None,
        };
        assert_eq!(effective_text(&dm).as_deref(), Some("hello"));
    }

    #[test]
    fn effective_text_synthesizes_sticker_over_attachment() {
        let dm = DataMessage {
            timestamp: 1,
            message: None,
            attachments: vec![Attachment {
                content_type: None,
                filename: None,
            }],
            sticker: Some(Sticker {
                pack_id: "x".to_owned(),
                sticker_id: 1,
            }),
            mentions: vec![],
            group_info: None,
        };
        assert_eq!(effective_text(&dm).as_deref(), Some(STICKER_PLACEHOLDER));
    }

    #[test]
    fn effective_text_synthesizes_attachment_without_sticker() {
        let dm = DataMessage {
            timestamp: 1,
            message: None,
            attachments: vec![Attachment {
                content_type: None,
                filename: None,
            }],
            sticker: None,
            mentions: vec![],
            group_info: None,
        };
        assert_eq!(effective_text(&dm).as_deref(), Some(ATTACHMENT_PLACEHOLDER));
    }

    #[test]
    fn effective_text_is_none_with_no_text_sticker_or_attachment() {
        let dm = DataMessage {
            timestamp: 1,
            message: None,
            attachments: vec![],
            sticker: None,
            mentions: vec![],
            group_info: None,
        };
        assert_eq!(effective_text(&dm), None);
    }

    #[test]
    fn envelope_decodes_minimal_json() {
        let json = r#"{
            "account": "+15550000",
            "source": "+15551111",
            "timestamp": 1700000000000,
            "serverReceivedTimestamp": 1700000000001,
            "dataMessage": {
                "timestamp": 1700000000000,
                "message": "hi"
            }
        }"#;
        let envelope: Envelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.source, "+15551111");
        assert_eq!(envelope.server_delivered_timestamp, 0);
        let dm = envelope.data_message.unwrap();
        assert_eq!(dm.message.as_deref(), Some("hi"));
        assert!(dm.group_info.is_none());
    }

    #[test]
    fn envelope_without_data_message_parses_to_none() {
        let json = r#"{
            "account": "+15550000",
            "source": "+15551111",
            "timestamp": 1700000000000,
            "serverReceivedTimestamp": 1700000000001,
            "syncMessage": {}
        }"#;
        let envelope: Envelope = serde_json::from_str(json).unwrap();
        assert!(envelope.data_message.is_none());
    }

    #[test]
    fn group_envelope_with_mentions_decodes() {
        let json = r#"{
            "account": "+15550000",
            "source": "+15551111",
            "timestamp": 1700000000000,
            "serverReceivedTimestamp": 1700000000001,
            "dataMessage": {
                "timestamp": 1700000000000,
                "message": "hey @bot",
                "mentions": [{"name": "+15550000", "start": 4, "length": 4}],
                "groupInfo": {"groupId": "INT1", "groupName": "g", "revision": 1, "type": "DELIVER"}
            }
        }"#;
        let envelope: Envelope = serde_json::from_str(json).unwrap();
        let dm = envelope.data_message.unwrap();
        assert_eq!(dm.mentions.len(), 1);
        assert_eq!(dm.group_info.unwrap().group_id, "INT1");
    }

    #[test]
    fn millis_to_utc_converts_known_instant() {
        let dt = millis_to_utc(1_700_000_000_000);
        assert_eq!(dt.timestamp_millis(), 1_700_000_000_000);
    }
}
