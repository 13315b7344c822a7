//! Records routed to the dead-letter side channel.

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reading::RawMessage;
use crate::validator::ValidationError;

/// A message that failed validation, kept for later inspection.
///
/// The payload is stored as text when it is valid UTF-8 and as base64
/// otherwise, with `payload_encoding` telling the two apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: String,
    pub payload_encoding: PayloadEncoding,
    pub errors: Vec<String>,
    pub rejected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadEncoding {
    Utf8,
    Base64,
}

impl DeadLetterRecord {
    pub fn from_rejection(topic: &str, message: &RawMessage, error: &ValidationError) -> Self {
        let (payload, payload_encoding) = match std::str::from_utf8(&message.payload) {
            Ok(text) => (text.to_string(), PayloadEncoding::Utf8),
            Err(_) => (
                base64::engine::general_purpose::STANDARD.encode(&message.payload),
                PayloadEncoding::Base64,
            ),
        };

        let errors = match error {
            ValidationError::Fields(fields) => fields.iter().map(|f| f.to_string()).collect(),
            other => vec![other.to_string()],
        };

        Self {
            topic: topic.to_string(),
            partition: message.partition,
            offset: message.offset,
            payload,
            payload_encoding,
            errors,
            rejected_at: Utc::now(),
        }
    }

    /// Key used when the record is published to a dead-letter topic.
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.topic, self.partition, self.offset)
    }
}
