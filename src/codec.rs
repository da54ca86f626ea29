//! Wire shape of a message on the broker.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{db::Message, AppError, AppResult};

/// A stored message with its author and room reduced to bare id references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryEnvelope {
    pub id: Uuid,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub author: Stub,
    pub room: Stub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stub {
    pub id: Uuid,
}

impl From<&Message> for DeliveryEnvelope {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            content: message.content.clone(),
            created_at: message.created_at,
            author: Stub { id: message.author_id },
            room: Stub { id: message.room_id },
        }
    }
}

impl From<DeliveryEnvelope> for Message {
    fn from(envelope: DeliveryEnvelope) -> Self {
        Self {
            id: envelope.id,
            room_id: envelope.room.id,
            author_id: envelope.author.id,
            content: envelope.content,
            created_at: envelope.created_at,
        }
    }
}

pub fn encode(envelope: &DeliveryEnvelope) -> AppResult<Vec<u8>> {
    serde_json::to_vec(envelope).map_err(AppError::Encoding)
}

pub fn decode(payload: &[u8]) -> AppResult<DeliveryEnvelope> {
    serde_json::from_slice(payload).map_err(AppError::Decoding)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn message() -> Message {
        Message {
            id: Uuid::now_v7(),
            room_id: Uuid::now_v7(),
            author_id: Uuid::now_v7(),
            content: "hello *world*".to_owned(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn envelope_carries_id_stubs_only() {
        let message = message();
        let bytes = encode(&DeliveryEnvelope::from(&message)).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["room"], json!({ "id": message.room_id }));
        assert_eq!(value["author"], json!({ "id": message.author_id }));
        assert_eq!(value["content"], "hello *world*");
        assert!(value["createdAt"].is_string());
    }

    #[test]
    fn decoded_envelope_restores_the_message() {
        let message = message();
        let bytes = encode(&DeliveryEnvelope::from(&message)).unwrap();

        assert_eq!(Message::from(decode(&bytes).unwrap()), message);
    }

    #[test]
    fn malformed_payloads_are_decoding_errors() {
        for payload in [&b"not json"[..], b"{}", br#"{"id":"nope"}"#] {
            assert!(matches!(decode(payload), Err(AppError::Decoding(_))));
        }
    }
}
