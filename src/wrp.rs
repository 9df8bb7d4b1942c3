//! WRP message model and msgpack codec.
//!
//! Messages travel as msgpack maps keyed by the wire names below; `payload`
//! is a msgpack `bin`. Unknown keys are ignored when decoding so newer
//! cluster versions can add fields without breaking the gateway.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `Content-Type` of a msgpack-encoded WRP message.
pub const MSGPACK_CONTENT_TYPE: &str = "application/msgpack";

#[derive(Debug, Error)]
pub enum WrpError {
    #[error("failed to encode WRP message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("failed to decode WRP message: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// WRP message type, carried as an integer in `msg_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum MessageType {
    Authorization,
    SimpleRequestResponse,
    SimpleEvent,
    Create,
    Retrieve,
    Update,
    Delete,
    ServiceRegistration,
    ServiceAlive,
    Unknown,
}

impl From<MessageType> for i64 {
    fn from(t: MessageType) -> Self {
        match t {
            MessageType::Authorization => 2,
            MessageType::SimpleRequestResponse => 3,
            MessageType::SimpleEvent => 4,
            MessageType::Create => 5,
            MessageType::Retrieve => 6,
            MessageType::Update => 7,
            MessageType::Delete => 8,
            MessageType::ServiceRegistration => 9,
            MessageType::ServiceAlive => 10,
            MessageType::Unknown => 11,
        }
    }
}

impl TryFrom<i64> for MessageType {
    type Error = String;

    fn try_from(v: i64) -> Result<Self, Self::Error> {
        Ok(match v {
            2 => Self::Authorization,
            3 => Self::SimpleRequestResponse,
            4 => Self::SimpleEvent,
            5 => Self::Create,
            6 => Self::Retrieve,
            7 => Self::Update,
            8 => Self::Delete,
            9 => Self::ServiceRegistration,
            10 => Self::ServiceAlive,
            11 => Self::Unknown,
            other => return Err(format!("unknown WRP message type {other}")),
        })
    }
}

/// A WRP message. Only the fields this gateway reads or writes are modeled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "msg_type")]
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(rename = "dest", default, skip_serializing_if = "String::is_empty")]
    pub destination: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub transaction_uuid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partner_ids: Vec<String>,
    #[serde(default, with = "serde_bytes", skip_serializing_if = "Vec::is_empty")]
    pub payload: Vec<u8>,
}

impl Message {
    pub fn encode(&self) -> Result<Vec<u8>, WrpError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WrpError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Message {
        Message {
            message_type: MessageType::SimpleRequestResponse,
            source: "dns:gateway/config".into(),
            destination: "mac:112233445566/config".into(),
            transaction_uuid: "tid-1".into(),
            content_type: "application/json".into(),
            partner_ids: vec!["comcast".into()],
            payload: br#"{"command":"GET","names":["a"]}"#.to_vec(),
        }
    }

    #[test]
    fn test_encode_decode() {
        let msg = sample();
        let decoded = Message::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_encodes_wire_field_names() {
        #[derive(Deserialize)]
        struct Wire {
            msg_type: i64,
            dest: String,
            transaction_uuid: String,
            partner_ids: Vec<String>,
            #[serde(with = "serde_bytes")]
            payload: Vec<u8>,
        }
        let wire: Wire = rmp_serde::from_slice(&sample().encode().unwrap()).unwrap();
        assert_eq!(wire.msg_type, 3);
        assert_eq!(wire.dest, "mac:112233445566/config");
        assert_eq!(wire.transaction_uuid, "tid-1");
        assert_eq!(wire.partner_ids, vec!["comcast".to_string()]);
        assert_eq!(wire.payload, sample().payload);
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        #[derive(Serialize)]
        struct Extended<'a> {
            msg_type: i64,
            dest: &'a str,
            #[serde(with = "serde_bytes")]
            payload: &'a [u8],
            headers: Vec<&'a str>,
            spans: Vec<Vec<&'a str>>,
        }
        let bytes = rmp_serde::to_vec_named(&Extended {
            msg_type: 3,
            dest: "mac:112233445566/config",
            payload: b"{}",
            headers: vec!["a:b"],
            spans: vec![vec!["x"]],
        })
        .unwrap();
        let msg = Message::decode(&bytes).unwrap();
        assert_eq!(msg.destination, "mac:112233445566/config");
        assert_eq!(msg.payload, b"{}");
        assert!(msg.transaction_uuid.is_empty());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Message::decode(b"definitely not msgpack").is_err());
        assert!(Message::decode(&[]).is_err());
    }
}
