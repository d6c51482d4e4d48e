//! Wire encoding for [`Message`].
//!
//! A message travels as a JSON object holding the whole envelope:
//!
//! ```text
//! {"Header":{"k":"v"},"Body":"cGF5bG9hZA=="}
//! ```
//!
//! `Body` is standard base64. Both ends of any backend must agree on this
//! format, independent of the transport's own framing. A missing or `null`
//! `Header` decodes to no headers and a missing or `null` `Body` to an empty
//! body; anything that is not such an object fails to decode.

use crate::error::BrokerError;
use crate::message::Message;

/// Encode a message for the wire.
pub fn encode(message: &Message) -> Result<Vec<u8>, BrokerError> {
    Ok(serde_json::to_vec(message)?)
}

/// Decode a message from the wire.
pub fn decode(payload: &[u8]) -> Result<Message, serde_json::Error> {
    serde_json::from_slice(payload)
}

pub(crate) mod headers {
    use serde::{Deserialize, Deserializer};
    use std::collections::BTreeMap;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<BTreeMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
    }
}

pub(crate) mod body {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => STANDARD.decode(encoded).map_err(de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encodes_whole_envelope() {
        let msg = Message::new("payload").with_header("k", "v");
        let encoded = encode(&msg).unwrap();

        assert_eq!(
            String::from_utf8(encoded).unwrap(),
            r#"{"Header":{"k":"v"},"Body":"cGF5bG9hZA=="}"#
        );
    }

    #[test]
    fn test_decode_round_trip() {
        let msg = Message::new(vec![0u8, 159, 146, 150]).with_header("id", "42");
        let decoded = decode(&encode(&msg).unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_null_and_missing_fields() {
        let decoded = decode(br#"{"Header":null,"Body":null}"#).unwrap();
        assert_eq!(decoded, Message::default());

        let decoded = decode(br#"{"Body":"aGk="}"#).unwrap();
        assert!(decoded.headers().is_empty());
        assert_eq!(decoded.body(), b"hi");

        let decoded = decode(b"{}").unwrap();
        assert_eq!(decoded, Message::default());
    }

    #[test]
    fn test_rejects_malformed_payloads() {
        assert!(decode(b"not json").is_err());
        assert!(decode(b"null").is_err());
        assert!(decode(b"[1,2,3]").is_err());
        assert!(decode(br#"{"Body":"***"}"#).is_err());
        assert!(decode(br#"{"Header":{"k":1}}"#).is_err());
    }
}
