//! portcullis/src/chat.rs
//! JSON chat components, wire-framed as VarInt length + JSON document.

use crate::codec::{self, MAX_STRING_LEN};
use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};

/// A recursive chat component. Children nest under `extra`; fields left unset
/// are omitted from the serialized JSON.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ChatComponent {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underlined: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strikethrough: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obfuscated: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<ChatComponent>,
}

impl ChatComponent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Appends the wire form: VarInt(byte length) + JSON document.
    pub fn marshal(&self, buf: &mut Vec<u8>) -> Result<()> {
        let json = serde_json::to_vec(self)?;
        codec::write_varint(buf, json.len() as i32);
        buf.extend_from_slice(&json);
        Ok(())
    }

    /// Decodes the wire form from the front of `data`, returning the
    /// component and the number of bytes consumed.
    pub fn unmarshal(data: &[u8]) -> Result<(Self, usize)> {
        let (declared, prefix) = codec::read_varint(data)?;
        if declared < 0 || declared as usize > MAX_STRING_LEN {
            return Err(ProtocolError::InvalidStringLength {
                declared,
                max: MAX_STRING_LEN,
            });
        }
        let len = declared as usize;
        let rest = &data[prefix..];
        if rest.len() < len {
            return Err(ProtocolError::ShortBuffer {
                kind: "Chat",
                needed: len,
                available: rest.len(),
            });
        }
        let component = serde_json::from_slice(&rest[..len])?;
        Ok((component, prefix + len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_round_trips_with_nested_extra() {
        let component = ChatComponent {
            text: "Hello".to_string(),
            color: "gold".to_string(),
            bold: Some(true),
            extra: vec![
                ChatComponent::text(", world"),
                ChatComponent {
                    text: "!".to_string(),
                    italic: Some(false),
                    ..ChatComponent::default()
                },
            ],
            ..ChatComponent::default()
        };

        let mut buf = Vec::new();
        component.marshal(&mut buf).unwrap();
        let (decoded, consumed) = ChatComponent::unmarshal(&buf).unwrap();
        assert_eq!(decoded, component);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn unset_fields_are_omitted_from_json() {
        let mut buf = Vec::new();
        ChatComponent::text("plain").marshal(&mut buf).unwrap();
        let (len, prefix) = codec::read_varint(&buf).unwrap();
        let json = std::str::from_utf8(&buf[prefix..prefix + len as usize]).unwrap();
        assert_eq!(json, r#"{"text":"plain"}"#);
    }

    #[test]
    fn decode_tolerates_absent_optional_fields() {
        let json = br#"{"extra":[{"text":"x"}]}"#;
        let mut buf = Vec::new();
        codec::write_varint(&mut buf, json.len() as i32);
        buf.extend_from_slice(json);

        let (decoded, _) = ChatComponent::unmarshal(&buf).unwrap();
        assert!(decoded.text.is_empty());
        assert_eq!(decoded.bold, None);
        assert_eq!(decoded.extra.len(), 1);
    }

    #[test]
    fn declared_length_past_end_is_short_buffer() {
        let mut buf = Vec::new();
        codec::write_varint(&mut buf, 50);
        buf.extend_from_slice(b"{}");
        assert!(matches!(
            ChatComponent::unmarshal(&buf).unwrap_err(),
            ProtocolError::ShortBuffer { kind: "Chat", .. }
        ));
    }
}
