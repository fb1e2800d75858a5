//! portcullis/src/packet.rs
//! Structured packets and the packet-type registry.
//!
//! Only the handshake is decoded structurally today; everything after it is
//! relayed opaquely. The registry exists for future structured decoding and
//! is deliberately not consulted by the relay path.

use crate::codec::{self, ScalarValue};
use crate::error::{ProtocolError, Result};
use std::collections::HashMap;

/// Packet id of the handshake, the first packet on every connection.
pub const HANDSHAKE_PACKET_ID: i32 = 0x00;

/// Handshake routing values.
pub const NEXT_STATE_STATUS: i32 = 1;
pub const NEXT_STATE_LOGIN: i32 = 2;

/// The first packet on every connection: protocol version, the address the
/// client dialed, and the state it wants to enter next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_version: i32,
    pub server_address: String,
    pub server_port: u16,
    pub next_state: i32,
}

impl Handshake {
    /// Decodes the handshake fields from a frame body positioned after the
    /// packet id.
    pub fn decode(data: &[u8]) -> Result<Handshake> {
        let (protocol_version, mut offset) = codec::read_varint(data)?;
        let (server_address, consumed) = codec::read_string(&data[offset..])?;
        offset += consumed;
        let (server_port, consumed) = codec::read_unsigned_short(&data[offset..])?;
        offset += consumed;
        let (next_state, _) = codec::read_varint(&data[offset..])?;
        Ok(Handshake {
            protocol_version,
            server_address,
            server_port,
            next_state,
        })
    }

    /// Appends the packet id and fields; framing is the caller's concern.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        codec::write_varint(buf, HANDSHAKE_PACKET_ID);
        codec::write_varint(buf, self.protocol_version);
        codec::write_string(buf, &self.server_address);
        ScalarValue::UnsignedShort(self.server_port).marshal(buf);
        codec::write_varint(buf, self.next_state);
    }
}

/// Packets the registry knows how to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedPacket {
    Handshake(Handshake),
}

type PacketDecoder = fn(&[u8]) -> Result<DecodedPacket>;

/// Explicit packet-id → decoder table, constructed once and passed by
/// reference to whatever needs structured dispatch.
#[derive(Debug, Default)]
pub struct PacketRegistry {
    decoders: HashMap<i32, PacketDecoder>,
}

impl PacketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every known packet type registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(HANDSHAKE_PACKET_ID, |data| {
            Ok(DecodedPacket::Handshake(Handshake::decode(data)?))
        });
        registry
    }

    pub fn register(&mut self, id: i32, decoder: PacketDecoder) {
        self.decoders.insert(id, decoder);
    }

    /// Decodes a whole frame body: leading packet id, then the registered
    /// decoder over the remainder.
    pub fn decode(&self, body: &[u8]) -> Result<DecodedPacket> {
        let (id, consumed) = codec::read_varint(body)?;
        let decoder = self
            .decoders
            .get(&id)
            .ok_or(ProtocolError::UnknownPacketId(id))?;
        decoder(&body[consumed..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_round_trips() {
        let handshake = Handshake {
            protocol_version: 758,
            server_address: "mc.example.net".to_string(),
            server_port: 25565,
            next_state: NEXT_STATE_LOGIN,
        };

        let mut buf = Vec::new();
        handshake.encode(&mut buf);

        let (id, consumed) = codec::read_varint(&buf).unwrap();
        assert_eq!(id, HANDSHAKE_PACKET_ID);
        assert_eq!(Handshake::decode(&buf[consumed..]).unwrap(), handshake);
    }

    #[test]
    fn registry_dispatches_registered_handshake() {
        let registry = PacketRegistry::with_defaults();
        let handshake = Handshake {
            protocol_version: 47,
            server_address: "localhost".to_string(),
            server_port: 25565,
            next_state: NEXT_STATE_STATUS,
        };
        let mut body = Vec::new();
        handshake.encode(&mut body);

        assert_eq!(
            registry.decode(&body).unwrap(),
            DecodedPacket::Handshake(handshake)
        );
    }

    #[test]
    fn registry_rejects_unregistered_id() {
        let registry = PacketRegistry::with_defaults();
        let mut body = Vec::new();
        codec::write_varint(&mut body, 0x42);
        assert!(matches!(
            registry.decode(&body).unwrap_err(),
            ProtocolError::UnknownPacketId(0x42)
        ));
    }

    #[test]
    fn truncated_handshake_is_short_buffer() {
        let handshake = Handshake {
            protocol_version: 758,
            server_address: "localhost".to_string(),
            server_port: 25565,
            next_state: NEXT_STATE_LOGIN,
        };
        let mut buf = Vec::new();
        handshake.encode(&mut buf);
        // Cut inside the address string.
        assert!(matches!(
            Handshake::decode(&buf[1..6]).unwrap_err(),
            ProtocolError::ShortBuffer { .. }
        ));
    }
}
