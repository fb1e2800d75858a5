//! portcullis/src/lib.rs
//! Protocol-aware Minecraft proxy core: a binary codec library, length-prefix
//! framing, and a handshake-routing connection state machine feeding a
//! bidirectional frame relay.

pub mod chat;
pub mod codec;
pub mod config;
pub(crate) mod connection;
pub mod error;
pub mod frame;
pub mod logging;
pub mod nbt;
pub mod packet;
pub mod proxy;

pub use config::ProxyConfig;
pub use error::{ProtocolError, Result};
pub use proxy::{MetricsSnapshot, Proxy, ProxyController};
