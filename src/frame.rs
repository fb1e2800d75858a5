//! portcullis/src/frame.rs
//! Length-prefixed frame boundary detection over a byte stream.
//!
//! A frame on the wire is `VarInt(length) || body`, where the body begins
//! with the packet id. This module only cares about the length prefix; the
//! body stays opaque so the same two functions serve every relay direction.

use crate::codec::{self, VARINT_MAX_BYTES};
use crate::error::{ProtocolError, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Ceiling on a declared frame body (2 MiB), rejected before allocation.
pub const MAX_FRAME_LEN: usize = 0x20_0000;

/// Reads one complete frame body from the stream.
///
/// Returns `None` when the peer closed cleanly at a frame boundary. A close
/// while the length prefix is in flight is `ConnectionClosed`; a close while
/// the declared body is in flight is `FrameTooShort`.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let declared = match codec::read_varint_stream(reader).await? {
        Some(len) => len,
        None => return Ok(None),
    };
    if declared < 0 || declared as usize > MAX_FRAME_LEN {
        return Err(ProtocolError::InvalidFrameLength(declared));
    }

    let mut body = vec![0u8; declared as usize];
    match reader.read_exact(&mut body).await {
        Ok(_) => Ok(Some(body)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(ProtocolError::FrameTooShort {
                declared: declared as usize,
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Writes `body` as one frame: VarInt length prefix, then the body.
///
/// `write_all` either completes the frame or surfaces the failure; a partial
/// frame is never silently dropped.
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut prefix = Vec::with_capacity(VARINT_MAX_BYTES);
    codec::write_varint(&mut prefix, body.len() as i32);
    writer.write_all(&prefix).await?;
    writer.write_all(body).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_round_trips() {
        let body = vec![0x00, 0xDE, 0xAD, 0xBE, 0xEF];
        let mut wire = Vec::new();
        write_frame(&mut wire, &body).await.unwrap();
        assert_eq!(wire[0] as usize, body.len());

        let mut reader = &wire[..];
        assert_eq!(read_frame(&mut reader).await.unwrap(), Some(body));
        assert_eq!(read_frame(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn consecutive_frames_keep_boundaries() {
        let mut wire = Vec::new();
        write_frame(&mut wire, &[0x01, 0x02]).await.unwrap();
        write_frame(&mut wire, &[0x03]).await.unwrap();
        write_frame(&mut wire, &[]).await.unwrap();

        let mut reader = &wire[..];
        assert_eq!(
            read_frame(&mut reader).await.unwrap(),
            Some(vec![0x01, 0x02])
        );
        assert_eq!(read_frame(&mut reader).await.unwrap(), Some(vec![0x03]));
        assert_eq!(read_frame(&mut reader).await.unwrap(), Some(vec![]));
        assert_eq!(read_frame(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn truncated_body_is_frame_too_short() {
        // Declares 10 bytes but the stream closes after 4.
        let wire = [0x0A, 1, 2, 3, 4];
        let mut reader = &wire[..];
        assert!(matches!(
            read_frame(&mut reader).await.unwrap_err(),
            ProtocolError::FrameTooShort { declared: 10 }
        ));
    }

    #[tokio::test]
    async fn unterminated_length_prefix_is_malformed() {
        let wire = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let mut reader = &wire[..];
        assert!(matches!(
            read_frame(&mut reader).await.unwrap_err(),
            ProtocolError::MalformedVarInt { .. }
        ));
    }

    #[tokio::test]
    async fn negative_declared_length_is_rejected() {
        let mut wire = Vec::new();
        codec::write_varint(&mut wire, -1);
        let mut reader = &wire[..];
        assert!(matches!(
            read_frame(&mut reader).await.unwrap_err(),
            ProtocolError::InvalidFrameLength(-1)
        ));
    }
}
