//! portcullis/src/connection.rs
//! Per-connection state machine and bidirectional frame relay.

use crate::codec;
use crate::error::{ProtocolError, Result};
use crate::frame;
use crate::packet::{self, Handshake};
use crate::proxy::{ProxyMetrics, SessionShared};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Where a connection is in its lifecycle. Login has no separate play state;
/// it continues into indefinite relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Handshake,
    Status,
    Login,
}

/// Which way a relay loop pumps frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    ClientToUpstream,
    UpstreamToClient,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::ClientToUpstream => "client->upstream",
            Direction::UpstreamToClient => "upstream->client",
        }
    }
}

/// Guards connection teardown. The closed flag is the only state the two
/// relay tasks share; flipping it cancels the token that unblocks whichever
/// loop is still parked on a read.
pub(crate) struct Teardown {
    closed: Mutex<bool>,
    token: CancellationToken,
}

impl Teardown {
    pub(crate) fn new() -> Self {
        Self {
            closed: Mutex::new(false),
            token: CancellationToken::new(),
        }
    }

    /// First caller flips the flag and cancels the token; later calls are
    /// no-ops. Returns whether this call performed the close.
    pub(crate) fn close(&self) -> bool {
        let mut closed = self.closed.lock().unwrap();
        if *closed {
            return false;
        }
        *closed = true;
        self.token.cancel();
        true
    }

    pub(crate) async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

/// One accepted client session.
pub(crate) struct Connection {
    id: u64,
    client: TcpStream,
    state: ConnectionState,
    shared: Arc<SessionShared>,
}

/// Main connection workflow: decode the handshake, route, relay, release.
pub(crate) async fn handle_conn(id: u64, client: TcpStream, shared: Arc<SessionShared>) {
    let conn = Connection {
        id,
        client,
        state: ConnectionState::Handshake,
        shared: Arc::clone(&shared),
    };
    if let Err(e) = conn.run().await {
        error!(conn = id, "Connection failed: {}", e);
    }
    shared.release(id);
    info!(conn = id, "Connection closed");
}

impl Connection {
    async fn run(mut self) -> Result<()> {
        let body = frame::read_frame(&mut self.client)
            .await?
            .ok_or(ProtocolError::ConnectionClosed)?;
        let (packet_id, consumed) = codec::read_varint(&body)?;
        if packet_id != packet::HANDSHAKE_PACKET_ID {
            return Err(ProtocolError::UnexpectedPacket {
                expected: packet::HANDSHAKE_PACKET_ID,
                actual: packet_id,
            });
        }
        let handshake = Handshake::decode(&body[consumed..])?;
        debug!(
            conn = self.id,
            protocol = handshake.protocol_version,
            host = %handshake.server_address,
            port = handshake.server_port,
            next_state = handshake.next_state,
            "Handshake received"
        );

        match handshake.next_state {
            packet::NEXT_STATE_STATUS => {
                self.state = ConnectionState::Status;
                self.serve_status().await
            }
            packet::NEXT_STATE_LOGIN => {
                self.state = ConnectionState::Login;
                self.serve_login(body).await
            }
            other => Err(ProtocolError::UnrecognizedHandshakeState(other)),
        }
    }

    /// Status flow: dial upstream, forward the next status-phase frame from
    /// the client, then relay with no further special-casing.
    async fn serve_status(mut self) -> Result<()> {
        let mut upstream = self.dial_upstream().await?;
        let Some(request) = frame::read_frame(&mut self.client).await? else {
            // Client went away between handshake and status request.
            return Ok(());
        };
        frame::write_frame(&mut upstream, &request).await?;
        self.relay(upstream).await
    }

    /// Login flow: dial upstream, forward the original handshake frame
    /// verbatim (re-framed), then relay.
    async fn serve_login(self, handshake_frame: Vec<u8>) -> Result<()> {
        let mut upstream = self.dial_upstream().await?;
        frame::write_frame(&mut upstream, &handshake_frame).await?;
        self.relay(upstream).await
    }

    async fn dial_upstream(&self) -> Result<TcpStream> {
        let addr = &self.shared.upstream_addr;
        let upstream =
            TcpStream::connect(addr)
                .await
                .map_err(|source| ProtocolError::UpstreamUnreachable {
                    addr: addr.clone(),
                    source,
                })?;
        info!(conn = self.id, state = ?self.state, upstream = %addr, "Proxying connection");
        Ok(upstream)
    }

    /// Spawns the two directional copy loops and waits for both to unwind.
    /// The first loop to finish, cleanly or not, tears both down.
    async fn relay(self, upstream: TcpStream) -> Result<()> {
        let conn_id = self.id;
        let metrics = Arc::clone(&self.shared.metrics);
        let (client_read, client_write) = self.client.into_split();
        let (upstream_read, upstream_write) = upstream.into_split();
        let teardown = Arc::new(Teardown::new());

        let client_to_upstream = tokio::spawn(copy_frames(
            client_read,
            upstream_write,
            Arc::clone(&teardown),
            Arc::clone(&metrics),
            conn_id,
            Direction::ClientToUpstream,
        ));
        let upstream_to_client = tokio::spawn(copy_frames(
            upstream_read,
            client_write,
            teardown,
            metrics,
            conn_id,
            Direction::UpstreamToClient,
        ));

        let (sent, received) = tokio::join!(client_to_upstream, upstream_to_client);
        let sent = join_outcome(sent)?;
        let received = join_outcome(received)?;
        debug!(
            conn = conn_id,
            to_upstream = sent,
            to_client = received,
            "Relay finished"
        );
        Ok(())
    }
}

fn join_outcome(result: std::result::Result<Result<u64>, tokio::task::JoinError>) -> Result<u64> {
    match result {
        Ok(outcome) => outcome,
        Err(e) => Err(ProtocolError::Io(std::io::Error::other(e))),
    }
}

/// Pumps complete frames from `reader` to `writer` until the peer closes,
/// a side fails, or the sibling loop triggers teardown. Returns the number
/// of body bytes relayed.
///
/// Cancellation is observed at frame boundaries, so a frame is either
/// forwarded whole or not at all. A failure after the sibling already closed
/// the connection is fallout of teardown, not a reportable error.
async fn copy_frames<R, W>(
    mut reader: R,
    mut writer: W,
    teardown: Arc<Teardown>,
    metrics: Arc<ProxyMetrics>,
    conn_id: u64,
    direction: Direction,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut relayed: u64 = 0;
    let result: Result<()> = loop {
        let body = tokio::select! {
            biased;

            _ = teardown.cancelled() => break Ok(()),
            read = frame::read_frame(&mut reader) => match read {
                Ok(Some(body)) => body,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            },
        };
        if let Err(e) = frame::write_frame(&mut writer, &body).await {
            break Err(e);
        }
        relayed += body.len() as u64;
        metrics.record_relayed(direction, body.len() as u64);
    };

    let initiated = teardown.close();
    let _ = writer.shutdown().await;

    match result {
        Ok(()) => Ok(relayed),
        Err(e) if !initiated => {
            debug!(
                conn = conn_id,
                direction = direction.as_str(),
                "Direction unwound during teardown: {}",
                e
            );
            Ok(relayed)
        }
        Err(e) => {
            debug!(
                conn = conn_id,
                direction = direction.as_str(),
                "Relay direction failed: {}",
                e
            );
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_close_performs_teardown_once() {
        let teardown = Arc::new(Teardown::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let teardown = Arc::clone(&teardown);
                std::thread::spawn(move || teardown.close())
            })
            .collect();
        let performed = handles
            .into_iter()
            .filter_map(|handle| handle.join().ok())
            .filter(|&result| result)
            .count();
        assert_eq!(performed, 1);
        assert!(teardown.token.is_cancelled());
    }

    #[tokio::test]
    async fn copy_frames_forwards_fifo_until_clean_close() {
        let (near, mut far) = tokio::io::duplex(1024);
        let (sink_near, sink_far) = tokio::io::duplex(1024);
        let (reader, _keep_writer) = tokio::io::split(near);
        let (_keep_reader, writer) = tokio::io::split(sink_near);

        frame::write_frame(&mut far, &[0x00, 0x01, 0x02])
            .await
            .unwrap();
        frame::write_frame(&mut far, &[0x03]).await.unwrap();
        drop(far);

        let teardown = Arc::new(Teardown::new());
        let metrics = Arc::new(ProxyMetrics::default());
        let relayed = copy_frames(
            reader,
            writer,
            Arc::clone(&teardown),
            Arc::clone(&metrics),
            1,
            Direction::ClientToUpstream,
        )
        .await
        .unwrap();

        assert_eq!(relayed, 4);
        assert_eq!(metrics.snapshot().bytes_to_upstream, 4);
        // The loop performed teardown itself; a later close is a no-op.
        assert!(!teardown.close());

        let (mut forwarded, _far_writer) = tokio::io::split(sink_far);
        assert_eq!(
            frame::read_frame(&mut forwarded).await.unwrap(),
            Some(vec![0x00, 0x01, 0x02])
        );
        assert_eq!(
            frame::read_frame(&mut forwarded).await.unwrap(),
            Some(vec![0x03])
        );
    }

    #[tokio::test]
    async fn copy_frames_stops_when_sibling_tears_down() {
        let (near, far) = tokio::io::duplex(1024);
        let (sink_near, _sink_far) = tokio::io::duplex(1024);
        let (reader, _keep_writer) = tokio::io::split(near);
        let (_keep_reader, writer) = tokio::io::split(sink_near);

        let teardown = Arc::new(Teardown::new());
        let metrics = Arc::new(ProxyMetrics::default());
        let pump = tokio::spawn(copy_frames(
            reader,
            writer,
            Arc::clone(&teardown),
            metrics,
            1,
            Direction::UpstreamToClient,
        ));

        // Nothing arrives on `far`, so the loop is parked on its read until
        // the sibling's teardown interrupts it.
        tokio::task::yield_now().await;
        assert!(teardown.close());
        let relayed = pump.await.unwrap().unwrap();
        assert_eq!(relayed, 0);
        drop(far);
    }
}
