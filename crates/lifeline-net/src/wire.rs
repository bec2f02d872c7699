//! Newline-delimited TCP wire used between peers.
//!
//! A sender opens one connection per envelope, writes a single line and
//! closes. The group owner accepts connections and forwards each line as a
//! [`TransportEvent::MessageReceived`], or as [`TransportEvent::Malformed`]
//! when it is not text.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use lifeline_shared::constants::MAX_ENVELOPE_SIZE;
use lifeline_shared::error::TransportError;

use crate::transport::TransportEvent;

/// Pause after a failed `accept` before accepting again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Write `payload` plus a newline to `host:port`.
pub async fn send_line(
    host: IpAddr,
    port: u16,
    payload: &str,
    connect_timeout: Duration,
) -> Result<(), TransportError> {
    let addr = SocketAddr::new(host, port);
    let mut stream = timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| TransportError::Timeout(connect_timeout))??;

    stream.write_all(payload.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.flush().await?;
    stream.shutdown().await?;

    debug!(peer = %addr, len = payload.len(), "Envelope written");
    Ok(())
}

/// Accept connections on `listener` until the event receiver is dropped or
/// the task is aborted.
pub fn spawn_line_listener(
    listener: TcpListener,
    events: mpsc::Sender<TransportEvent>,
    read_timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Ok(addr) = listener.local_addr() {
            info!(addr = %addr, "Peer listener started");
        }

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            if events.is_closed() {
                debug!("Event receiver dropped, stopping peer listener");
                break;
            }

            let tx = events.clone();
            tokio::spawn(async move {
                match timeout(read_timeout, read_line(stream)).await {
                    Ok(Ok(Some(bytes))) => {
                        debug!(peer = %peer, len = bytes.len(), "Line received");
                        let _ = tx.send(line_event(bytes)).await;
                    }
                    Ok(Ok(None)) => debug!(peer = %peer, "Connection closed without data"),
                    Ok(Err(e)) => warn!(peer = %peer, error = %e, "Failed to read line"),
                    Err(_) => warn!(peer = %peer, "Timed out reading line"),
                }
            });
        }
    })
}

/// Read a single raw line, capped slightly above the envelope limit so an
/// oversized payload still reaches the decoder and is reported as such.
async fn read_line(stream: TcpStream) -> io::Result<Option<Vec<u8>>> {
    let mut reader = BufReader::new(stream).take(MAX_ENVELOPE_SIZE as u64 + 1);
    let mut line = Vec::new();
    if reader.read_until(b'\n', &mut line).await? == 0 {
        return Ok(None);
    }
    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line.pop();
    }
    Ok(Some(line))
}

fn line_event(bytes: Vec<u8>) -> TransportEvent {
    // The cap may split a character; the decoder still rejects it by size.
    if bytes.len() > MAX_ENVELOPE_SIZE {
        return TransportEvent::MessageReceived(String::from_utf8_lossy(&bytes).into_owned());
    }
    match String::from_utf8(bytes) {
        Ok(line) => TransportEvent::MessageReceived(line),
        Err(e) => TransportEvent::Malformed(format!("payload is not valid UTF-8: {e}")),
    }
}
