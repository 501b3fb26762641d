// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/cid-relay

//! One device session: read frames, admit, relay, record, answer

use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::admission::{AdmitDecision, SessionLease};
use crate::core::ServerCore;
use crate::protocol::{
    extract_device_id, frame_text, is_message_valid, rewrite_frame, CidRules, ACK, FRAME_DELIMITER, NACK,
};
use crate::relay::{EnqueueError, RelayHandle};

/// State shared by every session of one server
pub(crate) struct SessionContext {
    pub core: Arc<ServerCore>,
    pub relay: Option<RelayHandle>,
    pub rules: CidRules,
    pub max_frame_len: usize,
}

/// How a single read ended
#[derive(Debug, PartialEq, Eq)]
enum ReadEnd {
    Frame,
    Closed,
    /// Bytes arrived but the peer closed before the delimiter
    Partial,
    Oversized,
}

fn classify(buf: &[u8], limit: usize) -> ReadEnd {
    match buf.last() {
        None => ReadEnd::Closed,
        Some(&FRAME_DELIMITER) => ReadEnd::Frame,
        Some(_) if buf.len() >= limit => ReadEnd::Oversized,
        Some(_) => ReadEnd::Partial,
    }
}

/// Frame handled, keep reading or end the session
enum Flow {
    Continue,
    Close,
}

pub(crate) async fn handle_session(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<SessionContext>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut lease: Option<SessionLease> = None;
    let mut frame = Vec::with_capacity(64);

    loop {
        frame.clear();
        let mut limited = (&mut reader).take(ctx.max_frame_len as u64);

        let read = tokio::select! {
            result = limited.read_until(FRAME_DELIMITER, &mut frame) => result,
            _ = shutdown.recv() => {
                info!("Closing connection from {} due to server shutdown", peer);
                break;
            }
        };

        if let Err(e) = read {
            error!("Read error from {}: {}", peer, e);
            break;
        }

        match classify(&frame, ctx.max_frame_len) {
            ReadEnd::Frame => {}
            ReadEnd::Closed => {
                info!("Connection closed by device {}", peer);
                break;
            }
            ReadEnd::Partial | ReadEnd::Oversized => {
                warn!("Malformed message from {}: {:?}", peer, String::from_utf8_lossy(&frame));
                let _ = writer.write_all(&[NACK]).await;
                break;
            }
        }
        debug!("Received message from {}: {:?}", peer, String::from_utf8_lossy(&frame));

        match handle_frame(&ctx, peer, &frame, &mut lease, &mut writer).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Close) => break,
            Err(e) => {
                error!("Write error to {}: {}", peer, e);
                break;
            }
        }
    }

    if let Some(lease) = lease {
        info!("Session {} for device {} ended", lease.session_id(), lease.device_id());
    }
}

async fn handle_frame(
    ctx: &SessionContext,
    peer: SocketAddr,
    frame: &[u8],
    lease: &mut Option<SessionLease>,
    writer: &mut OwnedWriteHalf,
) -> std::io::Result<Flow> {
    if !is_message_valid(frame, &ctx.rules) {
        warn!("Invalid message format from {}: {:?}", peer, String::from_utf8_lossy(frame));
        writer.write_all(&[NACK]).await?;
        return Ok(Flow::Continue);
    }

    let rewritten = match rewrite_frame(frame, &ctx.rules).and_then(|f| extract_device_id(&f).map(|id| (f, id))) {
        Ok(ok) => ok,
        Err(e) => {
            error!("Error processing message from {}: {}", peer, e);
            writer.write_all(&[NACK]).await?;
            return Ok(Flow::Continue);
        }
    };
    let (payload, device_id) = rewritten;

    if lease.is_none() {
        match ctx.core.admit(device_id) {
            AdmitDecision::Accepted { lease: granted, reconnect } => {
                info!(
                    "Device {} admitted from {} (session {}, reconnect: {})",
                    device_id,
                    peer,
                    granted.session_id(),
                    reconnect
                );
                *lease = Some(granted);
            }
            AdmitDecision::Rejected(reason) => {
                warn!("Device {} from {} rejected: {}", device_id, peer, reason);
                writer.write_all(&[NACK]).await?;
                return Ok(Flow::Close);
            }
        }
    }

    // A refused event must not reach upstream
    let device = match ctx.core.device_for_event(device_id) {
        Ok(device) => device,
        Err(e) => {
            warn!("Event from device {} dropped: {}", device_id, e);
            writer.write_all(&[NACK]).await?;
            info!("Message from {} answered NACK (device {})", peer, device_id);
            return Ok(Flow::Continue);
        }
    };

    let data = frame_text(&payload);
    let acked = match &ctx.relay {
        Some(relay) => match relay.try_enqueue(payload) {
            Ok(pending) => {
                ctx.core.append_event(&device, device_id, Utc::now(), data);
                let outcome = pending.wait().await;
                debug!("Relay outcome for device {}: {:?}", device_id, outcome);
                outcome.is_ack()
            }
            Err(EnqueueError::Full) => {
                warn!("Queue buffer full, rejecting message from {}", peer);
                false
            }
            Err(EnqueueError::Closed) => {
                error!("Relay queue closed, rejecting message from {}", peer);
                false
            }
        },
        None => {
            ctx.core.append_event(&device, device_id, Utc::now(), data);
            true
        }
    };

    let (reply, label) = if acked { (ACK, "ACK") } else { (NACK, "NACK") };
    writer.write_all(&[reply]).await?;
    info!("Message from {} answered {} (device {})", peer, label, device_id);

    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify(b"", 64), ReadEnd::Closed);
        assert_eq!(classify(b"5040\x14", 64), ReadEnd::Frame);
        assert_eq!(classify(b"5040", 64), ReadEnd::Partial);
        assert_eq!(classify(b"5040", 4), ReadEnd::Oversized);
        assert_eq!(classify(b"504\x14", 4), ReadEnd::Frame);
    }
}
