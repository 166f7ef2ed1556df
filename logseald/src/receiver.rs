//! UDP boundary: one datagram becomes at most one queue enqueue.

use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use logseal_core::{ts, LogRecord};

/// Largest datagram we accept; syslog senders stay far below this.
const MAX_DATAGRAM: usize = 64 * 1024;

/// Receive datagrams until the task is aborted or the writer goes away.
///
/// The receiver never touches the journal; its only blocking point is the
/// queue enqueue.
pub async fn run(socket: UdpSocket, queue: mpsc::Sender<LogRecord>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(pair) => pair,
            Err(err) => {
                tracing::error!(error = %err, "udp receive failed");
                continue;
            }
        };
        let Some(message) = parse_datagram(&buf[..len]) else {
            tracing::debug!(peer = %peer, len, "dropped datagram");
            continue;
        };
        let record = LogRecord {
            ts: ts::now(),
            source: peer.ip().to_string(),
            message,
        };
        if queue.send(record).await.is_err() {
            // Writer gone; nothing left to enqueue for.
            break;
        }
    }
}

/// Decode and frame-strip a raw datagram.
///
/// Invalid UTF-8 and payloads of four bytes or fewer (after whitespace
/// trimming) are dropped; a single trailing NUL is stripped.
pub fn parse_datagram(raw: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(raw).ok()?;
    let trimmed = text.trim();
    if trimmed.len() <= 4 {
        return None;
    }
    let message = trimmed.strip_suffix('\0').unwrap_or(trimmed);
    Some(message.to_string())
}
