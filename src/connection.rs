//! TCP connection plumbing (spec.md §6): opening outbound connections,
//! adopting accepted inbound ones, and the read loop that turns wire bytes
//! into FSM events.
//!
//! A `Connection` is owned by exactly one [`crate::fsm::Fsm`]. Its reader
//! task is the only other task touching the connection, and it talks back
//! to the FSM purely through the event queue — never by reaching into FSM
//! state directly.

use std::net::Ipv4Addr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::codec::error::{MSG_HEADER_ERROR, OPEN_MESSAGE_ERROR, OPEN_UNSUPPORTED_VERSION, UPDATE_MESSAGE_ERROR};
use crate::codec::{self, DecodeOutcome, Message};
use crate::fsm::{Event, EventQueue};

pub const BGP_PORT: u16 = 179;

pub struct Connection {
    writer: Mutex<OwnedWriteHalf>,
    queue: Arc<EventQueue>,
    reader_task: tokio::task::JoinHandle<()>,
    peer_port: Option<u16>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

impl Connection {
    pub async fn open_outbound(
        peer_ip: Ipv4Addr,
        local_id: Ipv4Addr,
        peer_asn: u16,
        queue: Arc<EventQueue>,
    ) -> std::io::Result<Connection> {
        let stream = TcpStream::connect((peer_ip, BGP_PORT)).await?;
        Ok(Self::from_stream(stream, local_id, peer_asn, queue))
    }

    pub fn adopt_inbound(
        stream: TcpStream,
        local_id: Ipv4Addr,
        peer_asn: u16,
        queue: Arc<EventQueue>,
    ) -> Connection {
        Self::from_stream(stream, local_id, peer_asn, queue)
    }

    fn from_stream(stream: TcpStream, local_id: Ipv4Addr, peer_asn: u16, queue: Arc<EventQueue>) -> Connection {
        let peer_port = stream.peer_addr().ok().map(|addr| addr.port());
        let (read_half, write_half) = stream.into_split();
        let reader_queue = queue.clone();
        let reader_task = tokio::spawn(input_loop(read_half, local_id, peer_asn, reader_queue));
        Connection {
            writer: Mutex::new(write_half),
            queue,
            reader_task,
            peer_port,
        }
    }

    /// The peer's TCP source port, cleared by the FSM on every entry to
    /// Idle (spec.md §3, §8).
    pub fn peer_port(&self) -> Option<u16> {
        self.peer_port
    }

    pub async fn send(&self, bytes: BytesMut) {
        let mut writer = self.writer.lock().await;
        if let Err(err) = writer.write_all(&bytes).await {
            warn!(error = %err, "write failed");
            self.queue.push(Event::TcpConnectionFails);
        }
    }

    pub async fn close(self) {
        self.reader_task.abort();
        let mut writer = self.writer.into_inner();
        let _ = writer.shutdown().await;
    }
}

/// Reads from `read_half` until it closes, decoding one message at a time
/// and translating the result into the matching FSM event (spec.md §4.1,
/// §6). Decode errors and read failures both end the loop: a malformed
/// message is fatal to the connection once the FSM has dispatched a
/// NOTIFICATION for it.
async fn input_loop(
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    local_id: Ipv4Addr,
    peer_asn: u16,
    queue: Arc<EventQueue>,
) {
    let mut buffer = BytesMut::with_capacity(4096);
    let mut read_buf = [0u8; 4096];

    loop {
        match codec::decode(&buffer, local_id, peer_asn) {
            DecodeOutcome::Message { message, consumed } => {
                let _ = buffer.split_to(consumed);
                queue.push(message_to_event(message));
                continue;
            }
            DecodeOutcome::Error { error, consumed } => {
                let _ = buffer.split_to(consumed);
                queue.push(error_to_event(error));
                return;
            }
            DecodeOutcome::NeedMore => {}
        }

        match read_half.read(&mut read_buf).await {
            Ok(0) => {
                debug!("peer closed connection");
                queue.push(Event::TcpConnectionFails);
                return;
            }
            Ok(n) => buffer.extend_from_slice(&read_buf[..n]),
            Err(err) => {
                warn!(error = %err, "read failed");
                queue.push(Event::TcpConnectionFails);
                return;
            }
        }
    }
}

fn message_to_event(message: Message) -> Event {
    match message {
        Message::Open(open) => Event::BgpOpen(open),
        Message::Keepalive => Event::KeepAliveMsg,
        Message::Update(update) => Event::UpdateMsg(update),
        Message::Notification(notif) => {
            if notif.code == OPEN_MESSAGE_ERROR && notif.subcode == OPEN_UNSUPPORTED_VERSION {
                Event::NotifMsgVerErr
            } else {
                Event::NotifMsg(notif)
            }
        }
    }
}

fn error_to_event(error: codec::NotifyError) -> Event {
    match error.code {
        MSG_HEADER_ERROR => Event::BgpHeaderErr(error),
        OPEN_MESSAGE_ERROR => Event::BgpOpenMsgErr(error),
        UPDATE_MESSAGE_ERROR => Event::UpdateMsgErr(error),
        _ => Event::BgpHeaderErr(error),
    }
}
