//! TCP acceptor (spec.md §6): listens on the BGP port and hands accepted
//! sockets off to whichever passive FSM is waiting for that peer address.
//! Unconfigured peers are closed immediately.

use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::connection::Connection;
use crate::fsm::Event;
use crate::session::ListenerRegistry;

pub async fn run(bind_addr: Ipv4Addr, registry: Arc<ListenerRegistry>) -> std::io::Result<()> {
    let listener = TcpListener::bind((bind_addr, crate::connection::BGP_PORT)).await?;
    info!(%bind_addr, port = crate::connection::BGP_PORT, "listening for inbound BGP connections");

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let peer_ip = match peer_addr.ip() {
            std::net::IpAddr::V4(v4) => v4,
            std::net::IpAddr::V6(_) => {
                warn!(%peer_addr, "rejecting IPv6 peer, unsupported");
                continue;
            }
        };

        match registry.take(peer_ip) {
            Some(entry) => {
                info!(%peer_ip, "accepted inbound connection, handing off to passive FSM");
                let conn = Connection::adopt_inbound(stream, entry.local_identifier, entry.peer_asn, entry.queue.clone());
                entry.queue.push(Event::TcpConnectionConfirmed(conn));
            }
            None => {
                warn!(%peer_ip, "inbound connection from unconfigured peer, closing");
                drop(stream);
            }
        }
    }
}
