//! Session-level glue (spec.md §4.5, §5): per-peer FSM pairs, the automatic
//! restart supervisor, the collision detector, and the listener registry
//! the acceptor consults to hand off inbound sockets.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use tracing::info;

use crate::config::{Config, PeerConfig};
use crate::fsm::{Event, EventQueue, Fsm, FsmConfig, SharedStatus, State};

/// What the acceptor needs to construct a [`crate::connection::Connection`]
/// for an inbound socket and hand it to the right passive FSM.
pub struct ListenerEntry {
    pub queue: Arc<EventQueue>,
    pub local_identifier: Ipv4Addr,
    pub peer_asn: u16,
}

/// Entries are inserted by the per-peer supervisor each time it restarts a
/// passive FSM, and removed atomically by the acceptor on the matching
/// inbound connection (spec.md §4.5, §9): a second inbound attempt before
/// the next supervisor tick re-registers finds nothing and is closed.
pub struct ListenerRegistry {
    entries: Mutex<HashMap<Ipv4Addr, Arc<ListenerEntry>>>,
}

impl ListenerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
        })
    }

    fn register(&self, peer_ip: Ipv4Addr, entry: ListenerEntry) {
        self.entries.lock().unwrap().insert(peer_ip, Arc::new(entry));
    }

    /// Atomically removes and returns the entry for `peer_ip`, called by
    /// the acceptor for every accepted inbound socket. An unconfigured or
    /// not-currently-listening peer address resolves to `None` and the
    /// acceptor closes the connection immediately; a second inbound
    /// attempt before the next supervisor tick re-registers finds nothing
    /// either.
    pub fn take(&self, peer_ip: Ipv4Addr) -> Option<Arc<ListenerEntry>> {
        self.entries.lock().unwrap().remove(&peer_ip)
    }
}

struct FsmHandle {
    status: Arc<SharedStatus>,
    queue: Arc<EventQueue>,
}

pub struct Session {
    listener_registry: Arc<ListenerRegistry>,
}

impl Session {
    pub fn start(config: &Config, listener_registry: Arc<ListenerRegistry>) -> Session {
        for peer in &config.peers {
            let fsm_config = FsmConfig {
                local_identifier: config.local_identifier,
                local_asn: config.local_asn,
                local_hold_time: config.local_hold_time,
                peer: peer.clone(),
            };

            let active = peer
                .active_mode
                .then(|| spawn_fsm(format!("{}-active", peer.peer_ip), fsm_config.clone()));
            let passive = peer
                .passive_mode
                .then(|| spawn_fsm(format!("{}-passive", peer.peer_ip), fsm_config.clone()));

            if let (Some(a), Some(p)) = (&active, &passive) {
                tokio::spawn(collision_detector(
                    a.status.clone(),
                    a.queue.clone(),
                    p.status.clone(),
                    p.queue.clone(),
                    config.local_identifier,
                ));
            }

            tokio::spawn(supervisor(active, passive, peer.clone(), config.local_identifier, listener_registry.clone()));
        }

        Session { listener_registry }
    }

    pub fn listener_registry(&self) -> &Arc<ListenerRegistry> {
        &self.listener_registry
    }
}

fn spawn_fsm(name: String, config: FsmConfig) -> FsmHandle {
    let (fsm, status, queue) = Fsm::new(name, config);
    tokio::spawn(fsm.run());
    FsmHandle { status, queue }
}

/// Drives the restart/registration cycle spec.md §4.5 assigns to the
/// per-peer supervisor: every ~10 s (jittered), nudge whichever half of the
/// active/passive pair is Idle back to life, provided the other half
/// hasn't already reached Established. Restarting the passive half also
/// (re)registers it in the listener registry, since the acceptor removes
/// an entry the moment it hands off a matching inbound socket.
async fn supervisor(
    active: Option<FsmHandle>,
    passive: Option<FsmHandle>,
    peer: PeerConfig,
    local_identifier: Ipv4Addr,
    registry: Arc<ListenerRegistry>,
) {
    if !peer.allow_automatic_start {
        return;
    }
    let base = if peer.damp_peer_oscillations { 30 } else { 10 };

    loop {
        let passive_established = passive.as_ref().map(|p| p.status.state() == State::Established).unwrap_or(false);
        if let Some(a) = &active {
            if a.status.state() == State::Idle && !passive_established {
                a.queue.push(Event::AutomaticStart);
            }
        }

        let active_established = active.as_ref().map(|a| a.status.state() == State::Established).unwrap_or(false);
        if let Some(p) = &passive {
            if p.status.state() == State::Idle && !active_established {
                registry.register(
                    peer.peer_ip,
                    ListenerEntry {
                        queue: p.queue.clone(),
                        local_identifier,
                        peer_asn: peer.peer_asn,
                    },
                );
                p.queue.push(Event::AutomaticStartWithPassiveTcpEstablishment);
            }
        }

        let jitter = rand::thread_rng().gen_range(0..5);
        tokio::time::sleep(Duration::from_secs(base + jitter)).await;
    }
}

/// Implements the collision resolution spec.md §4.5 assigns to a
/// session-level detector: once neither FSM is Idle, if exactly one has
/// reached Established the other is redundant and is stopped; once both
/// reach OpenConfirm, the side with the numerically lower local BGP
/// Identifier relative to the identifier the active FSM learned gives way.
/// Both outcomes are delivered as plain `AutomaticStop`, not a dedicated
/// collision event — matching spec.md's own description of this step.
async fn collision_detector(
    active_status: Arc<SharedStatus>,
    active_queue: Arc<EventQueue>,
    passive_status: Arc<SharedStatus>,
    passive_queue: Arc<EventQueue>,
    local_identifier: Ipv4Addr,
) {
    let mut interval = tokio::time::interval(Duration::from_millis(100));
    loop {
        interval.tick().await;
        let a_state = active_status.state();
        let p_state = passive_status.state();
        if a_state == State::Idle || p_state == State::Idle {
            continue;
        }

        if a_state == State::Established && p_state != State::Established {
            passive_queue.push(Event::AutomaticStop);
            continue;
        }
        if p_state == State::Established && a_state != State::Established {
            active_queue.push(Event::AutomaticStop);
            continue;
        }

        if a_state == State::OpenConfirm && p_state == State::OpenConfirm {
            let Some(peer_identifier) = active_status.peer_identifier() else {
                continue;
            };
            if local_identifier > peer_identifier {
                info!(%peer_identifier, "collision resolved: keeping locally-initiated connection");
                passive_queue.push(Event::AutomaticStop);
            } else {
                info!(%peer_identifier, "collision resolved: keeping peer-initiated connection");
                active_queue.push(Event::AutomaticStop);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::config::PeerConfig;
    use crate::fsm::FsmConfig;

    fn fsm_handle(name: &str) -> FsmHandle {
        let config = FsmConfig {
            local_identifier: Ipv4Addr::new(10, 0, 0, 1),
            local_asn: 65001,
            local_hold_time: 90,
            peer: PeerConfig {
                peer_ip: Ipv4Addr::new(10, 0, 0, 2),
                peer_asn: 65002,
                ..Default::default()
            },
        };
        let (_fsm, status, queue) = Fsm::new(name.into(), config);
        FsmHandle { status, queue }
    }

    /// spec.md §8 scenario 5: both halves reach OpenConfirm; the side with
    /// the numerically lower local-vs-peer identifier comparison gives way,
    /// and exactly one queue receives `AutomaticStop`.
    #[tokio::test(start_paused = true)]
    async fn collision_detector_stops_locally_initiated_loser() {
        let active = fsm_handle("active");
        let passive = fsm_handle("passive");
        active.status.set_state(State::OpenConfirm);
        passive.status.set_state(State::OpenConfirm);
        active.status.set_peer_identifier(Some(Ipv4Addr::new(192, 0, 2, 1)));

        let local_identifier = Ipv4Addr::new(10, 0, 0, 1);
        tokio::spawn(collision_detector(
            active.status.clone(),
            active.queue.clone(),
            passive.status.clone(),
            passive.queue.clone(),
            local_identifier,
        ));

        tokio::time::advance(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;

        // local_identifier (10.0.0.1) < peer_identifier (192.0.2.1), so the
        // active (locally-initiated) side gives way.
        assert!(matches!(active.queue.try_next(), Some((_, Event::AutomaticStop))));
        assert!(passive.queue.try_next().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn collision_detector_stops_passive_side_when_local_identifier_wins() {
        let active = fsm_handle("active");
        let passive = fsm_handle("passive");
        active.status.set_state(State::OpenConfirm);
        passive.status.set_state(State::OpenConfirm);
        active.status.set_peer_identifier(Some(Ipv4Addr::new(1, 0, 0, 1)));

        let local_identifier = Ipv4Addr::new(192, 0, 2, 1);
        tokio::spawn(collision_detector(
            active.status.clone(),
            active.queue.clone(),
            passive.status.clone(),
            passive.queue.clone(),
            local_identifier,
        ));

        tokio::time::advance(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;

        assert!(matches!(passive.queue.try_next(), Some((_, Event::AutomaticStop))));
        assert!(active.queue.try_next().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn collision_detector_ignores_pair_while_either_is_idle() {
        let active = fsm_handle("active");
        let passive = fsm_handle("passive");
        passive.status.set_state(State::OpenConfirm);
        // active stays Idle.

        tokio::spawn(collision_detector(
            active.status.clone(),
            active.queue.clone(),
            passive.status.clone(),
            passive.queue.clone(),
            Ipv4Addr::new(10, 0, 0, 1),
        ));

        tokio::time::advance(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;

        assert!(active.queue.try_next().is_none());
        assert!(passive.queue.try_next().is_none());
    }
}
