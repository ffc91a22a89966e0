//! The per-peer finite state machine (spec.md §3, §4.4).
//!
//! One [`Fsm`] instance exists per (peer, role) pair — a peer configured
//! for both active and passive operation gets two, so that a connection
//! collision (spec.md §4.5, RFC 4271 §6.8) has two live FSMs to arbitrate
//! between. Whether a given instance behaves as the active or passive half
//! of the pair is not a static tag: it follows from which start event
//! [`crate::session::Session`] posts to it (spec.md §4.4 Idle bullets), and
//! from the `passive_tcp_establishment` flag that event sets. Each
//! `Fsm::run` is spawned as its own task and owns its state exclusively;
//! the only fields another task may touch are the ones inside
//! [`SharedStatus`], which the collision detector in
//! [`crate::session::Session`] polls read-only.

mod active;
mod connect;
mod established;
mod idle;
mod openconfirm;
mod opensent;

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{info, instrument, warn};

use crate::codec::{self, NotifyError, NotificationPacket, OpenPacket, UpdateMessage};
use crate::config::PeerConfig;
use crate::connection::Connection;
use crate::timers::{CountdownTimer, DEFAULT_CONNECT_RETRY_TIME};

/// Hold time used while OPEN negotiation is still in flight (RFC 4271
/// §4.2, "a large value"), before a peer-specific value is negotiated
/// (spec.md §4.2).
pub(super) const LARGE_HOLD_TIME: u32 = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Connect,
    Active,
    OpenSent,
    OpenConfirm,
    Established,
}

impl State {
    fn to_u8(self) -> u8 {
        match self {
            State::Idle => 0,
            State::Connect => 1,
            State::Active => 2,
            State::OpenSent => 3,
            State::OpenConfirm => 4,
            State::Established => 5,
        }
    }

    fn from_u8(v: u8) -> State {
        match v {
            0 => State::Idle,
            1 => State::Connect,
            2 => State::Active,
            3 => State::OpenSent,
            4 => State::OpenConfirm,
            _ => State::Established,
        }
    }
}

/// RFC 4271 §8.1 event identifiers, restricted to the namespace spec.md §6
/// actually declares stable (events 6, 7, 12, 14, 15 are not part of that
/// list and are not modeled). 13 (IdleHoldTimer_Expires) and 20 (BGPOpen
/// with DelayOpenTimer running) are kept for namespace completeness but
/// never produced: this crate paces automatic restarts from the session
/// supervisor instead of a dedicated idle-hold timer, and never enables
/// DelayOpen (see DESIGN.md's Open Question decisions).
#[derive(Debug)]
pub enum Event {
    /// Reserved for an administrative control surface (manual peer
    /// start/stop) this crate does not expose; only the automatic
    /// variants below are ever produced.
    #[allow(dead_code)]
    ManualStart,
    #[allow(dead_code)]
    ManualStop,
    AutomaticStart,
    #[allow(dead_code)]
    ManualStartWithPassiveTcpEstablishment,
    AutomaticStartWithPassiveTcpEstablishment,
    AutomaticStop,
    ConnectRetryTimerExpires,
    HoldTimerExpires,
    KeepaliveTimerExpires,
    #[allow(dead_code)]
    IdleHoldTimerExpires,
    /// Carries the now-connected socket, wrapped as a [`Connection`]: the
    /// result of this FSM's own `open_outbound` attempt succeeding.
    TcpCrAcked(Connection),
    /// Carries the now-connected socket: an inbound connection the
    /// acceptor matched to this FSM via the listener registry.
    TcpConnectionConfirmed(Connection),
    TcpConnectionFails,
    BgpOpen(OpenPacket),
    #[allow(dead_code)]
    BgpOpenWithDelayOpenTimerRunning(OpenPacket),
    BgpHeaderErr(NotifyError),
    BgpOpenMsgErr(NotifyError),
    /// Not produced: spec.md §4.5's collision detector stops the losing
    /// FSM with `AutomaticStop` directly rather than a dedicated
    /// collision event. Kept because spec.md §4.4's per-state "other"
    /// sets name it explicitly.
    #[allow(dead_code)]
    OpenCollisionDump,
    NotifMsgVerErr,
    NotifMsg(NotificationPacket),
    KeepAliveMsg,
    UpdateMsg(UpdateMessage),
    UpdateMsgErr(NotifyError),
}

impl Event {
    /// True for the two events that must jump the per-FSM event queue:
    /// enqueuing one of them discards whatever is already waiting, mirroring
    /// the reference implementation's queue-clearing stop handling
    /// (spec.md §5).
    fn is_stop_class(&self) -> bool {
        matches!(self, Event::ManualStop | Event::AutomaticStop)
    }
}

/// Cross-task-visible snapshot of an FSM's state, read by the session
/// supervisor and collision detector and nothing else. The FSM's dispatch
/// task is the sole writer.
#[derive(Debug)]
pub struct SharedStatus {
    state: AtomicU8,
    peer_identifier: Mutex<Option<Ipv4Addr>>,
}

impl SharedStatus {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(State::Idle.to_u8()),
            peer_identifier: Mutex::new(None),
        }
    }

    pub fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn peer_identifier(&self) -> Option<Ipv4Addr> {
        *self.peer_identifier.lock().unwrap()
    }

    pub(crate) fn set_state(&self, state: State) {
        self.state.store(state.to_u8(), Ordering::SeqCst);
    }

    pub(crate) fn set_peer_identifier(&self, id: Option<Ipv4Addr>) {
        *self.peer_identifier.lock().unwrap() = id;
    }
}

/// The serialized, single-consumer event queue. Producers call
/// [`EventQueue::push`]; the owning FSM's dispatch loop calls
/// [`EventQueue::next`]. `ManualStop`/`AutomaticStop` clear the queue before
/// being pushed, since a stop request makes any already-queued event moot.
#[derive(Debug)]
pub struct EventQueue {
    deque: Mutex<VecDeque<(u16, Event)>>,
    notify: tokio::sync::Notify,
    next_serial: std::sync::atomic::AtomicU16,
}

impl EventQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            deque: Mutex::new(VecDeque::new()),
            notify: tokio::sync::Notify::new(),
            next_serial: std::sync::atomic::AtomicU16::new(1),
        })
    }

    /// Attaches a serial number (wrapping 1..=65535, for debug correlation
    /// only — spec.md §5) and enqueues `event`. `ManualStop`/`AutomaticStop`
    /// clear the queue first, since a stop request makes any already-queued
    /// event moot.
    pub fn push(&self, event: Event) {
        let serial = self.next_serial.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| Some(if v == u16::MAX { 1 } else { v + 1 })).unwrap();
        let mut deque = self.deque.lock().unwrap();
        if event.is_stop_class() {
            deque.clear();
        }
        deque.push_back((serial, event));
        drop(deque);
        self.notify.notify_one();
    }

    pub(crate) async fn next(&self) -> (u16, Event) {
        loop {
            if let Some(item) = self.deque.lock().unwrap().pop_front() {
                return item;
            }
            self.notify.notified().await;
        }
    }

    /// Non-blocking pop, used by tests that assert no event was enqueued.
    #[cfg(test)]
    pub(crate) fn try_next(&self) -> Option<(u16, Event)> {
        self.deque.lock().unwrap().pop_front()
    }
}

/// Static, per-peer configuration an FSM consults but never mutates.
#[derive(Debug, Clone)]
pub struct FsmConfig {
    pub local_identifier: Ipv4Addr,
    pub local_asn: u16,
    pub local_hold_time: u16,
    pub peer: PeerConfig,
}

pub struct Fsm {
    pub name: String,
    config: FsmConfig,
    state: State,
    status: Arc<SharedStatus>,
    queue: Arc<EventQueue>,

    /// Set by the Idle handler when it receives event 4 or 5 (spec.md
    /// §4.4): this FSM only listens for an inbound connection and never
    /// initiates its own outbound attempt, including on ConnectRetryTimer
    /// expiry in the Active state.
    passive_tcp_establishment: bool,

    connect_retry_timer: CountdownTimer,
    hold_timer: CountdownTimer,
    keepalive_timer: CountdownTimer,
    connect_retry_counter: u32,

    negotiated_hold_time: u16,
    connection: Option<Connection>,
    /// The connected peer's TCP source port, cleared on every entry to
    /// Idle alongside the learned peer identifier (spec.md §3, §8).
    peer_port: Option<u16>,
    /// The in-flight `open_outbound` attempt, if any, spawned as its own
    /// task so the dispatch loop stays free to process other events (in
    /// particular a stop-class event) while a connect is pending. Aborted
    /// rather than awaited on every exit that should give up on it
    /// (spec.md §5: "cancelling a pending outbound connect must not leak a
    /// half-open socket").
    connect_task: Option<tokio::task::JoinHandle<()>>,
}

impl Fsm {
    pub fn new(name: String, config: FsmConfig) -> (Self, Arc<SharedStatus>, Arc<EventQueue>) {
        let status = Arc::new(SharedStatus::new());
        let queue = EventQueue::new();
        let local_hold_time = config.local_hold_time;
        let fsm = Fsm {
            name,
            config,
            state: State::Idle,
            status: status.clone(),
            queue: queue.clone(),
            passive_tcp_establishment: false,
            connect_retry_timer: CountdownTimer::spawn(queue.clone(), || Event::ConnectRetryTimerExpires),
            hold_timer: CountdownTimer::spawn(queue.clone(), || Event::HoldTimerExpires),
            keepalive_timer: CountdownTimer::spawn(queue.clone(), || Event::KeepaliveTimerExpires),
            connect_retry_counter: 0,
            negotiated_hold_time: local_hold_time,
            connection: None,
            peer_port: None,
            connect_task: None,
        };
        (fsm, status, queue)
    }

    /// Runs the dispatch loop until the process shuts the FSM down by
    /// dropping its task handle. There is no terminal state: per RFC 4271,
    /// Idle is re-enterable and the machine keeps waiting for the next
    /// start event indefinitely.
    #[instrument(skip_all, fields(peer = %self.name))]
    pub async fn run(mut self) {
        loop {
            let (serial, event) = self.queue.next().await;
            tracing::debug!(serial, ?event, state = ?self.state, "dispatching event");
            let from = self.state;
            let to = self.dispatch(event).await;
            if to != from {
                self.enter_state(to).await;
            }
        }
    }

    async fn dispatch(&mut self, event: Event) -> State {
        match self.state {
            State::Idle => idle::handle(self, event).await,
            State::Connect => connect::handle(self, event).await,
            State::Active => active::handle(self, event).await,
            State::OpenSent => opensent::handle(self, event).await,
            State::OpenConfirm => openconfirm::handle(self, event).await,
            State::Established => established::handle(self, event).await,
        }
    }

    async fn enter_state(&mut self, state: State) {
        info!(from = ?self.state, to = ?state, "fsm transition");
        self.state = state;
        self.status.set_state(state);
        if state == State::Idle {
            self.idle_entry_cleanup().await;
        }
    }

    /// Releases everything a running session holds: the connection, the
    /// negotiated hold/keepalive timers, and the learned peer identifier
    /// (spec.md §3, §8 invariants).
    async fn idle_entry_cleanup(&mut self) {
        self.abort_connect_attempt();
        if let Some(conn) = self.connection.take() {
            conn.close().await;
        }
        self.connect_retry_timer.stop();
        self.hold_timer.stop();
        self.keepalive_timer.stop();
        self.status.set_peer_identifier(None);
        self.peer_port = None;
        self.passive_tcp_establishment = false;
    }

    fn connect_retry_time(&self) -> u32 {
        DEFAULT_CONNECT_RETRY_TIME
    }

    /// Spawns the outbound connect attempt as its own task rather than
    /// awaiting it inline, so the dispatch loop in `run` remains free to
    /// process other events — including a stop-class event — while the
    /// connect is pending (spec.md §5). Any attempt already in flight is
    /// aborted first.
    fn open_active_connection(&mut self) {
        self.abort_connect_attempt();
        let peer_ip = self.config.peer.peer_ip;
        let local_id = self.config.local_identifier;
        let peer_asn = self.config.peer.peer_asn;
        let queue = self.queue.clone();
        self.connect_task = Some(tokio::spawn(async move {
            match Connection::open_outbound(peer_ip, local_id, peer_asn, queue.clone()).await {
                Ok(conn) => queue.push(Event::TcpCrAcked(conn)),
                Err(err) => {
                    warn!(error = %err, "outbound connection attempt failed");
                    queue.push(Event::TcpConnectionFails);
                }
            }
        }));
    }

    /// Aborts the in-flight `open_outbound` attempt, if any. Dropping the
    /// connect future mid-`TcpStream::connect` closes the half-open socket,
    /// so this never leaks one (spec.md §5).
    fn abort_connect_attempt(&mut self) {
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
    }

    async fn send_open(&mut self) {
        let bytes = codec::encode_open(self.config.local_asn, self.config.local_hold_time, self.config.local_identifier, &[]);
        if let Some(conn) = &self.connection {
            conn.send(bytes).await;
        }
    }

    async fn send_keepalive(&mut self) {
        let bytes = codec::encode_keepalive();
        if let Some(conn) = &self.connection {
            conn.send(bytes).await;
        }
    }

    /// Sends a NOTIFICATION and transitions to Idle. Never callable from
    /// Idle itself: the per-state handlers never reach this helper while
    /// `self.state == State::Idle`, so a NOTIFICATION is never emitted from
    /// that state (spec.md §4.4, §7).
    async fn send_notification_and_idle(&mut self, err: NotifyError) -> State {
        let bytes = codec::encode_notification(err.code, err.subcode, &err.data);
        if let Some(conn) = &self.connection {
            conn.send(bytes).await;
        }
        State::Idle
    }

    fn negotiate_hold_and_keepalive(&mut self, peer_hold_time: u16) {
        let negotiated = self.config.local_hold_time.min(peer_hold_time);
        self.negotiated_hold_time = negotiated;
        if negotiated == 0 {
            self.hold_timer.stop();
            self.keepalive_timer.stop();
        } else {
            self.hold_timer.set(negotiated as u32);
            self.keepalive_timer.set((negotiated / 3) as u32);
        }
    }

    fn refresh_hold_timer(&mut self) {
        if self.negotiated_hold_time != 0 {
            self.hold_timer.set(self.negotiated_hold_time as u32);
        }
    }

    fn restart_keepalive_timer(&mut self) {
        if self.negotiated_hold_time != 0 {
            self.keepalive_timer.set((self.negotiated_hold_time / 3) as u32);
        }
    }

    fn adopt_connection(&mut self, conn: Connection) {
        self.connect_task = None;
        self.peer_port = conn.peer_port();
        self.connection = Some(conn);
    }
}
