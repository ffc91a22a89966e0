//! Connect state (spec.md §4.4): an outbound TCP attempt is in flight.
//!
//! Connect is explicitly excluded from the FSM-Error-elevation rule
//! (spec.md §7: "a NOTIFICATION is never sent from Idle or from Connect"),
//! so its "other" path below drops the connection and returns to Idle
//! silently rather than sending code 5.

use super::{Event, Fsm, State};

pub async fn handle(fsm: &mut Fsm, event: Event) -> State {
    match event {
        Event::ManualStop => {
            fsm.connect_retry_counter = 0;
            State::Idle
        }
        // §7's SendNOTIFICATIONwithoutOPEN option names Active/Connect
        // together; neither event is part of Connect's named "other" set,
        // so absent the flag they fall through to the silent no-op below.
        Event::BgpHeaderErr(err) | Event::BgpOpenMsgErr(err) if fsm.config.peer.send_notification_without_open => {
            fsm.connect_retry_counter += 1;
            fsm.send_notification_and_idle(err).await
        }
        Event::ConnectRetryTimerExpires => {
            fsm.connection = None;
            fsm.connect_retry_timer.set(fsm.connect_retry_time());
            fsm.open_active_connection();
            State::Connect
        }
        Event::TcpCrAcked(conn) | Event::TcpConnectionConfirmed(conn) => {
            fsm.adopt_connection(conn);
            fsm.connect_retry_timer.stop();
            fsm.send_open().await;
            fsm.hold_timer.set(super::LARGE_HOLD_TIME);
            State::OpenSent
        }
        Event::TcpConnectionFails => {
            fsm.connect_retry_timer.stop();
            State::Idle
        }
        // The Connect "other" set (spec.md §4.4): {8, 10, 11, 13, 19, 23,
        // 25, 26, 27, 28} — drop the connection, bump the counter, no
        // NOTIFICATION.
        Event::AutomaticStop
        | Event::HoldTimerExpires
        | Event::KeepaliveTimerExpires
        | Event::IdleHoldTimerExpires
        | Event::BgpOpen(_)
        | Event::OpenCollisionDump
        | Event::NotifMsg(_)
        | Event::KeepAliveMsg
        | Event::UpdateMsg(_)
        | Event::UpdateMsgErr(_) => {
            fsm.connect_retry_counter += 1;
            State::Idle
        }
        // Header/OPEN errors and the version-mismatch NOTIFICATION have no
        // defined meaning before a connection exists; not part of the
        // named "other" set, so left as a silent no-op.
        _ => State::Connect,
    }
}
