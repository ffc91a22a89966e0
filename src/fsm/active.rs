//! Active state (spec.md §4.4): listening for an inbound connection to be
//! handed off by the acceptor, or (for peers not pinned to
//! passive-only operation) retrying an outbound connection on timer
//! expiry.

use super::{Event, Fsm, State};

pub async fn handle(fsm: &mut Fsm, event: Event) -> State {
    match event {
        Event::ManualStop => {
            fsm.connect_retry_counter = 0;
            State::Idle
        }
        Event::ConnectRetryTimerExpires => {
            fsm.connect_retry_timer.set(fsm.connect_retry_time());
            if fsm.passive_tcp_establishment {
                State::Active
            } else {
                fsm.open_active_connection();
                State::Connect
            }
        }
        Event::TcpCrAcked(conn) | Event::TcpConnectionConfirmed(conn) => {
            fsm.connect_retry_timer.stop();
            fsm.adopt_connection(conn);
            fsm.send_open().await;
            fsm.hold_timer.set(super::LARGE_HOLD_TIME);
            State::OpenSent
        }
        Event::TcpConnectionFails => {
            fsm.connect_retry_counter += 1;
            State::Idle
        }
        Event::BgpHeaderErr(err) | Event::BgpOpenMsgErr(err) => {
            fsm.connect_retry_counter += 1;
            if fsm.config.peer.send_notification_without_open {
                fsm.send_notification_and_idle(err).await
            } else {
                State::Idle
            }
        }
        Event::NotifMsgVerErr => {
            fsm.connect_retry_counter += 1;
            State::Idle
        }
        // Active's "other" set (spec.md §4.4) is phrased the same way as
        // Connect's, without the "send NOTIFICATION" language the
        // OpenSent/OpenConfirm/Established catch-alls use, so no
        // NOTIFICATION is sent here either.
        _ => {
            fsm.connect_retry_counter += 1;
            State::Idle
        }
    }
}
