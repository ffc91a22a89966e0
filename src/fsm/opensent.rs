//! OpenSent state (spec.md §4.4): our OPEN is on the wire, waiting for the
//! peer's.

use crate::codec::error::{CEASE, FSM_ERROR, HOLD_TIMER_EXPIRED};
use crate::codec::NotifyError;

use super::{Event, Fsm, State};

pub async fn handle(fsm: &mut Fsm, event: Event) -> State {
    match event {
        Event::ManualStop => {
            fsm.connect_retry_counter = 0;
            fsm.send_notification_and_idle(NotifyError::new(CEASE, 0, Vec::new())).await
        }
        Event::AutomaticStop => {
            fsm.connect_retry_counter += 1;
            fsm.send_notification_and_idle(NotifyError::new(CEASE, 0, Vec::new())).await
        }
        Event::HoldTimerExpires => {
            fsm.connect_retry_counter += 1;
            fsm.send_notification_and_idle(NotifyError::new(HOLD_TIMER_EXPIRED, 0, Vec::new()))
                .await
        }
        Event::TcpConnectionFails => {
            if let Some(conn) = fsm.connection.take() {
                conn.close().await;
            }
            fsm.connect_retry_timer.set(fsm.connect_retry_time());
            State::Active
        }
        Event::BgpOpen(open) => {
            fsm.status.set_peer_identifier(Some(open.identifier));
            fsm.connect_retry_timer.stop();
            fsm.negotiate_hold_and_keepalive(open.hold_time);
            fsm.send_keepalive().await;
            State::OpenConfirm
        }
        Event::BgpHeaderErr(err) | Event::BgpOpenMsgErr(err) => {
            fsm.connect_retry_counter += 1;
            fsm.send_notification_and_idle(err).await
        }
        Event::NotifMsgVerErr => State::Idle,
        Event::NotifMsg(_) => State::Idle,
        // OpenSent's "other" set: FSM Error path.
        _ => {
            fsm.connect_retry_counter += 1;
            fsm.send_notification_and_idle(NotifyError::new(FSM_ERROR, 0, Vec::new())).await
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::codec::OpenPacket;
    use crate::config::PeerConfig;
    use crate::fsm::{Fsm, FsmConfig};

    fn test_fsm() -> Fsm {
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
        let (fsm, _status, _queue) = Fsm::new("test".into(), config);
        fsm
    }

    #[tokio::test(start_paused = true)]
    async fn bgp_open_negotiates_and_moves_to_open_confirm() {
        let mut fsm = test_fsm();
        let open = OpenPacket {
            version: 4,
            asn: 65002,
            hold_time: 30,
            identifier: Ipv4Addr::new(10, 0, 0, 2),
            opt_params: Vec::new(),
        };

        let next = handle(&mut fsm, Event::BgpOpen(open)).await;

        assert_eq!(next, State::OpenConfirm);
        assert_eq!(fsm.negotiated_hold_time, 30);
        assert_eq!(fsm.hold_timer.remaining(), 30);
        assert_eq!(fsm.keepalive_timer.remaining(), 10);
        assert_eq!(fsm.status.peer_identifier(), Some(Ipv4Addr::new(10, 0, 0, 2)));
    }

    #[tokio::test(start_paused = true)]
    async fn tcp_connection_fails_drops_to_active_and_closes_connection() {
        let mut fsm = test_fsm();
        fsm.connection = None;

        let next = handle(&mut fsm, Event::TcpConnectionFails).await;

        assert_eq!(next, State::Active);
        assert!(fsm.connection.is_none());
        assert!(fsm.connect_retry_timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn notif_msg_ver_err_returns_to_idle_without_bumping_counter() {
        let mut fsm = test_fsm();
        let before = fsm.connect_retry_counter;

        let next = handle(&mut fsm, Event::NotifMsgVerErr).await;

        assert_eq!(next, State::Idle);
        assert_eq!(fsm.connect_retry_counter, before);
    }
}
