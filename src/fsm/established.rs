//! Established state (spec.md §4.4). The reference implementation's
//! terminal-error branch here called a misspelled, unawaited notification
//! helper; both mistakes are avoided by routing every exit through
//! `send_notification_and_idle`, which this module always awaits.
//!
//! Route purging (withdrawing the peer's routes from the RIB on session
//! loss) is out of scope here (spec.md Non-goals): every exit below is
//! logged at the point where a route processor would otherwise be
//! notified.

use tracing::debug;

use crate::codec::error::{CEASE, FSM_ERROR, HOLD_TIMER_EXPIRED};
use crate::codec::NotifyError;

use super::{Event, Fsm, State};

pub async fn handle(fsm: &mut Fsm, event: Event) -> State {
    match event {
        Event::ManualStop => {
            fsm.connect_retry_counter = 0;
            fsm.send_notification_and_idle(NotifyError::new(CEASE, 0, Vec::new())).await
        }
        Event::HoldTimerExpires => {
            fsm.connect_retry_counter += 1;
            fsm.send_notification_and_idle(NotifyError::new(HOLD_TIMER_EXPIRED, 0, Vec::new()))
                .await
        }
        Event::KeepaliveTimerExpires => {
            fsm.send_keepalive().await;
            fsm.restart_keepalive_timer();
            State::Established
        }
        Event::KeepAliveMsg => {
            fsm.refresh_hold_timer();
            State::Established
        }
        Event::UpdateMsg(update) => {
            debug!(
                withdrawn = update.withdrawn.len(),
                nlri = update.nlri.len(),
                attrs = update.path_attrs.len(),
                "update received"
            );
            fsm.refresh_hold_timer();
            State::Established
        }
        Event::UpdateMsgErr(err) => {
            fsm.connect_retry_counter += 1;
            fsm.send_notification_and_idle(err).await
        }
        Event::TcpConnectionFails | Event::NotifMsgVerErr | Event::NotifMsg(_) => {
            fsm.connect_retry_counter += 1;
            State::Idle
        }
        // Established's explicit "other" set {9, 12, 13, 20, 21, 22}:
        // ConnectRetryTimerExpires, DelayOpenTimerExpires,
        // IdleHoldTimerExpires, BgpOpenWithDelayOpenTimerRunning,
        // BgpHeaderErr, BgpOpenMsgErr — generic FSM Error, not the
        // codec's own error triple.
        Event::ConnectRetryTimerExpires
        | Event::IdleHoldTimerExpires
        | Event::BgpOpenWithDelayOpenTimerRunning(_)
        | Event::BgpHeaderErr(_)
        | Event::BgpOpenMsgErr(_) => {
            fsm.connect_retry_counter += 1;
            fsm.send_notification_and_idle(NotifyError::new(FSM_ERROR, 0, Vec::new())).await
        }
        _ => {
            fsm.connect_retry_counter += 1;
            fsm.send_notification_and_idle(NotifyError::new(FSM_ERROR, 0, Vec::new())).await
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use super::*;
    use crate::codec::UpdateMessage;
    use crate::config::PeerConfig;
    use crate::fsm::{Fsm, FsmConfig};

    fn established_fsm() -> Fsm {
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
        let (mut fsm, _status, _queue) = Fsm::new("test".into(), config);
        fsm.negotiate_hold_and_keepalive(30);
        fsm
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_timer_expiry_resends_and_restarts() {
        let mut fsm = established_fsm();
        fsm.keepalive_timer.stop();
        fsm.hold_timer.stop();

        let next = handle(&mut fsm, Event::KeepaliveTimerExpires).await;

        assert_eq!(next, State::Established);
        assert_eq!(fsm.keepalive_timer.remaining(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_msg_refreshes_hold_timer() {
        let mut fsm = established_fsm();
        tokio::time::advance(Duration::from_secs(20)).await;
        tokio::task::yield_now().await;
        assert_eq!(fsm.hold_timer.remaining(), 10);

        let next = handle(&mut fsm, Event::KeepAliveMsg).await;

        assert_eq!(next, State::Established);
        assert_eq!(fsm.hold_timer.remaining(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn update_msg_refreshes_hold_timer() {
        let mut fsm = established_fsm();
        tokio::time::advance(Duration::from_secs(20)).await;
        tokio::task::yield_now().await;

        let update = UpdateMessage {
            withdrawn: Vec::new(),
            path_attrs: Vec::new(),
            nlri: Vec::new(),
        };
        let next = handle(&mut fsm, Event::UpdateMsg(update)).await;

        assert_eq!(next, State::Established);
        assert_eq!(fsm.hold_timer.remaining(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn update_msg_err_sends_notification_and_bumps_counter() {
        let mut fsm = established_fsm();
        let before = fsm.connect_retry_counter;

        let next = handle(&mut fsm, Event::UpdateMsgErr(NotifyError::new(FSM_ERROR, 0, Vec::new()))).await;

        assert_eq!(next, State::Idle);
        assert_eq!(fsm.connect_retry_counter, before + 1);
    }
}
