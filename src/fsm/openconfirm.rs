//! OpenConfirm state (spec.md §4.4): OPENs exchanged, waiting for the
//! peer's KEEPALIVE to confirm the session. The reference implementation's
//! terminal branch here called a nonexistent `switch_state` method instead
//! of its real state-transition function; every exit below goes through
//! the ordinary `State` return path instead.

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
            State::OpenConfirm
        }
        Event::TcpConnectionFails | Event::NotifMsg(_) => {
            fsm.connect_retry_counter += 1;
            State::Idle
        }
        Event::NotifMsgVerErr => State::Idle,
        Event::KeepAliveMsg => {
            fsm.refresh_hold_timer();
            State::Established
        }
        Event::BgpHeaderErr(err) | Event::BgpOpenMsgErr(err) => {
            fsm.connect_retry_counter += 1;
            fsm.send_notification_and_idle(err).await
        }
        // A duplicate BGPOpen while already in OpenConfirm, absent a
        // collision the session-level detector has already resolved via
        // AutomaticStop, is an FSM Error (spec.md §4.4, §4.5).
        Event::BgpOpen(_) => {
            fsm.connect_retry_counter += 1;
            fsm.send_notification_and_idle(NotifyError::new(FSM_ERROR, 0, Vec::new())).await
        }
        // OpenConfirm's "other" set: FSM Error path.
        _ => {
            fsm.connect_retry_counter += 1;
            fsm.send_notification_and_idle(NotifyError::new(FSM_ERROR, 0, Vec::new())).await
        }
    }
}
