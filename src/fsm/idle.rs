//! Idle state (spec.md §4.4). Only the start events are meaningful here;
//! everything else is ignored, and this module must never call
//! `send_notification_and_idle` — a NOTIFICATION is never sent from Idle
//! (spec.md §7).

use super::{Event, Fsm, State};

pub async fn handle(fsm: &mut Fsm, event: Event) -> State {
    match event {
        Event::ManualStart | Event::AutomaticStart => {
            fsm.connect_retry_counter = 0;
            fsm.connect_retry_timer.set(fsm.connect_retry_time());
            fsm.open_active_connection();
            State::Connect
        }
        Event::ManualStartWithPassiveTcpEstablishment | Event::AutomaticStartWithPassiveTcpEstablishment => {
            fsm.passive_tcp_establishment = true;
            fsm.connect_retry_counter = 0;
            fsm.connect_retry_timer.set(fsm.connect_retry_time());
            State::Active
        }
        // All other events, including every message/error event, are
        // ignored in Idle: there is no connection yet and nothing to tear
        // down or notify about.
        _ => State::Idle,
    }
}
