//! A BGP-4 speaker core: per-peer session FSMs (RFC 4271 §8), the wire
//! codec, and the timer/connection plumbing that drives them.

pub mod acceptor;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod fsm;
pub mod session;
pub mod timers;

pub use config::Config;
pub use error::{BgpError, Result};
