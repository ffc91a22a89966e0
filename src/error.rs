//! Crate-level error types.
//!
//! These cover configuration and startup failures. Wire-level protocol
//! errors are represented separately as `(code, subcode, data)` triples
//! (see [`crate::codec::NotifyError`]) because they are values encoded onto
//! the wire, not exceptions unwound through Rust's error machinery.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BgpError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid peer address: {0}")]
    InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, BgpError>;
