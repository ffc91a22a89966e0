//! Wire codec: message framing, validation-order table (spec.md §4.1), and
//! per-message-type encode/decode.

pub mod error;
pub mod header;
pub mod keepalive;
pub mod notification;
pub mod open;
pub mod update;

use std::net::Ipv4Addr;

use nom_derive::Parse;

pub use error::NotifyError;
pub use header::Header;
pub use notification::NotificationPacket;
pub use open::OpenPacket;
pub use update::UpdateMessage;

use header::{HEADER_LEN, MAX_MESSAGE_LEN, TYPE_KEEPALIVE, TYPE_NOTIFICATION, TYPE_OPEN, TYPE_UPDATE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Open(OpenPacket),
    Update(UpdateMessage),
    Notification(NotificationPacket),
    Keepalive,
}

/// Result of attempting to decode one message off the front of a byte
/// stream. `buffer` may hold a partial message (TCP makes no framing
/// guarantee), so callers must be able to wait for more bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// Not enough bytes buffered yet to make a decision.
    NeedMore,
    /// A complete message was decoded; `consumed` bytes should be dropped
    /// from the front of the buffer.
    Message { message: Message, consumed: usize },
    /// The buffered bytes are malformed; `consumed` bytes (the whole bad
    /// message, or the whole buffer if even the header was unusable)
    /// should be dropped, and `error` sent as a NOTIFICATION.
    Error { error: NotifyError, consumed: usize },
}

/// Decodes at most one message from the front of `buffer`, applying
/// spec.md §4.1's validation order: marker, then length bounds, then type,
/// then the per-type body checks (version/ASN/identifier/hold-time for
/// OPEN; minimum length for NOTIFICATION).
pub fn decode(buffer: &[u8], local_id: Ipv4Addr, expected_peer_asn: u16) -> DecodeOutcome {
    if buffer.len() < HEADER_LEN {
        return DecodeOutcome::NeedMore;
    }

    let header_bytes = &buffer[..HEADER_LEN];
    let (_, header) = match Header::parse_be(header_bytes) {
        Ok(parsed) => parsed,
        Err(_) => {
            return DecodeOutcome::Error {
                error: NotifyError::new(error::MSG_HEADER_ERROR, error::HDR_BAD_LENGTH, Vec::new()),
                consumed: buffer.len(),
            }
        }
    };

    if !header.is_marker_valid() {
        return DecodeOutcome::Error {
            error: NotifyError::new(error::MSG_HEADER_ERROR, error::HDR_NOT_SYNCHRONISED, Vec::new()),
            consumed: buffer.len(),
        };
    }

    let length = header.length as usize;
    if length < HEADER_LEN || length > MAX_MESSAGE_LEN {
        return DecodeOutcome::Error {
            error: NotifyError::new(error::MSG_HEADER_ERROR, error::HDR_BAD_LENGTH, header.length.to_be_bytes().to_vec()),
            consumed: buffer.len(),
        };
    }

    if !matches!(header.typ, TYPE_OPEN | TYPE_UPDATE | TYPE_NOTIFICATION | TYPE_KEEPALIVE) {
        return DecodeOutcome::Error {
            error: NotifyError::new(error::MSG_HEADER_ERROR, error::HDR_BAD_TYPE, vec![header.typ]),
            consumed: length.min(buffer.len()),
        };
    }

    if buffer.len() < length {
        return DecodeOutcome::NeedMore;
    }

    let body = &buffer[HEADER_LEN..length];

    match header.typ {
        TYPE_OPEN => decode_open(body, local_id, expected_peer_asn, length),
        TYPE_KEEPALIVE => {
            if length != HEADER_LEN {
                DecodeOutcome::Error {
                    error: NotifyError::new(error::MSG_HEADER_ERROR, error::HDR_BAD_LENGTH, header.length.to_be_bytes().to_vec()),
                    consumed: length,
                }
            } else {
                DecodeOutcome::Message {
                    message: Message::Keepalive,
                    consumed: length,
                }
            }
        }
        TYPE_NOTIFICATION => match NotificationPacket::parse(body) {
            Some((packet, _)) => DecodeOutcome::Message {
                message: Message::Notification(packet),
                consumed: length,
            },
            None => DecodeOutcome::Error {
                error: NotifyError::new(error::MSG_HEADER_ERROR, error::HDR_BAD_LENGTH, header.length.to_be_bytes().to_vec()),
                consumed: length,
            },
        },
        TYPE_UPDATE => match UpdateMessage::parse(body) {
            Ok((msg, _)) => DecodeOutcome::Message {
                message: Message::Update(msg),
                consumed: length,
            },
            Err(error) => DecodeOutcome::Error { error, consumed: length },
        },
        _ => unreachable!("type already validated above"),
    }
}

fn decode_open(body: &[u8], local_id: Ipv4Addr, expected_peer_asn: u16, consumed: usize) -> DecodeOutcome {
    const OPEN_MIN_LEN: usize = 10;
    if body.len() < OPEN_MIN_LEN {
        return DecodeOutcome::Error {
            error: NotifyError::new(error::MSG_HEADER_ERROR, error::HDR_BAD_LENGTH, (consumed as u16).to_be_bytes().to_vec()),
            consumed,
        };
    }

    let (packet, _) = match OpenPacket::parse(body) {
        Some(parsed) => parsed,
        None => {
            return DecodeOutcome::Error {
                error: NotifyError::new(error::MSG_HEADER_ERROR, error::HDR_BAD_LENGTH, (consumed as u16).to_be_bytes().to_vec()),
                consumed,
            }
        }
    };

    if packet.version != open::BGP_VERSION {
        return DecodeOutcome::Error {
            error: NotifyError::new(error::OPEN_MESSAGE_ERROR, error::OPEN_UNSUPPORTED_VERSION, Vec::new()),
            consumed,
        };
    }

    if packet.asn != expected_peer_asn {
        return DecodeOutcome::Error {
            error: NotifyError::new(error::OPEN_MESSAGE_ERROR, error::OPEN_BAD_PEER_AS, Vec::new()),
            consumed,
        };
    }

    if packet.identifier == local_id {
        return DecodeOutcome::Error {
            error: NotifyError::new(error::OPEN_MESSAGE_ERROR, error::OPEN_BAD_BGP_IDENTIFIER, Vec::new()),
            consumed,
        };
    }

    if packet.hold_time == 1 || packet.hold_time == 2 {
        return DecodeOutcome::Error {
            error: NotifyError::new(error::OPEN_MESSAGE_ERROR, error::OPEN_UNACCEPTABLE_HOLD_TIME, Vec::new()),
            consumed,
        };
    }

    DecodeOutcome::Message {
        message: Message::Open(packet),
        consumed,
    }
}

pub use keepalive::encode_keepalive;
pub use notification::encode_notification;
pub use open::encode_open;
pub use update::encode_update;

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> Ipv4Addr {
        Ipv4Addr::new(1, 1, 1, 1)
    }

    #[test]
    fn decodes_keepalive() {
        let bytes = encode_keepalive();
        match decode(&bytes, local(), 65201) {
            DecodeOutcome::Message { message, consumed } => {
                assert_eq!(message, Message::Keepalive);
                assert_eq!(consumed, bytes.len());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn needs_more_on_partial_header() {
        let bytes = encode_keepalive();
        assert_eq!(decode(&bytes[..10], local(), 65201), DecodeOutcome::NeedMore);
    }

    #[test]
    fn needs_more_on_partial_body() {
        let bytes = encode_open(65201, 180, Ipv4Addr::new(2, 2, 2, 2), &[]);
        assert_eq!(decode(&bytes[..bytes.len() - 1], local(), 65201), DecodeOutcome::NeedMore);
    }

    #[test]
    fn rejects_bad_marker() {
        let mut bytes = encode_keepalive();
        bytes[0] = 0;
        match decode(&bytes, local(), 65201) {
            DecodeOutcome::Error { error, .. } => {
                assert_eq!(error.code, error::MSG_HEADER_ERROR);
                assert_eq!(error.subcode, error::HDR_NOT_SYNCHRONISED);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn rejects_open_with_mismatched_asn() {
        let bytes = encode_open(1, 180, Ipv4Addr::new(2, 2, 2, 2), &[]);
        match decode(&bytes, local(), 65201) {
            DecodeOutcome::Error { error, .. } => {
                assert_eq!(error.code, error::OPEN_MESSAGE_ERROR);
                assert_eq!(error.subcode, error::OPEN_BAD_PEER_AS);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn rejects_open_with_colliding_identifier() {
        let bytes = encode_open(65201, 180, local(), &[]);
        match decode(&bytes, local(), 65201) {
            DecodeOutcome::Error { error, .. } => {
                assert_eq!(error.subcode, error::OPEN_BAD_BGP_IDENTIFIER);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn rejects_open_with_unacceptable_hold_time() {
        let bytes = encode_open(65201, 1, Ipv4Addr::new(2, 2, 2, 2), &[]);
        match decode(&bytes, local(), 65201) {
            DecodeOutcome::Error { error, .. } => {
                assert_eq!(error.subcode, error::OPEN_UNACCEPTABLE_HOLD_TIME);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn decodes_valid_update() {
        let msg = UpdateMessage {
            withdrawn: vec![],
            path_attrs: vec![],
            nlri: vec!["10.1.0.0/16".parse().unwrap()],
        };
        let bytes = encode_update(&msg);
        match decode(&bytes, local(), 65201) {
            DecodeOutcome::Message { message, .. } => assert_eq!(message, Message::Update(msg)),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
