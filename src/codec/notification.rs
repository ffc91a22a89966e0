//! NOTIFICATION message body (spec.md §3, §6).

use bytes::{BufMut, BytesMut};

use super::error::NotifyError;
use super::header::{Header, HEADER_LEN, TYPE_NOTIFICATION};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPacket {
    pub code: u8,
    pub subcode: u8,
    pub data: Vec<u8>,
}

impl NotificationPacket {
    /// Parses the NOTIFICATION body (bytes after the header). The body must
    /// be at least 2 bytes (code + subcode); anything beyond is opaque data.
    pub fn parse(body: &[u8]) -> Option<(NotificationPacket, usize)> {
        if body.len() < 2 {
            return None;
        }
        Some((
            NotificationPacket {
                code: body[0],
                subcode: body[1],
                data: body[2..].to_vec(),
            },
            body.len(),
        ))
    }

    pub fn from_error(err: &NotifyError) -> Self {
        Self {
            code: err.code,
            subcode: err.subcode,
            data: err.data.clone(),
        }
    }
}

pub fn encode_notification(code: u8, subcode: u8, data: &[u8]) -> BytesMut {
    let body_len = 2 + data.len();
    let header = Header::new(TYPE_NOTIFICATION, (HEADER_LEN + body_len) as u16);
    let mut buf = BytesMut::with_capacity(header.length as usize);
    header.put(&mut buf);
    buf.put_u8(code);
    buf.put_u8(subcode);
    buf.put(data);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_notification_with_data() {
        let bytes = encode_notification(3, 10, &[1, 2, 3]);
        let (parsed, consumed) = NotificationPacket::parse(&bytes[HEADER_LEN..]).unwrap();
        assert_eq!(consumed, 5);
        assert_eq!(parsed.code, 3);
        assert_eq!(parsed.subcode, 10);
        assert_eq!(parsed.data, vec![1, 2, 3]);
    }

    #[test]
    fn rejects_body_shorter_than_two_bytes() {
        assert!(NotificationPacket::parse(&[6]).is_none());
    }
}
