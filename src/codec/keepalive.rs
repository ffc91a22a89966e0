//! KEEPALIVE message: a bare header, no body (spec.md §3).

use bytes::{BufMut, BytesMut};

use super::header::{Header, HEADER_LEN, TYPE_KEEPALIVE};

pub fn encode_keepalive() -> BytesMut {
    let header = Header::new(TYPE_KEEPALIVE, HEADER_LEN as u16);
    let mut buf = BytesMut::with_capacity(HEADER_LEN);
    header.put(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_exactly_header_length() {
        assert_eq!(encode_keepalive().len(), HEADER_LEN);
    }
}
