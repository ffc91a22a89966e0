//! UPDATE message body (spec.md §3).
//!
//! Path attributes are decoded generically — the attribute catalog (ORIGIN,
//! AS_PATH, NEXT_HOP, ...) is out of scope (spec.md §1 Non-goals: "route
//! attribute semantics"); only the framing is validated so that malformed
//! UPDATEs are still correctly rejected with a NOTIFICATION.

use bytes::{BufMut, BytesMut};
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

use super::error::{NotifyError, UPDATE_INVALID_NETWORK_FIELD, UPDATE_MALFORMED_ATTR_LIST};
use super::header::{Header, HEADER_LEN, TYPE_UPDATE};

pub const UPDATE_MESSAGE_ERROR: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathAttribute {
    pub flags: u8,
    pub type_code: u8,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateMessage {
    pub withdrawn: Vec<Ipv4Net>,
    pub path_attrs: Vec<PathAttribute>,
    pub nlri: Vec<Ipv4Net>,
}

const EXTENDED_LENGTH_FLAG: u8 = 0x10;

fn malformed(subcode: u8) -> NotifyError {
    NotifyError::new(UPDATE_MESSAGE_ERROR, subcode, Vec::new())
}

/// Decodes the length-prefixed-prefix encoding shared by the withdrawn
/// routes and NLRI fields: one byte of prefix length in bits, followed by
/// `ceil(bits / 8)` address bytes.
fn parse_prefix_list(mut data: &[u8]) -> Result<Vec<Ipv4Net>, NotifyError> {
    let mut out = Vec::new();
    while !data.is_empty() {
        let bit_len = data[0];
        if bit_len > 32 {
            return Err(malformed(UPDATE_INVALID_NETWORK_FIELD));
        }
        let byte_len = (bit_len as usize + 7) / 8;
        if data.len() < 1 + byte_len {
            return Err(malformed(UPDATE_INVALID_NETWORK_FIELD));
        }
        let mut octets = [0u8; 4];
        octets[..byte_len].copy_from_slice(&data[1..1 + byte_len]);
        let net = Ipv4Net::new(Ipv4Addr::from(octets), bit_len)
            .map_err(|_| malformed(UPDATE_INVALID_NETWORK_FIELD))?;
        out.push(net);
        data = &data[1 + byte_len..];
    }
    Ok(out)
}

fn encode_prefix_list(prefixes: &[Ipv4Net], buf: &mut BytesMut) {
    for net in prefixes {
        let bit_len = net.prefix_len();
        let byte_len = (bit_len as usize + 7) / 8;
        buf.put_u8(bit_len);
        buf.put(&net.addr().octets()[..byte_len]);
    }
}

fn parse_path_attrs(mut data: &[u8]) -> Result<Vec<PathAttribute>, NotifyError> {
    let mut out = Vec::new();
    while !data.is_empty() {
        if data.len() < 3 {
            return Err(malformed(UPDATE_MALFORMED_ATTR_LIST));
        }
        let flags = data[0];
        let type_code = data[1];
        let (len, header_len) = if flags & EXTENDED_LENGTH_FLAG != 0 {
            if data.len() < 4 {
                return Err(malformed(UPDATE_MALFORMED_ATTR_LIST));
            }
            (u16::from_be_bytes([data[2], data[3]]) as usize, 4)
        } else {
            (data[2] as usize, 3)
        };
        if data.len() < header_len + len {
            return Err(malformed(UPDATE_MALFORMED_ATTR_LIST));
        }
        out.push(PathAttribute {
            flags,
            type_code,
            value: data[header_len..header_len + len].to_vec(),
        });
        data = &data[header_len + len..];
    }
    Ok(out)
}

fn encode_path_attrs(attrs: &[PathAttribute], buf: &mut BytesMut) {
    for attr in attrs {
        buf.put_u8(attr.flags);
        buf.put_u8(attr.type_code);
        if attr.flags & EXTENDED_LENGTH_FLAG != 0 {
            buf.put_u16(attr.value.len() as u16);
        } else {
            buf.put_u8(attr.value.len() as u8);
        }
        buf.put(&attr.value[..]);
    }
}

impl UpdateMessage {
    pub fn parse(body: &[u8]) -> Result<(UpdateMessage, usize), NotifyError> {
        if body.len() < 2 {
            return Err(malformed(UPDATE_MALFORMED_ATTR_LIST));
        }
        let withdrawn_len = u16::from_be_bytes([body[0], body[1]]) as usize;
        let mut pos = 2;
        if body.len() < pos + withdrawn_len {
            return Err(malformed(UPDATE_INVALID_NETWORK_FIELD));
        }
        let withdrawn = parse_prefix_list(&body[pos..pos + withdrawn_len])?;
        pos += withdrawn_len;

        if body.len() < pos + 2 {
            return Err(malformed(UPDATE_MALFORMED_ATTR_LIST));
        }
        let attr_len = u16::from_be_bytes([body[pos], body[pos + 1]]) as usize;
        pos += 2;
        if body.len() < pos + attr_len {
            return Err(malformed(UPDATE_MALFORMED_ATTR_LIST));
        }
        let path_attrs = parse_path_attrs(&body[pos..pos + attr_len])?;
        pos += attr_len;

        let nlri = parse_prefix_list(&body[pos..])?;
        pos = body.len();

        Ok((
            UpdateMessage {
                withdrawn,
                path_attrs,
                nlri,
            },
            pos,
        ))
    }
}

pub fn encode_update(msg: &UpdateMessage) -> BytesMut {
    let mut withdrawn_buf = BytesMut::new();
    encode_prefix_list(&msg.withdrawn, &mut withdrawn_buf);
    let mut attrs_buf = BytesMut::new();
    encode_path_attrs(&msg.path_attrs, &mut attrs_buf);
    let mut nlri_buf = BytesMut::new();
    encode_prefix_list(&msg.nlri, &mut nlri_buf);

    let body_len = 2 + withdrawn_buf.len() + 2 + attrs_buf.len() + nlri_buf.len();
    let header = Header::new(TYPE_UPDATE, (HEADER_LEN + body_len) as u16);
    let mut buf = BytesMut::with_capacity(header.length as usize);
    header.put(&mut buf);
    buf.put_u16(withdrawn_buf.len() as u16);
    buf.put(withdrawn_buf);
    buf.put_u16(attrs_buf.len() as u16);
    buf.put(attrs_buf);
    buf.put(nlri_buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_empty_update() {
        let msg = UpdateMessage {
            withdrawn: vec![],
            path_attrs: vec![],
            nlri: vec![],
        };
        let bytes = encode_update(&msg);
        let (parsed, consumed) = UpdateMessage::parse(&bytes[HEADER_LEN..]).unwrap();
        assert_eq!(parsed, msg);
        assert_eq!(consumed, bytes.len() - HEADER_LEN);
    }

    #[test]
    fn round_trips_update_with_routes_and_attrs() {
        let msg = UpdateMessage {
            withdrawn: vec!["10.0.0.0/24".parse().unwrap()],
            path_attrs: vec![PathAttribute {
                flags: 0x40,
                type_code: 1,
                value: vec![0],
            }],
            nlri: vec!["192.168.1.0/24".parse().unwrap(), "172.16.0.0/16".parse().unwrap()],
        };
        let bytes = encode_update(&msg);
        let (parsed, _) = UpdateMessage::parse(&bytes[HEADER_LEN..]).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn rejects_oversized_prefix_length() {
        let data = [33u8, 1, 2, 3, 4];
        assert_eq!(
            parse_prefix_list(&data).unwrap_err().subcode,
            UPDATE_INVALID_NETWORK_FIELD
        );
    }

    #[test]
    fn rejects_truncated_path_attribute() {
        let data = [0x40u8, 1, 5, 0, 0];
        assert_eq!(
            parse_path_attrs(&data).unwrap_err().subcode,
            UPDATE_MALFORMED_ATTR_LIST
        );
    }
}
