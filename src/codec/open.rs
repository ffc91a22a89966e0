//! OPEN message body (spec.md §3, §4.1).

use std::net::Ipv4Addr;

use bytes::{BufMut, BytesMut};
use nom_derive::*;

use super::header::{Header, TYPE_OPEN};

pub const BGP_VERSION: u8 = 4;
/// Fixed portion of the OPEN body: version(1) + asn(2) + hold_time(2) +
/// identifier(4) + opt_params_len(1).
pub const OPEN_FIXED_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, NomBE)]
struct OpenFixed {
    version: u8,
    asn: u16,
    hold_time: u16,
    bgp_id: [u8; 4],
    opt_param_len: u8,
}

/// A single optional-parameter TLV. Parsed for completeness but never
/// acted upon (spec.md §1 Non-goals: no capability negotiation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptParam {
    pub param_type: u8,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenPacket {
    pub version: u8,
    pub asn: u16,
    pub hold_time: u16,
    pub identifier: Ipv4Addr,
    pub opt_params: Vec<OptParam>,
}

impl OpenPacket {
    /// Parses the OPEN body (bytes *after* the 19-byte header). Returns the
    /// packet plus the number of bytes consumed, or `None` if the fixed
    /// portion or a TLV runs past the end of `body`.
    pub fn parse(body: &[u8]) -> Option<(OpenPacket, usize)> {
        let (rest, fixed) = OpenFixed::parse_be(body).ok()?;
        let opt_len = fixed.opt_param_len as usize;
        if rest.len() < opt_len {
            return None;
        }
        let mut opt_params = Vec::new();
        let mut opts = &rest[..opt_len];
        while !opts.is_empty() {
            if opts.len() < 2 {
                return None;
            }
            let param_type = opts[0];
            let len = opts[1] as usize;
            if opts.len() < 2 + len {
                return None;
            }
            opt_params.push(OptParam {
                param_type,
                value: opts[2..2 + len].to_vec(),
            });
            opts = &opts[2 + len..];
        }
        let packet = OpenPacket {
            version: fixed.version,
            asn: fixed.asn,
            hold_time: fixed.hold_time,
            identifier: Ipv4Addr::from(fixed.bgp_id),
            opt_params,
        };
        Some((packet, OPEN_FIXED_LEN + opt_len))
    }
}

pub fn encode_open(asn: u16, hold_time: u16, identifier: Ipv4Addr, opt_params: &[u8]) -> BytesMut {
    let mut body = BytesMut::with_capacity(OPEN_FIXED_LEN + opt_params.len());
    body.put_u8(BGP_VERSION);
    body.put_u16(asn);
    body.put_u16(hold_time);
    body.put(&identifier.octets()[..]);
    body.put_u8(opt_params.len() as u8);
    body.put(opt_params);

    let header = Header::new(TYPE_OPEN, (super::header::HEADER_LEN + body.len()) as u16);
    let mut buf = BytesMut::with_capacity(header.length as usize);
    header.put(&mut buf);
    buf.put(body);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_open_without_params() {
        let id = Ipv4Addr::new(1, 1, 1, 1);
        let bytes = encode_open(65101, 180, id, &[]);
        let (parsed, consumed) = OpenPacket::parse(&bytes[super::super::header::HEADER_LEN..]).unwrap();
        assert_eq!(consumed, bytes.len() - super::super::header::HEADER_LEN);
        assert_eq!(parsed.version, 4);
        assert_eq!(parsed.asn, 65101);
        assert_eq!(parsed.hold_time, 180);
        assert_eq!(parsed.identifier, id);
        assert!(parsed.opt_params.is_empty());
    }

    #[test]
    fn round_trips_open_with_params() {
        let id = Ipv4Addr::new(2, 2, 2, 2);
        let mut params = BytesMut::new();
        params.put_u8(1);
        params.put_u8(2);
        params.put_u8(0xaa);
        params.put_u8(0xbb);
        let bytes = encode_open(65201, 90, id, &params);
        let (parsed, _) = OpenPacket::parse(&bytes[super::super::header::HEADER_LEN..]).unwrap();
        assert_eq!(parsed.opt_params.len(), 1);
        assert_eq!(parsed.opt_params[0].param_type, 1);
        assert_eq!(parsed.opt_params[0].value, vec![0xaa, 0xbb]);
    }

    #[test]
    fn truncated_opt_params_rejected() {
        let mut body = BytesMut::new();
        body.put_u8(4);
        body.put_u16(65101);
        body.put_u16(180);
        body.put(&[1u8, 1, 1, 1][..]);
        body.put_u8(5); // claims 5 bytes of opt params, supplies none
        assert!(OpenPacket::parse(&body).is_none());
    }
}
