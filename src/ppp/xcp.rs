//! Generic LCP/IPCP/IPV6CP ("xCP") header and option-list parsing, shared by
//! the three network-control protocols PPP negotiates. Grounded on the
//! structural sanity checks `rnet_ppp_rx` runs before handing a frame to the
//! per-protocol handler in `rnet-ppp.c`.

use crate::error::{DiscardCode, DiscardResult};
use crate::packet::Packet;
use crate::util::be16;

pub const HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    ConfReq,
    ConfAck,
    ConfNak,
    ConfRej,
    TermReq,
    TermAck,
    CodeRej,
    EchoReq,
    EchoAck,
}

impl Code {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            1 => Some(Code::ConfReq),
            2 => Some(Code::ConfAck),
            3 => Some(Code::ConfNak),
            4 => Some(Code::ConfRej),
            5 => Some(Code::TermReq),
            6 => Some(Code::TermAck),
            7 => Some(Code::CodeRej),
            9 => Some(Code::EchoReq),
            10 => Some(Code::EchoAck),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Code::ConfReq => 1,
            Code::ConfAck => 2,
            Code::ConfNak => 3,
            Code::ConfRej => 4,
            Code::TermReq => 5,
            Code::TermAck => 6,
            Code::CodeRej => 7,
            Code::EchoReq => 9,
            Code::EchoAck => 10,
        }
    }
}

/// One parsed option from a CONF_REQ option list: `Type(1) ∥ Len(1) ∥
/// Value(Len-2)`.
#[derive(Debug, Clone)]
pub struct XcpOption {
    pub kind: u8,
    pub value: Vec<u8>,
}

/// A parsed xCP header: `Code(1) ∥ Id(1) ∥ Length(2) ∥ Options`.
#[derive(Debug, Clone)]
pub struct XcpHeader {
    pub code: Code,
    pub id: u8,
    pub length: u16,
    pub options: Vec<XcpOption>,
}

/// Parse and structurally validate an xCP frame occupying the packet's
/// entire current window. `Length` must be at least the header size and fit
/// within the bytes actually present; for `CONF_REQ`, options must tile
/// exactly to `Length - HEADER_LEN`.
pub fn parse(pkt: &Packet) -> DiscardResult<XcpHeader> {
    if pkt.meta.length < HEADER_LEN as u16 {
        return Err(DiscardCode::PppHeaderCorrupted);
    }
    let mut header = [0u8; HEADER_LEN];
    pkt.read(0, &mut header)?;
    let code = Code::from_u8(header[0]).ok_or(DiscardCode::PppXcpCodeUnsupported)?;
    let id = header[1];
    let length = be16(&header[2..4]);
    if length < HEADER_LEN as u16 || length > pkt.meta.length {
        return Err(DiscardCode::PppXcpParseError);
    }

    let mut options = Vec::new();
    if code == Code::ConfReq {
        let body_len = (length as usize) - HEADER_LEN;
        let mut body = vec![0u8; body_len];
        pkt.read(HEADER_LEN as u16, &mut body)?;
        let mut pos = 0;
        while pos < body.len() {
            if pos + 2 > body.len() {
                return Err(DiscardCode::PppXcpParseError);
            }
            let opt_type = body[pos];
            let opt_len = body[pos + 1] as usize;
            if opt_len < 2 || pos + opt_len > body.len() {
                return Err(DiscardCode::PppXcpParseError);
            }
            options.push(XcpOption {
                kind: opt_type,
                value: body[pos + 2..pos + opt_len].to_vec(),
            });
            pos += opt_len;
        }
        if pos != body.len() {
            return Err(DiscardCode::PppXcpParseError);
        }
    }

    Ok(XcpHeader {
        code,
        id,
        length,
        options,
    })
}

/// Build a CONF_REQ frame in place: `offset` must already have
/// `HEADER_LEN + options size` of headroom reserved by the caller.
pub fn build_conf_req(pkt: &mut Packet, id: u8, options: &[XcpOption]) -> DiscardResult<()> {
    let options_len: usize = options.iter().map(|o| 2 + o.value.len()).sum();
    let total = HEADER_LEN + options_len;
    pkt.prepend(total as u16)?;
    let mut header = [0u8; HEADER_LEN];
    header[0] = Code::ConfReq.to_u8();
    header[1] = id;
    header[2..4].copy_from_slice(&(total as u16).to_be_bytes());
    pkt.write(0, &header)?;
    let mut pos = HEADER_LEN as u16;
    for option in options {
        let mut bytes = vec![option.kind, 2 + option.value.len() as u8];
        bytes.extend_from_slice(&option.value);
        pkt.write(pos, &bytes)?;
        pos += bytes.len() as u16;
    }
    Ok(())
}

/// Turn a request frame into its acknowledgement reply in place: rewrite
/// `Code` only, leaving `Id`/options untouched (used both for CONF_ACK and
/// ECHO_ACK turnarounds).
pub fn rewrite_code(pkt: &mut Packet, new_code: Code) -> DiscardResult<()> {
    pkt.write(0, &[new_code.to_u8()])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xcp_packet(bytes: &[u8]) -> Packet {
        let mut pkt = Packet::new_buf(64);
        pkt.meta.offset = 16;
        pkt.meta.length = bytes.len() as u16;
        pkt.write(0, bytes).unwrap();
        pkt
    }

    #[test]
    fn parses_conf_req_with_one_option() {
        let pkt = xcp_packet(&[1, 7, 0, 10, 5, 6, 0x11, 0x11, 0x11, 0x11]);
        let header = parse(&pkt).unwrap();
        assert_eq!(header.code, Code::ConfReq);
        assert_eq!(header.id, 7);
        assert_eq!(header.options.len(), 1);
        assert_eq!(header.options[0].kind, 5);
        assert_eq!(header.options[0].value, vec![0x11, 0x11, 0x11, 0x11]);
    }

    #[test]
    fn rejects_option_list_not_summing_to_length() {
        let pkt = xcp_packet(&[1, 7, 0, 10, 5, 5, 0x11, 0x11, 0x11, 0x11]);
        assert_eq!(parse(&pkt), Err(DiscardCode::PppXcpParseError));
    }

    #[test]
    fn rejects_length_shorter_than_header() {
        let pkt = xcp_packet(&[2, 7, 0, 2]);
        assert_eq!(parse(&pkt), Err(DiscardCode::PppXcpParseError));
    }

    #[test]
    fn build_conf_req_round_trips_through_parse() {
        let mut pkt = Packet::new_buf(64);
        pkt.meta.offset = 32;
        pkt.meta.length = 0;
        let magic = XcpOption {
            kind: 5,
            value: 0x1111_1111u32.to_be_bytes().to_vec(),
        };
        build_conf_req(&mut pkt, 3, &[magic]).unwrap();
        let header = parse(&pkt).unwrap();
        assert_eq!(header.code, Code::ConfReq);
        assert_eq!(header.id, 3);
        assert_eq!(header.options.len(), 1);
    }
}
