//! PPP framing (C3): ACFC + Protocol field add/strip, sitting directly on
//! top of an AHDLC-deframed window. Grounded on `rnet-ppp.c`'s `rnet_ppp_rx`/
//! `rnet_ppp_tx` pair, generalized from a fixed Protocol switch on a raw
//! buffer to one keyed off [`Packet::meta::previous_ph`].

pub mod fsm;
pub mod xcp;

use crate::config::PPP_PREFIX_LENGTH;
use crate::error::{DiscardCode, DiscardResult};
use crate::packet::{Packet, PreviousPh};
use crate::util::{be16, put_be16};

const ACFC: [u8; 2] = [0xFF, 0x03];

/// PPP Protocol field values this core understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Lcp,
    Ipcp,
    Ipv6cp,
    Ipv4,
    Ipv6,
}

impl Protocol {
    pub fn code(self) -> u16 {
        match self {
            Protocol::Lcp => 0xC021,
            Protocol::Ipcp => 0x8021,
            Protocol::Ipv6cp => 0x8057,
            Protocol::Ipv4 => 0x0021,
            Protocol::Ipv6 => 0x0057,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0xC021 => Some(Protocol::Lcp),
            0x8021 => Some(Protocol::Ipcp),
            0x8057 => Some(Protocol::Ipv6cp),
            0x0021 => Some(Protocol::Ipv4),
            0x0057 => Some(Protocol::Ipv6),
            _ => None,
        }
    }

    fn previous_ph(self) -> PreviousPh {
        match self {
            Protocol::Lcp => PreviousPh::Lcp,
            Protocol::Ipcp => PreviousPh::Ipcp,
            Protocol::Ipv6cp => PreviousPh::Ipv6cp,
            Protocol::Ipv4 => PreviousPh::Ipv4,
            Protocol::Ipv6 => PreviousPh::Ipv6,
        }
    }

    fn from_previous_ph(ph: PreviousPh) -> Option<Self> {
        match ph {
            PreviousPh::Lcp => Some(Protocol::Lcp),
            PreviousPh::Ipcp => Some(Protocol::Ipcp),
            PreviousPh::Ipv6cp => Some(Protocol::Ipv6cp),
            PreviousPh::Ipv4 => Some(Protocol::Ipv4),
            PreviousPh::Ipv6 => Some(Protocol::Ipv6),
            _ => None,
        }
    }
}

/// Strip `ACFC ∥ Protocol` from the window, stamping `previous_ph` with the
/// matched protocol. Returns the matched [`Protocol`] so the caller knows
/// which handler to dispatch to next.
pub fn rx(pkt: &mut Packet) -> DiscardResult<Protocol> {
    if (pkt.meta.length as usize) < PPP_PREFIX_LENGTH {
        return Err(DiscardCode::PppHeaderCorrupted);
    }
    let mut header = [0u8; PPP_PREFIX_LENGTH];
    pkt.read(0, &mut header)?;
    if header[0..2] != ACFC {
        return Err(DiscardCode::PppHeaderCorrupted);
    }
    let protocol = Protocol::from_code(be16(&header[2..4]))
        .ok_or(DiscardCode::PppOtherProtocolUnsupported)?;
    pkt.advance_offset(PPP_PREFIX_LENGTH as u16)?;
    pkt.meta.previous_ph = protocol.previous_ph();
    Ok(protocol)
}

/// Prepend `ACFC ∥ Protocol`, deriving the Protocol from `previous_ph` (set
/// by whichever Tx step built the payload). Requires `offset >=
/// PPP_PREFIX_LENGTH` of headroom.
pub fn tx(pkt: &mut Packet) -> DiscardResult<()> {
    let protocol =
        Protocol::from_previous_ph(pkt.meta.previous_ph).ok_or(DiscardCode::PppHeaderCorrupted)?;
    if pkt.meta.offset < PPP_PREFIX_LENGTH as u16 {
        return Err(DiscardCode::Underrun);
    }
    pkt.prepend(PPP_PREFIX_LENGTH as u16)?;
    let mut header = [0u8; PPP_PREFIX_LENGTH];
    header[0..2].copy_from_slice(&ACFC);
    put_be16(&mut header[2..4], protocol.code());
    pkt.write(0, &header)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rx_then_tx_round_trips_lcp_frame() {
        let mut pkt = Packet::new_buf(64);
        pkt.meta.offset = 16;
        pkt.meta.length = 6;
        pkt.write(0, &[0xFF, 0x03, 0xC0, 0x21, 0xAA, 0xBB]).unwrap();
        let protocol = rx(&mut pkt).unwrap();
        assert_eq!(protocol, Protocol::Lcp);
        assert_eq!(pkt.meta.previous_ph, PreviousPh::Lcp);
        assert_eq!(pkt.to_vec(), vec![0xAA, 0xBB]);

        tx(&mut pkt).unwrap();
        assert_eq!(
            pkt.to_vec(),
            vec![0xFF, 0x03, 0xC0, 0x21, 0xAA, 0xBB]
        );
    }

    #[test]
    fn rx_rejects_unknown_protocol() {
        let mut pkt = Packet::new_buf(64);
        pkt.meta.offset = 16;
        pkt.meta.length = 4;
        pkt.write(0, &[0xFF, 0x03, 0x00, 0x01]).unwrap();
        assert_eq!(rx(&mut pkt), Err(DiscardCode::PppOtherProtocolUnsupported));
    }
}
