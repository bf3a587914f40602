//! IPv6 header parse/build. IPv6 carries no header checksum of its own —
//! correctness here rests entirely on the L4 pseudo-header checksum the UDP
//! and ICMPv6 steps compute.

use crate::config::{IpAddr, IPV6_HEADER_LEN};
use crate::error::{DiscardCode, DiscardResult};
use crate::ip::{PROTO_ICMPV6, PROTO_UDP};
use crate::packet::{Packet, PreviousPh};
use crate::util::be16;

#[derive(Debug, Clone, Copy)]
pub struct Ipv6Header {
    pub next_header: u8,
    pub src: IpAddr,
    pub dst: IpAddr,
}

/// Parse, validate, and strip a 40-byte IPv6 header from the window.
pub fn rx(pkt: &mut Packet) -> DiscardResult<Ipv6Header> {
    if (pkt.meta.length as usize) < IPV6_HEADER_LEN {
        return Err(DiscardCode::IpPacketTooSmall);
    }
    let mut header = [0u8; IPV6_HEADER_LEN];
    pkt.read(0, &mut header)?;

    let version = header[0] >> 4;
    if version != 6 {
        return Err(DiscardCode::IpPacketHeaderCorrupted);
    }
    let payload_length = be16(&header[4..6]) as usize;
    if IPV6_HEADER_LEN + payload_length > pkt.meta.length as usize {
        return Err(DiscardCode::IpPacketHeaderCorrupted);
    }

    let next_header = header[6];
    let mut src_bytes = [0u8; 16];
    src_bytes.copy_from_slice(&header[8..24]);
    let mut dst_bytes = [0u8; 16];
    dst_bytes.copy_from_slice(&header[24..40]);

    let total = IPV6_HEADER_LEN + payload_length;
    if total < pkt.meta.length as usize {
        pkt.shrink(pkt.meta.length - total as u16)?;
    }
    pkt.advance_offset(IPV6_HEADER_LEN as u16)?;
    pkt.meta.previous_ph = PreviousPh::Ipv6;
    let src = IpAddr::V6(src_bytes);
    let dst = IpAddr::V6(dst_bytes);
    pkt.meta.ip_src = src;
    pkt.meta.ip_dst = dst;

    Ok(Ipv6Header {
        next_header,
        src,
        dst,
    })
}

pub fn route(next_header: u8) -> DiscardResult<PreviousPh> {
    match next_header {
        PROTO_ICMPV6 => Ok(PreviousPh::Icmpv6),
        PROTO_UDP => Ok(PreviousPh::Udp),
        _ => Err(DiscardCode::IpUnsupportedL4),
    }
}

/// Prepend a 40-byte IPv6 header over the already-built L4 payload.
pub fn tx(pkt: &mut Packet, src: IpAddr, dst: IpAddr) -> DiscardResult<()> {
    let next_header = match pkt.meta.previous_ph {
        PreviousPh::Udp => PROTO_UDP,
        PreviousPh::Icmpv6 => PROTO_ICMPV6,
        _ => return Err(DiscardCode::IpPacketHeaderCorrupted),
    };
    let (src, dst) = match (src, dst) {
        (IpAddr::V6(s), IpAddr::V6(d)) => (s, d),
        _ => return Err(DiscardCode::IpPacketHeaderCorrupted),
    };

    let payload_length = pkt.meta.length;
    pkt.prepend(IPV6_HEADER_LEN as u16)?;

    let mut header = [0u8; IPV6_HEADER_LEN];
    header[0] = 0x60;
    header[4..6].copy_from_slice(&payload_length.to_be_bytes());
    header[6] = next_header;
    header[7] = 64;
    header[8..24].copy_from_slice(&src);
    header[24..40].copy_from_slice(&dst);

    pkt.write(0, &header)
}
