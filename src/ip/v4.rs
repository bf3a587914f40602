//! IPv4 header parse/build. Grounded on the fixed 20-byte layout
//! `rnet-udp.c`/`rnet-icmp.c` assume when they hand payload to the IP layer
//! (`options` are never produced and are rejected on Rx).

use crate::config::{IpAddr, IPV4_HEADER_LEN};
use crate::error::{DiscardCode, DiscardResult};
use crate::ip::{ipv4_header_checksum, PROTO_ICMP, PROTO_UDP};
use crate::packet::{Packet, PreviousPh};
use crate::util::be16;

#[derive(Debug, Clone, Copy)]
pub struct Ipv4Header {
    pub protocol: u8,
    pub src: IpAddr,
    pub dst: IpAddr,
}

/// Parse, validate, and strip a 20-byte IPv4 header from the window. Only
/// `ihl == 5` (no options) is accepted. Routes on the returned `protocol`.
pub fn rx(pkt: &mut Packet) -> DiscardResult<Ipv4Header> {
    if (pkt.meta.length as usize) < IPV4_HEADER_LEN {
        return Err(DiscardCode::IpPacketTooSmall);
    }
    let mut header = [0u8; IPV4_HEADER_LEN];
    pkt.read(0, &mut header)?;

    let version = header[0] >> 4;
    let ihl = header[0] & 0x0F;
    if version != 4 || ihl != 5 {
        return Err(DiscardCode::IpPacketHeaderCorrupted);
    }
    let total_length = be16(&header[2..4]) as usize;
    if total_length > pkt.meta.length as usize {
        return Err(DiscardCode::IpPacketHeaderCorrupted);
    }
    if ipv4_header_checksum(&header) != 0 {
        return Err(DiscardCode::IpPacketHeaderCorrupted);
    }

    let protocol = header[9];
    let src = IpAddr::V4([header[12], header[13], header[14], header[15]]);
    let dst = IpAddr::V4([header[16], header[17], header[18], header[19]]);

    if total_length < pkt.meta.length as usize {
        pkt.shrink(pkt.meta.length - total_length as u16)?;
    }
    pkt.advance_offset(IPV4_HEADER_LEN as u16)?;
    pkt.meta.previous_ph = PreviousPh::Ipv4;
    pkt.meta.ip_src = src;
    pkt.meta.ip_dst = dst;

    Ok(Ipv4Header {
        protocol,
        src,
        dst,
    })
}

/// Routes protocol 1/17 to the ICMP/UDP next steps; anything else is an
/// unsupported-L4 discard.
pub fn route(protocol: u8) -> DiscardResult<PreviousPh> {
    match protocol {
        PROTO_ICMP => Ok(PreviousPh::Icmp),
        PROTO_UDP => Ok(PreviousPh::Udp),
        _ => Err(DiscardCode::IpUnsupportedL4),
    }
}

/// Prepend a 20-byte IPv4 header over the already-built L4 payload,
/// computing and filling the header checksum. `previous_ph` (set by the L4
/// Tx step) selects the outgoing protocol number.
pub fn tx(pkt: &mut Packet, src: IpAddr, dst: IpAddr) -> DiscardResult<()> {
    let protocol = match pkt.meta.previous_ph {
        PreviousPh::Udp => PROTO_UDP,
        PreviousPh::Icmp => PROTO_ICMP,
        _ => return Err(DiscardCode::IpPacketHeaderCorrupted),
    };
    let (src, dst) = match (src, dst) {
        (IpAddr::V4(s), IpAddr::V4(d)) => (s, d),
        _ => return Err(DiscardCode::IpPacketHeaderCorrupted),
    };

    pkt.prepend(IPV4_HEADER_LEN as u16)?;
    let total_length = pkt.meta.length;

    let mut header = [0u8; IPV4_HEADER_LEN];
    header[0] = 0x45;
    header[1] = 0;
    header[2..4].copy_from_slice(&total_length.to_be_bytes());
    header[4..6].copy_from_slice(&0u16.to_be_bytes());
    header[6..8].copy_from_slice(&0u16.to_be_bytes());
    header[8] = 64;
    header[9] = protocol;
    header[10..12].copy_from_slice(&0u16.to_be_bytes());
    header[12..16].copy_from_slice(&src);
    header[16..20].copy_from_slice(&dst);

    let checksum = ipv4_header_checksum(&header);
    header[10..12].copy_from_slice(&checksum.to_be_bytes());

    pkt.write(0, &header)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_datagram(payload: &[u8]) -> Vec<u8> {
        let mut pkt = Packet::new_buf(128);
        pkt.meta.offset = 64;
        pkt.meta.length = payload.len() as u16;
        pkt.write(0, payload).unwrap();
        pkt.meta.previous_ph = PreviousPh::Udp;
        tx(&mut pkt, IpAddr::V4([10, 0, 0, 1]), IpAddr::V4([10, 0, 0, 2])).unwrap();
        pkt.to_vec()
    }

    #[test]
    fn tx_then_rx_recovers_protocol_and_addresses() {
        let wire = build_datagram(&[1, 2, 3, 4]);
        let mut pkt = Packet::new_buf(128);
        pkt.meta.offset = 32;
        pkt.meta.length = wire.len() as u16;
        pkt.write(0, &wire).unwrap();

        let header = rx(&mut pkt).unwrap();
        assert_eq!(header.protocol, PROTO_UDP);
        assert_eq!(header.src, IpAddr::V4([10, 0, 0, 1]));
        assert_eq!(header.dst, IpAddr::V4([10, 0, 0, 2]));
        assert_eq!(pkt.to_vec(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn rx_rejects_corrupted_checksum() {
        let wire = build_datagram(&[1, 2, 3, 4]);
        let mut pkt = Packet::new_buf(128);
        pkt.meta.offset = 32;
        pkt.meta.length = wire.len() as u16;
        pkt.write(0, &wire).unwrap();
        pkt.write(10, &[0xAA, 0xBB]).unwrap();
        assert_eq!(rx(&mut pkt), Err(DiscardCode::IpPacketHeaderCorrupted));
    }

    #[test]
    fn rx_rejects_too_small_window() {
        let mut pkt = Packet::new_buf(64);
        pkt.meta.offset = 16;
        pkt.meta.length = 10;
        assert_eq!(rx(&mut pkt), Err(DiscardCode::IpPacketTooSmall));
    }
}
