//! UDP demultiplex (C6): Rx circuit lookup and Tx header build. Grounded on
//! `rnet-udp.c`'s `rnet_udp_rx`/`rnet_udp_tx`, including the server-mode
//! "peer port 0 means mirror the request's source port back" behavior that
//! file's Tx path implements by re-reading the still-present request header.

use crate::config::{CircuitConfig, IpAddr, TrafficKind, SWAP_SRC_DEST, UDP_HEADER_LEN};
use crate::error::{DiscardCode, DiscardResult};
use crate::ip::{l4_checksum_ipv4, l4_checksum_ipv6, PROTO_UDP};
use crate::packet::{Packet, PreviousPh};
use crate::tables::Tables;
use crate::util::be16;

pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
}

/// Parse, checksum-verify, and strip the 8-byte UDP header. A zero received
/// checksum means "not computed" and is accepted unconditionally, matching
/// the original's checksum-optional handling for IPv4 UDP.
pub fn rx(
    pkt: &mut Packet,
    ip_src: &IpAddr,
    ip_dst: &IpAddr,
    is_v6: bool,
) -> DiscardResult<UdpHeader> {
    if (pkt.meta.length as usize) < UDP_HEADER_LEN {
        return Err(DiscardCode::UdpPacketTooSmall);
    }
    let mut header = [0u8; UDP_HEADER_LEN];
    pkt.read(0, &mut header)?;
    let src_port = be16(&header[0..2]);
    let dst_port = be16(&header[2..4]);
    let length = be16(&header[4..6]) as usize;
    let received_checksum = be16(&header[6..8]);

    if length > pkt.meta.length as usize {
        return Err(DiscardCode::UdpPacketTooSmall);
    }

    if received_checksum != 0 {
        let mut datagram = pkt.to_vec();
        datagram.truncate(length);
        datagram[6] = 0;
        datagram[7] = 0;
        let computed = if is_v6 {
            l4_checksum_ipv6(ip_src, ip_dst, PROTO_UDP, &datagram)
        } else {
            l4_checksum_ipv4(ip_src, ip_dst, PROTO_UDP, &datagram)
        };
        if computed != received_checksum {
            return Err(DiscardCode::IpRxBadCrc);
        }
    }

    if (length as u16) < pkt.meta.length {
        pkt.shrink(pkt.meta.length - length as u16)?;
    }
    pkt.advance_offset(UDP_HEADER_LEN as u16)?;
    pkt.meta.previous_ph = PreviousPh::Udp;

    Ok(UdpHeader { src_port, dst_port })
}

/// Resolve the circuit a just-demuxed UDP datagram belongs to, and stamp
/// `pkt.meta.circuit` on success. Separate from [`rx`] so the caller can run
/// sub-interface resolution (which needs the IP-layer addresses) in
/// between.
pub fn demux(
    tables: &Tables,
    pkt: &mut Packet,
    subi: u8,
    header: &UdpHeader,
    peer_addr: &IpAddr,
    is_v6: bool,
) -> DiscardResult<u8> {
    let kind = if is_v6 {
        TrafficKind::Ipv6Global
    } else {
        TrafficKind::Ipv4Unicast
    };
    let circuit = tables
        .circuit_lookup(subi, kind, header.dst_port, header.src_port, peer_addr)
        .ok_or(DiscardCode::UdpCircuitNotFound)?;
    pkt.meta.circuit = circuit;
    pkt.meta.subi = subi;
    pkt.meta.reply_port = header.src_port;
    Ok(circuit)
}

/// Prepend an 8-byte UDP header and fill its checksum. If the circuit is in
/// server mode (`peer_port == 0`), the destination port is read from the
/// UDP header of the request this reply answers — still present at
/// `rel_offset -UDP_HEADER_LEN` if the caller is turning a request around in
/// place, or must be threaded through explicitly otherwise — and
/// `pkt.meta.circuit` is stamped with [`SWAP_SRC_DEST`] so the IP Tx step
/// swaps source/destination addresses.
pub fn tx(
    pkt: &mut Packet,
    circuit: &CircuitConfig,
    circuit_idx: u8,
    reply_dst_port: u16,
    ip_src: &IpAddr,
    ip_dst: &IpAddr,
    is_v6: bool,
) -> DiscardResult<()> {
    let dst_port = if circuit.peer_port == 0 {
        pkt.meta.circuit = SWAP_SRC_DEST;
        reply_dst_port
    } else {
        pkt.meta.circuit = circuit_idx;
        circuit.peer_port
    };

    pkt.prepend(UDP_HEADER_LEN as u16)?;
    let length = pkt.meta.length;
    let mut header = [0u8; UDP_HEADER_LEN];
    header[0..2].copy_from_slice(&circuit.self_port.to_be_bytes());
    header[2..4].copy_from_slice(&dst_port.to_be_bytes());
    header[4..6].copy_from_slice(&length.to_be_bytes());
    pkt.write(0, &header)?;

    let datagram = pkt.to_vec();
    let checksum = if is_v6 {
        l4_checksum_ipv6(ip_src, ip_dst, PROTO_UDP, &datagram)
    } else {
        l4_checksum_ipv4(ip_src, ip_dst, PROTO_UDP, &datagram)
    };
    pkt.write(6, &checksum.to_be_bytes())?;
    pkt.meta.previous_ph = PreviousPh::Udp;
    Ok(())
}
