//! ICMPv4/ICMPv6 echo turnaround (C7). Grounded on `rnet-icmp.c`'s
//! `rnet_icmp_rx`, which rewrites an echo request into its reply in place
//! rather than building a fresh packet.

use crate::error::{DiscardCode, DiscardResult};
use crate::ip::icmpv4_checksum;
use crate::ip::{l4_checksum_ipv6, PROTO_ICMPV6};
use crate::config::{IpAddr, SWAP_SRC_DEST};
use crate::packet::{Packet, PreviousPh};

const ICMP_ECHO_REQUEST: u8 = 8;
const ICMP_ECHO_REPLY: u8 = 0;
const ICMPV6_ECHO_REQUEST: u8 = 128;
const ICMPV6_ECHO_REPLY: u8 = 129;

/// Turn an ICMPv4 echo request around into an echo reply in place. Any
/// other type is silently discarded (not an error the caller logs — just a
/// drop).
pub fn rx_v4(pkt: &mut Packet) -> DiscardResult<bool> {
    if pkt.meta.length < 4 {
        return Err(DiscardCode::IpPacketTooSmall);
    }
    let mut type_code = [0u8; 1];
    pkt.read(0, &mut type_code)?;
    if type_code[0] != ICMP_ECHO_REQUEST {
        return Ok(false);
    }

    pkt.write(0, &[ICMP_ECHO_REPLY])?;
    pkt.write(1, &[0])?;
    pkt.write(2, &[0, 0])?;

    let body = pkt.to_vec();
    let checksum = icmpv4_checksum(&body);
    pkt.write(2, &checksum.to_be_bytes())?;

    pkt.meta.previous_ph = PreviousPh::Icmp;
    pkt.meta.circuit = SWAP_SRC_DEST;
    Ok(true)
}

/// Turn an ICMPv6 echo request around into an echo reply in place, swapping
/// type/checksum; `src`/`dst` are the IPv6 addresses from the packet
/// *before* the swap (the pre-swap source becomes the post-swap
/// destination, so the checksum pseudo-header must use the unswapped pair
/// with src/dst reversed the same way IP Tx will reverse them).
pub fn rx_v6(pkt: &mut Packet, ip_src: &IpAddr, ip_dst: &IpAddr) -> DiscardResult<bool> {
    if pkt.meta.length < 4 {
        return Err(DiscardCode::IpPacketTooSmall);
    }
    let mut type_code = [0u8; 1];
    pkt.read(0, &mut type_code)?;
    if type_code[0] != ICMPV6_ECHO_REQUEST {
        return Ok(false);
    }

    pkt.write(0, &[ICMPV6_ECHO_REPLY])?;
    pkt.write(1, &[0])?;
    pkt.write(2, &[0, 0])?;

    let body = pkt.to_vec();
    // Reply travels dst -> src, so the pseudo-header source/destination are
    // the swap of what was received.
    let checksum = l4_checksum_ipv6(ip_dst, ip_src, PROTO_ICMPV6, &body);
    pkt.write(2, &checksum.to_be_bytes())?;

    pkt.meta.previous_ph = PreviousPh::Icmpv6;
    pkt.meta.circuit = SWAP_SRC_DEST;
    Ok(true)
}
