//! End-to-end scenarios exercising the assembled crate's public surface:
//! AHDLC framing, the IPv4 header checksum, a full UDP Rx/demux/listener
//! round trip through `Stack`, ICMPv4 echo turnaround, PPP bring-up through
//! the link-control state machine, and XCP option-list rejection.

use rnet_core::ahdlc;
use rnet_core::config::{
    Acquisition, CircuitConfig, InterfaceConfig, InterfaceOptions, IpAddr, L2Kind, StackLimits,
    SubInterfaceConfig, TrafficKind,
};
use rnet_core::error::DiscardCode;
use rnet_core::icmp;
use rnet_core::ip::{ipv4_header_checksum, l4_checksum_ipv4, v4, PROTO_UDP};
use rnet_core::ppp::fsm::{Action, Event, Ncp, PppFsm, State};
use rnet_core::ppp::xcp::{self, Code, XcpOption};
use rnet_core::packet::{Packet, PreviousPh};
use rnet_core::udp;
use rnet_core::Stack;

/// S1 — CRC-16/X.25 golden vector: append then verify recovers the original
/// body and strips the trailer back off.
#[test]
fn s1_crc16_golden_vector_round_trips() {
    let body: [u8; 10] = [0x01, 0x02, 0x7E, 0x03, 0x04, 0x05, 0x7D, 0x7E, 0x06, 0x7E];
    let mut pkt = Packet::new_buf(64);
    pkt.meta.offset = 16;
    pkt.meta.length = body.len() as u16;
    pkt.write(0, &body).unwrap();

    ahdlc::append_crc(&mut pkt).unwrap();
    assert_eq!(pkt.meta.length, 12);

    ahdlc::verify_crc(&mut pkt).unwrap();
    assert_eq!(pkt.meta.length, 10);
    assert_eq!(pkt.to_vec(), body);
}

/// S2 — IPv4 header checksum: a valid header sums to zero once folded, and
/// zeroing the checksum field recovers the specific value that fills it.
#[test]
fn s2_ipv4_header_checksum_matches_known_value() {
    let mut header: [u8; 20] = [
        0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0xb8, 0x61, 0xc0, 0xa8, 0x00,
        0x01, 0xc0, 0xa8, 0x00, 0xc7,
    ];
    assert_eq!(ipv4_header_checksum(&header), 0);

    header[10] = 0;
    header[11] = 0;
    assert_eq!(ipv4_header_checksum(&header), 0xb861);
}

/// S3 — IPv4/UDP Rx: a datagram addressed to a learned sub-interface and a
/// server-mode circuit demuxes to the registered listener with its payload
/// intact and `previous_ph == Udp`.
#[test]
fn s3_ipv4_udp_rx_demuxes_to_listener() {
    let client = IpAddr::V4([192, 168, 2, 145]);
    let server = IpAddr::V4([192, 168, 1, 1]);
    let payload = vec![0x5Au8; 42];

    let limits = StackLimits {
        num_static_circuits: 1,
        num_spare_circuits: 1,
        ..Default::default()
    };
    let interfaces = vec![InterfaceConfig {
        l2: L2Kind::Ppp,
        options: InterfaceOptions::PRE_TRANSLATED | InterfaceOptions::PRE_CRC_VERIFIED,
        sub_interfaces: vec![SubInterfaceConfig {
            kind: TrafficKind::Ipv4Unicast,
            acquisition: Acquisition::Learned,
            prefix_length: 24,
            literal_address: None,
        }],
    }];
    let mut stack = Stack::new(limits, interfaces);
    let circuit_idx = stack
        .circuit_add(CircuitConfig {
            kind: TrafficKind::Ipv4Unicast,
            self_port: 53,
            peer_port: 0,
            sub_interface: 0,
            peer_address: client,
            listener_msg_fields: 1,
            listener_task: Some(1),
        })
        .unwrap();

    // PRE_TRANSLATED|PRE_CRC_VERIFIED skips AHDLC framing but still expects
    // a PPP (ACFC + Protocol) header ahead of the IPv4 datagram.
    let mut pkt = Packet::new_buf(256);
    pkt.meta.offset = 100;
    pkt.meta.length = payload.len() as u16;
    pkt.write(0, &payload).unwrap();
    pkt.meta.previous_ph = PreviousPh::Udp;

    let peer_view = CircuitConfig {
        kind: TrafficKind::Ipv4Unicast,
        self_port: 1560,
        peer_port: 53,
        sub_interface: 0,
        peer_address: server,
        listener_msg_fields: rnet_core::config::LISTENER_DISABLED,
        listener_task: None,
    };
    udp::tx(&mut pkt, &peer_view, 0, 0, &client, &server, false).unwrap();
    v4::tx(&mut pkt, client, server).unwrap();
    rnet_core::ppp::tx(&mut pkt).unwrap();
    let wire = pkt.to_vec();

    stack.rx_bytes(0, &wire);
    let mut deliveries = stack.drain_deliveries();
    assert_eq!(deliveries.len(), 1);
    let delivery = deliveries.pop().unwrap();
    assert_eq!(delivery.packet.meta.previous_ph, PreviousPh::Udp);
    assert_eq!(delivery.packet.meta.circuit, circuit_idx);
    assert_eq!(delivery.packet.meta.length, payload.len() as u16);
    assert_eq!(delivery.packet.to_vec(), payload);
    stack.free(delivery.packet);
}

/// S3b — a checksum mismatch on an otherwise well-formed datagram is
/// rejected before it ever reaches a listener.
#[test]
fn s3b_udp_rx_rejects_bad_checksum() {
    let src = IpAddr::V4([10, 0, 0, 9]);
    let dst = IpAddr::V4([10, 0, 0, 1]);
    let datagram_len = rnet_core::config::UDP_HEADER_LEN + 3;
    let mut datagram = vec![0u8; datagram_len];
    datagram[0..2].copy_from_slice(&9000u16.to_be_bytes());
    datagram[2..4].copy_from_slice(&53u16.to_be_bytes());
    datagram[4..6].copy_from_slice(&(datagram_len as u16).to_be_bytes());
    let checksum = l4_checksum_ipv4(&src, &dst, PROTO_UDP, &datagram);
    datagram[6..8].copy_from_slice(&checksum.to_be_bytes());
    datagram[7] ^= 0xFF; // corrupt

    let mut pkt = Packet::new_buf(64);
    pkt.meta.offset = 16;
    pkt.meta.length = datagram.len() as u16;
    pkt.write(0, &datagram).unwrap();
    assert_eq!(
        udp::rx(&mut pkt, &src, &dst, false),
        Err(DiscardCode::IpRxBadCrc)
    );
}

/// S4 — ICMPv4 echo turnaround: identifier/sequence survive, type flips to
/// reply, checksum is recomputed, and the reply is marked for the
/// swap-src-dest Tx path.
#[test]
fn s4_icmpv4_echo_turns_into_reply() {
    let id: u16 = 1;
    let seq: u16 = 0x01a7;
    let mut body = vec![8, 0, 0, 0]; // type=echo-request, code=0, checksum=0
    body.extend_from_slice(&id.to_be_bytes());
    body.extend_from_slice(&seq.to_be_bytes());
    let checksum = rnet_core::ip::icmpv4_checksum(&body);
    body[2..4].copy_from_slice(&checksum.to_be_bytes());

    let mut pkt = Packet::new_buf(64);
    pkt.meta.offset = 16;
    pkt.meta.length = body.len() as u16;
    pkt.write(0, &body).unwrap();

    let handled = icmp::rx_v4(&mut pkt).unwrap();
    assert!(handled);

    let reply = pkt.to_vec();
    assert_eq!(reply[0], 0); // echo reply
    assert_eq!(reply[1], 0);
    assert_eq!(&reply[4..6], &id.to_be_bytes());
    assert_eq!(&reply[6..8], &seq.to_be_bytes());
    assert_eq!(rnet_core::ip::icmpv4_checksum(&reply), 0);
    assert_eq!(pkt.meta.circuit, rnet_core::config::SWAP_SRC_DEST);
}

/// S5 — PPP bring-up: with IPCP enabled and IPV6CP disabled, the given event
/// sequence reaches `Up` emitting exactly one `EmitUp`, and a subsequent
/// terminate-request while `Up` acks, emits `EmitDown`, and returns to
/// `Recovery`.
#[test]
fn s5_ppp_bring_up_reaches_up_exactly_once() {
    let mut fsm = PppFsm::new(InterfaceOptions::PPP_IPCP);
    let mut up_count = 0;

    fsm.handle(Event::Init);
    assert_eq!(fsm.state(), State::Recovery);

    fsm.handle(Event::TimeoutRecovery);
    assert_eq!(fsm.state(), State::Recovery);
    fsm.handle(Event::TimeoutRecovery);
    assert_eq!(fsm.state(), State::Recovery);
    let outcome = fsm.handle(Event::TimeoutRecovery);
    assert_eq!(fsm.state(), State::Probing);
    assert_eq!(outcome.actions, vec![Action::SendConfReq(Ncp::Lcp)]);

    fsm.handle(Event::TimeoutProbing);
    assert_eq!(fsm.state(), State::Probing);

    let outcome = fsm.handle(Event::RxConfReq(Ncp::Lcp));
    assert_eq!(fsm.state(), State::Negotiating);
    if outcome.actions.contains(&Action::EmitUp) {
        up_count += 1;
    }

    let outcome = fsm.handle(Event::RxConfAck(Ncp::Lcp));
    assert_eq!(fsm.state(), State::Negotiating);
    if outcome.actions.contains(&Action::EmitUp) {
        up_count += 1;
    }

    let outcome = fsm.handle(Event::RxConfReq(Ncp::Ipcp));
    assert_eq!(fsm.state(), State::Negotiating);
    if outcome.actions.contains(&Action::EmitUp) {
        up_count += 1;
    }

    let outcome = fsm.handle(Event::RxConfAck(Ncp::Ipcp));
    assert_eq!(fsm.state(), State::Up);
    assert!(outcome.actions.contains(&Action::EmitUp));
    if outcome.actions.contains(&Action::EmitUp) {
        up_count += 1;
    }

    assert_eq!(up_count, 1, "EmitUp must fire exactly once across bring-up");

    let outcome = fsm.handle(Event::RxTerminateReq);
    assert_eq!(fsm.state(), State::Recovery);
    assert!(outcome.send_ack);
    assert!(outcome.actions.contains(&Action::EmitDown));
}

/// S6 — XCP parse rejects an option list whose lengths don't tile exactly to
/// the declared frame length, and accepts one that does.
#[test]
fn s6_xcp_parse_rejects_malformed_option_list() {
    // length=10 (header 4 + 6 bytes of options) but the one option's stated
    // length only accounts for 5 of those 6 bytes.
    let pkt = xcp_packet(&[1, 1, 0, 10, 5, 5, 0x11, 0x11, 0x11, 0x11]);
    assert_eq!(xcp::parse(&pkt), Err(DiscardCode::PppXcpParseError));

    // Same frame, option length corrected to consume all 6 remaining bytes.
    let pkt = xcp_packet(&[1, 1, 0, 10, 5, 6, 0x11, 0x11, 0x11, 0x11]);
    let header = xcp::parse(&pkt).unwrap();
    assert_eq!(header.code, Code::ConfReq);
    assert_eq!(header.options.len(), 1);
}

#[test]
fn s6_build_conf_req_round_trips_through_parse() {
    let mut pkt = Packet::new_buf(64);
    pkt.meta.offset = 32;
    pkt.meta.length = 0;
    let magic = XcpOption {
        kind: 5,
        value: 0xDEAD_BEEFu32.to_be_bytes().to_vec(),
    };
    xcp::build_conf_req(&mut pkt, 1, &[magic]).unwrap();
    let header = xcp::parse(&pkt).unwrap();
    assert_eq!(header.code, Code::ConfReq);
    assert_eq!(header.options[0].value, 0xDEAD_BEEFu32.to_be_bytes());
}

fn xcp_packet(bytes: &[u8]) -> Packet {
    let mut pkt = Packet::new_buf(64);
    pkt.meta.offset = 16;
    pkt.meta.length = bytes.len() as u16;
    pkt.write(0, bytes).unwrap();
    pkt
}
