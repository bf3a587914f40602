//! Stands up one PPP interface over a loopback "serial" pair (in place of a
//! real UART), brings PPP up, and round-trips a UDP echo request through it.
//! Grounded on the static table shapes in `rnet-app.c` (one PPP interface,
//! IPv4 sub-interfaces, a UDP circuit in server mode) and the bring-up flow
//! exercised by `tests/qemu/rnet-app.c`, reduced to what this core actually
//! negotiates (no IPCP/IPV6CP address assignment — see `SPEC_FULL.md`'s
//! Non-goals) and adapted to a single process by looping the Tx driver's
//! output straight back into `rx_bytes`.

use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, TryRecvError};

use rnet_core::ahdlc;
use rnet_core::config::{
    Acquisition, CircuitConfig, InterfaceConfig, InterfaceOptions, IpAddr, L2Kind, StackLimits,
    SubInterfaceConfig, TrafficKind,
};
use rnet_core::events::{EventKind, Subscriber};
use rnet_core::ip::v4;
use rnet_core::log_bridge::{self, Component};
use rnet_core::ppp::{self, fsm};
use rnet_core::udp;
use rnet_core::packet::{Packet, PreviousPh};
use rnet_core::Stack;

const CLIENT_ADDR: IpAddr = IpAddr::V4([10, 0, 0, 9]);
const SERVER_ADDR: IpAddr = IpAddr::V4([10, 0, 0, 1]);
const SERVER_PORT: u16 = 9000;

/// Build an IPv4/UDP/PPP/AHDLC wire frame entirely by hand, the way an
/// external peer's bytes would arrive on the wire. Reuses the crate's own Tx
/// helpers in the order the real dispatcher chains them, since there's no
/// second stack in this process to act as that peer.
fn build_request_frame(payload: &[u8]) -> Vec<u8> {
    let peer_view = CircuitConfig {
        kind: TrafficKind::Ipv4Unicast,
        self_port: 23456,
        peer_port: SERVER_PORT,
        sub_interface: 0,
        peer_address: SERVER_ADDR,
        listener_msg_fields: 1,
        listener_task: Some(1),
    };

    let mut pkt = Packet::new_buf(256);
    pkt.meta.offset = 100;
    pkt.meta.length = payload.len() as u16;
    pkt.write(0, payload).expect("payload fits");
    pkt.meta.previous_ph = PreviousPh::Udp;

    udp::tx(&mut pkt, &peer_view, 0, 0, &CLIENT_ADDR, &SERVER_ADDR, false)
        .expect("udp tx");
    v4::tx(&mut pkt, CLIENT_ADDR, SERVER_ADDR).expect("ipv4 tx");
    ppp::tx(&mut pkt).expect("ppp tx");
    ahdlc::tx_frame(&mut pkt).expect("ahdlc tx");
    pkt.to_vec()
}

fn main() {
    env_logger::init();

    let limits = StackLimits {
        num_static_circuits: 1,
        num_spare_circuits: 1,
        ..Default::default()
    };
    let interfaces = vec![InterfaceConfig {
        l2: L2Kind::Ppp,
        options: InterfaceOptions::empty(),
        sub_interfaces: vec![SubInterfaceConfig {
            kind: TrafficKind::Ipv4Unicast,
            acquisition: Acquisition::Learned,
            prefix_length: 24,
            literal_address: None,
        }],
    }];

    let mut stack = Stack::new(limits, interfaces);

    // Loopback "wire": the Tx driver pushes framed bytes here instead of to
    // a real UART; the main loop below reads them back and re-injects them
    // on Rx, standing in for a serial cable with both ends on this process.
    let (wire_tx, wire_rx) = unbounded::<Vec<u8>>();
    stack.set_tx_driver(0, std::sync::Arc::new(move |bytes: &[u8]| {
        let _ = wire_tx.send(bytes.to_vec());
    }));

    stack.subscribe(
        EventKind::IntfcUp,
        Subscriber {
            msg_fields: 1,
            task: Some(1),
        },
    );

    log_bridge::info(Component::DISPATCH, "bringing up ppp on interface 0");
    stack.ppp_init(0);

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match wire_rx.try_recv() {
            Ok(frame) => stack.rx_bytes(0, &frame),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => break,
        }
        if stack.tables().interfaces[0].fsm.state() == fsm::State::Up {
            break;
        }
        if Instant::now() > deadline {
            log_bridge::error(Component::PPP, "timed out waiting for ppp to reach Up");
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    log_bridge::info(Component::PPP, "ppp link up");

    let circuit_idx = stack
        .circuit_add(CircuitConfig {
            kind: TrafficKind::Ipv4Unicast,
            self_port: SERVER_PORT,
            peer_port: 0,
            sub_interface: 0,
            peer_address: IpAddr::V4_ZERO,
            listener_msg_fields: 1,
            listener_task: Some(7),
        })
        .expect("circuit slot available");
    log_bridge::info(
        Component::UDP,
        format!("echo circuit added at slot {circuit_idx}"),
    );

    let request = build_request_frame(b"ping");
    log_bridge::info(Component::UDP, "feeding synthetic client request");
    stack.rx_bytes(0, &request);

    // Drain any frames the request's arrival produced on the wire (e.g. if
    // PPP still had control traffic in flight) before checking deliveries.
    while let Ok(frame) = wire_rx.try_recv() {
        stack.rx_bytes(0, &frame);
    }

    let deliveries = stack.drain_deliveries();
    let Some(delivery) = deliveries.into_iter().next() else {
        log_bridge::error(Component::UDP, "no delivery reached the echo listener");
        return;
    };
    let payload = delivery.packet.to_vec();
    let reply_port = delivery.packet.meta.reply_port;
    let subi = delivery.packet.meta.subi;
    let circuit = delivery.packet.meta.circuit;
    // Server-mode Tx replies to whoever the request actually came from,
    // carried forward on ip_src/ip_dst rather than re-derived from the
    // sub-interface table (see `Dispatcher::tx_udp`).
    let ip_src = delivery.packet.meta.ip_src;
    let ip_dst = delivery.packet.meta.ip_dst;
    log_bridge::info(
        Component::UDP,
        format!("listener received {} bytes, replying to port {reply_port}", payload.len()),
    );
    stack.free(delivery.packet);

    let mut reply = stack.alloc_buf_blocking();
    reply.meta.intfc = 0;
    reply.meta.subi = subi;
    reply.meta.circuit = circuit;
    reply.meta.reply_port = reply_port;
    reply.meta.ip_src = ip_src;
    reply.meta.ip_dst = ip_dst;
    reply.meta.offset = reply.capacity() / 2;
    reply.meta.length = payload.len() as u16;
    reply.write(0, &payload).expect("reply payload fits");
    stack.enqueue(rnet_core::dispatch::Step::TxUdp, reply);

    match wire_rx.recv_timeout(Duration::from_secs(1)) {
        Ok(frame) => log_bridge::info(
            Component::UDP,
            format!("echo reply framed, {} bytes on the wire", frame.len()),
        ),
        Err(_) => log_bridge::error(Component::UDP, "echo reply never reached the wire"),
    }
}
