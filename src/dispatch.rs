//! Message pump (C9): the single task that walks a packet through framing,
//! PPP, IP, and L4 steps one `send` at a time. Grounded on `rnet-dispatch.c`,
//! which holds the same `step_id`-keyed switch over a raw mailbox message;
//! here the mailbox is a [`crossbeam_channel`] and the switch is on
//! [`Step`]/[`DispatchMsg`] instead of an opaque integer.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::ahdlc;
use crate::config::{InterfaceOptions, IpAddr, TrafficKind, SWAP_SRC_DEST};
use crate::error::DiscardCode;
use crate::events::{EventKind, EventLists};
use crate::icmp;
use crate::ip::{v4, v6};
use crate::log_bridge::{self, Component};
use crate::packet::pool::PacketPool;
use crate::packet::{Packet, PacketBody, PreviousPh};
use crate::ppp::{self, fsm, xcp};
use crate::tables::Tables;
use crate::timers::TimerService;
use crate::udp;

/// One logical pipeline step, matching the original's `step_id` switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    RxEntry,
    AhdlcStripCc,
    AhdlcVerifyCrc,
    Ppp,
    Lcp,
    Ipcp,
    Ipv6cp,
    Ipv4,
    Ipv6,
    Udp,
    Icmp,
    Icmpv6,
    TxUdp,
    TxIpv4,
    TxIpv6,
    TxPpp,
    TxAhdlcCrc,
    TxAhdlcEncodeCc,
    TxDriver,
    BufDiscard,
}

pub enum DispatchMsg {
    Step(Step, Packet),
    PppInit(u8),
    PppTimeout(u8, fsm::Event),
}

/// Pending UDP delivery handed to a registered listener. The embedding
/// application drains these instead of the dispatcher calling arbitrary
/// code, keeping the pump itself allocation/IPC-free.
pub struct ListenerDelivery {
    pub msg_fields: u32,
    pub task: u32,
    pub packet: Packet,
}

pub struct Dispatcher {
    tables: Tables,
    pool: Arc<PacketPool>,
    events: EventLists,
    timers: Arc<dyn TimerService>,
    sender: Sender<DispatchMsg>,
    receiver: Receiver<DispatchMsg>,
    pub deliveries: Vec<ListenerDelivery>,
}

impl Dispatcher {
    pub fn new(tables: Tables, pool: Arc<PacketPool>, timers: Arc<dyn TimerService>) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            tables,
            pool,
            events: EventLists::new(),
            timers,
            sender,
            receiver,
            deliveries: Vec::new(),
        }
    }

    pub fn sender(&self) -> Sender<DispatchMsg> {
        self.sender.clone()
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    pub fn tables_mut(&mut self) -> &mut Tables {
        &mut self.tables
    }

    pub fn events_mut(&mut self) -> &mut EventLists {
        &mut self.events
    }

    /// Swap in the real timer service once it's been built (it needs this
    /// dispatcher's `sender()` to post timeouts back, so construction is
    /// necessarily two-step: build the dispatcher, build the timer service
    /// from its sender, then install it here).
    pub fn set_timers(&mut self, timers: Arc<dyn TimerService>) {
        self.timers = timers;
    }

    pub fn send(&self, step: Step, pkt: Packet) {
        if self.sender.send(DispatchMsg::Step(step, pkt)).is_err() {
            log_bridge::error(Component::DISPATCH, "pump channel closed, dropping work item");
        }
    }

    /// Drain and process every message currently queued. A host binary
    /// calls this from its own loop (or from `run_forever` below); tests
    /// call it directly after seeding the channel for deterministic
    /// single-step assertions.
    pub fn drain(&mut self) {
        while let Ok(msg) = self.receiver.try_recv() {
            self.process(msg);
        }
    }

    pub fn run_forever(&mut self) {
        while let Ok(msg) = self.receiver.recv() {
            self.process(msg);
        }
    }

    fn discard(&mut self, mut pkt: Packet, code: DiscardCode) {
        pkt.meta.code = code as u32;
        if let Some(entry) = self.tables.interfaces.get_mut(pkt.meta.intfc as usize) {
            if matches!(code, DiscardCode::AhdlcRxCc | DiscardCode::AhdlcRxBadCrc) {
                entry.counters.ahdlc_crc_errors = entry.counters.ahdlc_crc_errors.saturating_add(1);
            }
        }
        self.free(pkt);
    }

    fn free(&self, pkt: Packet) {
        if matches!(pkt.body, PacketBody::Buf(_)) {
            self.pool.free_buf(pkt);
        } else {
            self.pool.free_chain(pkt);
        }
    }

    fn process(&mut self, msg: DispatchMsg) {
        match msg {
            DispatchMsg::Step(step, pkt) => self.process_step(step, pkt),
            DispatchMsg::PppInit(intfc) => self.ppp_event(intfc, fsm::Event::Init),
            DispatchMsg::PppTimeout(intfc, event) => self.ppp_event(intfc, event),
        }
    }

    fn ppp_event(&mut self, intfc: u8, event: fsm::Event) {
        self.run_fsm(intfc, event);
    }

    fn process_step(&mut self, step: Step, mut pkt: Packet) {
        match step {
            Step::Udp => {
                self.udp_rx(pkt);
                return;
            }
            Step::TxDriver => {
                self.tx_driver(&pkt);
                self.free(pkt);
                return;
            }
            Step::BufDiscard => {
                self.free(pkt);
                return;
            }
            _ => {}
        }

        let result = match step {
            Step::RxEntry => self.rx_entry(&mut pkt),
            Step::AhdlcStripCc => ahdlc::strip_control_chars(&mut pkt).map(|_| Step::AhdlcVerifyCrc),
            Step::AhdlcVerifyCrc => ahdlc::verify_crc(&mut pkt).map(|_| Step::Ppp),
            Step::Ppp => self.ppp_rx(&mut pkt),
            Step::Lcp | Step::Ipcp | Step::Ipv6cp => self.xcp_rx(step, &mut pkt),
            Step::Ipv4 => self.ipv4_rx(&mut pkt),
            Step::Ipv6 => self.ipv6_rx(&mut pkt),
            Step::Icmp => icmp::rx_v4(&mut pkt).and_then(|handled| {
                if handled {
                    Ok(Step::TxIpv4)
                } else {
                    Err(DiscardCode::IpUnsupportedL4)
                }
            }),
            Step::Icmpv6 => self.icmpv6_rx(&mut pkt),
            Step::TxUdp => self.tx_udp(&mut pkt),
            Step::TxIpv4 => self.tx_ipv4(&mut pkt),
            Step::TxIpv6 => self.tx_ipv6(&mut pkt),
            Step::TxPpp => ppp::tx(&mut pkt).map(|_| Step::TxAhdlcCrc),
            Step::TxAhdlcCrc => ahdlc::append_crc(&mut pkt).map(|_| Step::TxAhdlcEncodeCc),
            Step::TxAhdlcEncodeCc => self.tx_ahdlc_encode_cc(&mut pkt),
            Step::Udp | Step::TxDriver | Step::BufDiscard => unreachable!("handled above"),
        };

        match result {
            Ok(next) => self.send(next, pkt),
            Err(code) => self.discard(pkt, code),
        }
    }

    fn rx_entry(&mut self, pkt: &mut Packet) -> Result<Step, DiscardCode> {
        if let Some(entry) = self.tables.interfaces.get_mut(pkt.meta.intfc as usize) {
            entry.counters.rx_frames = entry.counters.rx_frames.saturating_add(1);
        }
        let options = self
            .tables
            .interface_options(pkt.meta.intfc)
            .ok_or(DiscardCode::IntfcNotConfigured)?;
        let pre_translated = options.contains(InterfaceOptions::PRE_TRANSLATED);
        let pre_crc_verified = options.contains(InterfaceOptions::PRE_CRC_VERIFIED);
        if pre_translated && pre_crc_verified {
            Ok(Step::Ppp)
        } else if pre_translated {
            Ok(Step::AhdlcVerifyCrc)
        } else {
            ahdlc::strip_delimiters(pkt)?;
            Ok(Step::AhdlcStripCc)
        }
    }

    fn ppp_rx(&mut self, pkt: &mut Packet) -> Result<Step, DiscardCode> {
        let protocol = ppp::rx(pkt)?;
        Ok(match protocol {
            ppp::Protocol::Lcp => Step::Lcp,
            ppp::Protocol::Ipcp => Step::Ipcp,
            ppp::Protocol::Ipv6cp => Step::Ipv6cp,
            ppp::Protocol::Ipv4 => Step::Ipv4,
            ppp::Protocol::Ipv6 => Step::Ipv6,
        })
    }

    /// LCP/IPCP/IPV6CP handling is terminal for every code except CONF_REQ
    /// (ack) and the LCP ECHO_REQ turnaround — those forward to `TxPpp`,
    /// everything else either updates FSM state with no reply or is a
    /// malformed frame.
    fn xcp_rx(&mut self, step: Step, pkt: &mut Packet) -> Result<Step, DiscardCode> {
        let ncp = match step {
            Step::Lcp => fsm::Ncp::Lcp,
            Step::Ipcp => fsm::Ncp::Ipcp,
            Step::Ipv6cp => fsm::Ncp::Ipv6cp,
            _ => unreachable!("xcp_rx only called for Lcp/Ipcp/Ipv6cp"),
        };
        let header = xcp::parse(pkt)?;
        let intfc = pkt.meta.intfc;

        // ACK-class frames must echo the Id of the request we actually sent;
        // a stale or forged Id is dropped before it can advance the FSM.
        if matches!(header.code, xcp::Code::ConfAck | xcp::Code::TermAck | xcp::Code::EchoAck) {
            let expected = self
                .tables
                .interfaces
                .get(intfc as usize)
                .map(|e| e.fsm.tx_id())
                .unwrap_or(0);
            if header.id != expected {
                return Err(DiscardCode::PppXcpParseError);
            }
        }

        match header.code {
            xcp::Code::EchoReq if ncp == fsm::Ncp::Lcp => {
                xcp::rewrite_code(pkt, xcp::Code::EchoAck)?;
                Ok(Step::TxPpp)
            }
            xcp::Code::ConfReq => {
                self.tables.bump_negotiation_counter(intfc, ncp);
                let outcome = self.run_fsm(intfc, fsm::Event::RxConfReq(ncp));
                if outcome.send_ack {
                    xcp::rewrite_code(pkt, xcp::Code::ConfAck)?;
                    Ok(Step::TxPpp)
                } else {
                    Ok(Step::BufDiscard)
                }
            }
            xcp::Code::ConfAck => {
                self.run_fsm(intfc, fsm::Event::RxConfAck(ncp));
                Ok(Step::BufDiscard)
            }
            xcp::Code::TermReq => {
                let outcome = self.run_fsm(intfc, fsm::Event::RxTerminateReq);
                if outcome.send_ack {
                    xcp::rewrite_code(pkt, xcp::Code::TermAck)?;
                    Ok(Step::TxPpp)
                } else {
                    Ok(Step::BufDiscard)
                }
            }
            xcp::Code::TermAck => {
                self.run_fsm(intfc, fsm::Event::RxTerminateAck);
                Ok(Step::BufDiscard)
            }
            _ => Err(DiscardCode::PppXcpCodeUnsupported),
        }
    }

    fn ipv4_rx(&mut self, pkt: &mut Packet) -> Result<Step, DiscardCode> {
        let header = v4::rx(pkt)?;
        let next_ph = v4::route(header.protocol)?;
        self.resolve_subi(pkt, header.src, header.dst);
        Ok(match next_ph {
            PreviousPh::Udp => Step::Udp,
            PreviousPh::Icmp => Step::Icmp,
            _ => unreachable!("v4::route only returns Udp/Icmp"),
        })
    }

    fn ipv6_rx(&mut self, pkt: &mut Packet) -> Result<Step, DiscardCode> {
        let header = v6::rx(pkt)?;
        let next_ph = v6::route(header.next_header)?;
        self.resolve_subi(pkt, header.src, header.dst);
        Ok(match next_ph {
            PreviousPh::Udp => Step::Udp,
            PreviousPh::Icmpv6 => Step::Icmpv6,
            _ => unreachable!("v6::route only returns Udp/Icmpv6"),
        })
    }

    fn icmpv6_rx(&mut self, pkt: &mut Packet) -> Result<Step, DiscardCode> {
        let src = pkt.meta.ip_src;
        let dst = pkt.meta.ip_dst;
        let handled = icmp::rx_v6(pkt, &src, &dst)?;
        if handled {
            Ok(Step::TxIpv6)
        } else {
            Err(DiscardCode::IpUnsupportedL4)
        }
    }

    fn resolve_subi(&mut self, pkt: &mut Packet, src: IpAddr, dst: IpAddr) {
        let subi = self
            .tables
            .subi_lookup(pkt.meta.intfc, &dst)
            .or_else(|| self.tables.subi_attempt_and_learn(pkt.meta.intfc, src, dst));
        if let Some(subi) = subi {
            pkt.meta.subi = subi;
        }
    }

    /// UDP Rx is terminal: it either hands the packet to a listener delivery
    /// or discards it, never forwards to another step.
    fn udp_rx(&mut self, mut pkt: Packet) {
        let src = pkt.meta.ip_src;
        let dst = pkt.meta.ip_dst;
        let is_v6 = src.is_v6();
        let header = match udp::rx(&mut pkt, &src, &dst, is_v6) {
            Ok(header) => header,
            Err(code) => return self.discard(pkt, code),
        };
        let circuit = match udp::demux(&self.tables, &mut pkt, pkt.meta.subi, &header, &src, is_v6) {
            Ok(circuit) => circuit,
            Err(code) => return self.discard(pkt, code),
        };
        match self.tables.circuit(circuit).cloned() {
            Some(config) if config.listener_enabled() => {
                self.deliveries.push(ListenerDelivery {
                    msg_fields: config.listener_msg_fields,
                    task: config.listener_task.expect("listener_enabled guarantees Some"),
                    packet: pkt,
                });
            }
            _ => self.discard(pkt, DiscardCode::UdpCircuitNotFound),
        }
    }

    fn subi_addrs(&self, intfc: u8, subi: u8) -> Result<(IpAddr, IpAddr), DiscardCode> {
        let state = self
            .tables
            .interfaces
            .get(intfc as usize)
            .and_then(|e| e.sub_states.get(subi as usize))
            .ok_or(DiscardCode::IpSubiNotFound)?;
        Ok((state.address, state.peer))
    }

    fn tx_udp(&mut self, pkt: &mut Packet) -> Result<Step, DiscardCode> {
        let circuit_idx = pkt.meta.circuit;
        let circuit = self
            .tables
            .circuit(circuit_idx)
            .cloned()
            .ok_or(DiscardCode::IpCircuitNotFound)?;
        let is_v6 = matches!(circuit.kind, TrafficKind::Ipv6Global | TrafficKind::Ipv6LinkLocal);
        // Server-mode circuits (peer_port == 0) reply to whoever the request
        // actually came from, carried on the packet itself, not the
        // sub-interface table's learned peer (unset for literal sub-interfaces).
        let (ip_src, ip_dst) = if circuit.peer_port == 0 {
            (pkt.meta.ip_dst, pkt.meta.ip_src)
        } else {
            let (self_addr, _) = self.subi_addrs(pkt.meta.intfc, pkt.meta.subi)?;
            (self_addr, circuit.peer_address)
        };
        let reply_port = pkt.meta.reply_port;
        udp::tx(pkt, &circuit, circuit_idx, reply_port, &ip_src, &ip_dst, is_v6)?;
        Ok(if is_v6 { Step::TxIpv6 } else { Step::TxIpv4 })
    }

    fn tx_ipv4(&mut self, pkt: &mut Packet) -> Result<Step, DiscardCode> {
        let (src, dst) = self.tx_addresses(pkt)?;
        v4::tx(pkt, src, dst)?;
        Ok(Step::TxPpp)
    }

    fn tx_ipv6(&mut self, pkt: &mut Packet) -> Result<Step, DiscardCode> {
        let (src, dst) = self.tx_addresses(pkt)?;
        v6::tx(pkt, src, dst)?;
        Ok(Step::TxPpp)
    }

    /// The address pair the IP Tx step should write. `SWAP_SRC_DEST` (set by
    /// the ICMP echo turnaround and server-mode UDP replies) means "reply to
    /// whoever actually sent this", which the packet already carries as its
    /// own `ip_src`/`ip_dst` from Rx — not the sub-interface table's learned
    /// peer, which is never populated for a literal (non-learned) sub-interface.
    fn tx_addresses(&self, pkt: &Packet) -> Result<(IpAddr, IpAddr), DiscardCode> {
        if pkt.meta.circuit == SWAP_SRC_DEST {
            Ok((pkt.meta.ip_dst, pkt.meta.ip_src))
        } else {
            let (self_addr, _) = self.subi_addrs(pkt.meta.intfc, pkt.meta.subi)?;
            let circuit = self
                .tables
                .circuit(pkt.meta.circuit)
                .ok_or(DiscardCode::IpCircuitNotFound)?;
            Ok((self_addr, circuit.peer_address))
        }
    }

    fn tx_ahdlc_encode_cc(&mut self, pkt: &mut Packet) -> Result<Step, DiscardCode> {
        let count = ahdlc::translation_count(pkt);
        if count > 0 {
            pkt.append(count as u16)?;
            ahdlc::encode_control_chars(pkt, count)?;
        }
        ahdlc::encode_delimiters(pkt)?;
        Ok(Step::TxDriver)
    }

    fn tx_driver(&mut self, pkt: &Packet) {
        let bytes = pkt.to_vec();
        let intfc = pkt.meta.intfc;
        let driver = self
            .tables
            .interfaces
            .get(intfc as usize)
            .and_then(|e| e.tx_driver.clone());
        match driver {
            Some(driver) => {
                if let Some(entry) = self.tables.interfaces.get_mut(intfc as usize) {
                    entry.counters.tx_frames = entry.counters.tx_frames.saturating_add(1);
                }
                driver(&bytes);
            }
            None => log_bridge::warn(Component::DISPATCH, "no tx driver registered, frame dropped"),
        }
    }

    fn run_fsm(&mut self, intfc: u8, event: fsm::Event) -> fsm::Outcome {
        let Some(entry) = self.tables.interfaces.get_mut(intfc as usize) else {
            return fsm::Outcome::default();
        };
        let outcome = entry.fsm.handle(event);
        let actions = outcome.actions.clone();
        for action in actions {
            match action {
                fsm::Action::ArmTimer(duration) => {
                    let kind = match self.tables.interfaces[intfc as usize].fsm.state() {
                        fsm::State::Recovery => crate::timers::TimeoutKind::Recovery,
                        fsm::State::Probing => crate::timers::TimeoutKind::Probing,
                        _ => crate::timers::TimeoutKind::Negotiating,
                    };
                    self.timers.arm(intfc, duration, kind);
                }
                fsm::Action::SendLcpTermReq => self.send_control(intfc, fsm::Ncp::Lcp, xcp::Code::TermReq),
                fsm::Action::SendConfReq(ncp) => self.send_control(intfc, ncp, xcp::Code::ConfReq),
                fsm::Action::EmitUp => self.fan_out(EventKind::IntfcUp, Some(intfc)),
                fsm::Action::EmitDown => self.fan_out(EventKind::IntfcDown, Some(intfc)),
            }
        }
        outcome
    }

    fn send_control(&mut self, intfc: u8, ncp: fsm::Ncp, code: xcp::Code) {
        let Some(mut pkt) = self.pool.alloc_buf_timed(Duration::ZERO) else {
            log_bridge::warn(Component::PPP, "no spare buffer for control frame, skipping send");
            return;
        };
        pkt.meta.intfc = intfc;
        pkt.meta.offset = pkt.capacity() / 2;
        pkt.meta.length = 0;
        pkt.meta.previous_ph = match ncp {
            fsm::Ncp::Lcp => PreviousPh::Lcp,
            fsm::Ncp::Ipcp => PreviousPh::Ipcp,
            fsm::Ncp::Ipv6cp => PreviousPh::Ipv6cp,
        };

        let id = self
            .tables
            .interfaces
            .get_mut(intfc as usize)
            .map(|e| e.fsm.next_tx_id())
            .unwrap_or(0);

        let built = match code {
            xcp::Code::ConfReq if ncp == fsm::Ncp::Lcp => xcp::build_conf_req(
                &mut pkt,
                id,
                &[xcp::XcpOption {
                    kind: 5,
                    value: 0x1111_1111u32.to_be_bytes().to_vec(),
                }],
            ),
            xcp::Code::ConfReq => xcp::build_conf_req(&mut pkt, id, &[]),
            xcp::Code::TermReq => {
                let result = xcp::build_conf_req(&mut pkt, id, &[]);
                if result.is_ok() {
                    let _ = xcp::rewrite_code(&mut pkt, xcp::Code::TermReq);
                }
                result
            }
            _ => Ok(()),
        };

        if built.is_ok() {
            self.send(Step::TxPpp, pkt);
        } else {
            self.free(pkt);
        }
    }

    fn fan_out(&mut self, kind: EventKind, parameter: Option<u8>) {
        for delivery in self.events.fan_out(kind, parameter) {
            log_bridge::info(
                Component::DISPATCH,
                format!(
                    "event {:?} -> task {} (msg_fields {})",
                    kind, delivery.task, delivery.msg_fields
                ),
            );
        }
    }
}
