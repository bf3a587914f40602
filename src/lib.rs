//! Crate root: wires the packet-processing core's components together
//! behind a single [`Stack`] handle. Grounded on `lib.rs`'s `BridgeEngine` —
//! one long-lived object owning the runtime-ish state (here: tables, pools,
//! timers, the dispatcher) that a host exercises through a small method
//! surface instead of reaching into the internals directly.

pub mod ahdlc;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod icmp;
pub mod ip;
pub mod log_bridge;
pub mod packet;
pub mod ppp;
pub mod tables;
pub mod timers;
pub mod udp;
pub mod util;

use std::sync::Arc;
use std::time::Duration;

use config::StackLimits;
use dispatch::{Dispatcher, DispatchMsg, ListenerDelivery, Step};
use events::{EventKind, Subscriber};
use packet::pool::PacketPool;
use packet::{Packet, PacketBody};
use tables::{Tables, TxDriver};
use timers::{ThreadTimerService, TimeoutKind, TimerService};

/// The assembled packet-processing core: tables, pools, timers, and the
/// dispatcher that ties them together. A host builds one at startup,
/// registers a Tx driver per interface, and feeds it raw frames/timeouts;
/// inbound UDP datagrams and PPP up/down events come back out through
/// [`Stack::drain_deliveries`] and the event subscriber lists.
pub struct Stack {
    pool: Arc<PacketPool>,
    dispatcher: Dispatcher,
}

/// Timer service that drops every arm, used only for the brief window
/// between constructing the dispatcher and installing its real timers.
struct NullTimers;

impl TimerService for NullTimers {
    fn arm(&self, _intfc: u8, _after: Duration, _kind: TimeoutKind) {}
    fn kill(&self, _intfc: u8) {}
}

impl Stack {
    /// Build a stack from static interface/sub-interface configuration and
    /// pool/table sizing limits. Timers are backed by real OS threads; for
    /// deterministic tests, build a [`Dispatcher`] directly with a
    /// [`timers::ManualTimerService`] instead of going through `Stack`.
    pub fn new(limits: StackLimits, interfaces: Vec<config::InterfaceConfig>) -> Self {
        let num_interfaces = interfaces.len();
        let tables = Tables::init(&limits, interfaces);
        let pool = Arc::new(PacketPool::new(&limits));
        let mut dispatcher = Dispatcher::new(tables, Arc::clone(&pool), Arc::new(NullTimers));
        let timers: Arc<dyn TimerService> =
            Arc::new(ThreadTimerService::new(dispatcher.sender(), num_interfaces));
        dispatcher.set_timers(timers);
        Self { pool, dispatcher }
    }

    /// Register the byte-sink a framed AHDLC frame is handed to on Tx.
    pub fn set_tx_driver(&mut self, intfc: u8, driver: TxDriver) {
        self.dispatcher.tables_mut().set_tx_driver(intfc, driver);
    }

    /// Subscribe to PPP up/down and init-complete notifications.
    pub fn subscribe(&mut self, kind: EventKind, subscriber: Subscriber) {
        self.dispatcher.events_mut().subscribe(kind, subscriber);
    }

    /// Kick off PPP negotiation on `intfc` (the driver-interface
    /// equivalent of the original's init-complete broadcast reaching the
    /// link layer).
    pub fn ppp_init(&mut self, intfc: u8) {
        let sender = self.dispatcher.sender();
        let _ = sender.send(DispatchMsg::PppInit(intfc));
        self.dispatcher.drain();
    }

    /// Feed one raw frame received on `intfc` (post-delimiter, still
    /// AHDLC-framed unless the interface's `PRE_TRANSLATED` option says
    /// otherwise). Drops the frame if the buffer pool is momentarily
    /// exhausted, matching the original Rx path's "allocation exhaustion
    /// drops the incoming byte stream silently" behavior.
    pub fn rx_bytes(&mut self, intfc: u8, bytes: &[u8]) {
        let Some(mut pkt) = self.pool.alloc_buf_timed(Duration::from_millis(50)) else {
            log_bridge::warn(log_bridge::Component::POOL, "rx_bytes: pool exhausted, frame dropped");
            return;
        };
        if bytes.len() > pkt.capacity() as usize {
            self.pool.free_buf(pkt);
            log_bridge::warn(log_bridge::Component::POOL, "rx_bytes: frame exceeds buffer capacity, dropped");
            return;
        }
        pkt.meta.intfc = intfc;
        pkt.meta.offset = 0;
        pkt.meta.length = bytes.len() as u16;
        let _ = pkt.write(0, bytes);
        self.dispatcher.send(Step::RxEntry, pkt);
        self.dispatcher.drain();
    }

    /// Process every message currently queued (frames, timeouts, control
    /// sends chained off them) without blocking for more.
    pub fn drain(&mut self) {
        self.dispatcher.drain();
    }

    /// Take every UDP datagram delivered to an enabled listener circuit
    /// since the last call.
    pub fn drain_deliveries(&mut self) -> Vec<ListenerDelivery> {
        std::mem::take(&mut self.dispatcher.deliveries)
    }

    pub fn tables(&self) -> &Tables {
        self.dispatcher.tables()
    }

    /// Add a dynamic circuit, returning its slot index on success (`None` if
    /// every static/spare slot is already occupied).
    pub fn circuit_add(&mut self, config: config::CircuitConfig) -> Option<u8> {
        self.dispatcher.tables_mut().circuit_add(config)
    }

    /// Enqueue a packet at an arbitrary pipeline step, draining immediately.
    /// Used by callers driving traffic directly (e.g. a Tx reply built from
    /// a received delivery) rather than through `rx_bytes`.
    pub fn enqueue(&mut self, step: Step, pkt: Packet) {
        self.dispatcher.send(step, pkt);
        self.dispatcher.drain();
    }

    /// Return a packet this crate's caller allocated but never enqueued
    /// (e.g. one built to inject test traffic) to its owning pool.
    pub fn free(&self, pkt: Packet) {
        if matches!(pkt.body, PacketBody::Buf(_)) {
            self.pool.free_buf(pkt);
        } else {
            self.pool.free_chain(pkt);
        }
    }

    pub fn alloc_buf_blocking(&self) -> Packet {
        self.pool.alloc_buf_blocking()
    }
}
