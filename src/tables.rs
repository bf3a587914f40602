//! Interface/sub-interface/circuit tables (C8). Owned exclusively by the
//! dispatcher task (see [`crate::dispatch`]), so no internal locking here —
//! grounded on `rnet-intfc.c`'s static `rnet_intfc` array plus the lookup
//! helpers (`rnet_intfc_subi_lookup`, `rnet_intfc_pcir_lookup`) that walk it
//! linearly rather than via a hash index, since the original table sizes
//! (single digits) never justified one.

use crate::config::{CircuitConfig, InterfaceConfig, InterfaceOptions, IpAddr, StackLimits, SubInterfaceConfig, TrafficKind};
use crate::ppp::fsm::PppFsm;

/// Per-interface saturating counters exposed read-only for diagnostics.
/// Ambient addition: present in the original `rnet-intfc.c` counters block
/// but not carried by the distilled operation list.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterfaceCounters {
    pub rx_frames: u32,
    pub tx_frames: u32,
    pub ahdlc_crc_errors: u32,
    pub lcp_negotiations_rx: u32,
    pub ipcp_negotiations_rx: u32,
    pub ipv6cp_negotiations_rx: u32,
}

impl InterfaceCounters {
    fn bump(counter: &mut u32) {
        *counter = counter.saturating_add(1);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SubInterfaceState {
    pub address: IpAddr,
    pub peer: IpAddr,
}

impl SubInterfaceState {
    fn from_config(config: &SubInterfaceConfig) -> Self {
        Self {
            address: config.literal_address.unwrap_or(IpAddr::V4_ZERO),
            peer: IpAddr::V4_ZERO,
        }
    }
}

pub type TxDriver = std::sync::Arc<dyn Fn(&[u8]) + Send + Sync>;

pub struct InterfaceEntry {
    pub config: InterfaceConfig,
    pub sub_states: Vec<SubInterfaceState>,
    pub fsm: PppFsm,
    pub counters: InterfaceCounters,
    /// The byte-sink the Tx driver step hands a framed AHDLC frame to. `None`
    /// until the embedding application calls `Tables::set_tx_driver`.
    pub tx_driver: Option<TxDriver>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitSlotState {
    Empty,
    Static,
    Dynamic,
}

pub struct CircuitEntry {
    pub state: CircuitSlotState,
    pub config: CircuitConfig,
}

/// All interfaces, sub-interfaces, and circuits. `init()` builds this from
/// the caller-supplied static configuration; the dispatcher holds one
/// instance and threads it through every handler.
pub struct Tables {
    pub interfaces: Vec<InterfaceEntry>,
    pub circuits: Vec<CircuitEntry>,
    num_static_circuits: usize,
}

impl Tables {
    pub fn init(limits: &StackLimits, interface_configs: Vec<InterfaceConfig>) -> Self {
        let interfaces = interface_configs
            .into_iter()
            .map(|config| {
                let sub_states = config.sub_interfaces.iter().map(SubInterfaceState::from_config).collect();
                InterfaceEntry {
                    fsm: PppFsm::new(config.options),
                    config,
                    sub_states,
                    counters: InterfaceCounters::default(),
                    tx_driver: None,
                }
            })
            .collect();

        let empty_circuit = || CircuitEntry {
            state: CircuitSlotState::Empty,
            config: CircuitConfig {
                kind: TrafficKind::Ipv4Unicast,
                self_port: 0,
                peer_port: 0,
                sub_interface: 0,
                peer_address: IpAddr::V4_ZERO,
                listener_msg_fields: crate::config::LISTENER_DISABLED,
                listener_task: None,
            },
        };
        let circuits = (0..limits.total_circuit_slots()).map(|_| empty_circuit()).collect();

        Self {
            interfaces,
            circuits,
            num_static_circuits: limits.num_static_circuits,
        }
    }

    pub fn set_tx_driver(&mut self, intfc: u8, driver: TxDriver) {
        if let Some(entry) = self.interfaces.get_mut(intfc as usize) {
            entry.tx_driver = Some(driver);
        }
    }

    pub fn is_valid(&self, intfc: u8) -> bool {
        (intfc as usize) < self.interfaces.len()
    }

    pub fn interface_options(&self, intfc: u8) -> Option<InterfaceOptions> {
        self.interfaces.get(intfc as usize).map(|e| e.config.options)
    }

    pub fn bump_negotiation_counter(&mut self, intfc: u8, ncp: crate::ppp::fsm::Ncp) {
        if let Some(entry) = self.interfaces.get_mut(intfc as usize) {
            match ncp {
                crate::ppp::fsm::Ncp::Lcp => InterfaceCounters::bump(&mut entry.counters.lcp_negotiations_rx),
                crate::ppp::fsm::Ncp::Ipcp => InterfaceCounters::bump(&mut entry.counters.ipcp_negotiations_rx),
                crate::ppp::fsm::Ncp::Ipv6cp => {
                    InterfaceCounters::bump(&mut entry.counters.ipv6cp_negotiations_rx)
                }
            }
        }
    }

    fn traffic_kind_for(addr: &IpAddr) -> TrafficKind {
        match addr {
            IpAddr::V4(_) => TrafficKind::Ipv4Unicast,
            IpAddr::V6(b) if b[0] == 0xfe && (b[1] & 0xc0) == 0x80 => TrafficKind::Ipv6LinkLocal,
            IpAddr::V6(_) => TrafficKind::Ipv6Global,
        }
    }

    /// Exact-match lookup: the first sub-interface on `intfc` whose kind
    /// matches `addr`'s traffic kind and whose configured address equals
    /// `addr`.
    pub fn subi_lookup(&self, intfc: u8, addr: &IpAddr) -> Option<u8> {
        let entry = self.interfaces.get(intfc as usize)?;
        let kind = Self::traffic_kind_for(addr);
        entry
            .config
            .sub_interfaces
            .iter()
            .zip(entry.sub_states.iter())
            .position(|(cfg, state)| cfg.kind == kind && state.address == *addr)
            .map(|idx| idx as u8)
    }

    /// Populate the first learned-acquisition, currently-zero sub-interface
    /// of the matching traffic kind on `intfc`: its address becomes `dst`
    /// and its peer becomes `src`.
    pub fn subi_attempt_and_learn(&mut self, intfc: u8, src: IpAddr, dst: IpAddr) -> Option<u8> {
        let entry = self.interfaces.get_mut(intfc as usize)?;
        let kind = Self::traffic_kind_for(&dst);
        let idx = entry
            .config
            .sub_interfaces
            .iter()
            .zip(entry.sub_states.iter())
            .position(|(cfg, state)| {
                cfg.kind == kind
                    && cfg.acquisition == crate::config::Acquisition::Learned
                    && state.address.is_zero()
            })?;
        entry.sub_states[idx].address = dst;
        entry.sub_states[idx].peer = src;
        Some(idx as u8)
    }

    /// Circuit lookup with port-0 and null-address wildcards, per C8.
    pub fn circuit_lookup(
        &self,
        subi: u8,
        kind: TrafficKind,
        self_port: u16,
        peer_port: u16,
        peer_addr: &IpAddr,
    ) -> Option<u8> {
        self.circuits
            .iter()
            .position(|c| {
                c.state != CircuitSlotState::Empty
                    && c.config.sub_interface == subi
                    && c.config.kind == kind
                    && (c.config.self_port == self_port || c.config.self_port == 0)
                    && (c.config.peer_port == peer_port || c.config.peer_port == 0)
                    && (c.config.peer_address == *peer_addr || c.config.peer_address.is_zero())
            })
            .map(|idx| idx as u8)
    }

    /// Claim the first spare (beyond `num_static_circuits`) empty slot.
    pub fn circuit_add(&mut self, config: CircuitConfig) -> Option<u8> {
        let idx = self
            .circuits
            .iter()
            .enumerate()
            .skip(self.num_static_circuits)
            .find(|(_, c)| c.state == CircuitSlotState::Empty)
            .map(|(idx, _)| idx)?;
        self.circuits[idx].state = CircuitSlotState::Dynamic;
        self.circuits[idx].config = config;
        Some(idx as u8)
    }

    /// Free a dynamically-added circuit slot. Static slots can't be deleted.
    pub fn circuit_delete(&mut self, idx: u8) -> bool {
        match self.circuits.get_mut(idx as usize) {
            Some(entry) if entry.state == CircuitSlotState::Dynamic => {
                entry.state = CircuitSlotState::Empty;
                true
            }
            _ => false,
        }
    }

    pub fn circuit(&self, idx: u8) -> Option<&CircuitConfig> {
        self.circuits.get(idx as usize).map(|c| &c.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Acquisition;

    fn limits() -> StackLimits {
        StackLimits {
            num_static_circuits: 2,
            num_spare_circuits: 2,
            ..Default::default()
        }
    }

    fn one_interface() -> Vec<InterfaceConfig> {
        vec![InterfaceConfig {
            l2: crate::config::L2Kind::Ppp,
            options: InterfaceOptions::empty(),
            sub_interfaces: vec![SubInterfaceConfig {
                kind: TrafficKind::Ipv4Unicast,
                acquisition: Acquisition::Learned,
                prefix_length: 32,
                literal_address: None,
            }],
        }]
    }

    #[test]
    fn learn_then_exact_lookup_succeeds() {
        let mut tables = Tables::init(&limits(), one_interface());
        let src = IpAddr::V4([10, 0, 0, 1]);
        let dst = IpAddr::V4([10, 0, 0, 2]);
        let subi = tables.subi_attempt_and_learn(0, src, dst).unwrap();
        assert_eq!(subi, 0);
        assert_eq!(tables.subi_lookup(0, &dst), Some(0));
    }

    #[test]
    fn circuit_add_then_lookup_with_wildcard_peer_port() {
        let mut tables = Tables::init(&limits(), one_interface());
        let idx = tables
            .circuit_add(CircuitConfig {
                kind: TrafficKind::Ipv4Unicast,
                self_port: 7,
                peer_port: 0,
                sub_interface: 0,
                peer_address: IpAddr::V4_ZERO,
                listener_msg_fields: 1,
                listener_task: Some(1),
            })
            .unwrap();
        assert!(idx >= 2);
        let found = tables
            .circuit_lookup(0, TrafficKind::Ipv4Unicast, 7, 9000, &IpAddr::V4([1, 2, 3, 4]))
            .unwrap();
        assert_eq!(found, idx);
    }

    #[test]
    fn circuit_delete_frees_dynamic_slot_only() {
        let mut tables = Tables::init(&limits(), one_interface());
        let idx = tables
            .circuit_add(CircuitConfig {
                kind: TrafficKind::Ipv4Unicast,
                self_port: 7,
                peer_port: 0,
                sub_interface: 0,
                peer_address: IpAddr::V4_ZERO,
                listener_msg_fields: 1,
                listener_task: Some(1),
            })
            .unwrap();
        assert!(tables.circuit_delete(idx));
        assert!(!tables.circuit_delete(0));
    }
}
