//! Static configuration shapes: the ROM tables the original firmware built
//! at compile time via preprocessor macros. Here they're plain constructible
//! Rust values a caller assembles at `init()` time — the external collaborator
//! that used to be "static configuration loading" is now just "whatever code
//! builds a `StackConfig` before calling `Stack::init`".

pub const PPP_PREFIX_LENGTH: usize = 4;
pub const IPV4_HEADER_LEN: usize = 20;
pub const IPV6_HEADER_LEN: usize = 40;
pub const UDP_HEADER_LEN: usize = 8;

/// Sentinel circuit index meaning "swap src/dst at the IP Tx step" (used by
/// ICMP echo replies and UDP server-mode replies).
pub const SWAP_SRC_DEST: u8 = 255;

/// Sentinel `msg_fields` value meaning "listener disabled, free on arrival".
pub const LISTENER_DISABLED: u32 = 0xFFFF_FFFF;

/// Sizing knobs for the packet pools and fixed tables. Defaults mirror the
/// original `rnet-compile-switches.h`/`rnet-app.h` values where the original
/// gave one, otherwise a reasonable embedded default (noted inline).
#[derive(Debug, Clone, Copy)]
pub struct StackLimits {
    /// Capacity of one contiguous `Buf` packet, bytes.
    pub buf_size: usize,
    /// Number of `Buf` slots in the pool.
    pub num_bufs: usize,
    /// Payload capacity of one particle cell, bytes.
    pub pcl_cell_size: usize,
    /// Number of particle cells in the pool.
    pub num_pcls: usize,
    /// Number of statically-configured circuit slots (`NUM_PCIR` in the
    /// original); additional slots beyond this are spares for dynamic add.
    pub num_static_circuits: usize,
    /// Spare circuit slots available to `circuit_add`.
    pub num_spare_circuits: usize,
}

impl Default for StackLimits {
    fn default() -> Self {
        Self {
            buf_size: 512,
            num_bufs: 16,
            pcl_cell_size: 64,
            num_pcls: 64,
            num_static_circuits: 8,
            num_spare_circuits: 4,
        }
    }
}

impl StackLimits {
    pub fn total_circuit_slots(&self) -> usize {
        self.num_static_circuits + self.num_spare_circuits
    }
}

/// L2 kind carried by an interface. PPP is the only one this core speaks;
/// kept as an enum (rather than assuming PPP) so the interface table shape
/// matches the original, which reserved the field for future L2 kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L2Kind {
    Ppp,
}

bitflags::bitflags! {
    /// Per-interface option flags: which PPP network-control protocols this
    /// link negotiates, and driver hints about how much framing the serial
    /// driver already stripped before handing bytes to `rx_entry`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InterfaceOptions: u8 {
        const PPP_IPCP             = 0b0000_0001;
        const PPP_IPV6CP           = 0b0000_0010;
        const PRE_TRANSLATED       = 0b0000_0100;
        const PRE_CRC_VERIFIED     = 0b0000_1000;
    }
}

/// Static (ROM) configuration for one interface.
#[derive(Debug, Clone)]
pub struct InterfaceConfig {
    pub l2: L2Kind,
    pub options: InterfaceOptions,
    pub sub_interfaces: Vec<SubInterfaceConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficKind {
    Ipv4Unicast,
    Ipv6LinkLocal,
    Ipv6Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    HardCoded,
    Eui64,
    Learned,
}

/// Static (ROM) configuration for one sub-interface.
#[derive(Debug, Clone)]
pub struct SubInterfaceConfig {
    pub kind: TrafficKind,
    pub acquisition: Acquisition,
    pub prefix_length: u8,
    /// `None` for sub-interfaces that learn their address from the first peer.
    pub literal_address: Option<IpAddr>,
}

/// A minimal IPv4/IPv6 address type local to this crate (no external crate
/// carries one compatible with both the manual codec and `no_std`-leaning
/// embedded targets, so this mirrors how the reference checksum module kept
/// its own byte-octet representations rather than pulling in a heavier type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpAddr {
    V4([u8; 4]),
    V6([u8; 16]),
}

impl IpAddr {
    pub fn is_zero(&self) -> bool {
        match self {
            IpAddr::V4(b) => b.iter().all(|&x| x == 0),
            IpAddr::V6(b) => b.iter().all(|&x| x == 0),
        }
    }

    pub fn is_v6(&self) -> bool {
        matches!(self, IpAddr::V6(_))
    }

    pub const V4_ZERO: IpAddr = IpAddr::V4([0; 4]);
    pub const V6_ZERO: IpAddr = IpAddr::V6([0; 16]);
}

impl Default for IpAddr {
    fn default() -> Self {
        IpAddr::V4_ZERO
    }
}

/// Static (ROM) configuration for one circuit slot.
#[derive(Debug, Clone)]
pub struct CircuitConfig {
    pub kind: TrafficKind,
    pub self_port: u16,
    /// `0` means server mode: accept any peer port, mirror it back on reply.
    pub peer_port: u16,
    pub sub_interface: u8,
    /// Zero address means wildcard peer (accept any source).
    pub peer_address: IpAddr,
    pub listener_msg_fields: u32,
    pub listener_task: Option<u32>,
}

impl CircuitConfig {
    pub fn listener_enabled(&self) -> bool {
        self.listener_msg_fields != LISTENER_DISABLED && self.listener_task.is_some()
    }
}
