//! Thin category-tagged wrapper over the standard [`log`] facade.
//!
//! The reference tunnel engine this crate descends from routed every message
//! through an FFI log sink with a breadcrumb bitmask so a mobile host could
//! filter by subsystem. There's no host bridge here, so subscribers (an
//! embedding binary, `env_logger` in tests) just install a normal `log`
//! backend; the category still rides along as a bracketed prefix so a single
//! log stream stays greppable per component.

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Component: u32 {
        const AHDLC    = 0b0000_0001;
        const PPP      = 0b0000_0010;
        const IP       = 0b0000_0100;
        const UDP      = 0b0000_1000;
        const ICMP     = 0b0001_0000;
        const DISPATCH = 0b0010_0000;
        const POOL     = 0b0100_0000;
    }
}

impl Component {
    fn label(self) -> &'static str {
        if self.contains(Component::AHDLC) {
            "ahdlc"
        } else if self.contains(Component::PPP) {
            "ppp"
        } else if self.contains(Component::IP) {
            "ip"
        } else if self.contains(Component::UDP) {
            "udp"
        } else if self.contains(Component::ICMP) {
            "icmp"
        } else if self.contains(Component::DISPATCH) {
            "dispatch"
        } else if self.contains(Component::POOL) {
            "pool"
        } else {
            "rnet"
        }
    }
}

macro_rules! leveled {
    ($name:ident, $level:expr) => {
        pub fn $name(component: Component, message: impl std::fmt::Display) {
            log::log!($level, "[{}] {}", component.label(), message);
        }
    };
}

leveled!(trace, log::Level::Trace);
leveled!(debug, log::Level::Debug);
leveled!(info, log::Level::Info);
leveled!(warn, log::Level::Warn);
leveled!(error, log::Level::Error);
