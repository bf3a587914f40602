//! Per-interface PPP link-control state machine. Drives a link from cold
//! start (`RECOVERY`) through LCP/IPCP/IPV6CP negotiation (`PROBING`,
//! `NEGOTIATING`) to a data-plane-ready `UP` state. Grounded on the
//! `rnet_ppp_lcp_fsm` transition table in `rnet-ppp.c`; the original's
//! six-flag/one-counter struct is kept as-is rather than modeled as nested
//! per-protocol state, since every transition touches at most one flag at a
//! time and a richer type would just be re-derived from these six bools on
//! every read.

use std::time::Duration;

use crate::config::InterfaceOptions;

const RECOVERY_CYCLES: u8 = 2;
const NEGOTIATION_CYCLES: u8 = 20;
const RECOVERY_TIMEOUT: Duration = Duration::from_millis(200);
const PROBING_TIMEOUT: Duration = Duration::from_millis(1000);
const NEGOTIATING_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Recovery,
    Probing,
    Negotiating,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ncp {
    Lcp,
    Ipcp,
    Ipv6cp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Init,
    RxConfReq(Ncp),
    RxConfAck(Ncp),
    RxTerminateReq,
    RxTerminateAck,
    TimeoutRecovery,
    TimeoutProbing,
    TimeoutNegotiating,
}

/// A side effect the caller (the interface's timer service and PPP Tx step)
/// must carry out in response to a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ArmTimer(Duration),
    SendLcpTermReq,
    SendConfReq(Ncp),
    EmitUp,
    EmitDown,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Outcome {
    pub send_ack: bool,
    pub actions: Vec<Action>,
}

impl Outcome {
    fn new(send_ack: bool, action: Option<Action>) -> Self {
        Self {
            send_ack,
            actions: action.into_iter().collect(),
        }
    }

    fn many(send_ack: bool, actions: Vec<Action>) -> Self {
        Self { send_ack, actions }
    }
}

/// One interface's negotiation state. `options` records which NCPs this
/// interface runs beyond the mandatory LCP.
#[derive(Debug, Clone)]
pub struct PppFsm {
    state: State,
    counter: u8,
    lcp_rx_closed: bool,
    lcp_tx_closed: bool,
    ipcp_rx_closed: bool,
    ipcp_tx_closed: bool,
    ipv6cp_rx_closed: bool,
    ipv6cp_tx_closed: bool,
    tx_id: u8,
    options: InterfaceOptions,
}

impl PppFsm {
    pub fn new(options: InterfaceOptions) -> Self {
        Self {
            state: State::Recovery,
            counter: RECOVERY_CYCLES,
            lcp_rx_closed: false,
            lcp_tx_closed: false,
            ipcp_rx_closed: false,
            ipcp_tx_closed: false,
            ipv6cp_rx_closed: false,
            ipv6cp_tx_closed: false,
            tx_id: 0,
            options,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Next outgoing xCP Id, auto-incrementing.
    pub fn next_tx_id(&mut self) -> u8 {
        self.tx_id = self.tx_id.wrapping_add(1);
        self.tx_id
    }

    /// The Id most recently handed out by `next_tx_id`, for matching against
    /// an incoming ACK-class frame's Id.
    pub fn tx_id(&self) -> u8 {
        self.tx_id
    }

    fn ncp_configured(&self, ncp: Ncp) -> bool {
        match ncp {
            Ncp::Lcp => true,
            Ncp::Ipcp => self.options.contains(InterfaceOptions::PPP_IPCP),
            Ncp::Ipv6cp => self.options.contains(InterfaceOptions::PPP_IPV6CP),
        }
    }

    fn all_closed(&self) -> bool {
        let lcp_done = self.lcp_rx_closed && self.lcp_tx_closed;
        let ipcp_done = !self.ncp_configured(Ncp::Ipcp) || (self.ipcp_rx_closed && self.ipcp_tx_closed);
        let ipv6cp_done =
            !self.ncp_configured(Ncp::Ipv6cp) || (self.ipv6cp_rx_closed && self.ipv6cp_tx_closed);
        lcp_done && ipcp_done && ipv6cp_done
    }

    fn set_rx_closed(&mut self, ncp: Ncp) {
        match ncp {
            Ncp::Lcp => self.lcp_rx_closed = true,
            Ncp::Ipcp => self.ipcp_rx_closed = true,
            Ncp::Ipv6cp => self.ipv6cp_rx_closed = true,
        }
    }

    fn set_tx_closed(&mut self, ncp: Ncp) {
        match ncp {
            Ncp::Lcp => self.lcp_tx_closed = true,
            Ncp::Ipcp => self.ipcp_tx_closed = true,
            Ncp::Ipv6cp => self.ipv6cp_tx_closed = true,
        }
    }

    /// Next NCP still needing a CONF_REQ sent, in negotiation priority order
    /// (LCP first, then IPCP, then IPV6CP).
    fn next_unclosed_tx(&self) -> Option<Ncp> {
        if !self.lcp_tx_closed {
            Some(Ncp::Lcp)
        } else if self.ncp_configured(Ncp::Ipcp) && !self.ipcp_tx_closed {
            Some(Ncp::Ipcp)
        } else if self.ncp_configured(Ncp::Ipv6cp) && !self.ipv6cp_tx_closed {
            Some(Ncp::Ipv6cp)
        } else {
            None
        }
    }

    fn restart_recovery(&mut self) -> Action {
        self.lcp_rx_closed = false;
        self.lcp_tx_closed = false;
        self.ipcp_rx_closed = false;
        self.ipcp_tx_closed = false;
        self.ipv6cp_rx_closed = false;
        self.ipv6cp_tx_closed = false;
        self.counter = RECOVERY_CYCLES;
        self.state = State::Recovery;
        Action::ArmTimer(RECOVERY_TIMEOUT)
    }

    /// Check whether every configured NCP has closed in both directions;
    /// if so transition to `Up` and return the `EmitUp` action, preserving
    /// whatever `send_ack` the caller already decided for this event.
    fn maybe_complete_negotiation(&mut self, send_ack: bool) -> Outcome {
        if self.state == State::Negotiating && self.all_closed() {
            self.state = State::Up;
            Outcome::many(send_ack, vec![Action::EmitUp])
        } else {
            Outcome::new(send_ack, None)
        }
    }

    pub fn handle(&mut self, event: Event) -> Outcome {
        match (self.state, event) {
            (State::Recovery, Event::Init) => {
                let action = self.restart_recovery();
                Outcome::new(false, Some(action))
            }
            (State::Recovery, Event::TimeoutRecovery) => {
                if self.counter > 0 {
                    self.counter -= 1;
                    Outcome::new(false, Some(Action::SendLcpTermReq))
                } else {
                    self.counter = NEGOTIATION_CYCLES;
                    self.state = State::Probing;
                    Outcome::new(false, Some(Action::SendConfReq(Ncp::Lcp)))
                }
            }
            (State::Recovery, Event::RxTerminateReq) => {
                self.counter = NEGOTIATION_CYCLES;
                self.state = State::Negotiating;
                Outcome::new(true, Some(Action::ArmTimer(NEGOTIATING_TIMEOUT)))
            }
            (State::Recovery, Event::RxTerminateAck) => {
                self.counter = NEGOTIATION_CYCLES;
                self.state = State::Negotiating;
                Outcome::new(false, Some(Action::ArmTimer(NEGOTIATING_TIMEOUT)))
            }
            (State::Recovery, Event::RxConfReq(Ncp::Lcp)) => {
                self.set_rx_closed(Ncp::Lcp);
                self.counter = NEGOTIATION_CYCLES;
                self.state = State::Negotiating;
                Outcome::new(true, Some(Action::ArmTimer(NEGOTIATING_TIMEOUT)))
            }

            (State::Probing, Event::Init | Event::RxTerminateReq) => {
                let is_term = event == Event::RxTerminateReq;
                let action = self.restart_recovery();
                Outcome::new(is_term, Some(action))
            }
            (State::Probing, Event::TimeoutProbing) => {
                if self.counter > 0 {
                    self.counter -= 1;
                    Outcome::new(false, Some(Action::SendConfReq(Ncp::Lcp)))
                } else {
                    let action = self.restart_recovery();
                    Outcome::new(false, Some(action))
                }
            }
            (State::Probing, Event::RxConfReq(Ncp::Lcp)) => {
                self.set_rx_closed(Ncp::Lcp);
                self.state = State::Negotiating;
                Outcome::new(true, Some(Action::ArmTimer(NEGOTIATING_TIMEOUT)))
            }
            (State::Probing, Event::RxConfAck(Ncp::Lcp)) => {
                self.set_tx_closed(Ncp::Lcp);
                self.state = State::Negotiating;
                Outcome::new(false, Some(Action::ArmTimer(NEGOTIATING_TIMEOUT)))
            }

            (State::Negotiating, Event::Init | Event::RxTerminateReq) => {
                let is_term = event == Event::RxTerminateReq;
                let action = self.restart_recovery();
                Outcome::new(is_term, Some(action))
            }
            (State::Negotiating, Event::TimeoutNegotiating) => {
                if self.counter > 0 {
                    self.counter -= 1;
                    match self.next_unclosed_tx() {
                        Some(ncp) => {
                            Outcome::new(false, Some(Action::SendConfReq(ncp)))
                        }
                        None => Outcome::new(false, Some(Action::ArmTimer(NEGOTIATING_TIMEOUT))),
                    }
                } else {
                    let action = self.restart_recovery();
                    Outcome::new(false, Some(action))
                }
            }
            (State::Negotiating, Event::RxConfReq(ncp)) => {
                // The protocol-appropriate negotiation counter (not this
                // retry counter) is bumped by the interface counters block
                // the caller owns; this state machine only tracks closed
                // flags and timers.
                self.set_rx_closed(ncp);
                self.maybe_complete_negotiation(true)
            }
            (State::Negotiating, Event::RxConfAck(ncp)) => {
                self.set_tx_closed(ncp);
                self.maybe_complete_negotiation(false)
            }

            (State::Up, Event::Init | Event::RxConfReq(Ncp::Lcp) | Event::RxTerminateReq) => {
                let is_term = event == Event::RxTerminateReq;
                let timer_action = self.restart_recovery();
                Outcome::many(is_term, vec![Action::EmitDown, timer_action])
            }

            _ => Outcome::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_arms_recovery_timer() {
        let mut fsm = PppFsm::new(InterfaceOptions::empty());
        let outcome = fsm.handle(Event::Init);
        assert_eq!(fsm.state(), State::Recovery);
        assert_eq!(outcome.actions, vec![Action::ArmTimer(RECOVERY_TIMEOUT)]);
        assert!(!outcome.send_ack);
    }

    #[test]
    fn recovery_timeout_exhaustion_moves_to_probing() {
        let mut fsm = PppFsm::new(InterfaceOptions::empty());
        fsm.handle(Event::Init);
        fsm.handle(Event::TimeoutRecovery);
        fsm.handle(Event::TimeoutRecovery);
        let outcome = fsm.handle(Event::TimeoutRecovery);
        assert_eq!(fsm.state(), State::Probing);
        assert_eq!(outcome.actions, vec![Action::SendConfReq(Ncp::Lcp)]);
    }

    #[test]
    fn lcp_only_negotiation_reaches_up_after_both_directions_close() {
        let mut fsm = PppFsm::new(InterfaceOptions::empty());
        fsm.handle(Event::Init);
        fsm.handle(Event::RxConfReq(Ncp::Lcp));
        assert_eq!(fsm.state(), State::Negotiating);
        let outcome = fsm.handle(Event::RxConfAck(Ncp::Lcp));
        assert_eq!(fsm.state(), State::Up);
        assert_eq!(outcome.actions, vec![Action::EmitUp]);
    }

    #[test]
    fn ipcp_configured_interface_waits_for_ipcp_before_up() {
        let mut fsm = PppFsm::new(InterfaceOptions::PPP_IPCP);
        fsm.handle(Event::Init);
        fsm.handle(Event::RxConfReq(Ncp::Lcp));
        fsm.handle(Event::RxConfAck(Ncp::Lcp));
        assert_eq!(fsm.state(), State::Negotiating);
        fsm.handle(Event::RxConfReq(Ncp::Ipcp));
        let outcome = fsm.handle(Event::RxConfAck(Ncp::Ipcp));
        assert_eq!(fsm.state(), State::Up);
        assert_eq!(outcome.actions, vec![Action::EmitUp]);
    }

    #[test]
    fn terminate_request_while_up_restarts_recovery_with_ack() {
        let mut fsm = PppFsm::new(InterfaceOptions::empty());
        fsm.handle(Event::Init);
        fsm.handle(Event::RxConfReq(Ncp::Lcp));
        fsm.handle(Event::RxConfAck(Ncp::Lcp));
        assert_eq!(fsm.state(), State::Up);
        let outcome = fsm.handle(Event::RxTerminateReq);
        assert_eq!(fsm.state(), State::Recovery);
        assert!(outcome.send_ack);
    }
}
