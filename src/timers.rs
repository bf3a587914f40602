//! Per-interface timer service (part of C9's concurrency model): "arm" is
//! idempotent-replace (re-arming cancels whatever was previously pending on
//! that interface) and "kill" is safe to call on a disarmed timer. Grounded
//! on `rnet-intfc.c`'s one-timer-per-interface allocation at `init()`, here
//! expressed as a trait so a host binary can back it with real OS timers
//! while tests use a manual clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::dispatch::DispatchMsg;
use crate::ppp::fsm::Event as FsmEvent;

/// Which FSM timeout event to post when a timer expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    Recovery,
    Probing,
    Negotiating,
}

impl TimeoutKind {
    pub fn into_event(self) -> FsmEvent {
        match self {
            TimeoutKind::Recovery => FsmEvent::TimeoutRecovery,
            TimeoutKind::Probing => FsmEvent::TimeoutProbing,
            TimeoutKind::Negotiating => FsmEvent::TimeoutNegotiating,
        }
    }
}

pub trait TimerService: Send + Sync {
    /// Arm interface `intfc`'s timer to fire `kind` after `after`, replacing
    /// any timer already pending on that interface.
    fn arm(&self, intfc: u8, after: Duration, kind: TimeoutKind);
    /// Cancel whatever is pending on `intfc`'s timer, if anything.
    fn kill(&self, intfc: u8);
}

/// Real timer service: one OS thread per arm, gated by a per-interface
/// generation counter so a stale sleep waking up after a re-arm or kill is a
/// no-op rather than racing the replacement.
pub struct ThreadTimerService {
    sender: Sender<DispatchMsg>,
    generations: Arc<Mutex<Vec<Arc<AtomicU64>>>>,
}

impl ThreadTimerService {
    pub fn new(sender: Sender<DispatchMsg>, num_interfaces: usize) -> Self {
        let generations = (0..num_interfaces).map(|_| Arc::new(AtomicU64::new(0))).collect();
        Self {
            sender,
            generations: Arc::new(Mutex::new(generations)),
        }
    }
}

impl TimerService for ThreadTimerService {
    fn arm(&self, intfc: u8, after: Duration, kind: TimeoutKind) {
        let generations = self.generations.lock();
        let Some(slot) = generations.get(intfc as usize) else {
            return;
        };
        let slot = slot.clone();
        let my_generation = slot.fetch_add(1, Ordering::SeqCst) + 1;
        let sender = self.sender.clone();
        std::thread::spawn(move || {
            std::thread::sleep(after);
            if slot.load(Ordering::SeqCst) == my_generation {
                let _ = sender.send(DispatchMsg::PppTimeout(intfc, kind.into_event()));
            }
        });
    }

    fn kill(&self, intfc: u8) {
        let generations = self.generations.lock();
        if let Some(slot) = generations.get(intfc as usize) {
            slot.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Test/demo double: records the most recent arm/kill per interface instead
/// of actually waiting, so scenario tests can single-step the FSM by
/// synthesizing timeout events without wall-clock delay.
#[derive(Debug, Default)]
pub struct ManualTimerService {
    armed: Mutex<Vec<Option<(Duration, TimeoutKind)>>>,
}

impl ManualTimerService {
    pub fn new(num_interfaces: usize) -> Self {
        Self {
            armed: Mutex::new(vec![None; num_interfaces]),
        }
    }

    pub fn pending(&self, intfc: u8) -> Option<(Duration, TimeoutKind)> {
        self.armed.lock().get(intfc as usize).copied().flatten()
    }
}

impl TimerService for ManualTimerService {
    fn arm(&self, intfc: u8, after: Duration, kind: TimeoutKind) {
        if let Some(slot) = self.armed.lock().get_mut(intfc as usize) {
            *slot = Some((after, kind));
        }
    }

    fn kill(&self, intfc: u8) {
        if let Some(slot) = self.armed.lock().get_mut(intfc as usize) {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_timer_arm_then_kill_clears_pending() {
        let timers = ManualTimerService::new(2);
        timers.arm(0, Duration::from_millis(200), TimeoutKind::Recovery);
        assert_eq!(
            timers.pending(0),
            Some((Duration::from_millis(200), TimeoutKind::Recovery))
        );
        timers.kill(0);
        assert_eq!(timers.pending(0), None);
    }

    #[test]
    fn manual_timer_re_arm_replaces_prior() {
        let timers = ManualTimerService::new(1);
        timers.arm(0, Duration::from_millis(200), TimeoutKind::Recovery);
        timers.arm(0, Duration::from_millis(1000), TimeoutKind::Probing);
        assert_eq!(
            timers.pending(0),
            Some((Duration::from_millis(1000), TimeoutKind::Probing))
        );
    }
}
