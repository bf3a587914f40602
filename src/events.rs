//! Event notification fan-out (C10): three fixed subscriber lists an
//! embedding application registers against, delivered best-effort as the
//! PPP state machine (or `init()`) reaches the matching milestone. Grounded
//! on the subscriber-list walk in `rnet-top.c`'s init-complete broadcast.

use crate::config::LISTENER_DISABLED;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    InitComplete,
    IntfcUp,
    IntfcDown,
}

#[derive(Debug, Clone, Copy)]
pub struct Subscriber {
    pub msg_fields: u32,
    pub task: Option<u32>,
}

impl Subscriber {
    fn enabled(&self) -> bool {
        self.msg_fields != LISTENER_DISABLED && self.task.is_some()
    }
}

/// A single best-effort delivery: `(msg_fields, optional_parameter)` handed
/// to one subscriber's task. What "deliver" means (an actual IPC send) is
/// the embedding application's concern; this crate only computes the list.
#[derive(Debug, Clone, Copy)]
pub struct Delivery {
    pub task: u32,
    pub msg_fields: u32,
    pub parameter: Option<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct EventLists {
    init_complete: Vec<Subscriber>,
    intfc_up: Vec<Subscriber>,
    intfc_down: Vec<Subscriber>,
}

impl EventLists {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, kind: EventKind, subscriber: Subscriber) {
        self.list_mut(kind).push(subscriber);
    }

    fn list_mut(&mut self, kind: EventKind) -> &mut Vec<Subscriber> {
        match kind {
            EventKind::InitComplete => &mut self.init_complete,
            EventKind::IntfcUp => &mut self.intfc_up,
            EventKind::IntfcDown => &mut self.intfc_down,
        }
    }

    fn list(&self, kind: EventKind) -> &[Subscriber] {
        match kind {
            EventKind::InitComplete => &self.init_complete,
            EventKind::IntfcUp => &self.intfc_up,
            EventKind::IntfcDown => &self.intfc_down,
        }
    }

    /// Compute the fan-out for `kind`, in subscription order, skipping
    /// disabled subscribers.
    pub fn fan_out(&self, kind: EventKind, parameter: Option<u8>) -> Vec<Delivery> {
        self.list(kind)
            .iter()
            .filter(|s| s.enabled())
            .map(|s| Delivery {
                task: s.task.expect("enabled() guarantees Some"),
                msg_fields: s.msg_fields,
                parameter,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_subscribers_are_skipped() {
        let mut lists = EventLists::new();
        lists.subscribe(
            EventKind::IntfcUp,
            Subscriber {
                msg_fields: LISTENER_DISABLED,
                task: Some(1),
            },
        );
        lists.subscribe(
            EventKind::IntfcUp,
            Subscriber {
                msg_fields: 42,
                task: Some(2),
            },
        );
        let deliveries = lists.fan_out(EventKind::IntfcUp, Some(0));
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].task, 2);
        assert_eq!(deliveries[0].msg_fields, 42);
    }

    #[test]
    fn fan_out_preserves_subscription_order() {
        let mut lists = EventLists::new();
        for task in [5, 3, 9] {
            lists.subscribe(
                EventKind::InitComplete,
                Subscriber {
                    msg_fields: 1,
                    task: Some(task),
                },
            );
        }
        let deliveries = lists.fan_out(EventKind::InitComplete, None);
        let tasks: Vec<u32> = deliveries.iter().map(|d| d.task).collect();
        assert_eq!(tasks, vec![5, 3, 9]);
    }
}
