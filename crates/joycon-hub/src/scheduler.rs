//! The single-flight initialization scheduler.
//!
//! Initializing two controllers concurrently misroutes replies on the
//! shared transport, so at most one entry is ever in service system-wide.
//! The manager pops entries, runs the init sequence through the subcommand
//! engine, and calls [`Scheduler::finish`] exactly once per completion.

use crate::DeviceHandle;
use std::collections::VecDeque;
use std::time::Instant;

#[derive(Debug)]
pub(crate) struct InitQueueEntry {
    pub handle: DeviceHandle,
    /// Logging only.
    pub display_name: String,
}

#[derive(Debug)]
struct InService {
    handle: DeviceHandle,
    /// Pending settle wait; cleared once the first subcommand may go out.
    settle_until: Option<Instant>,
}

#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    queue: VecDeque<InitQueueEntry>,
    in_service: Option<InService>,
}

impl Scheduler {
    pub fn new() -> Scheduler {
        Scheduler::default()
    }

    pub fn enqueue(&mut self, entry: InitQueueEntry) {
        self.queue.push_back(entry);
    }

    /// Drops a not-yet-served queue entry. True when one was removed.
    pub fn remove_queued(&mut self, handle: DeviceHandle) -> bool {
        let before = self.queue.len();
        self.queue.retain(|e| e.handle != handle);
        self.queue.len() != before
    }

    pub fn is_busy(&self) -> bool {
        self.in_service.is_some()
    }

    pub fn current(&self) -> Option<DeviceHandle> {
        self.in_service.as_ref().map(|s| s.handle)
    }

    pub fn pop(&mut self) -> Option<InitQueueEntry> {
        debug_assert!(!self.is_busy());
        self.queue.pop_front()
    }

    pub fn begin(&mut self, handle: DeviceHandle, settle_until: Instant) {
        debug_assert!(!self.is_busy());
        self.in_service = Some(InService {
            handle,
            settle_until: Some(settle_until),
        });
    }

    pub fn settle_deadline(&self) -> Option<Instant> {
        self.in_service.as_ref().and_then(|s| s.settle_until)
    }

    /// Clears and returns the in-service handle whose settle wait elapsed.
    pub fn take_due_settle(&mut self, now: Instant) -> Option<DeviceHandle> {
        let service = self.in_service.as_mut()?;
        match service.settle_until {
            Some(deadline) if deadline <= now => {
                service.settle_until = None;
                Some(service.handle)
            }
            _ => None,
        }
    }

    /// Vacates the single-flight slot. True when `handle` held it.
    pub fn finish(&mut self, handle: DeviceHandle) -> bool {
        match &self.in_service {
            Some(s) if s.handle == handle => {
                self.in_service = None;
                true
            }
            _ => false,
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry(handle: u32) -> InitQueueEntry {
        InitQueueEntry {
            handle: DeviceHandle(handle),
            display_name: format!("pad {}", handle),
        }
    }

    #[test]
    fn fifo_order() {
        let mut sched = Scheduler::new();
        sched.enqueue(entry(1));
        sched.enqueue(entry(2));
        assert_eq!(sched.pop().unwrap().handle, DeviceHandle(1));
        assert_eq!(sched.pop().unwrap().handle, DeviceHandle(2));
        assert!(sched.pop().is_none());
    }

    #[test]
    fn settle_fires_once() {
        let mut sched = Scheduler::new();
        let t0 = Instant::now();
        sched.begin(DeviceHandle(1), t0 + Duration::from_millis(250));

        assert_eq!(sched.take_due_settle(t0), None);
        assert_eq!(
            sched.take_due_settle(t0 + Duration::from_millis(250)),
            Some(DeviceHandle(1))
        );
        // Consumed; the slot stays busy until finish().
        assert_eq!(sched.take_due_settle(t0 + Duration::from_secs(1)), None);
        assert!(sched.is_busy());

        assert!(!sched.finish(DeviceHandle(2)));
        assert!(sched.finish(DeviceHandle(1)));
        assert!(!sched.is_busy());
    }

    #[test]
    fn remove_queued_only_touches_queue() {
        let mut sched = Scheduler::new();
        sched.enqueue(entry(1));
        sched.enqueue(entry(2));
        assert!(sched.remove_queued(DeviceHandle(2)));
        assert!(!sched.remove_queued(DeviceHandle(2)));
        assert_eq!(sched.queued(), 1);
    }
}
