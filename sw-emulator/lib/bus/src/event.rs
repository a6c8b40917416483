// Licensed under the Apache-2.0 license.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Counting doorbell.
///
/// `trigger` adds to a counter and wakes a waiter; `wait_and_clear` blocks
/// until the counter is non-zero and returns it, resetting it to zero.
#[derive(Default)]
pub struct Event {
    count: Mutex<u64>,
    cond: Condvar,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        // A poisoned counter is still a valid counter.
        self.count.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn trigger(&self, val: u64) {
        let mut count = self.lock();
        *count = count.saturating_add(val.max(1));
        self.cond.notify_all();
    }

    pub fn wait_and_clear(&self) -> u64 {
        let mut count = self.lock();
        while *count == 0 {
            count = self.cond.wait(count).unwrap_or_else(|e| e.into_inner());
        }
        core::mem::take(&mut *count)
    }

    /// Like [`Event::wait_and_clear`], but gives up after `timeout`
    pub fn wait_timeout(&self, timeout: Duration) -> Option<u64> {
        let deadline = Instant::now() + timeout;
        let mut count = self.lock();
        while *count == 0 {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            count = self
                .cond
                .wait_timeout(count, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
        Some(core::mem::take(&mut *count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_trigger_then_wait() {
        let event = Event::new();
        event.trigger(1);
        event.trigger(2);
        assert_eq!(event.wait_and_clear(), 3);
        assert_eq!(event.wait_timeout(Duration::from_millis(10)), None);
    }

    #[test]
    fn test_wakes_other_thread() {
        let event = Arc::new(Event::new());
        let waiter = {
            let event = event.clone();
            std::thread::spawn(move || event.wait_and_clear())
        };
        std::thread::sleep(Duration::from_millis(20));
        event.trigger(0x1337);
        assert_eq!(waiter.join().unwrap(), 0x1337);
    }
}
