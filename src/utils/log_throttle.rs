use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct Window {
    opened_at: Instant,
    suppressed: u64,
}

/// Rate limiter for repetitive background logs (auto refresh ticks, token
/// refresh notices). Each provider and synchronizer owns one, so two tabs
/// never share a window.
pub struct LogThrottle {
    interval: Duration,
    windows: Mutex<HashMap<&'static str, Window>>,
}

impl LogThrottle {
    pub fn new(interval: Duration) -> Self {
        LogThrottle {
            interval,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// `Some(suppressed_since_last)` when a log for `key` may be written now,
    /// `None` when it falls inside the open window and is only counted.
    pub fn admit(&self, key: &'static str) -> Option<u64> {
        self.admit_at(key, Instant::now())
    }

    fn admit_at(&self, key: &'static str, now: Instant) -> Option<u64> {
        let mut windows = self.windows();
        let window = match windows.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(Window {
                    opened_at: now,
                    suppressed: 0,
                });
                return Some(0);
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };
        if now.duration_since(window.opened_at) < self.interval {
            window.suppressed += 1;
            return None;
        }
        let suppressed = std::mem::take(&mut window.suppressed);
        window.opened_at = now;
        Some(suppressed)
    }

    fn windows(&self) -> MutexGuard<'_, HashMap<&'static str, Window>> {
        self.windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
