//! Dirty-checked persistence with a debounce for free text and an interval backstop.

use crate::session::storage::{save, Storage};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const TEXT_DEBOUNCE: Duration = Duration::from_millis(500);
pub const BACKSTOP_INTERVAL: Duration = Duration::from_secs(30);

/// Autosave state for one storage key.
///
/// Writes are skipped when the serialized value equals the last one persisted.
#[derive(Debug, Clone)]
pub struct Autosave {
    key: &'static str,
    last_persisted: Option<String>,
    debounce_deadline: Option<Instant>,
    next_backstop: Instant,
}

impl Autosave {
    pub fn new(key: &'static str, now: Instant) -> Self {
        Self {
            key,
            last_persisted: None,
            debounce_deadline: None,
            next_backstop: now + BACKSTOP_INTERVAL,
        }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    /// Record a value already known to be in storage (e.g. just restored).
    pub fn mark_persisted<T: Serialize>(&mut self, value: &T) {
        self.last_persisted = serde_json::to_string(value).ok();
    }

    /// Forget the last write; the next save always hits storage.
    pub fn forget(&mut self) {
        self.last_persisted = None;
        self.debounce_deadline = None;
    }

    /// (Re)start the debounce window.
    pub fn schedule(&mut self, now: Instant) {
        self.debounce_deadline = Some(now + TEXT_DEBOUNCE);
    }

    pub fn is_pending(&self) -> bool {
        self.debounce_deadline.is_some()
    }

    /// Write `value` unless it is unchanged. Returns whether storage was written.
    pub fn save_now<T: Serialize>(&mut self, storage: &mut impl Storage, value: &T) -> bool {
        self.debounce_deadline = None;
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!(key = self.key, error = %e, "Autosave could not serialize value");
                return false;
            }
        };
        if self.last_persisted.as_deref() == Some(json.as_str()) {
            return false;
        }
        match save(storage, self.key, value) {
            Ok(written) => {
                debug!(key = self.key, bytes = written.len(), "Autosaved");
                self.last_persisted = Some(written);
                true
            }
            Err(e) => {
                warn!(key = self.key, error = %e, "Autosave failed");
                false
            }
        }
    }

    /// Flush an expired debounce, or run the interval backstop when due.
    pub fn poll<T: Serialize>(&mut self, storage: &mut impl Storage, value: &T, now: Instant) -> bool {
        if self.debounce_deadline.is_some_and(|deadline| now >= deadline) {
            return self.save_now(storage, value);
        }
        if now >= self.next_backstop {
            self.next_backstop = now + BACKSTOP_INTERVAL;
            return self.save_now(storage, value);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::storage::MemoryStorage;

    #[test]
    fn unchanged_values_are_not_rewritten() {
        let now = Instant::now();
        let mut storage = MemoryStorage::new();
        let mut autosave = Autosave::new("k", now);

        assert!(autosave.save_now(&mut storage, &"one"));
        assert!(!autosave.save_now(&mut storage, &"one"));
        assert!(autosave.save_now(&mut storage, &"two"));
        assert_eq!(storage.get("k").as_deref(), Some("\"two\""));
    }

    #[test]
    fn debounce_waits_for_quiet_period() {
        let start = Instant::now();
        let mut storage = MemoryStorage::new();
        let mut autosave = Autosave::new("k", start);

        autosave.schedule(start);
        assert!(!autosave.poll(&mut storage, &"draft", start + Duration::from_millis(300)));
        autosave.schedule(start + Duration::from_millis(300));
        assert!(!autosave.poll(&mut storage, &"draft", start + Duration::from_millis(700)));
        assert!(autosave.poll(&mut storage, &"draft", start + Duration::from_millis(800)));
        assert!(!autosave.is_pending());
    }

    #[test]
    fn backstop_catches_missed_changes() {
        let start = Instant::now();
        let mut storage = MemoryStorage::new();
        let mut autosave = Autosave::new("k", start);

        assert!(!autosave.poll(&mut storage, &"v", start + Duration::from_secs(29)));
        assert!(autosave.poll(&mut storage, &"v", start + Duration::from_secs(30)));
        // Next window, value unchanged: dirty check skips the write.
        assert!(!autosave.poll(&mut storage, &"v", start + Duration::from_secs(61)));
    }

    #[test]
    fn forget_forces_next_write() {
        let now = Instant::now();
        let mut storage = MemoryStorage::new();
        let mut autosave = Autosave::new("k", now);
        autosave.mark_persisted(&"same");
        assert!(!autosave.save_now(&mut storage, &"same"));
        autosave.forget();
        assert!(autosave.save_now(&mut storage, &"same"));
    }
}
