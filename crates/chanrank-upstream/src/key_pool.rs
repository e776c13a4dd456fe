//! Credential key pool with per-key daily unit accounting.
//!
//! The upstream quota is one global resource per key, so every collector in
//! the process shares a single pool. Keys are handed out "sticky
//! round-robin": the current key is reused until it is exhausted, then the
//! cursor advances cyclically to the next usable key.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::UpstreamError;

/// Handle to one key in a [`KeyPool`].
///
/// Cheap to clone. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey {
    index: usize,
    secret: Arc<str>,
}

impl ApiKey {
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Position of this key in the pool.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Log-safe label: the last four characters of the secret.
    #[must_use]
    pub fn masked(&self) -> String {
        mask(&self.secret)
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKey")
            .field("index", &self.index)
            .field("secret", &self.masked())
            .finish()
    }
}

fn mask(secret: &str) -> String {
    let tail: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("…{tail}")
}

/// Point-in-time view of one key's accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyUsage {
    pub key: String,
    pub units_used: u64,
    pub exhausted: bool,
}

#[derive(Debug)]
struct KeySlot {
    secret: Arc<str>,
    units_used: u64,
    exhausted: bool,
}

#[derive(Debug)]
struct PoolState {
    slots: Vec<KeySlot>,
    cursor: usize,
}

#[derive(Debug)]
pub struct KeyPool {
    unit_ceiling: u64,
    state: Mutex<PoolState>,
}

impl KeyPool {
    /// Builds a pool from the configured secrets. Blank entries are ignored.
    pub fn new<I, S>(secrets: I, unit_ceiling: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let slots = secrets
            .into_iter()
            .map(|s| s.as_ref().trim().to_owned())
            .filter(|s| !s.is_empty())
            .map(|s| KeySlot {
                secret: Arc::from(s),
                units_used: 0,
                exhausted: false,
            })
            .collect();
        Self {
            unit_ceiling,
            state: Mutex::new(PoolState { slots, cursor: 0 }),
        }
    }

    // The critical sections below never panic, so a poisoned lock still holds
    // consistent counters.
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn unit_ceiling(&self) -> u64 {
        self.unit_ceiling
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the next usable key.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::AllKeysExhausted`] when no key is usable,
    /// including when the pool was built with no keys at all.
    pub fn next(&self) -> Result<ApiKey, UpstreamError> {
        let mut state = self.lock();
        let len = state.slots.len();
        for step in 0..len {
            let index = (state.cursor + step) % len;
            if !state.slots[index].exhausted {
                state.cursor = index;
                return Ok(ApiKey {
                    index,
                    secret: Arc::clone(&state.slots[index].secret),
                });
            }
        }
        Err(UpstreamError::AllKeysExhausted)
    }

    /// Marks `key` unusable for the rest of the run. Idempotent.
    pub fn mark_exhausted(&self, key: &ApiKey) {
        let mut state = self.lock();
        if let Some(slot) = state.slots.get_mut(key.index) {
            if !slot.exhausted {
                slot.exhausted = true;
                tracing::warn!(
                    key = %key.masked(),
                    units_used = slot.units_used,
                    "upstream key exhausted"
                );
            }
        }
    }

    /// Charges `units` to `key`; reaching the ceiling exhausts the key.
    pub fn record_usage(&self, key: &ApiKey, units: u64) {
        let mut state = self.lock();
        let Some(slot) = state.slots.get_mut(key.index) else {
            return;
        };
        slot.units_used = slot.units_used.saturating_add(units);
        if !slot.exhausted && slot.units_used >= self.unit_ceiling {
            slot.exhausted = true;
            tracing::info!(
                key = %key.masked(),
                units_used = slot.units_used,
                ceiling = self.unit_ceiling,
                "upstream key reached its daily unit ceiling"
            );
        }
    }

    /// `true` while at least one key is usable.
    #[must_use]
    pub fn has_available(&self) -> bool {
        self.lock().slots.iter().any(|s| !s.exhausted)
    }

    /// Clears usage and exhaustion on every key, for when the upstream's
    /// quota day rolls over in a long-lived process.
    pub fn reset(&self) {
        let mut state = self.lock();
        for slot in &mut state.slots {
            slot.units_used = 0;
            slot.exhausted = false;
        }
        state.cursor = 0;
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<KeyUsage> {
        self.lock()
            .slots
            .iter()
            .map(|s| KeyUsage {
                key: mask(&s.secret),
                units_used: s.units_used,
                exhausted: s.exhausted,
            })
            .collect()
    }
}
