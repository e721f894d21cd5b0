//! Per-product exclusive locks.
//!
//! A document locks every product it touches before reading any stock.
//! Acquisition is in ascending product id order, so two documents sharing
//! products can never wait on each other in a cycle. Each attempt waits at
//! most `timeout`; a timed-out attempt gives back everything it took and
//! starts over, up to `attempts` times, then fails with `Busy`.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use stockledger_core::{InventoryError, InventoryResult, ProductId};

use crate::config::EngineConfig;

#[derive(Debug)]
pub struct LockManager {
    held: Mutex<HashSet<ProductId>>,
    released: Condvar,
    timeout: Duration,
    attempts: u32,
}

impl LockManager {
    pub fn new(timeout: Duration, attempts: u32) -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
            timeout,
            attempts: attempts.max(1),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.lock_timeout(), config.lock_retry_attempts)
    }

    fn table(&self) -> MutexGuard<'_, HashSet<ProductId>> {
        // The table is never left half-updated while its mutex is held.
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock every product in `ids` (duplicates allowed).
    pub fn acquire(&self, ids: impl IntoIterator<Item = ProductId>) -> InventoryResult<ProductLocks<'_>> {
        let mut ids: Vec<ProductId> = ids.into_iter().collect();
        ids.sort();
        ids.dedup();

        for attempt in 1..=self.attempts {
            if self.acquire_in_order(&ids) {
                return Ok(ProductLocks { manager: self, ids });
            }
            debug!(attempt, products = ids.len(), "product lock attempt timed out");
        }

        warn!(
            attempts = self.attempts,
            products = ids.len(),
            timeout_ms = self.timeout.as_millis() as u64,
            "giving up on product locks"
        );
        Err(InventoryError::Busy {
            attempts: self.attempts,
        })
    }

    /// One bounded attempt. On timeout, releases whatever it took.
    fn acquire_in_order(&self, ids: &[ProductId]) -> bool {
        let deadline = Instant::now() + self.timeout;
        let mut held = self.table();

        for (taken, id) in ids.iter().enumerate() {
            while held.contains(id) {
                let now = Instant::now();
                if now >= deadline {
                    for prev in &ids[..taken] {
                        held.remove(prev);
                    }
                    drop(held);
                    self.released.notify_all();
                    return false;
                }
                held = self
                    .released
                    .wait_timeout(held, deadline - now)
                    .map(|(guard, _)| guard)
                    .unwrap_or_else(|poisoned| poisoned.into_inner().0);
            }
            held.insert(*id);
        }
        true
    }

    fn release(&self, ids: &[ProductId]) {
        let mut held = self.table();
        for id in ids {
            held.remove(id);
        }
        drop(held);
        self.released.notify_all();
    }

    #[cfg(test)]
    fn is_locked(&self, id: ProductId) -> bool {
        self.table().contains(&id)
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Locks held for a set of products; released on drop.
#[derive(Debug)]
pub struct ProductLocks<'a> {
    manager: &'a LockManager,
    ids: Vec<ProductId>,
}

impl ProductLocks<'_> {
    /// Locked products, ascending.
    pub fn products(&self) -> &[ProductId] {
        &self.ids
    }

    pub fn covers(&self, id: ProductId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }
}

impl Drop for ProductLocks<'_> {
    fn drop(&mut self) {
        self.manager.release(&self.ids);
    }
}
