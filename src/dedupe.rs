use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, trace};

/// Coalescer state for one in-flight query key.
struct DedupeEntry {
    completed_tx: watch::Sender<bool>,
    completed_rx: watch::Receiver<bool>,
    /// Deadline after which waiters may supersede the owner.
    wait_until: Instant,
}

impl DedupeEntry {
    fn new(wait_budget: Duration) -> Self {
        let (completed_tx, completed_rx) = watch::channel(false);
        Self {
            completed_tx,
            completed_rx,
            wait_until: Instant::now() + wait_budget,
        }
    }
}

/// Outcome of joining the single-flight registry.
pub enum DedupeOutcome {
    /// This caller owns the upstream request; completion is signaled when
    /// the guard drops.
    Owner(DedupeGuard),
    /// A concurrent owner finished; re-run the cache lookup before
    /// resolving.
    Released,
}

/// Single-flight registry: coalesces concurrent identical queries.
///
/// At most one owner exists per key, except during the supersession overlap
/// after an owner exceeds its wait budget.
pub struct QueryDeduper {
    inflight: Mutex<HashMap<String, Arc<DedupeEntry>>>,
    wait_budget: Duration,
}

impl QueryDeduper {
    pub fn new(wait_budget: Duration) -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
            wait_budget,
        }
    }

    /// Join the in-flight request for `key`, or become its owner.
    ///
    /// Followers wait for the owner's completion signal, bounded by the wait
    /// budget; on expiry they retry the registry and may supersede a stalled
    /// owner. Caller cancellation is honored at the await point.
    pub async fn join(self: &Arc<Self>, key: &str) -> DedupeOutcome {
        loop {
            let entry = {
                let mut inflight = self.inflight.lock();
                match inflight.get(key) {
                    Some(entry) if Instant::now() < entry.wait_until => entry.clone(),
                    Some(_) => {
                        // Stalled owner: install a new one alongside it. The
                        // old owner's guard no longer matches the slot and
                        // will leave it alone.
                        debug!("superseding stalled query owner for {}", key);
                        let entry = Arc::new(DedupeEntry::new(self.wait_budget));
                        inflight.insert(key.to_string(), entry.clone());
                        return DedupeOutcome::Owner(DedupeGuard {
                            deduper: self.clone(),
                            key: key.to_string(),
                            entry,
                        });
                    }
                    None => {
                        let entry = Arc::new(DedupeEntry::new(self.wait_budget));
                        inflight.insert(key.to_string(), entry.clone());
                        return DedupeOutcome::Owner(DedupeGuard {
                            deduper: self.clone(),
                            key: key.to_string(),
                            entry,
                        });
                    }
                }
            };

            trace!("waiting for in-flight query {}", key);
            let mut completed = entry.completed_rx.clone();
            match tokio::time::timeout(self.wait_budget, completed.wait_for(|done| *done)).await {
                // Completed (or the owner vanished): the caller must retry
                // the cache before resolving on its own.
                Ok(_) => return DedupeOutcome::Released,
                // Backstop expired: retry the registry.
                Err(_) => continue,
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inflight.lock().len()
    }
}

/// Owner handle; signals completion and clears the registry slot on drop.
pub struct DedupeGuard {
    deduper: Arc<QueryDeduper>,
    key: String,
    entry: Arc<DedupeEntry>,
}

impl Drop for DedupeGuard {
    fn drop(&mut self) {
        let _ = self.entry.completed_tx.send(true);

        let mut inflight = self.deduper.inflight.lock();
        if let Some(current) = inflight.get(&self.key) {
            // Identity check: only remove the slot if it is still ours, so a
            // superseded owner never deletes its successor's registration.
            if Arc::ptr_eq(current, &self.entry) {
                inflight.remove(&self.key);
            }
        }
    }
}
