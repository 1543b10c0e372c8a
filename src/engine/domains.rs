//! Per-domain politeness accounting
//!
//! Each domain gets a bounded number of in-flight fetches across all jobs,
//! independent of the global worker pool. A worker that cannot get a permit
//! simply defers that URL; nothing blocks on a saturated domain.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Caps concurrent fetches per domain
pub struct DomainGuard {
    max_per_domain: usize,
    counts: Mutex<HashMap<String, usize>>,
}

impl DomainGuard {
    pub fn new(max_per_domain: usize) -> Self {
        Self {
            max_per_domain: max_per_domain.max(1),
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// Claims an in-flight slot for `domain`, if one is free
    ///
    /// The slot is released when the returned permit drops, which ties the
    /// accounting to the fetch's lifetime no matter how the fetch ends.
    pub fn try_begin(self: &Arc<Self>, domain: &str) -> Option<DomainPermit> {
        let mut counts = self.counts.lock().expect("domain guard lock poisoned");
        let count = counts.entry(domain.to_string()).or_insert(0);
        if *count >= self.max_per_domain {
            return None;
        }
        *count += 1;
        Some(DomainPermit {
            guard: Arc::clone(self),
            domain: domain.to_string(),
        })
    }

    /// Current in-flight count for a domain
    pub fn in_flight(&self, domain: &str) -> usize {
        let counts = self.counts.lock().expect("domain guard lock poisoned");
        counts.get(domain).copied().unwrap_or(0)
    }

    fn release(&self, domain: &str) {
        let mut counts = self.counts.lock().expect("domain guard lock poisoned");
        if let Some(count) = counts.get_mut(domain) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(domain);
            }
        }
    }
}

/// RAII token for one in-flight fetch against one domain
pub struct DomainPermit {
    guard: Arc<DomainGuard>,
    domain: String,
}

impl Drop for DomainPermit {
    fn drop(&mut self) {
        self.guard.release(&self.domain);
    }
}
