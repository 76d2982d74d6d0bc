//! Bounded window of applied proposal ids.
//!
//! Each origin keeps its own FIFO so a chatty node cannot evict the history
//! of a quiet one. Re-delivered commits whose id is still in the window are
//! skipped.

use super::command::ProposalId;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Default)]
struct OriginWindow {
    order: VecDeque<u64>,
    seen: HashSet<u64>,
}

/// Recently applied proposal ids, bounded per origin.
#[derive(Debug)]
pub struct ProposalWindow {
    capacity: usize,
    origins: HashMap<String, OriginWindow>,
}

impl ProposalWindow {
    /// Create a window keeping `capacity` ids per origin (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            origins: HashMap::new(),
        }
    }

    pub fn contains(&self, id: &ProposalId) -> bool {
        self.origins
            .get(&id.origin)
            .is_some_and(|window| window.seen.contains(&id.sequence))
    }

    /// Record an applied id. Returns false if it was already present.
    pub fn record(&mut self, id: &ProposalId) -> bool {
        let window = self.origins.entry(id.origin.clone()).or_default();
        if !window.seen.insert(id.sequence) {
            return false;
        }
        window.order.push_back(id.sequence);
        while window.order.len() > self.capacity {
            if let Some(evicted) = window.order.pop_front() {
                window.seen.remove(&evicted);
            }
        }
        true
    }

    /// Forget everything and take over a peer's window.
    pub fn replace<'a>(&mut self, ids: impl IntoIterator<Item = &'a ProposalId>) {
        self.origins.clear();
        for id in ids {
            self.record(id);
        }
    }

    /// All ids currently held, oldest first per origin.
    pub fn recent(&self) -> Vec<ProposalId> {
        let mut origins: Vec<_> = self.origins.iter().collect();
        origins.sort_by(|a, b| a.0.cmp(b.0));
        origins
            .into_iter()
            .flat_map(|(origin, window)| {
                window
                    .order
                    .iter()
                    .map(move |sequence| ProposalId::new(origin.clone(), *sequence))
            })
            .collect()
    }

    /// Highest sequence recorded for an origin.
    pub fn last_sequence(&self, origin: &str) -> Option<u64> {
        self.origins
            .get(origin)
            .and_then(|window| window.order.iter().max().copied())
    }

    /// Total ids held across origins.
    pub fn len(&self) -> usize {
        self.origins.values().map(|window| window.order.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
