//! # Cycles — Detached Dispatch Cycle Registry
//!
//! The scheduler does not wait for a cycle to finish before sleeping until
//! the next tick, so several cycles can be in flight at once (a slow round
//! overlapping the next one, traffic cycles overlapping rounds). Each spawned
//! cycle is tracked here as a handle so the overlap is observable and so a
//! warm shutdown can wait for every cycle to persist before reporting
//! `Stopped`.
//!
//! The observable set is bounded by `scheduler.max_tracked_cycles`. Finished
//! handles are pruned on every insert; if the set is still full, the oldest
//! cycle drops out of [`CycleRegistry::in_flight`] with a warning but stays
//! in an overflow list that [`CycleRegistry::drain`] still awaits. No
//! unfinished cycle is ever detached.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleKind {
    Official(i32),
    Traffic,
}

impl fmt::Display for CycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleKind::Official(n) => write!(f, "round {}", n),
            CycleKind::Traffic => write!(f, "traffic"),
        }
    }
}

struct TrackedCycle {
    kind: CycleKind,
    started_at: DateTime<Utc>,
    handle: JoinHandle<()>,
}

/// Snapshot of one running cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleInfo {
    pub kind: CycleKind,
    pub started_at: DateTime<Utc>,
}

pub struct CycleRegistry {
    capacity: usize,
    cycles: Mutex<VecDeque<TrackedCycle>>,
    overflow: Mutex<Vec<TrackedCycle>>,
}

impl CycleRegistry {
    pub fn new(capacity: usize) -> Self {
        CycleRegistry {
            capacity: capacity.max(1),
            cycles: Mutex::new(VecDeque::new()),
            overflow: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<TrackedCycle>> {
        self.cycles.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_overflow(&self) -> std::sync::MutexGuard<'_, Vec<TrackedCycle>> {
        self.overflow.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Track a freshly spawned cycle.
    pub fn track(&self, kind: CycleKind, handle: JoinHandle<()>) {
        let mut cycles = self.lock();
        let mut overflow = self.lock_overflow();
        cycles.retain(|c| !c.handle.is_finished());
        overflow.retain(|c| !c.handle.is_finished());
        while cycles.len() >= self.capacity {
            if let Some(evicted) = cycles.pop_front() {
                warn!(
                    cycle = %evicted.kind,
                    started_at = %evicted.started_at,
                    "Cycle registry full; oldest cycle no longer listed as in flight"
                );
                overflow.push(evicted);
            }
        }
        debug!(cycle = %kind, tracked = cycles.len() + 1, "Tracking cycle");
        cycles.push_back(TrackedCycle {
            kind,
            started_at: Utc::now(),
            handle,
        });
    }

    /// Cycles that have not finished yet, oldest first.
    pub fn in_flight(&self) -> Vec<CycleInfo> {
        self.lock()
            .iter()
            .filter(|c| !c.handle.is_finished())
            .map(|c| CycleInfo {
                kind: c.kind,
                started_at: c.started_at,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Unfinished cycles evicted from the observable set.
    pub fn overflowed(&self) -> usize {
        self.lock_overflow()
            .iter()
            .filter(|c| !c.handle.is_finished())
            .count()
    }

    /// Wait for every cycle, evicted ones included, to finish. Returns how
    /// many were awaited.
    pub async fn drain(&self) -> usize {
        let mut handles: Vec<TrackedCycle> = self.lock_overflow().drain(..).collect();
        handles.extend(self.lock().drain(..));
        let count = handles.len();
        for cycle in handles {
            if let Err(e) = cycle.handle.await {
                error!(cycle = %cycle.kind, error = %e, "Cycle task panicked");
            }
        }
        count
    }
}
