//! Dashboard state container.
//!
//! Holds the most recently published aggregation result and notifies
//! subscribers through a `watch` channel. Every refresh takes a
//! [`CycleTicket`]; a cycle that finishes after a newer one has started is
//! discarded instead of overwriting fresher state.

use crate::aggregator::AggregateOutcome;
use campaign_core::types::DashboardFilters;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub generation: u64,
    pub filters: DashboardFilters,
    pub outcome: AggregateOutcome,
}

/// Proof that a refresh cycle was started; carries its generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTicket {
    generation: u64,
}

impl CycleTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

pub struct DashboardState {
    generation: AtomicU64,
    tx: watch::Sender<Option<Arc<DashboardSnapshot>>>,
}

impl DashboardState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            generation: AtomicU64::new(0),
            tx,
        }
    }

    /// Start a new cycle, superseding any cycle still in flight.
    pub fn begin_cycle(&self) -> CycleTicket {
        CycleTicket {
            generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
        }
    }

    pub fn is_current(&self, ticket: CycleTicket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.generation
    }

    /// Publish the result of `ticket`'s cycle. Returns `false` when a newer
    /// cycle has started or already published.
    pub fn publish(&self, ticket: CycleTicket, filters: DashboardFilters, outcome: AggregateOutcome) -> bool {
        if !self.is_current(ticket) {
            metrics::counter!("state.cycles.superseded").increment(1);
            debug!(generation = ticket.generation, "Discarding superseded cycle");
            return false;
        }
        let snapshot = Arc::new(DashboardSnapshot {
            generation: ticket.generation,
            filters,
            outcome,
        });
        self.tx.send_if_modified(|current| {
            let newer = current.as_ref().map_or(true, |c| c.generation < snapshot.generation);
            if newer {
                *current = Some(snapshot.clone());
            }
            newer
        })
    }

    pub fn latest(&self) -> Option<Arc<DashboardSnapshot>> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<DashboardSnapshot>>> {
        self.tx.subscribe()
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}
