//! Quorum-gated garbage collection
//!
//! Authorizes hard-deletion of resources already marked pending-delete
//! without risking deletion of something an active-but-slow agent has not
//! yet observed. Per resource kind, the purge watermark is the oldest sync
//! timestamp every currently-active agent has confirmed; with no active
//! agents the watermark is unconstrained. Kinds fail independently - an
//! error in one kind never aborts the sweep of the others.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lbfleet_core::{FleetError, RecordId, ResourceKind, Result};
use lbfleet_telemetry::Counter;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::registry::FleetRegistry;

/// Capability a resource store must provide to participate in the sweep
#[async_trait]
pub trait SoftDeletableStore: Send + Sync {
    /// Ids of records with pending_deleted set and pending_deleted_at
    /// strictly before `cutoff`
    async fn list_pending_deleted_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<RecordId>>;

    /// Permanently remove one record
    async fn purge(&self, id: RecordId) -> Result<()>;
}

/// Static table of sweepable stores, one per resource kind, built once at
/// process start
#[derive(Default)]
pub struct GcTable {
    stores: HashMap<ResourceKind, Arc<dyn SoftDeletableStore>>,
}

impl GcTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ResourceKind, store: Arc<dyn SoftDeletableStore>) {
        self.stores.insert(kind, store);
    }

    pub fn get(&self, kind: ResourceKind) -> Option<&Arc<dyn SoftDeletableStore>> {
        self.stores.get(&kind)
    }

    /// Register an in-memory store for every resource kind
    pub fn with_memory_stores() -> (Self, HashMap<ResourceKind, Arc<InMemorySoftDeleteStore>>) {
        let mut table = Self::new();
        let mut stores = HashMap::new();
        for kind in ResourceKind::ALL {
            let store = Arc::new(InMemorySoftDeleteStore::new());
            table.register(kind, store.clone());
            stores.insert(kind, store);
        }
        (table, stores)
    }
}

/// A soft-deletable record as the sweep sees it
#[derive(Debug, Clone)]
struct SoftDeletedRecord {
    pending_deleted: bool,
    pending_deleted_at: Option<DateTime<Utc>>,
}

/// In-memory [`SoftDeletableStore`]. Records are inserted and marked
/// pending-delete by logic outside this core; the sweep only consumes them.
#[derive(Default)]
pub struct InMemorySoftDeleteStore {
    records: DashMap<RecordId, SoftDeletedRecord>,
}

impl InMemorySoftDeleteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: RecordId) {
        self.records.insert(
            id,
            SoftDeletedRecord {
                pending_deleted: false,
                pending_deleted_at: None,
            },
        );
    }

    pub fn mark_pending_deleted(&self, id: RecordId, at: DateTime<Utc>) {
        if let Some(mut record) = self.records.get_mut(&id) {
            record.pending_deleted = true;
            record.pending_deleted_at = Some(at);
        }
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl SoftDeletableStore for InMemorySoftDeleteStore {
    async fn list_pending_deleted_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<RecordId>> {
        Ok(self
            .records
            .iter()
            .filter(|entry| {
                entry.pending_deleted
                    && entry
                        .pending_deleted_at
                        .map(|t| t < cutoff)
                        .unwrap_or(false)
            })
            .map(|entry| *entry.key())
            .collect())
    }

    async fn purge(&self, id: RecordId) -> Result<()> {
        self.records
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| FleetError::Internal(format!("record {} vanished before purge", id)))
    }
}

/// Outcome of one kind within a sweep
#[derive(Debug, Clone, Serialize)]
pub enum KindOutcome {
    /// Records purged under the given cutoff (None = unconstrained)
    Purged {
        cutoff: Option<DateTime<Utc>>,
        count: usize,
    },
    /// Skipped: some active agent has not reported this kind yet
    SkippedUnreported,
    /// Skipped: no store registered for this kind
    SkippedUnregistered,
    /// Query or purge failed; sweep continued with the next kind
    Failed { message: String },
}

/// Result of a whole sweep, per kind
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub outcomes: Vec<(ResourceKind, KindOutcome)>,
}

impl SweepReport {
    pub fn total_purged(&self) -> usize {
        self.outcomes
            .iter()
            .map(|(_, o)| match o {
                KindOutcome::Purged { count, .. } => *count,
                _ => 0,
            })
            .sum()
    }
}

/// Periodic sweeper over all registered resource kinds
pub struct GcSweeper {
    registry: Arc<FleetRegistry>,
    table: GcTable,
    purged_total: Counter,
}

impl GcSweeper {
    pub fn new(registry: Arc<FleetRegistry>, table: GcTable) -> Self {
        Self {
            registry,
            table,
            purged_total: Counter::new("gc_purged_total"),
        }
    }

    pub fn purged_total(&self) -> u64 {
        self.purged_total.get()
    }

    /// Run one sweep across every resource kind. Liveness and watermark
    /// state are snapshotted at sweep start; each kind is processed
    /// independently and a failure in one kind only skips that kind.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let active = self.registry.active_agents(now).await;
        let mut report = SweepReport::default();

        for kind in ResourceKind::ALL {
            let outcome = self.sweep_kind(kind, &active, now).await;
            if let KindOutcome::Purged { count, .. } = &outcome {
                self.purged_total.add(*count as u64);
            }
            report.outcomes.push((kind, outcome));
        }

        info!(
            active_agents = active.len(),
            purged = report.total_purged(),
            "GC sweep finished"
        );
        report
    }

    async fn sweep_kind(
        &self,
        kind: ResourceKind,
        active: &[crate::registry::Agent],
        _now: DateTime<Utc>,
    ) -> KindOutcome {
        // watermark: the oldest timestamp every active agent has confirmed;
        // unconstrained when no agent is alive to observe deletions
        let cutoff = if active.is_empty() {
            None
        } else {
            let mut min: Option<DateTime<Utc>> = None;
            for agent in active {
                match agent.sync_watermarks.get(&kind) {
                    Some(t) => {
                        if min.map(|m| *t < m).unwrap_or(true) {
                            min = Some(*t);
                        }
                    }
                    None => {
                        warn!(kind = %kind, agent = %agent.id, "Active agent has not reported yet, skipping kind");
                        return KindOutcome::SkippedUnreported;
                    }
                }
            }
            min
        };

        let Some(store) = self.table.get(kind) else {
            warn!(kind = %kind, "No store registered for kind");
            return KindOutcome::SkippedUnregistered;
        };

        let list_cutoff = cutoff.unwrap_or(DateTime::<Utc>::MAX_UTC);
        let ids = match store.list_pending_deleted_before(list_cutoff).await {
            Ok(ids) => ids,
            Err(e) => {
                error!(kind = %kind, error = %e, "Query of pending-deleted records failed");
                return KindOutcome::Failed {
                    message: e.to_string(),
                };
            }
        };

        let mut count = 0;
        for id in ids {
            match store.purge(id).await {
                Ok(()) => count += 1,
                Err(e) => {
                    error!(kind = %kind, record = %id, error = %e, "Hard delete failed");
                }
            }
        }
        KindOutcome::Purged { cutoff, count }
    }
}
