//! High-level pipeline: fetch → aggregate → reconcile → review → publish.
//!
//! A run is split so the operator can review everything before any write:
//!   - [`prepare`] reads entries, aggregates them, fetches the posting
//!     catalog and (optionally) plans the taxonomy reconciliation. It only
//!     reads.
//!   - [`reconcile_prepared`] creates the planned taxonomy entities.
//!   - [`publish_prepared`] posts the prepared buckets.
//!
//! Between [`prepare`] and the writes the caller shows [`PreparedRun`] and
//! asks for confirmation. Catalogs are fetched once per run and passed
//! along explicitly.
//!
//! # Reconciliation direction
//! The posting catalog (target projects and their tasks) is mirrored into
//! the source taxonomy (clients and their projects), so entries can be
//! tracked against every target task.

use chrono::NaiveDate;
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::aggregate::{aggregate, excluded_entries, AggregateOptions, ExcludedEntries};
use crate::contract::{EntrySource, TaxonomyStore, WorklogSink};
use crate::error::SyncError;
use crate::model::{AggregateBucket, Catalog, EntityId, ReconciliationPlan};
use crate::publish::{publish, PublishOptions, PublishReport};
use crate::reconcile::{apply, ReconcileOptions, ReconcileOutcome};
use crate::taxonomy::{diff, required_from_buckets};

/// What to synchronise.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub workspace_id: EntityId,
    pub date: NaiveDate,
    /// Mirror the posting catalog into the source taxonomy first.
    pub reconcile: bool,
}

/// Reconciliation planned by [`prepare`], applied by [`reconcile_prepared`].
#[derive(Debug, Clone)]
pub struct PendingReconciliation {
    pub plan: ReconciliationPlan,
    /// Source taxonomy the plan was computed against.
    pub source_catalog: Catalog,
}

/// Everything computed before the first write.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub date: NaiveDate,
    pub entry_count: usize,
    pub buckets: Vec<AggregateBucket>,
    /// Entries of excluded clients; not part of any bucket.
    pub excluded: ExcludedEntries,
    pub target_catalog: Catalog,
    /// Creations needed to mirror the target catalog into the source.
    pub reconciliation: Option<PendingReconciliation>,
    /// Bucket names the target catalog cannot resolve; posting those fails.
    pub unresolved: ReconciliationPlan,
}

impl PreparedRun {
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Outcome of a published run.
#[derive(Debug)]
pub struct SynchroniseReport {
    pub date: NaiveDate,
    pub buckets: usize,
    pub publish: PublishReport,
}

/// Runs every read step of a run. Nothing is created or posted.
///
/// Returns early with no buckets when the source has no entries for the
/// date; no catalog is fetched then.
pub async fn prepare<E, T, W>(
    request: &SyncRequest,
    aggregate_options: &AggregateOptions,
    entries: &E,
    taxonomy: &T,
    sink: &W,
) -> Result<PreparedRun, SyncError>
where
    E: EntrySource + ?Sized,
    T: TaxonomyStore + ?Sized,
    W: WorklogSink + ?Sized,
{
    info!(date = %request.date, workspace = %request.workspace_id, reconcile = request.reconcile, "[SYNC] Preparing run");

    let raw = entries
        .fetch_entries(&request.workspace_id, request.date, request.date)
        .await
        .map_err(|e| {
            error!(error = ?e, "[SYNC][ERROR] Failed to fetch entries");
            SyncError::Fetch(e)
        })?;
    let buckets = aggregate(&raw, aggregate_options)?;
    let excluded = excluded_entries(&raw, aggregate_options);
    if !excluded.is_empty() {
        warn!(entries = excluded.count, clients = ?excluded.clients, "[SYNC] Leaving out entries of excluded clients");
    }

    if buckets.is_empty() {
        info!(date = %request.date, "[SYNC] No entries for date");
        return Ok(PreparedRun {
            date: request.date,
            entry_count: raw.len(),
            buckets,
            excluded,
            target_catalog: Catalog::new(),
            reconciliation: None,
            unresolved: ReconciliationPlan::default(),
        });
    }

    let target_catalog = sink.fetch_catalog().await.map_err(|e| {
        error!(error = ?e, "[SYNC][ERROR] Failed to fetch target catalog");
        SyncError::Catalog(e)
    })?;
    info!(
        projects = target_catalog.client_count(),
        tasks = target_catalog.project_count(),
        "[SYNC] Fetched target catalog"
    );

    let reconciliation = if request.reconcile {
        let source_catalog = taxonomy.fetch_catalog().await.map_err(|e| {
            error!(error = ?e, "[SYNC][ERROR] Failed to fetch source taxonomy");
            SyncError::Catalog(e)
        })?;
        let plan = diff(&target_catalog.required(), &source_catalog);
        info!(creations = plan.creation_count(), "[SYNC] Planned reconciliation");
        Some(PendingReconciliation {
            plan,
            source_catalog,
        })
    } else {
        None
    };

    let unresolved = diff(&required_from_buckets(&buckets), &target_catalog);
    if !unresolved.is_empty() {
        let names: BTreeSet<&String> = unresolved.missing_projects.keys().collect();
        warn!(clients = ?names, "[SYNC] Some buckets have no matching target project/task");
    }

    Ok(PreparedRun {
        date: request.date,
        entry_count: raw.len(),
        buckets,
        excluded,
        target_catalog,
        reconciliation,
        unresolved,
    })
}

/// Creates the taxonomy entities planned by [`prepare`].
///
/// Returns `None` when the run was prepared without reconciliation.
pub async fn reconcile_prepared<T>(
    run: &PreparedRun,
    taxonomy: &T,
    options: &ReconcileOptions,
    cancel: &CancellationToken,
) -> Result<Option<ReconcileOutcome>, SyncError>
where
    T: TaxonomyStore + ?Sized,
{
    let Some(pending) = &run.reconciliation else {
        return Ok(None);
    };
    let outcome = apply(
        &pending.plan,
        pending.source_catalog.clone(),
        taxonomy,
        options,
        cancel,
    )
    .await?;
    Ok(Some(outcome))
}

/// Posts a prepared run.
pub async fn publish_prepared<W>(
    run: &PreparedRun,
    options: &PublishOptions,
    sink: &W,
    cancel: &CancellationToken,
) -> SynchroniseReport
where
    W: WorklogSink + ?Sized,
{
    let report = publish(&run.buckets, &run.target_catalog, run.date, options, sink, cancel).await;
    SynchroniseReport {
        date: run.date,
        buckets: run.buckets.len(),
        publish: report,
    }
}
