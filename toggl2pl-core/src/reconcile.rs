//! Applies a [`ReconciliationPlan`] against a [`TaxonomyStore`].
//!
//! Clients are created before projects so every project has a client id to
//! go under. A create call answered with "already exists" counts as success:
//! the plan was computed from a snapshot that may be stale by now. Nothing is
//! rolled back when a later call fails.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::contract::TaxonomyStore;
use crate::error::{CreateError, EntityKind, ReconciliationError};
use crate::model::{Catalog, EntityId, ReconciliationPlan, TaxonomyEntity};

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Pause between consecutive create calls. Only for rate limiting.
    pub delay: Duration,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(500),
        }
    }
}

/// Catalog after reconciliation plus what was done to get there.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub catalog: Catalog,
    pub created: Vec<TaxonomyEntity>,
    /// Entities the store reported as existing already.
    pub already_present: Vec<TaxonomyEntity>,
}

/// Tracks create calls so the configured pause only sits between them.
struct Pacer<'a> {
    options: &'a ReconcileOptions,
    cancel: &'a CancellationToken,
    calls: usize,
}

impl Pacer<'_> {
    async fn next(&mut self, outcome: &ReconcileOutcome) -> Result<(), ReconciliationError> {
        if self.calls > 0 && !self.options.delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.options.delay) => {}
                _ = self.cancel.cancelled() => {}
            }
        }
        if self.cancel.is_cancelled() {
            warn!(created = outcome.created.len(), "[RECONCILE] Cancelled");
            return Err(ReconciliationError::Cancelled {
                created: outcome.created.len(),
            });
        }
        self.calls += 1;
        Ok(())
    }
}

enum Created {
    New(TaxonomyEntity),
    Existing(TaxonomyEntity),
}

impl ReconcileOutcome {
    fn record(&mut self, created: Created) -> TaxonomyEntity {
        match created {
            Created::New(entity) => {
                self.created.push(entity.clone());
                entity
            }
            Created::Existing(entity) => {
                self.already_present.push(entity.clone());
                entity
            }
        }
    }
}

async fn refreshed<S>(store: &S) -> Result<Catalog, ReconciliationError>
where
    S: TaxonomyStore + ?Sized,
{
    store.fetch_catalog().await.map_err(|e| {
        error!(error = ?e, "[RECONCILE][ERROR] Failed to refresh catalog");
        ReconciliationError::Refresh(e)
    })
}

async fn create_client<S>(store: &S, name: &str) -> Result<Created, ReconciliationError>
where
    S: TaxonomyStore + ?Sized,
{
    match store.create_client(name).await {
        Ok(entity) => {
            info!(client = name, id = %entity.id, "[RECONCILE] Created client");
            Ok(Created::New(entity))
        }
        Err(CreateError::AlreadyExists {
            existing: Some(entity),
            ..
        }) => {
            info!(client = name, id = %entity.id, "[RECONCILE] Client already exists");
            Ok(Created::Existing(entity))
        }
        Err(CreateError::AlreadyExists { existing: None, .. }) => {
            info!(client = name, "[RECONCILE] Client already exists, refreshing catalog");
            let catalog = refreshed(store).await?;
            catalog
                .client(name)
                .cloned()
                .map(Created::Existing)
                .ok_or_else(|| ReconciliationError::Missing {
                    kind: EntityKind::Client,
                    name: name.to_string(),
                    parent: None,
                })
        }
        Err(CreateError::Other(source)) => {
            error!(client = name, error = ?source, "[RECONCILE][ERROR] create_client failed");
            Err(ReconciliationError::Create {
                kind: EntityKind::Client,
                name: name.to_string(),
                parent: None,
                source,
            })
        }
    }
}

async fn create_project<S>(
    store: &S,
    client_name: &str,
    client_id: &EntityId,
    name: &str,
) -> Result<Created, ReconciliationError>
where
    S: TaxonomyStore + ?Sized,
{
    match store.create_project(client_id, name).await {
        Ok(entity) => {
            info!(client = client_name, project = name, id = %entity.id, "[RECONCILE] Created project");
            Ok(Created::New(entity))
        }
        Err(CreateError::AlreadyExists {
            existing: Some(entity),
            ..
        }) => {
            info!(client = client_name, project = name, "[RECONCILE] Project already exists");
            Ok(Created::Existing(entity))
        }
        Err(CreateError::AlreadyExists { existing: None, .. }) => {
            info!(client = client_name, project = name, "[RECONCILE] Project already exists, refreshing catalog");
            let catalog = refreshed(store).await?;
            catalog
                .project(client_name, name)
                .cloned()
                .map(Created::Existing)
                .ok_or_else(|| ReconciliationError::Missing {
                    kind: EntityKind::Project,
                    name: name.to_string(),
                    parent: Some(client_name.to_string()),
                })
        }
        Err(CreateError::Other(source)) => {
            error!(client = client_name, project = name, error = ?source, "[RECONCILE][ERROR] create_project failed");
            Err(ReconciliationError::Create {
                kind: EntityKind::Project,
                name: name.to_string(),
                parent: Some(client_name.to_string()),
                source,
            })
        }
    }
}

/// Creates every entity in `plan` through `store`, starting from `catalog`.
///
/// Cancellation is checked before each create call; calls already made stay
/// made.
pub async fn apply<S>(
    plan: &ReconciliationPlan,
    catalog: Catalog,
    store: &S,
    options: &ReconcileOptions,
    cancel: &CancellationToken,
) -> Result<ReconcileOutcome, ReconciliationError>
where
    S: TaxonomyStore + ?Sized,
{
    info!(
        clients = plan.missing_clients.len(),
        creations = plan.creation_count(),
        "[RECONCILE] Applying reconciliation plan"
    );
    let mut outcome = ReconcileOutcome {
        catalog,
        ..Default::default()
    };
    let mut pacer = Pacer {
        options,
        cancel,
        calls: 0,
    };

    for name in &plan.missing_clients {
        pacer.next(&outcome).await?;
        let created = create_client(store, name).await?;
        let client = outcome.record(created);
        outcome.catalog.insert_client(client);
    }

    for (client_name, projects) in &plan.missing_projects {
        let client_id = outcome
            .catalog
            .client(client_name)
            .map(|client| client.id.clone())
            .ok_or_else(|| ReconciliationError::Missing {
                kind: EntityKind::Client,
                name: client_name.clone(),
                parent: None,
            })?;
        for name in projects {
            pacer.next(&outcome).await?;
            let created = create_project(store, client_name, &client_id, name).await?;
            let project = outcome.record(created);
            outcome.catalog.insert_project(&client_id, project);
        }
    }

    info!(
        created = outcome.created.len(),
        already_present = outcome.already_present.len(),
        "[RECONCILE] Reconciliation complete"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockTaxonomyStore;
    use crate::model::EntityId;

    fn no_delay() -> ReconcileOptions {
        ReconcileOptions {
            delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn empty_plan_makes_no_calls() {
        let store = MockTaxonomyStore::new();
        let outcome = apply(
            &ReconciliationPlan::default(),
            Catalog::new(),
            &store,
            &no_delay(),
            &CancellationToken::new(),
        )
        .await
        .expect("nothing to do");
        assert!(outcome.created.is_empty());
        assert!(outcome.already_present.is_empty());
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_first_call() {
        let store = MockTaxonomyStore::new();
        let plan = ReconciliationPlan {
            missing_clients: vec!["Acme".into()],
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = apply(&plan, Catalog::new(), &store, &no_delay(), &cancel)
            .await
            .expect_err("cancelled");
        assert!(matches!(err, ReconciliationError::Cancelled { created: 0 }));
    }

    #[tokio::test]
    async fn projects_go_under_the_new_client_id() {
        let mut store = MockTaxonomyStore::new();
        store
            .expect_create_client()
            .times(1)
            .returning(|name: &str| Ok(TaxonomyEntity::new(7i64, name, None)));
        store
            .expect_create_project()
            .withf(|client_id: &EntityId, name: &str| client_id.as_str() == "7" && name == "Website")
            .times(1)
            .returning(|client_id: &EntityId, name: &str| {
                Ok(TaxonomyEntity::new(70i64, name, Some(client_id.clone())))
            });

        let mut plan = ReconciliationPlan {
            missing_clients: vec!["Acme".into()],
            ..Default::default()
        };
        plan.missing_projects.insert("Acme".into(), vec!["Website".into()]);

        let outcome = apply(&plan, Catalog::new(), &store, &no_delay(), &CancellationToken::new())
            .await
            .expect("plan applies");
        assert_eq!(outcome.created.len(), 2);
        let project = outcome.catalog.project("Acme", "Website").expect("project recorded");
        assert_eq!(project.id, EntityId::from(70));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_sits_between_calls_only() {
        let mut store = MockTaxonomyStore::new();
        store
            .expect_create_client()
            .times(2)
            .returning(|name: &str| Ok(TaxonomyEntity::new(name, name, None)));
        let plan = ReconciliationPlan {
            missing_clients: vec!["Acme".into(), "Globex".into()],
            ..Default::default()
        };
        let options = ReconcileOptions {
            delay: Duration::from_secs(5),
        };
        let started = tokio::time::Instant::now();
        apply(&plan, Catalog::new(), &store, &options, &CancellationToken::new())
            .await
            .expect("plan applies");
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }
}
