//! Plain data records passed between the aggregation, reconciliation and
//! publishing steps.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Client name -> set of project names. Used both for what the aggregated
/// entries need and for what a catalog describes.
pub type RequiredTaxonomy = BTreeMap<String, BTreeSet<String>>;

/// One time record as reported by the source tracker.
///
/// The identifying fields are optional because the source tracker allows
/// unassigned entries; the aggregator rejects those.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    pub client: Option<String>,
    pub project: Option<String>,
    pub description: Option<String>,
    pub duration_seconds: u64,
}

impl RawEntry {
    /// Convenience constructor for a fully populated entry.
    pub fn new(client: &str, project: &str, description: &str, duration_seconds: u64) -> Self {
        Self {
            client: Some(client.to_string()),
            project: Some(project.to_string()),
            description: Some(description.to_string()),
            duration_seconds,
        }
    }
}

/// Accumulated time for one (client, project, description) key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateBucket {
    pub client: String,
    pub project: String,
    pub description: String,
    pub duration_seconds: u64,
    pub duration_minutes: u64,
    pub rounded_minutes: u64,
}

impl AggregateBucket {
    /// Minutes to report for this bucket.
    pub fn minutes(&self, use_rounded: bool) -> u64 {
        if use_rounded {
            self.rounded_minutes
        } else {
            self.duration_minutes
        }
    }
}

/// Identifier assigned by a tracker. Only ever compared, never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A named client or project known to a tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyEntity {
    pub id: EntityId,
    pub name: String,
    pub parent_id: Option<EntityId>,
}

impl TaxonomyEntity {
    pub fn new(id: impl Into<EntityId>, name: &str, parent_id: Option<EntityId>) -> Self {
        Self {
            id: id.into(),
            name: name.to_string(),
            parent_id,
        }
    }
}

/// Snapshot of a tracker's two-level taxonomy.
///
/// Top-level entities are called clients and second-level ones projects,
/// whatever the owning tracker calls them. The snapshot is owned by the
/// caller; refreshing means fetching a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    clients: BTreeMap<String, TaxonomyEntity>,
    projects: BTreeMap<EntityId, BTreeMap<String, TaxonomyEntity>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_client(&mut self, client: TaxonomyEntity) {
        self.clients.insert(client.name.clone(), client);
    }

    /// Registers `project` under `client_id`, overriding its `parent_id`.
    pub fn insert_project(&mut self, client_id: &EntityId, mut project: TaxonomyEntity) {
        project.parent_id = Some(client_id.clone());
        self.projects
            .entry(client_id.clone())
            .or_default()
            .insert(project.name.clone(), project);
    }

    pub fn client(&self, name: &str) -> Option<&TaxonomyEntity> {
        self.clients.get(name)
    }

    pub fn clients(&self) -> impl Iterator<Item = &TaxonomyEntity> {
        self.clients.values()
    }

    /// Looks up a project by its own name and its client's name.
    pub fn project(&self, client_name: &str, project_name: &str) -> Option<&TaxonomyEntity> {
        let client = self.clients.get(client_name)?;
        self.projects.get(&client.id)?.get(project_name)
    }

    pub fn projects_of(&self, client_id: &EntityId) -> impl Iterator<Item = &TaxonomyEntity> {
        self.projects
            .get(client_id)
            .into_iter()
            .flat_map(|projects| projects.values())
    }

    pub fn has_project(&self, client_id: &EntityId, project_name: &str) -> bool {
        self.projects
            .get(client_id)
            .is_some_and(|projects| projects.contains_key(project_name))
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn project_count(&self) -> usize {
        self.projects.values().map(BTreeMap::len).sum()
    }

    /// The (client -> projects) names this catalog describes. Projects filed
    /// under an id with no matching client are not reachable by name and are
    /// left out.
    pub fn required(&self) -> RequiredTaxonomy {
        self.clients
            .values()
            .map(|client| {
                let projects = self
                    .projects_of(&client.id)
                    .map(|project| project.name.clone())
                    .collect();
                (client.name.clone(), projects)
            })
            .collect()
    }
}

/// Entities that have to be created before a catalog covers a required
/// taxonomy. Both collections are sorted and free of duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationPlan {
    pub missing_clients: Vec<String>,
    pub missing_projects: BTreeMap<String, Vec<String>>,
}

impl ReconciliationPlan {
    pub fn is_empty(&self) -> bool {
        self.missing_clients.is_empty() && self.missing_projects.is_empty()
    }

    /// Number of create calls applying this plan takes.
    pub fn creation_count(&self) -> usize {
        self.missing_clients.len() + self.missing_projects.values().map(Vec::len).sum::<usize>()
    }
}

/// Payload of one "add post" call on the target tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostRequest {
    pub project_id: EntityId,
    pub task_id: EntityId,
    pub description: String,
    pub date: NaiveDate,
    pub minutes: u64,
}

/// Whatever the target tracker answered to an accepted post.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostConfirmation {
    pub raw: serde_json::Value,
}
