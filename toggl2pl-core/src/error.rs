use std::fmt;

use thiserror::Error;

use crate::model::{RawEntry, TaxonomyEntity};

/// Error type returned by tracker collaborators for transport and remote
/// failures.
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// A raw entry lacks one of the fields it is identified by.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("time entry #{index} has no {missing}; fix it in the source tracker first: {entry:?}")]
pub struct ValidationError {
    /// Position of the entry in the input batch.
    pub index: usize,
    /// Name of the first absent field.
    pub missing: &'static str,
    pub entry: RawEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoundingPolicyError {
    #[error("rounding steps must not be empty")]
    Empty,
    #[error("rounding steps must be positive and strictly increasing, got {0:?}")]
    NotIncreasing(Vec<u64>),
    #[error("the last rounding step must be 60, got {0}")]
    LastStepNot60(u64),
}

/// Result of a create call on a taxonomy store.
#[derive(Debug, Error)]
pub enum CreateError {
    /// The entity exists already. `existing` carries it when the store
    /// reported it back.
    #[error("{name:?} already exists")]
    AlreadyExists {
        name: String,
        existing: Option<TaxonomyEntity>,
    },
    #[error(transparent)]
    Other(TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Client,
    Project,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Client => f.write_str("client"),
            EntityKind::Project => f.write_str("project"),
        }
    }
}

/// Applying a reconciliation plan stopped. Creations made before the
/// failure are kept.
#[derive(Debug, Error)]
pub enum ReconciliationError {
    #[error("failed to create {kind} {name:?}{}: {source}", parent_suffix(.parent))]
    Create {
        kind: EntityKind,
        name: String,
        parent: Option<String>,
        #[source]
        source: TransportError,
    },
    #[error("{kind} {name:?}{} was reported as existing but is not in the refreshed catalog", parent_suffix(.parent))]
    Missing {
        kind: EntityKind,
        name: String,
        parent: Option<String>,
    },
    #[error("failed to refresh catalog: {0}")]
    Refresh(#[source] TransportError),
    #[error("reconciliation cancelled after {created} creation(s)")]
    Cancelled { created: usize },
}

fn parent_suffix(parent: &Option<String>) -> String {
    match parent {
        Some(parent) => format!(" under {parent:?}"),
        None => String::new(),
    }
}

/// One bucket could not be posted.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("no target project named {client:?}")]
    UnresolvedProject { client: String },
    #[error("no target task named {project:?} in project {client:?}")]
    UnresolvedTask { client: String, project: String },
    #[error("posting {client:?}/{project:?} failed: {source}")]
    Remote {
        client: String,
        project: String,
        #[source]
        source: TransportError,
    },
}

/// Failure of a whole synchronisation run before anything is posted.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to fetch time entries: {0}")]
    Fetch(#[source] TransportError),
    #[error("failed to fetch catalog: {0}")]
    Catalog(#[source] TransportError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Reconciliation(#[from] ReconciliationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_names_missing_field() {
        let err = ValidationError {
            index: 3,
            missing: "description",
            entry: RawEntry {
                client: Some("Acme".into()),
                project: Some("Website".into()),
                description: None,
                duration_seconds: 60,
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("#3"), "message should carry the index: {msg}");
        assert!(msg.contains("no description"), "message should name the field: {msg}");
    }

    #[test]
    fn reconciliation_error_mentions_parent() {
        let err = ReconciliationError::Create {
            kind: EntityKind::Project,
            name: "Website".into(),
            parent: Some("Acme".into()),
            source: "permission denied".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to create project \"Website\" under \"Acme\": permission denied"
        );
    }
}
