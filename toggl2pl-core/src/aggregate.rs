//! Groups raw time entries into per-(client, project, description) buckets.
//!
//! Aggregation validates the whole batch before grouping: a single entry
//! without a client, project or description fails the call and nothing is
//! returned. Output is sorted by client, project and description, so the
//! same multiset of entries always yields the same buckets in the same order.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ValidationError;
use crate::model::{AggregateBucket, RawEntry};
use crate::rounding::{seconds_to_minutes, RoundingPolicy};

/// Joins distinct descriptions when buckets are built per project.
pub const DESCRIPTION_SEPARATOR: &str = "; ";

/// Which key a bucket is built on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// One bucket per (client, project, description).
    #[default]
    Description,
    /// One bucket per (client, project); descriptions are merged.
    Project,
}

#[derive(Debug, Clone, Default)]
pub struct AggregateOptions {
    pub granularity: Granularity,
    pub rounding: RoundingPolicy,
    /// Entries of these clients are dropped after validation.
    pub excluded_clients: BTreeSet<String>,
}

/// Entries left out by [`AggregateOptions::excluded_clients`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcludedEntries {
    pub count: usize,
    pub seconds: u64,
    pub clients: BTreeSet<String>,
}

impl ExcludedEntries {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

struct ValidEntry<'a> {
    client: &'a str,
    project: &'a str,
    description: &'a str,
    seconds: u64,
}

fn validate_entry(index: usize, entry: &RawEntry) -> Result<ValidEntry<'_>, ValidationError> {
    let invalid = |missing: &'static str| ValidationError {
        index,
        missing,
        entry: entry.clone(),
    };
    Ok(ValidEntry {
        client: entry.client.as_deref().ok_or_else(|| invalid("client"))?,
        project: entry.project.as_deref().ok_or_else(|| invalid("project"))?,
        description: entry
            .description
            .as_deref()
            .ok_or_else(|| invalid("description"))?,
        seconds: entry.duration_seconds,
    })
}

fn validate(entries: &[RawEntry]) -> Result<Vec<ValidEntry<'_>>, ValidationError> {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| validate_entry(index, entry))
        .collect()
}

fn bucket(
    client: &str,
    project: &str,
    description: String,
    seconds: u64,
    rounding: &RoundingPolicy,
) -> AggregateBucket {
    let duration_minutes = seconds_to_minutes(seconds);
    AggregateBucket {
        client: client.to_string(),
        project: project.to_string(),
        description,
        duration_seconds: seconds,
        duration_minutes,
        rounded_minutes: rounding.round(duration_minutes),
    }
}

/// Counts the entries whose client is excluded, with their total duration.
pub fn excluded_entries(entries: &[RawEntry], options: &AggregateOptions) -> ExcludedEntries {
    let mut excluded = ExcludedEntries::default();
    for entry in entries {
        let Some(client) = entry.client.as_deref() else {
            continue;
        };
        if options.excluded_clients.contains(client) {
            excluded.count += 1;
            excluded.seconds = excluded.seconds.saturating_add(entry.duration_seconds);
            excluded.clients.insert(client.to_string());
        }
    }
    excluded
}

/// Validates `entries` and folds them into sorted buckets.
pub fn aggregate(
    entries: &[RawEntry],
    options: &AggregateOptions,
) -> Result<Vec<AggregateBucket>, ValidationError> {
    let valid = validate(entries).map_err(|e| {
        warn!(index = e.index, missing = e.missing, entry = ?e.entry, "Rejecting batch with incomplete time entry");
        e
    })?;

    let mut sums: BTreeMap<(&str, &str, &str), u64> = BTreeMap::new();
    let mut excluded = 0usize;
    for entry in valid {
        if options.excluded_clients.contains(entry.client) {
            excluded += 1;
            continue;
        }
        let sum = sums
            .entry((entry.client, entry.project, entry.description))
            .or_insert(0);
        *sum = sum.saturating_add(entry.seconds);
    }

    let buckets: Vec<AggregateBucket> = match options.granularity {
        Granularity::Description => sums
            .into_iter()
            .map(|((client, project, description), seconds)| {
                bucket(client, project, description.to_string(), seconds, &options.rounding)
            })
            .collect(),
        Granularity::Project => {
            let mut per_project: BTreeMap<(&str, &str), (BTreeSet<&str>, u64)> = BTreeMap::new();
            for ((client, project, description), seconds) in sums {
                let (descriptions, total) = per_project.entry((client, project)).or_default();
                if !description.is_empty() {
                    descriptions.insert(description);
                }
                *total = total.saturating_add(seconds);
            }
            per_project
                .into_iter()
                .map(|((client, project), (descriptions, seconds))| {
                    let description = descriptions
                        .into_iter()
                        .collect::<Vec<_>>()
                        .join(DESCRIPTION_SEPARATOR);
                    bucket(client, project, description, seconds, &options.rounding)
                })
                .collect()
        }
    };

    info!(
        entries = entries.len(),
        excluded,
        buckets = buckets.len(),
        granularity = ?options.granularity,
        "Aggregated time entries"
    );
    debug!(?buckets, "Aggregated buckets");
    Ok(buckets)
}
