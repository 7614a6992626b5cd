//! Diffs a required (client -> projects) taxonomy against a catalog
//! snapshot. Nothing here talks to a tracker; the resulting plan can be
//! logged or shown before any entity is created.

use std::collections::BTreeSet;

use tracing::info;

use crate::model::{AggregateBucket, Catalog, ReconciliationPlan, RequiredTaxonomy};

/// The (client -> projects) names that posting `buckets` needs.
pub fn required_from_buckets(buckets: &[AggregateBucket]) -> RequiredTaxonomy {
    let mut required = RequiredTaxonomy::new();
    for bucket in buckets {
        required
            .entry(bucket.client.clone())
            .or_default()
            .insert(bucket.project.clone());
    }
    required
}

/// Entities in `required` that `existing` does not have yet.
///
/// Projects of a client that is itself missing are all missing, since they
/// can only be created once the client exists.
pub fn diff(required: &RequiredTaxonomy, existing: &Catalog) -> ReconciliationPlan {
    let mut plan = ReconciliationPlan::default();

    for (client_name, projects) in required {
        let missing: Vec<String> = match existing.client(client_name) {
            Some(client) => projects
                .iter()
                .filter(|project| !existing.has_project(&client.id, project))
                .cloned()
                .collect(),
            None => {
                plan.missing_clients.push(client_name.clone());
                projects.iter().cloned().collect()
            }
        };
        if !missing.is_empty() {
            plan.missing_projects.insert(client_name.clone(), missing);
        }
    }

    info!(
        required_clients = required.len(),
        missing_clients = plan.missing_clients.len(),
        missing_projects = plan.creation_count() - plan.missing_clients.len(),
        "Computed reconciliation plan"
    );
    plan
}

/// Merges several required taxonomies into one.
pub fn union<'a, I>(parts: I) -> RequiredTaxonomy
where
    I: IntoIterator<Item = &'a RequiredTaxonomy>,
{
    let mut merged = RequiredTaxonomy::new();
    for part in parts {
        for (client, projects) in part {
            merged
                .entry(client.clone())
                .or_insert_with(BTreeSet::new)
                .extend(projects.iter().cloned());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityId, TaxonomyEntity};

    fn required(pairs: &[(&str, &str)]) -> RequiredTaxonomy {
        let mut required = RequiredTaxonomy::new();
        for (client, project) in pairs {
            required
                .entry(client.to_string())
                .or_default()
                .insert(project.to_string());
        }
        required
    }

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.insert_client(TaxonomyEntity::new(1i64, "Acme", None));
        catalog.insert_project(&EntityId::from(1), TaxonomyEntity::new(10i64, "Website", None));
        catalog
    }

    #[test]
    fn nothing_missing_gives_empty_plan() {
        let plan = diff(&required(&[("Acme", "Website")]), &catalog());
        assert!(plan.is_empty());
        assert_eq!(plan.creation_count(), 0);
    }

    #[test]
    fn missing_project_under_existing_client() {
        let plan = diff(
            &required(&[("Acme", "Website"), ("Acme", "Support")]),
            &catalog(),
        );
        assert!(plan.missing_clients.is_empty());
        assert_eq!(plan.missing_projects["Acme"], vec!["Support".to_string()]);
    }

    #[test]
    fn missing_client_brings_all_its_projects() {
        let plan = diff(
            &required(&[("Globex", "Api"), ("Globex", "Billing"), ("Acme", "Website")]),
            &catalog(),
        );
        assert_eq!(plan.missing_clients, vec!["Globex".to_string()]);
        assert_eq!(
            plan.missing_projects["Globex"],
            vec!["Api".to_string(), "Billing".to_string()]
        );
        assert!(!plan.missing_projects.contains_key("Acme"));
        assert_eq!(plan.creation_count(), 3);
    }

    #[test]
    fn client_without_projects_is_still_created() {
        let mut needed = RequiredTaxonomy::new();
        needed.insert("Initech".into(), BTreeSet::new());
        let plan = diff(&needed, &catalog());
        assert_eq!(plan.missing_clients, vec!["Initech".to_string()]);
        assert!(plan.missing_projects.is_empty());
    }

    #[test]
    fn input_order_and_duplicates_do_not_matter() {
        let forward = required(&[("Acme", "Support"), ("Globex", "Api"), ("Acme", "Support")]);
        let backward = required(&[("Globex", "Api"), ("Acme", "Support"), ("Globex", "Api")]);
        assert_eq!(diff(&forward, &catalog()), diff(&backward, &catalog()));
        let plan = diff(&forward, &catalog());
        assert_eq!(plan.missing_projects["Acme"], vec!["Support".to_string()]);
        assert_eq!(plan.missing_clients, vec!["Globex".to_string()]);
    }

    #[test]
    fn required_from_buckets_groups_projects_by_client() {
        let bucket = |client: &str, project: &str, description: &str| AggregateBucket {
            client: client.into(),
            project: project.into(),
            description: description.into(),
            duration_seconds: 60,
            duration_minutes: 1,
            rounded_minutes: 5,
        };
        let buckets = vec![
            bucket("Acme", "Website", "a"),
            bucket("Acme", "Website", "b"),
            bucket("Acme", "Support", "c"),
        ];
        assert_eq!(
            required_from_buckets(&buckets),
            required(&[("Acme", "Website"), ("Acme", "Support")])
        );
    }

    #[test]
    fn union_merges_project_sets() {
        let a = required(&[("Acme", "Website")]);
        let b = required(&[("Acme", "Support"), ("Globex", "Api")]);
        assert_eq!(
            union([&a, &b]),
            required(&[("Acme", "Website"), ("Acme", "Support"), ("Globex", "Api")])
        );
    }
}
