//! Operator-facing output: the bucket table shown before posting, the
//! excluded-entry note, the reconciliation summary, the final report and the confirmation prompt.
//!
//! Tables are plain whitespace-aligned columns under a dashed rule so they
//! stay easy to pipe into `awk`.

use serde_json::Value;
use std::io::{self, BufRead, Write};
use toggl2pl_core::aggregate::ExcludedEntries;
use toggl2pl_core::model::{AggregateBucket, ReconciliationPlan};
use toggl2pl_core::reconcile::ReconcileOutcome;
use toggl2pl_core::rounding::seconds_to_minutes;
use toggl2pl_core::synchronise::SynchroniseReport;

use crate::pl::{PlProject, PlTask};

pub const BUCKET_HEADERS: [&str; 5] = [
    "Client",
    "Project",
    "Description",
    "Duration (min)",
    "Rounded (min)",
];

fn pad_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}", width = *width))
        .collect();
    padded.join("  ").trim_end().to_string()
}

/// Left-aligned columns separated by two spaces, with a dashed rule under
/// the headers.
pub fn render_rows(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(pad_line(headers.iter().copied(), &widths));
    out.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    for row in rows {
        out.push(pad_line(row.iter().map(String::as_str), &widths));
    }
    out.join("\n")
}

pub fn render_table(buckets: &[AggregateBucket]) -> String {
    let rows: Vec<Vec<String>> = buckets
        .iter()
        .map(|b| {
            vec![
                b.client.clone(),
                b.project.clone(),
                b.description.clone(),
                b.duration_minutes.to_string(),
                b.rounded_minutes.to_string(),
            ]
        })
        .collect();
    render_rows(&BUCKET_HEADERS, &rows)
}

/// Lists what a plan creates, one line per entity.
pub fn render_plan(plan: &ReconciliationPlan) -> String {
    if plan.is_empty() {
        return "Nothing to create.".to_string();
    }
    let mut lines = Vec::new();
    for client in &plan.missing_clients {
        lines.push(format!("+ client  {client}"));
    }
    for (client, projects) in &plan.missing_projects {
        for project in projects {
            lines.push(format!("+ project {client} / {project}"));
        }
    }
    lines.join("\n")
}

/// Bucket names the posting catalog has no project/task for.
pub fn render_unresolved(plan: &ReconciliationPlan) -> String {
    plan.missing_projects
        .iter()
        .flat_map(|(client, projects)| {
            projects
                .iter()
                .map(move |project| format!("  {client} / {project}"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One line naming what the excluded clients filter left out.
pub fn render_excluded(excluded: &ExcludedEntries) -> String {
    let clients = excluded
        .clients
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Left out {} entries ({} min) of excluded clients: {clients}",
        excluded.count,
        seconds_to_minutes(excluded.seconds)
    )
}

pub fn render_outcome(outcome: &ReconcileOutcome) -> String {
    format!(
        "Created {} entities in Toggl, {} already existed.",
        outcome.created.len(),
        outcome.already_present.len()
    )
}

pub fn render_report(report: &SynchroniseReport) -> String {
    let publish = &report.publish;
    let mut lines = vec![format!(
        "Posted {} of {} buckets for {} ({} min).",
        publish.posted.len(),
        report.buckets,
        report.date,
        publish.posted_minutes()
    )];
    for failure in &publish.failed {
        lines.push(format!(
            "FAILED {} / {} / {}: {}",
            failure.bucket.client, failure.bucket.project, failure.bucket.description, failure.error
        ));
    }
    if !publish.skipped.is_empty() {
        lines.push(format!("Skipped {} zero-minute buckets.", publish.skipped.len()));
    }
    if !publish.unattempted.is_empty() {
        lines.push(format!("Not attempted: {} buckets.", publish.unattempted.len()));
        for bucket in &publish.unattempted {
            lines.push(format!(
                "  {} / {} / {}",
                bucket.client, bucket.project, bucket.description
            ));
        }
    }
    if publish.cancelled {
        lines.push("Publishing was interrupted; posts already made were kept.".to_string());
    }
    lines.join("\n")
}

fn cell(value: &Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// The PL catalog as printed by the `catalog` command.
pub fn render_tasks(projects: &[(PlProject, Vec<PlTask>)]) -> String {
    let rows: Vec<Vec<String>> = projects
        .iter()
        .flat_map(|(project, tasks)| {
            tasks.iter().map(move |task| {
                vec![
                    project.name.clone(),
                    task.title.clone(),
                    cell(&task.status),
                    cell(&task.assigned),
                ]
            })
        })
        .collect();
    render_rows(&["Project", "Task", "Status", "Assigned"], &rows)
}

/// Asks the operator to go ahead. Enter (or `y`) continues; anything else,
/// including end of input, aborts.
pub fn confirm<R: BufRead, W: Write>(mut input: R, mut output: W) -> io::Result<bool> {
    write!(output, "\nPress Enter to continue or type 'n' to abort... ")?;
    output.flush()?;
    let mut answer = String::new();
    if input.read_line(&mut answer)? == 0 {
        return Ok(false);
    }
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "" | "y" | "yes"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use toggl2pl_core::error::PublishError;
    use toggl2pl_core::publish::{BucketFailure, PublishReport};

    fn bucket(client: &str, project: &str, description: &str, minutes: u64) -> AggregateBucket {
        AggregateBucket {
            client: client.into(),
            project: project.into(),
            description: description.into(),
            duration_seconds: minutes * 60,
            duration_minutes: minutes,
            rounded_minutes: 45,
        }
    }

    #[test]
    fn table_aligns_columns() {
        let table = render_table(&[
            bucket("Acme", "Website", "Fix bug", 31),
            bucket("Globex Corporation", "Api", "Deploy", 7),
        ]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Client              Project"));
        assert!(lines[1].starts_with("------------------  -------"));
        let position = |line: &str| line.find("Website").or_else(|| line.find("Api"));
        assert_eq!(position(lines[2]), position(lines[3]), "project column aligned");
    }

    #[test]
    fn empty_plan_says_so() {
        assert_eq!(render_plan(&ReconciliationPlan::default()), "Nothing to create.");
        let mut plan = ReconciliationPlan {
            missing_clients: vec!["Globex".into()],
            ..Default::default()
        };
        plan.missing_projects.insert("Globex".into(), vec!["Api".into()]);
        assert_eq!(render_plan(&plan), "+ client  Globex\n+ project Globex / Api");
    }

    #[test]
    fn excluded_note_names_count_minutes_and_clients() {
        let excluded = ExcludedEntries {
            count: 3,
            seconds: 1530,
            clients: ["Internal".to_string(), "Holiday".to_string()].into_iter().collect(),
        };
        assert_eq!(
            render_excluded(&excluded),
            "Left out 3 entries (26 min) of excluded clients: Holiday, Internal"
        );
    }

    #[test]
    fn report_lists_failures() {
        let report = SynchroniseReport {
            date: NaiveDate::from_ymd_opt(2024, 3, 14).expect("valid date"),
            buckets: 2,
            publish: PublishReport {
                failed: vec![BucketFailure {
                    bucket: bucket("Globex", "Api", "Deploy", 5),
                    error: PublishError::UnresolvedProject {
                        client: "Globex".into(),
                    },
                }],
                ..Default::default()
            },
        };
        let text = render_report(&report);
        assert!(text.starts_with("Posted 0 of 2 buckets for 2024-03-14"));
        assert!(text.contains("FAILED Globex / Api / Deploy"), "got: {text}");
    }

    #[test]
    fn enter_continues_and_anything_else_aborts() {
        let mut prompt = Vec::new();
        assert!(confirm(&b"\n"[..], &mut prompt).expect("io"));
        assert!(String::from_utf8(prompt).expect("utf8").contains("Press Enter"));
        assert!(confirm(&b"yes\n"[..], io::sink()).expect("io"));
        assert!(!confirm(&b"n\n"[..], io::sink()).expect("io"));
        assert!(!confirm(&b"q\n"[..], io::sink()).expect("io"));
        assert!(!confirm(&b""[..], io::sink()).expect("io"), "EOF aborts");
    }
}
