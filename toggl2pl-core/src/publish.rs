//! Posts aggregated buckets to the target tracker.
//!
//! Each bucket becomes one post. Buckets are independent: a failed post is
//! recorded and the next bucket is attempted, unless fail-fast is on. Posts
//! already accepted are never retracted.

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::contract::WorklogSink;
use crate::error::PublishError;
use crate::model::{AggregateBucket, Catalog, PostConfirmation, PostRequest};

#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// Post `rounded_minutes` instead of `duration_minutes`.
    pub use_rounded: bool,
    /// Stop after the first failed bucket.
    pub fail_fast: bool,
    /// Skip buckets whose reported minutes are zero.
    pub skip_zero: bool,
}

#[derive(Debug, Clone)]
pub struct PostedBucket {
    pub bucket: AggregateBucket,
    pub request: PostRequest,
    pub confirmation: PostConfirmation,
}

#[derive(Debug)]
pub struct BucketFailure {
    pub bucket: AggregateBucket,
    pub error: PublishError,
}

#[derive(Debug, Default)]
pub struct PublishReport {
    pub posted: Vec<PostedBucket>,
    pub failed: Vec<BucketFailure>,
    pub skipped: Vec<AggregateBucket>,
    /// Buckets never attempted because of cancellation or fail-fast.
    pub unattempted: Vec<AggregateBucket>,
    pub cancelled: bool,
}

impl PublishReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.unattempted.is_empty() && !self.cancelled
    }

    pub fn posted_minutes(&self) -> u64 {
        self.posted.iter().map(|p| p.request.minutes).sum()
    }
}

/// Builds the post for `bucket` from the ids in `catalog`.
///
/// The bucket's client names the target project and its project names the
/// task inside it.
pub fn resolve(
    bucket: &AggregateBucket,
    catalog: &Catalog,
    date: NaiveDate,
    use_rounded: bool,
) -> Result<PostRequest, PublishError> {
    let project = catalog
        .client(&bucket.client)
        .ok_or_else(|| PublishError::UnresolvedProject {
            client: bucket.client.clone(),
        })?;
    let task = catalog
        .project(&bucket.client, &bucket.project)
        .ok_or_else(|| PublishError::UnresolvedTask {
            client: bucket.client.clone(),
            project: bucket.project.clone(),
        })?;
    Ok(PostRequest {
        project_id: project.id.clone(),
        task_id: task.id.clone(),
        description: bucket.description.clone(),
        date,
        minutes: bucket.minutes(use_rounded),
    })
}

async fn publish_one<S>(
    bucket: &AggregateBucket,
    catalog: &Catalog,
    date: NaiveDate,
    use_rounded: bool,
    sink: &S,
) -> Result<PostedBucket, PublishError>
where
    S: WorklogSink + ?Sized,
{
    let request = resolve(bucket, catalog, date, use_rounded)?;
    let confirmation = sink
        .add_post(&request)
        .await
        .map_err(|source| PublishError::Remote {
            client: bucket.client.clone(),
            project: bucket.project.clone(),
            source,
        })?;
    debug!(raw = %confirmation.raw, "[PUBLISH] Post confirmation");
    Ok(PostedBucket {
        bucket: bucket.clone(),
        request,
        confirmation,
    })
}

/// Posts every bucket dated `date`, in the order given.
pub async fn publish<S>(
    buckets: &[AggregateBucket],
    catalog: &Catalog,
    date: NaiveDate,
    options: &PublishOptions,
    sink: &S,
    cancel: &CancellationToken,
) -> PublishReport
where
    S: WorklogSink + ?Sized,
{
    info!(buckets = buckets.len(), %date, use_rounded = options.use_rounded, "[PUBLISH] Starting");
    let mut report = PublishReport::default();

    for (position, bucket) in buckets.iter().enumerate() {
        if cancel.is_cancelled() {
            warn!(posted = report.posted.len(), "[PUBLISH] Cancelled");
            report.cancelled = true;
            report.unattempted.extend_from_slice(&buckets[position..]);
            break;
        }
        if options.skip_zero && bucket.minutes(options.use_rounded) == 0 {
            info!(client = %bucket.client, project = %bucket.project, "[PUBLISH] Skipping zero-minute bucket");
            report.skipped.push(bucket.clone());
            continue;
        }

        match publish_one(bucket, catalog, date, options.use_rounded, sink).await {
            Ok(posted) => {
                info!(
                    client = %bucket.client,
                    project = %bucket.project,
                    minutes = posted.request.minutes,
                    "[PUBLISH] Posted"
                );
                report.posted.push(posted);
            }
            Err(error) => {
                error!(client = %bucket.client, project = %bucket.project, error = %error, "[PUBLISH][ERROR] Post failed");
                report.failed.push(BucketFailure {
                    bucket: bucket.clone(),
                    error,
                });
                if options.fail_fast {
                    report.unattempted.extend_from_slice(&buckets[position + 1..]);
                    break;
                }
            }
        }
    }

    info!(
        posted = report.posted.len(),
        failed = report.failed.len(),
        skipped = report.skipped.len(),
        unattempted = report.unattempted.len(),
        "[PUBLISH] Finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockWorklogSink;
    use crate::model::{EntityId, TaxonomyEntity};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 14).expect("valid date")
    }

    fn bucket(client: &str, project: &str, minutes: u64) -> AggregateBucket {
        AggregateBucket {
            client: client.into(),
            project: project.into(),
            description: "Work".into(),
            duration_seconds: minutes * 60,
            duration_minutes: minutes,
            rounded_minutes: crate::rounding::RoundingPolicy::default().round(minutes),
        }
    }

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.insert_client(TaxonomyEntity::new(1i64, "Acme", None));
        catalog.insert_project(&EntityId::from(1), TaxonomyEntity::new(11i64, "Website", None));
        catalog
    }

    #[test]
    fn resolve_maps_client_to_project_and_project_to_task() {
        let request = resolve(&bucket("Acme", "Website", 31), &catalog(), date(), true)
            .expect("resolvable");
        assert_eq!(request.project_id, EntityId::from(1));
        assert_eq!(request.task_id, EntityId::from(11));
        assert_eq!(request.minutes, 45);
        assert_eq!(request.date, date());
    }

    #[test]
    fn resolve_misses_are_typed() {
        assert!(matches!(
            resolve(&bucket("Globex", "Website", 5), &catalog(), date(), false),
            Err(PublishError::UnresolvedProject { .. })
        ));
        assert!(matches!(
            resolve(&bucket("Acme", "Support", 5), &catalog(), date(), false),
            Err(PublishError::UnresolvedTask { .. })
        ));
    }

    #[tokio::test]
    async fn nothing_to_publish_posts_nothing() {
        let sink = MockWorklogSink::new();
        let report = publish(
            &[],
            &catalog(),
            date(),
            &PublishOptions::default(),
            &sink,
            &CancellationToken::new(),
        )
        .await;
        assert!(report.posted.is_empty());
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn skip_zero_leaves_empty_buckets_out() {
        let mut sink = MockWorklogSink::new();
        sink.expect_add_post().times(1).returning(|_| {
            Ok(PostConfirmation {
                raw: serde_json::json!({"status": "ok"}),
            })
        });
        let options = PublishOptions {
            skip_zero: true,
            ..Default::default()
        };
        let buckets = vec![bucket("Acme", "Website", 0), bucket("Acme", "Website", 12)];
        let report = publish(&buckets, &catalog(), date(), &options, &sink, &CancellationToken::new()).await;
        assert_eq!(report.posted.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.posted_minutes(), 12);
    }
}
