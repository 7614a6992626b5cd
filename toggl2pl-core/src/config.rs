use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};

use crate::aggregate::{AggregateOptions, Granularity};
use crate::error::RoundingPolicyError;
use crate::publish::PublishOptions;
use crate::reconcile::ReconcileOptions;
use crate::rounding::{RoundingPolicy, ZeroPolicy, DEFAULT_STEPS};

/// Tunables of a synchronisation run, as read from the `sync` section of the
/// config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub granularity: Granularity,
    pub rounding_steps: Vec<u64>,
    pub zero_policy: ZeroPolicy,
    /// Pause between consecutive create calls during reconciliation.
    pub creation_delay_ms: u64,
    /// Do not post buckets whose reported minutes are zero.
    pub skip_zero: bool,
    /// Stop publishing at the first failed post.
    pub fail_fast: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            granularity: Granularity::default(),
            rounding_steps: DEFAULT_STEPS.to_vec(),
            zero_policy: ZeroPolicy::default(),
            creation_delay_ms: 500,
            skip_zero: false,
            fail_fast: false,
        }
    }
}

impl SyncConfig {
    pub fn trace_loaded(&self) {
        info!(
            granularity = ?self.granularity,
            zero_policy = ?self.zero_policy,
            creation_delay_ms = self.creation_delay_ms,
            "Loaded SyncConfig"
        );
        debug!(?self, "SyncConfig loaded (full debug)");
    }

    pub fn rounding(&self) -> Result<RoundingPolicy, RoundingPolicyError> {
        RoundingPolicy::new(self.rounding_steps.clone(), self.zero_policy)
    }

    pub fn aggregate_options(
        &self,
        excluded_clients: BTreeSet<String>,
    ) -> Result<AggregateOptions, RoundingPolicyError> {
        Ok(AggregateOptions {
            granularity: self.granularity,
            rounding: self.rounding()?,
            excluded_clients,
        })
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            delay: Duration::from_millis(self.creation_delay_ms),
        }
    }

    pub fn publish_options(&self, use_rounded: bool) -> PublishOptions {
        PublishOptions {
            use_rounded,
            fail_fast: self.fail_fast,
            skip_zero: self.skip_zero,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_section_falls_back_to_defaults() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"granularity": "project", "zero_policy": "minimum_step"}"#)
                .expect("valid sync section");
        assert_eq!(config.granularity, Granularity::Project);
        assert_eq!(config.zero_policy, ZeroPolicy::MinimumStep);
        assert_eq!(config.rounding_steps, DEFAULT_STEPS.to_vec());
        assert_eq!(config.creation_delay_ms, 500);
        assert_eq!(config.reconcile_options().delay, Duration::from_millis(500));
    }

    #[test]
    fn invalid_steps_surface_when_building_options() {
        let config = SyncConfig {
            rounding_steps: vec![10, 20],
            ..Default::default()
        };
        assert_eq!(
            config.aggregate_options(BTreeSet::new()).map(|_| ()),
            Err(RoundingPolicyError::LastStepNot60(20))
        );
    }

    #[test]
    fn publish_options_carry_flags() {
        let config = SyncConfig {
            fail_fast: true,
            skip_zero: true,
            ..Default::default()
        };
        let options = config.publish_options(true);
        assert!(options.use_rounded && options.fail_fast && options.skip_zero);
    }
}
