//! Seconds to minutes conversion and the step table used for rounded
//! reporting.

use serde::{Deserialize, Serialize};

use crate::error::RoundingPolicyError;

/// Default step boundaries in minutes past the hour.
pub const DEFAULT_STEPS: [u64; 5] = [5, 15, 30, 45, 60];

/// What a bucket with zero minutes past the hour rounds to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroPolicy {
    /// Zero stays zero.
    #[default]
    Zero,
    /// Zero is raised to the smallest step.
    MinimumStep,
}

/// Rounds the minutes past the full hour up to the next step boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundingPolicy {
    steps: Vec<u64>,
    zero: ZeroPolicy,
}

impl Default for RoundingPolicy {
    fn default() -> Self {
        Self {
            steps: DEFAULT_STEPS.to_vec(),
            zero: ZeroPolicy::default(),
        }
    }
}

impl RoundingPolicy {
    /// Steps must be positive, strictly increasing and end at 60 so every
    /// minute value in `1..=59` maps to a step.
    pub fn new(steps: Vec<u64>, zero: ZeroPolicy) -> Result<Self, RoundingPolicyError> {
        let last = *steps.last().ok_or(RoundingPolicyError::Empty)?;
        let increasing = steps.first().is_some_and(|first| *first > 0)
            && steps.windows(2).all(|pair| pair[0] < pair[1]);
        if !increasing {
            return Err(RoundingPolicyError::NotIncreasing(steps));
        }
        if last != 60 {
            return Err(RoundingPolicyError::LastStepNot60(last));
        }
        Ok(Self { steps, zero })
    }

    pub fn steps(&self) -> &[u64] {
        &self.steps
    }

    pub fn zero_policy(&self) -> ZeroPolicy {
        self.zero
    }

    /// Maps minutes past the hour (`0..=59`) to a step.
    pub fn step(&self, minutes: u64) -> u64 {
        if minutes == 0 {
            return match self.zero {
                ZeroPolicy::Zero => 0,
                ZeroPolicy::MinimumStep => self.steps[0],
            };
        }
        self.steps
            .iter()
            .copied()
            .find(|step| minutes <= *step)
            .unwrap_or(60)
    }

    /// `hours * 60 + step(minutes)` for a total minute count.
    pub fn round(&self, duration_minutes: u64) -> u64 {
        let (hours, minutes) = (duration_minutes / 60, duration_minutes % 60);
        hours * 60 + self.step(minutes)
    }
}

/// Whole minutes in `seconds`; a remainder of 30 seconds or more counts as a
/// full minute.
pub fn seconds_to_minutes(seconds: u64) -> u64 {
    let (minutes, rest) = (seconds / 60, seconds % 60);
    if rest >= 30 {
        minutes + 1
    } else {
        minutes
    }
}
