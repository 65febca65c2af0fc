//! Threshold policy and gate verdict types.

use serde::{Deserialize, Serialize};

/// Critical findings are never tolerated.
pub const CRITICAL_MAX: u32 = 0;

/// Maximum allowed count per severity before the gate fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdPolicy {
    pub high_max: u32,
    pub medium_max: u32,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            high_max: 2,
            medium_max: 10,
        }
    }
}

impl ThresholdPolicy {
    pub fn critical_max(&self) -> u32 {
        CRITICAL_MAX
    }
}

/// Per-severity counts of the findings that count toward the gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateCounts {
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
}

/// Result of a threshold evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateVerdict {
    pub passed: bool,
    pub counts: GateCounts,
    pub reasons: Vec<String>,
}

impl GateVerdict {
    /// Compare counts against the policy. Every violated rule contributes one
    /// reason, in critical, high, medium order.
    pub fn judge(counts: GateCounts, policy: &ThresholdPolicy) -> Self {
        let mut reasons = Vec::new();

        if counts.critical > policy.critical_max() {
            reasons.push(format!(
                "Found {} critical findings (threshold: {})",
                counts.critical,
                policy.critical_max()
            ));
        }

        if counts.high > policy.high_max {
            reasons.push(format!(
                "Found {} high findings (threshold: {})",
                counts.high, policy.high_max
            ));
        }

        if counts.medium > policy.medium_max {
            reasons.push(format!(
                "Found {} medium findings (threshold: {})",
                counts.medium, policy.medium_max
            ));
        }

        Self {
            passed: reasons.is_empty(),
            counts,
            reasons,
        }
    }
}
