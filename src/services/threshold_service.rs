//! Service for gating a pipeline on the current DefectDojo finding set.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::defectdojo::{Finding, Severity};
use crate::models::gate::{GateCounts, GateVerdict, ThresholdPolicy};
use crate::services::defectdojo_client::{DefectDojoApi, FindingsFilter};

/// Count findings per severity, skipping false positives.
///
/// Findings whose severity could not be decoded are not counted.
pub fn severity_breakdown(findings: &[Finding]) -> BTreeMap<Severity, u32> {
    let mut breakdown = BTreeMap::new();
    for finding in findings.iter().filter(|f| !f.is_false_positive) {
        if let Some(severity) = finding.severity {
            *breakdown.entry(severity).or_insert(0) += 1;
        }
    }
    breakdown
}

/// Gate-relevant counts: critical, high and medium only.
pub fn tally(findings: &[Finding]) -> GateCounts {
    let breakdown = severity_breakdown(findings);
    let count = |severity: Severity| breakdown.get(&severity).copied().unwrap_or(0);
    GateCounts {
        critical: count(Severity::Critical),
        high: count(Severity::High),
        medium: count(Severity::Medium),
    }
}

pub struct ThresholdEvaluator<'a, A: DefectDojoApi + ?Sized> {
    api: &'a A,
    policy: ThresholdPolicy,
}

impl<'a, A: DefectDojoApi + ?Sized> ThresholdEvaluator<'a, A> {
    pub fn new(api: &'a A, policy: ThresholdPolicy) -> Self {
        Self { api, policy }
    }

    /// Fetch findings, optionally scoped to a product, and judge them against
    /// the policy. Reads only; repeated calls see the same remote state the
    /// same way.
    pub async fn evaluate(&self, product_id: Option<i64>) -> Result<GateVerdict> {
        let findings = self
            .api
            .list_findings(&FindingsFilter::for_product(product_id))
            .await?;

        let ignored = findings.iter().filter(|f| f.is_false_positive).count();
        if ignored > 0 {
            debug!(ignored, "False positives returned by the server were skipped");
        }

        let unknown = findings
            .iter()
            .filter(|f| !f.is_false_positive && f.severity.is_none())
            .count();
        if unknown > 0 {
            warn!(unknown, "Findings with an unrecognized severity were not counted");
        }

        let breakdown = severity_breakdown(&findings);
        for severity in [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
            Severity::Info,
        ] {
            info!(
                severity = %severity,
                count = breakdown.get(&severity).copied().unwrap_or(0),
                "Findings by severity"
            );
        }

        let verdict = GateVerdict::judge(tally(&findings), &self.policy);
        if verdict.passed {
            info!("Security check passed");
        } else {
            for reason in &verdict.reasons {
                warn!(reason = %reason, "Threshold exceeded");
            }
        }

        Ok(verdict)
    }
}
