//! Batch summary: totals, breakdowns, overall risk, and one row per test.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::risk::{Finding, RiskAggregator, RiskSummary};
use crate::types::{ExecutionRecord, OutcomeStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTotals {
    pub tests: usize,
    pub confirmed: usize,
    pub mitigated: usize,
    pub transport_errors: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    pub test_id: String,
    pub test_name: String,
    pub method: String,
    pub target_field: String,
    pub adversarial_value: String,
    pub vulnerability_category: String,
    pub status: OutcomeStatus,
    pub behavior: String,
    pub confirmed: bool,
    pub risk_level: String,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityReport {
    pub contract: String,
    pub totals: ReportTotals,
    /// Every test, keyed by vulnerability category
    pub by_category: BTreeMap<String, usize>,
    /// Confirmed findings only, keyed by severity
    pub by_severity: BTreeMap<String, usize>,
    /// Computed over confirmed findings
    pub risk: RiskSummary,
    pub rows: Vec<ReportRow>,
}

impl SecurityReport {
    pub fn from_records(contract: impl Into<String>, records: &[ExecutionRecord]) -> Self {
        let mut totals = ReportTotals {
            tests: records.len(),
            ..Default::default()
        };
        let mut by_category: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_severity: BTreeMap<String, usize> = BTreeMap::new();
        let mut findings = Vec::new();

        for record in records {
            *by_category
                .entry(record.vulnerability_category.clone())
                .or_insert(0) += 1;

            match record.outcome.status {
                OutcomeStatus::TransportError => totals.transport_errors += 1,
                OutcomeStatus::Rejected => totals.rejected += 1,
                OutcomeStatus::Accepted => {}
            }

            if record.verdict.confirmed {
                totals.confirmed += 1;
                *by_severity.entry(record.severity.to_string()).or_insert(0) += 1;
                findings.push(Finding::new(
                    record.vulnerability_category.clone(),
                    record.severity.clone(),
                ));
            } else {
                totals.mitigated += 1;
            }
        }

        SecurityReport {
            contract: contract.into(),
            totals,
            by_category,
            by_severity,
            risk: RiskAggregator::aggregate(&findings),
            rows: records.iter().map(row).collect(),
        }
    }
}

fn row(record: &ExecutionRecord) -> ReportRow {
    ReportRow {
        test_id: record.test_id.clone(),
        test_name: record.test_name.clone(),
        method: record.method.clone(),
        target_field: record.target_field.clone(),
        adversarial_value: record.adversarial_value.clone(),
        vulnerability_category: record.vulnerability_category.clone(),
        status: record.outcome.status,
        behavior: record.outcome.behavior(),
        confirmed: record.verdict.confirmed,
        risk_level: record.verdict.risk_level.clone(),
        notes: record.verdict.notes.clone(),
    }
}
