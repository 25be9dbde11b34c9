//! Overall risk score from a set of confirmed findings.

use std::fmt;

use serde::{Deserialize, Serialize};

use qprobe_catalog::Severity;

/// One confirmed vulnerability, as far as scoring is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub category: String,
    pub severity: Severity,
}

impl Finding {
    pub fn new(category: impl Into<String>, severity: impl Into<Severity>) -> Self {
        Finding {
            category: category.into(),
            severity: severity.into(),
        }
    }
}

/// How many findings share a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub category: String,
    pub count: usize,
}

impl fmt::Display for RiskFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.count)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSummary {
    /// 0.0 to 10.0, one decimal place
    pub score: f64,
    pub level: Severity,
    pub summary: String,
    /// Categories in order of first appearance
    pub factors: Vec<RiskFactor>,
}

pub struct RiskAggregator;

impl RiskAggregator {
    /// Mean severity weight scaled to 0..10.
    ///
    /// Rounds half to even at one decimal, so 6.25 scores 6.2.
    pub fn aggregate(findings: &[Finding]) -> RiskSummary {
        if findings.is_empty() {
            return RiskSummary {
                score: 0.0,
                level: Severity::Info,
                summary: "No vulnerabilities detected".to_string(),
                factors: Vec::new(),
            };
        }

        let total: f64 = findings.iter().map(|f| f.severity.weight()).sum();
        let max = findings.len() as f64 * 10.0;
        let score = ((total / max) * 10.0 * 10.0).round_ties_even() / 10.0;
        let level = level_for(score);

        RiskSummary {
            score,
            summary: format!(
                "Found {} vulnerabilities. Risk level: {} ({}/10)",
                findings.len(),
                level,
                score
            ),
            level,
            factors: factors(findings),
        }
    }
}

fn level_for(score: f64) -> Severity {
    if score >= 8.0 {
        Severity::Critical
    } else if score >= 6.0 {
        Severity::High
    } else if score >= 4.0 {
        Severity::Medium
    } else if score >= 2.0 {
        Severity::Low
    } else {
        Severity::Info
    }
}

fn factors(findings: &[Finding]) -> Vec<RiskFactor> {
    let mut out: Vec<RiskFactor> = Vec::new();
    for finding in findings {
        match out.iter_mut().find(|f| f.category == finding.category) {
            Some(factor) => factor.count += 1,
            None => out.push(RiskFactor {
                category: finding.category.clone(),
                count: 1,
            }),
        }
    }
    out
}
