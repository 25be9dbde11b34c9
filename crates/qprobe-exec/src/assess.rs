//! Verdicts: did the adversarial input get through?

use std::fmt::Write as _;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;

use qprobe_catalog::TestSpecification;

use crate::types::{CallPath, ExecutionOutcome, OutcomeStatus, VulnerabilityVerdict, MITIGATED};

/// Tunable parts of the verdict rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssessmentPolicy {
    /// Error text containing any of these (case-insensitive) means the
    /// contract's own guard refused the input
    pub mitigation_vocabulary: Vec<String>,
    /// Categories for which an answered query is a confirmed finding
    pub disclosure_categories: Vec<String>,
}

impl Default for AssessmentPolicy {
    fn default() -> Self {
        Self {
            mitigation_vocabulary: ["validation", "invalid", "bounds", "range"]
                .map(String::from)
                .to_vec(),
            disclosure_categories: ["information disclosure", "access control"]
                .map(String::from)
                .to_vec(),
        }
    }
}

impl AssessmentPolicy {
    fn mentions_guard(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.mitigation_vocabulary
            .iter()
            .any(|word| message.contains(&word.to_lowercase()))
    }

    fn is_disclosure(&self, category: &str) -> bool {
        let category = category.to_lowercase();
        self.disclosure_categories
            .iter()
            .any(|c| category.contains(&c.to_lowercase()))
    }
}

/// Why a verdict came out the way it did. Drives the notes text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reason {
    Accepted,
    DataDisclosed,
    UnexpectedFailure,
    GuardRejected,
    NetworkRefused,
    NothingDisclosed,
    NotDisclosureCategory,
}

impl Reason {
    fn confirmed(self) -> bool {
        matches!(
            self,
            Reason::Accepted | Reason::DataDisclosed | Reason::UnexpectedFailure
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct Assessor {
    policy: AssessmentPolicy,
}

impl Assessor {
    pub fn new(policy: AssessmentPolicy) -> Self {
        Assessor { policy }
    }

    pub fn policy(&self) -> &AssessmentPolicy {
        &self.policy
    }

    /// Derive the verdict for one test. Same inputs, same verdict.
    pub fn assess(&self, spec: &TestSpecification, outcome: &ExecutionOutcome) -> VulnerabilityVerdict {
        let reason = self.classify(spec, outcome);
        let confirmed = reason.confirmed();
        VulnerabilityVerdict {
            confirmed,
            risk_level: if confirmed {
                spec.severity.to_string()
            } else {
                MITIGATED.to_string()
            },
            notes: render_notes(spec, outcome, reason),
        }
    }

    fn classify(&self, spec: &TestSpecification, outcome: &ExecutionOutcome) -> Reason {
        match outcome.status {
            // Guard words count only in the ledger's own reply.
            OutcomeStatus::TransportError => match outcome.network_reply.as_deref() {
                Some(reply) if self.policy.mentions_guard(reply) => Reason::GuardRejected,
                _ => Reason::UnexpectedFailure,
            },
            OutcomeStatus::Rejected => Reason::NetworkRefused,
            OutcomeStatus::Accepted => match outcome.path {
                CallPath::Mutation => Reason::Accepted,
                CallPath::Query => {
                    if !self.policy.is_disclosure(&spec.vulnerability_category) {
                        Reason::NotDisclosureCategory
                    } else if returned_data(outcome) {
                        Reason::DataDisclosed
                    } else {
                        Reason::NothingDisclosed
                    }
                }
            },
        }
    }
}

/// A query "returned data" when its response holds at least one non-zero byte.
/// An all-zero struct is the contract's way of answering with nothing.
fn returned_data(outcome: &ExecutionOutcome) -> bool {
    match outcome.raw_response.as_deref() {
        None | Some("") => false,
        Some(data) => match STANDARD.decode(data) {
            Ok(bytes) => bytes.iter().any(|b| *b != 0),
            // Not base64, so not a zeroed struct either.
            Err(_) => true,
        },
    }
}

// ---------------------------------------------------------------------------
// Notes
// ---------------------------------------------------------------------------

fn render_notes(spec: &TestSpecification, outcome: &ExecutionOutcome, reason: Reason) -> String {
    let (value, rationale) = match &spec.targeted_value {
        Some(target) => (display_value(&target.raw_value), target.rationale.as_str()),
        None => ("unknown".to_string(), ""),
    };
    let rationale = if rationale.is_empty() { "unknown" } else { rationale };
    let target = if spec.target_variable.is_empty() {
        "unknown"
    } else {
        spec.target_variable.as_str()
    };

    let mut notes = String::new();
    let _ = writeln!(notes, "Test: {}", spec.test_name);
    let _ = writeln!(notes, "Target: {}", target);
    let _ = writeln!(notes, "Value: {}", value);
    let _ = writeln!(notes, "Reason: {}", rationale);
    if let Some(error) = &outcome.error_message {
        let _ = writeln!(notes, "Error: {}", error);
    }

    if reason.confirmed() {
        let _ = writeln!(notes, "VULNERABILITY CONFIRMED: {}", spec.vulnerability_category);
        if !spec.actual_risk.is_empty() {
            let _ = writeln!(notes, "Risk: {}", spec.actual_risk);
        }
        if !spec.mitigation_steps.is_empty() {
            let _ = writeln!(notes, "Recommended mitigations:");
            for step in &spec.mitigation_steps {
                let _ = writeln!(notes, "  - {}", step);
            }
        }
    } else {
        let why = match reason {
            Reason::GuardRejected => "contract rejected the input with a validation error",
            Reason::NetworkRefused => "network refused the transaction",
            Reason::NothingDisclosed => "query returned no data",
            _ => "query answered without exposing a disclosure-class weakness",
        };
        let _ = writeln!(notes, "MITIGATED: {}", why);
    }
    notes
}

pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "unknown".to_string(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use qprobe_catalog::Severity;

    fn spec(category: &str) -> TestSpecification {
        let mut spec = TestSpecification::new("overflow_amount", "transfer")
            .with_target("amount", "18446744073709551615", "wraps the balance")
            .with_category(category, Severity::Critical);
        spec.actual_risk = "Attacker mints funds".to_string();
        spec.mitigation_steps = vec!["Check for overflow".to_string()];
        spec
    }

    // -- Mutation path -------------------------------------------------------

    #[test]
    fn accepted_mutation_is_always_confirmed() {
        let assessor = Assessor::default();
        for category in ["Integer Overflow", "Access Control", ""] {
            let verdict = assessor.assess(
                &spec(category),
                &ExecutionOutcome::accepted(CallPath::Mutation, None),
            );
            assert!(verdict.confirmed);
            assert_eq!(verdict.risk_level, "Critical");
        }
    }

    #[test]
    fn rejected_is_mitigated() {
        let verdict = Assessor::default().assess(
            &spec("Integer Overflow"),
            &ExecutionOutcome::rejected(CallPath::Mutation, "broadcast: rejected: no peers"),
        );
        assert!(!verdict.confirmed);
        assert_eq!(verdict.risk_level, MITIGATED);
    }

    // -- Transport errors ----------------------------------------------------

    fn refused_query(reply: &str) -> ExecutionOutcome {
        ExecutionOutcome::transport_error(CallPath::Query, format!("query: rejected: {}", reply))
            .with_network_reply(reply)
    }

    #[test]
    fn invalid_error_is_mitigated() {
        let verdict = Assessor::default().assess(
            &spec("Integer Overflow"),
            &refused_query("HTTP 400: Invalid input size"),
        );
        assert!(!verdict.confirmed);
        assert_eq!(verdict.risk_level, "Mitigated");
    }

    #[test]
    fn own_error_wording_is_not_a_guard() {
        let assessor = Assessor::default();
        for message in [
            "tick: invalid response: missing or invalid 'tickInfo.tick'",
            "query: invalid response: invalid JSON: expected value at line 1 column 1",
            "build: payload of 70000 bytes exceeds the 65535-byte input limit",
            "sign: invalid seed: expected 55 lowercase letters",
        ] {
            let outcome = ExecutionOutcome::transport_error(CallPath::Mutation, message);
            let verdict = assessor.assess(&spec("Integer Overflow"), &outcome);
            assert!(verdict.confirmed, "{}", message);
            assert_eq!(verdict.risk_level, "Critical");
        }
    }

    #[test]
    fn reply_without_guard_words_is_confirmed() {
        let verdict = Assessor::default().assess(
            &spec("Integer Overflow"),
            &refused_query("HTTP 404: contract not found"),
        );
        assert!(verdict.confirmed);
    }

    #[test]
    fn unexpected_error_is_confirmed() {
        let verdict = Assessor::default().assess(
            &spec("Integer Overflow"),
            &ExecutionOutcome::transport_error(CallPath::Mutation, "tick: network error: timeout"),
        );
        assert!(verdict.confirmed);
        assert_eq!(verdict.risk_level, "Critical");
    }

    // -- Query path ----------------------------------------------------------

    #[test]
    fn disclosure_with_data_is_confirmed() {
        let outcome = ExecutionOutcome::accepted(CallPath::Query, Some("ZAAAAAAAAAA=".to_string()));
        let verdict = Assessor::default().assess(&spec("Information Disclosure"), &outcome);
        assert!(verdict.confirmed);
    }

    #[test]
    fn disclosure_without_data_is_mitigated() {
        let assessor = Assessor::default();
        let empty = ExecutionOutcome::accepted(CallPath::Query, None);
        assert!(!assessor.assess(&spec("Access Control"), &empty).confirmed);

        let zeroed = ExecutionOutcome::accepted(CallPath::Query, Some("AAAAAAAAAAA=".to_string()));
        assert!(!assessor.assess(&spec("Access Control"), &zeroed).confirmed);
    }

    #[test]
    fn other_categories_not_confirmed_by_query() {
        let outcome = ExecutionOutcome::accepted(CallPath::Query, Some("ZAAAAAAAAAA=".to_string()));
        let verdict = Assessor::default().assess(&spec("Integer Overflow"), &outcome);
        assert!(!verdict.confirmed);
    }

    #[test]
    fn custom_policy() {
        let assessor = Assessor::new(AssessmentPolicy {
            mitigation_vocabulary: vec!["refused".to_string()],
            disclosure_categories: vec!["integer overflow".to_string()],
        });
        let outcome = ExecutionOutcome::accepted(CallPath::Query, Some("ZAAAAAAAAAA=".to_string()));
        assert!(assessor.assess(&spec("Integer Overflow"), &outcome).confirmed);

        assert!(assessor.assess(&spec("Integer Overflow"), &refused_query("invalid")).confirmed);
        assert!(!assessor.assess(&spec("Integer Overflow"), &refused_query("refused")).confirmed);
    }

    // -- Notes ---------------------------------------------------------------

    #[test]
    fn confirmed_notes() {
        let verdict = Assessor::default().assess(
            &spec("Integer Overflow"),
            &ExecutionOutcome::accepted(CallPath::Mutation, Some("txid".to_string())),
        );
        insta::assert_snapshot!(verdict.notes.trim_end(), @r"
        Test: overflow_amount
        Target: amount
        Value: 18446744073709551615
        Reason: wraps the balance
        VULNERABILITY CONFIRMED: Integer Overflow
        Risk: Attacker mints funds
        Recommended mitigations:
          - Check for overflow
        ");
    }

    #[test]
    fn mitigated_notes() {
        let verdict = Assessor::default().assess(
            &spec("Integer Overflow"),
            &refused_query("value out of range"),
        );
        insta::assert_snapshot!(verdict.notes.trim_end(), @r"
        Test: overflow_amount
        Target: amount
        Value: 18446744073709551615
        Reason: wraps the balance
        Error: query: rejected: value out of range
        MITIGATED: contract rejected the input with a validation error
        ");
    }

    #[test]
    fn notes_are_deterministic() {
        let assessor = Assessor::default();
        let outcome = refused_query("bounds");
        assert_eq!(
            assessor.assess(&spec("x"), &outcome),
            assessor.assess(&spec("x"), &outcome)
        );
    }
}
