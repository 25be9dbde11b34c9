//! Data types for execution outcomes and per-test records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use qprobe_catalog::{MethodKind, Severity};

/// Which call path a test took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallPath {
    Query,
    Mutation,
}

impl From<MethodKind> for CallPath {
    fn from(kind: MethodKind) -> Self {
        match kind {
            MethodKind::Query => CallPath::Query,
            MethodKind::Mutation => CallPath::Mutation,
        }
    }
}

/// Terminal state of one test's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Query answered, or broadcast acknowledged
    Accepted,
    /// The network explicitly refused the request
    Rejected,
    /// Some stage failed before a verdict from the network
    TransportError,
}

/// What happened when a test was sent. Created once, never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub path: CallPath,
    pub status: OutcomeStatus,
    /// Query response data or transaction id, as returned by the network
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    /// `<stage>: <message>` for failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// What the ledger answered when it refused the call, if it answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_reply: Option<String>,
}

impl ExecutionOutcome {
    pub fn accepted(path: CallPath, raw_response: Option<String>) -> Self {
        Self {
            path,
            status: OutcomeStatus::Accepted,
            raw_response,
            error_message: None,
            network_reply: None,
        }
    }

    pub fn rejected(path: CallPath, message: impl Into<String>) -> Self {
        Self {
            path,
            status: OutcomeStatus::Rejected,
            raw_response: None,
            error_message: Some(message.into()),
            network_reply: None,
        }
    }

    pub fn transport_error(path: CallPath, message: impl Into<String>) -> Self {
        Self {
            path,
            status: OutcomeStatus::TransportError,
            raw_response: None,
            error_message: Some(message.into()),
            network_reply: None,
        }
    }

    pub fn with_network_reply(mut self, reply: impl Into<String>) -> Self {
        self.network_reply = Some(reply.into());
        self
    }

    /// Human-readable behavior line for reports.
    pub fn behavior(&self) -> String {
        match (self.status, self.path) {
            (OutcomeStatus::Accepted, CallPath::Mutation) => {
                "Transaction accepted by network".to_string()
            }
            (OutcomeStatus::Accepted, CallPath::Query) => "Query answered".to_string(),
            (OutcomeStatus::Rejected, _) => format!(
                "Rejected by network: {}",
                self.error_message.as_deref().unwrap_or("no reason given")
            ),
            (OutcomeStatus::TransportError, _) => format!(
                "Error occurred: {}",
                self.error_message.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}

/// Verdict for one test. Derived deterministically from spec and outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityVerdict {
    pub confirmed: bool,
    /// The spec's severity when confirmed, otherwise `Mitigated`
    pub risk_level: String,
    pub notes: String,
}

pub const MITIGATED: &str = "Mitigated";

/// Everything recorded about one executed test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Position of the test in the batch
    pub index: usize,
    pub test_id: String,
    pub test_name: String,
    pub method: String,
    pub target_field: String,
    pub adversarial_value: String,
    pub vulnerability_category: String,
    pub severity: Severity,
    pub outcome: ExecutionOutcome,
    pub verdict: VulnerabilityVerdict,
    pub payload_len: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_tick: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repairs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decoded_output: Option<Map<String, Value>>,
}
