//! Error types for configuration, network access, signing, and execution.

use std::fmt;

use qprobe_codec::{AssembleError, IdentityError};
use thiserror::Error;

/// Errors from the ledger RPC endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// Could not reach the endpoint, timed out, or got a server error
    #[error("network error: {0}")]
    Network(String),
    /// The network explicitly refused the request
    #[error("rejected: {0}")]
    Rejected(String),
    /// The endpoint answered with something unexpected
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for RpcError {
    fn from(e: reqwest::Error) -> Self {
        RpcError::Network(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignError {
    #[error("invalid seed: {0}")]
    InvalidSeed(String),
    #[error("signing failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{name} must be a valid http(s) URL, got `{value}`")]
    InvalidUrl { name: &'static str, value: String },
    #[error("{name} is not a valid identity: {source}")]
    InvalidIdentity {
        name: &'static str,
        #[source]
        source: IdentityError,
    },
    #[error("{name} must be {expected}, got `{value}`")]
    InvalidValue {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error(transparent)]
    Seed(#[from] SignError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("result store I/O on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("result store JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("payload of {0} bytes exceeds the 65535-byte input limit")]
    PayloadTooLarge(usize),
    #[error("fee of {0} units does not fit a signed 64-bit amount")]
    AmountTooLarge(u64),
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// The step of a test's state machine that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Assemble,
    Query,
    Tick,
    Build,
    Sign,
    Broadcast,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Assemble => "assemble",
            Stage::Query => "query",
            Stage::Tick => "tick",
            Stage::Build => "build",
            Stage::Sign => "sign",
            Stage::Broadcast => "broadcast",
        };
        write!(f, "{}", name)
    }
}

/// A failure inside one test's execution.
///
/// Never escapes the dispatcher; it becomes the outcome's error message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("assemble: {0}")]
    Assemble(#[from] AssembleError),
    #[error("query: {0}")]
    Query(RpcError),
    #[error("tick: {0}")]
    Tick(RpcError),
    #[error("build: {0}")]
    Build(#[from] TransactionError),
    #[error("sign: {0}")]
    Sign(#[from] SignError),
    #[error("broadcast: {0}")]
    Broadcast(RpcError),
}

impl ExecutionError {
    pub fn stage(&self) -> Stage {
        match self {
            ExecutionError::Assemble(_) => Stage::Assemble,
            ExecutionError::Query(_) => Stage::Query,
            ExecutionError::Tick(_) => Stage::Tick,
            ExecutionError::Build(_) => Stage::Build,
            ExecutionError::Sign(_) => Stage::Sign,
            ExecutionError::Broadcast(_) => Stage::Broadcast,
        }
    }

    /// The network refused the transaction. Queries never end as rejections.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ExecutionError::Broadcast(RpcError::Rejected(_)))
    }

    /// Text the ledger sent back when it refused the contract call.
    ///
    /// Only query and broadcast refusals qualify; tick, build, and sign
    /// failures and local parse errors never reached the contract.
    pub fn network_reply(&self) -> Option<&str> {
        match self {
            ExecutionError::Query(RpcError::Rejected(reply))
            | ExecutionError::Broadcast(RpcError::Rejected(reply)) => Some(reply),
            _ => None,
        }
    }
}
