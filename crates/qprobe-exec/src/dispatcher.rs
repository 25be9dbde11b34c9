//! Per-test execution: the query and mutation state machines.
//!
//! ```text
//! query:    payload -> query_contract -> Accepted | TransportError
//! mutation: payload -> current_tick -> build -> sign -> broadcast
//!                   -> Accepted | Rejected | TransportError
//! ```
//!
//! Every stage failure becomes an [`ExecutionOutcome`]; nothing here returns
//! an error to the batch.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use qprobe_catalog::{MethodDescriptor, MethodKind};
use qprobe_codec::{checksum_matches, contract_identity, decode_identity, decode_output, Payload};

use crate::config::ExecutionConfig;
use crate::error::{ConfigError, ExecutionError, TransactionError};
use crate::rpc::{LedgerClient, QueryRequest};
use crate::sign::TransactionSigner;
use crate::transaction::{sign_transaction, UnsignedTransaction};
use crate::types::{CallPath, ExecutionOutcome};

/// The result of one dispatch: the terminal outcome plus path-specific extras.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub outcome: ExecutionOutcome,
    /// Tick the transaction was scheduled for (mutation path)
    pub target_tick: Option<u32>,
    /// Response decoded against the method's output fields (query path)
    pub decoded_output: Option<Map<String, Value>>,
}

impl Dispatch {
    pub(crate) fn bare(outcome: ExecutionOutcome) -> Self {
        Dispatch {
            outcome,
            target_tick: None,
            decoded_output: None,
        }
    }
}

/// Sends assembled payloads to the ledger.
pub struct Dispatcher {
    ledger: Arc<dyn LedgerClient>,
    signer: Arc<dyn TransactionSigner>,
    contract_index: u32,
    source: [u8; 32],
    destination: [u8; 32],
    tick_offset: u32,
}

impl Dispatcher {
    /// Decode identities up front so a bad configuration fails before any test runs.
    pub fn new(
        config: &ExecutionConfig,
        ledger: Arc<dyn LedgerClient>,
        signer: Arc<dyn TransactionSigner>,
    ) -> Result<Self, ConfigError> {
        let source = decode_identity(&config.test_identity).map_err(|source| {
            ConfigError::InvalidIdentity {
                name: "test_identity",
                source,
            }
        })?;
        let destination = match &config.contract_address {
            Some(address) => {
                decode_identity(address).map_err(|source| ConfigError::InvalidIdentity {
                    name: "contract_address",
                    source,
                })?
            }
            None => contract_identity(config.contract_index),
        };
        if config.tick_offset == 0 {
            return Err(ConfigError::InvalidValue {
                name: "tick_offset",
                expected: "at least 1",
                value: "0".to_string(),
            });
        }

        if !checksum_matches(&config.test_identity).unwrap_or(false) {
            warn!(identity = %config.test_identity, "test_identity checksum does not match its key");
        }

        let dispatcher = Dispatcher {
            ledger,
            signer,
            contract_index: config.contract_index,
            source,
            destination,
            tick_offset: config.tick_offset,
        };
        if !dispatcher.signer_matches_identity() {
            warn!(
                identity = %config.test_identity,
                "signer public key does not match test_identity; the ledger will reject these signatures"
            );
        }
        Ok(dispatcher)
    }

    /// Whether transactions will be signed by the key `test_identity` names.
    pub fn signer_matches_identity(&self) -> bool {
        self.signer.public_key() == self.source
    }

    /// Run one test's state machine to a terminal outcome.
    pub async fn execute(&self, method: &MethodDescriptor, payload: &Payload) -> Dispatch {
        let path = CallPath::from(method.kind);
        let result = match method.kind {
            MethodKind::Query => self.query(method, payload).await,
            MethodKind::Mutation => self.mutate(method, payload).await,
        };

        match result {
            Ok(dispatch) => dispatch,
            Err(err) => {
                error!(method = %method.name, stage = %err.stage(), error = %err, "test execution failed");
                Dispatch::bare(outcome_for_error(path, &err))
            }
        }
    }

    async fn query(
        &self,
        method: &MethodDescriptor,
        payload: &Payload,
    ) -> Result<Dispatch, ExecutionError> {
        let input_size = u16::try_from(payload.len())
            .map_err(|_| TransactionError::PayloadTooLarge(payload.len()))?;
        let request = QueryRequest {
            contract_index: self.contract_index,
            input_type: method.dispatch_index,
            input_size,
            request_data: STANDARD.encode(&payload.bytes),
        };

        debug!(method = %method.name, input_type = request.input_type, input_size, "querying contract");
        let data = self
            .ledger
            .query_contract(&request)
            .await
            .map_err(ExecutionError::Query)?;

        let decoded_output = decode_response(method, &data);
        let raw_response = if data.is_empty() { None } else { Some(data) };
        Ok(Dispatch {
            outcome: ExecutionOutcome::accepted(CallPath::Query, raw_response),
            target_tick: None,
            decoded_output,
        })
    }

    async fn mutate(
        &self,
        method: &MethodDescriptor,
        payload: &Payload,
    ) -> Result<Dispatch, ExecutionError> {
        let current = self
            .ledger
            .current_tick()
            .await
            .map_err(ExecutionError::Tick)?;
        let target_tick = current.saturating_add(self.tick_offset);
        debug!(method = %method.name, current, target_tick, "scheduling transaction");

        let due = method.fees.amount_due();
        let amount = i64::try_from(due).map_err(|_| TransactionError::AmountTooLarge(due))?;
        let body = UnsignedTransaction {
            source: self.source,
            destination: self.destination,
            amount,
            tick: target_tick,
            input_type: method.dispatch_index,
            payload: payload.bytes.clone(),
        }
        .to_bytes()?;

        let signed = sign_transaction(body, self.signer.as_ref()).await?;
        debug!(method = %method.name, bytes = signed.bytes.len(), "transaction signed");

        let receipt = self
            .ledger
            .broadcast(&signed.to_base64())
            .await
            .map_err(ExecutionError::Broadcast)?;
        debug!(
            method = %method.name,
            peers = receipt.peers_broadcasted,
            transaction_id = ?receipt.transaction_id,
            "transaction broadcast"
        );

        Ok(Dispatch {
            outcome: ExecutionOutcome::accepted(CallPath::Mutation, receipt.transaction_id),
            target_tick: Some(target_tick),
            decoded_output: None,
        })
    }
}

/// Map a stage failure to its terminal outcome.
pub fn outcome_for_error(path: CallPath, err: &ExecutionError) -> ExecutionOutcome {
    let outcome = if err.is_rejection() {
        ExecutionOutcome::rejected(path, err.to_string())
    } else {
        ExecutionOutcome::transport_error(path, err.to_string())
    };
    match err.network_reply() {
        Some(reply) => outcome.with_network_reply(reply),
        None => outcome,
    }
}

fn decode_response(method: &MethodDescriptor, data: &str) -> Option<Map<String, Value>> {
    if data.is_empty() || method.output_fields.is_empty() {
        return None;
    }
    let bytes = match STANDARD.decode(data) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(method = %method.name, error = %e, "query response is not valid base64");
            return None;
        }
    };
    match decode_output(method, &bytes) {
        Ok(fields) => Some(fields),
        Err(e) => {
            warn!(method = %method.name, error = %e, "could not decode query response");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
