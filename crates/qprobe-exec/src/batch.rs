//! Batch execution of every test in a catalog.
//!
//! All tests start in one asynchronous wave; test `i` waits `i × delay`
//! before its first network call. Records come back in catalog order, no
//! matter which test finished first.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{error, info, warn};

use qprobe_catalog::{Catalog, MethodDescriptor, TestSpecification};
use qprobe_codec::{assemble, AssembleError, Payload, Resolver};

use crate::assess::{display_value, Assessor};
use crate::dispatcher::{outcome_for_error, Dispatch, Dispatcher};
use crate::error::ExecutionError;
use crate::store::ResultStore;
use crate::types::{CallPath, ExecutionRecord, VulnerabilityVerdict};

/// A test with its inputs resolved and payload assembled, ready to send.
struct PreparedTest {
    index: usize,
    method_pos: usize,
    spec: TestSpecification,
    payload: Result<Payload, AssembleError>,
    repairs: Vec<String>,
}

pub struct BatchRunner {
    dispatcher: Dispatcher,
    assessor: Assessor,
    delay: Duration,
    store: Option<Arc<dyn ResultStore>>,
}

impl BatchRunner {
    pub fn new(dispatcher: Dispatcher, assessor: Assessor, delay: Duration) -> Self {
        BatchRunner {
            dispatcher,
            assessor,
            delay,
            store: None,
        }
    }

    /// Persist every record as soon as its test finishes.
    pub fn with_store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Execute every test in `catalog`.
    ///
    /// Repairs made while resolving inputs are written back into the
    /// catalog's test specifications.
    pub async fn run(&self, catalog: &mut Catalog) -> Vec<ExecutionRecord> {
        let prepared = prepare(catalog);
        info!(
            contract = %catalog.contract_name,
            tests = prepared.len(),
            delay_ms = self.delay.as_millis() as u64,
            "starting batch"
        );

        let catalog = &*catalog;
        let runs = prepared
            .into_iter()
            .map(|test| self.run_one(&catalog.methods[test.method_pos].method, test));
        join_all(runs).await
    }

    async fn run_one(&self, method: &MethodDescriptor, test: PreparedTest) -> ExecutionRecord {
        let steps = u32::try_from(test.index).unwrap_or(u32::MAX);
        let start_delay = self.delay.saturating_mul(steps);
        if !start_delay.is_zero() {
            tokio::time::sleep(start_delay).await;
        }

        let dispatch = match &test.payload {
            Ok(payload) => self.dispatcher.execute(method, payload).await,
            Err(e) => {
                let err = ExecutionError::from(e.clone());
                error!(test = %test.spec.test_name, method = %method.name, error = %err, "payload assembly failed");
                Dispatch::bare(outcome_for_error(CallPath::from(method.kind), &err))
            }
        };

        let verdict = self.assessor.assess(&test.spec, &dispatch.outcome);
        info!(
            test = %test.spec.test_name,
            method = %method.name,
            status = ?dispatch.outcome.status,
            confirmed = verdict.confirmed,
            risk = %verdict.risk_level,
            "test complete"
        );

        let record = build_record(test, method, dispatch, verdict);
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&record) {
                error!(test_id = %record.test_id, error = %e, "could not persist result");
            }
        }
        record
    }
}

/// Resolve and assemble every test, in catalog order.
fn prepare(catalog: &mut Catalog) -> Vec<PreparedTest> {
    let mut prepared = Vec::with_capacity(catalog.test_count());

    for (method_pos, entry) in catalog.methods.iter_mut().enumerate() {
        let method = &entry.method;
        for spec in entry.tests.iter_mut() {
            let resolution = Resolver::resolve(method, spec);
            let payload = assemble(method, &resolution.values);
            if let Ok(payload) = &payload {
                for warning in &payload.warnings {
                    warn!(test = %spec.test_name, method = %method.name, "{}", warning);
                }
            }

            prepared.push(PreparedTest {
                index: prepared.len(),
                method_pos,
                spec: spec.clone(),
                payload,
                repairs: resolution.repairs.iter().map(ToString::to_string).collect(),
            });
        }
    }

    prepared
}

fn build_record(
    test: PreparedTest,
    method: &MethodDescriptor,
    dispatch: Dispatch,
    verdict: VulnerabilityVerdict,
) -> ExecutionRecord {
    let spec = &test.spec;
    let (target_field, adversarial_value) = match &spec.targeted_value {
        Some(target) => (target.field_name.clone(), display_value(&target.raw_value)),
        None => (spec.target_variable.clone(), String::new()),
    };
    let (payload_len, warnings) = match &test.payload {
        Ok(payload) => (
            payload.len(),
            payload.warnings.iter().map(ToString::to_string).collect(),
        ),
        Err(_) => (0, Vec::new()),
    };

    ExecutionRecord {
        index: test.index,
        test_id: spec.storage_key(),
        test_name: spec.test_name.clone(),
        method: method.name.clone(),
        target_field,
        adversarial_value,
        vulnerability_category: spec.vulnerability_category.clone(),
        severity: spec.severity.clone(),
        outcome: dispatch.outcome,
        verdict,
        payload_len,
        target_tick: dispatch.target_tick,
        warnings,
        repairs: test.repairs,
        decoded_output: dispatch.decoded_output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionConfig;
    use crate::dispatcher::mock::MockLedger;
    use crate::sign::SeedSigner;
    use crate::store::MemoryStore;
    use crate::types::OutcomeStatus;
    use qprobe_catalog::INTERNAL_LOGIC_CATEGORY;
    use qprobe_codec::PLACEHOLDER_IDENTITY;
    use serde_json::json;

    fn catalog() -> Catalog {
        serde_json::from_value(json!({
            "contractName": "QVAULT",
            "contractIndex": 4,
            "methods": [
                {
                    "name": "transfer",
                    "type": "PROCEDURE",
                    "procedureIndex": 2,
                    "packageSize": 40,
                    "inputFields": [
                        { "name": "to", "qubicType": "id", "order": 0 },
                        { "name": "amount", "qubicType": "uint64", "order": 1 }
                    ],
                    "securityTestCases": [
                        {
                            "id": "tc-1",
                            "testName": "overflow",
                            "methodName": "transfer",
                            "targetVariable": "amount",
                            "vulnerabilityType": "Integer Overflow",
                            "severity": "Critical",
                            "testInputs": {
                                "targetInput": { "variableName": "amount", "maliciousValue": "18446744073709551615" },
                                "otherInputs": { "to": PLACEHOLDER_IDENTITY, "memo": "stale" }
                            }
                        },
                        {
                            "testName": "ghost field",
                            "methodName": "transfer",
                            "targetVariable": "recipient",
                            "vulnerabilityType": "Access Control",
                            "severity": "High",
                            "testInputs": {
                                "targetInput": { "variableName": "recipient", "maliciousValue": "not-an-id" }
                            }
                        }
                    ]
                },
                {
                    "name": "balanceOf",
                    "type": "FUNCTION",
                    "procedureIndex": 1,
                    "packageSize": 32,
                    "inputFields": [{ "name": "owner", "qubicType": "id", "order": 0 }],
                    "outputFields": [{ "name": "balance", "qubicType": "uint64", "order": 0 }],
                    "securityTestCases": [{
                        "testName": "peek",
                        "methodName": "balanceOf",
                        "vulnerabilityType": "Information Disclosure",
                        "severity": "Medium",
                        "testInputs": { "targetInput": { "variableName": "owner", "maliciousValue": PLACEHOLDER_IDENTITY } }
                    }]
                }
            ]
        }))
        .unwrap()
    }

    fn runner(ledger: Arc<MockLedger>) -> BatchRunner {
        let config = ExecutionConfig {
            contract_index: 4,
            test_identity: PLACEHOLDER_IDENTITY.to_string(),
            test_seed: "k".repeat(55),
            ..Default::default()
        };
        let signer = Arc::new(SeedSigner::from_seed(&config.test_seed).unwrap());
        let dispatcher = Dispatcher::new(&config, ledger, signer).unwrap();
        BatchRunner::new(dispatcher, Assessor::default(), Duration::ZERO)
    }

    #[tokio::test]
    async fn records_in_catalog_order() {
        let ledger = Arc::new(MockLedger {
            query: Ok("ZAAAAAAAAAA=".to_string()),
            ..MockLedger::healthy()
        });
        let mut catalog = catalog();
        let records = runner(ledger.clone()).run(&mut catalog).await;

        let names: Vec<&str> = records.iter().map(|r| r.test_name.as_str()).collect();
        assert_eq!(names, ["overflow", "ghost field", "peek"]);
        assert_eq!(records.iter().map(|r| r.index).collect::<Vec<_>>(), [0, 1, 2]);

        assert_eq!(ledger.broadcasts.lock().unwrap().len(), 2);
        assert_eq!(ledger.queries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn verdicts_and_payloads() {
        let ledger = Arc::new(MockLedger {
            query: Ok("ZAAAAAAAAAA=".to_string()),
            ..MockLedger::healthy()
        });
        let mut catalog = catalog();
        let records = runner(ledger).run(&mut catalog).await;

        let overflow = &records[0];
        assert_eq!(overflow.test_id, "tc-1");
        assert_eq!(overflow.payload_len, 40);
        assert_eq!(overflow.target_tick, Some(1_005));
        assert_eq!(overflow.outcome.status, OutcomeStatus::Accepted);
        assert!(overflow.verdict.confirmed);
        assert_eq!(overflow.verdict.risk_level, "Critical");

        let peek = &records[2];
        assert_eq!(peek.test_id, "balanceOf:peek");
        assert!(peek.verdict.confirmed);
        assert_eq!(peek.decoded_output.as_ref().unwrap()["balance"], 100);
    }

    #[tokio::test]
    async fn repairs_flow_back_into_catalog() {
        let mut catalog = catalog();
        let records = runner(Arc::new(MockLedger::healthy())).run(&mut catalog).await;

        let ghost = &records[1];
        assert_eq!(ghost.target_field, "to");
        assert_eq!(ghost.vulnerability_category, INTERNAL_LOGIC_CATEGORY);
        assert_eq!(ghost.repairs.len(), 1);
        // "not-an-id" cannot be an identity; the codec substitutes zeros.
        assert_eq!(ghost.warnings.len(), 1);

        let spec = &catalog.methods[0].tests[1];
        assert_eq!(spec.target_variable, "to");
        assert_eq!(spec.vulnerability_category, INTERNAL_LOGIC_CATEGORY);
        assert!(!catalog.methods[0].tests[0].other_values.contains_key("memo"));
    }

    #[tokio::test]
    async fn failures_stay_in_the_batch() {
        let ledger = Arc::new(MockLedger {
            tick: Err(crate::error::RpcError::Network("timeout".to_string())),
            ..MockLedger::healthy()
        });
        let mut catalog = catalog();
        catalog.methods[0].method.total_input_bytes = 48;
        let records = runner(ledger).run(&mut catalog).await;

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].outcome.status, OutcomeStatus::TransportError);
        assert!(records[0]
            .outcome
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("assemble:"));
        assert_eq!(records[2].outcome.status, OutcomeStatus::Accepted);
    }

    #[tokio::test(start_paused = true)]
    async fn starts_are_staggered_by_index() {
        let delay = Duration::from_millis(250);
        let ledger = Arc::new(MockLedger::healthy());
        let mut runner = runner(ledger.clone());
        runner.delay = delay;

        let start = tokio::time::Instant::now();
        let records = runner.run(&mut catalog()).await;

        let names: Vec<&str> = records.iter().map(|r| r.test_name.as_str()).collect();
        assert_eq!(names, ["overflow", "ghost field", "peek"]);

        let calls = ledger.first_calls.lock().unwrap();
        let offsets: Vec<(Duration, &str)> = calls
            .iter()
            .map(|(at, call)| (at.duration_since(start), *call))
            .collect();
        assert_eq!(
            offsets,
            [
                (Duration::ZERO, "tick"),
                (delay, "tick"),
                (delay * 2, "query"),
            ]
        );
    }

    #[tokio::test]
    async fn persists_each_record() {
        let store = Arc::new(MemoryStore::new());
        let mut catalog = catalog();
        runner(Arc::new(MockLedger::healthy()))
            .with_store(store.clone())
            .run(&mut catalog)
            .await;

        assert_eq!(store.len(), 3);
        assert!(store.get("tc-1").is_some());
        assert!(store.get("transfer:ghost field").is_some());
    }
}
