pub mod assess;
pub mod batch;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod report;
pub mod risk;
pub mod rpc;
pub mod sign;
pub mod store;
pub mod transaction;
pub mod types;

pub use assess::{AssessmentPolicy, Assessor};
pub use batch::BatchRunner;
pub use config::{ConfigOverrides, ExecutionConfig};
pub use dispatcher::{Dispatch, Dispatcher};
pub use error::{
    ConfigError, ExecutionError, RpcError, SignError, Stage, StoreError, TransactionError,
};
pub use report::{ReportRow, ReportTotals, SecurityReport};
pub use risk::{Finding, RiskAggregator, RiskFactor, RiskSummary};
pub use rpc::{BroadcastReceipt, LedgerClient, QueryRequest, RpcClient};
pub use sign::{SeedSigner, TransactionSigner};
pub use store::{JsonFileStore, MemoryStore, ResultStore};
pub use types::{CallPath, ExecutionOutcome, ExecutionRecord, OutcomeStatus, VulnerabilityVerdict};
