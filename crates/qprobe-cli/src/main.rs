use std::fmt::Display;
use std::fs;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use qprobe_catalog::{Catalog, Diagnostic, DiagnosticLevel, MethodDescriptor, TestSpecification, Validator};
use qprobe_codec::{assemble, Resolver};
use qprobe_exec::{
    Assessor, BatchRunner, CallPath, ConfigOverrides, Dispatcher, ExecutionConfig,
    ExecutionRecord, Finding, JsonFileStore, OutcomeStatus, RiskAggregator, RiskSummary,
    RpcClient, SecurityReport, SeedSigner,
};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "qprobe", about = "Adversarial test runner for ledger smart contracts")]
#[command(version)]
struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a test catalog (errors + warnings)
    Check {
        /// Catalog JSON file
        file: String,
    },
    /// Resolve and encode test payloads without sending anything
    Encode {
        /// Catalog JSON file
        file: String,
        /// Method whose tests to encode
        #[arg(long)]
        method: String,
        /// Encode only the test with this name
        #[arg(long)]
        test: Option<String>,
        /// Output JSON instead of human-readable text
        #[arg(long)]
        json: bool,
    },
    /// Execute every test in a catalog against the ledger
    Run {
        /// Catalog JSON file
        file: String,
        /// Ledger API URL (overrides QPROBE_API_URL)
        #[arg(long)]
        api_url: Option<String>,
        /// Contract index (overrides QPROBE_CONTRACT_INDEX and the catalog)
        #[arg(long)]
        contract_index: Option<u32>,
        /// Contract identity (default: derived from the contract index)
        #[arg(long)]
        contract_address: Option<String>,
        /// Identity sending mutation transactions (overrides QPROBE_TEST_IDENTITY)
        #[arg(long)]
        identity: Option<String>,
        /// Seed of the test identity (prefer QPROBE_TEST_SEED)
        #[arg(long)]
        seed: Option<String>,
        /// Ticks between the current tick and the scheduled one
        #[arg(long)]
        tick_offset: Option<u32>,
        /// Start-time stagger between tests, in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,
        /// Output records and report as JSON
        #[arg(long)]
        json: bool,
        /// Save every record to this JSON file, keyed by test id
        #[arg(long)]
        store: Option<String>,
    },
    /// Aggregate a findings file into an overall risk score
    Risk {
        /// JSON array of { "category", "severity" }
        file: String,
        /// Output JSON instead of human-readable text
        #[arg(long)]
        json: bool,
    },
    /// Print version
    Version,
}

// ---------------------------------------------------------------------------
// ANSI helpers
// ---------------------------------------------------------------------------

struct Colors {
    red: &'static str,
    green: &'static str,
    yellow: &'static str,
    cyan: &'static str,
    bold: &'static str,
    reset: &'static str,
}

const COLORS_ON: Colors = Colors {
    red: "\x1b[31m",
    green: "\x1b[32m",
    yellow: "\x1b[33m",
    cyan: "\x1b[36m",
    bold: "\x1b[1m",
    reset: "\x1b[0m",
};

const COLORS_OFF: Colors = Colors {
    red: "",
    green: "",
    yellow: "",
    cyan: "",
    bold: "",
    reset: "",
};

fn choose_colors(no_color: bool) -> &'static Colors {
    if no_color {
        &COLORS_OFF
    } else {
        &COLORS_ON
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let c = choose_colors(cli.no_color);
    init_tracing(cli.no_color);

    match cli.command {
        Commands::Check { file } => {
            let catalog = load_catalog(&file, c);
            let diags = Validator::validate(&catalog);
            for diag in &diags {
                eprintln!("{}", format_diagnostic(diag, &file, c));
            }
            if Validator::has_errors(&diags) {
                process::exit(1);
            }
            if diags.is_empty() {
                eprintln!("No errors found.");
            }
        }

        Commands::Encode {
            file,
            method,
            test,
            json,
        } => {
            let catalog = load_catalog(&file, c);
            let encoded = encode_tests(&catalog, &method, test.as_deref())
                .unwrap_or_else(|e| fail(c, format!("{:#}", e)));
            if json {
                println!("{}", to_json(&encoded, c));
            } else {
                for item in &encoded {
                    print!("{}", format_encoded(item, c));
                }
            }
        }

        Commands::Run {
            file,
            api_url,
            contract_index,
            contract_address,
            identity,
            seed,
            tick_offset,
            delay_ms,
            json,
            store,
        } => {
            let mut catalog = load_catalog(&file, c);
            let errors: Vec<Diagnostic> = Validator::validate(&catalog)
                .into_iter()
                .filter(Diagnostic::is_error)
                .collect();
            if !errors.is_empty() {
                for diag in &errors {
                    eprintln!("{}", format_diagnostic(diag, &file, c));
                }
                fail(
                    c,
                    format!("{} has {} error(s); nothing was sent", file, errors.len()),
                );
            }
            if seed.is_some() {
                eprintln!(
                    "{}warning{}: passing seeds via CLI arguments may expose them in shell history",
                    c.yellow, c.reset
                );
            }

            let overrides = ConfigOverrides {
                api_url,
                contract_index,
                default_contract_index: catalog.contract_index,
                contract_address,
                test_identity: identity,
                test_seed: seed,
                tick_offset,
                delay_ms,
            };
            let runner = build_runner(overrides, store.as_deref())
                .unwrap_or_else(|e| fail(c, format!("{:#}", e)));

            let records = runner.run(&mut catalog).await;
            let report = SecurityReport::from_records(&catalog.contract_name, &records);

            if json {
                let output = RunOutput {
                    records: &records,
                    report: &report,
                };
                println!("{}", to_json(&output, c));
            } else {
                for record in &records {
                    print!("{}", format_record(record, records.len(), c));
                }
                print!("{}", format_report(&report, c));
            }
        }

        Commands::Risk { file, json } => {
            let source = read_file(&file, c);
            let findings: Vec<Finding> = serde_json::from_str(&source)
                .unwrap_or_else(|e| fail(c, format!("{} is not a findings list: {}", file, e)));
            let summary = RiskAggregator::aggregate(&findings);
            if json {
                println!("{}", to_json(&summary, c));
            } else {
                print!("{}", format_risk(&summary, c));
            }
        }

        Commands::Version => {
            println!("qprobe {}", env!("CARGO_PKG_VERSION"));
        }
    }
}

/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_tracing(no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(!no_color)
        .init();
}

fn build_runner(overrides: ConfigOverrides, store: Option<&str>) -> Result<BatchRunner> {
    let config = ExecutionConfig::resolve(overrides).context("invalid configuration")?;
    let signer = SeedSigner::from_seed(&config.test_seed).context("invalid test seed")?;
    let ledger = RpcClient::new(config.api_base(), config.request_timeout)
        .context("cannot create ledger client")?;
    let dispatcher = Dispatcher::new(&config, Arc::new(ledger), Arc::new(signer))
        .context("invalid configuration")?;

    info!(
        api = %config.api_base(),
        contract_index = config.contract_index,
        tick_offset = config.tick_offset,
        "configuration resolved"
    );

    let mut runner = BatchRunner::new(dispatcher, Assessor::default(), config.delay_between_tests);
    if let Some(path) = store {
        runner = runner.with_store(Arc::new(JsonFileStore::new(path)));
    }
    Ok(runner)
}

// ---------------------------------------------------------------------------
// Encoding without execution
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct EncodedTest {
    method: String,
    test: String,
    bytes: usize,
    base64: String,
    hex: String,
    warnings: Vec<String>,
    repairs: Vec<String>,
    dropped: Vec<String>,
}

/// Encode the tests of one method. A method without tests encodes its defaults.
fn encode_tests(catalog: &Catalog, method: &str, test: Option<&str>) -> Result<Vec<EncodedTest>> {
    let Some(entry) = catalog.method(method) else {
        bail!("no method '{}' in catalog", method);
    };

    let mut specs: Vec<TestSpecification> = match test {
        Some(name) => entry
            .tests
            .iter()
            .filter(|t| t.test_name == name)
            .cloned()
            .collect(),
        None => entry.tests.clone(),
    };
    if let Some(name) = test {
        if specs.is_empty() {
            bail!("method '{}' has no test named '{}'", method, name);
        }
    }
    if specs.is_empty() {
        specs.push(TestSpecification::new("defaults", method));
    }

    specs
        .iter_mut()
        .map(|spec| encode_one(&entry.method, spec))
        .collect()
}

fn encode_one(method: &MethodDescriptor, spec: &mut TestSpecification) -> Result<EncodedTest> {
    let resolution = Resolver::resolve(method, spec);
    let payload = assemble(method, &resolution.values)
        .with_context(|| format!("cannot encode test '{}'", spec.test_name))?;
    Ok(EncodedTest {
        method: method.name.clone(),
        test: spec.test_name.clone(),
        bytes: payload.len(),
        base64: STANDARD.encode(&payload.bytes),
        hex: hex::encode(&payload.bytes),
        warnings: payload.warnings.iter().map(ToString::to_string).collect(),
        repairs: resolution.repairs.iter().map(ToString::to_string).collect(),
        dropped: resolution.dropped,
    })
}

// ---------------------------------------------------------------------------
// Output formatting
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct RunOutput<'a> {
    records: &'a [ExecutionRecord],
    report: &'a SecurityReport,
}

fn format_diagnostic(diag: &Diagnostic, path: &str, c: &Colors) -> String {
    let (color, label) = match diag.level {
        DiagnosticLevel::Error => (c.red, "error"),
        DiagnosticLevel::Warning => (c.yellow, "warning"),
    };
    let mut out = format!(
        "{}{}{}{}: {}\n  {}-->{} {}: {}",
        color, c.bold, label, c.reset, diag.message, c.cyan, c.reset, path, diag.location
    );
    if let Some(help) = &diag.help {
        out.push_str(&format!("\n  {}= help{}: {}", c.cyan, c.reset, help));
    }
    out
}

fn format_encoded(item: &EncodedTest, c: &Colors) -> String {
    let mut out = format!(
        "{}{}{} / {}: {} bytes\n",
        c.bold, item.method, c.reset, item.test, item.bytes
    );
    out.push_str(&format!("  base64:  {}\n", item.base64));
    out.push_str(&format!("  hex:     {}\n", item.hex));
    for warning in &item.warnings {
        out.push_str(&format!("  {}warning{}: {}\n", c.yellow, c.reset, warning));
    }
    for repair in &item.repairs {
        out.push_str(&format!("  {}repair{}:  {}\n", c.yellow, c.reset, repair));
    }
    if !item.dropped.is_empty() {
        out.push_str(&format!("  dropped: {}\n", item.dropped.join(", ")));
    }
    out
}

/// Format a single test record for human-readable output.
fn format_record(record: &ExecutionRecord, total: usize, c: &Colors) -> String {
    let path = match record.outcome.path {
        CallPath::Query => "query",
        CallPath::Mutation => "mutation",
    };
    let mut out = format!(
        "Test {}/{}: {}.{} ({})\n",
        record.index + 1,
        total,
        record.method,
        record.test_name,
        path
    );

    if !record.target_field.is_empty() {
        out.push_str(&format!(
            "  Target:     {} = {}\n",
            record.target_field, record.adversarial_value
        ));
    }
    for repair in &record.repairs {
        out.push_str(&format!("  {}Repaired{}:   {}\n", c.yellow, c.reset, repair));
    }
    for warning in &record.warnings {
        out.push_str(&format!("  {}Warning{}:    {}\n", c.yellow, c.reset, warning));
    }
    out.push_str(&format!("  Payload:    {} bytes\n", record.payload_len));
    if let Some(tick) = record.target_tick {
        out.push_str(&format!("  Tick:       {}\n", tick));
    }

    let status = match record.outcome.status {
        OutcomeStatus::Accepted => format!("{}ACCEPTED{}", c.bold, c.reset),
        OutcomeStatus::Rejected => format!("{}REJECTED{}", c.yellow, c.reset),
        OutcomeStatus::TransportError => format!("{}TRANSPORT ERROR{}", c.red, c.reset),
    };
    out.push_str(&format!("  Status:     {}\n", status));
    if let Some(response) = &record.outcome.raw_response {
        out.push_str(&format!("  Response:   {}\n", response));
    }
    if let Some(error) = &record.outcome.error_message {
        out.push_str(&format!("  Error:      {}\n", error));
    }
    if let Some(decoded) = &record.decoded_output {
        out.push_str(&format!(
            "  Output:     {}\n",
            serde_json::Value::Object(decoded.clone())
        ));
    }

    let verdict = if record.verdict.confirmed {
        format!(
            "{}{}CONFIRMED{} ({})",
            c.red, c.bold, c.reset, record.verdict.risk_level
        )
    } else {
        format!("{}MITIGATED{}", c.green, c.reset)
    };
    out.push_str(&format!("  Verdict:    {}\n\n", verdict));
    out
}

fn format_report(report: &SecurityReport, c: &Colors) -> String {
    let totals = &report.totals;
    let mut out = format!("{}Security report: {}{}\n", c.bold, report.contract, c.reset);
    out.push_str(&format!("  Tests:            {}\n", totals.tests));
    out.push_str(&format!("  Confirmed:        {}\n", totals.confirmed));
    out.push_str(&format!("  Mitigated:        {}\n", totals.mitigated));
    out.push_str(&format!("  Rejected:         {}\n", totals.rejected));
    out.push_str(&format!("  Transport errors: {}\n", totals.transport_errors));

    if !report.by_category.is_empty() {
        out.push_str("  By category:\n");
        for (category, count) in &report.by_category {
            out.push_str(&format!("    {}: {}\n", category, count));
        }
    }
    if !report.by_severity.is_empty() {
        out.push_str("  Confirmed by severity:\n");
        for (severity, count) in &report.by_severity {
            out.push_str(&format!("    {}: {}\n", severity, count));
        }
    }

    out.push('\n');
    out.push_str(&format_risk(&report.risk, c));
    out
}

fn format_risk(summary: &RiskSummary, c: &Colors) -> String {
    let color = if summary.score >= 6.0 { c.red } else { c.cyan };
    let mut out = format!(
        "Risk: {}{}{}{} ({}/10)\n",
        color, c.bold, summary.level, c.reset, summary.score
    );
    out.push_str(&format!("{}\n", summary.summary));
    for factor in &summary.factors {
        out.push_str(&format!("  - {}\n", factor));
    }
    out
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fail(c: &Colors, message: impl Display) -> ! {
    eprintln!("{}{}error{}: {}", c.red, c.bold, c.reset, message);
    process::exit(1);
}

fn to_json<T: Serialize>(value: &T, c: &Colors) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| fail(c, format!("JSON serialization failed: {}", e)))
}

fn load_catalog(path: &str, c: &Colors) -> Catalog {
    let source = read_file(path, c);
    Catalog::from_json_str(&source)
        .unwrap_or_else(|e| fail(c, format!("cannot parse {}: {}", path, e)))
}

fn read_file(path: &str, c: &Colors) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!(
            "{}{}error{}: cannot read {}: {}",
            c.red, c.bold, c.reset, path, e
        );
        process::exit(1);
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
