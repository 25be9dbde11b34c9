//! Catalog data model: methods, fields, and adversarial test specifications.
//!
//! The JSON shapes match what the external generator produces (camelCase keys,
//! `FUNCTION`/`PROCEDURE` method types, `testInputs.targetInput` nesting).
//! Internally the model is strongly typed: field types are parsed once at load
//! time and byte sizes are checked against them.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::field_type::{FieldType, FieldTypeError, ScalarType};

/// Category assigned to a test whose target had to be redirected.
pub const INTERNAL_LOGIC_CATEGORY: &str = "Internal Logic";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("field '{field}': {source}")]
    FieldType {
        field: String,
        #[source]
        source: FieldTypeError,
    },
    #[error("field '{field}' is an array but declares no arraySize")]
    MissingArraySize { field: String },
    #[error("field '{field}' declares arraySize {declared} but its type holds {actual} elements")]
    ArraySizeMismatch {
        field: String,
        declared: usize,
        actual: usize,
    },
    #[error("field '{field}' declares byteSize {declared} but {field_type} occupies {actual} bytes")]
    ByteSizeMismatch {
        field: String,
        field_type: String,
        declared: usize,
        actual: usize,
    },
    #[error("invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Method kind and fees
// ---------------------------------------------------------------------------

/// Which call path a method uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MethodKind {
    /// Side-effect-free read answered by the query endpoint
    #[serde(rename = "FUNCTION", alias = "Query", alias = "query", alias = "function")]
    Query,
    /// State-changing call requiring a signed, tick-scheduled transaction
    #[serde(
        rename = "PROCEDURE",
        alias = "Mutation",
        alias = "mutation",
        alias = "procedure"
    )]
    Mutation,
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodKind::Query => write!(f, "query"),
            MethodKind::Mutation => write!(f, "mutation"),
        }
    }
}

/// Fee metadata declared for a method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeSchedule {
    #[serde(default)]
    pub requires_fee: bool,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: u64,
}

impl FeeSchedule {
    /// Amount attached to a mutation transaction.
    pub fn amount_due(&self) -> u64 {
        if self.requires_fee {
            self.amount
        } else {
            0
        }
    }
}

/// Generators emit fee amounts as numbers or numeric strings; anything else is zero.
fn lenient_amount<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

// ---------------------------------------------------------------------------
// Field descriptors
// ---------------------------------------------------------------------------

/// One field of a method's input or output struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFieldDescriptor", into = "RawFieldDescriptor")]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    /// Zero-based serialization position
    pub order: usize,
    pub is_required: bool,
    pub default_value: Option<Value>,
    pub description: Option<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: impl Into<FieldType>, order: usize) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            order,
            is_required: true,
            default_value: None,
            description: None,
        }
    }

    pub fn byte_size(&self) -> usize {
        self.field_type.byte_size()
    }

    pub fn is_array(&self) -> bool {
        self.field_type.is_array()
    }

    pub fn array_size(&self) -> Option<usize> {
        match &self.field_type {
            FieldType::Array { len, .. } => Some(*len),
            FieldType::Scalar(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFieldDescriptor {
    name: String,
    #[serde(alias = "type", alias = "semanticType")]
    qubic_type: String,
    #[serde(default)]
    byte_size: Option<usize>,
    #[serde(default)]
    order: usize,
    #[serde(default)]
    is_array: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    array_size: Option<usize>,
    #[serde(default = "default_required")]
    is_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

fn default_required() -> bool {
    true
}

impl TryFrom<RawFieldDescriptor> for FieldDescriptor {
    type Error = CatalogError;

    fn try_from(raw: RawFieldDescriptor) -> Result<Self, Self::Error> {
        let field_type = resolve_field_type(&raw)?;

        if let Some(declared) = raw.byte_size {
            let actual = field_type.byte_size();
            if declared != actual {
                return Err(CatalogError::ByteSizeMismatch {
                    field: raw.name,
                    field_type: field_type.to_string(),
                    declared,
                    actual,
                });
            }
        }

        Ok(FieldDescriptor {
            name: raw.name,
            field_type,
            order: raw.order,
            is_required: raw.is_required,
            default_value: raw.default_value,
            description: raw.description,
        })
    }
}

fn resolve_field_type(raw: &RawFieldDescriptor) -> Result<FieldType, CatalogError> {
    let lower = raw.qubic_type.trim().to_ascii_lowercase();

    // A bare `char`/`string` takes its length from byteSize.
    let parsed = if matches!(lower.as_str(), "char" | "string") {
        match raw.byte_size {
            Some(n) if n > 0 && !raw.is_array => Ok(FieldType::Scalar(ScalarType::Chars(n))),
            _ => Err(FieldTypeError::InvalidSize(raw.qubic_type.clone())),
        }
    } else {
        FieldType::parse(&raw.qubic_type)
    };

    let field_type = parsed.map_err(|source| CatalogError::FieldType {
        field: raw.name.clone(),
        source,
    })?;

    match (field_type, raw.is_array, raw.array_size) {
        (FieldType::Scalar(element), true, Some(len)) => Ok(FieldType::Array { element, len }),
        (FieldType::Scalar(_), true, None) => Err(CatalogError::MissingArraySize {
            field: raw.name.clone(),
        }),
        (FieldType::Array { len, .. }, _, Some(declared)) if declared != len => {
            Err(CatalogError::ArraySizeMismatch {
                field: raw.name.clone(),
                declared,
                actual: len,
            })
        }
        (ty, _, _) => Ok(ty),
    }
}

impl From<FieldDescriptor> for RawFieldDescriptor {
    fn from(field: FieldDescriptor) -> Self {
        let (qubic_type, is_array, array_size) = match &field.field_type {
            FieldType::Scalar(s) => (s.to_string(), false, None),
            FieldType::Array { element, len } => (element.to_string(), true, Some(*len)),
        };
        RawFieldDescriptor {
            byte_size: Some(field.byte_size()),
            name: field.name,
            qubic_type,
            order: field.order,
            is_array,
            array_size,
            is_required: field.is_required,
            default_value: field.default_value,
            description: field.description,
        }
    }
}

// ---------------------------------------------------------------------------
// Method descriptors
// ---------------------------------------------------------------------------

/// A callable contract method as declared in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDescriptor {
    pub name: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: MethodKind,
    #[serde(rename = "procedureIndex", alias = "dispatchIndex")]
    pub dispatch_index: u16,
    #[serde(default)]
    pub input_fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub output_fields: Vec<FieldDescriptor>,
    /// Byte length of the input payload; required.
    #[serde(rename = "packageSize", alias = "totalInputBytes")]
    pub total_input_bytes: usize,
    #[serde(default)]
    pub fees: FeeSchedule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MethodDescriptor {
    /// Input fields sorted by serialization order.
    pub fn inputs_in_order(&self) -> Vec<&FieldDescriptor> {
        sorted_by_order(&self.input_fields)
    }

    /// Output fields sorted by serialization order.
    pub fn outputs_in_order(&self) -> Vec<&FieldDescriptor> {
        sorted_by_order(&self.output_fields)
    }

    pub fn input_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.input_fields.iter().find(|f| f.name == name)
    }

    /// The field with the lowest `order`, the repair target for stale references.
    pub fn first_input_field(&self) -> Option<&FieldDescriptor> {
        self.input_fields.iter().min_by_key(|f| f.order)
    }

    /// Sum of the declared input field sizes.
    pub fn declared_input_bytes(&self) -> usize {
        self.input_fields.iter().map(FieldDescriptor::byte_size).sum()
    }

    pub fn declared_output_bytes(&self) -> usize {
        self.output_fields.iter().map(FieldDescriptor::byte_size).sum()
    }
}

fn sorted_by_order(fields: &[FieldDescriptor]) -> Vec<&FieldDescriptor> {
    let mut sorted: Vec<&FieldDescriptor> = fields.iter().collect();
    sorted.sort_by_key(|f| f.order);
    sorted
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Declared severity of a vulnerability category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
    Other(String),
}

impl Severity {
    pub fn as_str(&self) -> &str {
        match self {
            Severity::Critical => "Critical",
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
            Severity::Info => "Info",
            Severity::Other(s) => s,
        }
    }

    /// Weight used by risk aggregation.
    pub fn weight(&self) -> f64 {
        match self {
            Severity::Critical => 10.0,
            Severity::High => 7.5,
            Severity::Medium => 5.0,
            Severity::Low => 2.5,
            Severity::Info | Severity::Other(_) => 1.0,
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Medium
    }
}

impl From<String> for Severity {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "low" => Severity::Low,
            "info" | "informational" => Severity::Info,
            _ => Severity::Other(raw),
        }
    }
}

impl From<&str> for Severity {
    fn from(raw: &str) -> Self {
        Severity::from(raw.to_string())
    }
}

impl From<Severity> for String {
    fn from(severity: Severity) -> Self {
        severity.as_str().to_string()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Test specifications
// ---------------------------------------------------------------------------

/// The single field under adversarial test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetedValue {
    #[serde(rename = "variableName", alias = "fieldName")]
    pub field_name: String,
    #[serde(
        rename = "variableType",
        alias = "semanticType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub semantic_type: Option<String>,
    #[serde(rename = "maliciousValue", alias = "rawValue", default)]
    pub raw_value: Value,
    #[serde(rename = "attackReason", alias = "rationale", default)]
    pub rationale: String,
}

/// One adversarial test for one method.
///
/// Owned by the generator; the resolver rewrites `targeted_value.field_name`,
/// `target_variable`, and `vulnerability_category` when it repairs a stale
/// field reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawTestSpecification", into = "RawTestSpecification")]
pub struct TestSpecification {
    pub id: Option<String>,
    pub test_name: String,
    pub method_name: String,
    pub target_variable: String,
    pub description: String,
    pub targeted_value: Option<TargetedValue>,
    pub other_values: BTreeMap<String, Value>,
    pub vulnerability_category: String,
    pub severity: Severity,
    pub expected_behavior: String,
    pub actual_risk: String,
    pub mitigation_steps: Vec<String>,
}

impl TestSpecification {
    pub fn new(test_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            id: None,
            test_name: test_name.into(),
            method_name: method_name.into(),
            target_variable: String::new(),
            description: String::new(),
            targeted_value: None,
            other_values: BTreeMap::new(),
            vulnerability_category: String::new(),
            severity: Severity::default(),
            expected_behavior: String::new(),
            actual_risk: String::new(),
            mitigation_steps: Vec::new(),
        }
    }

    /// Target a field with an adversarial value.
    pub fn with_target(
        mut self,
        field_name: impl Into<String>,
        raw_value: impl Into<Value>,
        rationale: impl Into<String>,
    ) -> Self {
        let field_name = field_name.into();
        self.target_variable = field_name.clone();
        self.targeted_value = Some(TargetedValue {
            field_name,
            semantic_type: None,
            raw_value: raw_value.into(),
            rationale: rationale.into(),
        });
        self
    }

    pub fn with_other(mut self, field_name: impl Into<String>, raw_value: impl Into<Value>) -> Self {
        self.other_values.insert(field_name.into(), raw_value.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>, severity: Severity) -> Self {
        self.vulnerability_category = category.into();
        self.severity = severity;
        self
    }

    /// Storage key: the generator's id, else `method:testName`.
    pub fn storage_key(&self) -> String {
        match &self.id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => format!("{}:{}", self.method_name, self.test_name),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTestInputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_input: Option<TargetedValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    other_inputs: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTestSpecification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    test_name: String,
    #[serde(default)]
    method_name: String,
    #[serde(default)]
    target_variable: String,
    #[serde(default)]
    description: String,
    #[serde(default, alias = "vulnerabilityCategory")]
    vulnerability_type: String,
    #[serde(default)]
    severity: Severity,
    #[serde(default)]
    test_inputs: RawTestInputs,
    #[serde(default)]
    expected_behavior: String,
    #[serde(default)]
    actual_risk: String,
    #[serde(default)]
    mitigation_steps: Vec<String>,
}

impl From<RawTestSpecification> for TestSpecification {
    fn from(raw: RawTestSpecification) -> Self {
        TestSpecification {
            id: raw.id,
            test_name: raw.test_name,
            method_name: raw.method_name,
            target_variable: raw.target_variable,
            description: raw.description,
            targeted_value: raw.test_inputs.target_input,
            other_values: raw.test_inputs.other_inputs,
            vulnerability_category: raw.vulnerability_type,
            severity: raw.severity,
            expected_behavior: raw.expected_behavior,
            actual_risk: raw.actual_risk,
            mitigation_steps: raw.mitigation_steps,
        }
    }
}

impl From<TestSpecification> for RawTestSpecification {
    fn from(spec: TestSpecification) -> Self {
        RawTestSpecification {
            id: spec.id,
            test_name: spec.test_name,
            method_name: spec.method_name,
            target_variable: spec.target_variable,
            description: spec.description,
            vulnerability_type: spec.vulnerability_category,
            severity: spec.severity,
            test_inputs: RawTestInputs {
                target_input: spec.targeted_value,
                other_inputs: spec.other_values,
            },
            expected_behavior: spec.expected_behavior,
            actual_risk: spec.actual_risk,
            mitigation_steps: spec.mitigation_steps,
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// A method together with the tests generated for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodEntry {
    #[serde(flatten)]
    pub method: MethodDescriptor,
    #[serde(default, rename = "securityTestCases", alias = "tests")]
    pub tests: Vec<TestSpecification>,
}

/// The full analysis output for one contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    #[serde(default)]
    pub contract_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_index: Option<u32>,
    #[serde(default)]
    pub methods: Vec<MethodEntry>,
}

impl Catalog {
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn method(&self, name: &str) -> Option<&MethodEntry> {
        self.methods.iter().find(|m| m.method.name == name)
    }

    pub fn test_count(&self) -> usize {
        self.methods.iter().map(|m| m.tests.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
