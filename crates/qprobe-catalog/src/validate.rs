use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::model::{Catalog, MethodDescriptor, MethodEntry, MethodKind};

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Error,
    Warning,
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticLevel::Error => write!(f, "error"),
            DiagnosticLevel::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    /// Where in the catalog, e.g. `method 'transfer'`
    pub location: String,
    pub help: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}: {}", self.level, self.location, self.message)?;
        if let Some(help) = &self.help {
            write!(f, "\n  = help: {}", help)?;
        }
        Ok(())
    }
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            message: message.into(),
            location: location.into(),
            help: None,
        }
    }

    pub fn warning(message: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            message: message.into(),
            location: location.into(),
            help: None,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagnosticLevel::Error
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Structural checks over a loaded catalog.
///
/// Errors mark catalogs whose payloads cannot be trusted (inconsistent
/// sizes, ambiguous ordering). Warnings mark tests the resolver will have to
/// repair or skip.
pub struct Validator;

impl Validator {
    pub fn validate(catalog: &Catalog) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        Self::check_method_names(catalog, &mut diagnostics);
        Self::check_dispatch_indices(catalog, &mut diagnostics);

        for entry in &catalog.methods {
            diagnostics.extend(Self::validate_method(&entry.method));
            Self::check_tests(entry, &mut diagnostics);
        }

        diagnostics
    }

    pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
        diagnostics.iter().any(Diagnostic::is_error)
    }

    // -- Catalog-level checks -----------------------------------------------

    fn check_method_names(catalog: &Catalog, diags: &mut Vec<Diagnostic>) {
        let mut seen = HashSet::new();
        for entry in &catalog.methods {
            if !seen.insert(entry.method.name.as_str()) {
                diags.push(Diagnostic::error(
                    format!("duplicate method '{}'", entry.method.name),
                    format!("contract '{}'", catalog.contract_name),
                ));
            }
        }
    }

    fn check_dispatch_indices(catalog: &Catalog, diags: &mut Vec<Diagnostic>) {
        let mut seen: HashMap<(MethodKind, u16), &str> = HashMap::new();
        for entry in &catalog.methods {
            let method = &entry.method;
            if let Some(previous) = seen.insert((method.kind, method.dispatch_index), &method.name) {
                diags.push(
                    Diagnostic::error(
                        format!(
                            "{} index {} is used by both '{}' and '{}'",
                            method.kind, method.dispatch_index, previous, method.name
                        ),
                        format!("method '{}'", method.name),
                    )
                    .with_help("queries and mutations have separate index spaces"),
                );
            }
        }
    }

    // -- Method checks ------------------------------------------------------

    /// Checks that only concern a single method descriptor.
    pub fn validate_method(method: &MethodDescriptor) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        let location = format!("method '{}'", method.name);

        Self::check_field_names(method, &location, &mut diags);
        Self::check_field_order(method, &location, &mut diags);

        let declared = method.declared_input_bytes();
        if declared != method.total_input_bytes {
            diags.push(
                Diagnostic::error(
                    format!(
                        "packageSize is {} but input fields occupy {} bytes",
                        method.total_input_bytes, declared
                    ),
                    location.clone(),
                )
                .with_help("payloads for this method will fail the size check"),
            );
        }

        if method.kind == MethodKind::Query && method.fees.requires_fee {
            diags.push(Diagnostic::warning(
                "fee declared on a query; it will never be attached",
                location,
            ));
        }

        diags
    }

    fn check_field_names(method: &MethodDescriptor, location: &str, diags: &mut Vec<Diagnostic>) {
        for (label, fields) in [("input", &method.input_fields), ("output", &method.output_fields)] {
            let mut seen = HashSet::new();
            for field in fields {
                if !seen.insert(field.name.as_str()) {
                    diags.push(Diagnostic::error(
                        format!("duplicate {} field '{}'", label, field.name),
                        location.to_string(),
                    ));
                }
            }
        }
    }

    /// Input `order` values must be exactly 0..n.
    fn check_field_order(method: &MethodDescriptor, location: &str, diags: &mut Vec<Diagnostic>) {
        let mut orders: Vec<usize> = method.input_fields.iter().map(|f| f.order).collect();
        orders.sort_unstable();
        let is_permutation = orders.iter().enumerate().all(|(i, order)| i == *order);
        if !is_permutation {
            diags.push(
                Diagnostic::error(
                    format!("input field orders {:?} are not a permutation of 0..{}", orders, orders.len()),
                    location.to_string(),
                )
                .with_help("each input field needs a unique order starting at 0"),
            );
        }
    }

    // -- Test checks --------------------------------------------------------

    fn check_tests(entry: &MethodEntry, diags: &mut Vec<Diagnostic>) {
        let method = &entry.method;
        for spec in &entry.tests {
            let location = format!("test '{}'", spec.test_name);

            if !spec.method_name.is_empty() && spec.method_name != method.name {
                diags.push(Diagnostic::warning(
                    format!(
                        "test names method '{}' but is listed under '{}'",
                        spec.method_name, method.name
                    ),
                    location.clone(),
                ));
            }

            if let Some(target) = &spec.targeted_value {
                if method.input_fields.is_empty() {
                    diags.push(Diagnostic::warning(
                        format!("method '{}' takes no input; target '{}' is ignored", method.name, target.field_name),
                        location.clone(),
                    ));
                } else if method.input_field(&target.field_name).is_none() {
                    diags.push(
                        Diagnostic::warning(
                            format!("target field '{}' does not exist on '{}'", target.field_name, method.name),
                            location.clone(),
                        )
                        .with_help("the target will be redirected to the first input field"),
                    );
                }
            }

            for name in spec.other_values.keys() {
                if method.input_field(name).is_none() {
                    diags.push(Diagnostic::warning(
                        format!("value for unknown field '{}' will be dropped", name),
                        location.clone(),
                    ));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_type::ScalarType;
    use crate::model::{FeeSchedule, FieldDescriptor, TestSpecification};

    fn transfer() -> MethodDescriptor {
        MethodDescriptor {
            name: "transfer".to_string(),
            kind: MethodKind::Mutation,
            dispatch_index: 1,
            input_fields: vec![
                FieldDescriptor::new("to", ScalarType::Id, 0),
                FieldDescriptor::new("amount", ScalarType::U64, 1),
            ],
            output_fields: vec![],
            total_input_bytes: 40,
            fees: FeeSchedule::default(),
            description: None,
        }
    }

    fn catalog(methods: Vec<MethodDescriptor>) -> Catalog {
        Catalog {
            contract_name: "QVAULT".to_string(),
            contract_index: Some(4),
            methods: methods
                .into_iter()
                .map(|method| MethodEntry {
                    method,
                    tests: vec![],
                })
                .collect(),
        }
    }

    fn errors(diags: &[Diagnostic]) -> Vec<&Diagnostic> {
        diags.iter().filter(|d| d.is_error()).collect()
    }

    // -- Valid catalogs ------------------------------------------------------

    #[test]
    fn valid_catalog() {
        let diags = Validator::validate(&catalog(vec![transfer()]));
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn same_index_different_kind_is_fine() {
        let mut query = transfer();
        query.name = "balance".to_string();
        query.kind = MethodKind::Query;
        let diags = Validator::validate(&catalog(vec![transfer(), query]));
        assert!(!Validator::has_errors(&diags), "{:?}", diags);
    }

    // -- Catalog-level errors ------------------------------------------------

    #[test]
    fn duplicate_method() {
        let diags = Validator::validate(&catalog(vec![transfer(), transfer()]));
        let errs = errors(&diags);
        assert!(errs.iter().any(|d| d.message.contains("duplicate method 'transfer'")));
    }

    #[test]
    fn duplicate_dispatch_index() {
        let mut other = transfer();
        other.name = "withdraw".to_string();
        let diags = Validator::validate(&catalog(vec![transfer(), other]));
        let errs = errors(&diags);
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains("used by both 'transfer' and 'withdraw'"));
        assert!(errs[0].help.is_some());
    }

    // -- Method errors -------------------------------------------------------

    #[test]
    fn package_size_mismatch() {
        let mut method = transfer();
        method.total_input_bytes = 48;
        let diags = Validator::validate_method(&method);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("packageSize is 48 but input fields occupy 40 bytes"));
    }

    #[test]
    fn order_gap() {
        let mut method = transfer();
        method.input_fields[1].order = 2;
        let diags = Validator::validate_method(&method);
        assert_eq!(errors(&diags).len(), 1);
        assert!(diags[0].message.contains("not a permutation"));
    }

    #[test]
    fn duplicate_order() {
        let mut method = transfer();
        method.input_fields[1].order = 0;
        let diags = Validator::validate_method(&method);
        assert!(diags[0].message.contains("not a permutation"));
    }

    #[test]
    fn duplicate_field_name() {
        let mut method = transfer();
        method.input_fields[1].name = "to".to_string();
        method.input_fields[1].field_type = ScalarType::Id.into();
        method.total_input_bytes = 64;
        let diags = Validator::validate_method(&method);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("duplicate input field 'to'"));
    }

    #[test]
    fn fee_on_query_warns() {
        let mut method = transfer();
        method.kind = MethodKind::Query;
        method.fees.requires_fee = true;
        let diags = Validator::validate_method(&method);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].level, DiagnosticLevel::Warning);
    }

    // -- Test warnings -------------------------------------------------------

    #[test]
    fn stale_target_warns() {
        let mut cat = catalog(vec![transfer()]);
        cat.methods[0].tests.push(
            TestSpecification::new("Stale", "transfer")
                .with_target("recipient", "AAAA", "renamed field")
                .with_other("memo", 1),
        );
        let diags = Validator::validate(&cat);
        assert!(!Validator::has_errors(&diags));
        assert_eq!(diags.len(), 2);
        assert!(diags[0].message.contains("target field 'recipient' does not exist"));
        assert!(diags[1].message.contains("unknown field 'memo'"));
    }

    #[test]
    fn display_includes_help() {
        let diag = Diagnostic::error("bad", "method 'x'").with_help("fix it");
        assert_eq!(diag.to_string(), "error in method 'x': bad\n  = help: fix it");
    }
}
