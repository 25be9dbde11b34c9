use std::collections::BTreeMap;
use std::fmt;

use qprobe_catalog::{MethodDescriptor, TestSpecification, INTERNAL_LOGIC_CATEGORY};
use tracing::{debug, warn};

use crate::value::FieldValue;

/// A stale target field reference that was redirected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRepair {
    pub test: String,
    pub from: String,
    pub to: String,
    pub previous_category: String,
}

impl fmt::Display for FieldRepair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "test '{}': target field '{}' does not exist, redirected to '{}' (category '{}' -> '{}')",
            self.test, self.from, self.to, self.previous_category, INTERNAL_LOGIC_CATEGORY
        )
    }
}

/// Complete per-field values for one test, plus what was changed to get there.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub values: BTreeMap<String, FieldValue>,
    pub repairs: Vec<FieldRepair>,
    /// Supplied field names that matched no input field
    pub dropped: Vec<String>,
}

/// Merges a test's target and sibling values with defaults.
///
/// After `resolve`, every input field of the method has exactly one value.
pub struct Resolver;

impl Resolver {
    pub fn resolve(method: &MethodDescriptor, spec: &mut TestSpecification) -> Resolution {
        let mut resolution = Resolution::default();

        let Some(first_field) = method.first_input_field() else {
            Self::clear_inputs(method, spec, &mut resolution);
            return resolution;
        };

        // Sibling values, minus stale names.
        for (name, raw) in &spec.other_values {
            match method.input_field(name) {
                Some(field) => {
                    resolution
                        .values
                        .insert(name.clone(), FieldValue::from_raw(raw, &field.field_type));
                }
                None => {
                    warn!(test = %spec.test_name, method = %method.name, field = %name, "dropping value for unknown field");
                    resolution.dropped.push(name.clone());
                }
            }
        }
        for name in &resolution.dropped {
            spec.other_values.remove(name);
        }

        // The adversarial value, redirected if its field does not exist.
        if let Some(target) = spec.targeted_value.as_mut() {
            let field = match method.input_field(&target.field_name) {
                Some(field) => field,
                None => {
                    let repair = FieldRepair {
                        test: spec.test_name.clone(),
                        from: target.field_name.clone(),
                        to: first_field.name.clone(),
                        previous_category: spec.vulnerability_category.clone(),
                    };
                    warn!(test = %spec.test_name, method = %method.name, "{}", repair);

                    target.field_name = first_field.name.clone();
                    target.semantic_type = Some(first_field.field_type.to_string());
                    spec.target_variable = first_field.name.clone();
                    spec.vulnerability_category = INTERNAL_LOGIC_CATEGORY.to_string();
                    resolution.repairs.push(repair);
                    first_field
                }
            };
            resolution.values.insert(
                field.name.clone(),
                FieldValue::from_raw(&target.raw_value, &field.field_type),
            );
        }

        for field in &method.input_fields {
            if !resolution.values.contains_key(&field.name) {
                debug!(method = %method.name, field = %field.name, "using default value");
                resolution
                    .values
                    .insert(field.name.clone(), FieldValue::default_for(field));
            }
        }

        resolution
    }

    /// Methods without parameters never receive test inputs.
    fn clear_inputs(
        method: &MethodDescriptor,
        spec: &mut TestSpecification,
        resolution: &mut Resolution,
    ) {
        resolution
            .dropped
            .extend(std::mem::take(&mut spec.other_values).into_keys());
        if let Some(target) = spec.targeted_value.take() {
            resolution.dropped.push(target.field_name);
        }
        if !resolution.dropped.is_empty() {
            debug!(
                test = %spec.test_name,
                method = %method.name,
                dropped = ?resolution.dropped,
                "method takes no input, ignoring supplied values"
            );
        }
    }
}
