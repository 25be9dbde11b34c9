//! Payload assembly: ordered concatenation of encoded input fields.

use std::collections::BTreeMap;

use thiserror::Error;

use qprobe_catalog::MethodDescriptor;

use crate::codec::{CodecWarning, FieldCodec};
use crate::value::FieldValue;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleError {
    /// A field had no resolved value; resolution should have prevented this.
    #[error("method '{method}': no value resolved for input field '{field}'")]
    MissingField { method: String, field: String },
    #[error("method '{method}': payload is {actual} bytes but packageSize is {expected}")]
    SizeMismatch {
        method: String,
        expected: usize,
        actual: usize,
    },
}

/// The input payload for one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    pub bytes: Vec<u8>,
    pub warnings: Vec<CodecWarning>,
}

impl Payload {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Encode every input field in `order` sequence into one buffer of exactly
/// `method.total_input_bytes` bytes.
///
/// A method without input fields yields an empty payload; declared fields are
/// always encoded, so a wrong `packageSize` is a size mismatch.
pub fn assemble(
    method: &MethodDescriptor,
    values: &BTreeMap<String, FieldValue>,
) -> Result<Payload, AssembleError> {
    let mut payload = Payload {
        bytes: Vec::with_capacity(method.total_input_bytes),
        warnings: Vec::new(),
    };

    for field in method.inputs_in_order() {
        let value = values
            .get(&field.name)
            .ok_or_else(|| AssembleError::MissingField {
                method: method.name.clone(),
                field: field.name.clone(),
            })?;
        let encoded = FieldCodec::encode(value, field);
        payload.bytes.extend_from_slice(&encoded.bytes);
        payload.warnings.extend(encoded.warnings);
    }

    if payload.bytes.len() != method.total_input_bytes {
        return Err(AssembleError::SizeMismatch {
            method: method.name.clone(),
            expected: method.total_input_bytes,
            actual: payload.bytes.len(),
        });
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qprobe_catalog::{FeeSchedule, FieldDescriptor, MethodKind, ScalarType};

    fn method(fields: Vec<FieldDescriptor>, total: usize) -> MethodDescriptor {
        MethodDescriptor {
            name: "m".to_string(),
            kind: MethodKind::Mutation,
            dispatch_index: 1,
            input_fields: fields,
            output_fields: vec![],
            total_input_bytes: total,
            fees: FeeSchedule::default(),
            description: None,
        }
    }

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, FieldValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::NumericText(v.to_string())))
            .collect()
    }

    #[test]
    fn zero_input_method_is_empty() {
        let payload = assemble(&method(vec![], 0), &values(&[("ghost", "1")])).unwrap();
        assert!(payload.is_empty());
        assert!(payload.warnings.is_empty());
    }

    #[test]
    fn follows_order_not_declaration_position() {
        let m = method(
            vec![
                FieldDescriptor::new("second", ScalarType::U8, 1),
                FieldDescriptor::new("first", ScalarType::U16, 0),
            ],
            3,
        );
        let payload = assemble(&m, &values(&[("first", "513"), ("second", "9")])).unwrap();
        assert_eq!(payload.bytes, vec![0x01, 0x02, 0x09]);
    }

    #[test]
    fn missing_value_is_fatal() {
        let m = method(
            vec![
                FieldDescriptor::new("a", ScalarType::U8, 0),
                FieldDescriptor::new("b", ScalarType::U8, 1),
            ],
            2,
        );
        let err = assemble(&m, &values(&[("a", "1")])).unwrap_err();
        assert_eq!(
            err,
            AssembleError::MissingField {
                method: "m".into(),
                field: "b".into()
            }
        );
    }

    #[test]
    fn size_mismatch_is_fatal() {
        let m = method(vec![FieldDescriptor::new("a", ScalarType::U32, 0)], 8);
        let err = assemble(&m, &values(&[("a", "1")])).unwrap_err();
        assert!(matches!(
            err,
            AssembleError::SizeMismatch {
                expected: 8,
                actual: 4,
                ..
            }
        ));
    }

    #[test]
    fn zero_package_size_with_fields_is_fatal() {
        let m = method(vec![FieldDescriptor::new("amount", ScalarType::U64, 0)], 0);
        let err = assemble(&m, &values(&[("amount", "18446744073709551615")])).unwrap_err();
        assert_eq!(
            err,
            AssembleError::SizeMismatch {
                method: "m".into(),
                expected: 0,
                actual: 8,
            }
        );
    }

    #[test]
    fn declared_size_without_fields_is_fatal() {
        let err = assemble(&method(vec![], 4), &values(&[])).unwrap_err();
        assert!(matches!(
            err,
            AssembleError::SizeMismatch {
                expected: 4,
                actual: 0,
                ..
            }
        ));
    }

    #[test]
    fn warnings_are_collected() {
        let m = method(
            vec![
                FieldDescriptor::new("a", ScalarType::U8, 0),
                FieldDescriptor::new("b", ScalarType::U8, 1),
            ],
            2,
        );
        let payload = assemble(&m, &values(&[("a", "300"), ("b", "x")])).unwrap();
        assert_eq!(payload.bytes, vec![0, 0]);
        assert_eq!(payload.warnings.len(), 2);
        assert_eq!(payload.warnings[0].field, "a");
        assert_eq!(payload.warnings[1].field, "b");
    }
}
