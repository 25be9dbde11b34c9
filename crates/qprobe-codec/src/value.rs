//! Typed field values resolved from loosely typed catalog JSON.

use std::fmt;

use serde_json::Value;

use qprobe_catalog::{FieldDescriptor, FieldType, ScalarType};

use crate::identity::PLACEHOLDER_IDENTITY;

/// A field value, shaped once at the resolver boundary so the codec only
/// ever matches on this closed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    NumericText(String),
    BooleanFlag(bool),
    IdentifierText(String),
    Text(String),
    ArrayOfValues(Vec<FieldValue>),
}

impl FieldValue {
    /// Shape a raw catalog value according to the field type.
    ///
    /// Never fails: anything that cannot be interpreted is carried as text
    /// and the codec substitutes a default when it encodes it.
    pub fn from_raw(raw: &Value, field_type: &FieldType) -> Self {
        match field_type {
            FieldType::Scalar(scalar) => Self::scalar_from_raw(raw, *scalar),
            FieldType::Array { element, .. } => {
                let items = match raw {
                    Value::Array(items) => items.clone(),
                    Value::String(s) => match serde_json::from_str::<Value>(s) {
                        Ok(Value::Array(items)) => items,
                        Ok(other) => vec![other],
                        Err(_) => vec![Value::String(s.clone())],
                    },
                    Value::Null => Vec::new(),
                    other => vec![other.clone()],
                };
                FieldValue::ArrayOfValues(
                    items
                        .iter()
                        .map(|item| Self::scalar_from_raw(item, *element))
                        .collect(),
                )
            }
        }
    }

    fn scalar_from_raw(raw: &Value, scalar: ScalarType) -> Self {
        if raw.is_null() {
            return Self::type_default(&FieldType::Scalar(scalar));
        }
        match scalar {
            ScalarType::Bool => FieldValue::BooleanFlag(match raw {
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
                other => is_truthy(&text_of(other)),
            }),
            ScalarType::Id => FieldValue::IdentifierText(text_of(raw)),
            ScalarType::Chars(_) => FieldValue::Text(text_of(raw)),
            _ => FieldValue::NumericText(match raw {
                Value::Bool(b) => u8::from(*b).to_string(),
                other => text_of(other),
            }),
        }
    }

    /// Catalog default if declared, otherwise the type default.
    pub fn default_for(field: &FieldDescriptor) -> Self {
        match &field.default_value {
            Some(raw) if !raw.is_null() => Self::from_raw(raw, &field.field_type),
            _ => Self::type_default(&field.field_type),
        }
    }

    /// Zero, `false`, the placeholder identity, or empty.
    pub fn type_default(field_type: &FieldType) -> Self {
        match field_type {
            FieldType::Array { .. } => FieldValue::ArrayOfValues(Vec::new()),
            FieldType::Scalar(ScalarType::Bool) => FieldValue::BooleanFlag(false),
            FieldType::Scalar(ScalarType::Id) => {
                FieldValue::IdentifierText(PLACEHOLDER_IDENTITY.to_string())
            }
            FieldType::Scalar(ScalarType::Chars(_)) => FieldValue::Text(String::new()),
            FieldType::Scalar(_) => FieldValue::NumericText("0".to_string()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::NumericText(s) | FieldValue::IdentifierText(s) | FieldValue::Text(s) => {
                write!(f, "{}", s)
            }
            FieldValue::BooleanFlag(b) => write!(f, "{}", b),
            FieldValue::ArrayOfValues(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

fn text_of(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn is_truthy(text: &str) -> bool {
    matches!(text.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_become_numeric_text() {
        let ty = FieldType::Scalar(ScalarType::U64);
        assert_eq!(
            FieldValue::from_raw(&json!("18446744073709551615"), &ty),
            FieldValue::NumericText("18446744073709551615".into())
        );
        assert_eq!(
            FieldValue::from_raw(&json!(42), &ty),
            FieldValue::NumericText("42".into())
        );
        assert_eq!(
            FieldValue::from_raw(&json!(true), &ty),
            FieldValue::NumericText("1".into())
        );
    }

    #[test]
    fn boolean_text() {
        let ty = FieldType::Scalar(ScalarType::Bool);
        assert_eq!(FieldValue::from_raw(&json!("YES"), &ty), FieldValue::BooleanFlag(true));
        assert_eq!(FieldValue::from_raw(&json!("1"), &ty), FieldValue::BooleanFlag(true));
        assert_eq!(FieldValue::from_raw(&json!("nope"), &ty), FieldValue::BooleanFlag(false));
        assert_eq!(FieldValue::from_raw(&json!(0), &ty), FieldValue::BooleanFlag(false));
    }

    #[test]
    fn array_from_json_text() {
        let ty = FieldType::Array {
            element: ScalarType::U8,
            len: 4,
        };
        assert_eq!(
            FieldValue::from_raw(&json!("[1, 2, 300]"), &ty),
            FieldValue::ArrayOfValues(vec![
                FieldValue::NumericText("1".into()),
                FieldValue::NumericText("2".into()),
                FieldValue::NumericText("300".into()),
            ])
        );
    }

    #[test]
    fn array_from_non_json_text_wraps() {
        let ty = FieldType::Array {
            element: ScalarType::U8,
            len: 2,
        };
        assert_eq!(
            FieldValue::from_raw(&json!("not json"), &ty),
            FieldValue::ArrayOfValues(vec![FieldValue::NumericText("not json".into())])
        );
    }

    #[test]
    fn null_is_default() {
        let ty = FieldType::Scalar(ScalarType::Id);
        assert_eq!(
            FieldValue::from_raw(&Value::Null, &ty),
            FieldValue::IdentifierText(PLACEHOLDER_IDENTITY.into())
        );
    }

    #[test]
    fn catalog_default_wins() {
        let mut field = FieldDescriptor::new("fee", ScalarType::U32, 0);
        field.default_value = Some(json!(1000));
        assert_eq!(FieldValue::default_for(&field), FieldValue::NumericText("1000".into()));
        field.default_value = None;
        assert_eq!(FieldValue::default_for(&field), FieldValue::NumericText("0".into()));
    }

    #[test]
    fn display_array() {
        let value = FieldValue::ArrayOfValues(vec![
            FieldValue::NumericText("1".into()),
            FieldValue::BooleanFlag(true),
        ]);
        assert_eq!(value.to_string(), "[1, true]");
    }
}
