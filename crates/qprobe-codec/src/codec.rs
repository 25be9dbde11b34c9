//! Field codec: byte-exact encoding of one field value.
//!
//! Encoding never fails. Values that cannot be represented are replaced by
//! the type default and reported as a [`CodecWarning`]; the caller decides
//! whether to log it. Multi-byte integers are little-endian.

use std::fmt;

use qprobe_catalog::field_type::ID_BYTES;
use qprobe_catalog::{FieldDescriptor, FieldType, ScalarType};

use crate::identity::{decode_identity, IdentityError};
use crate::number::{NumberError, WideInt};
use crate::value::{is_truthy, FieldValue};

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Why a value was replaced by a default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Substitution {
    Unparsable(NumberError),
    OutOfRange(NumberError),
    MalformedIdentifier(IdentityError),
    TypeMismatch { expected: String },
    ExcessElements { declared: usize, given: usize },
}

impl fmt::Display for Substitution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Substitution::Unparsable(e) | Substitution::OutOfRange(e) => write!(f, "{}", e),
            Substitution::MalformedIdentifier(e) => write!(f, "malformed identifier: {}", e),
            Substitution::TypeMismatch { expected } => write!(f, "expected {}", expected),
            Substitution::ExcessElements { declared, given } => write!(
                f,
                "{} elements given for an array of {}; extra elements dropped",
                given, declared
            ),
        }
    }
}

/// A non-fatal substitution made while encoding a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecWarning {
    pub field: String,
    pub raw: String,
    pub reason: Substitution,
}

impl fmt::Display for CodecWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field '{}': value '{}' substituted with default ({})",
            self.field, self.raw, self.reason
        )
    }
}

/// Encoded bytes of one field plus any substitutions made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub warnings: Vec<CodecWarning>,
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

pub struct FieldCodec;

impl FieldCodec {
    /// Encode `value` as exactly `field.byte_size()` bytes.
    pub fn encode(value: &FieldValue, field: &FieldDescriptor) -> Encoded {
        let mut ctx = EncodeContext {
            field: &field.name,
            bytes: Vec::with_capacity(field.byte_size()),
            warnings: Vec::new(),
        };

        match &field.field_type {
            FieldType::Scalar(scalar) => ctx.scalar(value, *scalar),
            FieldType::Array { element, len } => ctx.array(value, *element, *len),
        }

        Encoded {
            bytes: ctx.bytes,
            warnings: ctx.warnings,
        }
    }
}

struct EncodeContext<'a> {
    field: &'a str,
    bytes: Vec<u8>,
    warnings: Vec<CodecWarning>,
}

impl EncodeContext<'_> {
    fn warn(&mut self, raw: impl fmt::Display, reason: Substitution) {
        self.warnings.push(CodecWarning {
            field: self.field.to_string(),
            raw: raw.to_string(),
            reason,
        });
    }

    // -- Arrays -------------------------------------------------------------

    fn array(&mut self, value: &FieldValue, element: ScalarType, len: usize) {
        let single;
        let items: &[FieldValue] = match value {
            FieldValue::ArrayOfValues(items) => items,
            other => {
                single = [other.clone()];
                &single
            }
        };

        if items.len() > len {
            self.warn(
                value,
                Substitution::ExcessElements {
                    declared: len,
                    given: items.len(),
                },
            );
        }

        let default = FieldValue::type_default(&FieldType::Scalar(element));
        for i in 0..len {
            self.scalar(items.get(i).unwrap_or(&default), element);
        }
    }

    // -- Scalars ------------------------------------------------------------

    fn scalar(&mut self, value: &FieldValue, scalar: ScalarType) {
        match scalar {
            ScalarType::Bool => self.boolean(value),
            ScalarType::Id => self.identifier(value),
            ScalarType::Chars(n) => self.chars(value, n),
            _ => self.integer(value, scalar),
        }
    }

    fn integer(&mut self, value: &FieldValue, scalar: ScalarType) {
        let size = scalar.byte_size();
        let text = match value {
            FieldValue::NumericText(s) | FieldValue::IdentifierText(s) | FieldValue::Text(s) => {
                s.as_str()
            }
            FieldValue::BooleanFlag(b) => {
                self.push_le(u64::from(*b).to_le_bytes(), size);
                return;
            }
            FieldValue::ArrayOfValues(_) => {
                self.warn(
                    value,
                    Substitution::TypeMismatch {
                        expected: scalar.to_string(),
                    },
                );
                self.bytes.extend(std::iter::repeat(0).take(size));
                return;
            }
        };

        let bits = scalar.bits().unwrap_or(64);
        let parsed = WideInt::parse(text).and_then(|n| {
            if scalar.is_signed() {
                n.to_signed(bits).map(|v| v.to_le_bytes())
            } else {
                n.to_unsigned(bits).map(|v| v.to_le_bytes())
            }
        });

        match parsed {
            Ok(le) => self.push_le(le, size),
            Err(e) => {
                let reason = if e.is_range() {
                    Substitution::OutOfRange(e)
                } else {
                    Substitution::Unparsable(e)
                };
                self.warn(text, reason);
                self.bytes.extend(std::iter::repeat(0).take(size));
            }
        }
    }

    fn push_le(&mut self, le: [u8; 8], size: usize) {
        self.bytes.extend_from_slice(&le[..size]);
    }

    fn boolean(&mut self, value: &FieldValue) {
        let flag = match value {
            FieldValue::BooleanFlag(b) => *b,
            FieldValue::NumericText(s) | FieldValue::IdentifierText(s) | FieldValue::Text(s) => {
                is_truthy(s)
            }
            FieldValue::ArrayOfValues(_) => {
                self.warn(
                    value,
                    Substitution::TypeMismatch {
                        expected: "bit".to_string(),
                    },
                );
                false
            }
        };
        self.bytes.push(u8::from(flag));
    }

    fn identifier(&mut self, value: &FieldValue) {
        let key = match value {
            FieldValue::IdentifierText(s) | FieldValue::Text(s) | FieldValue::NumericText(s) => {
                decode_identity(s).map_err(Substitution::MalformedIdentifier)
            }
            FieldValue::BooleanFlag(_) | FieldValue::ArrayOfValues(_) => {
                Err(Substitution::TypeMismatch {
                    expected: "id".to_string(),
                })
            }
        };

        match key {
            Ok(key) => self.bytes.extend_from_slice(&key),
            Err(reason) => {
                self.warn(value, reason);
                self.bytes.extend_from_slice(&[0u8; ID_BYTES]);
            }
        }
    }

    /// UTF-8 bytes, left-justified and zero-padded; overlong input is cut.
    fn chars(&mut self, value: &FieldValue, n: usize) {
        let text = value.to_string();
        let raw = text.as_bytes();
        let take = raw.len().min(n);
        self.bytes.extend_from_slice(&raw[..take]);
        self.bytes.extend(std::iter::repeat(0).take(n - take));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
