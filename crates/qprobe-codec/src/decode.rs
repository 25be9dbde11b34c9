//! Decoding of fixed-layout structs back into JSON, for query responses.

use serde_json::{Map, Value};
use thiserror::Error;

use qprobe_catalog::{FieldDescriptor, FieldType, MethodDescriptor, ScalarType};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("expected at least {expected} bytes, got {actual}")]
    Short { expected: usize, actual: usize },
}

/// Decode a query response against the method's output fields.
pub fn decode_output(method: &MethodDescriptor, bytes: &[u8]) -> Result<Map<String, Value>, DecodeError> {
    decode_fields(&method.outputs_in_order(), bytes)
}

/// Decode `bytes` as the given fields laid out in sequence. Trailing bytes are ignored.
pub fn decode_fields(fields: &[&FieldDescriptor], bytes: &[u8]) -> Result<Map<String, Value>, DecodeError> {
    let expected: usize = fields.iter().map(|f| f.byte_size()).sum();
    if bytes.len() < expected {
        return Err(DecodeError::Short {
            expected,
            actual: bytes.len(),
        });
    }

    let mut out = Map::new();
    let mut offset = 0;
    for field in fields {
        let size = field.byte_size();
        let slice = &bytes[offset..offset + size];
        let value = match &field.field_type {
            FieldType::Scalar(scalar) => decode_scalar(slice, *scalar),
            FieldType::Array { element, .. } => Value::Array(
                slice
                    .chunks_exact(element.byte_size())
                    .map(|chunk| decode_scalar(chunk, *element))
                    .collect(),
            ),
        };
        out.insert(field.name.clone(), value);
        offset += size;
    }
    Ok(out)
}

fn decode_scalar(bytes: &[u8], scalar: ScalarType) -> Value {
    match scalar {
        ScalarType::Bool => Value::Bool(bytes.first().is_some_and(|b| *b != 0)),
        ScalarType::Id => Value::String(hex::encode(bytes)),
        ScalarType::Chars(_) => {
            let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
            Value::String(String::from_utf8_lossy(&bytes[..end]).into_owned())
        }
        _ => {
            let mut le = [0u8; 8];
            le[..bytes.len()].copy_from_slice(bytes);
            let unsigned = u64::from_le_bytes(le);
            if scalar.is_signed() {
                // Sign-extend from the field width.
                let shift = 64 - 8 * bytes.len() as u32;
                Value::from(((unsigned << shift) as i64) >> shift)
            } else {
                Value::from(unsigned)
            }
        }
    }
}
