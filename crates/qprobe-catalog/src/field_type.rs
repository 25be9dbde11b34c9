//! Semantic field types and their fixed byte sizes.
//!
//! Type strings follow the contract header conventions:
//! - `uint8` .. `uint64`, `sint8` .. `sint64` (alias `int8` .. `int64`)
//! - `bit` / `bool`
//! - `id` (32-byte identifier)
//! - `char[N]` (fixed-length character buffer)
//! - `Array<T, N>` (fixed-size array of a scalar element type)

use std::fmt;

use thiserror::Error;

/// Width of an identifier in bytes.
pub const ID_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldTypeError {
    #[error("unknown field type '{0}'")]
    Unknown(String),
    #[error("invalid size in field type '{0}'")]
    InvalidSize(String),
    #[error("nested arrays are not supported: '{0}'")]
    NestedArray(String),
}

// ---------------------------------------------------------------------------
// Scalar types
// ---------------------------------------------------------------------------

/// A single, non-array field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    Bool,
    Id,
    /// Fixed-length character buffer of the given byte length
    Chars(usize),
}

impl ScalarType {
    pub fn byte_size(&self) -> usize {
        match self {
            ScalarType::U8 | ScalarType::I8 | ScalarType::Bool => 1,
            ScalarType::U16 | ScalarType::I16 => 2,
            ScalarType::U32 | ScalarType::I32 => 4,
            ScalarType::U64 | ScalarType::I64 => 8,
            ScalarType::Id => ID_BYTES,
            ScalarType::Chars(n) => *n,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.bits().is_some()
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            ScalarType::I8 | ScalarType::I16 | ScalarType::I32 | ScalarType::I64
        )
    }

    /// Bit width for integer types, `None` otherwise.
    pub fn bits(&self) -> Option<u32> {
        match self {
            ScalarType::U8 | ScalarType::I8 => Some(8),
            ScalarType::U16 | ScalarType::I16 => Some(16),
            ScalarType::U32 | ScalarType::I32 => Some(32),
            ScalarType::U64 | ScalarType::I64 => Some(64),
            _ => None,
        }
    }

    /// Parse a scalar type string. Case-insensitive.
    pub fn parse(raw: &str) -> Result<Self, FieldTypeError> {
        let normalized = raw.trim().to_ascii_lowercase();

        if let Some(inner) = normalized
            .strip_prefix("char[")
            .and_then(|rest| rest.strip_suffix(']'))
        {
            return match inner.trim().parse::<usize>() {
                Ok(n) if n > 0 => Ok(ScalarType::Chars(n)),
                _ => Err(FieldTypeError::InvalidSize(raw.to_string())),
            };
        }

        match normalized.as_str() {
            "uint8" | "u8" => Ok(ScalarType::U8),
            "uint16" | "u16" => Ok(ScalarType::U16),
            "uint32" | "u32" => Ok(ScalarType::U32),
            "uint64" | "u64" => Ok(ScalarType::U64),
            "sint8" | "int8" | "i8" => Ok(ScalarType::I8),
            "sint16" | "int16" | "i16" => Ok(ScalarType::I16),
            "sint32" | "int32" | "i32" => Ok(ScalarType::I32),
            "sint64" | "int64" | "i64" => Ok(ScalarType::I64),
            "bit" | "bool" | "boolean" => Ok(ScalarType::Bool),
            "id" | "publickey" => Ok(ScalarType::Id),
            _ if normalized.starts_with("array<") => {
                Err(FieldTypeError::NestedArray(raw.to_string()))
            }
            _ => Err(FieldTypeError::Unknown(raw.to_string())),
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarType::U8 => write!(f, "uint8"),
            ScalarType::U16 => write!(f, "uint16"),
            ScalarType::U32 => write!(f, "uint32"),
            ScalarType::U64 => write!(f, "uint64"),
            ScalarType::I8 => write!(f, "sint8"),
            ScalarType::I16 => write!(f, "sint16"),
            ScalarType::I32 => write!(f, "sint32"),
            ScalarType::I64 => write!(f, "sint64"),
            ScalarType::Bool => write!(f, "bit"),
            ScalarType::Id => write!(f, "id"),
            ScalarType::Chars(n) => write!(f, "char[{}]", n),
        }
    }
}

// ---------------------------------------------------------------------------
// Field types
// ---------------------------------------------------------------------------

/// The semantic type of a struct field: a scalar or a fixed-size array of scalars.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Scalar(ScalarType),
    Array { element: ScalarType, len: usize },
}

impl FieldType {
    pub fn byte_size(&self) -> usize {
        match self {
            FieldType::Scalar(s) => s.byte_size(),
            FieldType::Array { element, len } => element.byte_size() * len,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, FieldType::Array { .. })
    }

    /// Parse a field type string, including the `Array<T, N>` form.
    pub fn parse(raw: &str) -> Result<Self, FieldTypeError> {
        let trimmed = raw.trim();
        let lower = trimmed.to_ascii_lowercase();

        let Some(inner) = lower
            .strip_prefix("array<")
            .and_then(|rest| rest.strip_suffix('>'))
        else {
            return ScalarType::parse(trimmed).map(FieldType::Scalar);
        };

        let (element_str, len_str) = inner
            .rsplit_once(',')
            .ok_or_else(|| FieldTypeError::InvalidSize(raw.to_string()))?;

        let element = ScalarType::parse(element_str)
            .map_err(|e| match e {
                FieldTypeError::NestedArray(_) => FieldTypeError::NestedArray(raw.to_string()),
                other => other,
            })?;

        let len = len_str
            .trim()
            .parse::<usize>()
            .map_err(|_| FieldTypeError::InvalidSize(raw.to_string()))?;

        Ok(FieldType::Array { element, len })
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Scalar(s) => write!(f, "{}", s),
            FieldType::Array { element, len } => write!(f, "Array<{}, {}>", element, len),
        }
    }
}

impl From<ScalarType> for FieldType {
    fn from(scalar: ScalarType) -> Self {
        FieldType::Scalar(scalar)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_sizes() {
        assert_eq!(ScalarType::parse("uint8").unwrap().byte_size(), 1);
        assert_eq!(ScalarType::parse("uint16").unwrap().byte_size(), 2);
        assert_eq!(ScalarType::parse("sint32").unwrap().byte_size(), 4);
        assert_eq!(ScalarType::parse("int64").unwrap().byte_size(), 8);
    }

    #[test]
    fn aliases_are_case_insensitive() {
        assert_eq!(ScalarType::parse("UINT64"), Ok(ScalarType::U64));
        assert_eq!(ScalarType::parse(" Bit "), Ok(ScalarType::Bool));
        assert_eq!(ScalarType::parse("ID"), Ok(ScalarType::Id));
    }

    #[test]
    fn char_buffer() {
        assert_eq!(ScalarType::parse("char[16]"), Ok(ScalarType::Chars(16)));
        assert_eq!(
            ScalarType::parse("char[0]"),
            Err(FieldTypeError::InvalidSize("char[0]".into()))
        );
        assert_eq!(
            ScalarType::parse("char[x]"),
            Err(FieldTypeError::InvalidSize("char[x]".into()))
        );
    }

    #[test]
    fn unknown_type() {
        assert_eq!(
            ScalarType::parse("float"),
            Err(FieldTypeError::Unknown("float".into()))
        );
    }

    #[test]
    fn array_type() {
        let ty = FieldType::parse("Array<id, 16>").unwrap();
        assert_eq!(
            ty,
            FieldType::Array {
                element: ScalarType::Id,
                len: 16
            }
        );
        assert_eq!(ty.byte_size(), 512);
        assert_eq!(ty.to_string(), "Array<id, 16>");
    }

    #[test]
    fn nested_array_rejected() {
        let err = FieldType::parse("Array<Array<uint8, 2>, 2>").unwrap_err();
        assert!(matches!(err, FieldTypeError::NestedArray(_)), "{:?}", err);
    }

    #[test]
    fn display_roundtrips_through_parse() {
        for raw in ["uint8", "sint64", "bit", "id", "char[32]", "Array<uint64, 4>"] {
            let ty = FieldType::parse(raw).unwrap();
            assert_eq!(FieldType::parse(&ty.to_string()).unwrap(), ty);
        }
    }
}
