pub mod field_type;
pub mod model;
pub mod validate;

pub use field_type::{FieldType, FieldTypeError, ScalarType};
pub use model::{
    Catalog, CatalogError, FeeSchedule, FieldDescriptor, MethodDescriptor, MethodEntry,
    MethodKind, Severity, TargetedValue, TestSpecification, INTERNAL_LOGIC_CATEGORY,
};
pub use validate::{Diagnostic, DiagnosticLevel, Validator};
