//! Type classification: raw pointer, nullable object, non-nullable
//! wrapper, or neither.
//!
//! Pure functions over the program's type table; no analysis state.

use nullguard_ir::{Program, RecordDecl, RecordId, Type, TypeId};

use crate::models::NOT_NULL_QUALIFIED_NAME;

/// Cv-qualification of one pointer level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CvQual {
    pub is_const: bool,
    pub is_volatile: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeCategory {
    RawPointer {
        pointee: TypeId,
        /// Qualification of each pointer level, outermost first.
        cv_levels: Vec<CvQual>,
    },
    NullableObject {
        record: RecordId,
    },
    NonNullableWrapper {
        /// The single pointer field's type.
        inner: TypeId,
    },
    Other,
}

impl TypeCategory {
    pub fn is_pointer_like(&self) -> bool {
        !matches!(self, TypeCategory::Other)
    }

    pub fn is_nullable(&self) -> bool {
        matches!(
            self,
            TypeCategory::RawPointer { .. } | TypeCategory::NullableObject { .. }
        )
    }
}

/// A class is the non-nullable wrapper iff its qualified name matches the
/// marker and it has exactly one non-static data member named `ptr_`, of
/// pointer type.
pub fn is_non_nullable_wrapper(program: &Program, record: &RecordDecl) -> bool {
    if record.qualified_name != NOT_NULL_QUALIFIED_NAME {
        return false;
    }
    if record.fields.len() != 1 {
        return false;
    }
    let field = &record.fields[0];
    field.name == "ptr_" && program.types.is_pointer(field.ty)
}

/// The nullable-object predicate: default-constructible, publicly
/// copyable, convertible from the null literal, testable as bool, and
/// equality-comparable with null.
pub fn is_nullable_object(record: &RecordDecl) -> bool {
    record.has_public_default_ctor
        && record.has_public_copy_ctor
        && record.has_public_copy_assign
        && record.has_nullptr_ctor
        && record.has_bool_conversion
        && record.has_null_equality
}

/// Classify a type, transparently unwrapping references while retaining
/// per-level cv-qualification of pointers.
pub fn classify(program: &Program, ty: TypeId) -> TypeCategory {
    let stripped = program.types.strip_reference(ty);
    match program.types.get(stripped) {
        Type::Pointer { pointee, .. } => {
            let mut cv_levels = Vec::new();
            let mut cur = stripped;
            while let Type::Pointer {
                pointee,
                pointee_const,
                pointee_volatile,
            } = program.types.get(cur)
            {
                cv_levels.push(CvQual {
                    is_const: *pointee_const,
                    is_volatile: *pointee_volatile,
                });
                cur = program.types.strip_reference(*pointee);
            }
            TypeCategory::RawPointer {
                pointee: *pointee,
                cv_levels,
            }
        }
        Type::Record(id) => {
            let Some(record) = program.record(*id) else {
                return TypeCategory::Other;
            };
            if is_non_nullable_wrapper(program, record) {
                let inner = record.fields[0].ty;
                TypeCategory::NonNullableWrapper { inner }
            } else if is_nullable_object(record) {
                TypeCategory::NullableObject { record: *id }
            } else {
                TypeCategory::Other
            }
        }
        _ => TypeCategory::Other,
    }
}

/// Whether the (reference-stripped) type is a nullable pointer: a raw
/// pointer or a nullable object.
pub fn is_nullable_pointer_type(program: &Program, ty: TypeId) -> bool {
    classify(program, ty).is_nullable()
}
