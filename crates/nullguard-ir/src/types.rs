//! Type table and record declarations.
//!
//! Types are interned: a `TypeId` is an index into the `TypeTable`.
//! Cv-qualifiers live on the pointee level of `Pointer` and `Reference`
//! so the classifier can report per-level qualification.

use serde::{Deserialize, Serialize};

/// Index into the program's type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(pub u32);

/// Index into the program's record list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Type {
    Void,
    Bool,
    Int,
    /// The type of the null literal.
    Nullptr,
    Pointer {
        pointee: TypeId,
        pointee_const: bool,
        pointee_volatile: bool,
    },
    /// Lvalue reference. Rvalue references are treated as lvalues for
    /// proof purposes and are not distinguished here.
    Reference {
        referent: TypeId,
        referent_const: bool,
        referent_volatile: bool,
    },
    Array {
        elem: TypeId,
    },
    Function {
        ret: TypeId,
        params: Vec<TypeId>,
    },
    Record(RecordId),
}

/// A non-static data member of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeId,
}

/// A class/record declaration with the capability flags the classifier
/// inspects. The frontend computes these from the declaration; the
/// analyzer never sees method bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDecl {
    pub qualified_name: String,
    pub fields: Vec<FieldDecl>,
    #[serde(default)]
    pub has_public_default_ctor: bool,
    #[serde(default)]
    pub has_public_copy_ctor: bool,
    #[serde(default)]
    pub has_public_copy_assign: bool,
    /// Public converting constructor taking the null literal.
    #[serde(default)]
    pub has_nullptr_ctor: bool,
    /// Explicit conversion to `bool`.
    #[serde(default)]
    pub has_bool_conversion: bool,
    /// Non-member `==` and `!=` with its own type or the null literal
    /// on one side.
    #[serde(default)]
    pub has_null_equality: bool,
}

impl RecordDecl {
    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Interned type storage shared by a whole program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeTable {
    entries: Vec<Type>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a type, reusing an existing entry when possible.
    pub fn intern(&mut self, ty: Type) -> TypeId {
        if let Some(pos) = self.entries.iter().position(|t| *t == ty) {
            return TypeId(pos as u32);
        }
        self.entries.push(ty);
        TypeId(self.entries.len() as u32 - 1)
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.entries[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Shorthand constructors used by the builder and by tests.

    pub fn void(&mut self) -> TypeId {
        self.intern(Type::Void)
    }

    pub fn bool_ty(&mut self) -> TypeId {
        self.intern(Type::Bool)
    }

    pub fn int(&mut self) -> TypeId {
        self.intern(Type::Int)
    }

    pub fn nullptr_ty(&mut self) -> TypeId {
        self.intern(Type::Nullptr)
    }

    pub fn pointer(&mut self, pointee: TypeId) -> TypeId {
        self.intern(Type::Pointer {
            pointee,
            pointee_const: false,
            pointee_volatile: false,
        })
    }

    pub fn pointer_cv(&mut self, pointee: TypeId, is_const: bool, is_volatile: bool) -> TypeId {
        self.intern(Type::Pointer {
            pointee,
            pointee_const: is_const,
            pointee_volatile: is_volatile,
        })
    }

    pub fn reference(&mut self, referent: TypeId) -> TypeId {
        self.intern(Type::Reference {
            referent,
            referent_const: false,
            referent_volatile: false,
        })
    }

    pub fn reference_cv(&mut self, referent: TypeId, is_const: bool, is_volatile: bool) -> TypeId {
        self.intern(Type::Reference {
            referent,
            referent_const: is_const,
            referent_volatile: is_volatile,
        })
    }

    pub fn array(&mut self, elem: TypeId) -> TypeId {
        self.intern(Type::Array { elem })
    }

    pub fn function(&mut self, ret: TypeId, params: Vec<TypeId>) -> TypeId {
        self.intern(Type::Function { ret, params })
    }

    pub fn record(&mut self, id: RecordId) -> TypeId {
        self.intern(Type::Record(id))
    }

    /// Strip reference wrappers down to the referent type.
    pub fn strip_reference(&self, id: TypeId) -> TypeId {
        match self.get(id) {
            Type::Reference { referent, .. } => self.strip_reference(*referent),
            _ => id,
        }
    }

    /// Whether the (reference-stripped) type is a raw pointer.
    pub fn is_pointer(&self, id: TypeId) -> bool {
        matches!(self.get(self.strip_reference(id)), Type::Pointer { .. })
    }

    /// Pointee of a (reference-stripped) pointer type.
    pub fn pointee(&self, id: TypeId) -> Option<TypeId> {
        match self.get(self.strip_reference(id)) {
            Type::Pointer { pointee, .. } => Some(*pointee),
            _ => None,
        }
    }

    /// Whether `id` is a reference whose referent carries `volatile`.
    pub fn is_volatile_reference(&self, id: TypeId) -> bool {
        matches!(
            self.get(id),
            Type::Reference {
                referent_volatile: true,
                ..
            }
        )
    }

    /// Whether `id` is a reference whose referent carries `const`.
    pub fn is_const_reference(&self, id: TypeId) -> bool {
        matches!(
            self.get(id),
            Type::Reference {
                referent_const: true,
                ..
            }
        )
    }

    pub fn is_reference(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Reference { .. })
    }

    pub fn as_record(&self, id: TypeId) -> Option<RecordId> {
        match self.get(self.strip_reference(id)) {
            Type::Record(r) => Some(*r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_dedups() {
        let mut table = TypeTable::new();
        let int = table.int();
        let p1 = table.pointer(int);
        let p2 = table.pointer(int);
        assert_eq!(p1, p2);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_strip_reference() {
        let mut table = TypeTable::new();
        let int = table.int();
        let ptr = table.pointer(int);
        let r = table.reference(ptr);
        assert_eq!(table.strip_reference(r), ptr);
        assert!(table.is_pointer(r));
        assert_eq!(table.pointee(r), Some(int));
    }

    #[test]
    fn test_volatile_reference() {
        let mut table = TypeTable::new();
        let int = table.int();
        let ptr = table.pointer(int);
        let vr = table.reference_cv(ptr, false, true);
        assert!(table.is_volatile_reference(vr));
        assert!(!table.is_const_reference(vr));
    }

    #[test]
    fn test_record_field_lookup() {
        let rec = RecordDecl {
            qualified_name: "gsl::not_null".into(),
            fields: vec![FieldDecl {
                name: "ptr_".into(),
                ty: TypeId(0),
            }],
            has_public_default_ctor: false,
            has_public_copy_ctor: true,
            has_public_copy_assign: true,
            has_nullptr_ctor: false,
            has_bool_conversion: false,
            has_null_equality: false,
        };
        assert!(rec.field("ptr_").is_some());
        assert!(rec.field("other").is_none());
    }
}
