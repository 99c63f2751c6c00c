//! Convenience builders for assembling programs in memory.
//!
//! The frontend bridge emits `Program` JSON directly; these builders exist
//! for tests and for embedding the analyzer without a bridge.

use crate::ast::{DeclId, Stmt};
use crate::program::{FunctionDecl, GlobalDecl, ParamDecl, Program};
use crate::types::{FieldDecl, RecordDecl, RecordId, TypeId, TypeTable};

#[derive(Debug, Default)]
pub struct ProgramBuilder {
    pub types: TypeTable,
    records: Vec<RecordDecl>,
    functions: Vec<FunctionDecl>,
    globals: Vec<GlobalDecl>,
    next_decl: u32,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self {
            next_decl: 1,
            ..Self::default()
        }
    }

    pub fn fresh_decl(&mut self) -> DeclId {
        let id = DeclId(self.next_decl);
        self.next_decl += 1;
        id
    }

    pub fn add_record(&mut self, record: RecordDecl) -> RecordId {
        self.records.push(record);
        RecordId(self.records.len() as u32 - 1)
    }

    /// Declare the `gsl::not_null` wrapper over the given pointer type.
    pub fn not_null_record(&mut self, inner_ptr: TypeId) -> RecordId {
        self.add_record(RecordDecl {
            qualified_name: "gsl::not_null".into(),
            fields: vec![FieldDecl {
                name: "ptr_".into(),
                ty: inner_ptr,
            }],
            has_public_default_ctor: false,
            has_public_copy_ctor: true,
            has_public_copy_assign: true,
            has_nullptr_ctor: false,
            has_bool_conversion: false,
            has_null_equality: false,
        })
    }

    /// Declare a pointer-like nullable class (smart-pointer shape).
    pub fn nullable_object_record(&mut self, name: &str, inner_ptr: TypeId) -> RecordId {
        self.add_record(RecordDecl {
            qualified_name: name.into(),
            fields: vec![FieldDecl {
                name: "ptr_".into(),
                ty: inner_ptr,
            }],
            has_public_default_ctor: true,
            has_public_copy_ctor: true,
            has_public_copy_assign: true,
            has_nullptr_ctor: true,
            has_bool_conversion: true,
            has_null_equality: true,
        })
    }

    pub fn add_global(&mut self, name: &str, ty: TypeId, is_const: bool) -> DeclId {
        let decl = self.fresh_decl();
        self.globals.push(GlobalDecl {
            decl,
            name: name.into(),
            ty,
            is_const,
            span: None,
        });
        decl
    }

    /// Declare an external function (no body); calls to it are opaque.
    pub fn declare_extern(&mut self, name: &str, params: Vec<TypeId>, ret: TypeId) {
        let params = params
            .into_iter()
            .enumerate()
            .map(|(i, ty)| ParamDecl {
                decl: self.fresh_decl(),
                name: format!("a{i}"),
                ty,
            })
            .collect();
        self.functions.push(FunctionDecl {
            name: name.into(),
            params,
            ret,
            body: None,
            is_method: false,
            span: None,
        });
    }

    pub fn function(&mut self, name: &str) -> FunctionBuilder<'_> {
        FunctionBuilder {
            program: self,
            name: name.into(),
            params: Vec::new(),
            ret: None,
            is_method: false,
        }
    }

    pub fn finish(self) -> Program {
        Program {
            types: self.types,
            records: self.records,
            functions: self.functions,
            globals: self.globals,
        }
    }
}

pub struct FunctionBuilder<'a> {
    program: &'a mut ProgramBuilder,
    name: String,
    params: Vec<ParamDecl>,
    ret: Option<TypeId>,
    is_method: bool,
}

impl FunctionBuilder<'_> {
    pub fn param(&mut self, name: &str, ty: TypeId) -> DeclId {
        let decl = self.program.fresh_decl();
        self.params.push(ParamDecl {
            decl,
            name: name.into(),
            ty,
        });
        decl
    }

    pub fn returns(mut self, ty: TypeId) -> Self {
        self.ret = Some(ty);
        self
    }

    pub fn method(mut self) -> Self {
        self.is_method = true;
        self
    }

    pub fn body(self, body: Stmt) {
        let ret = match self.ret {
            Some(t) => t,
            None => self.program.types.void(),
        };
        self.program.functions.push(FunctionDecl {
            name: self.name,
            params: self.params,
            ret,
            body: Some(body),
            is_method: self.is_method,
            span: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;

    #[test]
    fn test_build_simple_function() {
        let mut b = ProgramBuilder::new();
        let int = b.types.int();
        let ptr = b.types.pointer(int);
        let mut f = b.function("deref_param").returns(int);
        let p = f.param("p", ptr);
        f.body(Stmt::ret(Expr::deref(Expr::var(p))));

        let program = b.finish();
        let f = program.function("deref_param").unwrap();
        assert_eq!(f.params.len(), 1);
        assert!(f.body.is_some());
        assert_eq!(f.params[0].decl, p);
    }

    #[test]
    fn test_decl_ids_do_not_collide() {
        let mut b = ProgramBuilder::new();
        let int = b.types.int();
        let ptr = b.types.pointer(int);
        let g = b.add_global("gp", ptr, false);
        let mut f = b.function("f").returns(int);
        let p = f.param("p", ptr);
        f.body(Stmt::ret(Expr::int(0)));
        assert_ne!(g, p);
    }

    #[test]
    fn test_not_null_record_shape() {
        let mut b = ProgramBuilder::new();
        let int = b.types.int();
        let ptr = b.types.pointer(int);
        let rec = b.not_null_record(ptr);
        let program = b.finish();
        let r = program.record(rec).unwrap();
        assert_eq!(r.qualified_name, "gsl::not_null");
        assert!(r.field("ptr_").is_some());
        assert!(!r.has_nullptr_ctor);
    }
}
