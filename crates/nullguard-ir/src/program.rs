//! Whole-program container and JSON loading.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::{DeclId, Span, Stmt};
use crate::types::{RecordDecl, RecordId, TypeId, TypeTable};

#[derive(Debug, Error)]
pub enum IrError {
    #[error("failed to parse program JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("program references unknown function `{0}`")]
    UnknownFunction(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub decl: DeclId,
    pub name: String,
    pub ty: TypeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<ParamDecl>,
    pub ret: TypeId,
    /// `None` for external declarations; the analyzer treats calls to
    /// them as opaque.
    #[serde(default)]
    pub body: Option<Stmt>,
    #[serde(default)]
    pub is_method: bool,
    #[serde(default)]
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalDecl {
    pub decl: DeclId,
    pub name: String,
    pub ty: TypeId,
    #[serde(default)]
    pub is_const: bool,
    #[serde(default)]
    pub span: Option<Span>,
}

/// A complete translation unit as handed over by the frontend bridge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub types: TypeTable,
    pub records: Vec<RecordDecl>,
    pub functions: Vec<FunctionDecl>,
    pub globals: Vec<GlobalDecl>,
}

impl Program {
    pub fn from_json(data: &str) -> Result<Self, IrError> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn to_json(&self) -> Result<String, IrError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDecl> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn global(&self, decl: DeclId) -> Option<&GlobalDecl> {
        self.globals.iter().find(|g| g.decl == decl)
    }

    pub fn record(&self, id: RecordId) -> Option<&RecordDecl> {
        self.records.get(id.0 as usize)
    }

    /// Functions that have a body and therefore get analyzed.
    pub fn defined_functions(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.functions.iter().filter(|f| f.body.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, Stmt};

    #[test]
    fn test_program_json_roundtrip() {
        let mut types = TypeTable::new();
        let int = types.int();
        let ptr = types.pointer(int);
        let program = Program {
            types,
            records: vec![],
            functions: vec![FunctionDecl {
                name: "f".into(),
                params: vec![ParamDecl {
                    decl: DeclId(1),
                    name: "p".into(),
                    ty: ptr,
                }],
                ret: int,
                body: Some(Stmt::ret(Expr::int(0))),
                is_method: false,
                span: None,
            }],
            globals: vec![],
        };
        let json = program.to_json().unwrap();
        let back = Program::from_json(&json).unwrap();
        assert_eq!(program, back);
        assert!(back.function("f").is_some());
        assert!(back.function("g").is_none());
    }

    #[test]
    fn test_defined_functions_skips_externals() {
        let mut types = TypeTable::new();
        let void = types.void();
        let program = Program {
            types,
            records: vec![],
            functions: vec![
                FunctionDecl {
                    name: "external".into(),
                    params: vec![],
                    ret: void,
                    body: None,
                    is_method: false,
                    span: None,
                },
                FunctionDecl {
                    name: "defined".into(),
                    params: vec![],
                    ret: void,
                    body: Some(Stmt::block(vec![])),
                    is_method: false,
                    span: None,
                },
            ],
            globals: vec![],
        };
        let names: Vec<_> = program.defined_functions().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["defined"]);
    }
}
