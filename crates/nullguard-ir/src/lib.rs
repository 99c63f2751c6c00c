//! NullGuard IR — program representation for null-safety analysis.
//!
//! These types mirror the JSON schema produced by the frontend bridge:
//! a type table, record declarations, and a structured AST per function.
//! Parsing and semantic analysis of the source language happen outside
//! this workspace; the analyzer only ever sees this representation.

pub mod ast;
pub mod builder;
pub mod program;
pub mod types;

pub use ast::{
    BinaryOp, Callee, Capture, CastKind, DeclId, Expr, ExprId, ExprKind, Span, Stmt, StmtKind,
    SwitchCase, UnaryOp, VarDecl,
};
pub use builder::{FunctionBuilder, ProgramBuilder};
pub use program::{FunctionDecl, GlobalDecl, IrError, ParamDecl, Program};
pub use types::{FieldDecl, RecordDecl, RecordId, Type, TypeId, TypeTable};
