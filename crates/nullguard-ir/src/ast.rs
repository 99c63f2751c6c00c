//! Structured AST for function bodies.
//!
//! The frontend assigns every expression a unique `ExprId` and every
//! declaration a unique `DeclId`; the analyzer keys temporary regions and
//! weakening marks on them.

use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use crate::types::TypeId;

/// Frontend-assigned declaration identity (variables, parameters, globals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeclId(pub u32);

/// Frontend-assigned expression identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExprId(pub u32);

static NEXT_EXPR_ID: AtomicU32 = AtomicU32::new(1);

fn fresh_expr_id() -> ExprId {
    ExprId(NEXT_EXPR_ID.fetch_add(1, Ordering::Relaxed))
}

/// Source location span, 1-based lines and columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub file: String,
    pub line: u32,
    pub col: u32,
}

impl Span {
    pub fn new(file: impl Into<String>, line: u32, col: u32) -> Self {
        Self {
            file: file.into(),
            line,
            col,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Deref,
    AddrOf,
    Not,
    Neg,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Assign,
    AddAssign,
    SubAssign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    /// Short-circuit `&&`.
    LAnd,
    /// Short-circuit `||`.
    LOr,
}

impl BinaryOp {
    pub fn is_assignment(self) -> bool {
        matches!(self, BinaryOp::Assign | BinaryOp::AddAssign | BinaryOp::SubAssign)
    }

    pub fn is_compound_assignment(self) -> bool {
        matches!(self, BinaryOp::AddAssign | BinaryOp::SubAssign)
    }
}

/// Implicit conversions the frontend materializes in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CastKind {
    ArrayToPointerDecay,
    FunctionToPointerDecay,
    /// `gsl::not_null<T>::operator T*` — conversion from the wrapper
    /// to its inner pointer.
    WrapperToPointer,
}

/// A lambda capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capture {
    pub decl: DeclId,
    pub by_ref: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Callee {
    /// Call of a function known by (qualified) name; resolved against the
    /// program's function declarations.
    Named(String),
    /// Call through an expression (function pointer or lambda value).
    Expr(Box<Expr>),
    /// Member function call `object.name(..)` / `object->name(..)`.
    Method {
        object: Box<Expr>,
        name: String,
        is_const: bool,
        is_arrow: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub id: ExprId,
    #[serde(default)]
    pub span: Option<Span>,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    NullLit,
    IntLit(i64),
    BoolLit(bool),
    This,
    DeclRef(DeclId),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Member {
        base: Box<Expr>,
        field: String,
        is_arrow: bool,
    },
    /// Pointer-to-member access `base ->* member`.
    MemberPtr {
        base: Box<Expr>,
        member: Box<Expr>,
    },
    Call {
        callee: Callee,
        args: Vec<Expr>,
    },
    New {
        ty: TypeId,
        /// True when the selected allocator may throw; a throwing `new`
        /// never yields null.
        throwing: bool,
    },
    Cast {
        kind: CastKind,
        operand: Box<Expr>,
    },
    Lambda {
        captures: Vec<Capture>,
        body: Box<Stmt>,
    },
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            id: fresh_expr_id(),
            span: None,
            kind,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn at(self, file: &str, line: u32) -> Self {
        self.with_span(Span::new(file, line, 1))
    }

    // Constructor helpers. The frontend emits these nodes; tests build
    // them directly.

    pub fn null() -> Self {
        Self::new(ExprKind::NullLit)
    }

    pub fn int(v: i64) -> Self {
        Self::new(ExprKind::IntLit(v))
    }

    pub fn bool_lit(v: bool) -> Self {
        Self::new(ExprKind::BoolLit(v))
    }

    pub fn this() -> Self {
        Self::new(ExprKind::This)
    }

    pub fn var(decl: DeclId) -> Self {
        Self::new(ExprKind::DeclRef(decl))
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Self::new(ExprKind::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    pub fn deref(operand: Expr) -> Self {
        Self::unary(UnaryOp::Deref, operand)
    }

    pub fn addr_of(operand: Expr) -> Self {
        Self::unary(UnaryOp::AddrOf, operand)
    }

    pub fn not(operand: Expr) -> Self {
        Self::unary(UnaryOp::Not, operand)
    }

    pub fn pre_inc(operand: Expr) -> Self {
        Self::unary(UnaryOp::PreInc, operand)
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Self::new(ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    pub fn assign(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Assign, lhs, rhs)
    }

    pub fn eq(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Eq, lhs, rhs)
    }

    pub fn ne(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Ne, lhs, rhs)
    }

    pub fn land(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::LAnd, lhs, rhs)
    }

    pub fn lor(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::LOr, lhs, rhs)
    }

    pub fn add(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Add, lhs, rhs)
    }

    pub fn conditional(cond: Expr, then_expr: Expr, else_expr: Expr) -> Self {
        Self::new(ExprKind::Conditional {
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        })
    }

    pub fn member(base: Expr, field: impl Into<String>) -> Self {
        Self::new(ExprKind::Member {
            base: Box::new(base),
            field: field.into(),
            is_arrow: false,
        })
    }

    pub fn arrow(base: Expr, field: impl Into<String>) -> Self {
        Self::new(ExprKind::Member {
            base: Box::new(base),
            field: field.into(),
            is_arrow: true,
        })
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::Call {
            callee: Callee::Named(name.into()),
            args,
        })
    }

    pub fn call_expr(callee: Expr, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::Call {
            callee: Callee::Expr(Box::new(callee)),
            args,
        })
    }

    pub fn method(object: Expr, name: impl Into<String>, is_const: bool, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::Call {
            callee: Callee::Method {
                object: Box::new(object),
                name: name.into(),
                is_const,
                is_arrow: false,
            },
            args,
        })
    }

    pub fn new_expr(ty: TypeId) -> Self {
        Self::new(ExprKind::New { ty, throwing: true })
    }

    pub fn new_noexcept(ty: TypeId) -> Self {
        Self::new(ExprKind::New {
            ty,
            throwing: false,
        })
    }

    pub fn cast(kind: CastKind, operand: Expr) -> Self {
        Self::new(ExprKind::Cast {
            kind,
            operand: Box::new(operand),
        })
    }

    pub fn lambda(captures: Vec<Capture>, body: Stmt) -> Self {
        Self::new(ExprKind::Lambda {
            captures,
            body: Box::new(body),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDecl {
    pub decl: DeclId,
    pub name: String,
    pub ty: TypeId,
    #[serde(default)]
    pub init: Option<Expr>,
    #[serde(default)]
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    /// `None` marks the default case.
    pub label: Option<i64>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    #[serde(default)]
    pub span: Option<Span>,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    Compound(Vec<Stmt>),
    Decl(VarDecl),
    Expr(Expr),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    /// Cases fall through unless a `Break` ends them.
    Switch {
        cond: Expr,
        cases: Vec<SwitchCase>,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    Assert(Expr),
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Self { span: None, kind }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn block(stmts: Vec<Stmt>) -> Self {
        Self::new(StmtKind::Compound(stmts))
    }

    pub fn decl(decl: DeclId, name: impl Into<String>, ty: TypeId, init: Option<Expr>) -> Self {
        Self::new(StmtKind::Decl(VarDecl {
            decl,
            name: name.into(),
            ty,
            init,
            is_static: false,
        }))
    }

    pub fn expr(e: Expr) -> Self {
        Self::new(StmtKind::Expr(e))
    }

    pub fn if_(cond: Expr, then_branch: Stmt) -> Self {
        Self::new(StmtKind::If {
            cond,
            then_branch: Box::new(then_branch),
            else_branch: None,
        })
    }

    pub fn if_else(cond: Expr, then_branch: Stmt, else_branch: Stmt) -> Self {
        Self::new(StmtKind::If {
            cond,
            then_branch: Box::new(then_branch),
            else_branch: Some(Box::new(else_branch)),
        })
    }

    pub fn while_(cond: Expr, body: Stmt) -> Self {
        Self::new(StmtKind::While {
            cond,
            body: Box::new(body),
        })
    }

    pub fn do_while(body: Stmt, cond: Expr) -> Self {
        Self::new(StmtKind::DoWhile {
            body: Box::new(body),
            cond,
        })
    }

    pub fn for_(init: Option<Stmt>, cond: Option<Expr>, step: Option<Expr>, body: Stmt) -> Self {
        Self::new(StmtKind::For {
            init: init.map(Box::new),
            cond,
            step,
            body: Box::new(body),
        })
    }

    pub fn switch(cond: Expr, cases: Vec<SwitchCase>) -> Self {
        Self::new(StmtKind::Switch { cond, cases })
    }

    pub fn ret(e: Expr) -> Self {
        Self::new(StmtKind::Return(Some(e)))
    }

    pub fn ret_void() -> Self {
        Self::new(StmtKind::Return(None))
    }

    pub fn brk() -> Self {
        Self::new(StmtKind::Break)
    }

    pub fn cont() -> Self {
        Self::new(StmtKind::Continue)
    }

    pub fn assert(cond: Expr) -> Self {
        Self::new(StmtKind::Assert(cond))
    }
}
