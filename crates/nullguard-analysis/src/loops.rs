//! Mods analysis over loop bodies.
//!
//! Classifies how each lvalue is modified by one loop iteration, so the
//! back-edge can weaken bindings: `Safe` modifications keep a prior null
//! constraint across the back-edge, `Unsafe` ones lose it. A
//! `ConditionalSafe` classification depends on other lvalues' kinds and is
//! resolved by a depth-first pass; cycles on the traversal path resolve to
//! `Safe`, consistent with a fixed point where the loop preserves any
//! invariant surviving one iteration.

use nullguard_ir::{Callee, CastKind, DeclId, Expr, ExprKind, Program, Stmt, StmtKind, UnaryOp};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::escape::{classify_escape, EscapeKind};
use crate::models;
use crate::state::{Weakening, WeakenMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModKind {
    /// Not modified; no weakening.
    None,
    /// Modified in a way that preserves a prior proof (self-referential
    /// update, assignment from a safe expression, compound assignment).
    Safe,
    /// Modified by a general call or from unsafe values; maximum
    /// weakening.
    Unsafe,
    /// Depends on other lvalues' kinds; resolved after the walk.
    ConditionalSafe,
}

/// Value info produced while walking an expression: which declarations
/// the value depends on, and whether anything inherently unsafe (a call
/// result, a read through a pointer) feeds it.
#[derive(Debug, Default, Clone)]
struct RhsInfo {
    deps: FxHashSet<DeclId>,
    unsafe_dep: bool,
}

impl RhsInfo {
    fn merge(mut self, other: RhsInfo) -> RhsInfo {
        self.deps.extend(other.deps);
        self.unsafe_dep |= other.unsafe_dep;
        self
    }

    fn cleared(mut self) -> RhsInfo {
        self.deps.clear();
        self.unsafe_dep = false;
        self
    }
}

struct ModsVisitor<'a> {
    program: &'a Program,
    decl_is_pointer: &'a dyn Fn(DeclId) -> bool,
    marks: FxHashMap<DeclId, ModKind>,
    deps: FxHashMap<DeclId, FxHashSet<DeclId>>,
    declared_in_body: FxHashSet<DeclId>,
}

impl<'a> ModsVisitor<'a> {
    fn new(program: &'a Program, decl_is_pointer: &'a dyn Fn(DeclId) -> bool) -> Self {
        Self {
            program,
            decl_is_pointer,
            marks: FxHashMap::default(),
            deps: FxHashMap::default(),
            declared_in_body: FxHashSet::default(),
        }
    }

    fn mark(&mut self, decl: DeclId, kind: ModKind) {
        let entry = self.marks.entry(decl).or_insert(ModKind::None);
        // Unsafe wins over everything; a Safe mark never downgrades one.
        *entry = match (*entry, kind) {
            (ModKind::Unsafe, _) | (_, ModKind::Unsafe) => ModKind::Unsafe,
            (ModKind::ConditionalSafe, _) | (_, ModKind::ConditionalSafe) => {
                ModKind::ConditionalSafe
            }
            (ModKind::Safe, _) | (_, ModKind::Safe) => ModKind::Safe,
            _ => ModKind::None,
        };
    }

    /// The declaration a simple lvalue expression names, if any.
    fn lvalue_decl(expr: &Expr) -> Option<DeclId> {
        match &expr.kind {
            ExprKind::DeclRef(d) => Some(*d),
            _ => None,
        }
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Compound(stmts) => {
                for s in stmts {
                    self.visit_stmt(s);
                }
            }
            StmtKind::Decl(var) => {
                self.declared_in_body.insert(var.decl);
                if let Some(init) = &var.init {
                    let info = self.visit_expr(init);
                    self.record_assignment(var.decl, info, false);
                }
            }
            StmtKind::Expr(e) | StmtKind::Assert(e) => {
                self.visit_expr(e);
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.visit_expr(cond);
                self.visit_stmt(then_branch);
                if let Some(e) = else_branch {
                    self.visit_stmt(e);
                }
            }
            StmtKind::While { cond, body } => {
                self.visit_expr(cond);
                self.visit_stmt(body);
            }
            StmtKind::DoWhile { body, cond } => {
                self.visit_stmt(body);
                self.visit_expr(cond);
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                if let Some(s) = init {
                    self.visit_stmt(s);
                }
                if let Some(c) = cond {
                    self.visit_expr(c);
                }
                if let Some(s) = step {
                    self.visit_expr(s);
                }
                self.visit_stmt(body);
            }
            StmtKind::Switch { cond, cases } => {
                self.visit_expr(cond);
                for case in cases {
                    for s in &case.body {
                        self.visit_stmt(s);
                    }
                }
            }
            StmtKind::Return(Some(e)) => {
                self.visit_expr(e);
            }
            StmtKind::Return(None) | StmtKind::Break | StmtKind::Continue => {}
        }
    }

    fn record_assignment(&mut self, decl: DeclId, rhs: RhsInfo, is_compound: bool) {
        if !(self.decl_is_pointer)(decl) {
            self.mark(decl, ModKind::Safe);
            return;
        }
        if is_compound {
            self.mark(decl, ModKind::Safe);
            return;
        }
        if rhs.unsafe_dep {
            self.mark(decl, ModKind::Unsafe);
            return;
        }
        let mut deps = rhs.deps;
        deps.remove(&decl);
        if deps.is_empty() {
            // null-safe rvalues and self-referential updates (p = p + k)
            self.mark(decl, ModKind::Safe);
            return;
        }
        self.mark(decl, ModKind::ConditionalSafe);
        self.deps.entry(decl).or_default().extend(deps);
    }

    fn visit_expr(&mut self, expr: &Expr) -> RhsInfo {
        match &expr.kind {
            ExprKind::NullLit
            | ExprKind::IntLit(_)
            | ExprKind::BoolLit(_)
            | ExprKind::This
            | ExprKind::New { .. } => RhsInfo::default(),
            ExprKind::DeclRef(d) => RhsInfo {
                deps: std::iter::once(*d).collect(),
                unsafe_dep: false,
            },
            ExprKind::Unary { op, operand } => {
                let sub = self.visit_expr(operand);
                match op {
                    // null-safety of &x does not depend on x
                    UnaryOp::AddrOf => sub.cleared(),
                    // a read through a pointer sees memory this pass does
                    // not track
                    UnaryOp::Deref => RhsInfo {
                        deps: sub.deps,
                        unsafe_dep: true,
                    },
                    UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => {
                        if let Some(d) = Self::lvalue_decl(operand) {
                            self.mark(d, ModKind::Safe);
                        }
                        sub
                    }
                    UnaryOp::Not | UnaryOp::Neg => sub,
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                if op.is_assignment() {
                    let rhs_info = self.visit_expr(rhs);
                    if let Some(d) = Self::lvalue_decl(lhs) {
                        self.record_assignment(d, rhs_info, op.is_compound_assignment());
                        RhsInfo {
                            deps: std::iter::once(d).collect(),
                            unsafe_dep: false,
                        }
                    } else {
                        // store through a deref or member; nothing at decl
                        // granularity to mark
                        self.visit_expr(lhs).merge(rhs_info)
                    }
                } else {
                    let l = self.visit_expr(lhs);
                    let r = self.visit_expr(rhs);
                    l.merge(r)
                }
            }
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                let c = self.visit_expr(cond);
                let t = self.visit_expr(then_expr);
                let e = self.visit_expr(else_expr);
                c.merge(t).merge(e)
            }
            ExprKind::Member { base, .. } => self.visit_expr(base),
            ExprKind::MemberPtr { base, member } => {
                let b = self.visit_expr(base);
                let m = self.visit_expr(member);
                b.merge(m)
            }
            ExprKind::Call { callee, args } => self.visit_call(callee, args),
            ExprKind::Cast { kind, operand } => {
                let sub = self.visit_expr(operand);
                match kind {
                    // decayed values and wrapper reads are never null;
                    // their safety does not depend on the operand
                    CastKind::ArrayToPointerDecay
                    | CastKind::FunctionToPointerDecay
                    | CastKind::WrapperToPointer => sub.cleared(),
                }
            }
            ExprKind::Lambda { body, .. } => {
                // the closure may run within the loop
                self.visit_stmt(body);
                RhsInfo::default()
            }
        }
    }

    fn visit_call(&mut self, callee: &Callee, args: &[Expr]) -> RhsInfo {
        match callee {
            Callee::Named(name) if models::is_modeled(name) => {
                // forwarding helpers are identity: no invalidation
                let mut info = RhsInfo::default();
                for a in args {
                    info = info.merge(self.visit_expr(a));
                }
                return info;
            }
            Callee::Named(name) => {
                let sig = self.program.function(name);
                for (i, arg) in args.iter().enumerate() {
                    self.visit_expr(arg);
                    let param_ty = sig.and_then(|f| f.params.get(i)).map(|p| p.ty);
                    self.mark_arg_if_mutable(arg, param_ty);
                }
            }
            Callee::Expr(e) => {
                self.visit_expr(e);
                for arg in args {
                    self.visit_expr(arg);
                    self.mark_arg_if_mutable(arg, None);
                }
            }
            Callee::Method {
                object,
                is_const,
                ..
            } => {
                self.visit_expr(object);
                if !is_const {
                    if let Some(d) = Self::lvalue_decl(object) {
                        self.mark(d, ModKind::Unsafe);
                    }
                }
                for arg in args {
                    self.visit_expr(arg);
                    self.mark_arg_if_mutable(arg, None);
                }
            }
        }
        // a general call's result is not trackable here
        RhsInfo {
            deps: FxHashSet::default(),
            unsafe_dep: true,
        }
    }

    /// Mark declarations an argument exposes for mutation by the callee.
    fn mark_arg_if_mutable(&mut self, arg: &Expr, param_ty: Option<nullguard_ir::TypeId>) {
        let mutable = match param_ty {
            Some(ty) => !matches!(
                classify_escape(self.program, ty),
                EscapeKind::NonEscape
                    | EscapeKind::AddressEscape { is_const: true, .. }
                    | EscapeKind::ReferenceEscape { is_const: true, .. }
            ),
            // unknown signature: assume the worst
            None => true,
        };
        if !mutable {
            return;
        }
        match &arg.kind {
            ExprKind::Unary {
                op: UnaryOp::AddrOf,
                operand,
            } => {
                if let Some(d) = Self::lvalue_decl(operand) {
                    self.mark(d, ModKind::Unsafe);
                }
            }
            ExprKind::DeclRef(d) => {
                // by-reference parameter, or unknown signature on a
                // pointer argument
                if param_ty.is_some() || (self.decl_is_pointer)(*d) {
                    self.mark(*d, ModKind::Unsafe);
                }
            }
            _ => {}
        }
    }

    /// Resolve every `ConditionalSafe` mark; cycles on the current
    /// traversal path resolve to `Safe`.
    fn resolve(&mut self, not_null_at_entry: &dyn Fn(DeclId) -> bool) {
        let decls: Vec<DeclId> = self.marks.keys().copied().collect();
        for d in decls {
            let mut stack = Vec::new();
            self.resolve_one(d, &mut stack, not_null_at_entry);
        }
    }

    fn resolve_one(
        &mut self,
        decl: DeclId,
        stack: &mut Vec<DeclId>,
        not_null_at_entry: &dyn Fn(DeclId) -> bool,
    ) -> ModKind {
        let mark = self.marks.get(&decl).copied().unwrap_or(ModKind::None);
        if mark != ModKind::ConditionalSafe {
            return mark;
        }
        if stack.contains(&decl) {
            // mutual dependency: anything surviving one iteration is an
            // invariant of the loop
            self.marks.insert(decl, ModKind::Safe);
            return ModKind::Safe;
        }

        stack.push(decl);
        let deps: Vec<DeclId> = self
            .deps
            .get(&decl)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        let mut resolved = ModKind::Safe;
        for dep in deps {
            let dep_kind = self.resolve_one(dep, stack, not_null_at_entry);
            match dep_kind {
                ModKind::Unsafe => {
                    resolved = ModKind::Unsafe;
                    break;
                }
                ModKind::Safe => {}
                ModKind::None => {
                    if !not_null_at_entry(dep) {
                        resolved = ModKind::Unsafe;
                        break;
                    }
                }
                ModKind::ConditionalSafe => unreachable!("dependency left unresolved"),
            }
        }
        stack.pop();
        self.marks.insert(decl, resolved);
        resolved
    }
}

/// Compute the weaken map for one loop: which modified lvalues get
/// invariant weakening (constraint carried across the back-edge) and
/// which get killed outright.
pub fn weaken_map_for_loop(
    program: &Program,
    body: &Stmt,
    step: Option<&Expr>,
    decl_is_pointer: &dyn Fn(DeclId) -> bool,
    not_null_at_entry: &dyn Fn(DeclId) -> bool,
) -> WeakenMap {
    let mut visitor = ModsVisitor::new(program, decl_is_pointer);
    visitor.visit_stmt(body);
    if let Some(step) = step {
        visitor.visit_expr(step);
    }
    visitor.resolve(not_null_at_entry);

    let mut map = WeakenMap::default();
    for (decl, kind) in &visitor.marks {
        if visitor.declared_in_body.contains(decl) {
            continue;
        }
        let weakening = match kind {
            ModKind::Safe => Weakening::Invariant,
            ModKind::Unsafe => Weakening::Variant,
            ModKind::None => continue,
            ModKind::ConditionalSafe => unreachable!("unresolved mod kind"),
        };
        map = map.insert(*decl, weakening);
    }
    map
}
