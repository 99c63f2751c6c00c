//! The proof engine and program-point driver.
//!
//! A path-sensitive walk over each function body. Every branch with an
//! unknown condition forks the persistent state; loops are explored for
//! one concrete iteration, then weakened at the back-edge and re-checked
//! once against the widened store. Dereferences of values that are not
//! proven non-null on the current path report and sink that path.

use nullguard_diagnostics::{diagnostic, Diagnostic};
use nullguard_ir::{
    BinaryOp, Callee, Capture, CastKind, DeclId, Expr, ExprKind, FunctionDecl, Program, Span,
    Stmt, StmtKind, SwitchCase, Type, TypeId, UnaryOp, VarDecl,
};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::alias;
use crate::classify::{classify, TypeCategory};
use crate::escape::{self, classify_escape, EscapeKind, EscapeOutcome};
use crate::loops;
use crate::models::{self, CallModel};
use crate::rules;
use crate::state::{
    ConstraintValidity, EscapeRecord, NullableKind, ObjKey, ProofEvents, State, Weakening,
};
use crate::value::{GlobalSpace, NullConstraint, Region, SVal, SymbolId};

#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Bound on explored states per function; exhaustion stops exploring
    /// further successors and reports nothing for unreached points.
    pub max_path_nodes: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            max_path_nodes: 8192,
        }
    }
}

/// Entry points for running the analysis.
pub struct Analyzer;

impl Analyzer {
    pub fn analyze(program: &Program) -> Vec<Diagnostic> {
        Self::analyze_with_options(program, &AnalysisOptions::default())
    }

    pub fn analyze_with_options(program: &Program, options: &AnalysisOptions) -> Vec<Diagnostic> {
        let mut all = Vec::new();
        for func in program.defined_functions() {
            all.extend(Self::analyze_function(program, func, options));
        }
        diagnostic::sort_deterministic(&mut all);
        all
    }

    pub fn analyze_function(
        program: &Program,
        func: &FunctionDecl,
        options: &AnalysisOptions,
    ) -> Vec<Diagnostic> {
        let Some(body) = &func.body else {
            return Vec::new();
        };
        let mut engine = Engine::new(program, func, options);
        let state = engine.begin_function(State::new());
        let _ = engine.exec_stmt(state, body);
        if engine.budget_hit {
            tracing::warn!(func = %func.name, "path budget exhausted; analysis is partial");
        }
        let mut diags = diagnostic::dedup_by_site(engine.diags);
        diagnostic::sort_deterministic(&mut diags);
        diags
    }
}

/// One control-flow outcome of executing a statement on one path.
enum Outcome {
    Next(State),
    Return(State),
    Break(State),
    Continue(State),
}

/// What an opaque call's result looks like.
enum ConjuredReturn {
    Plain(SVal),
    Wrapper(SVal),
}

type EvalStates = Vec<(State, SVal)>;
type LvalStates = Vec<(State, Region)>;

struct Engine<'a> {
    program: &'a Program,
    func: &'a FunctionDecl,
    options: &'a AnalysisOptions,
    diags: Vec<Diagnostic>,
    next_symbol: u32,
    nodes: usize,
    budget_hit: bool,

    decl_types: FxHashMap<DeclId, TypeId>,
    decl_names: FxHashMap<DeclId, String>,
    globals: FxHashMap<DeclId, bool>,
    params: FxHashSet<DeclId>,
    /// Lambda captures and bodies by the lambda expression's id.
    lambdas: FxHashMap<u32, (&'a [Capture], &'a Stmt)>,
    /// By-value capture snapshot regions, active while a lambda body runs.
    capture_overrides: FxHashMap<DeclId, Region>,
    /// Where call-result symbols were conjured, for origin notes.
    sym_origins: FxHashMap<SymbolId, (Span, String)>,
    this_region: Option<Region>,
}

impl<'a> Engine<'a> {
    fn new(program: &'a Program, func: &'a FunctionDecl, options: &'a AnalysisOptions) -> Self {
        let mut engine = Self {
            program,
            func,
            options,
            diags: Vec::new(),
            next_symbol: 1,
            nodes: 0,
            budget_hit: false,
            decl_types: FxHashMap::default(),
            decl_names: FxHashMap::default(),
            globals: FxHashMap::default(),
            params: FxHashSet::default(),
            lambdas: FxHashMap::default(),
            capture_overrides: FxHashMap::default(),
            sym_origins: FxHashMap::default(),
            this_region: None,
        };
        for g in &program.globals {
            engine.decl_types.insert(g.decl, g.ty);
            engine.decl_names.insert(g.decl, g.name.clone());
            engine.globals.insert(g.decl, g.is_const);
        }
        for p in &func.params {
            engine.decl_types.insert(p.decl, p.ty);
            engine.decl_names.insert(p.decl, p.name.clone());
            engine.params.insert(p.decl);
        }
        if let Some(body) = &func.body {
            engine.prescan_stmt(body);
        }
        engine
    }

    /// Index declarations and lambda bodies before execution.
    fn prescan_stmt(&mut self, stmt: &'a Stmt) {
        match &stmt.kind {
            StmtKind::Compound(stmts) => stmts.iter().for_each(|s| self.prescan_stmt(s)),
            StmtKind::Decl(var) => {
                self.decl_types.insert(var.decl, var.ty);
                self.decl_names.insert(var.decl, var.name.clone());
                if let Some(init) = &var.init {
                    self.prescan_expr(init);
                }
            }
            StmtKind::Expr(e) | StmtKind::Assert(e) | StmtKind::Return(Some(e)) => {
                self.prescan_expr(e)
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.prescan_expr(cond);
                self.prescan_stmt(then_branch);
                if let Some(e) = else_branch {
                    self.prescan_stmt(e);
                }
            }
            StmtKind::While { cond, body } => {
                self.prescan_expr(cond);
                self.prescan_stmt(body);
            }
            StmtKind::DoWhile { body, cond } => {
                self.prescan_stmt(body);
                self.prescan_expr(cond);
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                if let Some(s) = init {
                    self.prescan_stmt(s);
                }
                if let Some(c) = cond {
                    self.prescan_expr(c);
                }
                if let Some(s) = step {
                    self.prescan_expr(s);
                }
                self.prescan_stmt(body);
            }
            StmtKind::Switch { cond, cases } => {
                self.prescan_expr(cond);
                for case in cases {
                    case.body.iter().for_each(|s| self.prescan_stmt(s));
                }
            }
            StmtKind::Return(None) | StmtKind::Break | StmtKind::Continue => {}
        }
    }

    fn prescan_expr(&mut self, expr: &'a Expr) {
        match &expr.kind {
            ExprKind::Lambda { captures, body } => {
                self.lambdas
                    .insert(expr.id.0, (captures.as_slice(), body.as_ref()));
                self.prescan_stmt(body);
            }
            ExprKind::Unary { operand, .. } | ExprKind::Cast { operand, .. } => {
                self.prescan_expr(operand)
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.prescan_expr(lhs);
                self.prescan_expr(rhs);
            }
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                self.prescan_expr(cond);
                self.prescan_expr(then_expr);
                self.prescan_expr(else_expr);
            }
            ExprKind::Member { base, .. } => self.prescan_expr(base),
            ExprKind::MemberPtr { base, member } => {
                self.prescan_expr(base);
                self.prescan_expr(member);
            }
            ExprKind::Call { callee, args } => {
                match callee {
                    Callee::Expr(e) => self.prescan_expr(e),
                    Callee::Method { object, .. } => self.prescan_expr(object),
                    Callee::Named(_) => {}
                }
                args.iter().for_each(|a| self.prescan_expr(a));
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Symbols, regions, budget
    // ------------------------------------------------------------------

    fn fresh_symbol(&mut self, origin: Option<Region>) -> SVal {
        let id = SymbolId(self.next_symbol);
        self.next_symbol += 1;
        match origin {
            Some(r) => SVal::sym_for(id, r),
            None => SVal::sym(id),
        }
    }

    /// Charge one explored state against the budget.
    fn charge(&mut self) -> bool {
        self.nodes += 1;
        if self.nodes > self.options.max_path_nodes {
            self.budget_hit = true;
            return false;
        }
        true
    }

    fn decl_name(&self, decl: DeclId) -> String {
        self.decl_names
            .get(&decl)
            .cloned()
            .unwrap_or_else(|| format!("decl#{}", decl.0))
    }

    fn decl_type(&self, decl: DeclId) -> Option<TypeId> {
        self.decl_types.get(&decl).copied()
    }

    fn decl_region(&self, decl: DeclId) -> Region {
        if let Some(region) = self.capture_overrides.get(&decl) {
            return region.clone();
        }
        if let Some(is_const) = self.globals.get(&decl) {
            let space = if *is_const {
                GlobalSpace::Immutable
            } else {
                GlobalSpace::Internal
            };
            return Region::Global { decl, space };
        }
        if self.params.contains(&decl) {
            return Region::StackArg { decl };
        }
        Region::StackLocal { decl }
    }

    fn category_of(&self, ty: TypeId) -> TypeCategory {
        classify(self.program, ty)
    }

    fn is_pointer_decl(&self, decl: DeclId) -> bool {
        self.decl_type(decl)
            .map(|ty| matches!(self.category_of(ty), TypeCategory::RawPointer { .. }))
            .unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // BeginFunction
    // ------------------------------------------------------------------

    /// Seed parameter regions for the analyzed (top) frame.
    fn begin_function(&mut self, state: State) -> State {
        let mut state = state;
        if self.func.is_method {
            let this = self.fresh_symbol(None);
            let region = Region::Symbolic(this.as_symbol().expect("fresh symbol"));
            self.this_region = Some(region);
        }
        let params = self.func.params.clone();
        for p in &params {
            state = self.seed_param(state, p.decl, p.ty);
        }
        state
    }

    fn seed_param(&mut self, state: State, decl: DeclId, ty: TypeId) -> State {
        let region = self.decl_region(decl);
        let func_span = self.func.span.clone();
        match self.program.types.get(ty).clone() {
            Type::Reference {
                referent,
                referent_volatile,
                ..
            } => {
                // the referent lives in caller storage
                let sym = self.fresh_symbol(None);
                let referent_region = Region::Symbolic(sym.as_symbol().expect("fresh symbol"));
                let mut state = state.bind(region, SVal::loc(referent_region.clone()));
                match self.category_of(referent) {
                    TypeCategory::RawPointer { .. } => {
                        if referent_volatile {
                            state = state.set_nullability(
                                referent_region.clone(),
                                NullableKind::VolatileNullable,
                            );
                        }
                        state = state.record_origin(
                            referent_region,
                            func_span,
                            "declared as nullable pointer here",
                        );
                    }
                    TypeCategory::NonNullableWrapper { .. } => {
                        state = state.set_nullability(referent_region, NullableKind::NonNullable);
                    }
                    _ => {}
                }
                state
            }
            _ => match self.category_of(ty) {
                TypeCategory::RawPointer { .. } => {
                    state.record_origin(region, func_span, "declared as nullable pointer here")
                }
                TypeCategory::NonNullableWrapper { .. } => {
                    let state = state.set_nullability(region.clone(), NullableKind::NonNullable);
                    let inner = region.field("ptr_");
                    let mut state = state.set_nullability(inner.clone(), NullableKind::NonNullable);
                    let sym = self.fresh_symbol(Some(inner.clone()));
                    if let Some(id) = sym.as_symbol() {
                        state.constraints = state.constraints.set(id, NullConstraint::NotNull);
                    }
                    state.bind(inner, sym)
                }
                TypeCategory::NullableObject { .. } => {
                    alias::create(&state, ObjKey::Region(region), NullConstraint::Unknown)
                }
                _ => state,
            },
        }
    }

    // ------------------------------------------------------------------
    // Loads and stores
    // ------------------------------------------------------------------

    /// PostLoad: read a region, conjuring fresh symbols for unknown,
    /// invalidated, or volatile storage.
    fn load(
        &mut self,
        state: State,
        region: Region,
        ty: Option<TypeId>,
        span: Option<&Span>,
    ) -> Option<(State, SVal)> {
        // aggregates are captured by reference to their region
        if let Some(ty) = ty {
            let stripped = self.program.types.strip_reference(ty);
            if matches!(self.program.types.get(stripped), Type::Record(_)) {
                return Some((state, SVal::compound(region)));
            }
        }

        if state.nullability_of(&region) == NullableKind::VolatileNullable {
            // never binds; no proof can be established through volatile
            let v = self.fresh_symbol(Some(region.clone()));
            let state = if region.is_non_local() {
                state.add_non_local(region)
            } else {
                state
            };
            return Some((state, v));
        }

        if let Some(rec) = state.escaped.get(&region).copied() {
            match rec.validity {
                ConstraintValidity::AlwaysInvalid => {
                    let v = self.fresh_symbol(Some(region.clone()));
                    return Some((state, v));
                }
                ConstraintValidity::Invalid => {
                    // the constraint must be re-proved before use
                    let v = self.fresh_symbol(Some(region.clone()));
                    let mut state = state.bind(region.clone(), v.clone());
                    state = escape::record(
                        &state,
                        region.clone(),
                        EscapeRecord {
                            constraint: NullConstraint::Unknown,
                            validity: ConstraintValidity::Valid,
                        },
                    );
                    if region.is_non_local() {
                        state = state.add_non_local(region);
                    }
                    return Some((state, v));
                }
                _ => {}
            }
        }

        let mut state = state;
        if region.is_non_local() {
            state = state.add_non_local(region.clone());
        }

        if let Some(v) = state.lookup(&region).cloned() {
            return self.check_non_nullable_invariant(state, &region, v, span);
        }

        let v = self.fresh_symbol(Some(region.clone()));
        if state.nullability_of(&region) == NullableKind::NonNullable {
            if let Some(id) = v.as_symbol() {
                state.constraints = state.constraints.set(id, NullConstraint::NotNull);
            }
        }
        if region.is_non_local() {
            state = state.record_origin(
                region.clone(),
                span.cloned(),
                "nullable pointer read from non-local storage here",
            );
        }
        let state = state.bind(region.clone(), v.clone());
        Some((state, v))
    }

    /// A non-nullable region's value is always constrained not-null;
    /// observing otherwise reports and sinks.
    fn check_non_nullable_invariant(
        &mut self,
        state: State,
        region: &Region,
        value: SVal,
        span: Option<&Span>,
    ) -> Option<(State, SVal)> {
        if state.nullability_of(region) == NullableKind::NonNullable
            && state.null_constraint(&value) == NullConstraint::Null
        {
            self.diags.push(rules::build_null003(
                span,
                &self.func.name,
                &region_name(region, &self.decl_names),
            ));
            return None;
        }
        Some((state, value))
    }

    /// Bind a value into a region, running escape analysis, alias-graph
    /// updates, and non-nullable enforcement.
    fn bind_value(
        &mut self,
        state: State,
        region: Region,
        value: SVal,
        target_ty: Option<TypeId>,
        span: Option<&Span>,
    ) -> Option<State> {
        let mut state = state;

        // a store of null over a proven pointer is the invalidation event
        if let Some(old) = state.lookup(&region) {
            if state.null_constraint(old) == NullConstraint::NotNull
                && state.null_constraint(&value) == NullConstraint::Null
            {
                state =
                    state.record_invalidation(region.clone(), span.cloned(), "null assigned here");
            }
        }

        if let Some(ty) = target_ty {
            match self.category_of(ty) {
                TypeCategory::NonNullableWrapper { .. } => {
                    return self.bind_into_wrapper(state, region, value, span);
                }
                TypeCategory::NullableObject { .. } => {
                    return Some(self.bind_nullable_object(state, region, value));
                }
                _ => {}
            }
        }

        // stores into the wrapper's inner field enforce the invariant
        if let Region::Field { base, field } = &region {
            if field == "ptr_"
                && (state.nullability_of(&region) == NullableKind::NonNullable
                    || state.nullability_of(base) == NullableKind::NonNullable)
            {
                match state.null_constraint(&value) {
                    NullConstraint::Null => {
                        self.diags.push(rules::build_null005(span, &self.func.name));
                        return None;
                    }
                    NullConstraint::Unknown => {
                        if let Some(id) = value.as_symbol() {
                            state.constraints = state.constraints.set(id, NullConstraint::NotNull);
                        }
                    }
                    NullConstraint::NotNull => {}
                }
            }
        }

        // writing into a nullable object's storage invalidates its
        // constraint and isolates it from its aliases
        if let Region::Field { base, .. } = &region {
            let base_is_object = self
                .region_decl_type(base)
                .map(|t| matches!(self.category_of(t), TypeCategory::NullableObject { .. }))
                .unwrap_or(false);
            if base_is_object {
                let key = ObjKey::Region((**base).clone());
                state = alias::break_alias(&state, &key);
                state = alias::create(&state, key, NullConstraint::Unknown);
            }
        }

        // sharing a pointer's address with non-local storage is an escape
        if region.is_non_local() {
            state = state.add_non_local(region.clone());
            let chain_ty = target_ty.or_else(|| self.region_decl_type(&region));
            if let Some(ty) = chain_ty {
                match escape::escape_pointer_chain(&state, self.program, ty, &value) {
                    EscapeOutcome::Recorded(next) => state = next,
                    EscapeOutcome::Volatile { poisoned, region } => {
                        self.diags.push(rules::build_null008(
                            span,
                            &self.func.name,
                            &region_name(&region, &self.decl_names),
                        ));
                        return Some(poisoned);
                    }
                }
                // an escaping aggregate carries its pointer fields along
                if let SVal::LazyCompound { region: src } = &value {
                    let stripped = self.program.types.strip_reference(ty);
                    if let Some(rec_id) = self.program.types.as_record(stripped) {
                        if let Some(rec) = self.program.record(rec_id).cloned() {
                            for fdecl in &rec.fields {
                                let field_region =
                                    (**src).clone().field(fdecl.name.clone());
                                let Some(fval) = state.lookup(&field_region).cloned() else {
                                    continue;
                                };
                                match escape::escape_pointer_chain(
                                    &state,
                                    self.program,
                                    fdecl.ty,
                                    &fval,
                                ) {
                                    EscapeOutcome::Recorded(next) => state = next,
                                    EscapeOutcome::Volatile { poisoned, region } => {
                                        self.diags.push(rules::build_null008(
                                            span,
                                            &self.func.name,
                                            &region_name(&region, &self.decl_names),
                                        ));
                                        return Some(poisoned);
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        Some(state.bind(region, value))
    }

    fn bind_into_wrapper(
        &mut self,
        state: State,
        region: Region,
        value: SVal,
        span: Option<&Span>,
    ) -> Option<State> {
        let name = region_name(&region, &self.decl_names);
        if value.is_undef() {
            self.diags
                .push(rules::build_null007(span, &self.func.name, &name));
            return None;
        }
        // copying another wrapper keeps the invariant by construction
        if let SVal::LazyCompound { region: src } = &value {
            if state.nullability_of(src) == NullableKind::NonNullable {
                let src_inner = (**src).clone().field("ptr_");
                let inner_val = match state.lookup(&src_inner) {
                    Some(v) => v.clone(),
                    None => {
                        let v = self.fresh_symbol(Some(src_inner));
                        let mut s2 = state.clone();
                        if let Some(id) = v.as_symbol() {
                            s2.constraints = s2.constraints.set(id, NullConstraint::NotNull);
                        }
                        let state = s2.set_nullability(region.clone(), NullableKind::NonNullable);
                        let inner = region.field("ptr_");
                        let state = state.set_nullability(inner.clone(), NullableKind::NonNullable);
                        return Some(state.bind(inner, v));
                    }
                };
                let state = state.set_nullability(region.clone(), NullableKind::NonNullable);
                let inner = region.field("ptr_");
                let state = state.set_nullability(inner.clone(), NullableKind::NonNullable);
                return Some(state.bind(inner, inner_val));
            }
        }
        match state.null_constraint(&value) {
            NullConstraint::Null => {
                self.diags.push(rules::build_null005(span, &self.func.name));
                None
            }
            NullConstraint::Unknown => {
                self.diags
                    .push(rules::build_null004(span, &self.func.name, &name));
                None
            }
            NullConstraint::NotNull => {
                let state = state.set_nullability(region.clone(), NullableKind::NonNullable);
                let inner = region.field("ptr_");
                let state = state.set_nullability(inner.clone(), NullableKind::NonNullable);
                Some(state.bind(inner, value))
            }
        }
    }

    /// Reassigning a nullable object breaks its aliases and links it to
    /// the source's equivalence class.
    fn bind_nullable_object(&mut self, state: State, region: Region, value: SVal) -> State {
        let key = ObjKey::Region(region.clone());
        let mut state = alias::break_alias(&state, &key);
        match &value {
            SVal::ConcreteNull => {
                state = alias::update(&state, &key, NullConstraint::Null);
            }
            SVal::LazyCompound { region: src } => {
                let src_key = ObjKey::Region((**src).clone());
                state = alias::add_alias(&state, &key, &src_key);
                let c = alias::constraint_of(&state, &src_key);
                state = if c != NullConstraint::Unknown {
                    alias::update(&state, &key, c)
                } else {
                    alias::create(&state, key.clone(), NullConstraint::Unknown)
                };
            }
            SVal::Symbol { id, .. } => {
                state = alias::create(&state, key.clone(), state.constraints.constraint(*id));
                state = alias::add_symbol_alias(&state, &key, *id);
            }
            _ => {
                state = alias::create(&state, key.clone(), NullConstraint::Unknown);
            }
        }
        state.bind(region, value)
    }

    /// The declared type of a region that directly names a declaration.
    /// Sub-regions (fields, elements) have no declaration of their own.
    fn region_decl_type(&self, region: &Region) -> Option<TypeId> {
        match region {
            Region::StackLocal { decl }
            | Region::StackArg { decl }
            | Region::Global { decl, .. } => self.decl_type(*decl),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Dereference checking
    // ------------------------------------------------------------------

    /// Check point: a dereference is allowed iff the value is proven
    /// non-null on this path. Returns the state to continue with, or
    /// `None` after reporting (the path sinks).
    fn check_deref(
        &mut self,
        state: State,
        value: &SVal,
        span: Option<&Span>,
        name: &str,
    ) -> Option<State> {
        // a nullable-object value carries its constraint in the alias maps
        let constraint = match value {
            SVal::LazyCompound { region } => {
                alias::constraint_of(&state, &ObjKey::Region((**region).clone()))
            }
            _ => state.null_constraint(value),
        };
        match constraint {
            NullConstraint::NotNull => Some(state),
            NullConstraint::Null => {
                let events = self.events_for(&state, value);
                self.diags
                    .push(rules::build_null002(span, &self.func.name, name, &events));
                None
            }
            NullConstraint::Unknown => {
                if value.is_undef() {
                    self.diags
                        .push(rules::build_null006(span, &self.func.name, name));
                    return None;
                }
                let events = self.events_for(&state, value);
                self.diags
                    .push(rules::build_null001(span, &self.func.name, name, &events));
                None
            }
        }
    }

    fn events_for(&self, state: &State, value: &SVal) -> ProofEvents {
        if let Some(region) = value.origin_region() {
            let mut events = state.events_of(region);
            if events.origin.is_none() {
                if let Some(id) = value.as_symbol() {
                    if let Some((span, what)) = self.sym_origins.get(&id) {
                        events.origin = Some((span.clone(), what.clone()));
                    }
                }
            }
            return events;
        }
        if let Some(id) = value.as_symbol() {
            if let Some((span, what)) = self.sym_origins.get(&id) {
                return ProofEvents {
                    origin: Some((span.clone(), what.clone())),
                    ..ProofEvents::default()
                };
            }
        }
        ProofEvents::default()
    }

    /// The region a pointer value points at.
    fn pointee_region(&self, value: &SVal) -> Region {
        match value {
            SVal::LocRegion(r) => (**r).clone(),
            SVal::Symbol { id, .. } => Region::Symbolic(*id),
            _ => Region::UnknownSpace,
        }
    }

    // ------------------------------------------------------------------
    // Assumptions and condition splitting
    // ------------------------------------------------------------------

    /// Constraint-store assumption plus alias propagation (guarded
    /// against re-entry).
    fn assume_value(
        &mut self,
        state: &State,
        value: &SVal,
        not_null: bool,
        span: Option<&Span>,
    ) -> Option<State> {
        match value.structural_constraint() {
            NullConstraint::NotNull => return not_null.then(|| state.clone()),
            NullConstraint::Null => return (!not_null).then(|| state.clone()),
            NullConstraint::Unknown => {}
        }
        let Some(sym) = value.as_symbol() else {
            // untracked defined value; the assumption neither helps nor
            // contradicts
            return Some(state.clone());
        };
        let constraints = state.constraints.assume(sym, not_null)?;
        let mut next = state.clone();
        next.constraints = constraints;
        let wanted = if not_null {
            NullConstraint::NotNull
        } else {
            NullConstraint::Null
        };
        next = alias::update_from_symbol(&next, sym, wanted);
        if not_null {
            if let Some(region) = value.origin_region() {
                next = next.record_establishment(region.clone(), span.cloned());
            }
        }
        Some(next)
    }

    /// Split a state on a condition: (states where it holds, states
    /// where it does not). Handles null comparisons, contextual bool
    /// conversions of pointers and nullable objects, and short-circuit
    /// operators structurally; everything else forks unconstrained.
    fn eval_as_cond(&mut self, state: State, cond: &Expr) -> (Vec<State>, Vec<State>) {
        if !self.charge() {
            return (Vec::new(), Vec::new());
        }
        let span = cond.span.clone();
        match &cond.kind {
            ExprKind::BoolLit(true) => (vec![state], Vec::new()),
            ExprKind::BoolLit(false) | ExprKind::NullLit => (Vec::new(), vec![state]),
            ExprKind::IntLit(0) => (Vec::new(), vec![state]),
            ExprKind::IntLit(_) => (vec![state], Vec::new()),
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand,
            } => {
                let (t, f) = self.eval_as_cond(state, operand);
                (f, t)
            }
            ExprKind::Binary { op, lhs, rhs } if matches!(op, BinaryOp::Eq | BinaryOp::Ne) => {
                self.split_equality(state, *op, lhs, rhs, span.as_ref())
            }
            ExprKind::Binary {
                op: BinaryOp::LAnd,
                lhs,
                rhs,
            } => {
                let (lt, lf) = self.eval_as_cond(state, lhs);
                let mut t = Vec::new();
                let mut f = lf;
                for s in lt {
                    let (rt, rf) = self.eval_as_cond(s, rhs);
                    t.extend(rt);
                    f.extend(rf);
                }
                (t, f)
            }
            ExprKind::Binary {
                op: BinaryOp::LOr,
                lhs,
                rhs,
            } => {
                let (lt, lf) = self.eval_as_cond(state, lhs);
                let mut t = lt;
                let mut f = Vec::new();
                for s in lf {
                    let (rt, rf) = self.eval_as_cond(s, rhs);
                    t.extend(rt);
                    f.extend(rf);
                }
                (t, f)
            }
            _ => {
                // contextual conversion to bool
                if let Some(split) = self.try_nullable_object_cond(&state, cond) {
                    return split;
                }
                let mut t = Vec::new();
                let mut f = Vec::new();
                for (s, v) in self.eval_expr(state, cond) {
                    match &v {
                        SVal::ConcreteBool(true) => t.push(s),
                        SVal::ConcreteBool(false) => f.push(s),
                        _ => match s.null_constraint(&v) {
                            NullConstraint::NotNull => t.push(s),
                            NullConstraint::Null => f.push(s),
                            NullConstraint::Unknown => {
                                if v.as_symbol().is_some() {
                                    if let Some(ts) = self.assume_value(&s, &v, true, span.as_ref())
                                    {
                                        t.push(ts);
                                    }
                                    if let Some(fs) =
                                        self.assume_value(&s, &v, false, span.as_ref())
                                    {
                                        f.push(fs);
                                    }
                                } else {
                                    // untracked truth value: both arms feasible
                                    t.push(s.clone());
                                    f.push(s);
                                }
                            }
                        },
                    }
                }
                (t, f)
            }
        }
    }

    /// A nullable object in boolean context splits the path, updating
    /// the whole alias class in each arm.
    fn try_nullable_object_cond(
        &mut self,
        state: &State,
        cond: &Expr,
    ) -> Option<(Vec<State>, Vec<State>)> {
        let ty = self.static_type_of(cond)?;
        let TypeCategory::NullableObject { .. } = self.category_of(ty) else {
            return None;
        };
        let mut t = Vec::new();
        let mut f = Vec::new();
        for (s, region) in self.eval_lvalue(state.clone(), cond) {
            let key = ObjKey::Region(region);
            match alias::constraint_of(&s, &key) {
                NullConstraint::NotNull => t.push(s),
                NullConstraint::Null => f.push(s),
                NullConstraint::Unknown => {
                    t.push(alias::update(&s, &key, NullConstraint::NotNull));
                    f.push(alias::update(&s, &key, NullConstraint::Null));
                }
            }
        }
        Some((t, f))
    }

    /// `==` / `!=`: null comparisons refine constraints; comparing two
    /// nullable objects aliases them in the equal arm.
    fn split_equality(
        &mut self,
        state: State,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        span: Option<&Span>,
    ) -> (Vec<State>, Vec<State>) {
        let eq_is_true = op == BinaryOp::Eq;
        let other = match (&lhs.kind, &rhs.kind) {
            (ExprKind::NullLit, _) => Some(rhs),
            (_, ExprKind::NullLit) => Some(lhs),
            _ => None,
        };

        if let Some(other) = other {
            // nullable object vs null updates the alias class per arm
            if let Some(ty) = self.static_type_of(other) {
                if let TypeCategory::NullableObject { .. } = self.category_of(ty) {
                    let mut eq = Vec::new();
                    let mut ne = Vec::new();
                    for (s, region) in self.eval_lvalue(state, other) {
                        let key = ObjKey::Region(region);
                        match alias::constraint_of(&s, &key) {
                            NullConstraint::Null => eq.push(s),
                            NullConstraint::NotNull => ne.push(s),
                            NullConstraint::Unknown => {
                                eq.push(alias::update(&s, &key, NullConstraint::Null));
                                ne.push(alias::update(&s, &key, NullConstraint::NotNull));
                            }
                        }
                    }
                    return if eq_is_true { (eq, ne) } else { (ne, eq) };
                }
            }
            let mut eq = Vec::new();
            let mut ne = Vec::new();
            for (s, v) in self.eval_expr(state, other) {
                match s.null_constraint(&v) {
                    NullConstraint::Null => eq.push(s),
                    NullConstraint::NotNull => ne.push(s),
                    NullConstraint::Unknown => {
                        if let Some(es) = self.assume_value(&s, &v, false, span) {
                            eq.push(es);
                        }
                        if let Some(ns) = self.assume_value(&s, &v, true, span) {
                            ne.push(ns);
                        }
                    }
                }
            }
            return if eq_is_true { (eq, ne) } else { (ne, eq) };
        }

        // object == object aliases the two keys in the equal arm
        let obj_lhs = self
            .static_type_of(lhs)
            .map(|t| matches!(self.category_of(t), TypeCategory::NullableObject { .. }))
            .unwrap_or(false);
        let obj_rhs = self
            .static_type_of(rhs)
            .map(|t| matches!(self.category_of(t), TypeCategory::NullableObject { .. }))
            .unwrap_or(false);
        if obj_lhs && obj_rhs {
            let mut eq = Vec::new();
            let mut ne = Vec::new();
            for (s, lregion) in self.eval_lvalue(state, lhs) {
                for (s2, rregion) in self.eval_lvalue(s.clone(), rhs) {
                    let lkey = ObjKey::Region(lregion.clone());
                    let rkey = ObjKey::Region(rregion);
                    eq.push(alias::add_alias(&s2, &lkey, &rkey));
                    ne.push(s2);
                }
            }
            return if eq_is_true { (eq, ne) } else { (ne, eq) };
        }

        // general comparison: evaluate for effect, fork both arms unless
        // both sides are concrete
        let mut t = Vec::new();
        let mut f = Vec::new();
        for (s, lv) in self.eval_expr(state, lhs) {
            for (s2, rv) in self.eval_expr(s.clone(), rhs) {
                match (&lv, &rv) {
                    (SVal::ConcreteInt(a), SVal::ConcreteInt(b)) => {
                        if (a == b) == eq_is_true {
                            t.push(s2);
                        } else {
                            f.push(s2);
                        }
                    }
                    _ => {
                        t.push(s2.clone());
                        f.push(s2);
                    }
                }
            }
        }
        (t, f)
    }

    /// The declared type of simple expressions, used to recognize
    /// nullable-object and wrapper operands.
    fn static_type_of(&self, expr: &Expr) -> Option<TypeId> {
        match &expr.kind {
            ExprKind::DeclRef(d) => {
                let ty = self.decl_type(*d)?;
                Some(self.program.types.strip_reference(ty))
            }
            ExprKind::Member { base, field, .. } => {
                let base_ty = self.static_type_of(base)?;
                let record = self.program.types.as_record(base_ty)?;
                let rec = self.program.record(record)?;
                Some(rec.field(field)?.ty)
            }
            ExprKind::New { ty, .. } => Some(*ty),
            ExprKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => {
                let ty = self.static_type_of(operand)?;
                self.program.types.pointee(ty)
            }
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Expression evaluation
    // ------------------------------------------------------------------

    fn eval_lvalue(&mut self, state: State, expr: &Expr) -> LvalStates {
        if !self.charge() {
            return Vec::new();
        }
        let span = expr.span.clone();
        match &expr.kind {
            ExprKind::DeclRef(d) => self.resolve_decl_lvalue(state, *d),
            ExprKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => {
                let mut out = Vec::new();
                for (s, v) in self.eval_expr(state, operand) {
                    let name = expr_name(operand, &self.decl_names);
                    if let Some(s) = self.check_deref(s, &v, span.as_ref(), &name) {
                        out.push((s, self.pointee_region(&v)));
                    }
                }
                out
            }
            ExprKind::Member {
                base,
                field,
                is_arrow,
            } => {
                let mut out = Vec::new();
                if *is_arrow {
                    // nullable-object arrow goes through the object's
                    // constraint, not a raw pointer value
                    if let Some(ty) = self.static_type_of(base) {
                        if let TypeCategory::NullableObject { .. } = self.category_of(ty) {
                            for (s, region) in self.eval_lvalue(state, base) {
                                let key = ObjKey::Region(region.clone());
                                let name = expr_name(base, &self.decl_names);
                                match alias::constraint_of(&s, &key) {
                                    NullConstraint::NotNull => {
                                        out.push((s, region.field(field.clone())));
                                    }
                                    NullConstraint::Null => {
                                        self.diags.push(rules::build_null002(
                                            span.as_ref(),
                                            &self.func.name,
                                            &name,
                                            &ProofEvents::default(),
                                        ));
                                    }
                                    NullConstraint::Unknown => {
                                        self.diags.push(rules::build_null001(
                                            span.as_ref(),
                                            &self.func.name,
                                            &name,
                                            &ProofEvents::default(),
                                        ));
                                    }
                                }
                            }
                            return out;
                        }
                    }
                    for (s, v) in self.eval_expr(state, base) {
                        let name = expr_name(base, &self.decl_names);
                        if let Some(s) = self.check_deref(s, &v, span.as_ref(), &name) {
                            let region = self.pointee_region(&v);
                            out.push((s, region.field(field.clone())));
                        }
                    }
                } else {
                    for (s, region) in self.eval_lvalue(state, base) {
                        out.push((s, region.field(field.clone())));
                    }
                }
                out
            }
            ExprKind::MemberPtr { base, member } => {
                let mut out = Vec::new();
                for (s, v) in self.eval_expr(state, base) {
                    let name = expr_name(base, &self.decl_names);
                    let Some(s) = self.check_deref(s, &v, span.as_ref(), &name) else {
                        continue;
                    };
                    for (s2, mv) in self.eval_expr(s.clone(), member) {
                        let mname = expr_name(member, &self.decl_names);
                        if let Some(s2) = self.check_deref(s2, &mv, span.as_ref(), &mname) {
                            let region = self.pointee_region(&v);
                            out.push((s2, region.field(format!("<pm:{}>", member.id.0))));
                        }
                    }
                }
                out
            }
            _ => {
                // fall back: an address evaluates to its region, anything
                // else materializes a temporary
                let mut out = Vec::new();
                for (s, v) in self.eval_expr(state, expr) {
                    match &v {
                        SVal::LocRegion(r) => out.push((s, (**r).clone())),
                        SVal::LazyCompound { region } => out.push((s, (**region).clone())),
                        _ => {
                            let region = Region::Temp {
                                expr: expr.id,
                                extended: false,
                            };
                            let s = s.bind(region.clone(), v);
                            out.push((s, region));
                        }
                    }
                }
                out
            }
        }
    }

    fn resolve_decl_lvalue(&mut self, state: State, decl: DeclId) -> LvalStates {
        let region = self.decl_region(decl);
        let Some(ty) = self.decl_type(decl) else {
            return vec![(state, region)];
        };
        if !self.program.types.is_reference(ty) {
            return vec![(state, region)];
        }
        // a reference is transparent: the lvalue is its referent
        if let Some(SVal::LocRegion(referent)) = state.lookup(&region).cloned() {
            return vec![(state, *referent)];
        }
        // unbound reference: point it at fresh caller storage
        let sym = self.fresh_symbol(None);
        let referent = Region::Symbolic(sym.as_symbol().expect("fresh symbol"));
        let mut state = state.bind(region, SVal::loc(referent.clone()));
        if let Type::Reference {
            referent: referent_ty,
            referent_volatile: true,
            ..
        } = self.program.types.get(ty)
        {
            if matches!(
                self.category_of(*referent_ty),
                TypeCategory::RawPointer { .. }
            ) {
                state = state.set_nullability(referent.clone(), NullableKind::VolatileNullable);
            }
        }
        vec![(state, referent)]
    }

    fn eval_expr(&mut self, state: State, expr: &Expr) -> EvalStates {
        if !self.charge() {
            return Vec::new();
        }
        let span = expr.span.clone();
        match &expr.kind {
            ExprKind::NullLit => vec![(state, SVal::ConcreteNull)],
            ExprKind::IntLit(v) => vec![(state, SVal::ConcreteInt(*v))],
            ExprKind::BoolLit(v) => vec![(state, SVal::ConcreteBool(*v))],
            ExprKind::This => {
                let region = self.this_region.clone().unwrap_or(Region::UnknownSpace);
                vec![(state, SVal::loc(region))]
            }
            ExprKind::DeclRef(d) => {
                let resolved_ty = self
                    .decl_type(*d)
                    .map(|t| self.program.types.strip_reference(t));
                let mut out = Vec::new();
                for (s, region) in self.resolve_decl_lvalue(state, *d) {
                    if let Some((s, v)) = self.load(s, region, resolved_ty, span.as_ref()) {
                        out.push((s, v));
                    }
                }
                out
            }
            ExprKind::Unary { op, operand } => self.eval_unary(state, expr, *op, operand),
            ExprKind::Binary { op, lhs, rhs } => self.eval_binary(state, expr, *op, lhs, rhs),
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                let (t, f) = self.eval_as_cond(state, cond);
                let mut out = Vec::new();
                for s in t {
                    out.extend(self.eval_expr(s, then_expr));
                }
                for s in f {
                    out.extend(self.eval_expr(s, else_expr));
                }
                out
            }
            ExprKind::Member { .. } | ExprKind::MemberPtr { .. } => {
                let member_ty = self.static_type_of(expr);
                let mut out = Vec::new();
                for (s, region) in self.eval_lvalue(state, expr) {
                    if let Some((s, v)) = self.load(s, region, member_ty, span.as_ref()) {
                        out.push((s, v));
                    }
                }
                out
            }
            ExprKind::Call { callee, args } => self.eval_call(state, expr, callee, args),
            ExprKind::New { throwing, .. } => {
                let v = self.fresh_symbol(None);
                let mut state = state;
                if *throwing {
                    // a throwing allocator never returns null
                    if let Some(id) = v.as_symbol() {
                        state.constraints = state.constraints.set(id, NullConstraint::NotNull);
                    }
                } else if let (Some(id), Some(span)) = (v.as_symbol(), span.as_ref()) {
                    self.sym_origins.insert(
                        id,
                        (span.clone(), "nullable result of noexcept new here".into()),
                    );
                }
                vec![(state, v)]
            }
            ExprKind::Cast { kind, operand } => self.eval_cast(state, *kind, operand, span.as_ref()),
            ExprKind::Lambda { captures, body: _ } => {
                let mut state = state;
                for cap in captures {
                    state = self.capture_one(state, expr, cap);
                }
                vec![(
                    state,
                    SVal::CodeAddr {
                        function: format!("lambda#{}", expr.id.0),
                    },
                )]
            }
        }
    }

    fn capture_one(&mut self, state: State, lambda: &Expr, cap: &Capture) -> State {
        if cap.by_ref {
            // the closure holds a reference to the pointer: a reference
            // escape, so any later call invalidates the proof
            if self.is_pointer_decl(cap.decl) {
                let region = self.decl_region(cap.decl);
                let current = state.lookup(&region).cloned().unwrap_or(SVal::Unknown);
                let constraint = state.null_constraint(&current);
                return escape::record(
                    &state,
                    region,
                    EscapeRecord {
                        constraint,
                        validity: ConstraintValidity::Valid,
                    },
                );
            }
            return state;
        }
        // by-value: snapshot into the closure's own storage
        let snapshot_region = Region::Temp {
            expr: lambda.id,
            extended: true,
        }
        .field(self.decl_name(cap.decl));
        let region = self.decl_region(cap.decl);
        let value = match state.lookup(&region) {
            Some(v) => v.clone(),
            None => self.fresh_symbol(Some(region)),
        };
        state.bind(snapshot_region, value)
    }

    fn eval_unary(&mut self, state: State, expr: &Expr, op: UnaryOp, operand: &Expr) -> EvalStates {
        let span = expr.span.clone();
        match op {
            UnaryOp::Deref => {
                let pointee_ty = self
                    .static_type_of(operand)
                    .and_then(|t| self.program.types.pointee(t));
                let mut out = Vec::new();
                for (s, v) in self.eval_expr(state, operand) {
                    let name = expr_name(operand, &self.decl_names);
                    if let Some(s) = self.check_deref(s, &v, span.as_ref(), &name) {
                        let region = self.pointee_region(&v);
                        if let Some((s, loaded)) = self.load(s, region, pointee_ty, span.as_ref()) {
                            out.push((s, loaded));
                        }
                    }
                }
                out
            }
            UnaryOp::AddrOf => {
                let mut out = Vec::new();
                for (s, region) in self.eval_lvalue(state, operand) {
                    out.push((s, SVal::loc(region)));
                }
                out
            }
            UnaryOp::Not => {
                let (t, f) = self.eval_as_cond(state, operand);
                let mut out = Vec::new();
                for s in t {
                    out.push((s, SVal::ConcreteBool(false)));
                }
                for s in f {
                    out.push((s, SVal::ConcreteBool(true)));
                }
                out
            }
            UnaryOp::Neg => {
                let mut out = Vec::new();
                for (s, v) in self.eval_expr(state, operand) {
                    let r = match v {
                        SVal::ConcreteInt(i) => SVal::ConcreteInt(-i),
                        _ => SVal::Unknown,
                    };
                    out.push((s, r));
                }
                out
            }
            UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => {
                let mut out = Vec::new();
                for (s, region) in self.eval_lvalue(state, operand) {
                    let ty = self.region_decl_type(&region);
                    let Some((s, old)) = self.load(s, region.clone(), ty, span.as_ref()) else {
                        continue;
                    };
                    // stepping a pointer stays within its object: the
                    // null constraint carries to the new value
                    let (s, new) = match &old {
                        SVal::ConcreteInt(i) => {
                            let delta = match op {
                                UnaryOp::PreInc | UnaryOp::PostInc => 1,
                                _ => -1,
                            };
                            (s, SVal::ConcreteInt(i + delta))
                        }
                        _ => {
                            let constraint = s.null_constraint(&old);
                            let v = self.fresh_symbol(old.origin_region().cloned());
                            let mut s = s;
                            if constraint != NullConstraint::Unknown {
                                if let Some(id) = v.as_symbol() {
                                    s.constraints = s.constraints.set(id, constraint);
                                }
                            }
                            (s, v)
                        }
                    };
                    let Some(s) = self.bind_value(s, region, new.clone(), ty, span.as_ref())
                    else {
                        continue;
                    };
                    let result = match op {
                        UnaryOp::PostInc | UnaryOp::PostDec => old,
                        _ => new,
                    };
                    out.push((s, result));
                }
                out
            }
        }
    }

    fn eval_binary(
        &mut self,
        state: State,
        expr: &Expr,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> EvalStates {
        let span = expr.span.clone();
        match op {
            BinaryOp::Assign => {
                let target_ty = self.static_type_of(lhs).or_else(|| match &lhs.kind {
                    ExprKind::DeclRef(d) => self.decl_type(*d),
                    _ => None,
                });
                let mut out = Vec::new();
                for (s, v) in self.eval_expr(state, rhs) {
                    for (s2, region) in self.eval_lvalue(s.clone(), lhs) {
                        let resolved_ty = target_ty
                            .map(|t| self.program.types.strip_reference(t))
                            .or_else(|| self.region_decl_type(&region));
                        if let Some(s3) =
                            self.bind_value(s2, region, v.clone(), resolved_ty, span.as_ref())
                        {
                            out.push((s3, v.clone()));
                        }
                    }
                }
                out
            }
            BinaryOp::AddAssign | BinaryOp::SubAssign => {
                let mut out = Vec::new();
                for (s, _rv) in self.eval_expr(state, rhs) {
                    for (s2, region) in self.eval_lvalue(s.clone(), lhs) {
                        let ty = self.region_decl_type(&region);
                        let Some((s2, old)) = self.load(s2, region.clone(), ty, span.as_ref())
                        else {
                            continue;
                        };
                        let constraint = s2.null_constraint(&old);
                        let new = self.fresh_symbol(old.origin_region().cloned());
                        let mut s2 = s2;
                        if constraint != NullConstraint::Unknown {
                            if let Some(id) = new.as_symbol() {
                                s2.constraints = s2.constraints.set(id, constraint);
                            }
                        }
                        if let Some(s3) = self.bind_value(s2, region, new.clone(), ty, span.as_ref())
                        {
                            out.push((s3, new.clone()));
                        }
                    }
                }
                out
            }
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::LAnd | BinaryOp::LOr => {
                let (t, f) = self.eval_as_cond(state, expr);
                let mut out = Vec::new();
                for s in t {
                    out.push((s, SVal::ConcreteBool(true)));
                }
                for s in f {
                    out.push((s, SVal::ConcreteBool(false)));
                }
                out
            }
            BinaryOp::Add | BinaryOp::Sub => {
                let mut out = Vec::new();
                for (s, lv) in self.eval_expr(state, lhs) {
                    for (s2, rv) in self.eval_expr(s.clone(), rhs) {
                        match (&lv, &rv) {
                            (SVal::ConcreteInt(a), SVal::ConcreteInt(b)) => {
                                let v = if op == BinaryOp::Add {
                                    SVal::ConcreteInt(a + b)
                                } else {
                                    SVal::ConcreteInt(a - b)
                                };
                                out.push((s2, v));
                            }
                            _ => {
                                // pointer arithmetic keeps the constraint
                                let constraint = s2.null_constraint(&lv);
                                let v = self.fresh_symbol(lv.origin_region().cloned());
                                let mut s3 = s2;
                                if constraint != NullConstraint::Unknown {
                                    if let Some(id) = v.as_symbol() {
                                        s3.constraints = s3.constraints.set(id, constraint);
                                    }
                                }
                                out.push((s3, v));
                            }
                        }
                    }
                }
                out
            }
            BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => {
                let mut out = Vec::new();
                for (s, _lv) in self.eval_expr(state, lhs) {
                    for (s2, _rv) in self.eval_expr(s.clone(), rhs) {
                        out.push((s2, SVal::Unknown));
                    }
                }
                out
            }
        }
    }

    fn eval_cast(
        &mut self,
        state: State,
        kind: CastKind,
        operand: &Expr,
        span: Option<&Span>,
    ) -> EvalStates {
        match kind {
            CastKind::ArrayToPointerDecay => {
                let mut out = Vec::new();
                for (s, region) in self.eval_lvalue(state, operand) {
                    out.push((s, SVal::loc(region.element(0))));
                }
                out
            }
            CastKind::FunctionToPointerDecay => {
                if let ExprKind::DeclRef(d) = &operand.kind {
                    let function = self.decl_name(*d);
                    return vec![(state, SVal::CodeAddr { function })];
                }
                self.eval_expr(state, operand)
            }
            CastKind::WrapperToPointer => {
                // reading through the wrapper always yields not-null
                let mut out = Vec::new();
                for (s, region) in self.eval_lvalue(state, operand) {
                    let inner = region.field("ptr_");
                    let s = s.set_nullability(inner.clone(), NullableKind::NonNullable);
                    if let Some((mut s, v)) = self.load(s, inner, None, span) {
                        if let Some(id) = v.as_symbol() {
                            if s.constraints.constraint(id) == NullConstraint::Unknown {
                                s.constraints = s.constraints.set(id, NullConstraint::NotNull);
                            }
                        }
                        out.push((s, v));
                    }
                }
                out
            }
        }
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    fn eval_call(
        &mut self,
        state: State,
        expr: &Expr,
        callee: &Callee,
        args: &[Expr],
    ) -> EvalStates {
        let span = expr.span.clone();

        if let Callee::Named(name) = callee {
            if let Some(model) = models::call_model(name) {
                return self.eval_modeled_call(state, expr, model, args);
            }
            // explicit construction of the wrapper
            if name == models::NOT_NULL_QUALIFIED_NAME {
                return self.eval_wrapper_construction(state, expr, args);
            }
        }

        match callee {
            Callee::Method {
                object,
                name,
                is_const,
                is_arrow,
            } => self.eval_method_call(state, expr, object, name, *is_const, *is_arrow, args),
            Callee::Expr(target) => {
                let mut out = Vec::new();
                for (s, v) in self.eval_expr(state, target) {
                    let callee_name = expr_name(target, &self.decl_names);
                    let Some(s) = self.check_deref(s, &v, span.as_ref(), &callee_name) else {
                        continue;
                    };
                    if let SVal::CodeAddr { function } = &v {
                        if let Some(id) = function.strip_prefix("lambda#") {
                            if let Ok(id) = id.parse::<u32>() {
                                out.extend(self.invoke_lambda(s, expr, id, args));
                                continue;
                            }
                        }
                    }
                    out.extend(self.eval_opaque_call(s, expr, None, args));
                }
                out
            }
            Callee::Named(name) => {
                let sig = self.program.function(name).cloned();
                self.eval_opaque_call(state, expr, sig.as_ref(), args)
            }
        }
    }

    fn eval_modeled_call(
        &mut self,
        state: State,
        expr: &Expr,
        model: CallModel,
        args: &[Expr],
    ) -> EvalStates {
        let span = expr.span.clone();
        let Some(arg) = args.first() else {
            return vec![(state, SVal::Unknown)];
        };
        match model {
            // std::forward / std::move preserve the argument's constraint
            // and trigger no invalidation
            CallModel::Identity => self.eval_expr(state, arg),
            CallModel::AddressOf => {
                let mut out = Vec::new();
                for (s, region) in self.eval_lvalue(state, arg) {
                    out.push((s, SVal::loc(region)));
                }
                out
            }
            CallModel::MakeNotNull => {
                let mut out = Vec::new();
                for (s, v) in self.eval_expr(state, arg) {
                    let name = expr_name(arg, &self.decl_names);
                    match s.null_constraint(&v) {
                        NullConstraint::Null => {
                            self.diags
                                .push(rules::build_null005(span.as_ref(), &self.func.name));
                        }
                        NullConstraint::Unknown => {
                            self.diags.push(rules::build_null004(
                                span.as_ref(),
                                &self.func.name,
                                &name,
                            ));
                        }
                        NullConstraint::NotNull => {
                            out.push(self.materialize_wrapper(s, expr, v));
                        }
                    }
                }
                out
            }
        }
    }

    fn eval_wrapper_construction(
        &mut self,
        state: State,
        expr: &Expr,
        args: &[Expr],
    ) -> EvalStates {
        let span = expr.span.clone();
        let Some(arg) = args.first() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (s, v) in self.eval_expr(state, arg) {
            let name = expr_name(arg, &self.decl_names);
            if v.is_undef() {
                self.diags
                    .push(rules::build_null007(span.as_ref(), &self.func.name, &name));
                continue;
            }
            if let SVal::LazyCompound { region } = &v {
                if s.nullability_of(region) == NullableKind::NonNullable {
                    out.push((s, v));
                    continue;
                }
            }
            match s.null_constraint(&v) {
                NullConstraint::Null => {
                    self.diags
                        .push(rules::build_null005(span.as_ref(), &self.func.name));
                }
                NullConstraint::Unknown => {
                    self.diags
                        .push(rules::build_null004(span.as_ref(), &self.func.name, &name));
                }
                NullConstraint::NotNull => {
                    out.push(self.materialize_wrapper(s, expr, v));
                }
            }
        }
        out
    }

    fn materialize_wrapper(&mut self, state: State, expr: &Expr, inner: SVal) -> (State, SVal) {
        let region = Region::Temp {
            expr: expr.id,
            extended: false,
        };
        let state = state.set_nullability(region.clone(), NullableKind::NonNullable);
        let inner_region = region.clone().field("ptr_");
        let state = state.set_nullability(inner_region.clone(), NullableKind::NonNullable);
        let state = state.bind(inner_region, inner);
        (state, SVal::compound(region))
    }

    fn eval_method_call(
        &mut self,
        state: State,
        expr: &Expr,
        object: &Expr,
        _method: &str,
        is_const: bool,
        is_arrow: bool,
        args: &[Expr],
    ) -> EvalStates {
        let span = expr.span.clone();
        let obj_ty = self.static_type_of(object);
        let is_nullable_obj = obj_ty
            .map(|t| matches!(self.category_of(t), TypeCategory::NullableObject { .. }))
            .unwrap_or(false);

        let mut out = Vec::new();
        if is_arrow {
            // a method call through a pointer checks the pointer itself
            for (s, v) in self.eval_expr(state, object) {
                let name = expr_name(object, &self.decl_names);
                if let Some(s) = self.check_deref(s, &v, span.as_ref(), &name) {
                    out.extend(self.eval_opaque_call(s, expr, None, args));
                }
            }
            return out;
        }

        if is_nullable_obj {
            for (s, region) in self.eval_lvalue(state, object) {
                let key = ObjKey::Region(region.clone());
                if is_const {
                    // conversion-like reads: the result pointer shares the
                    // object's constraint through the alias graph
                    let result = self.fresh_symbol(Some(region.clone()));
                    let mut s = s;
                    if let Some(id) = result.as_symbol() {
                        s = alias::add_symbol_alias(&s, &key, id);
                    }
                    out.push((s, result));
                } else {
                    // a non-const method invalidates the object's
                    // constraint and isolates it from its aliases
                    let mut s = alias::break_alias(&s, &key);
                    s = alias::create(&s, key, NullConstraint::Unknown);
                    out.extend(self.eval_opaque_call(s, expr, None, args));
                }
            }
            return out;
        }

        for (s, _region) in self.eval_lvalue(state, object) {
            out.extend(self.eval_opaque_call(s, expr, None, args));
        }
        out
    }

    /// PreCall / PostCall for a call with no model: check arguments,
    /// record escapes, then invalidate what the callee may touch.
    fn eval_opaque_call(
        &mut self,
        state: State,
        expr: &Expr,
        sig: Option<&FunctionDecl>,
        args: &[Expr],
    ) -> EvalStates {
        let span = expr.span.clone();
        let mut states: Vec<(State, Vec<Region>)> = vec![(state, Vec::new())];

        for (i, arg) in args.iter().enumerate() {
            let param_ty = sig.and_then(|f| f.params.get(i)).map(|p| p.ty);
            let mut next = Vec::new();
            for (s, kills) in states {
                next.extend(self.eval_call_arg(s, kills, arg, param_ty, span.as_ref()));
            }
            states = next;
        }

        let ret_ty = sig.map(|f| f.ret);
        let mut out = Vec::new();
        for (s, kills) in states {
            let s = self.post_call(s, kills, span.as_ref());
            match self.conjure_return(ret_ty, span.as_ref()) {
                ConjuredReturn::Plain(v) => out.push((s, v)),
                ConjuredReturn::Wrapper(v) => out.push(self.materialize_wrapper(s, expr, v)),
            }
        }
        out
    }

    fn eval_call_arg(
        &mut self,
        state: State,
        kills: Vec<Region>,
        arg: &Expr,
        param_ty: Option<TypeId>,
        span: Option<&Span>,
    ) -> Vec<(State, Vec<Region>)> {
        // a declared wrapper parameter makes the argument position a
        // nullable→non-nullable conversion point
        let param_is_wrapper = param_ty
            .map(|t| matches!(self.category_of(t), TypeCategory::NonNullableWrapper { .. }))
            .unwrap_or(false);

        // non-const reference-to-pointer parameters let the callee
        // rebind the argument
        let param_ref_mut = param_ty
            .map(|t| {
                matches!(
                    classify_escape(self.program, t),
                    EscapeKind::ReferenceEscape {
                        is_const: false,
                        ..
                    }
                )
            })
            .unwrap_or(false);

        let mut out = Vec::new();
        if param_ref_mut {
            let param_ty = param_ty.expect("reference parameter has a type");
            let volatile = matches!(
                self.program.types.get(param_ty),
                Type::Reference {
                    referent_volatile: true,
                    referent_const: false,
                    ..
                }
            );
            for (s, region) in self.eval_lvalue(state, arg) {
                let mut k = kills.clone();
                if volatile {
                    let s = escape::poison(&s, region.clone());
                    self.diags.push(rules::build_null008(
                        span,
                        &self.func.name,
                        &region_name(&region, &self.decl_names),
                    ));
                    k.push(region);
                    out.push((s, k));
                    continue;
                }
                let current = s.lookup(&region).cloned().unwrap_or(SVal::Unknown);
                let constraint = s.null_constraint(&current);
                let s = escape::record(
                    &s,
                    region.clone(),
                    EscapeRecord {
                        constraint,
                        validity: ConstraintValidity::Valid,
                    },
                );
                k.push(region);
                out.push((s, k));
            }
            return out;
        }

        for (s, v) in self.eval_expr(state, arg) {
            if v.is_undef() {
                self.diags.push(rules::build_null006(
                    span,
                    &self.func.name,
                    &expr_name(arg, &self.decl_names),
                ));
                continue;
            }
            if param_is_wrapper {
                let name = expr_name(arg, &self.decl_names);
                if let SVal::LazyCompound { region } = &v {
                    if s.nullability_of(region) == NullableKind::NonNullable {
                        out.push((s, kills.clone()));
                        continue;
                    }
                }
                match s.null_constraint(&v) {
                    NullConstraint::Null => {
                        self.diags.push(rules::build_null005(span, &self.func.name));
                        continue;
                    }
                    NullConstraint::Unknown => {
                        self.diags
                            .push(rules::build_null004(span, &self.func.name, &name));
                        continue;
                    }
                    NullConstraint::NotNull => {}
                }
            }

            let mut s = s;
            match param_ty {
                Some(ty) if !matches!(classify_escape(self.program, ty), EscapeKind::NonEscape) => {
                    // pointer-to-pointer argument: escape each level
                    match escape::escape_pointer_chain(&s, self.program, ty, &v) {
                        EscapeOutcome::Recorded(next) => s = next,
                        EscapeOutcome::Volatile { poisoned, region } => {
                            self.diags.push(rules::build_null008(
                                span,
                                &self.func.name,
                                &region_name(&region, &self.decl_names),
                            ));
                            s = poisoned;
                        }
                    }
                }
                Some(_) => {}
                None => {
                    // unknown signature: the address of a pointer lvalue
                    // must be assumed to escape mutably
                    if let SVal::LocRegion(r) = &v {
                        let target_is_pointer = self
                            .region_decl_type(r)
                            .map(|t| {
                                matches!(self.category_of(t), TypeCategory::RawPointer { .. })
                            })
                            .unwrap_or(false);
                        if target_is_pointer {
                            let current = s.lookup(r).cloned().unwrap_or(SVal::Unknown);
                            let constraint = s.null_constraint(&current);
                            s = escape::record(
                                &s,
                                (**r).clone(),
                                EscapeRecord {
                                    constraint,
                                    validity: ConstraintValidity::Valid,
                                },
                            );
                        }
                    }
                }
            }
            out.push((s, kills.clone()));
        }
        out
    }

    /// PostCall: invalidate escaped records, rebind the non-local set
    /// and by-reference arguments to fresh unknowns.
    fn post_call(&mut self, state: State, kills: Vec<Region>, span: Option<&Span>) -> State {
        let mut state = escape::invalidate_on_call(&state);

        let non_local: Vec<Region> = state.non_local.iter().cloned().collect();
        for region in non_local {
            state = self.invalidate_region(state, region, span);
        }
        for region in kills {
            state = self.invalidate_region(state, region, span);
        }
        state
    }

    fn invalidate_region(&mut self, state: State, region: Region, span: Option<&Span>) -> State {
        let mut state = state;
        if let Some(old) = state.lookup(&region).cloned() {
            if state.null_constraint(&old) == NullConstraint::NotNull
                && state.nullability_of(&region) != NullableKind::NonNullable
            {
                state = state.record_invalidation(
                    region.clone(),
                    span.cloned(),
                    "proof invalidated by call here",
                );
            }
        }
        let fresh = self.fresh_symbol(Some(region.clone()));
        if state.nullability_of(&region) == NullableKind::NonNullable {
            if let Some(id) = fresh.as_symbol() {
                state.constraints = state.constraints.set(id, NullConstraint::NotNull);
            }
        }
        state.bind(region, fresh)
    }

    fn conjure_return(&mut self, ret_ty: Option<TypeId>, span: Option<&Span>) -> ConjuredReturn {
        let Some(ty) = ret_ty else {
            let v = self.fresh_symbol(None);
            self.note_call_result(&v, span);
            return ConjuredReturn::Plain(v);
        };
        if matches!(self.program.types.get(ty), Type::Void) {
            return ConjuredReturn::Plain(SVal::Unknown);
        }
        match self.category_of(ty) {
            TypeCategory::NonNullableWrapper { .. } => {
                let v = self.fresh_symbol(None);
                ConjuredReturn::Wrapper(v)
            }
            _ => {
                let v = self.fresh_symbol(None);
                self.note_call_result(&v, span);
                ConjuredReturn::Plain(v)
            }
        }
    }

    fn note_call_result(&mut self, v: &SVal, span: Option<&Span>) {
        if let (Some(id), Some(span)) = (v.as_symbol(), span) {
            self.sym_origins.insert(
                id,
                (
                    span.clone(),
                    "nullable pointer returned from call here".into(),
                ),
            );
        }
    }

    fn invoke_lambda(
        &mut self,
        state: State,
        call: &Expr,
        lambda_id: u32,
        _args: &[Expr],
    ) -> EvalStates {
        let Some((captures, body)) = self.lambdas.get(&lambda_id).copied() else {
            return self.eval_opaque_call(state, call, None, &[]);
        };

        // by-value captures resolve to the closure's snapshot storage
        let mut saved = Vec::new();
        for cap in captures {
            if !cap.by_ref {
                let snapshot = Region::Temp {
                    expr: nullguard_ir::ExprId(lambda_id),
                    extended: true,
                }
                .field(self.decl_name(cap.decl));
                saved.push((cap.decl, self.capture_overrides.insert(cap.decl, snapshot)));
            }
        }

        let outcomes = self.exec_stmt(state, body);

        for (decl, old) in saved {
            match old {
                Some(region) => {
                    self.capture_overrides.insert(decl, region);
                }
                None => {
                    self.capture_overrides.remove(&decl);
                }
            }
        }

        outcomes
            .into_iter()
            .map(|o| match o {
                Outcome::Return(s)
                | Outcome::Next(s)
                | Outcome::Break(s)
                | Outcome::Continue(s) => (s, SVal::Unknown),
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn exec_stmt(&mut self, state: State, stmt: &Stmt) -> Vec<Outcome> {
        if !self.charge() {
            return Vec::new();
        }
        match &stmt.kind {
            StmtKind::Compound(stmts) => {
                let mut current = vec![state];
                let mut finished = Vec::new();
                for s in stmts {
                    let mut next = Vec::new();
                    for st in current {
                        for o in self.exec_stmt(st, s) {
                            match o {
                                Outcome::Next(st) => next.push(st),
                                other => finished.push(other),
                            }
                        }
                    }
                    current = next;
                    if current.is_empty() {
                        break;
                    }
                }
                finished.extend(current.into_iter().map(Outcome::Next));
                finished
            }
            StmtKind::Decl(var) => self.exec_decl(state, var, stmt.span.as_ref()),
            StmtKind::Expr(e) => self
                .eval_expr(state, e)
                .into_iter()
                .map(|(s, _)| Outcome::Next(s))
                .collect(),
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let (t, f) = self.eval_as_cond(state, cond);
                let mut out = Vec::new();
                for s in t {
                    out.extend(self.exec_stmt(s, then_branch));
                }
                for s in f {
                    match else_branch {
                        Some(e) => out.extend(self.exec_stmt(s, e)),
                        None => out.push(Outcome::Next(s)),
                    }
                }
                out
            }
            StmtKind::While { cond, body } => self.exec_loop(state, Some(cond), body, None, false),
            StmtKind::DoWhile { body, cond } => self.exec_loop(state, Some(cond), body, None, true),
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                let mut states = vec![state];
                let mut out = Vec::new();
                if let Some(init) = init {
                    let mut next = Vec::new();
                    for s in states {
                        for o in self.exec_stmt(s, init) {
                            match o {
                                Outcome::Next(s) => next.push(s),
                                other => out.push(other),
                            }
                        }
                    }
                    states = next;
                }
                for s in states {
                    out.extend(self.exec_loop(s, cond.as_ref(), body, step.as_ref(), false));
                }
                out
            }
            StmtKind::Switch { cond, cases } => self.exec_switch(state, cond, cases),
            StmtKind::Return(value) => match value {
                Some(e) => self
                    .eval_expr(state, e)
                    .into_iter()
                    .map(|(s, _)| Outcome::Return(s))
                    .collect(),
                None => vec![Outcome::Return(state)],
            },
            StmtKind::Break => vec![Outcome::Break(state)],
            StmtKind::Continue => vec![Outcome::Continue(state)],
            StmtKind::Assert(cond) => {
                // the false arm does not continue; the proof holds for
                // every following statement
                let (t, _f) = self.eval_as_cond(state, cond);
                t.into_iter().map(Outcome::Next).collect()
            }
        }
    }

    fn exec_decl(&mut self, state: State, var: &VarDecl, span: Option<&Span>) -> Vec<Outcome> {
        let region = self.decl_region(var.decl);
        let ty = var.ty;

        // references bind to their initializer's lvalue
        if self.program.types.is_reference(ty) {
            let Some(init) = &var.init else {
                return vec![Outcome::Next(state)];
            };
            let referent_is_pointer = self
                .program
                .types
                .pointee(self.program.types.strip_reference(ty))
                .is_some();
            let volatile_ptr_ref =
                self.program.types.is_volatile_reference(ty) && referent_is_pointer;
            let mut out = Vec::new();
            for (s, referent) in self.eval_lvalue(state.clone(), init) {
                let mut s = s.bind(region.clone(), SVal::loc(referent.clone()));
                if volatile_ptr_ref {
                    s = s.set_nullability(referent.clone(), NullableKind::VolatileNullable);
                }
                out.push(Outcome::Next(s));
            }
            return out;
        }

        match &var.init {
            Some(init) => {
                let mut out = Vec::new();
                for (s, v) in self.eval_expr(state.clone(), init) {
                    if let Some(s) =
                        self.bind_value(s, region.clone(), v, Some(ty), span.or(init.span.as_ref()))
                    {
                        let s = s.record_origin(
                            region.clone(),
                            span.cloned().or_else(|| init.span.clone()),
                            "declared as nullable pointer here",
                        );
                        out.push(Outcome::Next(s));
                    }
                }
                out
            }
            None => {
                let category = self.category_of(ty);
                if let TypeCategory::NullableObject { .. } = category {
                    // default-constructed nullable objects hold null
                    let state = alias::create(
                        &state,
                        ObjKey::Region(region),
                        NullConstraint::Null,
                    );
                    return vec![Outcome::Next(state)];
                }
                let init_val = if var.is_static {
                    // statics are zero-initialized
                    match category {
                        TypeCategory::RawPointer { .. } => SVal::ConcreteNull,
                        _ => SVal::Unknown,
                    }
                } else {
                    SVal::Undef
                };
                vec![Outcome::Next(state.bind(region, init_val))]
            }
        }
    }

    fn exec_switch(&mut self, state: State, cond: &Expr, cases: &[SwitchCase]) -> Vec<Outcome> {
        let span = cond.span.clone();
        let cond_is_pointer = self
            .static_type_of(cond)
            .map(|t| matches!(self.category_of(t), TypeCategory::RawPointer { .. }))
            .unwrap_or(false);
        let labels_cover_zero = cases.iter().any(|c| c.label == Some(0));

        let mut out = Vec::new();
        for (s, v) in self.eval_expr(state, cond) {
            for (i, case) in cases.iter().enumerate() {
                let mut arm = s.clone();
                if cond_is_pointer {
                    let refined = match case.label {
                        Some(0) => self.assume_value(&arm, &v, false, span.as_ref()),
                        Some(_) => self.assume_value(&arm, &v, true, span.as_ref()),
                        None if labels_cover_zero => {
                            self.assume_value(&arm, &v, true, span.as_ref())
                        }
                        None => Some(arm.clone()),
                    };
                    match refined {
                        Some(r) => arm = r,
                        None => continue,
                    }
                } else if let (SVal::ConcreteInt(cv), Some(label)) = (&v, case.label) {
                    if *cv != label {
                        continue;
                    }
                }
                out.extend(self.exec_case_chain(arm, cases, i));
            }
        }
        out
    }

    /// Execute a case body and fall through to the following cases until
    /// a `break`.
    fn exec_case_chain(&mut self, state: State, cases: &[SwitchCase], start: usize) -> Vec<Outcome> {
        let mut current = vec![state];
        let mut finished = Vec::new();
        for case in &cases[start..] {
            for stmt in &case.body {
                let mut next = Vec::new();
                for s in current {
                    for o in self.exec_stmt(s, stmt) {
                        match o {
                            Outcome::Next(s) => next.push(s),
                            // a break inside a switch exits the switch
                            // without touching any loop weakening
                            Outcome::Break(s) => finished.push(Outcome::Next(s)),
                            other => finished.push(other),
                        }
                    }
                }
                current = next;
                if current.is_empty() {
                    break;
                }
            }
            if current.is_empty() {
                break;
            }
        }
        finished.extend(current.into_iter().map(Outcome::Next));
        finished
    }

    // ------------------------------------------------------------------
    // Loops
    // ------------------------------------------------------------------

    fn exec_loop(
        &mut self,
        state: State,
        cond: Option<&Expr>,
        body: &Stmt,
        step: Option<&Expr>,
        is_do_while: bool,
    ) -> Vec<Outcome> {
        let weaken = {
            let decl_types = &self.decl_types;
            let program = self.program;
            let globals = &self.globals;
            let params = &self.params;
            let capture_overrides = &self.capture_overrides;
            let state_ref = &state;
            let decl_is_pointer = |d: DeclId| {
                decl_types
                    .get(&d)
                    .map(|ty| matches!(classify(program, *ty), TypeCategory::RawPointer { .. }))
                    .unwrap_or(false)
            };
            let not_null_at_entry = |d: DeclId| {
                let region = decl_region_for(d, globals, params, capture_overrides);
                state_ref
                    .lookup(&region)
                    .map(|v| state_ref.null_constraint(v) == NullConstraint::NotNull)
                    .unwrap_or(false)
            };
            loops::weaken_map_for_loop(
                self.program,
                body,
                step,
                &decl_is_pointer,
                &not_null_at_entry,
            )
        };

        let frame_key = cond.map(|c| c.id).unwrap_or(nullguard_ir::ExprId(0));
        let state = state.push_loop(frame_key, weaken);

        let mut outcomes = Vec::new();
        let (entry_states, exit_states) = match (cond, is_do_while) {
            (Some(c), false) => self.eval_as_cond(state, c),
            _ => (vec![state], Vec::new()),
        };
        for s in exit_states {
            outcomes.push(Outcome::Next(s.pop_loop()));
        }

        for s in entry_states {
            for o in self.exec_stmt(s, body) {
                match o {
                    Outcome::Break(s) => {
                        // PostBreak: pending weakening is dropped
                        outcomes.push(Outcome::Next(s.clear_weaken().pop_loop()));
                    }
                    Outcome::Return(s) => outcomes.push(Outcome::Return(s.pop_loop())),
                    Outcome::Next(s) | Outcome::Continue(s) => {
                        if is_do_while {
                            // first condition evaluation sees the concrete
                            // iteration; only the repeat arm is widened
                            if let Some(c) = cond {
                                let (t1, f1) = self.eval_as_cond(s, c);
                                for fs in f1 {
                                    outcomes.push(Outcome::Next(fs.pop_loop()));
                                }
                                for ts in t1 {
                                    outcomes.extend(self.back_edge(ts, cond, step));
                                }
                            }
                        } else {
                            outcomes.extend(self.back_edge(s, cond, step));
                        }
                    }
                }
            }
        }
        outcomes
    }

    /// The widening point: weaken loop-modified bindings, then re-check
    /// the condition once against the widened store. A condition still
    /// constrained true has reached the widened fixed point; that path
    /// stops here.
    fn back_edge(&mut self, state: State, cond: Option<&Expr>, step: Option<&Expr>) -> Vec<Outcome> {
        let mut states = vec![state];
        if let Some(step) = step {
            let mut next = Vec::new();
            for s in states {
                for (s2, _) in self.eval_expr(s, step) {
                    next.push(s2);
                }
            }
            states = next;
        }

        let mut outcomes = Vec::new();
        for s in states {
            let weakened = self.apply_weakening(s);
            if let Some(c) = cond {
                let (_still_true, exits) = self.eval_as_cond(weakened, c);
                for fs in exits {
                    outcomes.push(Outcome::Next(fs.pop_loop()));
                }
                // still-true states are sunk: the widening budget is spent
            }
            // a loop without a condition only exits via break or return
        }
        outcomes
    }

    /// Rebind every weaken-marked lvalue: invariant marks carry the
    /// previous value's null constraint to the fresh symbol, variant
    /// marks lose everything.
    fn apply_weakening(&mut self, state: State) -> State {
        let marks: Vec<(DeclId, Weakening)> = state.weaken.iter().map(|(d, w)| (*d, *w)).collect();
        let mut state = state;
        for (decl, weakening) in marks {
            let region = self.decl_region(decl);
            let carried = match weakening {
                Weakening::Invariant => state
                    .lookup(&region)
                    .map(|v| state.null_constraint(v))
                    .unwrap_or(NullConstraint::Unknown),
                Weakening::Variant => NullConstraint::Unknown,
            };
            let fresh = self.fresh_symbol(Some(region.clone()));
            if carried != NullConstraint::Unknown {
                if let Some(id) = fresh.as_symbol() {
                    state.constraints = state.constraints.set(id, carried);
                }
            }
            state = state.bind(region, fresh);
        }
        state
    }
}

/// Region spelling for diagnostics.
fn region_name(region: &Region, names: &FxHashMap<DeclId, String>) -> String {
    match region {
        Region::StackLocal { decl } | Region::StackArg { decl } | Region::Global { decl, .. } => {
            names
                .get(decl)
                .cloned()
                .unwrap_or_else(|| format!("decl#{}", decl.0))
        }
        Region::Field { base, field } => format!("{}.{}", region_name(base, names), field),
        Region::Element { base, index } => format!("{}[{}]", region_name(base, names), index),
        Region::Symbolic(_) => "<referenced storage>".to_string(),
        Region::Temp { .. } => "<temporary>".to_string(),
        Region::Code { function } => function.clone(),
        Region::UnknownSpace => "<unknown>".to_string(),
    }
}

/// Best-effort spelling of an expression for diagnostics.
fn expr_name(expr: &Expr, names: &FxHashMap<DeclId, String>) -> String {
    match &expr.kind {
        ExprKind::DeclRef(d) => names
            .get(d)
            .cloned()
            .unwrap_or_else(|| format!("decl#{}", d.0)),
        ExprKind::This => "this".to_string(),
        ExprKind::Unary {
            op: UnaryOp::Deref,
            operand,
        } => format!("*{}", expr_name(operand, names)),
        ExprKind::Member {
            base,
            field,
            is_arrow,
        } => {
            let sep = if *is_arrow { "->" } else { "." };
            format!("{}{}{}", expr_name(base, names), sep, field)
        }
        ExprKind::Call {
            callee: Callee::Named(name),
            ..
        } => format!("{name}(..)"),
        ExprKind::Cast { operand, .. } => expr_name(operand, names),
        _ => "<expr>".to_string(),
    }
}

fn decl_region_for(
    decl: DeclId,
    globals: &FxHashMap<DeclId, bool>,
    params: &FxHashSet<DeclId>,
    capture_overrides: &FxHashMap<DeclId, Region>,
) -> Region {
    if let Some(region) = capture_overrides.get(&decl) {
        return region.clone();
    }
    if let Some(is_const) = globals.get(&decl) {
        let space = if *is_const {
            GlobalSpace::Immutable
        } else {
            GlobalSpace::Internal
        };
        return Region::Global { decl, space };
    }
    if params.contains(&decl) {
        return Region::StackArg { decl };
    }
    Region::StackLocal { decl }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nullguard_ir::ProgramBuilder;

    fn analyze(program: &Program) -> Vec<Diagnostic> {
        Analyzer::analyze(program)
    }

    #[test]
    fn test_plain_deref_of_param_reports() {
        let mut b = ProgramBuilder::new();
        let int = b.types.int();
        let ptr = b.types.pointer(int);
        let mut f = b.function("f").returns(int);
        let p = f.param("p", ptr);
        f.body(Stmt::ret(Expr::deref(Expr::var(p))));
        let diags = analyze(&b.finish());
        assert_eq!(diags.len(), 1, "expected one diagnostic, got {diags:?}");
        assert_eq!(diags[0].rule, "NULL001");
    }

    #[test]
    fn test_guarded_deref_is_clean() {
        let mut b = ProgramBuilder::new();
        let int = b.types.int();
        let ptr = b.types.pointer(int);
        let mut f = b.function("f").returns(int);
        let p = f.param("p", ptr);
        f.body(Stmt::block(vec![
            Stmt::if_(Expr::var(p), Stmt::ret(Expr::deref(Expr::var(p)))),
            Stmt::ret(Expr::int(0)),
        ]));
        let diags = analyze(&b.finish());
        assert!(diags.is_empty(), "expected clean, got {diags:?}");
    }

    #[test]
    fn test_deref_after_failed_guard_reports_nullptr() {
        let mut b = ProgramBuilder::new();
        let int = b.types.int();
        let ptr = b.types.pointer(int);
        let mut f = b.function("f").returns(int);
        let p = f.param("p", ptr);
        // while (p) {} return *p;  — the exit arm knows p is null
        f.body(Stmt::block(vec![
            Stmt::while_(Expr::var(p), Stmt::block(vec![])),
            Stmt::ret(Expr::deref(Expr::var(p))),
        ]));
        let diags = analyze(&b.finish());
        assert_eq!(diags.len(), 1, "got {diags:?}");
        assert_eq!(diags[0].rule, "NULL002");
    }

    #[test]
    fn test_budget_limits_exploration() {
        let mut b = ProgramBuilder::new();
        let int = b.types.int();
        let ptr = b.types.pointer(int);
        let mut f = b.function("f").returns(int);
        let p = f.param("p", ptr);
        f.body(Stmt::ret(Expr::deref(Expr::var(p))));
        let program = b.finish();
        let func = program.function("f").unwrap();
        let diags = Analyzer::analyze_function(
            &program,
            func,
            &AnalysisOptions { max_path_nodes: 1 },
        );
        assert!(diags.is_empty(), "budget should cut exploration short");
    }

    #[test]
    fn test_assert_establishes_proof() {
        let mut b = ProgramBuilder::new();
        let int = b.types.int();
        let ptr = b.types.pointer(int);
        let mut f = b.function("f").returns(int);
        let p = f.param("p", ptr);
        f.body(Stmt::block(vec![
            Stmt::assert(Expr::var(p)),
            Stmt::ret(Expr::deref(Expr::var(p))),
        ]));
        let diags = analyze(&b.finish());
        assert!(diags.is_empty(), "assert should prove p, got {diags:?}");
    }

    #[test]
    fn test_null_assignment_invalidates() {
        let mut b = ProgramBuilder::new();
        let int = b.types.int();
        let ptr = b.types.pointer(int);
        let mut f = b.function("f").returns(int);
        let p = f.param("p", ptr);
        f.body(Stmt::block(vec![
            Stmt::if_(
                Expr::var(p),
                Stmt::block(vec![
                    Stmt::expr(Expr::assign(Expr::var(p), Expr::null())),
                    Stmt::ret(Expr::deref(Expr::var(p))),
                ]),
            ),
            Stmt::ret(Expr::int(0)),
        ]));
        let diags = analyze(&b.finish());
        assert_eq!(diags.len(), 1, "got {diags:?}");
        assert_eq!(diags[0].rule, "NULL002");
    }

    #[test]
    fn test_new_is_not_null_but_noexcept_new_is_nullable() {
        let mut b = ProgramBuilder::new();
        let int = b.types.int();
        let ptr = b.types.pointer(int);
        let local = b.fresh_decl();
        let local2 = b.fresh_decl();
        let f = b.function("f").returns(int);
        f.body(Stmt::block(vec![
            Stmt::decl(local, "a", ptr, Some(Expr::new_expr(int))),
            Stmt::expr(Expr::deref(Expr::var(local))),
            Stmt::decl(local2, "b", ptr, Some(Expr::new_noexcept(int))),
            Stmt::ret(Expr::deref(Expr::var(local2))),
        ]));
        let diags = analyze(&b.finish());
        assert_eq!(diags.len(), 1, "got {diags:?}");
        assert_eq!(diags[0].rule, "NULL001");
    }

    #[test]
    fn test_undefined_local_read_reports() {
        let mut b = ProgramBuilder::new();
        let int = b.types.int();
        let ptr = b.types.pointer(int);
        let local = b.fresh_decl();
        let f = b.function("f").returns(int);
        f.body(Stmt::block(vec![
            Stmt::decl(local, "q", ptr, None),
            Stmt::ret(Expr::deref(Expr::var(local))),
        ]));
        let diags = analyze(&b.finish());
        assert_eq!(diags.len(), 1, "got {diags:?}");
        assert_eq!(diags[0].rule, "NULL006");
    }

    #[test]
    fn test_static_local_pointer_is_zero_initialized() {
        let mut b = ProgramBuilder::new();
        let int = b.types.int();
        let ptr = b.types.pointer(int);
        let local = b.fresh_decl();
        let f = b.function("f").returns(int);
        let mut decl = Stmt::decl(local, "cache", ptr, None);
        if let StmtKind::Decl(var) = &mut decl.kind {
            var.is_static = true;
        }
        f.body(Stmt::block(vec![
            decl,
            Stmt::ret(Expr::deref(Expr::var(local))),
        ]));
        let diags = analyze(&b.finish());
        assert_eq!(diags.len(), 1, "got {diags:?}");
        assert_eq!(diags[0].rule, "NULL002");
    }

    #[test]
    fn test_conditional_operator_refines_arms() {
        let mut b = ProgramBuilder::new();
        let int = b.types.int();
        let ptr = b.types.pointer(int);
        let mut f = b.function("f").returns(int);
        let p = f.param("p", ptr);
        // return p ? *p : 0;
        f.body(Stmt::ret(Expr::conditional(
            Expr::var(p),
            Expr::deref(Expr::var(p)),
            Expr::int(0),
        )));
        let diags = analyze(&b.finish());
        assert!(diags.is_empty(), "got {diags:?}");
    }

    #[test]
    fn test_this_deref_never_reports() {
        let mut b = ProgramBuilder::new();
        let int = b.types.int();
        let f = b.function("Widget::size").returns(int).method();
        f.body(Stmt::ret(Expr::deref(Expr::this())));
        let diags = analyze(&b.finish());
        assert!(diags.is_empty(), "got {diags:?}");
    }

    #[test]
    fn test_deterministic_output_order() {
        let mut b = ProgramBuilder::new();
        let int = b.types.int();
        let ptr = b.types.pointer(int);
        let mut f = b.function("late").returns(int);
        let p = f.param("p", ptr);
        f.body(Stmt::ret(Expr::deref(Expr::var(p)).at("input.cpp", 9)));
        let mut g = b.function("early").returns(int);
        let q = g.param("q", ptr);
        g.body(Stmt::ret(Expr::deref(Expr::var(q)).at("input.cpp", 3)));
        let diags = analyze(&b.finish());
        assert_eq!(diags.len(), 2, "got {diags:?}");
        assert_eq!(
            (diags[0].location.line, diags[1].location.line),
            (3, 9),
            "diagnostics are ordered by location, not discovery"
        );
    }
}
