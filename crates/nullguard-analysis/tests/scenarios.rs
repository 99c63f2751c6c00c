//! End-to-end verdicts over whole function bodies.
//!
//! Each case builds a small program the way the frontend bridge would
//! emit it and checks which rule fires, if any.

use nullguard_analysis::Analyzer;
use nullguard_diagnostics::Diagnostic;
use nullguard_ir::{Capture, CastKind, Expr, Program, ProgramBuilder, Stmt, SwitchCase};

fn rules(diags: &[Diagnostic]) -> Vec<&str> {
    diags.iter().map(|d| d.rule.as_str()).collect()
}

fn assert_clean(program: &Program) {
    let diags = Analyzer::analyze(program);
    assert!(diags.is_empty(), "expected clean, got {diags:#?}");
}

fn assert_rules(program: &Program, expected: &[&str]) {
    let diags = Analyzer::analyze(program);
    assert_eq!(
        rules(&diags),
        expected,
        "unexpected verdicts: {diags:#?}"
    );
}

#[test]
fn unguarded_param_deref_reports() {
    // { return *p; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::ret(Expr::deref(Expr::var(p))));
    assert_rules(&b.finish(), &["NULL001"]);
}

#[test]
fn if_guard_proves_deref() {
    // { if (p) return *p; return 0; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::block(vec![
        Stmt::if_(Expr::var(p), Stmt::ret(Expr::deref(Expr::var(p)))),
        Stmt::ret(Expr::int(0)),
    ]));
    assert_clean(&b.finish());
}

#[test]
fn early_return_guard_proves_tail() {
    // { if (!p) return 0; return *p; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::block(vec![
        Stmt::if_(Expr::not(Expr::var(p)), Stmt::ret(Expr::int(0))),
        Stmt::ret(Expr::deref(Expr::var(p))),
    ]));
    assert_clean(&b.finish());
}

#[test]
fn while_condition_proves_body() {
    // { while (p) { return *p; } return 0; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::block(vec![
        Stmt::while_(Expr::var(p), Stmt::ret(Expr::deref(Expr::var(p)))),
        Stmt::ret(Expr::int(0)),
    ]));
    assert_clean(&b.finish());
}

#[test]
fn alias_guard_proves_original() {
    // { int *q = p; if (q) return *p; return 0; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let q = b.fresh_decl();
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::block(vec![
        Stmt::decl(q, "q", ptr, Some(Expr::var(p))),
        Stmt::if_(Expr::var(q), Stmt::ret(Expr::deref(Expr::var(p)))),
        Stmt::ret(Expr::int(0)),
    ]));
    assert_clean(&b.finish());
}

#[test]
fn call_preserves_local_param_proof() {
    // { if (p) { opaque(); return *p; } return 0; } — p is a local copy
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let void = b.types.void();
    let ptr = b.types.pointer(int);
    b.declare_extern("opaque", vec![], void);
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::block(vec![
        Stmt::if_(
            Expr::var(p),
            Stmt::block(vec![
                Stmt::expr(Expr::call("opaque", vec![])),
                Stmt::ret(Expr::deref(Expr::var(p))),
            ]),
        ),
        Stmt::ret(Expr::int(0)),
    ]));
    assert_clean(&b.finish());
}

#[test]
fn call_invalidates_global_proof() {
    // { if (g) { opaque(); return *g; } return 0; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let void = b.types.void();
    let ptr = b.types.pointer(int);
    b.declare_extern("opaque", vec![], void);
    let g = b.add_global("g", ptr, false);
    let f = b.function("f").returns(int);
    f.body(Stmt::block(vec![
        Stmt::if_(
            Expr::var(g),
            Stmt::block(vec![
                Stmt::expr(Expr::call("opaque", vec![])),
                Stmt::ret(Expr::deref(Expr::var(g))),
            ]),
        ),
        Stmt::ret(Expr::int(0)),
    ]));
    assert_rules(&b.finish(), &["NULL001"]);
}

#[test]
fn global_proof_survives_without_calls() {
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let g = b.add_global("g", ptr, false);
    let f = b.function("f").returns(int);
    f.body(Stmt::block(vec![
        Stmt::if_(Expr::var(g), Stmt::ret(Expr::deref(Expr::var(g)))),
        Stmt::ret(Expr::int(0)),
    ]));
    assert_clean(&b.finish());
}

#[test]
fn call_invalidates_reference_param_proof() {
    // int f(int *&p) { if (p) { opaque(); return *p; } return 0; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let void = b.types.void();
    let ptr = b.types.pointer(int);
    let ref_ptr = b.types.reference(ptr);
    b.declare_extern("opaque", vec![], void);
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ref_ptr);
    f.body(Stmt::block(vec![
        Stmt::if_(
            Expr::var(p),
            Stmt::block(vec![
                Stmt::expr(Expr::call("opaque", vec![])),
                Stmt::ret(Expr::deref(Expr::var(p))),
            ]),
        ),
        Stmt::ret(Expr::int(0)),
    ]));
    assert_rules(&b.finish(), &["NULL001"]);
}

#[test]
fn wrapper_from_unproven_pointer_reports() {
    // { not_null<int*> n = p; return *n; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let rec = b.not_null_record(ptr);
    let wrapper = b.types.record(rec);
    let n = b.fresh_decl();
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::block(vec![
        Stmt::decl(n, "n", wrapper, Some(Expr::var(p))),
        Stmt::ret(Expr::deref(Expr::cast(
            CastKind::WrapperToPointer,
            Expr::var(n),
        ))),
    ]));
    assert_rules(&b.finish(), &["NULL004"]);
}

#[test]
fn wrapper_from_proven_pointer_is_clean() {
    // { if (!p) return 0; not_null<int*> n = p; return *n; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let rec = b.not_null_record(ptr);
    let wrapper = b.types.record(rec);
    let n = b.fresh_decl();
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::block(vec![
        Stmt::if_(Expr::not(Expr::var(p)), Stmt::ret(Expr::int(0))),
        Stmt::decl(n, "n", wrapper, Some(Expr::var(p))),
        Stmt::ret(Expr::deref(Expr::cast(
            CastKind::WrapperToPointer,
            Expr::var(n),
        ))),
    ]));
    assert_clean(&b.finish());
}

#[test]
fn wrapper_from_null_literal_reports() {
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let rec = b.not_null_record(ptr);
    let wrapper = b.types.record(rec);
    let n = b.fresh_decl();
    let f = b.function("f").returns(int);
    f.body(Stmt::block(vec![
        Stmt::decl(n, "n", wrapper, Some(Expr::null())),
        Stmt::ret(Expr::int(0)),
    ]));
    assert_rules(&b.finish(), &["NULL005"]);
}

#[test]
fn make_not_null_is_checked_at_call_site() {
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::ret(Expr::deref(Expr::call(
        "gsl::make_not_null",
        vec![Expr::var(p)],
    ))));
    assert_rules(&b.finish(), &["NULL004"]);
}

#[test]
fn volatile_reference_is_never_provable() {
    // { volatile int * &r = p; if (r) return *r; return 0; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let vref = b.types.reference_cv(ptr, false, true);
    let r = b.fresh_decl();
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::block(vec![
        Stmt::decl(r, "r", vref, Some(Expr::var(p))),
        Stmt::if_(Expr::var(r), Stmt::ret(Expr::deref(Expr::var(r)))),
        Stmt::ret(Expr::int(0)),
    ]));
    assert_rules(&b.finish(), &["NULL001"]);
}

#[test]
fn escaped_pointer_invalidated_by_call() {
    // { gpp = &p; opaque(); return *p; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let void = b.types.void();
    let ptr = b.types.pointer(int);
    let ptr_ptr = b.types.pointer(ptr);
    b.declare_extern("opaque", vec![], void);
    let gpp = b.add_global("gpp", ptr_ptr, false);
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::block(vec![
        Stmt::if_(Expr::not(Expr::var(p)), Stmt::ret(Expr::int(0))),
        Stmt::expr(Expr::assign(Expr::var(gpp), Expr::addr_of(Expr::var(p)))),
        Stmt::expr(Expr::call("opaque", vec![])),
        Stmt::ret(Expr::deref(Expr::var(p))),
    ]));
    assert_rules(&b.finish(), &["NULL001"]);
}

#[test]
fn escaped_pointer_still_proven_before_call() {
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let ptr_ptr = b.types.pointer(ptr);
    let gpp = b.add_global("gpp", ptr_ptr, false);
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::block(vec![
        Stmt::if_(Expr::not(Expr::var(p)), Stmt::ret(Expr::int(0))),
        Stmt::expr(Expr::assign(Expr::var(gpp), Expr::addr_of(Expr::var(p)))),
        Stmt::ret(Expr::deref(Expr::var(p))),
    ]));
    assert_clean(&b.finish());
}

#[test]
fn volatile_escape_poisons_region() {
    // { gvpp = &p; ... } with gvpp : int * volatile *
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let vol_ptr_ptr = b.types.pointer_cv(ptr, false, true);
    let gvpp = b.add_global("gvpp", vol_ptr_ptr, false);
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::block(vec![
        Stmt::expr(Expr::assign(Expr::var(gvpp), Expr::addr_of(Expr::var(p)))),
        Stmt::ret(Expr::int(0)),
    ]));
    assert_rules(&b.finish(), &["NULL008"]);
}

#[test]
fn loop_with_safe_modification_is_clean() {
    // { if (p) { while (*p) { ++p; } } return 0; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::block(vec![
        Stmt::if_(
            Expr::var(p),
            Stmt::while_(
                Expr::deref(Expr::var(p)),
                Stmt::block(vec![Stmt::expr(Expr::pre_inc(Expr::var(p)))]),
            ),
        ),
        Stmt::ret(Expr::int(0)),
    ]));
    assert_clean(&b.finish());
}

#[test]
fn loop_with_opaque_call_modification_reports() {
    // { if (p) { while (*p) { any_call(p); } } return 0; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let void = b.types.void();
    let ptr = b.types.pointer(int);
    let ref_ptr = b.types.reference(ptr);
    b.declare_extern("any_call", vec![ref_ptr], void);
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::block(vec![
        Stmt::if_(
            Expr::var(p),
            Stmt::while_(
                Expr::deref(Expr::var(p)),
                Stmt::block(vec![Stmt::expr(Expr::call(
                    "any_call",
                    vec![Expr::var(p)],
                ))]),
            ),
        ),
        Stmt::ret(Expr::int(0)),
    ]));
    assert_rules(&b.finish(), &["NULL001"]);
}

#[test]
fn loop_exit_establishes_proof_after_safe_fixups() {
    // { int coin; while (!p) { p = &coin; } return *p; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let coin = b.fresh_decl();
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::block(vec![
        Stmt::decl(coin, "coin", int, Some(Expr::int(0))),
        Stmt::while_(
            Expr::not(Expr::var(p)),
            Stmt::block(vec![Stmt::expr(Expr::assign(
                Expr::var(p),
                Expr::addr_of(Expr::var(coin)),
            ))]),
        ),
        Stmt::ret(Expr::deref(Expr::var(p))),
    ]));
    assert_clean(&b.finish());
}

#[test]
fn do_while_exit_constrains_pointer_null() {
    // { do {} while (p); return *p; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::block(vec![
        Stmt::do_while(Stmt::block(vec![]), Expr::var(p)),
        Stmt::ret(Expr::deref(Expr::var(p))),
    ]));
    assert_rules(&b.finish(), &["NULL002"]);
}

#[test]
fn short_circuit_and_proves_rhs() {
    // { if (p && *p) return *p; return 0; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::block(vec![
        Stmt::if_(
            Expr::land(Expr::var(p), Expr::deref(Expr::var(p))),
            Stmt::ret(Expr::deref(Expr::var(p))),
        ),
        Stmt::ret(Expr::int(0)),
    ]));
    assert_clean(&b.finish());
}

#[test]
fn short_circuit_or_proves_rhs() {
    // { if (!p || *p == 0) return 0; return *p; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::block(vec![
        Stmt::if_(
            Expr::lor(
                Expr::not(Expr::var(p)),
                Expr::eq(Expr::deref(Expr::var(p)), Expr::int(0)),
            ),
            Stmt::ret(Expr::int(0)),
        ),
        Stmt::ret(Expr::deref(Expr::var(p))),
    ]));
    assert_clean(&b.finish());
}

#[test]
fn null_comparison_refines_both_arms() {
    // { if (p != nullptr) return *p; return 0; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::block(vec![
        Stmt::if_(
            Expr::ne(Expr::var(p), Expr::null()),
            Stmt::ret(Expr::deref(Expr::var(p))),
        ),
        Stmt::ret(Expr::deref(Expr::var(p))),
    ]));
    // the else-path deref sees a pointer constrained null
    assert_rules(&b.finish(), &["NULL002"]);
}

#[test]
fn switch_on_pointer_refines_cases() {
    // switch (p) { case 0: return 0; default: return *p; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::switch(
        Expr::var(p),
        vec![
            SwitchCase {
                label: Some(0),
                body: vec![Stmt::ret(Expr::int(0))],
            },
            SwitchCase {
                label: None,
                body: vec![Stmt::ret(Expr::deref(Expr::var(p)))],
            },
        ],
    ));
    assert_clean(&b.finish());
}

#[test]
fn switch_fallthrough_carries_proof() {
    // switch (c) { case 1: p = new int;  case 2: return *p;  default: return 0; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let mut f = b.function("f").returns(int);
    let c = f.param("c", int);
    let p = f.param("p", ptr);
    f.body(Stmt::switch(
        Expr::var(c),
        vec![
            SwitchCase {
                label: Some(1),
                body: vec![Stmt::expr(Expr::assign(
                    Expr::var(p),
                    Expr::new_expr(int),
                ))],
            },
            SwitchCase {
                label: Some(2),
                body: vec![Stmt::ret(Expr::deref(Expr::var(p)))],
            },
            SwitchCase {
                label: None,
                body: vec![Stmt::ret(Expr::int(0))],
            },
        ],
    ));
    // entering directly at case 2 sees the unproven parameter
    assert_rules(&b.finish(), &["NULL001"]);
}

#[test]
fn array_decay_is_not_null() {
    // { int arr[4]; int *p = arr; return *p; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let arr_ty = b.types.array(int);
    let ptr = b.types.pointer(int);
    let arr = b.fresh_decl();
    let p = b.fresh_decl();
    let f = b.function("f").returns(int);
    f.body(Stmt::block(vec![
        Stmt::decl(arr, "arr", arr_ty, None),
        Stmt::decl(
            p,
            "p",
            ptr,
            Some(Expr::cast(CastKind::ArrayToPointerDecay, Expr::var(arr))),
        ),
        Stmt::ret(Expr::deref(Expr::var(p))),
    ]));
    assert_clean(&b.finish());
}

#[test]
fn std_move_preserves_proof() {
    // { if (!p) return 0; int *q = std::move(p); return *q; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let q = b.fresh_decl();
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::block(vec![
        Stmt::if_(Expr::not(Expr::var(p)), Stmt::ret(Expr::int(0))),
        Stmt::decl(q, "q", ptr, Some(Expr::call("std::move", vec![Expr::var(p)]))),
        Stmt::ret(Expr::deref(Expr::var(q))),
    ]));
    assert_clean(&b.finish());
}

#[test]
fn std_addressof_yields_not_null() {
    // { int x = 0; int *p = std::addressof(x); return *p; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let x = b.fresh_decl();
    let p = b.fresh_decl();
    let f = b.function("f").returns(int);
    f.body(Stmt::block(vec![
        Stmt::decl(x, "x", int, Some(Expr::int(0))),
        Stmt::decl(
            p,
            "p",
            ptr,
            Some(Expr::call("std::addressof", vec![Expr::var(x)])),
        ),
        Stmt::ret(Expr::deref(Expr::var(p))),
    ]));
    assert_clean(&b.finish());
}

#[test]
fn nullable_object_guard_proves_arrow() {
    // { if (o) return o->value; return 0; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let rec = b.nullable_object_record("util::handle", ptr);
    let obj = b.types.record(rec);
    let mut f = b.function("f").returns(int);
    let o = f.param("o", obj);
    f.body(Stmt::block(vec![
        Stmt::if_(Expr::var(o), Stmt::ret(Expr::arrow(Expr::var(o), "value"))),
        Stmt::ret(Expr::int(0)),
    ]));
    assert_clean(&b.finish());
}

#[test]
fn nullable_object_unguarded_arrow_reports() {
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let rec = b.nullable_object_record("util::handle", ptr);
    let obj = b.types.record(rec);
    let mut f = b.function("f").returns(int);
    let o = f.param("o", obj);
    f.body(Stmt::ret(Expr::arrow(Expr::var(o), "value")));
    assert_rules(&b.finish(), &["NULL001"]);
}

#[test]
fn nullable_object_copy_shares_constraint() {
    // { handle c = o; if (c) return o->value; return 0; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let rec = b.nullable_object_record("util::handle", ptr);
    let obj = b.types.record(rec);
    let c = b.fresh_decl();
    let mut f = b.function("f").returns(int);
    let o = f.param("o", obj);
    f.body(Stmt::block(vec![
        Stmt::decl(c, "c", obj, Some(Expr::var(o))),
        Stmt::if_(Expr::var(c), Stmt::ret(Expr::arrow(Expr::var(o), "value"))),
        Stmt::ret(Expr::int(0)),
    ]));
    assert_clean(&b.finish());
}

#[test]
fn nullable_object_reassignment_breaks_alias() {
    // { handle c = o; c = nullptr; if (o) return o->value; return c->value; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let rec = b.nullable_object_record("util::handle", ptr);
    let obj = b.types.record(rec);
    let c = b.fresh_decl();
    let mut f = b.function("f").returns(int);
    let o = f.param("o", obj);
    f.body(Stmt::block(vec![
        Stmt::decl(c, "c", obj, Some(Expr::var(o))),
        Stmt::expr(Expr::assign(Expr::var(c), Expr::null())),
        Stmt::if_(Expr::var(o), Stmt::ret(Expr::arrow(Expr::var(o), "value"))),
        Stmt::ret(Expr::arrow(Expr::var(c), "value")),
    ]));
    // o's constraint is unaffected by c's reassignment; c itself is null
    assert_rules(&b.finish(), &["NULL002"]);
}

#[test]
fn non_const_method_invalidates_object_constraint() {
    // { if (o) { o.reset(); return o->value; } return 0; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let rec = b.nullable_object_record("util::handle", ptr);
    let obj = b.types.record(rec);
    let mut f = b.function("f").returns(int);
    let o = f.param("o", obj);
    f.body(Stmt::block(vec![
        Stmt::if_(
            Expr::var(o),
            Stmt::block(vec![
                Stmt::expr(Expr::method(Expr::var(o), "reset", false, vec![])),
                Stmt::ret(Expr::arrow(Expr::var(o), "value")),
            ]),
        ),
        Stmt::ret(Expr::int(0)),
    ]));
    assert_rules(&b.finish(), &["NULL001"]);
}

#[test]
fn field_write_invalidates_object_constraint() {
    // { if (o) { o.ptr_ = q; return o->value; } return 0; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let rec = b.nullable_object_record("util::handle", ptr);
    let obj = b.types.record(rec);
    let mut f = b.function("f").returns(int);
    let o = f.param("o", obj);
    let q = f.param("q", ptr);
    f.body(Stmt::block(vec![
        Stmt::if_(
            Expr::var(o),
            Stmt::block(vec![
                Stmt::expr(Expr::assign(
                    Expr::member(Expr::var(o), "ptr_"),
                    Expr::var(q),
                )),
                Stmt::ret(Expr::arrow(Expr::var(o), "value")),
            ]),
        ),
        Stmt::ret(Expr::int(0)),
    ]));
    assert_rules(&b.finish(), &["NULL001"]);
}

#[test]
fn object_conversion_inherits_constraint_via_alias() {
    // { if (o) { int *p = o.get(); return *p; } return 0; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let rec = b.nullable_object_record("util::handle", ptr);
    let obj = b.types.record(rec);
    let p = b.fresh_decl();
    let mut f = b.function("f").returns(int);
    let o = f.param("o", obj);
    f.body(Stmt::block(vec![
        Stmt::if_(
            Expr::var(o),
            Stmt::block(vec![
                Stmt::decl(p, "p", ptr, Some(Expr::method(Expr::var(o), "get", true, vec![]))),
                Stmt::ret(Expr::deref(Expr::var(p))),
            ]),
        ),
        Stmt::ret(Expr::int(0)),
    ]));
    assert_clean(&b.finish());
}

#[test]
fn pointer_check_propagates_to_object_alias() {
    // { int *p = o.get(); if (p) return o->value; return 0; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let rec = b.nullable_object_record("util::handle", ptr);
    let obj = b.types.record(rec);
    let p = b.fresh_decl();
    let mut f = b.function("f").returns(int);
    let o = f.param("o", obj);
    f.body(Stmt::block(vec![
        Stmt::decl(p, "p", ptr, Some(Expr::method(Expr::var(o), "get", true, vec![]))),
        Stmt::if_(Expr::var(p), Stmt::ret(Expr::arrow(Expr::var(o), "value"))),
        Stmt::ret(Expr::int(0)),
    ]));
    assert_clean(&b.finish());
}

#[test]
fn lambda_by_value_capture_preserves_proof() {
    // { if (!p) return 0; auto l = [p]() { return *p; }; l(); return 0; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let fn_ty = b.types.function(int, vec![]);
    let l = b.fresh_decl();
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::block(vec![
        Stmt::if_(Expr::not(Expr::var(p)), Stmt::ret(Expr::int(0))),
        Stmt::decl(
            l,
            "l",
            fn_ty,
            Some(Expr::lambda(
                vec![Capture {
                    decl: p,
                    by_ref: false,
                }],
                Stmt::ret(Expr::deref(Expr::var(p))),
            )),
        ),
        Stmt::expr(Expr::call_expr(Expr::var(l), vec![])),
        Stmt::ret(Expr::int(0)),
    ]));
    assert_clean(&b.finish());
}

#[test]
fn lambda_by_ref_capture_invalidated_by_inner_call() {
    // { if (!p) return 0; auto l = [&p]() { opaque(); return *p; }; l(); return 0; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let void = b.types.void();
    let ptr = b.types.pointer(int);
    let fn_ty = b.types.function(int, vec![]);
    b.declare_extern("opaque", vec![], void);
    let l = b.fresh_decl();
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::block(vec![
        Stmt::if_(Expr::not(Expr::var(p)), Stmt::ret(Expr::int(0))),
        Stmt::decl(
            l,
            "l",
            fn_ty,
            Some(Expr::lambda(
                vec![Capture {
                    decl: p,
                    by_ref: true,
                }],
                Stmt::block(vec![
                    Stmt::expr(Expr::call("opaque", vec![])),
                    Stmt::ret(Expr::deref(Expr::var(p))),
                ]),
            )),
        ),
        Stmt::expr(Expr::call_expr(Expr::var(l), vec![])),
        Stmt::ret(Expr::int(0)),
    ]));
    assert_rules(&b.finish(), &["NULL001"]);
}

#[test]
fn lambda_by_ref_capture_without_inner_call_is_clean() {
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let fn_ty = b.types.function(int, vec![]);
    let l = b.fresh_decl();
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::block(vec![
        Stmt::if_(Expr::not(Expr::var(p)), Stmt::ret(Expr::int(0))),
        Stmt::decl(
            l,
            "l",
            fn_ty,
            Some(Expr::lambda(
                vec![Capture {
                    decl: p,
                    by_ref: true,
                }],
                Stmt::ret(Expr::deref(Expr::var(p))),
            )),
        ),
        Stmt::expr(Expr::call_expr(Expr::var(l), vec![])),
        Stmt::ret(Expr::int(0)),
    ]));
    assert_clean(&b.finish());
}

#[test]
fn wrapper_parameter_argument_is_a_conversion_point() {
    // void sink(not_null<int*>); { sink(p); }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let void = b.types.void();
    let ptr = b.types.pointer(int);
    let rec = b.not_null_record(ptr);
    let wrapper = b.types.record(rec);
    b.declare_extern("sink", vec![wrapper], void);
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::block(vec![
        Stmt::expr(Expr::call("sink", vec![Expr::var(p)])),
        Stmt::ret(Expr::int(0)),
    ]));
    assert_rules(&b.finish(), &["NULL004"]);
}

#[test]
fn wrapper_parameter_accepts_proven_argument() {
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let void = b.types.void();
    let ptr = b.types.pointer(int);
    let rec = b.not_null_record(ptr);
    let wrapper = b.types.record(rec);
    b.declare_extern("sink", vec![wrapper], void);
    let mut f = b.function("f").returns(int);
    let p = f.param("p", ptr);
    f.body(Stmt::block(vec![
        Stmt::if_(Expr::not(Expr::var(p)), Stmt::ret(Expr::int(0))),
        Stmt::expr(Expr::call("sink", vec![Expr::var(p)])),
        Stmt::ret(Expr::int(0)),
    ]));
    assert_clean(&b.finish());
}

#[test]
fn wrapper_return_value_is_dereferenceable() {
    // not_null<int*> source(); { return *source(); }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    let rec = b.not_null_record(ptr);
    let wrapper = b.types.record(rec);
    b.declare_extern("source", vec![], wrapper);
    let f = b.function("f").returns(int);
    f.body(Stmt::ret(Expr::deref(Expr::cast(
        CastKind::WrapperToPointer,
        Expr::call("source", vec![]),
    ))));
    assert_clean(&b.finish());
}

#[test]
fn opaque_call_result_requires_proof() {
    // int *get(); { return *get(); }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    b.declare_extern("get", vec![], ptr);
    let f = b.function("f").returns(int);
    f.body(Stmt::ret(Expr::deref(Expr::call("get", vec![]))));
    assert_rules(&b.finish(), &["NULL001"]);
}

#[test]
fn guarded_call_result_is_clean() {
    // int *get(); { int *p = get(); if (p) return *p; return 0; }
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let ptr = b.types.pointer(int);
    b.declare_extern("get", vec![], ptr);
    let p = b.fresh_decl();
    let f = b.function("f").returns(int);
    f.body(Stmt::block(vec![
        Stmt::decl(p, "p", ptr, Some(Expr::call("get", vec![]))),
        Stmt::if_(Expr::var(p), Stmt::ret(Expr::deref(Expr::var(p)))),
        Stmt::ret(Expr::int(0)),
    ]));
    assert_clean(&b.finish());
}

#[test]
fn diagnostic_notes_name_the_invalidating_call() {
    let mut b = ProgramBuilder::new();
    let int = b.types.int();
    let void = b.types.void();
    let ptr = b.types.pointer(int);
    b.declare_extern("opaque", vec![], void);
    let g = b.add_global("g", ptr, false);
    let f = b.function("f").returns(int);
    f.body(Stmt::block(vec![
        Stmt::if_(
            Expr::var(g).at("g.cpp", 4),
            Stmt::block(vec![
                Stmt::expr(Expr::call("opaque", vec![]).at("g.cpp", 5)),
                Stmt::ret(Expr::deref(Expr::var(g)).at("g.cpp", 6)),
            ]),
        ),
        Stmt::ret(Expr::int(0)),
    ]));
    let diags = Analyzer::analyze(&b.finish());
    assert_eq!(rules(&diags), vec!["NULL001"]);
    let notes = &diags[0].notes;
    let kinds: Vec<_> = notes.iter().map(|n| n.kind).collect();
    use nullguard_diagnostics::NoteKind;
    assert!(kinds.contains(&NoteKind::Establishment), "notes: {notes:#?}");
    assert!(kinds.contains(&NoteKind::Invalidation), "notes: {notes:#?}");
    let invalidation = notes
        .iter()
        .find(|n| n.kind == NoteKind::Invalidation)
        .unwrap();
    assert_eq!(invalidation.location.line, 5);
}
