//! Nullable-object alias graph.
//!
//! Two key spaces — nullable-object keys (region or symbol) and raw
//! pointer symbols — joined by a bidirectional many-to-many relation.
//! Constraint updates visit the whole equivalence class exactly once;
//! writes to raw-pointer symbols happen under the alias guard so that
//! propagation through `assume` cannot recurse.

use rpds::HashTrieSet;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

use crate::state::{ObjKey, State};
use crate::value::{NullConstraint, SymbolId};

/// Record a constraint on a key without touching aliases.
pub fn create(state: &State, key: ObjKey, constraint: NullConstraint) -> State {
    let mut next = state.clone();
    next.obj_constraints = state.obj_constraints.insert(key, constraint);
    next
}

pub fn constraint_of(state: &State, key: &ObjKey) -> NullConstraint {
    state
        .obj_constraints
        .get(key)
        .copied()
        .unwrap_or(NullConstraint::Unknown)
}

/// Collect the equivalence class reachable from `start`: nullable-object
/// keys and raw-pointer symbols, each visited once.
fn class_of(state: &State, start: &ObjKey) -> (Vec<ObjKey>, Vec<SymbolId>) {
    let mut seen_objs: FxHashSet<ObjKey> = FxHashSet::default();
    let mut seen_syms: FxHashSet<SymbolId> = FxHashSet::default();
    let mut queue: VecDeque<ObjKey> = VecDeque::new();

    seen_objs.insert(start.clone());
    queue.push_back(start.clone());

    while let Some(key) = queue.pop_front() {
        if let Some(neighbors) = state.obj_aliases.get(&key) {
            for n in neighbors.iter() {
                if seen_objs.insert(n.clone()) {
                    queue.push_back(n.clone());
                }
            }
        }
        if let Some(syms) = state.obj_to_ptr.get(&key) {
            for s in syms.iter() {
                if seen_syms.insert(*s) {
                    // a symbol's object aliases are part of the class too
                    if let Some(objs) = state.ptr_to_obj.get(s) {
                        for o in objs.iter() {
                            if seen_objs.insert(o.clone()) {
                                queue.push_back(o.clone());
                            }
                        }
                    }
                }
            }
        }
    }

    (seen_objs.into_iter().collect(), seen_syms.into_iter().collect())
}

/// Overwrite the constraint on `key` and every transitive alias.
pub fn update(state: &State, key: &ObjKey, constraint: NullConstraint) -> State {
    let (objs, syms) = class_of(state, key);
    let mut next = state.clone();
    for k in objs {
        next.obj_constraints = next.obj_constraints.insert(k, constraint);
    }
    if !syms.is_empty() && !state.alias_guard {
        // bracketed by the re-entry guard: while set, alias propagation
        // triggered from `assume` short-circuits
        next.alias_guard = true;
        for s in syms {
            next.constraints = next.constraints.set(s, constraint);
        }
        next.alias_guard = false;
    }
    next
}

/// Propagate a constraint that was just assumed on a raw-pointer symbol
/// to every nullable-object key aliased with it.
pub fn update_from_symbol(state: &State, sym: SymbolId, constraint: NullConstraint) -> State {
    if state.alias_guard {
        return state.clone();
    }
    let Some(objs) = state.ptr_to_obj.get(&sym) else {
        return state.clone();
    };
    let mut next = state.clone();
    for key in objs.iter() {
        next = update(&next, key, constraint);
    }
    next
}

/// Symmetric transitive union of two nullable-object keys. The merged
/// class takes whichever constraint was already known.
pub fn add_alias(state: &State, k1: &ObjKey, k2: &ObjKey) -> State {
    let mut next = state.clone();
    let set1 = next
        .obj_aliases
        .get(k1)
        .cloned()
        .unwrap_or_default()
        .insert(k2.clone());
    let set2 = next
        .obj_aliases
        .get(k2)
        .cloned()
        .unwrap_or_default()
        .insert(k1.clone());
    next.obj_aliases = next.obj_aliases.insert(k1.clone(), set1);
    next.obj_aliases = next.obj_aliases.insert(k2.clone(), set2);

    let merged = match constraint_of(state, k1) {
        NullConstraint::Unknown => constraint_of(state, k2),
        known => known,
    };
    if merged != NullConstraint::Unknown {
        next = update(&next, k1, merged);
    }
    next
}

/// Link a raw-pointer symbol into a key's class (e.g. the result of a
/// nullable object's conversion to raw pointer).
pub fn add_symbol_alias(state: &State, key: &ObjKey, sym: SymbolId) -> State {
    let mut next = state.clone();
    let to_ptr = next
        .obj_to_ptr
        .get(key)
        .cloned()
        .unwrap_or_default()
        .insert(sym);
    let to_obj = next
        .ptr_to_obj
        .get(&sym)
        .cloned()
        .unwrap_or_default()
        .insert(key.clone());
    next.obj_to_ptr = next.obj_to_ptr.insert(key.clone(), to_ptr);
    next.ptr_to_obj = next.ptr_to_obj.insert(sym, to_obj);

    let merged = match constraint_of(state, key) {
        NullConstraint::Unknown => state.constraints.constraint(sym),
        known => known,
    };
    if merged != NullConstraint::Unknown {
        next = update(&next, key, merged);
    }
    next
}

/// Isolate `key`: drop every edge touching it. Its own constraint stays
/// but is no longer shared.
pub fn break_alias(state: &State, key: &ObjKey) -> State {
    let mut next = state.clone();

    if let Some(neighbors) = state.obj_aliases.get(key) {
        for n in neighbors.iter() {
            if let Some(set) = next.obj_aliases.get(n) {
                let pruned = set.remove(key);
                next.obj_aliases = next.obj_aliases.insert(n.clone(), pruned);
            }
        }
        next.obj_aliases = next.obj_aliases.remove(key);
    }

    if let Some(syms) = state.obj_to_ptr.get(key) {
        for s in syms.iter() {
            if let Some(set) = next.ptr_to_obj.get(s) {
                let pruned: HashTrieSet<ObjKey> = set.remove(key);
                next.ptr_to_obj = next.ptr_to_obj.insert(*s, pruned);
            }
        }
        next.obj_to_ptr = next.obj_to_ptr.remove(key);
    }

    next
}
