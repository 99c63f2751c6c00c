//! The per-path program state.
//!
//! Every component is a persistent (copy-on-write) structure; state
//! transitions produce new states without mutating predecessors, so forks
//! at branches are cheap and merges never observe torn updates.

use nullguard_ir::{DeclId, ExprId, Span};
use rpds::{HashTrieMap, HashTrieSet, List};

use crate::constraints::ConstraintStore;
use crate::value::{NullConstraint, Region, SVal, SymbolId};

/// Nullability classification of a pointer lvalue region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NullableKind {
    /// The non-nullable wrapper; its value is always constrained not-null.
    NonNullable,
    /// Default for every pointer lvalue.
    Nullable,
    /// Reference-to-volatile pointer; loads conjure fresh symbols and no
    /// proof can ever be established.
    VolatileNullable,
}

/// How long an escape record's constraint stays usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstraintValidity {
    /// Escape target is read-only; the constraint is permanent.
    AlwaysValid,
    /// Holds until the next call or non-const reuse.
    Valid,
    /// Lost; a fresh check must re-establish it before use.
    Invalid,
    /// Escape target is volatile; no future proof can hold.
    AlwaysInvalid,
}

/// Record kept for a region whose address escaped to non-local storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscapeRecord {
    pub constraint: NullConstraint,
    pub validity: ConstraintValidity,
}

/// Weakening to apply to a loop-modified lvalue at the back-edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Weakening {
    /// Rebind to a fresh symbol carrying over the previous null constraint.
    Invariant,
    /// Kill the binding outright.
    Variant,
}

/// Key into the nullable-object constraint/alias maps: the object's
/// region for lvalues, its symbol for rvalues.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjKey {
    Region(Region),
    Symbol(SymbolId),
}

/// Path events recorded per region for diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProofEvents {
    /// Where the nullable value came from.
    pub origin: Option<(Span, String)>,
    /// Where the current proof was built.
    pub established: Option<Span>,
    /// What lost the proof.
    pub invalidated: Option<(Span, String)>,
}

pub type WeakenMap = HashTrieMap<DeclId, Weakening>;

/// One entry of the loop stack: the loop's condition expression plus the
/// weaken map of the enclosing scope, restored on exit.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopFrame {
    pub cond: ExprId,
    pub saved_weaken: WeakenMap,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    /// Region → value bindings.
    pub store: HashTrieMap<Region, SVal>,
    pub constraints: ConstraintStore,
    /// Pointer lvalue nullability; absence means `Nullable`.
    pub nullability: HashTrieMap<Region, NullableKind>,
    pub escaped: HashTrieMap<Region, EscapeRecord>,
    /// Regions assumed mutated by any call.
    pub non_local: HashTrieSet<Region>,
    /// Nullable-object constraint per key.
    pub obj_constraints: HashTrieMap<ObjKey, NullConstraint>,
    /// Object ↔ object alias edges.
    pub obj_aliases: HashTrieMap<ObjKey, HashTrieSet<ObjKey>>,
    /// Object → raw-pointer symbols sharing its constraint.
    pub obj_to_ptr: HashTrieMap<ObjKey, HashTrieSet<SymbolId>>,
    /// Raw-pointer symbol → objects sharing its constraint.
    pub ptr_to_obj: HashTrieMap<SymbolId, HashTrieSet<ObjKey>>,
    /// Re-entry guard for alias propagation through `assume`.
    pub alias_guard: bool,
    pub loop_stack: List<LoopFrame>,
    /// Weaken marks for the innermost loop.
    pub weaken: WeakenMap,
    /// Diagnostic events per region.
    pub events: HashTrieMap<Region, ProofEvents>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, region: Region, value: SVal) -> State {
        let mut next = self.clone();
        next.store = self.store.insert(region, value);
        next
    }

    pub fn lookup(&self, region: &Region) -> Option<&SVal> {
        self.store.get(region)
    }

    pub fn nullability_of(&self, region: &Region) -> NullableKind {
        self.nullability
            .get(region)
            .copied()
            .unwrap_or(NullableKind::Nullable)
    }

    pub fn set_nullability(&self, region: Region, kind: NullableKind) -> State {
        let mut next = self.clone();
        next.nullability = self.nullability.insert(region, kind);
        next
    }

    pub fn add_non_local(&self, region: Region) -> State {
        let mut next = self.clone();
        next.non_local = self.non_local.insert(region);
        next
    }

    /// Constraint of a value on this path: structure first, then the
    /// constraint store.
    pub fn null_constraint(&self, value: &SVal) -> NullConstraint {
        match value.structural_constraint() {
            NullConstraint::Unknown => {}
            known => return known,
        }
        match value.as_symbol() {
            Some(sym) => self.constraints.constraint(sym),
            None => NullConstraint::Unknown,
        }
    }

    // Loop stack.

    pub fn push_loop(&self, cond: ExprId, weaken: WeakenMap) -> State {
        let mut next = self.clone();
        next.loop_stack = self.loop_stack.push_front(LoopFrame {
            cond,
            saved_weaken: self.weaken.clone(),
        });
        next.weaken = weaken;
        next
    }

    pub fn pop_loop(&self) -> State {
        let mut next = self.clone();
        if let Some(frame) = self.loop_stack.first() {
            next.weaken = frame.saved_weaken.clone();
            next.loop_stack = self.loop_stack.drop_first().unwrap_or_default();
        }
        next
    }

    pub fn current_loop(&self) -> Option<&LoopFrame> {
        self.loop_stack.first()
    }

    /// `break` drops any pending weakening for the innermost loop.
    pub fn clear_weaken(&self) -> State {
        let mut next = self.clone();
        next.weaken = WeakenMap::default();
        next
    }

    // Diagnostic events.

    pub fn events_of(&self, region: &Region) -> ProofEvents {
        self.events.get(region).cloned().unwrap_or_default()
    }

    pub fn record_origin(&self, region: Region, span: Option<Span>, what: &str) -> State {
        let Some(span) = span else {
            return self.clone();
        };
        let mut ev = self.events_of(&region);
        if ev.origin.is_none() {
            ev.origin = Some((span, what.to_string()));
        }
        let mut next = self.clone();
        next.events = self.events.insert(region, ev);
        next
    }

    pub fn record_establishment(&self, region: Region, span: Option<Span>) -> State {
        let Some(span) = span else {
            return self.clone();
        };
        let mut ev = self.events_of(&region);
        ev.established = Some(span);
        ev.invalidated = None;
        let mut next = self.clone();
        next.events = self.events.insert(region, ev);
        next
    }

    pub fn record_invalidation(&self, region: Region, span: Option<Span>, why: &str) -> State {
        let Some(span) = span else {
            return self.clone();
        };
        let mut ev = self.events_of(&region);
        // only meaningful after an establishment
        if ev.established.is_some() && ev.invalidated.is_none() {
            ev.invalidated = Some((span, why.to_string()));
            let mut next = self.clone();
            next.events = self.events.insert(region, ev);
            return next;
        }
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(n: u32) -> Region {
        Region::StackLocal { decl: DeclId(n) }
    }

    #[test]
    fn test_bind_is_persistent() {
        let s0 = State::new();
        let s1 = s0.bind(local(1), SVal::ConcreteNull);
        assert!(s0.lookup(&local(1)).is_none());
        assert_eq!(s1.lookup(&local(1)), Some(&SVal::ConcreteNull));
    }

    #[test]
    fn test_default_nullability_is_nullable() {
        let s = State::new();
        assert_eq!(s.nullability_of(&local(1)), NullableKind::Nullable);
        let s = s.set_nullability(local(1), NullableKind::NonNullable);
        assert_eq!(s.nullability_of(&local(1)), NullableKind::NonNullable);
    }

    #[test]
    fn test_null_constraint_consults_store() {
        let s = State::new();
        let sym = SymbolId(1);
        assert_eq!(
            s.null_constraint(&SVal::sym(sym)),
            NullConstraint::Unknown
        );
        let mut s2 = s.clone();
        s2.constraints = s.constraints.assume(sym, true).unwrap();
        assert_eq!(
            s2.null_constraint(&SVal::sym(sym)),
            NullConstraint::NotNull
        );
        // structure wins without a store lookup
        assert_eq!(
            s2.null_constraint(&SVal::ConcreteNull),
            NullConstraint::Null
        );
    }

    #[test]
    fn test_loop_stack_saves_weaken() {
        let s = State::new();
        let outer_weaken = WeakenMap::default().insert(DeclId(9), Weakening::Variant);
        let mut s = s.clone();
        s.weaken = outer_weaken.clone();

        let inner = WeakenMap::default().insert(DeclId(1), Weakening::Invariant);
        let pushed = s.push_loop(ExprId(100), inner);
        assert_eq!(
            pushed.weaken.get(&DeclId(1)),
            Some(&Weakening::Invariant)
        );
        assert!(pushed.current_loop().is_some());

        let popped = pushed.pop_loop();
        assert_eq!(popped.weaken.get(&DeclId(9)), Some(&Weakening::Variant));
        assert!(popped.current_loop().is_none());
    }

    #[test]
    fn test_clear_weaken() {
        let mut s = State::new();
        s.weaken = WeakenMap::default().insert(DeclId(1), Weakening::Variant);
        let cleared = s.clear_weaken();
        assert!(cleared.weaken.is_empty());
    }

    #[test]
    fn test_invalidation_requires_establishment() {
        let span = Span::new("a.cpp", 3, 1);
        let s = State::new();
        let r = local(1);
        // invalidation with no prior proof is dropped
        let s2 = s.record_invalidation(r.clone(), Some(span.clone()), "call");
        assert!(s2.events_of(&r).invalidated.is_none());

        let s3 = s.record_establishment(r.clone(), Some(span.clone()));
        let s4 = s3.record_invalidation(r.clone(), Some(span.clone()), "call");
        assert!(s4.events_of(&r).invalidated.is_some());
        // a fresh establishment clears the invalidation
        let s5 = s4.record_establishment(r.clone(), Some(span));
        assert!(s5.events_of(&r).invalidated.is_none());
    }
}
