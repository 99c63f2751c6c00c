//! Escape tracking for pointer lvalues whose address is shared with
//! non-local storage.
//!
//! An escaped pointer's proof survives only until the next call; a
//! volatile escape poisons the region permanently.

use nullguard_ir::{Program, Type, TypeId};

use crate::state::{ConstraintValidity, EscapeRecord, State};
use crate::value::{Region, SVal};

/// Classification of a single store or argument pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeKind {
    NonEscape,
    /// The address of a pointer lvalue is shared (`T**`).
    AddressEscape { is_const: bool, is_volatile: bool },
    /// A reference to a pointer lvalue is shared (`T*&`).
    ReferenceEscape { is_const: bool, is_volatile: bool },
}

/// Classify what sharing a value of `ty` with non-local storage means
/// for the pointed-at pointer lvalue.
pub fn classify_escape(program: &Program, ty: TypeId) -> EscapeKind {
    match program.types.get(ty) {
        Type::Reference {
            referent,
            referent_const,
            referent_volatile,
        } => {
            if program.types.is_pointer(*referent) {
                EscapeKind::ReferenceEscape {
                    is_const: *referent_const,
                    is_volatile: *referent_volatile,
                }
            } else {
                EscapeKind::NonEscape
            }
        }
        Type::Pointer {
            pointee,
            pointee_const,
            pointee_volatile,
        } => {
            if program.types.is_pointer(*pointee) {
                EscapeKind::AddressEscape {
                    is_const: *pointee_const,
                    is_volatile: *pointee_volatile,
                }
            } else {
                EscapeKind::NonEscape
            }
        }
        _ => EscapeKind::NonEscape,
    }
}

/// Result of walking an escaping pointer chain.
#[derive(Debug, Clone, PartialEq)]
pub enum EscapeOutcome {
    Recorded(State),
    /// A non-const volatile level was hit; the caller reports
    /// `VolatilePointerEscape` and sinks the path after poisoning.
    Volatile { poisoned: State, region: Region },
}

/// Record escapes along a pointer-to-pointer chain.
///
/// `target_ty` is the type of the non-local lvalue being stored to (or of
/// the callee parameter); `value` is the address being shared. One record
/// is laid down per indirection level whose pointee is itself a pointer.
pub fn escape_pointer_chain(
    state: &State,
    program: &Program,
    target_ty: TypeId,
    value: &SVal,
) -> EscapeOutcome {
    let mut state = state.clone();
    let mut ty = program.types.strip_reference(target_ty);
    let mut value = value.clone();

    loop {
        let Type::Pointer {
            pointee,
            pointee_const,
            pointee_volatile,
        } = program.types.get(ty)
        else {
            break;
        };
        if !program.types.is_pointer(*pointee) {
            break;
        }
        let Some(region) = value.as_region().cloned() else {
            break;
        };

        if *pointee_volatile && !*pointee_const {
            let poisoned = poison(&state, region.clone());
            return EscapeOutcome::Volatile {
                poisoned,
                region,
            };
        }

        let current = state
            .lookup(&region)
            .cloned()
            .unwrap_or(SVal::Unknown);
        let constraint = state.null_constraint(&current);
        let validity = if *pointee_const {
            ConstraintValidity::AlwaysValid
        } else {
            ConstraintValidity::Valid
        };
        state = record(&state, region, EscapeRecord { constraint, validity });

        ty = *pointee;
        value = current;
    }

    EscapeOutcome::Recorded(state)
}

/// A new escape overwrites the record, except that a poisoned region
/// stays poisoned.
pub fn record(state: &State, region: Region, rec: EscapeRecord) -> State {
    if let Some(existing) = state.escaped.get(&region) {
        if existing.validity == ConstraintValidity::AlwaysInvalid {
            return state.clone();
        }
    }
    let mut next = state.clone();
    next.escaped = state.escaped.insert(region, rec);
    next
}

/// Permanently disable proofs on a region (volatile escape).
pub fn poison(state: &State, region: Region) -> State {
    let mut next = state.clone();
    next.escaped = state.escaped.insert(
        region,
        EscapeRecord {
            constraint: crate::value::NullConstraint::Unknown,
            validity: ConstraintValidity::AlwaysInvalid,
        },
    );
    next
}

/// Call event: every `Valid` record becomes `Invalid`; `AlwaysValid` and
/// the poisoned states are untouched.
pub fn invalidate_on_call(state: &State) -> State {
    let mut next = state.clone();
    for (region, rec) in state.escaped.iter() {
        if rec.validity == ConstraintValidity::Valid {
            next.escaped = next.escaped.insert(
                region.clone(),
                EscapeRecord {
                    constraint: rec.constraint,
                    validity: ConstraintValidity::Invalid,
                },
            );
        }
    }
    next
}
