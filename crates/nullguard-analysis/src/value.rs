//! Symbolic values and memory regions.
//!
//! The value model is a closed sum type; adding a variant forces every
//! match site to be revisited.

use nullguard_ir::{DeclId, ExprId};
use serde::{Deserialize, Serialize};

/// A fresh unknown allocated by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

/// Which global space a global variable lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GlobalSpace {
    /// Runtime/system storage, assumed mutated by any call.
    System,
    /// `const` globals; stores through them do not happen.
    Immutable,
    /// Ordinary mutable globals of the translation unit.
    Internal,
}

/// A memory region. Regions form a tree rooted at the well-known spaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    /// A local variable (including static locals, which follow local
    /// proof rules).
    StackLocal { decl: DeclId },
    /// A function parameter.
    StackArg { decl: DeclId },
    Global { decl: DeclId, space: GlobalSpace },
    Field { base: Box<Region>, field: String },
    Element { base: Box<Region>, index: i64 },
    /// Storage reached through a symbol (e.g. the referent of a
    /// reference parameter).
    Symbolic(SymbolId),
    /// A materialized temporary, keyed by the materializing expression.
    Temp { expr: ExprId, extended: bool },
    /// Code text of a named function.
    Code { function: String },
    UnknownSpace,
}

impl Region {
    pub fn field(self, name: impl Into<String>) -> Region {
        Region::Field {
            base: Box::new(self),
            field: name.into(),
        }
    }

    pub fn element(self, index: i64) -> Region {
        Region::Element {
            base: Box::new(self),
            index,
        }
    }

    /// The root of the region tree.
    pub fn base(&self) -> &Region {
        match self {
            Region::Field { base, .. } | Region::Element { base, .. } => base.base(),
            other => other,
        }
    }

    /// Whether contents of this region can change outside the current
    /// function's control (globals, symbolic storage, fields thereof).
    pub fn is_non_local(&self) -> bool {
        match self.base() {
            Region::Global { space, .. } => *space != GlobalSpace::Immutable,
            Region::Symbolic(_) | Region::UnknownSpace => true,
            _ => false,
        }
    }

    /// Whether this is local storage of the current frame.
    pub fn is_local(&self) -> bool {
        matches!(
            self.base(),
            Region::StackLocal { .. } | Region::StackArg { .. } | Region::Temp { .. }
        )
    }
}

/// Constraint on the nullness of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NullConstraint {
    Null,
    NotNull,
    Unknown,
}

impl NullConstraint {
    pub fn negate(self) -> NullConstraint {
        match self {
            NullConstraint::Null => NullConstraint::NotNull,
            NullConstraint::NotNull => NullConstraint::Null,
            NullConstraint::Unknown => NullConstraint::Unknown,
        }
    }
}

impl std::fmt::Display for NullConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::NotNull => write!(f, "not-null"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// An abstract value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SVal {
    /// An unevaluated or dead-store read.
    Undef,
    /// A defined value the engine does not track.
    Unknown,
    ConcreteNull,
    ConcreteInt(i64),
    ConcreteBool(bool),
    Symbol {
        id: SymbolId,
        /// Region the symbol was conjured for, when known.
        origin: Option<Box<Region>>,
    },
    /// The address of a region (`&x`, `this`, array decay).
    LocRegion(Box<Region>),
    /// Value of a whole aggregate captured by reference to its region.
    LazyCompound { region: Box<Region> },
    /// The address of a function; never null.
    CodeAddr { function: String },
}

impl SVal {
    pub fn sym(id: SymbolId) -> SVal {
        SVal::Symbol { id, origin: None }
    }

    pub fn sym_for(id: SymbolId, origin: Region) -> SVal {
        SVal::Symbol {
            id,
            origin: Some(Box::new(origin)),
        }
    }

    pub fn loc(region: Region) -> SVal {
        SVal::LocRegion(Box::new(region))
    }

    pub fn compound(region: Region) -> SVal {
        SVal::LazyCompound {
            region: Box::new(region),
        }
    }

    pub fn is_undef(&self) -> bool {
        matches!(self, SVal::Undef)
    }

    pub fn as_symbol(&self) -> Option<SymbolId> {
        match self {
            SVal::Symbol { id, .. } => Some(*id),
            _ => None,
        }
    }

    pub fn as_region(&self) -> Option<&Region> {
        match self {
            SVal::LocRegion(r) | SVal::LazyCompound { region: r } => Some(r),
            _ => None,
        }
    }

    /// The region a symbol was conjured for.
    pub fn origin_region(&self) -> Option<&Region> {
        match self {
            SVal::Symbol {
                origin: Some(r), ..
            } => Some(r),
            _ => None,
        }
    }

    /// Constraint derivable from the value's structure alone, without
    /// consulting the constraint store.
    pub fn structural_constraint(&self) -> NullConstraint {
        match self {
            SVal::ConcreteNull => NullConstraint::Null,
            SVal::ConcreteInt(0) => NullConstraint::Null,
            SVal::ConcreteInt(_) => NullConstraint::NotNull,
            SVal::LocRegion(_) | SVal::CodeAddr { .. } => NullConstraint::NotNull,
            _ => NullConstraint::Unknown,
        }
    }
}
