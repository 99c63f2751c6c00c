//! Null-constraint store.
//!
//! A persistent map from symbols to their known nullness. Branches share
//! the prefix; `assume` returns a refined store or detects contradiction.

use rpds::HashTrieMap;

use crate::value::{NullConstraint, SymbolId};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintStore {
    map: HashTrieMap<SymbolId, NullConstraint>,
}

impl ConstraintStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constraint(&self, sym: SymbolId) -> NullConstraint {
        self.map
            .get(&sym)
            .copied()
            .unwrap_or(NullConstraint::Unknown)
    }

    /// Refine the store with `sym != null` (when `not_null`) or
    /// `sym == null`. Returns `None` on contradiction.
    pub fn assume(&self, sym: SymbolId, not_null: bool) -> Option<ConstraintStore> {
        let wanted = if not_null {
            NullConstraint::NotNull
        } else {
            NullConstraint::Null
        };
        match self.constraint(sym) {
            NullConstraint::Unknown => Some(Self {
                map: self.map.insert(sym, wanted),
            }),
            existing if existing == wanted => Some(self.clone()),
            _ => None,
        }
    }

    /// Overwrite without consistency checking. Used by alias propagation,
    /// which replicates an already-established constraint.
    pub fn set(&self, sym: SymbolId, constraint: NullConstraint) -> ConstraintStore {
        if constraint == NullConstraint::Unknown {
            return Self {
                map: self.map.remove(&sym),
            };
        }
        Self {
            map: self.map.insert(sym, constraint),
        }
    }

    /// Drop a symbol's constraint.
    pub fn forget(&self, sym: SymbolId) -> ConstraintStore {
        Self {
            map: self.map.remove(&sym),
        }
    }

    pub fn len(&self) -> usize {
        self.map.size()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
