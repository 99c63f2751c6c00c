//! NullGuard analysis — path-sensitive null-safety proofs for pointer-like
//! values.
//!
//! The engine walks each function body maintaining a persistent symbolic
//! state per path: a region/value store, a null-constraint store, the
//! nullable-object alias graph, escape records, and loop-weakening marks.
//! A dereference of a nullable pointer is rejected unless the current path
//! proves the pointer non-null.

pub mod alias;
pub mod classify;
pub mod constraints;
pub mod engine;
pub mod escape;
pub mod loops;
pub mod models;
pub mod rules;
pub mod state;
pub mod value;

pub use engine::{AnalysisOptions, Analyzer};
pub use state::{NullableKind, State};
pub use value::{NullConstraint, Region, SVal, SymbolId};
