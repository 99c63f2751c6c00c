//! Diagnostic types shared by every NullGuard analysis pass and formatter.

pub mod diagnostic;
pub mod human;

pub use diagnostic::{
    Diagnostic, DiagnosticBuilder, Location, NoteKind, PathNote, Severity,
};
