//! Null-safety rules (NULL001 … NULL008).

use nullguard_diagnostics::{Diagnostic, DiagnosticBuilder, Location, NoteKind, PathNote, Severity};
use nullguard_ir::Span;

use crate::state::ProofEvents;

fn loc(span: &Span) -> Location {
    Location {
        file: span.file.clone(),
        line: span.line,
        column: span.col,
    }
}

fn fallback_span() -> Span {
    Span::new("<unknown>", 0, 0)
}

fn event_notes(events: &ProofEvents, deref_span: &Span) -> Vec<PathNote> {
    let mut notes = Vec::new();
    if let Some((span, what)) = &events.origin {
        notes.push(PathNote {
            kind: NoteKind::Origin,
            location: loc(span),
            message: what.clone(),
        });
    }
    if let Some(span) = &events.established {
        notes.push(PathNote {
            kind: NoteKind::Establishment,
            location: loc(span),
            message: "null-safety proof established here".into(),
        });
    }
    if let Some((span, why)) = &events.invalidated {
        notes.push(PathNote {
            kind: NoteKind::Invalidation,
            location: loc(span),
            message: why.clone(),
        });
    }
    notes.push(PathNote {
        kind: NoteKind::Dereference,
        location: loc(deref_span),
        message: "dereferenced here".into(),
    });
    notes
}

/// NULL001: dereference of a nullable pointer without proof.
pub fn build_null001(
    span: Option<&Span>,
    func_name: &str,
    value_name: &str,
    events: &ProofEvents,
) -> Diagnostic {
    let span = span.cloned().unwrap_or_else(fallback_span);
    DiagnosticBuilder::new(
        "NULL001",
        Severity::Critical,
        "dereference of a nullable pointer",
    )
    .location(&span.file, span.line, span.col)
    .explanation(format!(
        "In function `{func_name}`, `{value_name}` is nullable and not proven non-null on this path"
    ))
    .notes(event_notes(events, &span))
    .build()
}

/// NULL002: dereference of a pointer constrained to null.
pub fn build_null002(
    span: Option<&Span>,
    func_name: &str,
    value_name: &str,
    events: &ProofEvents,
) -> Diagnostic {
    let span = span.cloned().unwrap_or_else(fallback_span);
    DiagnosticBuilder::new(
        "NULL002",
        Severity::Critical,
        "nullptr dereference of a nullable pointer",
    )
    .location(&span.file, span.line, span.col)
    .explanation(format!(
        "In function `{func_name}`, `{value_name}` is null when dereferenced"
    ))
    .notes(event_notes(events, &span))
    .build()
}

/// NULL003: a non-nullable wrapper observed holding null.
pub fn build_null003(span: Option<&Span>, func_name: &str, value_name: &str) -> Diagnostic {
    let span = span.cloned().unwrap_or_else(fallback_span);
    DiagnosticBuilder::new(
        "NULL003",
        Severity::Critical,
        "non-nullable pointer has nullptr value",
    )
    .location(&span.file, span.line, span.col)
    .explanation(format!(
        "In function `{func_name}`, non-nullable `{value_name}` holds null"
    ))
    .build()
}

/// NULL004: nullable → non-nullable without a proof.
pub fn build_null004(span: Option<&Span>, func_name: &str, value_name: &str) -> Diagnostic {
    let span = span.cloned().unwrap_or_else(fallback_span);
    DiagnosticBuilder::new(
        "NULL004",
        Severity::Error,
        "converting a nullable pointer to non-nullable",
    )
    .location(&span.file, span.line, span.col)
    .explanation(format!(
        "In function `{func_name}`, `{value_name}` is not proven non-null at the conversion"
    ))
    .build()
}

/// NULL005: null literal → non-nullable.
pub fn build_null005(span: Option<&Span>, func_name: &str) -> Diagnostic {
    let span = span.cloned().unwrap_or_else(fallback_span);
    DiagnosticBuilder::new(
        "NULL005",
        Severity::Error,
        "assigning nullptr to non-nullable",
    )
    .location(&span.file, span.line, span.col)
    .explanation(format!(
        "In function `{func_name}`, the null literal flows into a non-nullable pointer"
    ))
    .build()
}

/// NULL006: use of an undefined nullable pointer.
pub fn build_null006(span: Option<&Span>, func_name: &str, value_name: &str) -> Diagnostic {
    let span = span.cloned().unwrap_or_else(fallback_span);
    DiagnosticBuilder::new("NULL006", Severity::Error, "nullable pointer is undefined")
        .location(&span.file, span.line, span.col)
        .explanation(format!(
            "In function `{func_name}`, `{value_name}` is read before initialization"
        ))
        .build()
}

/// NULL007: use of an undefined non-nullable pointer.
pub fn build_null007(span: Option<&Span>, func_name: &str, value_name: &str) -> Diagnostic {
    let span = span.cloned().unwrap_or_else(fallback_span);
    DiagnosticBuilder::new(
        "NULL007",
        Severity::Error,
        "non-nullable pointer is undefined",
    )
    .location(&span.file, span.line, span.col)
    .explanation(format!(
        "In function `{func_name}`, non-nullable `{value_name}` is read before initialization"
    ))
    .build()
}

/// NULL008: a pointer address shared with non-const volatile storage.
pub fn build_null008(span: Option<&Span>, func_name: &str, value_name: &str) -> Diagnostic {
    let span = span.cloned().unwrap_or_else(fallback_span);
    DiagnosticBuilder::new(
        "NULL008",
        Severity::Warning,
        "pointer escapes as volatile",
    )
    .location(&span.file, span.line, span.col)
    .explanation(format!(
        "In function `{func_name}`, the address of `{value_name}` escapes to volatile storage; no future null-safety proof is possible"
    ))
    .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null001_shape() {
        let span = Span::new("handler.cpp", 18, 5);
        let d = build_null001(Some(&span), "HandleRequest", "p", &ProofEvents::default());
        assert_eq!(d.rule, "NULL001");
        assert_eq!(d.severity, Severity::Critical);
        assert_eq!(d.location.line, 18);
        assert!(d.explanation.contains("HandleRequest"));
        assert!(d.explanation.contains('p'));
        // always carries at least the dereference note
        assert_eq!(d.notes.last().unwrap().kind, NoteKind::Dereference);
    }

    #[test]
    fn test_null001_renders_events() {
        let span = Span::new("a.cpp", 9, 1);
        let events = ProofEvents {
            origin: Some((Span::new("a.cpp", 1, 1), "declared as nullable pointer here".into())),
            established: Some(Span::new("a.cpp", 4, 1)),
            invalidated: Some((Span::new("a.cpp", 7, 1), "proof invalidated by call here".into())),
        };
        let d = build_null001(Some(&span), "f", "p", &events);
        let kinds: Vec<_> = d.notes.iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NoteKind::Origin,
                NoteKind::Establishment,
                NoteKind::Invalidation,
                NoteKind::Dereference
            ]
        );
    }

    #[test]
    fn test_missing_span_falls_back() {
        let d = build_null002(None, "f", "p", &ProofEvents::default());
        assert_eq!(d.location.file, "<unknown>");
        assert_eq!(d.location.line, 0);
    }

    #[test]
    fn test_severities() {
        let span = Span::new("a.cpp", 1, 1);
        assert_eq!(
            build_null003(Some(&span), "f", "n").severity,
            Severity::Critical
        );
        assert_eq!(
            build_null004(Some(&span), "f", "p").severity,
            Severity::Error
        );
        assert_eq!(build_null005(Some(&span), "f").severity, Severity::Error);
        assert_eq!(
            build_null006(Some(&span), "f", "p").severity,
            Severity::Error
        );
        assert_eq!(
            build_null007(Some(&span), "f", "n").severity,
            Severity::Error
        );
        assert_eq!(
            build_null008(Some(&span), "f", "p").severity,
            Severity::Warning
        );
    }
}
