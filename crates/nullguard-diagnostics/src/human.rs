//! Human-readable diagnostic output formatter.

use crate::diagnostic::{Diagnostic, NoteKind, Severity};

/// Format diagnostics for terminal output.
pub fn format_human(diags: &[Diagnostic]) -> String {
    if diags.is_empty() {
        return "No issues found\n".to_string();
    }

    let mut output = Vec::new();
    for diag in diags {
        output.push(format_one(diag));
    }

    let critical = diags
        .iter()
        .filter(|d| d.severity == Severity::Critical)
        .count();
    let errors = diags
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count();
    let warnings = diags
        .iter()
        .filter(|d| d.severity == Severity::Warning)
        .count();

    output.push(format!(
        "\nFound {} issue(s): {} critical, {} error, {} warning\n",
        diags.len(),
        critical,
        errors,
        warnings,
    ));

    output.join("\n")
}

fn format_one(diag: &Diagnostic) -> String {
    let mut s = format!(
        "{}:{}:{}: {} [{}] {}: {}\n",
        diag.location.file,
        diag.location.line,
        diag.location.column,
        diag.severity,
        diag.rule,
        diag.title,
        diag.explanation,
    );
    for note in &diag.notes {
        let tag = match note.kind {
            NoteKind::Origin => "origin",
            NoteKind::Establishment => "proof",
            NoteKind::Invalidation => "invalidated",
            NoteKind::Dereference => "here",
        };
        s.push_str(&format!(
            "  note[{}] {}:{}:{}: {}\n",
            tag, note.location.file, note.location.line, note.location.column, note.message,
        ));
    }
    s
}

/// JSON output for tooling.
pub fn format_json(diags: &[Diagnostic]) -> String {
    serde_json::to_string_pretty(diags).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::{DiagnosticBuilder, Location};

    fn make_diag(rule: &str, severity: Severity, file: &str, line: u32) -> Diagnostic {
        DiagnosticBuilder::new(rule, severity, format!("test issue {rule}"))
            .location(file, line, 1)
            .explanation(format!("explanation for {rule}"))
            .build()
    }

    #[test]
    fn test_empty_diagnostics() {
        let result = format_human(&[]);
        assert_eq!(result, "No issues found\n");
    }

    #[test]
    fn test_location_and_rule_present() {
        let diag = make_diag("NULL001", Severity::Critical, "handler.cpp", 10);
        let result = format_human(&[diag]);
        assert!(result.contains("NULL001"));
        assert!(result.contains("handler.cpp:10:1"));
    }

    #[test]
    fn test_summary_counts() {
        let diags = vec![
            make_diag("NULL001", Severity::Critical, "a.cpp", 1),
            make_diag("NULL003", Severity::Error, "a.cpp", 2),
            make_diag("NULL006", Severity::Warning, "a.cpp", 3),
        ];
        let result = format_human(&diags);
        assert!(result.contains("Found 3 issue(s)"));
        assert!(result.contains("1 critical"));
        assert!(result.contains("1 error"));
        assert!(result.contains("1 warning"));
    }

    #[test]
    fn test_notes_rendered() {
        let diag = DiagnosticBuilder::new("NULL001", Severity::Critical, "nullable deref")
            .location("a.cpp", 9, 3)
            .note(
                NoteKind::Origin,
                Location {
                    file: "a.cpp".into(),
                    line: 1,
                    column: 1,
                },
                "declared as nullable pointer here",
            )
            .note(
                NoteKind::Invalidation,
                Location {
                    file: "a.cpp".into(),
                    line: 7,
                    column: 3,
                },
                "proof invalidated by call here",
            )
            .build();
        let result = format_human(&[diag]);
        assert!(result.contains("note[origin] a.cpp:1:1"));
        assert!(result.contains("note[invalidated] a.cpp:7:3"));
    }

    #[test]
    fn test_json_is_array() {
        let diags = vec![make_diag("NULL001", Severity::Critical, "a.cpp", 1)];
        let json = format_json(&diags);
        assert!(json.trim_start().starts_with('['));
        assert!(json.contains("NULL001"));
    }
}
