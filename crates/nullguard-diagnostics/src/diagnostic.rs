//! Core diagnostic types.
//!
//! The analysis produces `Diagnostic` values; the formatters (human, JSON)
//! consume them. Diagnostics are keyed by source location and must be
//! deterministic for a given input.

use serde::{Deserialize, Serialize};

/// A diagnostic produced by the analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Unique ID: RULE_CODE-file:line (e.g., "NULL001-handler.cpp:18").
    pub id: String,
    /// Rule code (e.g., "NULL001").
    pub rule: String,
    pub severity: Severity,
    /// One-line summary.
    pub title: String,
    /// Why this is a bug, in terms of the offending value.
    pub explanation: String,
    /// Where the issue manifests.
    pub location: Location,
    /// Path events leading to the report: where the value came from, where
    /// a proof was built, and what lost it.
    #[serde(default)]
    pub notes: Vec<PathNote>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl Severity {
    pub fn is_at_least(&self, threshold: Severity) -> bool {
        *self >= threshold
    }

    pub fn parse(s: &str) -> Option<Severity> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Some(Severity::Info),
            "warning" => Some(Severity::Warning),
            "error" => Some(Severity::Error),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

/// Source code location, 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// What a path note marks on the trace from origin to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    /// Where the nullable value came from (declaration, call result).
    Origin,
    /// Where a transient null-safety proof was built.
    Establishment,
    /// The event that lost the proof.
    Invalidation,
    /// The offending access itself.
    Dereference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathNote {
    pub kind: NoteKind,
    pub location: Location,
    pub message: String,
}

/// Builder for creating diagnostics conveniently.
pub struct DiagnosticBuilder {
    rule: String,
    severity: Severity,
    title: String,
    file: String,
    line: u32,
    column: u32,
    explanation: String,
    notes: Vec<PathNote>,
}

impl DiagnosticBuilder {
    pub fn new(rule: impl Into<String>, severity: Severity, title: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            severity,
            title: title.into(),
            file: String::new(),
            line: 0,
            column: 0,
            explanation: String::new(),
            notes: Vec::new(),
        }
    }

    pub fn location(mut self, file: impl Into<String>, line: u32, column: u32) -> Self {
        self.file = file.into();
        self.line = line;
        self.column = column;
        self
    }

    pub fn explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = explanation.into();
        self
    }

    pub fn note(
        mut self,
        kind: NoteKind,
        location: Location,
        message: impl Into<String>,
    ) -> Self {
        self.notes.push(PathNote {
            kind,
            location,
            message: message.into(),
        });
        self
    }

    pub fn notes(mut self, notes: impl IntoIterator<Item = PathNote>) -> Self {
        self.notes.extend(notes);
        self
    }

    pub fn build(self) -> Diagnostic {
        Diagnostic {
            id: format!("{}-{}:{}", self.rule, self.file, self.line),
            rule: self.rule,
            severity: self.severity,
            title: self.title,
            explanation: self.explanation,
            location: Location {
                file: self.file,
                line: self.line,
                column: self.column,
            },
            notes: self.notes,
        }
    }
}

/// Sort diagnostics by (file, line, column, rule) so output is
/// deterministic regardless of path exploration order.
pub fn sort_deterministic(diags: &mut [Diagnostic]) {
    diags.sort_by(|a, b| {
        (
            &a.location.file,
            a.location.line,
            a.location.column,
            &a.rule,
        )
            .cmp(&(
                &b.location.file,
                b.location.line,
                b.location.column,
                &b.rule,
            ))
    });
}

/// Drop reports that duplicate an earlier one at the same location with
/// the same rule (different paths reaching one program point).
pub fn dedup_by_site(diags: Vec<Diagnostic>) -> Vec<Diagnostic> {
    let mut seen = std::collections::HashSet::new();
    diags
        .into_iter()
        .filter(|d| seen.insert(d.id.clone()))
        .collect()
}
