//! Diagnostic types for closure-conversion errors, warnings, and hints.

use crate::span::{Label, Span};
use serde::{Deserialize, Serialize};

/// Severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational hint
    Hint,
    /// Warning (output is produced but may be less precise)
    Warning,
    /// Error (the function cannot be converted)
    Error,
}

impl Severity {
    /// Get the string representation for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Hint => "hint",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic error codes organized by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // Analysis limitations (A001-A099)
    /// Return type could not be inferred; a fallback type was used
    UnresolvedReturnType,
    /// Type of a captured variable could not be inferred
    UnresolvedCaptureType,
    /// Type of a formal parameter could not be inferred
    UnresolvedParamType,

    // Capture errors (C001-C099)
    /// Captured variable has no static representation
    UnsupportedCapture,

    // Unsupported constructs (U001-U099)
    /// Construct the default emitter cannot lower
    UnsupportedConstruct,

    // Internal errors (I001-I099)
    /// Internal compiler error
    InternalError,
}

impl DiagnosticCode {
    /// All codes, in display order.
    pub const ALL: &'static [DiagnosticCode] = &[
        DiagnosticCode::UnresolvedReturnType,
        DiagnosticCode::UnresolvedCaptureType,
        DiagnosticCode::UnresolvedParamType,
        DiagnosticCode::UnsupportedCapture,
        DiagnosticCode::UnsupportedConstruct,
        DiagnosticCode::InternalError,
    ];

    /// Get the error code string (e.g., "C001").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnresolvedReturnType => "A001",
            Self::UnresolvedCaptureType => "A002",
            Self::UnresolvedParamType => "A003",
            Self::UnsupportedCapture => "C001",
            Self::UnsupportedConstruct => "U001",
            Self::InternalError => "I001",
        }
    }

    /// Look up a code from its string form (case-insensitive).
    pub fn from_code(code: &str) -> Option<DiagnosticCode> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(code))
    }

    /// Get the default severity for this error code.
    pub fn default_severity(&self) -> Severity {
        match self {
            Self::UnsupportedCapture | Self::UnsupportedConstruct | Self::InternalError => {
                Severity::Error
            }
            Self::UnresolvedReturnType | Self::UnresolvedCaptureType => Severity::Warning,
            Self::UnresolvedParamType => Severity::Hint,
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A compiler diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Unique error code
    pub code: DiagnosticCode,
    /// Severity level
    pub severity: Severity,
    /// Short message (single line)
    pub message: String,
    /// Qualified name of the function being converted (e.g. `outer.inner`)
    pub function: Option<String>,
    /// Primary position
    pub span: Span,
    /// Related positions
    pub labels: Vec<Label>,
    /// Help text
    pub help: Option<String>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> DiagnosticBuilder {
        DiagnosticBuilder::new(code, Severity::Error, message)
    }

    /// Create a new warning diagnostic.
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> DiagnosticBuilder {
        DiagnosticBuilder::new(code, Severity::Warning, message)
    }

    /// Create a diagnostic with the code's default severity.
    pub fn new(code: DiagnosticCode, message: impl Into<String>) -> DiagnosticBuilder {
        DiagnosticBuilder::new(code, code.default_severity(), message)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}

/// Builder for constructing diagnostics fluently.
pub struct DiagnosticBuilder {
    inner: Diagnostic,
}

impl DiagnosticBuilder {
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            inner: Diagnostic {
                code,
                severity,
                message: message.into(),
                function: None,
                span: Span::DUMMY,
                labels: Vec::new(),
                help: None,
            },
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.inner.span = span;
        self
    }

    pub fn in_function(mut self, function: impl Into<String>) -> Self {
        self.inner.function = Some(function.into());
        self
    }

    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.inner.labels.push(Label::new(span, message));
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.inner.help = Some(help.into());
        self
    }

    pub fn build(self) -> Diagnostic {
        self.inner
    }
}

/// Collection of diagnostics with summary statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.items.extend(diagnostics);
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.is_error())
    }

    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_warning()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Diagnostics carrying the given code.
    pub fn with_code(&self, code: DiagnosticCode) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(move |d| d.code == code)
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip_lookup() {
        for code in DiagnosticCode::ALL {
            assert_eq!(DiagnosticCode::from_code(code.as_str()), Some(*code));
        }
        assert_eq!(DiagnosticCode::from_code("c001"), Some(DiagnosticCode::UnsupportedCapture));
        assert_eq!(DiagnosticCode::from_code("Z999"), None);
    }

    #[test]
    fn test_builder_and_counts() {
        let mut diags = Diagnostics::new();
        diags.push(
            Diagnostic::new(DiagnosticCode::UnsupportedCapture, "cannot capture `cb`")
                .in_function("outer.inner")
                .with_span(Span::new(4, 9))
                .build(),
        );
        diags.push(Diagnostic::new(DiagnosticCode::UnresolvedReturnType, "no return type").build());

        assert!(diags.has_errors());
        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.warning_count(), 1);
        let first = &diags.items[0];
        assert_eq!(first.function.as_deref(), Some("outer.inner"));
        assert_eq!(first.span, Span::new(4, 9));
        assert_eq!(diags.with_code(DiagnosticCode::UnresolvedReturnType).count(), 1);
    }
}
