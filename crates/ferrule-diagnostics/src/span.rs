//! Source positions attached to HIR nodes and diagnostics.

use serde::{Deserialize, Serialize};

/// A position in the original source, as reported by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Line number (1-indexed, 0 when unknown)
    pub line: u32,
    /// Column number (1-indexed, 0 when unknown)
    pub column: u32,
}

impl Span {
    /// A dummy span for nodes synthesized by the compiler.
    pub const DUMMY: Span = Span { line: 0, column: 0 };

    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// Check if this is a dummy/unknown span.
    pub fn is_dummy(&self) -> bool {
        self.line == 0
    }
}

impl Default for Span {
    fn default() -> Self {
        Self::DUMMY
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A labeled secondary position, e.g. the enclosing binding of a capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub span: Span,
    pub message: String,
}

impl Label {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dummy_span() {
        assert!(Span::DUMMY.is_dummy());
        assert!(Span::default().is_dummy());
        assert!(!Span::new(3, 1).is_dummy());
    }

    #[test]
    fn test_display() {
        assert_eq!(Span::new(12, 5).to_string(), "12:5");
    }
}
