//! Diagnostic infrastructure for the Ferrule closure converter.
//!
//! This crate provides structured error reporting with:
//! - Source positions and the qualified name of the function being converted
//! - Diagnostic codes grouped by category (analysis limits, captures, ...)
//! - Terminal and JSON output formats
//!
//! # Example
//!
//! ```
//! use ferrule_diagnostics::{
//!     Diagnostic, DiagnosticCode, DiagnosticEmitter, Diagnostics, Span, TerminalEmitter,
//! };
//!
//! let mut diags = Diagnostics::new();
//! diags.push(
//!     Diagnostic::new(DiagnosticCode::UnresolvedReturnType, "cannot infer return type of `inner`")
//!         .in_function("outer.inner")
//!         .with_span(Span::new(2, 5))
//!         .build(),
//! );
//!
//! let stderr = std::io::stderr();
//! let mut emitter = TerminalEmitter::new(stderr.lock(), false, "main.py");
//! emitter.emit_all(&diags).unwrap();
//! ```

pub mod diagnostic;
pub mod emitter;
pub mod span;

// Re-export commonly used types
pub use diagnostic::{Diagnostic, DiagnosticBuilder, DiagnosticCode, Diagnostics, Severity};
pub use emitter::{DiagnosticEmitter, JsonEmitter, TerminalEmitter};
pub use span::{Label, Span};
