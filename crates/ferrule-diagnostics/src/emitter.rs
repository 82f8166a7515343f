//! Diagnostic emitters for different output formats.

use crate::diagnostic::{Diagnostic, Diagnostics, Severity};
use std::io::Write;

/// Trait for emitting diagnostics in various formats.
pub trait DiagnosticEmitter {
    /// Emit a single diagnostic.
    fn emit(&mut self, diagnostic: &Diagnostic) -> std::io::Result<()>;

    /// Emit multiple diagnostics.
    fn emit_all(&mut self, diagnostics: &Diagnostics) -> std::io::Result<()> {
        for diag in diagnostics.iter() {
            self.emit(diag)?;
        }
        Ok(())
    }

    /// Emit a summary line.
    fn emit_summary(&mut self, diagnostics: &Diagnostics) -> std::io::Result<()>;
}

/// Human readable output, optionally colored.
pub struct TerminalEmitter<W: Write> {
    writer: W,
    colored: bool,
    /// Module the diagnostics belong to, printed in locations
    module: String,
}

impl<W: Write> TerminalEmitter<W> {
    pub fn new(writer: W, colored: bool, module: impl Into<String>) -> Self {
        Self {
            writer,
            colored,
            module: module.into(),
        }
    }

    fn paint(&self, severity: Severity) -> (&'static str, &'static str) {
        if !self.colored {
            return ("", "");
        }
        let color = match severity {
            Severity::Error => "\x1b[1;31m",
            Severity::Warning => "\x1b[1;33m",
            Severity::Hint => "\x1b[1;34m",
        };
        (color, "\x1b[0m")
    }
}

impl<W: Write> DiagnosticEmitter for TerminalEmitter<W> {
    fn emit(&mut self, diagnostic: &Diagnostic) -> std::io::Result<()> {
        let (color, reset) = self.paint(diagnostic.severity);

        // Header: error[C001]: message
        writeln!(
            self.writer,
            "{}{}[{}]{}: {}",
            color,
            diagnostic.severity.as_str(),
            diagnostic.code.as_str(),
            reset,
            diagnostic.message
        )?;

        let mut location = self.module.clone();
        if !diagnostic.span.is_dummy() {
            location.push_str(&format!(":{}", diagnostic.span));
        }
        match &diagnostic.function {
            Some(function) => writeln!(self.writer, "  --> {} (in `{}`)", location, function)?,
            None => writeln!(self.writer, "  --> {}", location)?,
        }

        for label in &diagnostic.labels {
            if label.span.is_dummy() {
                writeln!(self.writer, "  note: {}", label.message)?;
            } else {
                writeln!(self.writer, "  note: {} ({}:{})", label.message, self.module, label.span)?;
            }
        }

        if let Some(ref help) = diagnostic.help {
            writeln!(self.writer, "  = help: {}", help)?;
        }

        writeln!(self.writer)?;
        Ok(())
    }

    fn emit_summary(&mut self, diagnostics: &Diagnostics) -> std::io::Result<()> {
        let errors = diagnostics.error_count();
        let warnings = diagnostics.warning_count();
        if errors == 0 && warnings == 0 {
            return Ok(());
        }

        let severity = if errors > 0 {
            Severity::Error
        } else {
            Severity::Warning
        };
        let (color, reset) = self.paint(severity);
        writeln!(
            self.writer,
            "{}{} error{} and {} warning{} emitted{}",
            color,
            errors,
            if errors == 1 { "" } else { "s" },
            warnings,
            if warnings == 1 { "" } else { "s" },
            reset
        )
    }
}

/// JSON lines output for tooling integration.
pub struct JsonEmitter<W: Write> {
    writer: W,
}

impl<W: Write> JsonEmitter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> DiagnosticEmitter for JsonEmitter<W> {
    fn emit(&mut self, diagnostic: &Diagnostic) -> std::io::Result<()> {
        let json = serde_json::json!({
            "code": diagnostic.code.as_str(),
            "severity": diagnostic.severity.as_str(),
            "message": diagnostic.message,
            "function": diagnostic.function,
            "location": if diagnostic.span.is_dummy() {
                serde_json::Value::Null
            } else {
                serde_json::json!({
                    "line": diagnostic.span.line,
                    "column": diagnostic.span.column,
                })
            },
            "help": diagnostic.help,
        });

        serde_json::to_writer(&mut self.writer, &json)?;
        writeln!(self.writer)?;
        Ok(())
    }

    fn emit_summary(&mut self, diagnostics: &Diagnostics) -> std::io::Result<()> {
        let summary = serde_json::json!({
            "type": "summary",
            "errors": diagnostics.error_count(),
            "warnings": diagnostics.warning_count(),
            "total": diagnostics.len(),
        });
        serde_json::to_writer(&mut self.writer, &summary)?;
        writeln!(self.writer)?;
        Ok(())
    }
}
