//! Target text emission.
//!
//! [`Emitter`] is the text sink the converter writes into; [`CodeBuffer`] is
//! the default in-memory implementation. Expression rendering and statement
//! lowering live in [`expr`] and [`stmt`] as methods of the conversion
//! context.

pub mod expr;
pub mod stmt;

/// Indented text sink.
pub trait Emitter {
    /// Append text verbatim, without indentation or newline.
    fn emit_raw(&mut self, text: &str);

    /// Append one line at the current indentation.
    fn emit_line(&mut self, line: &str);

    fn indent(&mut self);

    fn dedent(&mut self);

    /// Append a multi-line block, re-indenting each line to the current level.
    fn emit_block(&mut self, block: &str) {
        for line in block.lines() {
            if line.trim().is_empty() {
                self.emit_raw("\n");
            } else {
                self.emit_line(line);
            }
        }
    }

    /// `header {`, then the body one level deeper, then `footer`.
    fn emit_scoped(&mut self, header: &str, footer: &str, body: &mut dyn FnMut(&mut dyn Emitter)) {
        self.emit_line(header);
        self.indent();
        body(self.as_dyn());
        self.dedent();
        self.emit_line(footer);
    }

    fn as_dyn(&mut self) -> &mut dyn Emitter;
}

#[derive(Debug, Clone)]
pub struct CodeBuffer {
    out: String,
    level: usize,
    unit: &'static str,
}

impl Default for CodeBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self {
            out: String::new(),
            level: 0,
            unit: "    ",
        }
    }

    pub fn as_str(&self) -> &str {
        &self.out
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    pub fn finish(self) -> String {
        self.out
    }
}

impl Emitter for CodeBuffer {
    fn emit_raw(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn emit_line(&mut self, line: &str) {
        if !line.is_empty() {
            for _ in 0..self.level {
                self.out.push_str(self.unit);
            }
        }
        self.out.push_str(line);
        self.out.push('\n');
    }

    fn indent(&mut self) {
        self.level += 1;
    }

    fn dedent(&mut self) {
        self.level = self.level.saturating_sub(1);
    }

    fn as_dyn(&mut self) -> &mut dyn Emitter {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indentation() {
        let mut buf = CodeBuffer::new();
        buf.emit_line("fn f() void {");
        buf.indent();
        buf.emit_line("return;");
        buf.dedent();
        buf.emit_line("}");
        assert_eq!(buf.finish(), "fn f() void {\n    return;\n}\n");
    }

    #[test]
    fn test_block_is_reindented() {
        let mut inner = CodeBuffer::new();
        inner.emit_line("const a = 1;");
        inner.emit_line("");
        inner.emit_scoped("if (a > 0) {", "}", &mut |e| e.emit_line("b();"));

        let mut outer = CodeBuffer::new();
        outer.indent();
        outer.emit_block(inner.as_str());
        assert_eq!(
            outer.finish(),
            "    const a = 1;\n\n    if (a > 0) {\n        b();\n    }\n"
        );
    }

    #[test]
    fn test_dedent_saturates() {
        let mut buf = CodeBuffer::new();
        buf.dedent();
        buf.emit_line("x");
        assert_eq!(buf.as_str(), "x\n");
    }
}
