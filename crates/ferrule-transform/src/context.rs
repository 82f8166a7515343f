//! Conversion state shared by expression rendering, statement lowering and
//! closure synthesis.

use crate::emit::{CodeBuffer, Emitter};
use crate::error::{ConvertError, Result};
use crate::options::ConvertOptions;
use crate::oracle::TypeOracle;
use crate::plan::BodyPlan;
use crate::scope::Scope;
use crate::shape::ClosureShape;
use crate::usage::Usage;
use ferrule_diagnostics::{Diagnostic, Diagnostics, Span};
use ferrule_types::Type;
use serde::Serialize;
use std::collections::HashSet;

/// One closure produced while converting a function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosureSummary {
    /// Dotted path, e.g. `outer.inner`
    pub qualname: String,
    pub shape: ClosureShape,
    /// Wrapper type name
    pub wrapper: String,
    /// Captured names in environment order
    pub captures: Vec<String>,
    pub fallible: bool,
}

/// Where a failing operation jumps to inside a `try` body.
#[derive(Debug, Clone)]
pub(crate) struct CatchTarget {
    /// `?anyerror` slot the error is stored in
    pub slot: String,
    /// Label of the block to break out of
    pub label: String,
}

/// Per-function state, saved and restored around nested functions.
#[derive(Debug, Clone, Default)]
pub(crate) struct FunctionState {
    pub qualname: String,
    pub span: Span,
    pub plan: BodyPlan,
    pub usage: Option<Usage>,
    /// Something in the body was rendered as failing
    pub failed: bool,
    pub catches: Vec<CatchTarget>,
    /// Error payloads of the enclosing `except` handlers, innermost last
    pub handler_errors: Vec<String>,
    pub globals: HashSet<String>,
    /// Join of the types of the values returned so far, as seen while emitting
    pub returned: Option<Type>,
}

impl FunctionState {
    pub fn new(qualname: impl Into<String>, span: Span, plan: BodyPlan, usage: Usage) -> Self {
        Self {
            qualname: qualname.into(),
            span,
            plan,
            usage: Some(usage),
            ..Self::default()
        }
    }

    pub fn record_return(&mut self, ty: Type) {
        self.returned = Some(match self.returned.take() {
            Some(prev) => prev.join(&ty),
            None => ty,
        });
    }
}

pub struct ConversionContext<'a> {
    pub(crate) scope: Scope,
    pub(crate) oracle: &'a dyn TypeOracle,
    pub(crate) options: &'a ConvertOptions,
    pub(crate) diagnostics: Diagnostics,
    /// Container-level declarations produced by closure synthesis
    pub(crate) decls: CodeBuffer,
    /// Statements that must run before the expression being rendered
    pub(crate) prelude: CodeBuffer,
    pub(crate) current: FunctionState,
    pub(crate) closures: Vec<ClosureSummary>,
    pub(crate) counter: usize,
}

impl<'a> ConversionContext<'a> {
    pub fn new(scope: Scope, oracle: &'a dyn TypeOracle, options: &'a ConvertOptions) -> Self {
        Self {
            scope,
            oracle,
            options,
            diagnostics: Diagnostics::new(),
            decls: CodeBuffer::new(),
            prelude: CodeBuffer::new(),
            current: FunctionState::default(),
            closures: Vec::new(),
            counter: 0,
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn closures(&self) -> &[ClosureSummary] {
        &self.closures
    }

    /// Give back the scope, the collected diagnostics and the container-level
    /// declarations.
    pub fn into_parts(self) -> (Scope, Diagnostics, String) {
        (self.scope, self.diagnostics, self.decls.finish())
    }

    pub(crate) fn next_id(&mut self) -> usize {
        self.counter += 1;
        self.counter
    }

    /// Claim a compiler temporary such as `__comp3`.
    pub(crate) fn temp(&mut self, prefix: &str) -> String {
        let n = self.next_id();
        self.scope.claim_ident(&format!("__{}{}", prefix, n))
    }

    /// Dotted name of `name` nested in the current function.
    pub(crate) fn qualify(&self, name: &str) -> String {
        if self.current.qualname.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.current.qualname, name)
        }
    }

    pub(crate) fn unsupported(&self, what: impl Into<String>) -> ConvertError {
        ConvertError::UnsupportedConstruct {
            function: self.current.qualname.clone(),
            what: what.into(),
            span: self.current.span,
        }
    }

    pub(crate) fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        log::debug!("{}: {}", diagnostic.code, diagnostic.message);
        self.diagnostics.push(diagnostic);
    }

    /// Whether the current function body reads `name` anywhere.
    pub(crate) fn is_read(&self, name: &str) -> bool {
        self.current
            .usage
            .as_ref()
            .map(|u| u.reads(name))
            .unwrap_or(true)
    }

    pub(crate) fn is_declared_global(&self, name: &str) -> bool {
        self.current.globals.contains(name)
    }

    pub(crate) fn mark_failed(&mut self) {
        self.current.failed = true;
    }

    /// Wrap an error-union valued expression.
    ///
    /// Inside a `try` body the error is stored and control leaves the
    /// guarded block; elsewhere it propagates with `try`.
    pub(crate) fn fallible(&mut self, text: String) -> String {
        match self.current.catches.last() {
            Some(target) => format!(
                "({} catch |__e| {{ {} = __e; break :{}; }})",
                text, target.slot, target.label
            ),
            None => {
                self.mark_failed();
                format!("try {}", text)
            }
        }
    }

    /// [`ConversionContext::fallible`] when `fails` holds.
    pub(crate) fn maybe_fallible(&mut self, fails: bool, text: String) -> String {
        if fails {
            self.fallible(text)
        } else {
            text
        }
    }

    /// Emit the statements that raise `error`.
    pub(crate) fn emit_error_exit(&mut self, error: &str, out: &mut dyn Emitter) {
        match self.current.catches.last() {
            Some(target) => {
                out.emit_line(&format!("{} = {};", target.slot, error));
                out.emit_line(&format!("break :{};", target.label));
            }
            None => {
                self.mark_failed();
                out.emit_line(&format!("return {};", error));
            }
        }
    }

    /// Move pending prelude statements into `out`.
    pub(crate) fn flush_prelude(&mut self, out: &mut dyn Emitter) {
        if !self.prelude.is_empty() {
            let prelude = std::mem::take(&mut self.prelude);
            out.emit_block(prelude.as_str());
        }
    }

    /// Run `f` with an empty prelude; returns its result and whatever it
    /// added to the prelude.
    pub(crate) fn isolated<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<(T, String)> {
        let saved = std::mem::take(&mut self.prelude);
        let result = f(self);
        let produced = std::mem::replace(&mut self.prelude, saved);
        Ok((result?, produced.finish()))
    }

    /// Swap in a new function state; returns the outer one.
    pub(crate) fn enter_function(&mut self, state: FunctionState) -> FunctionState {
        std::mem::replace(&mut self.current, state)
    }

    pub(crate) fn leave_function(&mut self, outer: FunctionState) -> FunctionState {
        std::mem::replace(&mut self.current, outer)
    }
}

/// Whether `text` uses the identifier `ident` as a whole word.
pub(crate) fn mentions_ident(text: &str, ident: &str) -> bool {
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    text.match_indices(ident).any(|(i, _)| {
        let before = text[..i].chars().next_back();
        let after = text[i + ident.len()..].chars().next();
        !before.map(is_word).unwrap_or(false) && !after.map(is_word).unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::InferenceTable;

    #[test]
    fn test_fallible_outside_try_marks_function() {
        let oracle = InferenceTable::new();
        let options = ConvertOptions::default();
        let mut cx = ConversionContext::new(Scope::new(), &oracle, &options);
        assert_eq!(cx.fallible("f(x)".to_string()), "try f(x)");
        assert!(cx.current.failed);
    }

    #[test]
    fn test_fallible_inside_try_breaks_to_handler() {
        let oracle = InferenceTable::new();
        let options = ConvertOptions::default();
        let mut cx = ConversionContext::new(Scope::new(), &oracle, &options);
        cx.current.catches.push(CatchTarget {
            slot: "__err1".to_string(),
            label: "try1".to_string(),
        });
        assert_eq!(
            cx.fallible("f(x)".to_string()),
            "(f(x) catch |__e| { __err1 = __e; break :try1; })"
        );
        assert!(!cx.current.failed);
    }

    #[test]
    fn test_mentions_ident_respects_word_boundaries() {
        assert!(mentions_ident("if (__exc1 == error.X)", "__exc1"));
        assert!(!mentions_ident("if (__exc10 == error.X)", "__exc1"));
        assert!(!mentions_ident("a__exc1", "__exc1"));
    }

    #[test]
    fn test_qualify_nests_names() {
        let oracle = InferenceTable::new();
        let options = ConvertOptions::default();
        let mut cx = ConversionContext::new(Scope::new(), &oracle, &options);
        assert_eq!(cx.qualify("outer"), "outer");
        cx.current.qualname = "outer".to_string();
        assert_eq!(cx.qualify("inner"), "outer.inner");
    }
}
