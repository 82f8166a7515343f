//! Capture resolution: which enclosing bindings a nested function needs.

use crate::error::{ConvertError, Result};
use crate::scope::{BindingKind, Scope};
use crate::usage::Usage;
use ferrule_diagnostics::{Diagnostic, DiagnosticCode};
use ferrule_hir::Function;
use ferrule_types::Type;
use serde::Serialize;

/// How the environment holds a captured binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CaptureMode {
    /// Copied into the environment, which owns it
    ByValue,
    /// Pointer to the enclosing slot; writes on either side are shared
    ByReference,
    /// Reference to a container owned elsewhere
    Borrowed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub name: String,
    pub kind: BindingKind,
    /// Type at capture time
    pub ty: Type,
    pub mode: CaptureMode,
    /// Target identifier of the enclosing binding at capture time
    pub source_ident: String,
}

/// Ordered, duplicate-free set of captures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureSet {
    captures: Vec<Capture>,
}

impl CaptureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a capture unless its name is already present.
    pub fn insert(&mut self, capture: Capture) -> bool {
        if self.contains(&capture.name) {
            return false;
        }
        self.captures.push(capture);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.captures.iter().any(|c| c.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&Capture> {
        self.captures.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.captures.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Capture> {
        self.captures.iter()
    }

    pub fn len(&self) -> usize {
        self.captures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }
}

impl<'a> IntoIterator for &'a CaptureSet {
    type Item = &'a Capture;
    type IntoIter = std::slice::Iter<'a, Capture>;

    fn into_iter(self) -> Self::IntoIter {
        self.captures.iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureResolution {
    pub captures: CaptureSet,
    /// Free names bound nowhere in the enclosing scopes; left for module or
    /// global resolution
    pub deferred: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Resolve the captures of `function` against `scope`.
///
/// `qualified_name` names the function in diagnostics. A name is captured
/// when the body reads it (or writes it through `nonlocal`), it is neither a
/// formal nor a local of the body, and an enclosing function binds it.
/// Module-level bindings are reachable without capture and end up in
/// `deferred` with everything else unresolved.
pub fn resolve_captures(
    function: &Function,
    usage: &Usage,
    scope: &Scope,
    qualified_name: &str,
) -> Result<CaptureResolution> {
    let mut resolution = CaptureResolution::default();

    let candidates = usage
        .reads
        .iter()
        .chain(usage.nonlocals.iter())
        .chain(usage.nested_writes.iter());

    for name in candidates {
        if resolution.captures.contains(name) || resolution.deferred.contains(name) {
            continue;
        }
        if function.has_formal(name) {
            continue;
        }
        if usage.self_recursive && *name == function.name {
            // Resolved through the self handle, never through the enclosing
            // binding that is about to be replaced by the wrapper
            continue;
        }
        if usage.is_global(name) {
            resolution.deferred.push(name.clone());
            continue;
        }
        if usage.assigns(name) {
            continue;
        }

        let capture = match scope.lookup(name) {
            Some(binding) if !scope.is_global(name) => {
                let writes_through = usage.writes_through(name);
                let mode = if writes_through || binding.mutable {
                    CaptureMode::ByReference
                } else if binding.ty.is_reference()
                    || binding.alias_of.is_some()
                    || binding.kind == BindingKind::SelfHandle
                {
                    CaptureMode::Borrowed
                } else {
                    CaptureMode::ByValue
                };
                Capture {
                    name: name.clone(),
                    kind: binding.kind,
                    ty: binding.ty.clone(),
                    mode,
                    source_ident: scope.ident(name),
                }
            }
            Some(_) => {
                resolution.deferred.push(name.clone());
                continue;
            }
            None if scope.is_enclosing_formal(name) => {
                // Enclosing function is known only by its formal list
                let mode = if usage.writes_through(name) {
                    CaptureMode::ByReference
                } else {
                    CaptureMode::ByValue
                };
                Capture {
                    name: name.clone(),
                    kind: BindingKind::Param,
                    ty: Type::Unknown,
                    mode,
                    source_ident: scope.ident(name),
                }
            }
            None => {
                log::trace!("`{}` is free in `{}`; deferring", name, qualified_name);
                resolution.deferred.push(name.clone());
                continue;
            }
        };

        if !capture.ty.is_statically_representable() {
            return Err(ConvertError::UnsupportedCapture {
                function: qualified_name.to_string(),
                variable: capture.name,
                ty: capture.ty,
                span: function.span,
            });
        }
        if capture.ty.is_unknown() {
            resolution.diagnostics.push(
                Diagnostic::new(
                    DiagnosticCode::UnresolvedCaptureType,
                    format!(
                        "type of captured `{}` is unknown; capturing it as a dynamic value",
                        capture.name
                    ),
                )
                .in_function(qualified_name)
                .with_span(function.span)
                .build(),
            );
        }
        log::trace!(
            "`{}` captures `{}` {:?} as {}",
            qualified_name,
            capture.name,
            capture.mode,
            capture.ty
        );
        resolution.captures.insert(capture);
    }

    Ok(resolution)
}
