//! Symbol and type-state tracking.
//!
//! A [`Scope`] is a stack of frames. Each frame maps source names to a
//! [`Binding`] (current inferred type, kind, mutability, alias link) and
//! owns the identifiers reserved while it was active. The active
//! [`RenameTable`] is pushed and popped in lockstep with the frames.

use crate::error::{ConvertError, Result};
use crate::rename::RenameTable;
use ferrule_types::Type;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// How a name came to be bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BindingKind {
    /// Module-level variable or top-level function
    Global,
    /// Local variable of a function or block
    Local,
    /// Formal parameter
    Param,
    /// Wrapper produced by closure synthesis
    Closure,
    /// Environment field, seen from inside a closure body
    Captured,
    /// A recursive closure's own name inside its body
    SelfHandle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub ty: Type,
    pub kind: BindingKind,
    /// Declared `var` in the target
    pub mutable: bool,
    /// Container this name shares storage with
    pub alias_of: Option<String>,
}

impl Binding {
    pub fn new(kind: BindingKind, ty: Type) -> Self {
        Self {
            ty,
            kind,
            mutable: false,
            alias_of: None,
        }
    }

    pub fn local(ty: Type) -> Self {
        Self::new(BindingKind::Local, ty)
    }

    pub fn mutable(mut self, mutable: bool) -> Self {
        self.mutable = mutable;
        self
    }

    /// Calls through this binding go through a wrapper's `call`.
    pub fn is_closure_like(&self) -> bool {
        matches!(self.kind, BindingKind::Closure | BindingKind::SelfHandle)
            || matches!(self.ty, Type::Closure(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameKind {
    Module,
    Function { name: String, formals: Vec<String> },
    Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub kind: FrameKind,
    bindings: HashMap<String, Binding>,
    idents: HashSet<String>,
    /// Shadow-renames made in this frame, with the type they introduced
    shadowed: Vec<(String, Type)>,
}

impl Frame {
    fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            bindings: HashMap::new(),
            idents: HashSet::new(),
            shadowed: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    frames: Vec<Frame>,
    renames: RenameTable,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    /// A scope holding only the module frame.
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::new(FrameKind::Module)],
            renames: RenameTable::new(),
        }
    }

    pub fn push_function(&mut self, name: impl Into<String>, formals: Vec<String>) {
        self.push(FrameKind::Function {
            name: name.into(),
            formals,
        });
    }

    pub fn push_block(&mut self) {
        self.push(FrameKind::Block);
    }

    fn push(&mut self, kind: FrameKind) {
        self.frames.push(Frame::new(kind));
        self.renames.push();
    }

    /// Pop the innermost frame together with its renames.
    ///
    /// Popping a block widens each outer binding that was shadow-renamed
    /// inside the block to the join of both types, since either may reach
    /// code after the block.
    pub fn pop(&mut self) -> Result<Frame> {
        if self.frames.len() <= 1 {
            return Err(ConvertError::Internal(
                "attempted to pop the module frame".to_string(),
            ));
        }
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| ConvertError::Internal("empty frame stack".to_string()))?;
        self.renames.pop();
        if frame.kind == FrameKind::Block {
            for (name, ty) in &frame.shadowed {
                if let Some(outer) = self.lookup_mut(name) {
                    let widened = outer.ty.join(ty);
                    log::debug!("widening `{}` to {} after block", name, widened);
                    outer.ty = widened;
                }
            }
        }
        Ok(frame)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether the innermost frame is a block inside a function.
    pub fn in_block(&self) -> bool {
        self.frames
            .last()
            .map(|f| f.kind == FrameKind::Block)
            .unwrap_or(false)
    }

    /// Name of the innermost enclosing function.
    pub fn current_function(&self) -> Option<&str> {
        self.frames.iter().rev().find_map(|f| match &f.kind {
            FrameKind::Function { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }

    /// True if `name` is a formal of any enclosing function frame, whether
    /// or not that frame has declared its bindings yet.
    pub fn is_enclosing_formal(&self, name: &str) -> bool {
        self.frames.iter().any(|f| match &f.kind {
            FrameKind::Function { formals, .. } => formals.iter().any(|p| p == name),
            _ => false,
        })
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.frames.iter().rev().find_map(|f| f.bindings.get(name))
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Binding> {
        self.frames
            .iter_mut()
            .rev()
            .find_map(|f| f.bindings.get_mut(name))
    }

    /// Binding of `name` within the innermost function, its blocks included.
    /// Bindings of enclosing functions are not visible here.
    pub fn lookup_in_function(&self, name: &str) -> Option<&Binding> {
        for frame in self.frames.iter().rev() {
            if let Some(b) = frame.bindings.get(name) {
                return Some(b);
            }
            if matches!(frame.kind, FrameKind::Function { .. }) {
                return None;
            }
        }
        None
    }

    /// Binding of `name` in the innermost frame only.
    pub fn lookup_local(&self, name: &str) -> Option<&Binding> {
        self.frames.last().and_then(|f| f.bindings.get(name))
    }

    /// Whether the binding for `name` lives in the module frame.
    pub fn is_global(&self, name: &str) -> bool {
        let innermost = self
            .frames
            .iter()
            .rposition(|f| f.bindings.contains_key(name));
        innermost == Some(0)
    }

    /// Declare `name` with an unknown type.
    pub fn declare_var(&mut self, name: &str) {
        self.declare_var_with_type(name, Type::Unknown);
    }

    pub fn declare_var_with_type(&mut self, name: &str, ty: Type) {
        self.declare(name, Binding::local(ty));
    }

    /// Declare `name` under its own identifier in the innermost frame.
    pub fn declare(&mut self, name: &str, binding: Binding) {
        self.declare_as(name, name, binding);
    }

    /// Declare `name` in the innermost frame, spelled `ident` in the target.
    pub fn declare_as(&mut self, name: &str, ident: &str, binding: Binding) {
        log::trace!("declare `{}` as `{}`: {}", name, ident, binding.ty);
        if let Some(frame) = self.frames.last_mut() {
            frame.bindings.insert(name.to_string(), binding);
            frame.idents.insert(ident.to_string());
        }
        self.renames.insert(name, ident);
    }

    /// Declare `name` in the innermost function frame even while a block is
    /// active, so it outlives the block.
    pub fn declare_in_function(&mut self, name: &str, ident: &str, binding: Binding) {
        let index = self
            .frames
            .iter()
            .rposition(|f| matches!(f.kind, FrameKind::Function { .. }))
            .unwrap_or(self.frames.len() - 1);
        if let Some(frame) = self.frames.get_mut(index) {
            frame.bindings.insert(name.to_string(), binding);
            frame.idents.insert(ident.to_string());
        }
        self.renames.insert_at(index, name, ident);
    }

    /// Declare a module-level name.
    pub fn declare_global(&mut self, name: &str, ty: Type) {
        if let Some(frame) = self.frames.first_mut() {
            frame
                .bindings
                .insert(name.to_string(), Binding::new(BindingKind::Global, ty));
            frame.idents.insert(name.to_string());
        }
    }

    /// Record that `name` was shadow-renamed in the innermost frame.
    pub fn record_shadow(&mut self, name: &str, ty: Type) {
        if let Some(frame) = self.frames.last_mut() {
            frame.shadowed.push((name.to_string(), ty));
        }
    }

    pub fn set_type(&mut self, name: &str, ty: Type) {
        if let Some(b) = self.lookup_mut(name) {
            b.ty = ty;
        }
    }

    pub fn set_mutable(&mut self, name: &str) {
        if let Some(b) = self.lookup_mut(name) {
            b.mutable = true;
        }
    }

    /// Target identifier currently standing for `name`.
    pub fn ident(&self, name: &str) -> String {
        self.renames
            .resolve(name)
            .map(str::to_string)
            .unwrap_or_else(|| name.to_string())
    }

    pub fn renames(&self) -> &RenameTable {
        &self.renames
    }

    pub fn renames_mut(&mut self) -> &mut RenameTable {
        &mut self.renames
    }

    /// Index of the innermost function frame, or 0 at module level.
    fn function_start(&self) -> usize {
        self.frames
            .iter()
            .rposition(|f| matches!(f.kind, FrameKind::Function { .. }))
            .unwrap_or(0)
    }

    /// Whether `ident` would clash with a module-level name or with anything
    /// declared in the innermost function.
    ///
    /// Closure bodies are emitted at container level, so the locals of the
    /// functions enclosing them are never in scope in the target.
    pub fn is_ident_taken(&self, ident: &str) -> bool {
        let start = self.function_start();
        let taken_in = |f: &Frame| f.idents.contains(ident) || f.bindings.contains_key(ident);
        self.frames.first().map(taken_in).unwrap_or(false)
            || self.frames.iter().skip(start).any(taken_in)
            || self.renames.frame_targets(0, ident)
            || self.renames.targets_since(start, ident)
    }

    /// First of `base`, `base__1`, `base__2`, ... that is free. Nothing is
    /// reserved.
    pub fn fresh_ident(&self, base: &str) -> String {
        if !self.is_ident_taken(base) {
            return base.to_string();
        }
        let mut n = 1;
        loop {
            let candidate = format!("{}__{}", base, n);
            if !self.is_ident_taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Reserve `ident` in the innermost frame.
    pub fn reserve_ident(&mut self, ident: &str) {
        if let Some(frame) = self.frames.last_mut() {
            frame.idents.insert(ident.to_string());
        }
    }

    /// [`Scope::fresh_ident`] followed by [`Scope::reserve_ident`].
    pub fn claim_ident(&mut self, base: &str) -> String {
        let ident = self.fresh_ident(base);
        if ident != base {
            log::debug!("identifier `{}` is taken, using `{}`", base, ident);
        }
        self.reserve_ident(&ident);
        ident
    }

    /// Claim a fresh identifier for a container-level declaration. It stays
    /// reserved for the lifetime of the scope.
    pub fn claim_module_ident(&mut self, base: &str) -> String {
        let ident = self.fresh_ident(base);
        if ident != base {
            log::debug!("container name `{}` is taken, using `{}`", base, ident);
        }
        if let Some(frame) = self.frames.first_mut() {
            frame.idents.insert(ident.clone());
        }
        ident
    }

    /// Reserve a container-level identifier claimed by an earlier conversion.
    pub fn reserve_module_ident(&mut self, ident: &str) {
        if let Some(frame) = self.frames.first_mut() {
            frame.idents.insert(ident.to_string());
        }
    }

    /// Identifiers reserved at module level.
    pub fn module_idents(&self) -> impl Iterator<Item = &str> {
        self.frames
            .first()
            .into_iter()
            .flat_map(|f| f.idents.iter().map(String::as_str))
    }

    /// Record that `name` shares storage with `target`.
    pub fn record_alias(&mut self, name: &str, target: &str) {
        let root = self.alias_root(target);
        if root == name {
            // `a = a` or a cycle back to ourselves: not an alias
            self.clear_alias(name);
            return;
        }
        if let Some(b) = self.lookup_mut(name) {
            b.alias_of = Some(root);
        }
    }

    pub fn clear_alias(&mut self, name: &str) {
        if let Some(b) = self.lookup_mut(name) {
            b.alias_of = None;
        }
    }

    pub fn alias_of(&self, name: &str) -> Option<&str> {
        self.lookup(name).and_then(|b| b.alias_of.as_deref())
    }

    /// The binding that ultimately owns the storage `name` refers to.
    pub fn alias_root(&self, name: &str) -> String {
        let mut current = name.to_string();
        let mut seen = HashSet::new();
        while let Some(next) = self.alias_of(&current) {
            if !seen.insert(current.clone()) {
                break;
            }
            current = next.to_string();
        }
        current
    }

    /// Every visible name sharing storage with `name`, excluding `name`.
    pub fn aliases_of(&self, name: &str) -> Vec<String> {
        let root = self.alias_root(name);
        let mut visible: Vec<&str> = Vec::new();
        for frame in &self.frames {
            for n in frame.names() {
                if !visible.contains(&n) {
                    visible.push(n);
                }
            }
        }
        let mut out: Vec<String> = visible
            .into_iter()
            .filter(|n| *n != name && self.alias_root(n) == root)
            .map(str::to_string)
            .collect();
        out.sort();
        out
    }
}
