//! Shadowing and aliasing decisions for assignments.
//!
//! Every assignment to a plain name is one of:
//! - a fresh declaration (the name is not bound in this function yet),
//! - a reuse of the existing binding (the new value's type fits it),
//! - a shadow-rename (the new type does not fit, so a fresh identifier is
//!   declared and later code is redirected to it).
//!
//! A plan is computed before the right-hand side is rendered and committed
//! after, so `x = Wrap(x)` reads the binding that existed before the rename.

use crate::scope::{Binding, BindingKind, Scope};
use ferrule_types::Type;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Fresh,
    Reuse,
    ShadowRename(String),
}

/// Decide how an assignment of a `new_type` value to `target` is lowered.
pub fn resolve_shadow_or_reuse(target: &str, new_type: &Type, scope: &Scope) -> Resolution {
    let binding = match scope.lookup_in_function(target) {
        Some(b) => b,
        None => return Resolution::Fresh,
    };
    match binding.kind {
        // Environment slots and the self handle cannot be redeclared
        BindingKind::Captured | BindingKind::SelfHandle | BindingKind::Global => {
            return Resolution::Reuse
        }
        _ => {}
    }
    if binding.ty.is_compatible_with(new_type) {
        Resolution::Reuse
    } else {
        let ident = scope.fresh_ident(target);
        log::debug!(
            "`{}` changes type {} -> {}; shadowing as `{}`",
            target,
            binding.ty,
            new_type,
            ident
        );
        Resolution::ShadowRename(ident)
    }
}

/// An assignment whose scope effects are deferred until after its
/// right-hand side has been rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentPlan {
    pub name: String,
    pub ty: Type,
    pub resolution: Resolution,
    ident: String,
}

impl AssignmentPlan {
    pub fn new(name: &str, ty: Type, scope: &Scope) -> Self {
        let resolution = resolve_shadow_or_reuse(name, &ty, scope);
        let ident = match &resolution {
            Resolution::Fresh => scope.fresh_ident(name),
            Resolution::Reuse => scope.ident(name),
            Resolution::ShadowRename(id) => id.clone(),
        };
        Self {
            name: name.to_string(),
            ty,
            resolution,
            ident,
        }
    }

    /// Identifier the assignment writes to.
    pub fn ident(&self) -> &str {
        &self.ident
    }

    /// Whether the assignment introduces a new target declaration.
    pub fn declares(&self) -> bool {
        !matches!(self.resolution, Resolution::Reuse)
    }

    /// Apply the plan to `scope`.
    ///
    /// `alias_source` is the name on the right-hand side when the value is a
    /// plain name; a reference-typed assignment from a name records an alias,
    /// any other assignment drops the previous one.
    pub fn commit(self, scope: &mut Scope, mutable: bool, alias_source: Option<&str>) {
        match &self.resolution {
            Resolution::Fresh => {
                scope.declare_as(
                    &self.name,
                    &self.ident,
                    Binding::local(self.ty.clone()).mutable(mutable),
                );
            }
            Resolution::Reuse => {
                if let Some(b) = scope.lookup_mut(&self.name) {
                    if b.ty.is_unknown() {
                        b.ty = self.ty.clone();
                    }
                    b.mutable = b.mutable || mutable;
                }
            }
            Resolution::ShadowRename(id) => {
                let outer = scope.lookup_local(&self.name).is_none();
                scope.declare_as(
                    &self.name,
                    id,
                    Binding::local(self.ty.clone()).mutable(mutable),
                );
                if outer && scope.in_block() {
                    scope.record_shadow(&self.name, self.ty.clone());
                }
            }
        }

        match alias_source {
            Some(src) if self.ty.is_reference() && scope.is_declared(src) => {
                scope.record_alias(&self.name, src)
            }
            _ => scope.clear_alias(&self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function_scope() -> Scope {
        let mut scope = Scope::new();
        scope.push_function("f", vec![]);
        scope
    }

    #[test]
    fn test_three_outcomes() {
        let mut scope = function_scope();
        assert_eq!(resolve_shadow_or_reuse("total", &Type::Int, &scope), Resolution::Fresh);
        scope.declare_var_with_type("total", Type::Int);
        assert_eq!(resolve_shadow_or_reuse("total", &Type::Int, &scope), Resolution::Reuse);
        assert_eq!(
            resolve_shadow_or_reuse("total", &Type::Instance("Record".to_string()), &scope),
            Resolution::ShadowRename("total__1".to_string())
        );
    }

    #[test]
    fn test_sequence_to_mapping_shadows() {
        let mut scope = function_scope();
        scope.declare_var_with_type("data", Type::list(Type::Int));
        let r = resolve_shadow_or_reuse("data", &Type::dict(Type::Str, Type::Int), &scope);
        assert!(matches!(r, Resolution::ShadowRename(_)));
        // Unknown element types still fit
        let r = resolve_shadow_or_reuse("data", &Type::list(Type::Unknown), &scope);
        assert_eq!(r, Resolution::Reuse);
    }

    #[test]
    fn test_none_only_fits_none() {
        let mut scope = function_scope();
        scope.declare_var_with_type("slot", Type::None);
        assert!(matches!(
            resolve_shadow_or_reuse("slot", &Type::Int, &scope),
            Resolution::ShadowRename(_)
        ));
        assert_eq!(resolve_shadow_or_reuse("slot", &Type::Unknown, &scope), Resolution::Reuse);
    }

    #[test]
    fn test_rename_visible_only_after_commit() {
        let mut scope = function_scope();
        scope.declare_var_with_type("total", Type::Int);
        let plan = AssignmentPlan::new("total", Type::Instance("Record".to_string()), &scope);
        assert_eq!(plan.ident(), "total__1");
        // The right-hand side is rendered here and still sees the old binding
        assert_eq!(scope.ident("total"), "total");
        assert_eq!(scope.lookup("total").unwrap().ty, Type::Int);
        plan.commit(&mut scope, false, None);
        assert_eq!(scope.ident("total"), "total__1");
        assert_eq!(
            scope.lookup("total").unwrap().ty,
            Type::Instance("Record".to_string())
        );
    }

    #[test]
    fn test_outer_function_binding_is_not_reused() {
        let mut scope = function_scope();
        scope.declare_var_with_type("x", Type::Int);
        scope.push_function("inner", vec![]);
        let plan = AssignmentPlan::new("x", Type::Int, &scope);
        assert_eq!(plan.resolution, Resolution::Fresh);
        assert_eq!(plan.ident(), "x");
    }

    #[test]
    fn test_captured_slot_is_always_reused() {
        let mut scope = function_scope();
        scope.declare_as("count", "env.count.*", Binding::new(BindingKind::Captured, Type::Int));
        assert_eq!(resolve_shadow_or_reuse("count", &Type::Str, &scope), Resolution::Reuse);
    }

    #[test]
    fn test_alias_recorded_and_updated() {
        let mut scope = function_scope();
        let list = Type::list(Type::Int);
        scope.declare_var_with_type("a", list.clone());
        scope.declare_var_with_type("c", list.clone());

        AssignmentPlan::new("b", list.clone(), &scope).commit(&mut scope, false, Some("a"));
        assert_eq!(scope.alias_of("b"), Some("a"));
        assert_eq!(scope.aliases_of("a"), vec!["b".to_string()]);

        // Reassigning to another container moves the alias
        AssignmentPlan::new("b", list.clone(), &scope).commit(&mut scope, true, Some("c"));
        assert_eq!(scope.alias_of("b"), Some("c"));
        assert!(scope.aliases_of("a").is_empty());

        // A non-name value clears it
        AssignmentPlan::new("b", list, &scope).commit(&mut scope, true, None);
        assert_eq!(scope.alias_of("b"), None);
    }

    #[test]
    fn test_shadow_in_block_widens_after_pop() {
        let mut scope = function_scope();
        scope.declare_var_with_type("v", Type::Int);
        scope.push_block();
        let plan = AssignmentPlan::new("v", Type::Str, &scope);
        plan.commit(&mut scope, false, None);
        assert_eq!(scope.ident("v"), "v__1");
        scope.pop().unwrap();
        assert_eq!(scope.ident("v"), "v");
        assert_eq!(
            scope.lookup("v").unwrap().ty,
            Type::Union(vec![Type::Int, Type::Str])
        );
    }
}
