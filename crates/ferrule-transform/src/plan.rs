//! Lookahead over a function body before any of it is emitted.
//!
//! Runs the shadow resolver over a copy of the scope to find out which
//! identifiers are written more than once (declared `var` rather than
//! `const`), which names are first bound inside a nested block (declared up
//! front so they outlive the block), and what the body returns.

use crate::oracle::{element_type, TypeOracle};
use crate::scope::{Binding, BindingKind, Scope};
use crate::emit::stmt::combine;
use crate::shadow::{resolve_shadow_or_reuse, AssignmentPlan, Resolution};
use crate::usage::analyze_function;
use ferrule_hir::{Expr, Stmt, Target};
use ferrule_types::Type;
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodyPlan {
    /// Identifiers that are written after their declaration
    pub mutable: HashSet<String>,
    /// Names first bound inside a nested block, with their types
    pub hoisted: Vec<(String, Type)>,
    /// Join of the types of all returned values; `None` if nothing is returned
    pub return_type: Option<Type>,
}

impl BodyPlan {
    pub fn is_mutable(&self, ident: &str) -> bool {
        self.mutable.contains(ident)
    }
}

/// Plan `body`, which runs in the function frame currently on top of `scope`.
pub fn plan_body(body: &[Stmt], scope: &Scope, oracle: &dyn TypeOracle) -> BodyPlan {
    let mut planner = Planner {
        scope: scope.clone(),
        oracle,
        depth: 0,
        globals: HashSet::new(),
        plan: BodyPlan::default(),
    };
    planner.stmts(body);
    planner.plan
}

struct Planner<'a> {
    scope: Scope,
    oracle: &'a dyn TypeOracle,
    /// Block nesting below the function frame
    depth: usize,
    globals: HashSet<String>,
    plan: BodyPlan,
}

impl<'a> Planner<'a> {
    fn stmts(&mut self, body: &[Stmt]) {
        for s in body {
            self.stmt(s);
        }
    }

    fn block(&mut self, body: &[Stmt]) {
        self.scope.push_block();
        self.depth += 1;
        self.stmts(body);
        self.depth -= 1;
        // Only the module frame can fail to pop, and it is never on top here
        let _ = self.scope.pop();
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Assign {
                target,
                value,
                annotation,
            } => {
                let ty = annotation
                    .clone()
                    .unwrap_or_else(|| self.oracle.inferred_expression_type(value, &self.scope));
                self.assign(target, ty, value.as_name());
            }
            Stmt::AugAssign { target, op, value } => {
                if let Target::Name(n) = target {
                    if !self.globals.contains(n) {
                        let combined = combine(Expr::Name(n.clone()), *op, value);
                        let ty = self.oracle.inferred_expression_type(&combined, &self.scope);
                        if let Resolution::ShadowRename(_) = resolve_shadow_or_reuse(n, &ty, &self.scope) {
                            self.assign(target, ty, None);
                            return;
                        }
                        let local = self
                            .scope
                            .lookup_in_function(n)
                            .map(|b| b.kind != BindingKind::Captured)
                            .unwrap_or(false);
                        if local {
                            self.plan.mutable.insert(self.scope.ident(n));
                        }
                    }
                }
            }
            Stmt::Return(Some(value)) => {
                let ty = self.oracle.inferred_expression_type(value, &self.scope);
                self.plan.return_type = Some(match self.plan.return_type.take() {
                    Some(prev) => prev.join(&ty),
                    None => ty,
                });
            }
            Stmt::If { body, orelse, .. } => {
                self.block(body);
                if !orelse.is_empty() {
                    self.block(orelse);
                }
            }
            Stmt::While { body, .. } => self.block(body),
            Stmt::For { target, iter, body } => {
                let elem = element_type(&self.oracle.inferred_expression_type(iter, &self.scope));
                self.scope.push_block();
                self.depth += 1;
                self.bind_payload(target, &elem);
                self.stmts(body);
                self.depth -= 1;
                let _ = self.scope.pop();
            }
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.block(body);
                for h in handlers {
                    self.scope.push_block();
                    self.depth += 1;
                    if let Some(n) = &h.name {
                        let ident = self.scope.fresh_ident(n);
                        self.scope.declare_as(n, &ident, Binding::local(Type::Unknown));
                    }
                    self.stmts(&h.body);
                    self.depth -= 1;
                    let _ = self.scope.pop();
                }
                self.block(orelse);
                self.block(finalbody);
            }
            Stmt::With { items, body } => {
                self.scope.push_block();
                self.depth += 1;
                for item in items {
                    if let Some(t) = &item.target {
                        let ty = self.oracle.inferred_expression_type(&item.context, &self.scope);
                        self.bind_payload(t, &ty);
                    }
                }
                self.stmts(body);
                self.depth -= 1;
                let _ = self.scope.pop();
            }
            Stmt::FunctionDef(f) => {
                // Writes through `nonlocal` need the enclosing slot to be `var`
                let usage = analyze_function(f);
                for n in usage.nonlocals.iter().chain(usage.nested_writes.iter()) {
                    let local = self
                        .scope
                        .lookup_in_function(n)
                        .map(|b| b.kind != BindingKind::Captured)
                        .unwrap_or(false);
                    if local {
                        self.plan.mutable.insert(self.scope.ident(n));
                        self.scope.set_mutable(n);
                    }
                }
                let ident = self.scope.fresh_ident(&f.name);
                self.scope
                    .declare_as(&f.name, &ident, Binding::new(BindingKind::Closure, Type::Unknown));
            }
            Stmt::Global(names) => {
                self.globals.extend(names.iter().cloned());
            }
            Stmt::Expr(_)
            | Stmt::Return(None)
            | Stmt::Break
            | Stmt::Continue
            | Stmt::Pass
            | Stmt::Raise(_)
            | Stmt::Assert { .. }
            | Stmt::Nonlocal(_)
            | Stmt::Delete(_) => {}
        }
    }

    fn assign(&mut self, target: &Target, ty: Type, alias_source: Option<&str>) {
        match target {
            Target::Name(n) => {
                if self.globals.contains(n) {
                    return;
                }
                let plan = AssignmentPlan::new(n, ty, &self.scope);
                match &plan.resolution {
                    Resolution::Fresh if self.depth > 0 => {
                        if !self.plan.hoisted.iter().any(|(h, _)| h == n) {
                            self.plan.hoisted.push((n.clone(), plan.ty.clone()));
                        }
                        let ident = plan.ident().to_string();
                        self.plan.mutable.insert(ident.clone());
                        self.scope.declare_in_function(
                            n,
                            &ident,
                            Binding::local(plan.ty.clone()).mutable(true),
                        );
                        return;
                    }
                    Resolution::Reuse => {
                        let captured = self
                            .scope
                            .lookup_in_function(n)
                            .map(|b| b.kind == BindingKind::Captured)
                            .unwrap_or(false);
                        if !captured {
                            self.plan.mutable.insert(plan.ident().to_string());
                        }
                    }
                    _ => {}
                }
                plan.commit(&mut self.scope, false, alias_source);
            }
            Target::Tuple(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    let elem = match &ty {
                        Type::Tuple(ts) => ts.get(i).cloned().unwrap_or(Type::Unknown),
                        other => element_type(other),
                    };
                    self.assign(part, elem, None);
                }
            }
            Target::Starred(inner) => self.assign(inner, Type::list(element_type(&ty)), None),
            Target::Attribute { .. } | Target::Subscript { .. } => {}
        }
    }

    /// Loop and `with` targets are block-local payloads.
    fn bind_payload(&mut self, target: &Target, ty: &Type) {
        match target {
            Target::Name(n) => {
                let ident = self.scope.fresh_ident(n);
                self.scope.declare_as(n, &ident, Binding::local(ty.clone()));
            }
            Target::Tuple(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    let elem = match ty {
                        Type::Tuple(ts) => ts.get(i).cloned().unwrap_or(Type::Unknown),
                        other => element_type(other),
                    };
                    self.bind_payload(part, &elem);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::InferenceTable;
    use ferrule_hir::build::*;
    use ferrule_hir::{BinOp, CmpOp};

    fn plan(body: &[Stmt]) -> BodyPlan {
        let mut scope = Scope::new();
        scope.push_function("f", vec![]);
        plan_body(body, &scope, &InferenceTable::new())
    }

    #[test]
    fn test_single_assignment_stays_const() {
        let p = plan(&[assign("x", int(1)), ret(name("x"))]);
        assert!(p.mutable.is_empty());
        assert_eq!(p.return_type, Some(Type::Int));
    }

    #[test]
    fn test_reassignment_and_augassign_need_var() {
        let p = plan(&[
            assign("x", int(1)),
            assign("x", int(2)),
            assign("n", int(0)),
            aug_assign("n", BinOp::Add, int(1)),
        ]);
        assert!(p.is_mutable("x"));
        assert!(p.is_mutable("n"));
    }

    #[test]
    fn test_shadow_rename_gets_its_own_ident() {
        let oracle = InferenceTable::new().with_class("Record");
        let mut scope = Scope::new();
        scope.push_function("f", vec![]);
        let body = [
            assign("total", int(0)),
            assign("total", call("Record", vec![name("total")])),
            ret(name("total")),
        ];
        let p = plan_body(&body, &scope, &oracle);
        // Neither declaration is written twice
        assert!(p.mutable.is_empty());
        assert_eq!(p.return_type, Some(Type::Instance("Record".to_string())));
    }

    #[test]
    fn test_aug_assign_changing_type_takes_new_ident() {
        let p = plan(&[
            assign("avg", int(7)),
            aug_assign("avg", BinOp::Div, int(2)),
            ret(name("avg")),
        ]);
        // The division result lives in `avg__1`; neither slot is rewritten
        assert!(p.mutable.is_empty());
        assert_eq!(p.return_type, Some(Type::Float));
    }

    #[test]
    fn test_block_bound_names_are_hoisted() {
        let p = plan(&[
            if_(
                compare(name("a"), CmpOp::Gt, int(0)),
                vec![assign("label", string("pos"))],
                vec![assign("label", string("neg"))],
            ),
            ret(name("label")),
        ]);
        assert_eq!(p.hoisted, vec![("label".to_string(), Type::Str)]);
        assert!(p.is_mutable("label"));
        assert_eq!(p.return_type, Some(Type::Str));
    }

    #[test]
    fn test_nested_nonlocal_write_makes_slot_var() {
        let bump = func(
            "bump",
            &[],
            vec![nonlocal(&["count"]), aug_assign("count", BinOp::Add, int(1))],
        );
        let p = plan(&[assign("count", int(0)), def(bump)]);
        assert!(p.is_mutable("count"));
    }

    #[test]
    fn test_loop_target_is_not_hoisted() {
        let p = plan(&[for_("i", call("range", vec![int(3)]), vec![expr(name("i"))])]);
        assert!(p.hoisted.is_empty());
        assert!(p.mutable.is_empty());
        assert_eq!(p.return_type, None);
    }
}
