//! Effect inference: can a function body fail?
//!
//! A body that may fail gets an error-union return type and its call sites
//! are prefixed with `try`. The predicates here are shared with the
//! expression renderer so that every `try` it emits is backed by a failing
//! construct seen by [`may_fail`].

use crate::options::ConvertOptions;
use crate::oracle::TypeOracle;
use crate::scope::Scope;
use ferrule_hir::{BinOp, Constant, Expr, FStringPart, Function, Stmt, Target};
use ferrule_types::Type;
use std::collections::HashMap;

/// Builtins that raise on bad input.
const FALLIBLE_BUILTINS: &[&str] = &["int", "float", "open", "next", "input", "divmod", "getattr"];

/// Builtins that allocate their result.
const ALLOCATING_BUILTINS: &[&str] = &[
    "str", "repr", "list", "dict", "set", "sorted", "reversed", "enumerate", "zip", "map",
    "filter", "format", "range",
];

/// Methods that raise when the element or key is missing.
const FALLIBLE_METHODS: &[&str] = &["pop", "index", "remove"];

/// Methods that allocate (grow the receiver or build a new value).
const ALLOCATING_METHODS: &[&str] = &[
    "append", "extend", "insert", "add", "update", "setdefault", "copy", "upper", "lower",
    "replace", "join", "split", "format", "title", "capitalize", "splitlines", "keys", "values",
    "items",
];

pub fn builtin_may_fail(name: &str, options: &ConvertOptions) -> bool {
    FALLIBLE_BUILTINS.contains(&name)
        || (options.allocation_is_fallible && ALLOCATING_BUILTINS.contains(&name))
}

/// Whether the runtime helper for builtin `name` takes the allocator.
pub fn builtin_allocates(name: &str) -> bool {
    ALLOCATING_BUILTINS.contains(&name)
}

pub fn method_may_fail(method: &str, options: &ConvertOptions) -> bool {
    FALLIBLE_METHODS.contains(&method)
        || (options.allocation_is_fallible && ALLOCATING_METHODS.contains(&method))
}

/// Division and modulo fail unless the divisor is a non-zero literal.
pub fn division_may_fail(op: BinOp, divisor: &Expr) -> bool {
    if !matches!(op, BinOp::Div | BinOp::FloorDiv | BinOp::Mod) {
        return false;
    }
    !matches!(
        divisor,
        Expr::Constant(Constant::Int(n)) if *n != 0
    ) && !matches!(divisor, Expr::Constant(Constant::Float(f)) if *f != 0.0)
}

/// Indexing fails for mappings (missing key) and for values of unknown shape.
pub fn subscript_may_fail(container: &Type) -> bool {
    matches!(container, Type::Dict(_, _) | Type::Unknown | Type::Union(_))
}

/// `+`/`*` on strings and lists builds a new value.
pub fn concat_may_fail(op: BinOp, left: &Type, right: &Type, options: &ConvertOptions) -> bool {
    if !options.allocation_is_fallible || !matches!(op, BinOp::Add | BinOp::Mult) {
        return false;
    }
    let builds = |t: &Type| matches!(t, Type::Str | Type::List(_));
    builds(left) || builds(right)
}

/// Whether `body` may fail, not counting the bodies of nested functions
/// except where this body calls them.
pub fn may_fail(
    body: &[Stmt],
    scope: &Scope,
    oracle: &dyn TypeOracle,
    options: &ConvertOptions,
) -> bool {
    let mut analyzer = EffectAnalyzer {
        scope,
        oracle,
        options,
        local_fns: HashMap::new(),
        visiting: Vec::new(),
    };
    analyzer.collect_local_fns(body);
    analyzer.stmts(body)
}

#[derive(Clone, Copy)]
enum LocalFn<'a> {
    Def(&'a Function),
    Lambda(&'a Expr),
}

struct EffectAnalyzer<'a> {
    scope: &'a Scope,
    oracle: &'a dyn TypeOracle,
    options: &'a ConvertOptions,
    /// Functions and lambdas bound by this body, keyed by name
    local_fns: HashMap<String, LocalFn<'a>>,
    visiting: Vec<String>,
}

impl<'a> EffectAnalyzer<'a> {
    fn collect_local_fns(&mut self, body: &'a [Stmt]) {
        for stmt in body {
            match stmt {
                Stmt::FunctionDef(f) => {
                    self.local_fns.insert(f.name.clone(), LocalFn::Def(f));
                }
                Stmt::Assign {
                    target: Target::Name(n),
                    value: Expr::Lambda { body, .. },
                    ..
                } => {
                    self.local_fns.insert(n.clone(), LocalFn::Lambda(body));
                }
                Stmt::If { body, orelse, .. } => {
                    self.collect_local_fns(body);
                    self.collect_local_fns(orelse);
                }
                Stmt::While { body, .. } | Stmt::For { body, .. } | Stmt::With { body, .. } => {
                    self.collect_local_fns(body)
                }
                Stmt::Try {
                    body,
                    handlers,
                    orelse,
                    finalbody,
                } => {
                    self.collect_local_fns(body);
                    for h in handlers {
                        self.collect_local_fns(&h.body);
                    }
                    self.collect_local_fns(orelse);
                    self.collect_local_fns(finalbody);
                }
                _ => {}
            }
        }
    }

    fn stmts(&mut self, body: &'a [Stmt]) -> bool {
        // No short-circuit on purpose: every statement is inspected so that
        // nested local functions are reached through their call sites
        body.iter().fold(false, |acc, s| self.stmt(s) || acc)
    }

    fn stmt(&mut self, stmt: &'a Stmt) -> bool {
        match stmt {
            Stmt::Raise(_) | Stmt::Assert { .. } => true,
            Stmt::Assign { target, value, .. } => self.expr(value) | self.target(target),
            Stmt::AugAssign { target, op, value } => {
                let target_ty = match target {
                    Target::Name(n) => self
                        .scope
                        .lookup(n)
                        .map(|b| b.ty.clone())
                        .unwrap_or(Type::Unknown),
                    _ => Type::Unknown,
                };
                let value_ty = self.oracle.inferred_expression_type(value, self.scope);
                self.expr(value)
                    | self.target(target)
                    | division_may_fail(*op, value)
                    | concat_may_fail(*op, &target_ty, &value_ty, self.options)
            }
            Stmt::Expr(e) => self.expr(e),
            Stmt::Return(v) => v.as_ref().map(|e| self.expr(e)).unwrap_or(false),
            Stmt::If { test, body, orelse } => {
                self.expr(test) | self.stmts(body) | self.stmts(orelse)
            }
            Stmt::While { test, body } => self.expr(test) | self.stmts(body),
            Stmt::For { iter, body, .. } => self.expr(iter) | self.stmts(body),
            Stmt::Break | Stmt::Continue | Stmt::Pass => false,
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                let body_fails = self.stmts(body);
                let catch_all = handlers.iter().any(|h| h.kind.is_none());
                let handler_fails = handlers
                    .iter()
                    .fold(false, |acc, h| self.stmts(&h.body) || acc);
                // Handlers that do not match re-raise
                let escapes = body_fails && !catch_all;
                escapes | handler_fails | self.stmts(orelse) | self.stmts(finalbody)
            }
            Stmt::With { items, body } => {
                let ctx = items
                    .iter()
                    .fold(false, |acc, i| self.expr(&i.context) || acc);
                ctx | self.stmts(body)
            }
            // Defining a closure builds its environment on the stack
            Stmt::FunctionDef(_) => false,
            Stmt::Nonlocal(_) | Stmt::Global(_) => false,
            Stmt::Delete(targets) => targets.iter().fold(false, |acc, t| self.target(t) || acc),
        }
    }

    fn target(&mut self, target: &'a Target) -> bool {
        match target {
            Target::Name(_) => false,
            Target::Tuple(parts) => parts.iter().fold(false, |acc, t| self.target(t) || acc),
            Target::Starred(inner) => self.target(inner),
            Target::Attribute { value, .. } => self.expr(value),
            Target::Subscript { value, index } => {
                let container = self.oracle.inferred_expression_type(value, self.scope);
                let stores_into_map = matches!(container, Type::Dict(_, _))
                    && self.options.allocation_is_fallible;
                self.expr(value) | self.expr(index) | stores_into_map | container.is_unknown()
            }
        }
    }

    fn exprs(&mut self, exprs: &'a [Expr]) -> bool {
        exprs.iter().fold(false, |acc, e| self.expr(e) || acc)
    }

    fn expr(&mut self, expr: &'a Expr) -> bool {
        let allocates = self.options.allocation_is_fallible;
        match expr {
            Expr::Name(_) | Expr::Constant(_) | Expr::Lambda { .. } => false,
            Expr::BinOp { op, left, right } => {
                let l = self.oracle.inferred_expression_type(left, self.scope);
                let r = self.oracle.inferred_expression_type(right, self.scope);
                self.expr(left)
                    | self.expr(right)
                    | division_may_fail(*op, right)
                    | concat_may_fail(*op, &l, &r, self.options)
            }
            Expr::UnaryOp { operand, .. } => self.expr(operand),
            Expr::BoolOp { values, .. } => self.exprs(values),
            Expr::Compare {
                left, comparators, ..
            } => self.expr(left) | self.exprs(comparators),
            Expr::Call {
                func,
                args,
                keywords,
            } => {
                let args_fail = self.exprs(args)
                    | keywords
                        .iter()
                        .fold(false, |acc, k| self.expr(&k.value) || acc);
                args_fail | self.call(func, expr)
            }
            Expr::Attribute { value, .. } => self.expr(value),
            Expr::Subscript { value, index } => {
                let container = self.oracle.inferred_expression_type(value, self.scope);
                self.expr(value) | self.expr(index) | subscript_may_fail(&container)
            }
            Expr::Tuple(elems) => self.exprs(elems),
            Expr::List(elems) | Expr::Set(elems) => self.exprs(elems) | allocates,
            Expr::Dict { keys, values } => self.exprs(keys) | self.exprs(values) | allocates,
            Expr::IfExp { test, body, orelse } => {
                self.expr(test) | self.expr(body) | self.expr(orelse)
            }
            Expr::ListComp { elt, generators }
            | Expr::SetComp { elt, generators }
            | Expr::GeneratorExp { elt, generators } => {
                let gens = generators
                    .iter()
                    .fold(false, |acc, g| (self.expr(&g.iter) | self.exprs(&g.ifs)) || acc);
                gens | self.expr(elt) | allocates
            }
            Expr::DictComp {
                key,
                value,
                generators,
            } => {
                let gens = generators
                    .iter()
                    .fold(false, |acc, g| (self.expr(&g.iter) | self.exprs(&g.ifs)) || acc);
                gens | self.expr(key) | self.expr(value) | allocates
            }
            Expr::FString(parts) => {
                let inner = parts.iter().fold(false, |acc, p| match p {
                    FStringPart::Interpolation(e) => self.expr(e) || acc,
                    FStringPart::Literal(_) => acc,
                });
                inner | allocates
            }
            Expr::Starred(inner) => self.expr(inner),
        }
    }

    fn call(&mut self, func: &'a Expr, call: &'a Expr) -> bool {
        match func {
            Expr::Name(n) => {
                if let Some(local) = self.local_fns.get(n).copied() {
                    return self.local_fn_may_fail(n, local);
                }
                if let Some(b) = self.scope.lookup(n) {
                    if b.ty.is_callable() || b.is_closure_like() {
                        return b.ty.is_fallible_callable();
                    }
                }
                if self.oracle.is_fallible(n) || builtin_may_fail(n, self.options) {
                    return true;
                }
                // Constructing a record allocates it
                self.options.allocation_is_fallible
                    && matches!(
                        self.oracle.inferred_expression_type(call, self.scope),
                        Type::Instance(ref class) if class == n
                    )
            }
            Expr::Attribute { value, attr } => {
                self.expr(value) | method_may_fail(attr, self.options)
            }
            other => self.expr(other),
        }
    }

    fn local_fn_may_fail(&mut self, name: &str, local: LocalFn<'a>) -> bool {
        if self.visiting.iter().any(|v| v == name) {
            return false;
        }
        self.visiting.push(name.to_string());
        let fails = match local {
            LocalFn::Def(f) => {
                // The nested body's own locals shadow ours
                let saved = std::mem::take(&mut self.local_fns);
                self.collect_local_fns(&f.body);
                for (k, v) in &saved {
                    self.local_fns.entry(k.clone()).or_insert(*v);
                }
                let fails = self.stmts(&f.body);
                self.local_fns = saved;
                fails
            }
            LocalFn::Lambda(body) => self.expr(body),
        };
        self.visiting.pop();
        fails
    }
}
