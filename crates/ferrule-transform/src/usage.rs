//! Usage analysis: which names a function body reads, which it binds, and
//! whether it calls itself.
//!
//! Reads are collected transitively through nested functions, lambdas and
//! comprehensions. A nested scope's own parameters and locals hide the
//! enclosing names they shadow, so a read of `x` inside `def g(x): ...`
//! never counts as a read of the outer `x`.

use ferrule_hir::{
    Comprehension, ExceptHandler, Expr, FStringPart, Function, Param, Stmt, Target, WithItem,
};
use std::collections::{HashMap, HashSet};

/// Methods that modify their receiver in place.
const MUTATING_METHODS: &[&str] = &[
    "append",
    "extend",
    "insert",
    "pop",
    "remove",
    "clear",
    "sort",
    "reverse",
    "add",
    "discard",
    "update",
    "setdefault",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Usage {
    /// Free-or-local names read anywhere in the body, first-seen order
    pub reads: Vec<String>,
    /// Names bound by this body (formals excluded, `nonlocal`/`global` excluded)
    pub assigned: Vec<String>,
    /// How many times each bound name is written
    pub assign_counts: HashMap<String, usize>,
    /// Containers modified in place (`x.a = ..`, `x[i] = ..`, `x.append(..)`)
    pub mutated: Vec<String>,
    pub nonlocals: Vec<String>,
    pub globals: Vec<String>,
    /// Free names written by nested functions through `nonlocal`
    pub nested_writes: Vec<String>,
    /// Names called directly or passed as call arguments
    pub calls: Vec<String>,
    pub self_recursive: bool,
}

impl Usage {
    pub fn reads(&self, name: &str) -> bool {
        self.reads.iter().any(|n| n == name)
    }

    pub fn assigns(&self, name: &str) -> bool {
        self.assigned.iter().any(|n| n == name)
    }

    pub fn is_nonlocal(&self, name: &str) -> bool {
        self.nonlocals.iter().any(|n| n == name)
    }

    pub fn is_global(&self, name: &str) -> bool {
        self.globals.iter().any(|n| n == name)
    }

    /// Written by this body or a nested one after being bound outside.
    pub fn writes_through(&self, name: &str) -> bool {
        self.is_nonlocal(name) || self.nested_writes.iter().any(|n| n == name)
    }

    /// Formal is read somewhere in the body.
    pub fn uses_formal(&self, formal: &str) -> bool {
        self.reads(formal)
    }

    /// Formal is rebound somewhere in the body.
    pub fn reassigns_formal(&self, formal: &str) -> bool {
        self.assign_counts.get(formal).copied().unwrap_or(0) > 0
    }
}

/// Analyze one function.
pub fn analyze_function(function: &Function) -> Usage {
    let formals: Vec<String> = function
        .formal_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    analyze_body(&function.name, &formals, &function.body)
}

/// Analyze a body with the given own name and formals.
pub fn analyze_body(own_name: &str, formals: &[String], body: &[Stmt]) -> Usage {
    let mut analyzer = Analyzer::default();
    for stmt in body {
        analyzer.stmt(stmt);
    }
    analyzer.finish(own_name, formals)
}

#[derive(Default)]
struct Analyzer {
    usage: Usage,
    /// Names hidden by comprehension targets currently in scope
    hidden: Vec<HashSet<String>>,
}

impl Analyzer {
    fn is_hidden(&self, name: &str) -> bool {
        self.hidden.iter().any(|h| h.contains(name))
    }

    fn read(&mut self, name: &str) {
        if self.is_hidden(name) {
            return;
        }
        push_unique(&mut self.usage.reads, name);
    }

    fn called(&mut self, name: &str) {
        if self.is_hidden(name) {
            return;
        }
        push_unique(&mut self.usage.calls, name);
    }

    fn bind(&mut self, name: &str) {
        push_unique(&mut self.usage.assigned, name);
        *self.usage.assign_counts.entry(name.to_string()).or_insert(0) += 1;
    }

    fn mutate(&mut self, name: &str) {
        if !self.is_hidden(name) {
            push_unique(&mut self.usage.mutated, name);
        }
    }

    fn finish(mut self, own_name: &str, formals: &[String]) -> Usage {
        let usage = &mut self.usage;
        let declared: Vec<String> = usage
            .nonlocals
            .iter()
            .chain(usage.globals.iter())
            .cloned()
            .collect();
        // `nonlocal`/`global` names and formals are not local bindings, but
        // their write counts are kept for var/const and copy decisions
        usage
            .assigned
            .retain(|n| !declared.contains(n) && !formals.contains(n));
        let assigned = usage.assigned.clone();
        usage
            .nested_writes
            .retain(|n| !assigned.contains(n) && !formals.contains(n));

        let rebinds_self = usage.assigned.iter().any(|n| n == own_name)
            || formals.iter().any(|f| f == own_name)
            || usage.globals.iter().any(|n| n == own_name);
        usage.self_recursive = !rebinds_self && usage.calls.iter().any(|n| n == own_name);
        log::trace!(
            "usage of `{}`: reads={:?} assigned={:?} recursive={}",
            own_name,
            usage.reads,
            usage.assigned,
            usage.self_recursive
        );
        self.usage
    }

    fn stmts(&mut self, body: &[Stmt]) {
        for s in body {
            self.stmt(s);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Assign { target, value, .. } => {
                self.expr(value);
                self.store(target);
            }
            Stmt::AugAssign { target, value, .. } => {
                if let Target::Name(n) = target {
                    self.read(n);
                }
                self.expr(value);
                self.store(target);
            }
            Stmt::Expr(e) => self.expr(e),
            Stmt::Return(value) => {
                if let Some(v) = value {
                    self.expr(v);
                }
            }
            Stmt::If { test, body, orelse } => {
                self.expr(test);
                self.stmts(body);
                self.stmts(orelse);
            }
            Stmt::While { test, body } => {
                self.expr(test);
                self.stmts(body);
            }
            Stmt::For { target, iter, body } => {
                // The iterable is read before the target is written
                self.expr(iter);
                self.store(target);
                self.stmts(body);
            }
            Stmt::Break | Stmt::Continue | Stmt::Pass => {}
            Stmt::Raise(exc) => {
                if let Some(e) = exc {
                    self.expr(e);
                }
            }
            Stmt::Assert { test, msg } => {
                self.expr(test);
                if let Some(m) = msg {
                    self.expr(m);
                }
            }
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.stmts(body);
                for h in handlers {
                    self.handler(h);
                }
                self.stmts(orelse);
                self.stmts(finalbody);
            }
            Stmt::With { items, body } => {
                for item in items {
                    self.with_item(item);
                }
                self.stmts(body);
            }
            Stmt::FunctionDef(f) => {
                for d in &f.decorators {
                    self.expr(d);
                }
                self.defaults(&f.params);
                self.bind(&f.name);
                let inner = analyze_function(f);
                self.absorb_nested(&inner, &f.formal_names());
            }
            Stmt::Nonlocal(names) => {
                for n in names {
                    push_unique(&mut self.usage.nonlocals, n);
                }
            }
            Stmt::Global(names) => {
                for n in names {
                    push_unique(&mut self.usage.globals, n);
                }
            }
            Stmt::Delete(targets) => {
                for t in targets {
                    self.store(t);
                }
            }
        }
    }

    fn handler(&mut self, h: &ExceptHandler) {
        if let Some(kind) = &h.kind {
            self.expr(kind);
        }
        if let Some(n) = &h.name {
            self.bind(n);
        }
        self.stmts(&h.body);
    }

    fn with_item(&mut self, item: &WithItem) {
        self.expr(&item.context);
        if let Some(t) = &item.target {
            self.store(t);
        }
    }

    fn defaults(&mut self, params: &[Param]) {
        for p in params {
            if let Some(d) = &p.default {
                self.expr(d);
            }
        }
    }

    /// Fold a nested function's free names into this body.
    fn absorb_nested(&mut self, inner: &Usage, inner_formals: &[&str]) {
        let inner_locals = |n: &str| {
            inner_formals.contains(&n) || inner.assigns(n) || inner.is_global(n)
        };
        for n in &inner.reads {
            if !inner_locals(n) {
                self.read(n);
            }
        }
        for n in &inner.calls {
            if !inner_locals(n) {
                self.called(n);
            }
        }
        for n in inner.nonlocals.iter().chain(inner.nested_writes.iter()) {
            if !self.is_hidden(n) {
                self.read(n);
                push_unique(&mut self.usage.nested_writes, n);
            }
        }
        for n in &inner.mutated {
            if !inner_locals(n) {
                self.mutate(n);
            }
        }
    }

    fn store(&mut self, target: &Target) {
        match target {
            Target::Name(n) => self.bind(n),
            Target::Tuple(parts) => {
                for p in parts {
                    self.store(p);
                }
            }
            Target::Starred(inner) => self.store(inner),
            Target::Attribute { value, .. } => {
                self.expr(value);
                if let Expr::Name(n) = value {
                    self.mutate(n);
                }
            }
            Target::Subscript { value, index } => {
                self.expr(value);
                self.expr(index);
                if let Expr::Name(n) = value {
                    self.mutate(n);
                }
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Name(n) => self.read(n),
            Expr::Constant(_) => {}
            Expr::BinOp { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            Expr::UnaryOp { operand, .. } => self.expr(operand),
            Expr::BoolOp { values, .. } => self.exprs(values),
            Expr::Compare {
                left, comparators, ..
            } => {
                self.expr(left);
                self.exprs(comparators);
            }
            Expr::Call {
                func,
                args,
                keywords,
            } => {
                self.expr(func);
                match func.as_ref() {
                    Expr::Name(n) => self.called(n),
                    Expr::Attribute { value, attr } => {
                        if let Expr::Name(recv) = value.as_ref() {
                            if MUTATING_METHODS.contains(&attr.as_str()) {
                                self.mutate(recv);
                            }
                        }
                    }
                    _ => {}
                }
                for a in args {
                    // Passing a function along keeps it directly callable
                    if let Expr::Name(n) = a {
                        self.called(n);
                    }
                    self.expr(a);
                }
                for k in keywords {
                    self.expr(&k.value);
                }
            }
            Expr::Attribute { value, .. } => self.expr(value),
            Expr::Subscript { value, index } => {
                self.expr(value);
                self.expr(index);
            }
            Expr::List(elems) | Expr::Tuple(elems) | Expr::Set(elems) => self.exprs(elems),
            Expr::Dict { keys, values } => {
                self.exprs(keys);
                self.exprs(values);
            }
            Expr::IfExp { test, body, orelse } => {
                self.expr(test);
                self.expr(body);
                self.expr(orelse);
            }
            Expr::Lambda { params, body } => {
                self.defaults(params);
                let formals: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
                let inner = analyze_body("<lambda>", &formals, &[Stmt::Return(Some((**body).clone()))]);
                let refs: Vec<&str> = formals.iter().map(String::as_str).collect();
                self.absorb_nested(&inner, &refs);
            }
            Expr::ListComp { elt, generators }
            | Expr::SetComp { elt, generators }
            | Expr::GeneratorExp { elt, generators } => {
                let pushed = self.generators(generators);
                self.expr(elt);
                self.hidden.truncate(self.hidden.len() - pushed);
            }
            Expr::DictComp {
                key,
                value,
                generators,
            } => {
                let pushed = self.generators(generators);
                self.expr(key);
                self.expr(value);
                self.hidden.truncate(self.hidden.len() - pushed);
            }
            Expr::FString(parts) => {
                for part in parts {
                    if let FStringPart::Interpolation(e) = part {
                        self.expr(e);
                    }
                }
            }
            Expr::Starred(inner) => self.expr(inner),
        }
    }

    fn exprs(&mut self, exprs: &[Expr]) {
        for e in exprs {
            self.expr(e);
        }
    }

    /// Visit comprehension clauses, hiding each target from the clauses
    /// after it. Returns how many hidden sets were pushed.
    fn generators(&mut self, generators: &[Comprehension]) -> usize {
        for g in generators {
            // The first iterable is evaluated in the enclosing scope; later
            // ones already see earlier targets
            self.expr(&g.iter);
            let mut names = HashSet::new();
            target_names(&g.target, &mut names);
            self.hidden.push(names);
            self.exprs(&g.ifs);
        }
        generators.len()
    }
}

fn target_names(target: &Target, out: &mut HashSet<String>) {
    match target {
        Target::Name(n) => {
            out.insert(n.clone());
        }
        Target::Tuple(parts) => {
            for p in parts {
                target_names(p, out);
            }
        }
        Target::Starred(inner) => target_names(inner, out),
        Target::Attribute { .. } | Target::Subscript { .. } => {}
    }
}

fn push_unique(v: &mut Vec<String>, name: &str) {
    if !v.iter().any(|n| n == name) {
        v.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrule_hir::build::*;
    use ferrule_hir::{BinOp, CmpOp};

    #[test]
    fn test_reads_and_assigned() {
        // def f(a):
        //     b = a + c
        //     for i in items: total += i
        //     return b
        let f = func(
            "f",
            &["a"],
            vec![
                assign("b", add(name("a"), name("c"))),
                for_(
                    "i",
                    name("items"),
                    vec![aug_assign("total", BinOp::Add, name("i"))],
                ),
                ret(name("b")),
            ],
        );
        let u = analyze_function(&f);
        assert_eq!(u.reads, vec!["a", "c", "items", "total", "i", "b"]);
        assert_eq!(u.assigned, vec!["b", "i", "total"]);
        assert!(u.uses_formal("a"));
        assert!(!u.self_recursive);
    }

    #[test]
    fn test_nested_parameter_shadows_outer_name() {
        // def outer():
        //     def inner(x): return x + y
        //     return inner
        let inner = func("inner", &["x"], vec![ret(add(name("x"), name("y")))]);
        let outer = func("outer", &[], vec![def(inner), ret(name("inner"))]);
        let u = analyze_function(&outer);
        assert!(!u.reads("x"));
        assert!(u.reads("y"));
        assert!(u.assigns("inner"));
    }

    #[test]
    fn test_self_recursion_direct_and_nested() {
        let fact = func(
            "fact",
            &["n"],
            vec![ret(if_exp(
                compare(name("n"), CmpOp::LtE, int(1)),
                int(1),
                mul(name("n"), call("fact", vec![sub(name("n"), int(1))])),
            ))],
        );
        assert!(analyze_function(&fact).self_recursive);

        // Recursion through a nested helper that does not rebind the name
        let helper = func("step", &["k"], vec![ret(call("walk", vec![name("k")]))]);
        let walk = func("walk", &["n"], vec![def(helper), ret(call("step", vec![name("n")]))]);
        assert!(analyze_function(&walk).self_recursive);

        // Passed along as an argument
        let visit = func("visit", &["t"], vec![expr(call("map", vec![name("visit"), name("t")]))]);
        assert!(analyze_function(&visit).self_recursive);

        // A local rebinding means the call targets something else
        let shadowed = func(
            "g",
            &[],
            vec![assign("g", lambda(&[], int(0))), ret(call("g", vec![]))],
        );
        assert!(!analyze_function(&shadowed).self_recursive);
    }

    #[test]
    fn test_comprehension_targets_are_hidden() {
        let f = func(
            "f",
            &[],
            vec![ret(list_comp(
                mul(name("w"), name("scale")),
                "w",
                name("words"),
                vec![compare(name("w"), CmpOp::Gt, name("limit"))],
            ))],
        );
        let u = analyze_function(&f);
        assert_eq!(u.reads, vec!["words", "limit", "scale"]);
        assert!(u.assigned.is_empty());
    }

    #[test]
    fn test_nonlocal_is_not_a_local_binding() {
        let bump = func(
            "bump",
            &[],
            vec![nonlocal(&["count"]), aug_assign("count", BinOp::Add, int(1))],
        );
        let u = analyze_function(&bump);
        assert!(u.reads("count"));
        assert!(!u.assigns("count"));
        assert!(u.writes_through("count"));

        // The enclosing function sees the write as going through its binding
        let outer = func(
            "outer",
            &[],
            vec![assign("count", int(0)), def(bump.clone()), ret(name("bump"))],
        );
        let ou = analyze_function(&outer);
        assert!(ou.assigns("count"));
        assert!(!ou.writes_through("count"));

        // One more level out, the write is a free nested write
        let middle = func("middle", &[], vec![def(bump), ret(name("bump"))]);
        let mu = analyze_function(&middle);
        assert!(mu.writes_through("count"));
        assert!(mu.reads("count"));
    }

    #[test]
    fn test_fstring_with_and_handlers_are_read() {
        let f = func(
            "f",
            &[],
            vec![
                Stmt::With {
                    items: vec![WithItem {
                        context: call("open", vec![name("path")]),
                        target: Some(target("fh")),
                    }],
                    body: vec![expr(fstring(vec![
                        FStringPart::Literal("n=".to_string()),
                        FStringPart::Interpolation(name("n")),
                    ]))],
                },
                Stmt::Try {
                    body: vec![],
                    handlers: vec![ExceptHandler {
                        kind: Some(name("ValueError")),
                        name: Some("err".to_string()),
                        body: vec![expr(call("log", vec![name("err"), name("ctx")]))],
                    }],
                    orelse: vec![],
                    finalbody: vec![],
                },
            ],
        );
        let u = analyze_function(&f);
        for n in ["path", "n", "ValueError", "ctx"] {
            assert!(u.reads(n), "expected read of {}", n);
        }
        assert!(u.assigns("fh"));
        assert!(u.assigns("err"));
    }

    #[test]
    fn test_reassigned_formal_and_mutation() {
        let f = func(
            "f",
            &["n", "xs"],
            vec![
                aug_assign("n", BinOp::Sub, int(1)),
                expr(method_call(name("xs"), "append", vec![name("n")])),
            ],
        );
        let u = analyze_function(&f);
        assert!(u.reassigns_formal("n"));
        assert!(!u.reassigns_formal("xs"));
        assert!(!u.assigns("n"));
        assert_eq!(u.mutated, vec!["xs"]);
    }
}
