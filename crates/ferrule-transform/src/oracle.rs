//! Type inference oracle.
//!
//! Closure conversion never infers whole-program types itself; it asks a
//! [`TypeOracle`]. [`InferenceTable`] is the read-only, process-wide result
//! table produced by the inference pass, combined with local structural
//! rules for expressions.

use crate::scope::Scope;
use ferrule_hir::{BinOp, Constant, Expr, FStringPart, Target, UnaryOp};
use ferrule_types::{FunctionType, Type};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub trait TypeOracle {
    /// Return type of the function or closure called `name`, if known.
    fn inferred_return_type(&self, name: &str) -> Option<Type>;

    /// Type of `expr` evaluated in `scope`; `Type::Unknown` when unsure.
    fn inferred_expression_type(&self, expr: &Expr, scope: &Scope) -> Type;

    /// Type of formal `param` of `function`, if known.
    fn inferred_param_type(&self, _function: &str, _param: &str) -> Option<Type> {
        None
    }

    /// Whether calling the module-level function `name` can fail.
    fn is_fallible(&self, _name: &str) -> bool {
        false
    }
}

/// Builtins whose result type does not depend on their arguments.
fn fixed_builtin(name: &str) -> Option<Type> {
    let ty = match name {
        "len" | "int" | "ord" | "hash" => Type::Int,
        "float" => Type::Float,
        "str" | "repr" | "chr" | "input" => Type::Str,
        "bool" | "isinstance" | "callable" => Type::Bool,
        "print" => Type::None,
        _ => return None,
    };
    Some(ty)
}

/// Element type produced by iterating over a value of type `ty`.
pub fn element_type(ty: &Type) -> Type {
    match ty {
        Type::List(t) | Type::Set(t) => (**t).clone(),
        Type::Dict(k, _) => (**k).clone(),
        Type::Str => Type::Str,
        Type::Bytes => Type::Int,
        Type::Tuple(ts) => ts
            .iter()
            .fold(Type::Unknown, |acc: Type, t: &Type| acc.join(t)),
        _ => Type::Unknown,
    }
}

/// Inference results keyed by (qualified) function name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceTable {
    pub returns: HashMap<String, Type>,
    /// `"function.param"` -> type
    pub params: HashMap<String, Type>,
    /// Record/class names; calling one constructs an instance
    pub classes: HashSet<String>,
    /// Functions known to raise
    pub fallible: HashSet<String>,
}

impl InferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_return(mut self, name: &str, ty: Type) -> Self {
        self.returns.insert(name.to_string(), ty);
        self
    }

    pub fn with_param(mut self, function: &str, param: &str, ty: Type) -> Self {
        self.params.insert(format!("{}.{}", function, param), ty);
        self
    }

    pub fn with_class(mut self, name: &str) -> Self {
        self.classes.insert(name.to_string());
        self
    }

    pub fn with_fallible(mut self, name: &str) -> Self {
        self.fallible.insert(name.to_string());
        self
    }

    fn infer(&self, expr: &Expr, scope: &Scope, locals: &HashMap<String, Type>) -> Type {
        match expr {
            Expr::Name(n) => {
                if let Some(t) = locals.get(n) {
                    return t.clone();
                }
                match scope.lookup(n) {
                    Some(b) => b.ty.clone(),
                    None => Type::Unknown,
                }
            }
            Expr::Constant(c) => match c {
                Constant::None => Type::None,
                Constant::Bool(_) => Type::Bool,
                Constant::Int(_) => Type::Int,
                Constant::Float(_) => Type::Float,
                Constant::Str(_) => Type::Str,
            },
            Expr::BinOp { op, left, right } => {
                let l = self.infer(left, scope, locals);
                let r = self.infer(right, scope, locals);
                binop_type(*op, &l, &r)
            }
            Expr::UnaryOp { op, operand } => match op {
                UnaryOp::Not => Type::Bool,
                _ => self.infer(operand, scope, locals),
            },
            Expr::BoolOp { values, .. } => values
                .iter()
                .map(|v| self.infer(v, scope, locals))
                .fold(Type::Unknown, |acc, t| acc.join(&t)),
            Expr::Compare { .. } => Type::Bool,
            Expr::IfExp { body, orelse, .. } => {
                let a = self.infer(body, scope, locals);
                let b = self.infer(orelse, scope, locals);
                a.join(&b)
            }
            Expr::Call { func, args, .. } => self.infer_call(func, args, scope, locals),
            Expr::Attribute { .. } => Type::Unknown,
            Expr::Subscript { value, index } => {
                match self.infer(value, scope, locals) {
                    Type::List(t) => *t,
                    Type::Dict(_, v) => *v,
                    Type::Str => Type::Str,
                    Type::Bytes => Type::Int,
                    Type::Tuple(ts) => match index.as_ref() {
                        Expr::Constant(Constant::Int(i)) => {
                            let i = if *i < 0 { ts.len() as i64 + i } else { *i };
                            usize::try_from(i)
                                .ok()
                                .and_then(|i| ts.get(i).cloned())
                                .unwrap_or(Type::Unknown)
                        }
                        _ => element_type(&Type::Tuple(ts)),
                    },
                    _ => Type::Unknown,
                }
            }
            Expr::List(elems) => Type::list(self.join_all(elems, scope, locals)),
            Expr::Set(elems) => Type::set(self.join_all(elems, scope, locals)),
            Expr::Tuple(elems) => {
                Type::Tuple(elems.iter().map(|e| self.infer(e, scope, locals)).collect())
            }
            Expr::Dict { keys, values } => Type::dict(
                self.join_all(keys, scope, locals),
                self.join_all(values, scope, locals),
            ),
            Expr::Lambda { params, body } => {
                let mut inner = locals.clone();
                for p in params {
                    inner.insert(p.name.clone(), p.annotation.clone().unwrap_or(Type::Unknown));
                }
                Type::Function(FunctionType {
                    params: params
                        .iter()
                        .map(|p| p.annotation.clone().unwrap_or(Type::Unknown))
                        .collect(),
                    return_type: Box::new(self.infer(body, scope, &inner)),
                    fallible: false,
                })
            }
            Expr::ListComp { elt, generators } | Expr::GeneratorExp { elt, generators } => {
                let inner = self.bind_generators(generators, scope, locals);
                Type::list(self.infer(elt, scope, &inner))
            }
            Expr::SetComp { elt, generators } => {
                let inner = self.bind_generators(generators, scope, locals);
                Type::set(self.infer(elt, scope, &inner))
            }
            Expr::DictComp {
                key,
                value,
                generators,
            } => {
                let inner = self.bind_generators(generators, scope, locals);
                Type::dict(
                    self.infer(key, scope, &inner),
                    self.infer(value, scope, &inner),
                )
            }
            Expr::FString(_) => Type::Str,
            Expr::Starred(_) => Type::Unknown,
        }
    }

    fn join_all(&self, exprs: &[Expr], scope: &Scope, locals: &HashMap<String, Type>) -> Type {
        exprs
            .iter()
            .map(|e| self.infer(e, scope, locals))
            .fold(Type::Unknown, |acc, t| acc.join(&t))
    }

    fn bind_generators(
        &self,
        generators: &[ferrule_hir::Comprehension],
        scope: &Scope,
        locals: &HashMap<String, Type>,
    ) -> HashMap<String, Type> {
        let mut inner = locals.clone();
        for g in generators {
            let elem = element_type(&self.infer(&g.iter, scope, &inner));
            bind_target(&g.target, &elem, &mut inner);
        }
        inner
    }

    fn infer_call(
        &self,
        func: &Expr,
        args: &[Expr],
        scope: &Scope,
        locals: &HashMap<String, Type>,
    ) -> Type {
        match func {
            Expr::Name(n) => {
                if let Some(t) = locals.get(n).and_then(|t| t.return_type()) {
                    return t.clone();
                }
                if let Some(b) = scope.lookup(n) {
                    if let Some(ret) = b.ty.return_type() {
                        return ret.clone();
                    }
                }
                if self.classes.contains(n) {
                    return Type::Instance(n.clone());
                }
                if let Some(t) = self.returns.get(n) {
                    return t.clone();
                }
                if let Some(t) = fixed_builtin(n) {
                    return t;
                }
                let arg = |i: usize| {
                    args.get(i)
                        .map(|a| self.infer(a, scope, locals))
                        .unwrap_or(Type::Unknown)
                };
                match n.as_str() {
                    "abs" => arg(0),
                    "range" => Type::list(Type::Int),
                    "list" | "sorted" | "reversed" => Type::list(element_type(&arg(0))),
                    "set" => Type::set(element_type(&arg(0))),
                    "tuple" => Type::Tuple(Vec::new()),
                    "dict" => Type::dict(Type::Unknown, Type::Unknown),
                    "min" | "max" if args.len() == 1 => element_type(&arg(0)),
                    "min" | "max" => self.join_all(args, scope, locals),
                    "sum" => match element_type(&arg(0)) {
                        Type::Unknown => Type::Int,
                        t => t,
                    },
                    "enumerate" => Type::list(Type::Tuple(vec![Type::Int, element_type(&arg(0))])),
                    "zip" => Type::list(Type::Tuple(
                        (0..args.len()).map(|i| element_type(&arg(i))).collect(),
                    )),
                    _ => Type::Unknown,
                }
            }
            Expr::Attribute { value, attr } => {
                let recv = self.infer(value, scope, locals);
                method_type(&recv, attr)
            }
            _ => Type::Unknown,
        }
    }
}

/// Bind the names of a loop or comprehension target to `ty`.
pub fn bind_target(target: &Target, ty: &Type, locals: &mut HashMap<String, Type>) {
    match target {
        Target::Name(n) => {
            locals.insert(n.clone(), ty.clone());
        }
        Target::Tuple(parts) => {
            for (i, part) in parts.iter().enumerate() {
                let elem = match ty {
                    Type::Tuple(ts) => ts.get(i).cloned().unwrap_or(Type::Unknown),
                    other => element_type(other),
                };
                bind_target(part, &elem, locals);
            }
        }
        Target::Starred(inner) => bind_target(inner, &Type::list(element_type(ty)), locals),
        Target::Attribute { .. } | Target::Subscript { .. } => {}
    }
}

fn binop_type(op: BinOp, l: &Type, r: &Type) -> Type {
    match op {
        BinOp::Div => Type::Float,
        BinOp::Add if l == &Type::Str || r == &Type::Str => Type::Str,
        BinOp::Add => match (l, r) {
            (Type::List(a), Type::List(b)) => Type::list(a.join(b)),
            _ => numeric_result(l, r),
        },
        BinOp::Mult => match (l, r) {
            (Type::Str, _) | (_, Type::Str) => Type::Str,
            (Type::List(_), _) => l.clone(),
            (_, Type::List(_)) => r.clone(),
            _ => numeric_result(l, r),
        },
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::LShift | BinOp::RShift => {
            match (l, r) {
                (Type::Set(_), _) => l.clone(),
                _ => Type::Int,
            }
        }
        _ => numeric_result(l, r),
    }
}

/// Numeric promotion. An unknown operand defers to the known one, which keeps
/// `n * fact(n - 1)` at `int` while the recursive call is still untyped.
fn numeric_result(l: &Type, r: &Type) -> Type {
    match (l, r) {
        (Type::Unknown, t) | (t, Type::Unknown) if t.is_numeric() || t.is_unknown() => t.clone(),
        (Type::Float, _) | (_, Type::Float) => Type::Float,
        (Type::BigInt, _) | (_, Type::BigInt) => Type::BigInt,
        (Type::Int | Type::Bool, Type::Int | Type::Bool) => Type::Int,
        _ => Type::Unknown,
    }
}

fn method_type(recv: &Type, method: &str) -> Type {
    match (recv, method) {
        (
            Type::Str,
            "upper" | "lower" | "strip" | "lstrip" | "rstrip" | "replace" | "join" | "format"
            | "title" | "capitalize",
        ) => Type::Str,
        (Type::Str, "split" | "splitlines") => Type::list(Type::Str),
        (Type::Str, "startswith" | "endswith" | "isdigit" | "isalpha") => Type::Bool,
        (Type::Str, "find" | "count" | "index") => Type::Int,
        (Type::List(t), "pop") => (**t).clone(),
        (Type::List(_), "index" | "count") => Type::Int,
        (Type::List(_) | Type::Dict(_, _) | Type::Set(_), "copy") => recv.clone(),
        (Type::Dict(_, v), "get" | "pop" | "setdefault") => (**v).clone(),
        (Type::Dict(k, _), "keys") => Type::list((**k).clone()),
        (Type::Dict(_, v), "values") => Type::list((**v).clone()),
        (Type::Dict(k, v), "items") => {
            Type::list(Type::Tuple(vec![(**k).clone(), (**v).clone()]))
        }
        (_, "append" | "extend" | "insert" | "clear" | "sort" | "reverse" | "add" | "update"
        | "discard" | "remove") => Type::None,
        _ => Type::Unknown,
    }
}

/// Interpolated expressions of an f-string, in order.
pub fn interpolations(parts: &[FStringPart]) -> impl Iterator<Item = &Expr> {
    parts.iter().filter_map(|p| match p {
        FStringPart::Interpolation(e) => Some(e),
        FStringPart::Literal(_) => None,
    })
}

impl TypeOracle for InferenceTable {
    fn inferred_return_type(&self, name: &str) -> Option<Type> {
        self.returns.get(name).cloned()
    }

    fn inferred_expression_type(&self, expr: &Expr, scope: &Scope) -> Type {
        self.infer(expr, scope, &HashMap::new())
    }

    fn inferred_param_type(&self, function: &str, param: &str) -> Option<Type> {
        self.params.get(&format!("{}.{}", function, param)).cloned()
    }

    fn is_fallible(&self, name: &str) -> bool {
        self.fallible.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrule_hir::build::*;
    use ferrule_hir::CmpOp;

    #[test]
    fn test_literals_and_containers() {
        let table = InferenceTable::new();
        let scope = Scope::new();
        assert_eq!(table.inferred_expression_type(&int(1), &scope), Type::Int);
        assert_eq!(
            table.inferred_expression_type(&list(vec![int(1), int(2)]), &scope),
            Type::list(Type::Int)
        );
        assert_eq!(
            table.inferred_expression_type(&dict(vec![(string("a"), float(1.0))]), &scope),
            Type::dict(Type::Str, Type::Float)
        );
        assert_eq!(
            table.inferred_expression_type(&add(int(1), float(2.0)), &scope),
            Type::Float
        );
    }

    #[test]
    fn test_names_come_from_scope() {
        let table = InferenceTable::new();
        let mut scope = Scope::new();
        scope.push_function("f", vec![]);
        scope.declare_var_with_type("xs", Type::list(Type::Str));
        assert_eq!(
            table.inferred_expression_type(&subscript(name("xs"), int(0)), &scope),
            Type::Str
        );
        assert_eq!(table.inferred_expression_type(&name("nope"), &scope), Type::Unknown);
    }

    #[test]
    fn test_class_and_table_calls() {
        let table = InferenceTable::new()
            .with_class("Record")
            .with_return("helper", Type::Str);
        let scope = Scope::new();
        assert_eq!(
            table.inferred_expression_type(&call("Record", vec![int(0)]), &scope),
            Type::Instance("Record".to_string())
        );
        assert_eq!(
            table.inferred_expression_type(&call("helper", vec![]), &scope),
            Type::Str
        );
        assert_eq!(
            table.inferred_expression_type(&call("len", vec![name("x")]), &scope),
            Type::Int
        );
    }

    #[test]
    fn test_recursive_call_does_not_poison_arithmetic() {
        let table = InferenceTable::new();
        let mut scope = Scope::new();
        scope.push_function("fact", vec!["n".to_string()]);
        scope.declare_var_with_type("n", Type::Int);
        let body = if_exp(
            compare(name("n"), CmpOp::LtE, int(1)),
            int(1),
            mul(name("n"), call("fact", vec![sub(name("n"), int(1))])),
        );
        assert_eq!(table.inferred_expression_type(&body, &scope), Type::Int);
    }

    #[test]
    fn test_comprehension_target_types() {
        let table = InferenceTable::new();
        let mut scope = Scope::new();
        scope.push_function("f", vec![]);
        scope.declare_var_with_type("words", Type::list(Type::Str));
        let comp = list_comp(call("len", vec![name("w")]), "w", name("words"), vec![]);
        assert_eq!(
            table.inferred_expression_type(&comp, &scope),
            Type::list(Type::Int)
        );
    }

    #[test]
    fn test_table_lookups() {
        let table = InferenceTable::new()
            .with_param("outer.inner", "y", Type::Float)
            .with_fallible("load");
        assert_eq!(table.inferred_param_type("outer.inner", "y"), Some(Type::Float));
        assert_eq!(table.inferred_param_type("outer.inner", "z"), None);
        assert!(table.is_fallible("load"));
        assert!(!table.is_fallible("save"));
    }
}
