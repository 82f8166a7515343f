//! Compact constructors for HIR trees.
//!
//! Used by tests and by tools that synthesize fragments without a parser.

use crate::ir::*;
use ferrule_diagnostics::Span;
use ferrule_types::Type;

pub fn name(n: &str) -> Expr {
    Expr::Name(n.to_string())
}

pub fn int(v: i64) -> Expr {
    Expr::Constant(Constant::Int(v))
}

pub fn float(v: f64) -> Expr {
    Expr::Constant(Constant::Float(v))
}

pub fn string(s: &str) -> Expr {
    Expr::Constant(Constant::Str(s.to_string()))
}

pub fn boolean(b: bool) -> Expr {
    Expr::Constant(Constant::Bool(b))
}

pub fn none() -> Expr {
    Expr::Constant(Constant::None)
}

pub fn binop(left: Expr, op: BinOp, right: Expr) -> Expr {
    Expr::BinOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

pub fn add(left: Expr, right: Expr) -> Expr {
    binop(left, BinOp::Add, right)
}

pub fn sub(left: Expr, right: Expr) -> Expr {
    binop(left, BinOp::Sub, right)
}

pub fn mul(left: Expr, right: Expr) -> Expr {
    binop(left, BinOp::Mult, right)
}

pub fn compare(left: Expr, op: CmpOp, right: Expr) -> Expr {
    Expr::Compare {
        left: Box::new(left),
        ops: vec![op],
        comparators: vec![right],
    }
}

pub fn if_exp(test: Expr, body: Expr, orelse: Expr) -> Expr {
    Expr::IfExp {
        test: Box::new(test),
        body: Box::new(body),
        orelse: Box::new(orelse),
    }
}

/// Call of a plain name: `f(args...)`
pub fn call(func: &str, args: Vec<Expr>) -> Expr {
    call_expr(name(func), args)
}

pub fn call_expr(func: Expr, args: Vec<Expr>) -> Expr {
    Expr::Call {
        func: Box::new(func),
        args,
        keywords: Vec::new(),
    }
}

/// Method call: `obj.method(args...)`
pub fn method_call(obj: Expr, method: &str, args: Vec<Expr>) -> Expr {
    call_expr(attr(obj, method), args)
}

pub fn attr(value: Expr, attr: &str) -> Expr {
    Expr::Attribute {
        value: Box::new(value),
        attr: attr.to_string(),
    }
}

pub fn subscript(value: Expr, index: Expr) -> Expr {
    Expr::Subscript {
        value: Box::new(value),
        index: Box::new(index),
    }
}

pub fn list(elems: Vec<Expr>) -> Expr {
    Expr::List(elems)
}

pub fn dict(pairs: Vec<(Expr, Expr)>) -> Expr {
    let (keys, values) = pairs.into_iter().unzip();
    Expr::Dict { keys, values }
}

pub fn lambda(params: &[&str], body: Expr) -> Expr {
    Expr::Lambda {
        params: params.iter().map(|p| param(p)).collect(),
        body: Box::new(body),
    }
}

pub fn list_comp(elt: Expr, target: &str, iter: Expr, ifs: Vec<Expr>) -> Expr {
    Expr::ListComp {
        elt: Box::new(elt),
        generators: vec![Comprehension {
            target: Target::Name(target.to_string()),
            iter,
            ifs,
        }],
    }
}

pub fn fstring(parts: Vec<FStringPart>) -> Expr {
    Expr::FString(parts)
}

pub fn target(n: &str) -> Target {
    Target::Name(n.to_string())
}

pub fn assign(n: &str, value: Expr) -> Stmt {
    Stmt::Assign {
        target: target(n),
        value,
        annotation: None,
    }
}

pub fn assign_typed(n: &str, ty: Type, value: Expr) -> Stmt {
    Stmt::Assign {
        target: target(n),
        value,
        annotation: Some(ty),
    }
}

pub fn aug_assign(n: &str, op: BinOp, value: Expr) -> Stmt {
    Stmt::AugAssign {
        target: target(n),
        op,
        value,
    }
}

pub fn ret(value: Expr) -> Stmt {
    Stmt::Return(Some(value))
}

pub fn expr(e: Expr) -> Stmt {
    Stmt::Expr(e)
}

pub fn if_(test: Expr, body: Vec<Stmt>, orelse: Vec<Stmt>) -> Stmt {
    Stmt::If { test, body, orelse }
}

pub fn while_(test: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::While { test, body }
}

pub fn for_(t: &str, iter: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::For {
        target: target(t),
        iter,
        body,
    }
}

pub fn nonlocal(names: &[&str]) -> Stmt {
    Stmt::Nonlocal(names.iter().map(|n| n.to_string()).collect())
}

pub fn def(f: Function) -> Stmt {
    Stmt::FunctionDef(Box::new(f))
}

pub fn param(n: &str) -> Param {
    Param {
        name: n.to_string(),
        annotation: None,
        default: None,
    }
}

pub fn typed_param(n: &str, ty: Type) -> Param {
    Param {
        name: n.to_string(),
        annotation: Some(ty),
        default: None,
    }
}

/// Function with untyped parameters and no return annotation.
pub fn func(n: &str, params: &[&str], body: Vec<Stmt>) -> Function {
    Function {
        name: n.to_string(),
        params: params.iter().map(|p| param(p)).collect(),
        vararg: None,
        kwarg: None,
        return_annotation: None,
        body,
        decorators: Vec::new(),
        span: Span::DUMMY,
    }
}

/// Function with annotated parameters and return type.
pub fn typed_func(n: &str, params: Vec<Param>, ret_ty: Type, body: Vec<Stmt>) -> Function {
    Function {
        name: n.to_string(),
        params,
        vararg: None,
        kwarg: None,
        return_annotation: Some(ret_ty),
        body,
        decorators: Vec::new(),
        span: Span::DUMMY,
    }
}
