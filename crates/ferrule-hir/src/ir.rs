//! HIR (High-level Intermediate Representation) definitions
//!
//! The HIR mirrors the dynamically typed source language closely: names are
//! still strings, scoping is still implicit, and nested functions are still
//! nested. Closure conversion consumes this tree directly.

use ferrule_diagnostics::Span;
use ferrule_types::Type;
use serde::{Deserialize, Serialize};

/// A complete HIR module (one source file)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Module name/path
    pub name: String,
    /// Module-level variables with their inferred types
    #[serde(default)]
    pub globals: Vec<Global>,
    /// Top-level function definitions
    #[serde(default)]
    pub functions: Vec<Function>,
}

/// A module-level variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Global {
    pub name: String,
    pub ty: Type,
}

/// A function definition (the unit closure conversion works on)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    /// Ordered positional/keyword formals
    #[serde(default)]
    pub params: Vec<Param>,
    /// `*args` collector
    #[serde(default)]
    pub vararg: Option<Param>,
    /// `**kwargs` collector
    #[serde(default)]
    pub kwarg: Option<Param>,
    /// Declared return annotation
    #[serde(default)]
    pub return_annotation: Option<Type>,
    #[serde(default)]
    pub body: Vec<Stmt>,
    #[serde(default)]
    pub decorators: Vec<Expr>,
    #[serde(default)]
    pub span: Span,
}

impl Function {
    /// Names of every formal, including the variadic and keyword collectors.
    pub fn formal_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.params.iter().map(|p| p.name.as_str()).collect();
        if let Some(ref v) = self.vararg {
            names.push(&v.name);
        }
        if let Some(ref k) = self.kwarg {
            names.push(&k.name);
        }
        names
    }

    pub fn has_formal(&self, name: &str) -> bool {
        self.formal_names().contains(&name)
    }
}

/// A formal parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(default)]
    pub annotation: Option<Type>,
    #[serde(default)]
    pub default: Option<Expr>,
}

/// Statement in a function body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// `target = value` (optionally annotated)
    Assign {
        target: Target,
        value: Expr,
        #[serde(default)]
        annotation: Option<Type>,
    },
    /// `target op= value`
    AugAssign {
        target: Target,
        op: BinOp,
        value: Expr,
    },
    /// Expression statement
    Expr(Expr),
    Return(Option<Expr>),
    If {
        test: Expr,
        body: Vec<Stmt>,
        #[serde(default)]
        orelse: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
    },
    For {
        target: Target,
        iter: Expr,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
    Pass,
    Raise(Option<Expr>),
    Assert {
        test: Expr,
        #[serde(default)]
        msg: Option<Expr>,
    },
    Try {
        body: Vec<Stmt>,
        #[serde(default)]
        handlers: Vec<ExceptHandler>,
        #[serde(default)]
        orelse: Vec<Stmt>,
        #[serde(default)]
        finalbody: Vec<Stmt>,
    },
    With {
        items: Vec<WithItem>,
        body: Vec<Stmt>,
    },
    /// Nested function definition
    FunctionDef(Box<Function>),
    Nonlocal(Vec<String>),
    Global(Vec<String>),
    Delete(Vec<Target>),
}

/// `except Kind as name:` clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptHandler {
    /// Exception class expression; `None` for a bare `except:`
    #[serde(default)]
    pub kind: Option<Expr>,
    #[serde(default)]
    pub name: Option<String>,
    pub body: Vec<Stmt>,
}

/// `with context as target` item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithItem {
    pub context: Expr,
    #[serde(default)]
    pub target: Option<Target>,
}

/// Assignment target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Target {
    Name(String),
    /// Destructuring: `a, (b, c) = ...`
    Tuple(Vec<Target>),
    Attribute { value: Expr, attr: String },
    Subscript { value: Expr, index: Expr },
    Starred(Box<Target>),
}

/// Expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Name(String),
    Constant(Constant),
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    BoolOp {
        op: BoolOp,
        values: Vec<Expr>,
    },
    /// Chained comparison: `left op0 c0 op1 c1 ...`
    Compare {
        left: Box<Expr>,
        ops: Vec<CmpOp>,
        comparators: Vec<Expr>,
    },
    Call {
        func: Box<Expr>,
        #[serde(default)]
        args: Vec<Expr>,
        #[serde(default)]
        keywords: Vec<Keyword>,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Set(Vec<Expr>),
    Dict {
        keys: Vec<Expr>,
        values: Vec<Expr>,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    Lambda {
        params: Vec<Param>,
        body: Box<Expr>,
    },
    ListComp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    SetComp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    GeneratorExp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    DictComp {
        key: Box<Expr>,
        value: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    /// Interpolated string
    FString(Vec<FStringPart>),
    Starred(Box<Expr>),
}

impl Expr {
    /// The name if this is a plain name reference.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Expr::Name(n) => Some(n),
            _ => None,
        }
    }
}

/// `for target in iter if cond` clause of a comprehension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comprehension {
    pub target: Target,
    pub iter: Expr,
    #[serde(default)]
    pub ifs: Vec<Expr>,
}

/// Keyword argument; `arg == None` for `**mapping`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub arg: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FStringPart {
    Literal(String),
    Interpolation(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mult,
    Div,
    FloorDiv,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    LShift,
    RShift,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}
