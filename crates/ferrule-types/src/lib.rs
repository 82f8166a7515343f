//! Type system for Ferrule
//!
//! Defines the inferred types tracked for source-language bindings and how
//! each of them is spelled in the statically typed target.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Target spelling of the dynamic value type (tagged union fallback).
pub const DYNAMIC_VALUE: &str = "runtime.Value";

/// Core type representation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// The `None` singleton
    None,
    /// Boolean type
    Bool,
    /// Machine integer (i64 in the target)
    Int,
    /// Arbitrary precision integer
    BigInt,
    /// Floating point (f64)
    Float,
    /// Text string
    Str,
    /// Raw bytes
    Bytes,
    /// Growable list with element type
    List(Box<Type>),
    /// Hash map with key and value types
    Dict(Box<Type>, Box<Type>),
    /// Hash set with element type
    Set(Box<Type>),
    /// Fixed-size tuple
    Tuple(Vec<Type>),
    /// Instance of a user-defined record/class
    Instance(String),
    /// Plain function pointer
    Function(FunctionType),
    /// Synthesized closure wrapper
    Closure(ClosureType),
    /// The oracle could not settle on one type across all reaching definitions
    Union(Vec<Type>),
    /// Inference failed
    Unknown,
}

/// Function signature information
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionType {
    pub params: Vec<Type>,
    pub return_type: Box<Type>,
    /// Whether calls return an error union
    pub fallible: bool,
}

/// A closure wrapper type: the synthesized aggregate name plus its signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClosureType {
    pub wrapper: String,
    pub signature: FunctionType,
}

impl Type {
    pub fn list(elem: Type) -> Type {
        Type::List(Box::new(elem))
    }

    pub fn dict(key: Type, value: Type) -> Type {
        Type::Dict(Box::new(key), Box::new(value))
    }

    pub fn set(elem: Type) -> Type {
        Type::Set(Box::new(elem))
    }

    /// Check if this type is numeric (int, bigint, float)
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::BigInt | Type::Float)
    }

    /// Sequence-valued types (list, tuple, str, bytes)
    pub fn is_sequence(&self) -> bool {
        matches!(self, Type::List(_) | Type::Tuple(_) | Type::Str | Type::Bytes)
    }

    /// Check if values of this type have reference semantics.
    ///
    /// Assigning one of these to another variable shares the underlying
    /// container instead of copying it.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Type::List(_) | Type::Dict(_, _) | Type::Set(_) | Type::Instance(_)
        )
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Type::Function(_) | Type::Closure(_))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown)
    }

    /// Return type of a callable type, if any.
    pub fn return_type(&self) -> Option<&Type> {
        match self {
            Type::Function(f) => Some(&f.return_type),
            Type::Closure(c) => Some(&c.signature.return_type),
            _ => None,
        }
    }

    /// Whether calling a value of this type can fail.
    pub fn is_fallible_callable(&self) -> bool {
        match self {
            Type::Function(f) => f.fallible,
            Type::Closure(c) => c.signature.fallible,
            _ => false,
        }
    }

    /// Check whether a binding of type `self` can hold a value of type `new`
    /// without changing its target representation.
    ///
    /// `Unknown` acts as a wildcard at any depth.
    pub fn is_compatible_with(&self, new: &Type) -> bool {
        match (self, new) {
            (Type::Unknown, _) | (_, Type::Unknown) => true,
            (Type::List(a), Type::List(b)) | (Type::Set(a), Type::Set(b)) => {
                a.is_compatible_with(b)
            }
            (Type::Dict(ka, va), Type::Dict(kb, vb)) => {
                ka.is_compatible_with(kb) && va.is_compatible_with(vb)
            }
            (Type::Tuple(a), Type::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.is_compatible_with(y))
            }
            (Type::Union(members), other) => {
                // The tagged union can already hold any of its members
                members.iter().any(|m| m.is_compatible_with(other))
            }
            (Type::Closure(a), Type::Closure(b)) => a.wrapper == b.wrapper,
            _ => self == new,
        }
    }

    /// Least upper bound of two inferred types.
    pub fn join(&self, other: &Type) -> Type {
        match (self, other) {
            (Type::Unknown, t) | (t, Type::Unknown) => t.clone(),
            (a, b) if a == b => a.clone(),
            (Type::Int, Type::Float) | (Type::Float, Type::Int) => Type::Float,
            (Type::Bool, Type::Int) | (Type::Int, Type::Bool) => Type::Int,
            (Type::List(a), Type::List(b)) if a.is_compatible_with(b) => Type::list(a.join(b)),
            (Type::Set(a), Type::Set(b)) if a.is_compatible_with(b) => Type::set(a.join(b)),
            (Type::Dict(ka, va), Type::Dict(kb, vb))
                if ka.is_compatible_with(kb) && va.is_compatible_with(vb) =>
            {
                Type::dict(ka.join(kb), va.join(vb))
            }
            _ => {
                let mut members = Vec::new();
                for t in [self, other] {
                    match t {
                        Type::Union(inner) => {
                            for m in inner {
                                push_unique(&mut members, m.clone());
                            }
                        }
                        t => push_unique(&mut members, t.clone()),
                    }
                }
                if members.len() == 1 {
                    members.pop().unwrap_or(Type::Unknown)
                } else {
                    Type::Union(members)
                }
            }
        }
    }

    /// Whether this type has a single static representation in the target.
    ///
    /// Unions fall back to the tagged `runtime.Value`, which can carry any
    /// data member but not differently shaped callables.
    pub fn is_statically_representable(&self) -> bool {
        match self {
            Type::Union(members) => members.iter().all(|m| {
                !m.is_callable() && !matches!(m, Type::Union(_)) && m.is_statically_representable()
            }),
            Type::List(t) | Type::Set(t) => t.is_statically_representable(),
            Type::Dict(k, v) => k.is_statically_representable() && v.is_statically_representable(),
            Type::Tuple(ts) => ts.iter().all(Type::is_statically_representable),
            _ => true,
        }
    }

    /// Spell this type in the target language.
    pub fn target_name(&self) -> String {
        match self {
            Type::None => "void".to_string(),
            Type::Bool => "bool".to_string(),
            Type::Int => "i64".to_string(),
            Type::BigInt => "runtime.BigInt".to_string(),
            Type::Float => "f64".to_string(),
            Type::Str | Type::Bytes => "[]const u8".to_string(),
            Type::List(t) => format!("*runtime.List({})", t.target_name()),
            Type::Dict(k, v) => format!("*runtime.Dict({}, {})", k.target_name(), v.target_name()),
            Type::Set(t) => format!("*runtime.Set({})", t.target_name()),
            Type::Tuple(ts) => {
                let fields: Vec<String> = ts.iter().map(Type::target_name).collect();
                format!("struct {{ {} }}", fields.join(", "))
            }
            Type::Instance(name) => format!("*{}", name),
            Type::Function(f) => {
                let params: Vec<String> = f.params.iter().map(Type::target_name).collect();
                let ret = f.return_type.target_name();
                if f.fallible {
                    format!("*const fn ({}) anyerror!{}", params.join(", "), ret)
                } else {
                    format!("*const fn ({}) {}", params.join(", "), ret)
                }
            }
            Type::Closure(c) => c.wrapper.clone(),
            Type::Union(_) | Type::Unknown => DYNAMIC_VALUE.to_string(),
        }
    }
}

fn push_unique(members: &mut Vec<Type>, t: Type) {
    if !members.contains(&t) {
        members.push(t);
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::None => write!(f, "None"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::BigInt => write!(f, "bigint"),
            Type::Float => write!(f, "float"),
            Type::Str => write!(f, "str"),
            Type::Bytes => write!(f, "bytes"),
            Type::List(t) => write!(f, "list[{}]", t),
            Type::Dict(k, v) => write!(f, "dict[{}, {}]", k, v),
            Type::Set(t) => write!(f, "set[{}]", t),
            Type::Tuple(ts) => {
                write!(f, "tuple[")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, "]")
            }
            Type::Instance(name) => write!(f, "{}", name),
            Type::Function(ft) => write!(f, "function -> {}", ft.return_type),
            Type::Closure(c) => write!(f, "closure {}", c.wrapper),
            Type::Union(members) => {
                for (i, t) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{}", t)?;
                }
                Ok(())
            }
            Type::Unknown => write!(f, "unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_fn() -> Type {
        Type::Function(FunctionType {
            params: vec![Type::Int],
            return_type: Box::new(Type::Int),
            fallible: false,
        })
    }

    #[test]
    fn test_compatibility() {
        assert!(Type::Int.is_compatible_with(&Type::Int));
        assert!(Type::Int.is_compatible_with(&Type::Unknown));
        assert!(!Type::Int.is_compatible_with(&Type::Instance("Wrap".to_string())));
        assert!(!Type::list(Type::Int).is_compatible_with(&Type::dict(Type::Str, Type::Int)));
        assert!(Type::list(Type::Unknown).is_compatible_with(&Type::list(Type::Str)));
        assert!(!Type::Int.is_compatible_with(&Type::Float));
    }

    #[test]
    fn test_join() {
        assert_eq!(Type::Int.join(&Type::Float), Type::Float);
        assert_eq!(Type::Unknown.join(&Type::Str), Type::Str);
        assert_eq!(
            Type::Int.join(&Type::Str),
            Type::Union(vec![Type::Int, Type::Str])
        );
        // Joining into an existing union does not nest or duplicate
        let u = Type::Int.join(&Type::Str).join(&Type::Int);
        assert_eq!(u, Type::Union(vec![Type::Int, Type::Str]));
    }

    #[test]
    fn test_representable() {
        assert!(Type::Union(vec![Type::Int, Type::Str]).is_statically_representable());
        assert!(!Type::Union(vec![Type::Int, int_fn()]).is_statically_representable());
        assert!(!Type::list(Type::Union(vec![int_fn(), Type::None])).is_statically_representable());
    }

    #[test]
    fn test_target_name() {
        assert_eq!(Type::Int.target_name(), "i64");
        assert_eq!(Type::list(Type::Int).target_name(), "*runtime.List(i64)");
        assert_eq!(
            Type::dict(Type::Str, Type::Float).target_name(),
            "*runtime.Dict([]const u8, f64)"
        );
        assert_eq!(Type::Instance("Point".to_string()).target_name(), "*Point");
        assert_eq!(int_fn().target_name(), "*const fn (i64) i64");
        assert_eq!(Type::Union(vec![Type::Int, Type::Str]).target_name(), DYNAMIC_VALUE);
    }

    #[test]
    fn test_reference_semantics() {
        assert!(Type::list(Type::Int).is_reference());
        assert!(Type::Instance("Node".to_string()).is_reference());
        assert!(!Type::Str.is_reference());
        assert!(!Type::Tuple(vec![Type::Int]).is_reference());
    }
}
