//! High-level Intermediate Representation (HIR) for Ferrule
//!
//! The HIR is the parser's hand-off format: a name-based tree of functions,
//! statements and expressions of the dynamically typed source language.

pub mod build;
pub mod ir;

pub use ir::*;
