//! Closure conversion for Ferrule
//!
//! Turns nested functions and lambdas of the dynamically typed source into
//! statically dispatched wrapper types of the target:
//! - Capture analysis decides what each nested function takes from its
//!   enclosing scopes, and how (copy, pointer or borrow)
//! - Each closure gets one of three shapes: zero-capture, struct-capture or
//!   recursive self-capture
//! - Rebinding a name to a value of a different type shadow-renames it

pub mod capture;
pub mod closure;
pub mod context;
pub mod effects;
pub mod emit;
pub mod error;
pub mod options;
pub mod oracle;
pub mod plan;
pub mod rename;
pub mod scope;
pub mod shadow;
pub mod shape;
pub mod synth;
pub mod usage;

// Re-export main transformation functions
pub use closure::{convert_closures, ConversionOutput, ConvertedFunction};
pub use context::ClosureSummary;
pub use error::ConvertError;
pub use options::{ConvertOptions, UnknownReturnPolicy};
pub use oracle::{InferenceTable, TypeOracle};
pub use scope::Scope;
pub use shadow::resolve_shadow_or_reuse;
pub use shape::ClosureShape;
pub use synth::{synthesize_closure, SynthesizedClosure};
