//! Closure representation selection.

use crate::capture::CaptureSet;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ClosureShape {
    /// No captures, not recursive: implementation routine plus an empty wrapper
    ZeroCapture,
    /// Captures, not recursive: the routine takes an explicit environment
    StructCapture,
    /// Recursive: one aggregate whose `call` reaches itself through `self`
    RecursiveSelfCapture,
}

impl ClosureShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClosureShape::ZeroCapture => "zero-capture",
            ClosureShape::StructCapture => "struct-capture",
            ClosureShape::RecursiveSelfCapture => "recursive-self-capture",
        }
    }
}

impl fmt::Display for ClosureShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosureRepresentation {
    pub shape: ClosureShape,
    /// Empty for [`ClosureShape::ZeroCapture`]
    pub captures: CaptureSet,
    pub recursive: bool,
}

impl ClosureRepresentation {
    pub fn has_environment(&self) -> bool {
        !self.captures.is_empty()
    }
}

/// Pick the shape for a capture set and recursion flag.
pub fn select_representation(captures: CaptureSet, recursive: bool) -> ClosureRepresentation {
    let shape = if recursive {
        ClosureShape::RecursiveSelfCapture
    } else if captures.is_empty() {
        ClosureShape::ZeroCapture
    } else {
        ClosureShape::StructCapture
    };
    ClosureRepresentation {
        shape,
        captures,
        recursive,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Capture, CaptureMode};
    use crate::scope::BindingKind;
    use ferrule_types::Type;

    fn one_capture() -> CaptureSet {
        let mut set = CaptureSet::new();
        set.insert(Capture {
            name: "outer".to_string(),
            kind: BindingKind::Param,
            ty: Type::Int,
            mode: CaptureMode::ByValue,
            source_ident: "outer".to_string(),
        });
        set
    }

    #[test]
    fn test_shapes() {
        assert_eq!(
            select_representation(CaptureSet::new(), false).shape,
            ClosureShape::ZeroCapture
        );
        assert_eq!(
            select_representation(one_capture(), false).shape,
            ClosureShape::StructCapture
        );
        // Recursion wins regardless of captures
        assert_eq!(
            select_representation(CaptureSet::new(), true).shape,
            ClosureShape::RecursiveSelfCapture
        );
        assert_eq!(
            select_representation(one_capture(), true).shape,
            ClosureShape::RecursiveSelfCapture
        );
    }

    #[test]
    fn test_selection_is_deterministic() {
        let a = select_representation(one_capture(), false);
        let b = select_representation(one_capture(), false);
        assert_eq!(a, b);
        assert!(a.has_environment());
    }
}
