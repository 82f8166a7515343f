//! Errors raised while converting a function.

use ferrule_diagnostics::{Diagnostic, DiagnosticCode, Span};
use ferrule_types::Type;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConvertError {
    /// A captured binding's type has no single static representation
    #[error("cannot capture `{variable}` in `{function}`: type `{ty}` has no static representation")]
    UnsupportedCapture {
        function: String,
        variable: String,
        ty: Type,
        span: Span,
    },

    #[error("unsupported construct in `{function}`: {what}")]
    UnsupportedConstruct {
        function: String,
        what: String,
        span: Span,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ConvertError>;

impl ConvertError {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            ConvertError::UnsupportedCapture { .. } => DiagnosticCode::UnsupportedCapture,
            ConvertError::UnsupportedConstruct { .. } => DiagnosticCode::UnsupportedConstruct,
            ConvertError::Internal(_) => DiagnosticCode::InternalError,
        }
    }

    /// Convert into a diagnostic for reporting.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let builder = Diagnostic::error(self.code(), self.to_string());
        match self {
            ConvertError::UnsupportedCapture { function, ty, span, .. } => builder
                .in_function(function.clone())
                .with_span(*span)
                .with_help(format!(
                    "`{}` mixes callables with other values; give the variable a single callable type or stop capturing it",
                    ty
                ))
                .build(),
            ConvertError::UnsupportedConstruct { function, span, .. } => {
                builder.in_function(function.clone()).with_span(*span).build()
            }
            ConvertError::Internal(_) => builder
                .with_help("this is a bug in the closure converter")
                .build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_capture_names_function_and_variable() {
        let err = ConvertError::UnsupportedCapture {
            function: "outer.inner".to_string(),
            variable: "cb".to_string(),
            ty: Type::Union(vec![Type::Int, Type::Unknown]),
            span: Span::new(3, 4),
        };
        let diag = err.to_diagnostic();
        assert_eq!(diag.code, DiagnosticCode::UnsupportedCapture);
        assert!(diag.is_error());
        assert!(diag.message.contains("`cb`"));
        assert!(diag.message.contains("`outer.inner`"));
        assert_eq!(diag.function.as_deref(), Some("outer.inner"));
        assert_eq!(diag.span, Span::new(3, 4));
    }

    #[test]
    fn test_internal_maps_to_i001() {
        let diag = ConvertError::Internal("frame stack underflow".to_string()).to_diagnostic();
        assert_eq!(diag.code.as_str(), "I001");
    }
}
