//! Conversion options, usually read from the `[closures]` table of
//! `ferrule.toml`.

use serde::{Deserialize, Serialize};

/// What to put in a signature when the return type cannot be inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownReturnPolicy {
    /// Emit `runtime.Unknown`, which fails the target's type check if the
    /// value is ever used as something concrete
    Unknown,
    /// Emit `placeholder_type` and hope for the best
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    pub unknown_return: UnknownReturnPolicy,
    pub placeholder_type: String,
    /// Treat every heap allocation as a possible failure point
    pub allocation_is_fallible: bool,
    /// Suffix of synthesized implementation routines
    pub impl_suffix: String,
    /// Suffix of synthesized environment structs
    pub env_suffix: String,
    /// Suffix of synthesized closure wrapper structs
    pub wrapper_suffix: String,
    /// Identifier of the allocator visible to generated code
    pub allocator: String,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            unknown_return: UnknownReturnPolicy::Unknown,
            placeholder_type: "i64".to_string(),
            allocation_is_fallible: true,
            impl_suffix: "__impl".to_string(),
            env_suffix: "__Env".to_string(),
            wrapper_suffix: "__Closure".to_string(),
            allocator: "allocator".to_string(),
        }
    }
}

impl ConvertOptions {
    /// Target spelling of a return type nobody could infer.
    pub fn unknown_return_type(&self) -> &str {
        match self.unknown_return {
            UnknownReturnPolicy::Unknown => "runtime.Unknown",
            UnknownReturnPolicy::Placeholder => &self.placeholder_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct ConfigFile {
        closures: ConvertOptions,
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let text = r#"
            [closures]
            unknown_return = "placeholder"
            placeholder_type = "f64"
        "#;
        let config: ConfigFile = toml::from_str(text).unwrap();
        let opts = config.closures;
        assert_eq!(opts.unknown_return, UnknownReturnPolicy::Placeholder);
        assert_eq!(opts.unknown_return_type(), "f64");
        assert!(opts.allocation_is_fallible);
        assert_eq!(opts.wrapper_suffix, "__Closure");
    }

    #[test]
    fn test_default_surfaces_unknown() {
        assert_eq!(ConvertOptions::default().unknown_return_type(), "runtime.Unknown");
    }
}
