//! Explain command - explain diagnostic codes

use anyhow::{anyhow, Result};
use clap::Args;

use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct ExplainArgs {
    /// Diagnostic code to explain (e.g., A001, C001)
    pub code: String,
}

struct ErrorExplanation {
    code: &'static str,
    title: &'static str,
    description: &'static str,
    example: Option<&'static str>,
    suggestion: Option<&'static str>,
    related: &'static [&'static str],
}

const ERROR_EXPLANATIONS: &[ErrorExplanation] = &[
    // Analysis limitations
    ErrorExplanation {
        code: "A001",
        title: "Unresolved Return Type",
        description: r#"Type inference could not settle on a return type for a function or closure.

The converter still emits it, using `runtime.Unknown` (or the configured
placeholder type) in the signature. `runtime.Unknown` fails the target's type
check as soon as the result is used as something concrete."#,
        example: Some("def pick(flag):\n    return lookup(flag)   # lookup() is not known to inference"),
        suggestion: Some("Annotate the return type, or set `unknown_return = \"placeholder\"` in the [closures] table of ferrule.toml."),
        related: &["A002", "A003"],
    },
    ErrorExplanation {
        code: "A002",
        title: "Unresolved Capture Type",
        description: "A closure captures a variable whose type is unknown. The environment field holds a dynamic `runtime.Value`, so every use goes through the runtime.",
        example: Some("def outer(cfg):\n    def get():\n        return cfg   # cfg has no inferred type"),
        suggestion: Some("Annotate the captured variable or the parameter it comes from."),
        related: &["A001", "A003"],
    },
    ErrorExplanation {
        code: "A003",
        title: "Unresolved Parameter Type",
        description: "A parameter has no annotation, no inferred type and no typed default. It is passed as a dynamic `runtime.Value`.",
        example: Some("def scale(x):\n    return x * 2"),
        suggestion: Some("Annotate the parameter: def scale(x: int)"),
        related: &["A001"],
    },
    // Capture errors
    ErrorExplanation {
        code: "C001",
        title: "Unsupported Capture",
        description: r#"A closure captures a variable whose type has no single static representation.

Callables are converted to distinct wrapper types. A variable that holds a
callable on one path and something else (or a different callable) on another
cannot be stored in one environment field."#,
        example: Some("def outer(flag):\n    op = (lambda v: v) if flag else 0\n    def apply(x):\n        return op(x)"),
        suggestion: Some("Give the variable a single callable type on every path, or pass the value in as a parameter instead of capturing it."),
        related: &["U001"],
    },
    // Unsupported constructs
    ErrorExplanation {
        code: "U001",
        title: "Unsupported Construct",
        description: "The function uses a construct closure conversion cannot lower, such as a starred expression outside a call or assignment to a destructuring target through an augmented operator. The function is left out of the output; the rest of the module still converts.",
        example: Some("def spread(xs):\n    return *xs"),
        suggestion: Some("Rewrite the construct with explicit indexing or a loop."),
        related: &["C001"],
    },
    // Internal
    ErrorExplanation {
        code: "I001",
        title: "Internal Error",
        description: "The converter reached a state it considers impossible, for example unbalanced scope frames.",
        example: None,
        suggestion: Some("Please report this with the module JSON that triggers it."),
        related: &[],
    },
];

pub fn run(args: ExplainArgs, format: OutputFormat, use_color: bool) -> Result<()> {
    let code = args.code.to_uppercase();

    let explanation = ERROR_EXPLANATIONS
        .iter()
        .find(|e| e.code == code)
        .ok_or_else(|| anyhow!("Unknown diagnostic code: {}", code))?;

    match format {
        OutputFormat::Text => {
            let rule = "=".repeat(code.len() + explanation.title.len() + 2);
            if use_color {
                println!(
                    "\n{}: {}\n{}",
                    console::style(&code).bold().cyan(),
                    console::style(explanation.title).bold(),
                    rule
                );
            } else {
                println!("\n{}: {}\n{}", code, explanation.title, rule);
            }

            println!("\n{}\n", explanation.description);

            if let Some(example) = explanation.example {
                if use_color {
                    println!("{}:", console::style("Example").bold());
                } else {
                    println!("Example:");
                }
                for line in example.lines() {
                    println!("  {}", line);
                }
                println!();
            }

            if let Some(suggestion) = explanation.suggestion {
                if use_color {
                    println!("{}:", console::style("Suggestion").bold().green());
                } else {
                    println!("Suggestion:");
                }
                for line in suggestion.lines() {
                    println!("  {}", line);
                }
                println!();
            }

            if !explanation.related.is_empty() {
                if use_color {
                    println!(
                        "{}: {}",
                        console::style("Related").dim(),
                        explanation.related.join(", ")
                    );
                } else {
                    println!("Related: {}", explanation.related.join(", "));
                }
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "code": explanation.code,
                "title": explanation.title,
                "description": explanation.description,
                "example": explanation.example,
                "suggestion": explanation.suggestion,
                "related": explanation.related,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrule_diagnostics::DiagnosticCode;

    #[test]
    fn test_every_code_is_explained() {
        for code in DiagnosticCode::ALL {
            assert!(
                ERROR_EXPLANATIONS.iter().any(|e| e.code == code.as_str()),
                "{} has no explanation",
                code.as_str()
            );
        }
    }

    #[test]
    fn test_related_codes_exist() {
        for e in ERROR_EXPLANATIONS {
            for r in e.related {
                assert!(ERROR_EXPLANATIONS.iter().any(|x| x.code == *r), "{} -> {}", e.code, r);
            }
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let args = ExplainArgs {
            code: "a001".to_string(),
        };
        assert!(run(args, OutputFormat::Json, false).is_ok());
        let args = ExplainArgs {
            code: "Z999".to_string(),
        };
        assert!(run(args, OutputFormat::Text, false).is_err());
    }
}
