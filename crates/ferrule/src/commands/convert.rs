//! Convert command - runs closure conversion over one module

use anyhow::{anyhow, Result};
use clap::Args;
use ferrule_diagnostics::{DiagnosticEmitter, JsonEmitter, TerminalEmitter};
use ferrule_hir::Module;
use ferrule_transform::{convert_closures, ConversionOutput, InferenceTable};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::FerruleConfig;
use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Module to convert, as HIR JSON
    pub input: PathBuf,

    /// Inference results for the module, as JSON
    #[arg(short, long)]
    pub types: Option<PathBuf>,

    /// Where to write the converted source (stdout by default)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Configuration file (defaults to ./ferrule.toml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let text = fs::read_to_string(path)
        .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&text)
        .map_err(|e| anyhow!("Invalid {} in {}: {}", what, path.display(), e))
}

pub fn run(args: ConvertArgs, format: OutputFormat, use_color: bool, quiet: bool) -> Result<()> {
    let config = FerruleConfig::load(args.config.as_deref())?;
    let module: Module = read_json(&args.input, "module")?;
    let oracle = match &args.types {
        Some(path) => read_json(path, "inference table")?,
        None => InferenceTable::default(),
    };
    log::info!(
        "converting `{}` ({} functions)",
        module.name,
        module.functions.len()
    );

    let output = convert_closures(&module, &oracle, &config.closures);
    let code = output.render();
    if let Some(path) = &args.output {
        fs::write(path, &code)
            .map_err(|e| anyhow!("Failed to write {}: {}", path.display(), e))?;
    }

    match format {
        OutputFormat::Text => {
            if args.output.is_none() {
                print!("{}", code);
            }
            if !quiet || output.diagnostics.has_errors() {
                let stderr = std::io::stderr();
                let mut emitter = TerminalEmitter::new(stderr.lock(), use_color, &module.name);
                emitter.emit_all(&output.diagnostics)?;
                emitter.emit_summary(&output.diagnostics)?;
            }
            if !quiet {
                print_closure_summary(&output);
            }
        }
        OutputFormat::Json => {
            let result = serde_json::json!({
                "success": !failed(&output, args.strict),
                "module": output.module,
                "code": code,
                "functions": output.functions,
                "diagnostics": output.diagnostics,
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
            if output.diagnostics.has_errors() {
                // Keep stdout machine-readable; details go to stderr
                let stderr = std::io::stderr();
                JsonEmitter::new(stderr.lock()).emit_summary(&output.diagnostics)?;
            }
        }
    }

    if failed(&output, args.strict) {
        return Err(anyhow!(
            "Conversion of `{}` failed with {} error(s) and {} warning(s)",
            output.module,
            output.diagnostics.error_count(),
            output.diagnostics.warning_count()
        ));
    }
    Ok(())
}

fn failed(output: &ConversionOutput, strict: bool) -> bool {
    output.diagnostics.has_errors() || (strict && output.diagnostics.warning_count() > 0)
}

fn print_closure_summary(output: &ConversionOutput) {
    let closures: Vec<_> = output.closures().collect();
    if closures.is_empty() {
        return;
    }
    eprintln!("\n{} closure(s):", closures.len());
    for c in closures {
        let captures = if c.captures.is_empty() {
            String::new()
        } else {
            format!(" [{}]", c.captures.join(", "))
        };
        eprintln!(
            "  {} -> {} ({}){}{}",
            c.qualname,
            c.wrapper,
            c.shape,
            captures,
            if c.fallible { " fallible" } else { "" }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrule_hir::build::*;
    use ferrule_transform::ConvertOptions;

    #[test]
    fn test_strict_fails_on_warnings() {
        let module = Module {
            name: "m".to_string(),
            globals: Vec::new(),
            functions: vec![func("f", &[], vec![ret(call("mystery", vec![]))])],
        };
        let output = convert_closures(&module, &InferenceTable::default(), &ConvertOptions::default());
        assert!(!failed(&output, false));
        assert!(failed(&output, true));
    }

    #[test]
    fn test_module_and_types_from_disk() {
        let dir = std::env::temp_dir().join(format!("ferrule-convert-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let module_path = dir.join("m.json");
        let types_path = dir.join("types.json");
        fs::write(
            &module_path,
            r#"{"name": "m", "functions": [{"name": "f", "params": [], "body": [{"Return": null}]}]}"#,
        )
        .unwrap();
        fs::write(&types_path, r#"{"returns": {"f": "None"}}"#).unwrap();

        let module: Module = read_json(&module_path, "module").unwrap();
        let table: InferenceTable = read_json(&types_path, "inference table").unwrap();
        assert_eq!(module.functions.len(), 1);
        assert!(table.returns.contains_key("f"));
        assert!(read_json::<Module>(&dir.join("missing.json"), "module").is_err());
        fs::remove_dir_all(&dir).ok();
    }
}
