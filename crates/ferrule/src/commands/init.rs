//! Init command - writes a ferrule.toml with the default options

use anyhow::Result;
use clap::Args;
use std::fs;
use std::path::PathBuf;

use crate::config::{FerruleConfig, CONFIG_FILE};
use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory to write the configuration into
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite an existing configuration
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: InitArgs, format: OutputFormat) -> Result<()> {
    fs::create_dir_all(&args.path)?;
    let config_path = args.path.join(CONFIG_FILE);
    let created = if config_path.exists() && !args.force {
        false
    } else {
        let text = FerruleConfig::default().to_toml()?;
        fs::write(&config_path, text)?;
        true
    };

    match format {
        OutputFormat::Text => {
            if created {
                println!("  Created {}", config_path.display());
            } else {
                println!("  Skipped {} (already exists)", config_path.display());
            }
        }
        OutputFormat::Json => {
            let result = serde_json::json!({
                "success": true,
                "created": created,
                "path": config_path.to_string_lossy(),
            });
            println!("{}", serde_json::to_string(&result)?);
        }
    }

    Ok(())
}
