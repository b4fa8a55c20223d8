use crate::core::config::{default_config_path, Config, CONFIG_TEMPLATE};
use crate::error::{FetchzipError, Result};
use crate::utils::fs;
use std::path::Path;

pub fn init_config(force: bool) -> Result<()> {
    let path = default_config_path()?;
    write_template(&path, force)?;
    println!("✅ Wrote config template to {}", path.display());
    println!("   Set source_address and destination_directory, or pass --url and --dir");
    Ok(())
}

fn write_template(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(FetchzipError::ConfigExists {
            path: path.to_path_buf(),
        });
    }
    fs::ensure_parent_exists(path)?;
    std::fs::write(path, CONFIG_TEMPLATE)?;
    Ok(())
}

pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
