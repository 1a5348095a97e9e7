//! Configuration file loading
//!
//! Dump options come from a JSON file: the one given with `--config`, or
//! `<config dir>/rustdump/config.json` when it exists. Missing keys keep
//! their defaults; command line flags are applied on top afterwards.

use crate::dump::DumpOptions;
use crate::error::{Result, RustDumpError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const APP_DIR: &str = "rustdump";
const CONFIG_FILE: &str = "config.json";

/// Per-user configuration file location, if the platform has one.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}

/// Parse options from one JSON file and validate them.
pub fn load_from(path: &Path) -> Result<DumpOptions> {
    let content = fs::read_to_string(path).map_err(|e| {
        RustDumpError::Io(std::io::Error::new(
            e.kind(),
            format!("Cannot read config file {:?}: {}", path, e),
        ))
    })?;
    let options: DumpOptions = serde_json::from_str(&content)
        .map_err(|e| RustDumpError::parse(format!("Invalid config file {:?}: {}", path, e)))?;
    options.validate()?;
    info!("Loaded configuration from {:?}", path);
    Ok(options)
}

/// An explicit path must exist; the per-user file is optional.
pub fn load(explicit: Option<&Path>) -> Result<DumpOptions> {
    if let Some(path) = explicit {
        return load_from(path);
    }

    match default_config_path() {
        Some(path) if path.is_file() => load_from(&path),
        Some(path) => {
            debug!("No configuration at {:?}, using defaults", path);
            Ok(DumpOptions::default())
        }
        None => Ok(DumpOptions::default()),
    }
}
