// ~/src/bootstrap.rs

use std::fs;
use std::path::Path;

use crate::data_loaders::{config::Config, yaml::write_yaml_atomic};
use crate::{error::Result, info, warn, DEBUG_NAME};

/// Prepares the owner's on-disk state: the config directory exists and a
/// config file is present. An existing file is never touched.
///
/// Returns whether a default config was scaffolded.
pub fn prepare(config_path: &Path) -> bool {
    info!("[{}] === Bootstrap starting ===", DEBUG_NAME);

    if let Some(dir) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(dir) {
            warn!("[{}] Failed to create {}: {e}", DEBUG_NAME, dir.display());
        }
    }

    match scaffold_config_yaml(config_path) {
        Ok(created) => created,
        Err(e) => {
            warn!("[{}] Failed to create {}: {e}", DEBUG_NAME, config_path.display());
            false
        }
    }
}

fn scaffold_config_yaml(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }

    write_yaml_atomic(path, &Config::default())?;
    info!("[{}] Created {}", DEBUG_NAME, path.display());
    Ok(true)
}
