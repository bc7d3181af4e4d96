//! Workspace config files: `config/config.toml`, then `config/{SHOTQUEUE_ENV}.toml`.

use config::builder::DefaultState;
use config::{ConfigBuilder, File};
use std::path::{Path, PathBuf};
use tracing::debug;

const DEFAULT_ENV: &str = "development";

/// Existing workspace config files, lowest precedence first.
pub fn workspace_config_files(workspace_root: &Path) -> Vec<PathBuf> {
    let env_name = std::env::var("SHOTQUEUE_ENV")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_ENV.to_string());
    let dir = workspace_root.join("config");
    [dir.join("config.toml"), dir.join(format!("{env_name}.toml"))]
        .into_iter()
        .filter(|path| path.is_file())
        .collect()
}

pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> ConfigBuilder<DefaultState> {
    workspace_config_files(workspace_root)
        .into_iter()
        .fold(builder, |builder, path| {
            debug!(config_path = %path.display(), "Loading workspace configuration");
            builder.add_source(File::from(path).required(false))
        })
}
