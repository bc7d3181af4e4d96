//! Config loading entry points.

use super::merge::merge_policy;
use super::sources::{env, global_file, workspace_file};
use super::ShotQueueConfig;
use crate::error::QueueError;
use config::{Config, File};
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load defaults, the global file, workspace files and environment overrides.
    pub fn load(workspace_root: &Path) -> Result<ShotQueueConfig, QueueError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root);
        let builder = env::add_to_builder(builder);
        Self::finish(builder.build()?)
    }

    /// Load a single file on top of defaults and environment overrides.
    pub fn load_from_file(path: &Path) -> Result<ShotQueueConfig, QueueError> {
        if !path.exists() {
            return Err(QueueError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let builder = merge_policy::builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()).required(true));
        let builder = env::add_to_builder(builder);
        Self::finish(builder.build()?)
    }

    fn finish(config: Config) -> Result<ShotQueueConfig, QueueError> {
        let parsed: ShotQueueConfig = config.try_deserialize()?;
        parsed.validate().map_err(|errors| {
            QueueError::Config(
                errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        })?;
        Ok(parsed)
    }
}
