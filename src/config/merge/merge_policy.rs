//! Merge rules: defaults first, later sources override earlier ones key by key.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("grammar.max_options", 10)?
        .set_default("grammar.max_preview", 5)?
        .set_default("grammar.max_combinations", 1000)?
        .set_default("grammar.trim_whitespace", true)?
        .set_default("checkpoint.staleness_window_secs", 300)?
        .set_default("backend.timeout_secs", 120)
}
