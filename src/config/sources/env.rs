//! Environment source: SHOTQUEUE__SECTION__KEY overrides.

use config::builder::DefaultState;
use config::{ConfigBuilder, Environment};

pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix("SHOTQUEUE")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    )
}
