//! The `config` module loads `Settings` from, in increasing priority, the
//! built-in defaults, an optional `config/default.{toml,yaml,json}` file, a
//! `.env` file and `TOPICBUS__SECTION__FIELD` environment variables.

mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    ClientSettings, DEFAULT_MAX_FRAME_SIZE, LoggingSettings, ServerSettings, Settings,
};

/// Loads the configuration from the default file and environment variables.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Loads the configuration from `path` (with or without an extension) and
/// environment variables, merging whatever is present with the defaults.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    // a missing .env is not an error
    dotenvy::dotenv().ok();

    let config = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix("TOPICBUS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let partial: PartialSettings = config.try_deserialize()?;
    Ok(partial.merge_with_defaults())
}

#[cfg(test)]
mod tests;
