mod settings;

use config::{Config, ConfigError, Environment, File};

pub use settings::{
    LoggingSettings, PartialSettings, PumpSettings, Settings, TransportSettings,
};

/// Environment variable prefix, e.g. `SCALEOUT__TRANSPORT__TOPIC_COUNT=8`.
pub const ENV_PREFIX: &str = "SCALEOUT";

/// Loads the configuration from the default file and environment variables
/// Merges the configuration with default values
/// Returns a `Settings` struct containing the transport, pump and logging configurations
pub fn load_config() -> Result<Settings, ConfigError> {
    // a missing .env is the normal case
    dotenvy::dotenv().ok();

    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(Settings::merge(partial))
}
