use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Seconds between reconciliation sweeps.
    pub reconcile_interval_seconds: u64,
    /// Capacity of the in-process notification channel.
    pub notification_buffer: usize,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Base settings first, then the per-environment overlay
            .add_source(config::File::with_name("config/default"))
            // Then the per-environment file, which is optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Then a local file that stays out of version control
            .add_source(config::File::with_name("config/local").required(false))
            // Environment wins: TRAMO_DATABASE__URL overrides database.url
            .add_source(config::Environment::with_prefix("TRAMO").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
