use crate::error::ConfigError;
use config::{builder::DefaultState, ConfigBuilder};
use std::env;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;
pub mod telemetry;

// Re-export the core types to provide a clean public API.
#[cfg(feature = "clap")]
pub use settings::ServerOverrides;
pub use settings::{DatabaseSettings, ServerSettings, Settings};

/// Loads the application settings.
///
/// Sources, lowest precedence first:
/// 1. built-in defaults (a local SQLite file, port 8000, any CORS origin),
/// 2. an optional `config.toml` in the working directory,
/// 3. `APP_`-prefixed environment variables, e.g. `APP_SERVER__PORT=9000`,
/// 4. the plain `DATABASE_URL` and `CORS_ORIGINS` variables.
pub fn load_settings() -> Result<Settings, ConfigError> {
    let builder = with_defaults(config::Config::builder())?
        .add_source(config::File::with_name("config").required(false))
        .add_source(app_environment())
        .set_override_option("database.url", env::var("DATABASE_URL").ok())?
        .set_override_option("server.cors_origins", env::var("CORS_ORIGINS").ok())?;

    finish(builder)
}

/// `APP_SECTION__KEY` variables: a single `_` after the prefix, `__` between
/// nested keys.
fn app_environment() -> config::Environment {
    config::Environment::with_prefix("APP")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn with_defaults(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(builder
        .set_default("database.url", "sqlite://health_system.db")?
        .set_default("database.max_connections", 5)?
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8000)?
        .set_default("server.cors_origins", "*")?)
}

fn finish(builder: ConfigBuilder<DefaultState>) -> Result<Settings, ConfigError> {
    let settings = builder.build()?.try_deserialize::<Settings>()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn from_toml(toml: &str) -> Result<Settings, ConfigError> {
        let builder = with_defaults(config::Config::builder())
            .unwrap()
            .add_source(File::from_str(toml, FileFormat::Toml));
        finish(builder)
    }

    #[test]
    fn defaults_are_usable() {
        let settings = from_toml("").unwrap();
        assert_eq!(settings.database.url, "sqlite://health_system.db");
        assert_eq!(settings.database.max_connections, 5);
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.server.socket_addr().unwrap().port(), 8000);
        assert!(settings.server.allowed_origins().is_empty());
    }

    #[test]
    fn file_values_override_defaults() {
        let settings = from_toml(
            r#"
            [database]
            url = "sqlite::memory:"

            [server]
            port = 9001
            cors_origins = "http://localhost:3000, https://clinic.example.org"
            "#,
        )
        .unwrap();

        assert_eq!(settings.database.url, "sqlite::memory:");
        assert_eq!(settings.server.port, 9001);
        assert_eq!(
            settings.server.allowed_origins(),
            vec!["http://localhost:3000", "https://clinic.example.org"]
        );
    }

    #[test]
    fn app_prefixed_variables_override_file_values() {
        let vars: config::Map<String, String> = [
            ("APP_SERVER__PORT", "9000"),
            ("APP_DATABASE__MAX_CONNECTIONS", "12"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let builder = with_defaults(config::Config::builder())
            .unwrap()
            .add_source(File::from_str("[server]\nport = 9001\n", FileFormat::Toml))
            .add_source(app_environment().source(Some(vars)));
        let settings = finish(builder).unwrap();

        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.database.max_connections, 12);
    }

    #[test]
    fn wildcard_anywhere_allows_any_origin() {
        let settings = from_toml(
            r#"
            [server]
            cors_origins = "http://localhost:3000,*"
            "#,
        )
        .unwrap();
        assert!(settings.server.allowed_origins().is_empty());
    }

    #[test]
    fn rejects_unparseable_host() {
        let err = from_toml(
            r#"
            [server]
            host = "not an address"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { key: "server.host", .. }));
    }

    #[test]
    fn rejects_zero_connections() {
        let err = from_toml(
            r#"
            [database]
            max_connections = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ValidationError { key: "database.max_connections", .. }
        ));
    }
}
