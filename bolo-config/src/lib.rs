use std::fs;
use std::path::Path;

use thiserror::Error;

pub use self::types::{Config, SenderType, SerializerType, SimulationConfig, TransportConfig, WorldConfig};
mod types;

/// Upper bound on entities a 16-bit wire index can address.
pub const MAX_WIRE_INDEX: usize = u16::MAX as usize - 1;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileReadError(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParseError(#[from] serde_json::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads a `.toml` file as TOML and anything else as JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        if is_toml {
            Self::from_toml_str(&content)
        } else {
            Self::from_json_str(&content)
        }
    }

    pub fn from_json_str(content: &str) -> Result<Config, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_toml_str(content: &str) -> Result<Config, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.simulation.tick_rate == 0 {
            return Err(ConfigError::ValidationError(
                "Tick rate must be greater than 0".to_string(),
            ));
        }

        if config.world.map_size == 0 || config.world.map_size == u16::MAX {
            return Err(ConfigError::ValidationError(format!(
                "Map size must be between 1 and {}",
                u16::MAX - 1
            )));
        }

        let world = &config.world;
        let population = world
            .players
            .checked_add(world.pillboxes)
            .and_then(|sum| sum.checked_add(world.bases))
            .filter(|population| *population <= MAX_WIRE_INDEX);
        if population.is_none() {
            return Err(ConfigError::ValidationError(format!(
                "Initial population of {} players, {} pillboxes and {} bases exceeds the {} entities a packet can address",
                world.players, world.pillboxes, world.bases, MAX_WIRE_INDEX
            )));
        }

        if config.transport.sender == SenderType::File && config.transport.output_path.is_none() {
            return Err(ConfigError::ValidationError(
                "The file sender needs an output_path".to_string(),
            ));
        }

        if config.transport.summary_frequency == 0 {
            return Err(ConfigError::ValidationError(
                "Summary frequency must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Loads and validates in one step.
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let config = Self::from_file(path)?;
        Self::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    fn write_config(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn load_json_config() {
        let file = write_config(
            ".json",
            r#"{
              "simulation": { "tick_rate": 20, "max_ticks": 100, "seed": 9 },
              "world": { "map_size": 128, "players": 4, "pillboxes": 6, "bases": 2 },
              "transport": { "serializer": "binary", "sender": "file", "output_path": "out.log" }
            }"#,
        );
        let config = ConfigLoader::load(file.path()).unwrap();

        assert_eq!(config.simulation.tick_rate, 20);
        assert_eq!(config.simulation.max_ticks, Some(100));
        assert_eq!(config.world.players, 4);
        assert_eq!(config.transport.serializer, SerializerType::Binary);
        assert_eq!(config.transport.sender, SenderType::File);
        assert_eq!(config.transport.summary_frequency, 10);
    }

    #[test]
    fn load_toml_config() {
        let file = write_config(
            ".toml",
            r#"
            [simulation]
            tick_rate = 30

            [world]
            pillboxes = 3

            [transport]
            sender = "stdio"
            "#,
        );
        let config = ConfigLoader::load(file.path()).unwrap();

        assert_eq!(config.simulation.tick_rate, 30);
        assert_eq!(config.world.players, 2);
        assert_eq!(config.world.pillboxes, 3);
        assert_eq!(config.transport.sender, SenderType::Stdio);
        assert_eq!(config.transport.serializer, SerializerType::Json);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config = ConfigLoader::from_json_str("{}").unwrap();
        assert_eq!(config, Config::default());
        ConfigLoader::validate(&config).unwrap();
    }

    #[test]
    fn zero_tick_rate_is_invalid() {
        let file = write_config(".json", r#"{ "simulation": { "tick_rate": 0 } }"#);
        let result = ConfigLoader::load(file.path());
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn file_sender_needs_a_path() {
        let mut config = Config::default();
        config.transport.sender = SenderType::File;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn population_must_fit_wire_indices() {
        let mut config = Config::default();
        config.world.pillboxes = MAX_WIRE_INDEX;
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn huge_population_is_invalid_not_a_panic() {
        let mut config = Config::default();
        config.world.players = usize::MAX;
        config.world.bases = 1;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ValidationError(_))
        ));

        let file = write_config(
            ".json",
            &format!(r#"{{ "world": {{ "players": {}, "pillboxes": {} }} }}"#, usize::MAX, usize::MAX),
        );
        assert!(matches!(
            ConfigLoader::load(file.path()),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn parse_errors_name_the_format() {
        let file = write_config(".toml", "simulation = [");
        assert!(matches!(
            ConfigLoader::from_file(file.path()),
            Err(ConfigError::TomlParseError(_))
        ));

        let file = write_config(".json", "{ nope");
        assert!(matches!(
            ConfigLoader::from_file(file.path()),
            Err(ConfigError::JsonParseError(_))
        ));
    }
}
