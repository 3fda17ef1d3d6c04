use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Ticks per second.
    #[serde(default = "default_tick_rate")]
    pub tick_rate: u32,
    /// Stop after this many ticks; run until interrupted if absent.
    #[serde(default)]
    pub max_ticks: Option<u64>,
    /// Seed of the scenario driver's random choices.
    #[serde(default)]
    pub seed: u64,
}

/// Initial population of the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Side length of the square map, in tiles.
    #[serde(default = "default_map_size")]
    pub map_size: u16,
    #[serde(default = "default_players")]
    pub players: usize,
    #[serde(default)]
    pub pillboxes: usize,
    #[serde(default)]
    pub bases: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializerType {
    #[default]
    Json,
    Binary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    Stdio,
    File,
    #[default]
    Null,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub serializer: SerializerType,
    #[serde(default)]
    pub sender: SenderType,
    /// Required by the file sender.
    #[serde(default)]
    pub output_path: Option<String>,
    /// Send a table summary every N ticks.
    #[serde(default = "default_summary_frequency")]
    pub summary_frequency: u32,
    /// Compare the mirror against the authority every N ticks; 0 disables it.
    #[serde(default = "default_verify_frequency")]
    pub verify_frequency: u32,
}

fn default_tick_rate() -> u32 { 50 }
fn default_map_size() -> u16 { 256 }
fn default_players() -> usize { 2 }
fn default_summary_frequency() -> u32 { 10 }
fn default_verify_frequency() -> u32 { 1 }

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_rate: default_tick_rate(),
            max_ticks: None,
            seed: 0,
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            map_size: default_map_size(),
            players: default_players(),
            pillboxes: 0,
            bases: 0,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            serializer: SerializerType::default(),
            sender: SenderType::default(),
            output_path: None,
            summary_frequency: default_summary_frequency(),
            verify_frequency: default_verify_frequency(),
        }
    }
}
