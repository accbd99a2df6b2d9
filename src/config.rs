use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::game::constants::economy::{STARTING_COPPER, STARTING_CRYSTAL, STARTING_IRON};
use crate::game::constants::grid::{DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::game::constants::tick::TICK_RATE;
use crate::game::state::ResourceBundle;

/// Spawn schedule for a room, fixed for the room's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GameMode {
    #[default]
    Waves,
    Endless,
}

impl FromStr for GameMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "waves" | "wave" => Ok(GameMode::Waves),
            "endless" => Ok(GameMode::Endless),
            other => Err(format!("unknown game mode '{}'", other)),
        }
    }
}

/// Per-room configuration
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Grid width in cells, border ring included
    pub width: u32,
    /// Grid height in cells, border ring included
    pub height: u32,
    pub mode: GameMode,
    /// Fixed RNG seed; random when unset
    pub seed: Option<u64>,
    pub starting_resources: ResourceBundle,
    /// Drain extractor stores into the pool every tick
    pub auto_drain_extractors: bool,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            mode: GameMode::Waves,
            seed: None,
            starting_resources: ResourceBundle::new(STARTING_IRON, STARTING_COPPER, STARTING_CRYSTAL),
            auto_drain_extractors: true,
        }
    }
}

impl RoomConfig {
    pub fn with_mode(mut self, mode: GameMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.width < 5 || self.height < 5 {
            return Err("room grid must be at least 5x5".to_string());
        }
        if self.width > 256 || self.height > 256 {
            return Err("room grid cannot exceed 256x256".to_string());
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the metrics endpoint to
    pub bind_address: IpAddr,
    /// Port for the Prometheus endpoint (0 disables it)
    pub metrics_port: u16,
    /// Maximum number of concurrent game rooms
    pub max_rooms: usize,
    /// Maximum players per room
    pub max_players_per_room: usize,
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Rooms the headless binary starts on boot
    pub demo_rooms: usize,
    /// Defaults applied to newly created rooms
    pub room: RoomConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            metrics_port: 9090,
            max_rooms: 100,
            max_players_per_room: 4,
            tick_rate: TICK_RATE,
            demo_rooms: 1,
            room: RoomConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            if let Ok(parsed) = addr.parse() {
                config.bind_address = parsed;
            } else {
                tracing::warn!("Invalid BIND_ADDRESS '{}', using default", addr);
            }
        }

        if let Ok(port) = std::env::var("METRICS_PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                config.metrics_port = parsed;
            } else {
                tracing::warn!("Invalid METRICS_PORT '{}', using default", port);
            }
        }

        if let Ok(max_rooms) = std::env::var("MAX_ROOMS") {
            if let Ok(parsed) = max_rooms.parse::<usize>() {
                if parsed > 0 && parsed <= 10000 {
                    config.max_rooms = parsed;
                } else {
                    tracing::warn!("MAX_ROOMS must be 1-10000, using default");
                }
            } else {
                tracing::warn!("Invalid MAX_ROOMS '{}', using default", max_rooms);
            }
        }

        if let Ok(rate) = std::env::var("TICK_RATE") {
            match rate.parse::<u32>() {
                Ok(parsed) if (1..=120).contains(&parsed) => config.tick_rate = parsed,
                Ok(_) => tracing::warn!("TICK_RATE must be 1-120, using default"),
                Err(_) => tracing::warn!("Invalid TICK_RATE '{}', using default", rate),
            }
        }

        if let Ok(demo) = std::env::var("DEMO_ROOMS") {
            if let Ok(parsed) = demo.parse::<usize>() {
                config.demo_rooms = parsed;
            } else {
                tracing::warn!("Invalid DEMO_ROOMS '{}', using default", demo);
            }
        }

        if let Ok(mode) = std::env::var("GAME_MODE") {
            match mode.parse::<GameMode>() {
                Ok(parsed) => config.room.mode = parsed,
                Err(e) => tracing::warn!("{}, using default", e),
            }
        }

        if let Ok(seed) = std::env::var("ROOM_SEED") {
            if let Ok(parsed) = seed.parse::<u64>() {
                config.room.seed = Some(parsed);
            } else {
                tracing::warn!("Invalid ROOM_SEED '{}', ignoring", seed);
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.max_rooms == 0 {
            return Err("max_rooms must be at least 1".to_string());
        }
        if self.max_players_per_room == 0 {
            return Err("max_players_per_room must be at least 1".to_string());
        }
        if self.tick_rate == 0 {
            return Err("tick_rate must be at least 1".to_string());
        }
        if self.demo_rooms > self.max_rooms {
            return Err("demo_rooms cannot exceed max_rooms".to_string());
        }
        self.room.validate()
    }

    /// Seconds per simulation tick
    pub fn tick_dt(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }
}
