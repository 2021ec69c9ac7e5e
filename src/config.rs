//! Node Configuration
//!
//! Loaded from the JSON file named by `COINFIGHT_CONFIG`; every field has a
//! default so a partial file (or none at all) is fine.

use std::path::Path;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::codec::CodecError;
use crate::core::coins::CoinsInt;
use crate::core::vec2::Vec2;
use crate::game::player::{Player, PlayerId};
use crate::game::world::{Game, GameError};
use crate::network::transport::DEFAULT_MAX_MESSAGE_BYTES;

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "COINFIGHT_CONFIG";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("reading {path}: {source}")]
    Io {
        /// Path that failed
        path: String,
        /// Cause
        source: std::io::Error,
    },

    /// File is not valid JSON for [`NodeConfig`]
    #[error("parsing config: {0}")]
    Parse(#[from] serde_json::Error),

    /// Roster is empty
    #[error("roster must name at least one player")]
    EmptyRoster,

    /// A roster address does not fit the wire
    #[error("invalid roster address: {0}")]
    Address(#[from] CodecError),

    /// More starting Gateways than players
    #[error("{gateways} gateway positions for {players} players")]
    TooManyGateways {
        /// Positions given
        gateways: usize,
        /// Roster size
        players: usize,
    },
}

/// Settings for a simulation node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// `tracing` filter directive; `RUST_LOG` takes precedence
    pub log_filter: String,
    /// Player addresses, in roster order
    pub roster: Vec<String>,
    /// Coins in the genesis honeypot pile
    pub honeypot_amount: CoinsInt,
    /// Where the honeypot sits
    pub honeypot_position: Vec2,
    /// Genesis credit per player
    pub seed_credit: CoinsInt,
    /// Completed starting Gateway per player, in roster order
    pub gateway_positions: Vec<Vec2>,
    /// Largest message a replica accepts
    pub max_message_bytes: u64,
    /// Frames to run in the demo
    pub demo_frames: u64,
    /// Frames between state-hash checkpoints; 0 disables
    pub checkpoint_interval: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            roster: vec!["0xA11CE".to_string(), "0xB0B".to_string()],
            honeypot_amount: 1_000,
            honeypot_position: Vec2::new(0.0, 100.0),
            seed_credit: 500,
            gateway_positions: vec![Vec2::new(-150.0, 0.0), Vec2::new(150.0, 0.0)],
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            demo_frames: 600,
            checkpoint_interval: 60,
        }
    }
}

impl NodeConfig {
    /// Parse from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Load from the file named by [`CONFIG_ENV_VAR`], or defaults if unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) => Self::from_file(path),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Check the roster.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.roster.is_empty() {
            return Err(ConfigError::EmptyRoster);
        }
        for address in &self.roster {
            Player::new(address.as_str())?;
        }
        if self.gateway_positions.len() > self.roster.len() {
            return Err(ConfigError::TooManyGateways {
                gateways: self.gateway_positions.len(),
                players: self.roster.len(),
            });
        }
        Ok(())
    }

    /// Build the genesis world this config describes.
    pub fn genesis(&self) -> Result<Game, GameError> {
        let mut game = Game::with_roster(self.roster.iter().cloned())?;
        game.start_match(self.honeypot_amount, self.honeypot_position, self.seed_credit)?;
        for (owner, pos) in self.gateway_positions.iter().enumerate() {
            let owner = PlayerId::try_from(owner).map_err(|_| CodecError::CountTooLarge(owner as u64))?;
            game.mint_gateway(owner, *pos)?;
        }
        Ok(game)
    }
}
