//! Node configuration.
//!
//! Example TOML:
//!
//! ```toml
//! [node]
//! secret_key = "<64 hex chars>"
//!
//! # Order is the leader rotation order
//! [[peers]]
//! public_key = "<66 hex chars>"
//!
//! [consensus]
//! view_timeout_ms = 3000
//! # quorum_threshold = 3
//!
//! [network]
//! channel_capacity = 10000
//! rate_limit_per_sec = 500
//! rate_limit_burst = 200
//!
//! [telemetry]
//! log_level = "info"
//! json = false
//! ```

use crate::network::RateLimitConfig;
use crate::telemetry::TelemetryConfig;
use gambit_bft::{BftConfig, BftConfigError};
use gambit_types::{
    CryptoError, KeyPair, PeerId, PublicKey, StaticTopology, Topology, TopologyError,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid node secret key: {0}")]
    SecretKey(CryptoError),

    #[error("Invalid public key for peer #{index}: {source}")]
    PeerKey { index: usize, source: CryptoError },

    #[error("Peer #{index} duplicates peer #{first}")]
    DuplicatePeer { index: usize, first: usize },

    #[error("Local key {0:?} is not in the peer list")]
    NotAPeer(PeerId),

    #[error("Invalid topology: {0}")]
    Topology(#[from] TopologyError),

    #[error("Invalid consensus settings: {0}")]
    Consensus(#[from] BftConfigError),

    #[error("Invalid setting {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Top-level node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node identity.
    pub node: IdentityConfig,

    /// Consensus peers, in leader rotation order.
    #[serde(default)]
    pub peers: Vec<PeerEntry>,

    #[serde(default)]
    pub consensus: ConsensusConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Node identity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Hex-encoded secp256k1 secret key.
    pub secret_key: String,
}

/// A consensus peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerEntry {
    /// Hex-encoded compressed secp256k1 public key.
    pub public_key: String,
}

/// Consensus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// How long a view may run without committing (milliseconds).
    #[serde(default = "default_view_timeout_ms")]
    pub view_timeout_ms: u64,

    /// Raise the quorum above floor(2N/3)+1.
    #[serde(default)]
    pub quorum_threshold: Option<usize>,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            view_timeout_ms: default_view_timeout_ms(),
            quorum_threshold: None,
        }
    }
}

fn default_view_timeout_ms() -> u64 {
    3000
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Capacity of inbound and per-session channels.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Sustained inbound messages per second accepted from one peer.
    #[serde(default = "default_rate_limit_per_sec")]
    pub rate_limit_per_sec: u32,

    /// Inbound burst accepted from one peer.
    #[serde(default = "default_rate_limit_burst")]
    pub rate_limit_burst: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            rate_limit_per_sec: default_rate_limit_per_sec(),
            rate_limit_burst: default_rate_limit_burst(),
        }
    }
}

fn default_channel_capacity() -> usize {
    10_000
}

fn default_rate_limit_per_sec() -> u32 {
    500
}

fn default_rate_limit_burst() -> u32 {
    200
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Check everything the runner relies on. Call before building it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let keypair = self.keypair()?;
        let keys = self.peer_keys()?;

        let local = keypair.peer_id();
        if !keys.iter().any(|key| PeerId::from_public_key(key) == local) {
            return Err(ConfigError::NotAPeer(local));
        }

        self.bft_config().validate(keys.len())?;

        if self.network.channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "network.channel_capacity",
                reason: "must be positive",
            });
        }
        if self.network.rate_limit_per_sec == 0 || self.network.rate_limit_burst == 0 {
            return Err(ConfigError::Invalid {
                field: "network.rate_limit_*",
                reason: "must be positive",
            });
        }
        Ok(())
    }

    /// The node's signing key.
    pub fn keypair(&self) -> Result<KeyPair, ConfigError> {
        KeyPair::from_secret_hex(&self.node.secret_key).map_err(ConfigError::SecretKey)
    }

    /// Peer keys in rotation order. Rejects malformed and repeated keys.
    pub fn peer_keys(&self) -> Result<Vec<PublicKey>, ConfigError> {
        let mut keys: Vec<PublicKey> = Vec::with_capacity(self.peers.len());
        for (index, entry) in self.peers.iter().enumerate() {
            let key = PublicKey::from_hex(&entry.public_key)
                .map_err(|source| ConfigError::PeerKey { index, source })?;
            if let Some(first) = keys.iter().position(|k| *k == key) {
                return Err(ConfigError::DuplicatePeer { index, first });
            }
            keys.push(key);
        }
        if keys.is_empty() {
            return Err(TopologyError::Empty.into());
        }
        Ok(keys)
    }

    /// Topology seen from this node.
    pub fn topology(&self) -> Result<Arc<dyn Topology>, ConfigError> {
        let local = self.keypair()?.peer_id();
        Ok(StaticTopology::new(local, self.peer_keys()?)?.into_arc())
    }

    pub fn bft_config(&self) -> BftConfig {
        let config = BftConfig::default()
            .with_view_timeout(Duration::from_millis(self.consensus.view_timeout_ms));
        match self.consensus.quorum_threshold {
            Some(threshold) => config.with_quorum_threshold(threshold),
            None => config,
        }
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            peer_messages_per_sec: self.network.rate_limit_per_sec,
            peer_burst: self.network.rate_limit_burst,
            ..RateLimitConfig::default()
        }
    }
}
