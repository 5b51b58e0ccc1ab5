//! Transfer configuration file.
//!
//! A JSON document with three optional sections. Units are chosen for humans
//! (milliseconds, microseconds); `tcp_config` / `channel_config` convert them
//! into the simulator's types.
//!
//! ```json
//! {
//!   "schema_version": 1,
//!   "tcp": { "mss": 536, "init_rto_ms": 500 },
//!   "channel": { "latency_us": 5000, "loss": 0.05, "seed": 7 },
//!   "transfer": { "data_bytes": 200000, "echo": true }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::net::ChannelConfig;
use crate::proto::tcp::TcpConfig;
use crate::sim::SimTime;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransferConfig {
    pub schema_version: u32,
    pub tcp: TcpSection,
    pub channel: ChannelSection,
    pub transfer: TransferSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TcpSection {
    pub mss: usize,
    pub init_window_segments: u32,
    pub init_rto_ms: u64,
    pub min_rto_ms: u64,
    pub max_rto_ms: u64,
    pub isn_seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelSection {
    pub latency_us: u64,
    pub jitter_us: u64,
    pub loss: f64,
    pub corrupt: f64,
    pub duplicate: f64,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransferSection {
    /// Bytes the client sends.
    pub data_bytes: u64,
    /// Server echoes everything back instead of sinking it.
    pub echo: bool,
    /// Simulated time limit.
    pub until_ms: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            tcp: TcpSection::default(),
            channel: ChannelSection::default(),
            transfer: TransferSection::default(),
        }
    }
}

impl Default for TcpSection {
    fn default() -> Self {
        let d = TcpConfig::default();
        Self {
            mss: d.mss,
            init_window_segments: d.init_window_segments,
            init_rto_ms: d.init_rto.0 / 1_000_000,
            min_rto_ms: d.min_rto.0 / 1_000_000,
            max_rto_ms: d.max_rto.0 / 1_000_000,
            isn_seed: d.isn_seed,
        }
    }
}

impl Default for ChannelSection {
    fn default() -> Self {
        let d = ChannelConfig::default();
        Self {
            latency_us: d.latency.0 / 1_000,
            jitter_us: d.jitter.0 / 1_000,
            loss: d.loss,
            corrupt: d.corrupt,
            duplicate: d.duplicate,
            seed: d.seed,
        }
    }
}

impl Default for TransferSection {
    fn default() -> Self {
        Self {
            data_bytes: 100_000,
            echo: false,
            until_ms: 600_000,
        }
    }
}

impl TransferConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let cfg: TransferConfig = serde_json::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported schema_version {} (expected {SCHEMA_VERSION})",
                self.schema_version
            )));
        }
        // 20-byte header + payload must fit the 16-bit TCP length.
        if self.tcp.mss == 0 || self.tcp.mss > u16::MAX as usize - 20 {
            return Err(ConfigError::Invalid(format!("mss {} out of range", self.tcp.mss)));
        }
        if self.tcp.init_window_segments == 0 {
            return Err(ConfigError::Invalid("init_window_segments must be at least 1".into()));
        }
        // A zero timeout re-arms at the current instant and never lets time advance.
        if self.tcp.init_rto_ms == 0 || self.tcp.min_rto_ms == 0 {
            return Err(ConfigError::Invalid("init_rto_ms and min_rto_ms must be at least 1".into()));
        }
        if self.tcp.min_rto_ms > self.tcp.max_rto_ms {
            return Err(ConfigError::Invalid(format!(
                "min_rto_ms {} exceeds max_rto_ms {}",
                self.tcp.min_rto_ms, self.tcp.max_rto_ms
            )));
        }
        for (name, p) in [
            ("loss", self.channel.loss),
            ("corrupt", self.channel.corrupt),
            ("duplicate", self.channel.duplicate),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::Invalid(format!("{name} probability {p} not in [0, 1]")));
            }
        }
        if self.channel.loss >= 1.0 {
            return Err(ConfigError::Invalid("loss of 1.0 can never complete a transfer".into()));
        }
        Ok(())
    }

    pub fn tcp_config(&self) -> TcpConfig {
        TcpConfig {
            mss: self.tcp.mss,
            init_window_segments: self.tcp.init_window_segments,
            init_rto: SimTime::from_millis(self.tcp.init_rto_ms),
            min_rto: SimTime::from_millis(self.tcp.min_rto_ms),
            max_rto: SimTime::from_millis(self.tcp.max_rto_ms),
            isn_seed: self.tcp.isn_seed,
            ..TcpConfig::default()
        }
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            latency: SimTime::from_micros(self.channel.latency_us),
            jitter: SimTime::from_micros(self.channel.jitter_us),
            loss: self.channel.loss,
            corrupt: self.channel.corrupt,
            duplicate: self.channel.duplicate,
            seed: self.channel.seed,
        }
    }
}
