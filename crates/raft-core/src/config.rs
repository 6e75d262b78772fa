//! # config
//!
//! why: tune election and heartbeat timing without touching the protocol code
//! relations: read by the timer driver in node/timer.rs and by every outbound rpc for its deadline
//! what: RaftConfig with defaults, validation and json loading

use std::ops::RangeInclusive;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RaftError;

/// Timing configuration, all values in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaftConfig {
    /// Lower bound of the randomized election timeout
    pub election_timeout_min: u64,
    /// Upper bound of the randomized election timeout
    pub election_timeout_max: u64,
    /// Interval between leader heartbeats
    pub heartbeat_interval: u64,
    /// Deadline for a single outbound rpc
    pub rpc_timeout: u64,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            election_timeout_min: 150,
            election_timeout_max: 300,
            heartbeat_interval: 50,
            rpc_timeout: 100,
        }
    }
}

impl RaftConfig {
    /// Parse a config from json; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, RaftError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| RaftError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RaftError> {
        if self.election_timeout_min > self.election_timeout_max {
            return Err(RaftError::InvalidConfig(format!(
                "election_timeout_min ({}) exceeds election_timeout_max ({})",
                self.election_timeout_min, self.election_timeout_max
            )));
        }
        if self.heartbeat_interval == 0 {
            return Err(RaftError::InvalidConfig("heartbeat_interval must be positive".into()));
        }
        if self.heartbeat_interval >= self.election_timeout_min {
            return Err(RaftError::InvalidConfig(format!(
                "heartbeat_interval ({}) must be below election_timeout_min ({})",
                self.heartbeat_interval, self.election_timeout_min
            )));
        }
        if self.rpc_timeout == 0 {
            return Err(RaftError::InvalidConfig("rpc_timeout must be positive".into()));
        }
        Ok(())
    }

    pub fn election_timeout_range(&self) -> RangeInclusive<u64> {
        self.election_timeout_min..=self.election_timeout_max
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout)
    }
}
