//! Configuration loading and validation for the broker and agent daemons.
//!
//! Each daemon loads an explicit configuration record from a TOML file, with
//! CLI flags overriding file values. Environment variable overrides follow
//! the `DISPATCHD_<SECTION>_<KEY>` convention and are applied by the binaries
//! before calling [`BrokerConfig::validate`] / [`AgentConfig::validate`].

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::transport::Transport;

/// Broker configuration: the four fixed endpoints plus the interface the
/// ephemeral result-publisher port binds on.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BrokerConfig {
    pub intake: Option<String>,
    pub fanout: Option<String>,
    pub sink: Option<String>,
    pub management: Option<String>,
    pub result_publisher_host: Option<String>,
}

impl BrokerConfig {
    /// Parse from a TOML file on disk.
    pub fn from_file(path: &std::path::Path) -> Result<Self, DispatchError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Merge `other` over `self`, preferring `other`'s values where present.
    /// Used to layer CLI-flag and environment overrides over the file config.
    pub fn merge(mut self, other: Self) -> Self {
        self.intake = other.intake.or(self.intake);
        self.fanout = other.fanout.or(self.fanout);
        self.sink = other.sink.or(self.sink);
        self.management = other.management.or(self.management);
        self.result_publisher_host = other.result_publisher_host.or(self.result_publisher_host);
        self
    }

    /// Validate that every required endpoint is present, returning a
    /// descriptive error naming the first missing field.
    pub fn validate(&self) -> Result<ValidatedBrokerConfig, DispatchError> {
        let intake = require(&self.intake, "intake")?;
        let fanout = require(&self.fanout, "fanout")?;
        let sink = require(&self.sink, "sink")?;
        let management = require(&self.management, "management")?;
        Transport::parse(&intake)?;
        Transport::parse(&fanout)?;
        Transport::parse(&sink)?;
        Transport::parse(&management)?;
        let result_publisher_host = self
            .result_publisher_host
            .clone()
            .unwrap_or_else(|| "0.0.0.0".to_string());

        Ok(ValidatedBrokerConfig {
            intake,
            fanout,
            sink,
            management,
            result_publisher_host,
        })
    }
}

/// A [`BrokerConfig`] that has passed validation: every required field is present.
#[derive(Debug, Clone)]
pub struct ValidatedBrokerConfig {
    pub intake: String,
    pub fanout: String,
    pub sink: String,
    pub management: String,
    pub result_publisher_host: String,
}

/// Agent configuration: the three endpoints it connects to/binds, plus any
/// extra topic-prefix subscriptions beyond the implicit OS-family/node-name ones.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    pub fanout: Option<String>,
    pub sink: Option<String>,
    pub management: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

impl AgentConfig {
    pub fn from_file(path: &std::path::Path) -> Result<Self, DispatchError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn merge(mut self, other: Self) -> Self {
        self.fanout = other.fanout.or(self.fanout);
        self.sink = other.sink.or(self.sink);
        self.management = other.management.or(self.management);
        if !other.topics.is_empty() {
            self.topics = other.topics;
        }
        self
    }

    pub fn validate(&self) -> Result<ValidatedAgentConfig, DispatchError> {
        let fanout = require(&self.fanout, "fanout")?;
        let sink = require(&self.sink, "sink")?;
        let management = require(&self.management, "management")?;
        Transport::parse(&fanout)?;
        Transport::parse(&sink)?;
        Transport::parse(&management)?;

        Ok(ValidatedAgentConfig {
            fanout,
            sink,
            management,
            topics: self.topics.clone(),
        })
    }
}

/// A [`AgentConfig`] that has passed validation: every required field is present.
#[derive(Debug, Clone)]
pub struct ValidatedAgentConfig {
    pub fanout: String,
    pub sink: String,
    pub management: String,
    pub topics: Vec<String>,
}

fn require(field: &Option<String>, name: &str) -> Result<String, DispatchError> {
    field
        .clone()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| DispatchError::Config(format!("missing required field '{name}'")))
}
