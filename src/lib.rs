pub mod agent;
pub mod broker;
pub mod client;
pub mod config;
pub mod error;
pub mod hostinfo;
pub mod messages;
pub mod metrics;
pub mod service;
pub mod transport;

pub use agent::{Agent, AgentState};
pub use broker::{Broker, BrokerState};
pub use config::{AgentConfig, BrokerConfig, ValidatedAgentConfig, ValidatedBrokerConfig};
pub use error::DispatchError;
pub use metrics::{AgentMetrics, BrokerMetrics};
pub use transport::Transport;
