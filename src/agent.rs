//! The agent: subscribes to a broker's fan-out on a configured set of
//! topics, executes matched service requests, and pushes results to the
//! broker's sink.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, info, warn};
use zeromq::{PushSocket, RepSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage};

use crate::config::ValidatedAgentConfig;
use crate::error::DispatchError;
use crate::hostinfo;
use crate::messages::{to_bytes, ManagementReply, ServiceResult};
use crate::metrics::AgentMetrics;
use crate::service;
use crate::transport::Transport;

/// Lifecycle state, mirrored by the broker's own state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Initializing,
    Running,
    Terminating,
}

pub struct Agent {
    fanout: SubSocket,
    fanout_endpoint: String,
    sink: PushSocket,
    sink_endpoint: String,
    management: RepSocket,
    management_endpoint: String,
    metrics: Arc<AgentMetrics>,
    state: AgentState,
}

impl Agent {
    /// Connect the fan-out subscriber and sink pusher, bind the management
    /// endpoint, and subscribe to the implicit OS-family/node-name topics
    /// plus any extra prefixes from configuration.
    pub async fn connect(config: ValidatedAgentConfig) -> Result<Self, DispatchError> {
        let mut fanout = SubSocket::new();
        fanout.connect(&config.fanout).await?;
        info!(endpoint = %config.fanout, "fanout connected");

        let system = hostinfo::system_name();
        let node = hostinfo::node_name();
        fanout.subscribe(&system).await?;
        fanout.subscribe(&node).await?;
        debug!(system = %system, node = %node, "subscribed to implicit topics");

        for topic in &config.topics {
            fanout.subscribe(topic).await?;
            debug!(topic = %topic, "subscribed to configured topic");
        }

        let mut sink = PushSocket::new();
        sink.connect(&config.sink).await?;
        info!(endpoint = %config.sink, "sink connected");

        let management_transport = Transport::parse(&config.management)?;
        management_transport.ensure_ipc_dir()?;
        management_transport.remove_stale_socket()?;
        let mut management = RepSocket::new();
        management.bind(&config.management).await?;
        info!(endpoint = %config.management, "management bound");

        Ok(Self {
            fanout,
            fanout_endpoint: config.fanout,
            sink,
            sink_endpoint: config.sink,
            management,
            management_endpoint: config.management,
            metrics: Arc::new(AgentMetrics::new()),
            state: AgentState::Initializing,
        })
    }

    pub fn metrics(&self) -> Arc<AgentMetrics> {
        self.metrics.clone()
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Run the single-threaded cooperative event loop until
    /// `agent.shutdown` is observed. Service-request execution is the one
    /// admitted long-running operation; further fan-out input is not
    /// processed while a request executes.
    pub async fn run(mut self) -> Result<(), DispatchError> {
        self.state = AgentState::Running;
        info!("agent entering Running state");

        loop {
            tokio::select! {
                result = self.fanout.recv() => {
                    match result {
                        Ok(msg) => self.handle_fanout(msg).await?,
                        Err(e) => warn!(error = %e, "fanout recv error"),
                    }
                }
                result = self.management.recv() => {
                    match result {
                        Ok(msg) => {
                            if self.handle_management(msg).await? {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "management recv error"),
                    }
                }
            }
        }

        self.state = AgentState::Terminating;
        info!("agent entering Terminating state");
        Ok(())
    }

    /// Receives two frames (topic, payload). The topic is logged only —
    /// the subscriber socket has already done the selection.
    async fn handle_fanout(&mut self, msg: ZmqMessage) -> Result<(), DispatchError> {
        let frames: Vec<Bytes> = msg.iter().cloned().collect();
        let Some(payload) = frames.get(1).or_else(|| frames.first()) else {
            warn!("fanout message had no frames; dropping");
            return Ok(());
        };

        let parsed: Option<Value> = serde_json::from_slice(payload).ok();
        let object = match parsed {
            Some(Value::Object(map)) => map,
            _ => {
                warn!("dropping malformed fanout payload");
                return Ok(());
            }
        };

        let uuid = object.get("uuid").and_then(Value::as_str).map(str::to_string);
        let cmd = object.get("cmd").and_then(Value::as_str).map(str::to_string);
        let service_name = object.get("service").and_then(Value::as_str).map(str::to_string);

        let result = match (cmd, service_name) {
            (Some(cmd), Some(service_name)) => {
                debug!(cmd = %cmd, service = %service_name, "executing service request");
                match service::invoke(&service_name, &cmd).await {
                    Ok(detail) => {
                        self.metrics.record_request_executed();
                        ServiceResult::executed(&cmd, detail, uuid)
                    }
                    Err(_) => {
                        self.metrics.record_request_rejected();
                        ServiceResult::utility_unlocatable(hostinfo::node_name(), uuid)
                    }
                }
            }
            _ => {
                self.metrics.record_request_rejected();
                ServiceResult::missing_fields(uuid)
            }
        };

        let body = to_bytes(&result)?;
        self.sink.send(ZmqMessage::from(body)).await?;
        Ok(())
    }

    /// Returns `true` when `agent.shutdown` was observed and the loop
    /// should exit. Every branch sends a reply before returning.
    async fn handle_management(&mut self, msg: ZmqMessage) -> Result<bool, DispatchError> {
        let frames: Vec<Bytes> = msg.iter().cloned().collect();
        let payload = frames.into_iter().next().unwrap_or_default();
        self.metrics.record_management_command();

        let parsed: Option<Value> = serde_json::from_slice(&payload).ok();
        let cmd = parsed
            .as_ref()
            .filter(|v| v.is_object())
            .and_then(|v| v.get("cmd"))
            .and_then(Value::as_str);

        let (reply, terminate) = match (parsed.as_ref().map(Value::is_object), cmd) {
            (Some(false), _) | (None, _) => (
                ManagementReply::err("Request message should be in JSON format"),
                false,
            ),
            (_, None) => (ManagementReply::err("Missing message properties"), false),
            (_, Some("agent.status")) => {
                let result = serde_json::json!({
                    "status": "running",
                    "manager_endpoint": self.fanout_endpoint,
                    "sink_endpoint": self.sink_endpoint,
                    "mgmt_endpoint": self.management_endpoint,
                    "node": hostinfo::node_name(),
                    "system": hostinfo::system_name(),
                    "version": hostinfo::system_version(),
                });
                (
                    ManagementReply::ok("Service Manager Agent Status", Some(result)),
                    false,
                )
            }
            (_, Some("agent.shutdown")) => {
                info!("agent.shutdown received");
                (
                    ManagementReply::ok("Service Manager Agent is shutting down", None),
                    true,
                )
            }
            (_, Some(_)) => (
                ManagementReply::err("Unknown management command requested"),
                false,
            ),
        };

        let body = to_bytes(&reply)?;
        self.management.send(ZmqMessage::from(body)).await?;
        Ok(terminate)
    }
}
