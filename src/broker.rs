//! The broker: terminates client intake requests, fans them out to
//! topic-matching agents, collects results at the sink, and republishes
//! them keyed by correlation token.

use std::net::TcpListener;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, info, warn};
use zeromq::{PubSocket, PullSocket, RepSocket, RouterSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

use crate::config::ValidatedBrokerConfig;
use crate::error::DispatchError;
use crate::hostinfo;
use crate::messages::{new_correlation_token, to_bytes, IntakeReply, ManagementReply};
use crate::metrics::BrokerMetrics;
use crate::transport::Transport;

/// Lifecycle state, mirrored by the agent's own state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    Initializing,
    Running,
    Terminating,
}

/// The broker's five bound endpoints and the sockets that implement them.
pub struct Broker {
    intake: RouterSocket,
    intake_endpoint: String,
    fanout: PubSocket,
    fanout_endpoint: String,
    sink: PullSocket,
    sink_endpoint: String,
    result_publisher: PubSocket,
    result_publisher_port: u16,
    management: RepSocket,
    management_endpoint: String,
    metrics: Arc<BrokerMetrics>,
    state: BrokerState,
}

impl Broker {
    /// Bind all five endpoints. Bind failure is fatal — returns before any
    /// socket enters the readiness set.
    pub async fn bind(config: ValidatedBrokerConfig) -> Result<Self, DispatchError> {
        prepare_bind_path(&config.intake)?;
        let mut intake = RouterSocket::new();
        intake.bind(&config.intake).await?;
        info!(endpoint = %config.intake, "intake bound");

        prepare_bind_path(&config.fanout)?;
        let mut fanout = PubSocket::new();
        fanout.bind(&config.fanout).await?;
        info!(endpoint = %config.fanout, "fanout bound");

        prepare_bind_path(&config.sink)?;
        let mut sink = PullSocket::new();
        sink.bind(&config.sink).await?;
        info!(endpoint = %config.sink, "sink bound");

        prepare_bind_path(&config.management)?;
        let mut management = RepSocket::new();
        management.bind(&config.management).await?;
        info!(endpoint = %config.management, "management bound");

        let result_publisher_port = pick_ephemeral_port(&config.result_publisher_host)?;
        let result_publisher_endpoint = format!(
            "tcp://{}:{}",
            config.result_publisher_host, result_publisher_port
        );
        let mut result_publisher = PubSocket::new();
        result_publisher.bind(&result_publisher_endpoint).await?;
        info!(endpoint = %result_publisher_endpoint, "result publisher bound");

        Ok(Self {
            intake,
            intake_endpoint: config.intake,
            fanout,
            fanout_endpoint: config.fanout,
            sink,
            sink_endpoint: config.sink,
            result_publisher,
            result_publisher_port,
            management,
            management_endpoint: config.management,
            metrics: Arc::new(BrokerMetrics::new()),
            state: BrokerState::Initializing,
        })
    }

    /// The ephemeral TCP port the result-publisher endpoint was bound to.
    pub fn result_publisher_port(&self) -> u16 {
        self.result_publisher_port
    }

    pub fn metrics(&self) -> Arc<BrokerMetrics> {
        self.metrics.clone()
    }

    pub fn state(&self) -> BrokerState {
        self.state
    }

    /// Run the single-threaded cooperative event loop until a
    /// `manager.shutdown` management command is observed.
    pub async fn run(mut self) -> Result<(), DispatchError> {
        self.state = BrokerState::Running;
        info!("broker entering Running state");

        loop {
            tokio::select! {
                result = self.intake.recv() => {
                    match result {
                        Ok(msg) => self.handle_intake(msg).await?,
                        Err(e) => warn!(error = %e, "intake recv error"),
                    }
                }
                result = self.sink.recv() => {
                    match result {
                        Ok(msg) => self.handle_sink(msg).await?,
                        Err(e) => warn!(error = %e, "sink recv error"),
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

        self.state = BrokerState::Terminating;
        info!("broker entering Terminating state");
        Ok(())
    }

    /// Receives a three-frame envelope (identity, empty delimiter, payload).
    /// Non-mapping payloads are rejected without a fan-out publish.
    async fn handle_intake(&mut self, msg: ZmqMessage) -> Result<(), DispatchError> {
        let frames: Vec<Bytes> = msg.iter().cloned().collect();
        if frames.len() < 3 {
            warn!(frame_count = frames.len(), "intake message missing expected frames");
            return Ok(());
        }
        let identity = frames[0].clone();
        let payload = &frames[2];

        let parsed: Option<Value> = serde_json::from_slice(payload).ok();
        let mut object = match parsed {
            Some(Value::Object(map)) => Value::Object(map),
            _ => {
                let reply = IntakeReply::rejected("Request message should be in JSON format");
                self.send_intake_reply(identity, &reply).await?;
                self.metrics.record_request_rejected();
                debug!("intake rejected non-mapping payload");
                return Ok(());
            }
        };

        let token = new_correlation_token();
        let topic = object
            .get("topic")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        object
            .as_object_mut()
            .expect("checked above")
            .insert("uuid".to_string(), Value::String(token.clone()));

        let reply = IntakeReply::accepted(token.clone(), self.result_publisher_port);
        self.send_intake_reply(identity, &reply).await?;
        self.metrics.record_request_accepted();
        debug!(uuid = %token, topic = %topic, "intake accepted");

        let forwarded = to_bytes(&object)?;
        let mut publish = ZmqMessage::from(topic.clone());
        publish.push_back(forwarded.into());
        self.fanout.send(publish).await?;
        debug!(uuid = %token, topic = %topic, "published to fanout");

        Ok(())
    }

    async fn send_intake_reply(
        &mut self,
        identity: Bytes,
        reply: &IntakeReply,
    ) -> Result<(), DispatchError> {
        let body = to_bytes(reply)?;
        let mut msg = ZmqMessage::from(identity);
        msg.push_back(Bytes::new());
        msg.push_back(body.into());
        self.intake.send(msg).await?;
        Ok(())
    }

    /// Receives one payload pushed by an agent and republishes it keyed by
    /// its `uuid`. Malformed or unkeyed payloads are dropped with a log entry.
    async fn handle_sink(&mut self, msg: ZmqMessage) -> Result<(), DispatchError> {
        let frames: Vec<Bytes> = msg.iter().cloned().collect();
        let Some(payload) = frames.into_iter().next() else {
            warn!("sink message had no frames; dropping");
            return Ok(());
        };

        let value: Value = match serde_json::from_slice(&payload) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "dropping malformed sink message");
                return Ok(());
            }
        };

        let uuid = value.get("uuid").and_then(Value::as_str).map(str::to_string);
        let Some(uuid) = uuid else {
            warn!("dropping sink message without uuid");
            return Ok(());
        };

        let mut publish = ZmqMessage::from(uuid.clone());
        publish.push_back(payload);
        self.result_publisher.send(publish).await?;
        self.metrics.record_result_sunk();
        debug!(uuid = %uuid, "result republished");
        Ok(())
    }

    /// Returns `true` when `manager.shutdown` was observed and the loop
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
            (_, Some("manager.status")) => {
                let result = serde_json::json!({
                    "status": "running",
                    "intake_endpoint": self.intake_endpoint,
                    "fanout_endpoint": self.fanout_endpoint,
                    "sink_endpoint": self.sink_endpoint,
                    "mgmt_endpoint": self.management_endpoint,
                    "result_publisher_port": self.result_publisher_port,
                    "node": hostinfo::node_name(),
                    "system": hostinfo::system_name(),
                    "version": hostinfo::system_version(),
                });
                (
                    ManagementReply::ok("Service Manager Status", Some(result)),
                    false,
                )
            }
            (_, Some("manager.shutdown")) => {
                info!("manager.shutdown received");
                (
                    ManagementReply::ok("Service Manager is shutting down", None),
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

/// Ready an endpoint for binding: for `ipc://` endpoints, create the parent
/// directory and clear any leftover socket file from a previous run. No-op
/// for `tcp://` endpoints.
fn prepare_bind_path(endpoint: &str) -> Result<(), DispatchError> {
    let transport = Transport::parse(endpoint)?;
    transport.ensure_ipc_dir()?;
    transport.remove_stale_socket()?;
    Ok(())
}

/// Pick a free TCP port on `host` by briefly binding a std listener, then
/// releasing it for the ZeroMQ socket to bind. There is a small window
/// between release and the real bind where another process could claim the
/// port; this mirrors the common ephemeral-port-discovery trick used where
/// the transport itself offers no way to query its bound port after an
/// `any`-port bind.
fn pick_ephemeral_port(host: &str) -> Result<u16, DispatchError> {
    let listener = TcpListener::bind((host, 0))
        .map_err(|e| DispatchError::Transport(format!("failed to pick ephemeral port: {e}")))?;
    let port = listener
        .local_addr()
        .map_err(|e| DispatchError::Transport(format!("failed to read ephemeral port: {e}")))?
        .port();
    Ok(port)
}
