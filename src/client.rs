//! Client-side helpers: a lazy-pirate request/retry wrapper for the intake
//! and management endpoints, and a subscribe-and-collect helper for the
//! result-publisher endpoint.

use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use tracing::warn;
use zeromq::{ReqSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage};

use crate::error::DispatchError;

/// Poll slice used by [`subscribe_and_collect`], matching the reference
/// implementation's own polling interval exactly.
const COLLECT_POLL_SLICE: Duration = Duration::from_millis(50);

/// Send `payload` to a request/reply endpoint, retrying up to `retries`
/// times with a fresh socket after each missed reply (the request/reply
/// state machine requires rebuilding after a timeout). Returns a
/// synthesized failure reply on exhaustion rather than an error, since a
/// caller expecting a reply value should always get one.
pub async fn request_with_retry(
    endpoint: &str,
    payload: &Value,
    retries: u32,
    per_attempt_timeout: Duration,
) -> Value {
    let attempts = retries.max(1);
    for attempt in 1..=attempts {
        match try_once(endpoint, payload, per_attempt_timeout).await {
            Ok(reply) => return reply,
            Err(e) => {
                warn!(attempt, retries = attempts, error = %e, "request attempt failed");
            }
        }
    }

    serde_json::json!({
        "success": -1,
        "msg": "Did not receive a reply, aborting...",
    })
}

/// A single send/await-reply attempt over a freshly connected socket.
async fn try_once(
    endpoint: &str,
    payload: &Value,
    timeout: Duration,
) -> Result<Value, DispatchError> {
    let mut socket = ReqSocket::new();
    socket.connect(endpoint).await?;

    let body = serde_json::to_vec(payload)?;
    socket.send(ZmqMessage::from(body)).await?;

    let msg = tokio::time::timeout(timeout, socket.recv())
        .await
        .map_err(|_| DispatchError::Timeout(timeout))??;

    let frames: Vec<Bytes> = msg.iter().cloned().collect();
    let reply_bytes = frames.into_iter().next().unwrap_or_default();
    Ok(serde_json::from_slice(&reply_bytes)?)
}

/// Connect a subscriber to `endpoint`, subscribe to `topic_prefix` (the
/// correlation token), and collect every payload received within
/// `wait_time`, discarding the topic frame. Returns within
/// `wait_time + one poll slice`. May return an empty list (no matching
/// agents, or all missed the deadline) or more elements than the agent
/// population (agents do not deduplicate, nor does the broker).
pub async fn subscribe_and_collect(
    endpoint: &str,
    topic_prefix: &str,
    wait_time: Duration,
) -> Vec<Value> {
    let mut results = Vec::new();

    let mut socket = SubSocket::new();
    if let Err(e) = socket.connect(endpoint).await {
        warn!(error = %e, "collect: failed to connect subscriber");
        return results;
    }
    if let Err(e) = socket.subscribe(topic_prefix).await {
        warn!(error = %e, "collect: failed to subscribe");
        return results;
    }

    let deadline = tokio::time::Instant::now() + wait_time;

    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(COLLECT_POLL_SLICE, socket.recv()).await {
            Ok(Ok(msg)) => {
                let frames: Vec<Bytes> = msg.iter().cloned().collect();
                let payload = frames.get(1).or_else(|| frames.first());
                if let Some(payload) = payload {
                    match serde_json::from_slice::<Value>(payload) {
                        Ok(value) => results.push(value),
                        Err(e) => warn!(error = %e, "collect: dropping malformed payload"),
                    }
                }
            }
            Ok(Err(e)) => warn!(error = %e, "collect: recv error"),
            Err(_) => {}
        }
    }

    results
}

/// Submit a service request through intake with retry, then subscribe for
/// its results on the result-publisher endpoint. Ties together the two
/// primitives above the way a client actually uses them end to end.
pub async fn submit_and_collect(
    intake_endpoint: &str,
    request: &Value,
    retries: u32,
    request_timeout: Duration,
    result_publisher_host: &str,
    wait_time: Duration,
) -> Vec<Value> {
    let reply = request_with_retry(intake_endpoint, request, retries, request_timeout).await;

    let (Some(uuid), Some(port)) = (
        reply.get("uuid").and_then(Value::as_str),
        reply.get("port").and_then(Value::as_u64),
    ) else {
        warn!(?reply, "submit: intake reply missing uuid/port");
        return Vec::new();
    };

    let endpoint = format!("tcp://{result_publisher_host}:{port}");
    subscribe_and_collect(&endpoint, uuid, wait_time).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_with_retry_synthesizes_failure_on_unreachable_endpoint() {
        let payload = serde_json::json!({"cmd": "manager.status"});
        let reply = request_with_retry(
            "tcp://127.0.0.1:1",
            &payload,
            2,
            Duration::from_millis(50),
        )
        .await;

        assert_eq!(reply["success"], -1);
        assert_eq!(reply["msg"], "Did not receive a reply, aborting...");
    }

    #[tokio::test]
    async fn subscribe_and_collect_returns_empty_on_no_agents() {
        let results =
            subscribe_and_collect("tcp://127.0.0.1:18999", "anytoken", Duration::from_millis(80))
                .await;
        assert!(results.is_empty());
    }
}
