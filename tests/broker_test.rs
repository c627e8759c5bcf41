//! Integration tests for the broker's intake, fan-out, sink, and
//! management handlers, driven with real bound/connected sockets.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::timeout;
use zeromq::{PushSocket, ReqSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage};

use dispatchd::broker::Broker;
use dispatchd::config::BrokerConfig;

const TIMEOUT: Duration = Duration::from_secs(5);
const SETTLE: Duration = Duration::from_millis(200);

fn broker_config(base_port: u16) -> BrokerConfig {
    BrokerConfig {
        intake: Some(format!("tcp://127.0.0.1:{base_port}")),
        fanout: Some(format!("tcp://127.0.0.1:{}", base_port + 1)),
        sink: Some(format!("tcp://127.0.0.1:{}", base_port + 2)),
        management: Some(format!("tcp://127.0.0.1:{}", base_port + 3)),
        result_publisher_host: Some("127.0.0.1".to_string()),
    }
}

async fn req(endpoint: &str, payload: &Value) -> Value {
    let mut socket = ReqSocket::new();
    socket.connect(endpoint).await.unwrap();
    socket
        .send(ZmqMessage::from(serde_json::to_vec(payload).unwrap()))
        .await
        .unwrap();
    let msg = timeout(TIMEOUT, socket.recv()).await.unwrap().unwrap();
    let bytes = msg.iter().next().unwrap().clone();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn intake_accepts_mapping_and_publishes_fanout() {
    let cfg = broker_config(17000);
    let broker = Broker::bind(cfg.clone().validate().unwrap()).await.unwrap();
    let handle = tokio::spawn(broker.run());
    tokio::time::sleep(SETTLE).await;

    let mut sub = SubSocket::new();
    sub.connect(&cfg.fanout.unwrap()).await.unwrap();
    sub.subscribe("Linux").await.unwrap();
    tokio::time::sleep(SETTLE).await;

    let request = json!({"cmd": "status", "service": "sshd", "topic": "Linux"});
    let reply = req(&cfg.intake.unwrap(), &request).await;

    let uuid = reply["uuid"].as_str().expect("uuid present").to_string();
    assert_eq!(uuid.len(), 32);
    assert!(uuid.chars().all(|c| c.is_ascii_hexdigit()));
    assert!(reply["port"].as_u64().is_some());

    let msg = timeout(TIMEOUT, sub.recv()).await.unwrap().unwrap();
    let frames: Vec<_> = msg.iter().cloned().collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].to_vec(), b"Linux".to_vec());
    let forwarded: Value = serde_json::from_slice(&frames[1]).unwrap();
    assert_eq!(forwarded["uuid"], uuid);
    assert_eq!(forwarded["service"], "sshd");

    let shutdown_reply = req(&cfg.management.unwrap(), &json!({"cmd": "manager.shutdown"})).await;
    assert_eq!(shutdown_reply["success"], 0);
    timeout(TIMEOUT, handle).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn intake_rejects_non_mapping_payload_without_publishing() {
    let cfg = broker_config(17010);
    let broker = Broker::bind(cfg.clone().validate().unwrap()).await.unwrap();
    let handle = tokio::spawn(broker.run());
    tokio::time::sleep(SETTLE).await;

    let mut sub = SubSocket::new();
    sub.connect(&cfg.fanout.clone().unwrap()).await.unwrap();
    sub.subscribe("").await.unwrap();
    tokio::time::sleep(SETTLE).await;

    let mut socket = ReqSocket::new();
    socket.connect(&cfg.intake.clone().unwrap()).await.unwrap();
    socket
        .send(ZmqMessage::from(serde_json::to_vec(&"hello").unwrap()))
        .await
        .unwrap();
    let msg = timeout(TIMEOUT, socket.recv()).await.unwrap().unwrap();
    let bytes = msg.iter().next().unwrap().clone();
    let reply: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(reply["success"], -1);
    assert_eq!(reply["msg"], "Request message should be in JSON format");

    let no_publish = timeout(Duration::from_millis(300), sub.recv()).await;
    assert!(no_publish.is_err(), "no fan-out publish should have occurred");

    req(&cfg.management.unwrap(), &json!({"cmd": "manager.shutdown"})).await;
    timeout(TIMEOUT, handle).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn sink_input_is_republished_keyed_by_uuid() {
    let cfg = broker_config(17020);
    let broker = Broker::bind(cfg.clone().validate().unwrap()).await.unwrap();
    let handle = tokio::spawn(broker.run());
    tokio::time::sleep(SETTLE).await;

    let status = req(&cfg.management.clone().unwrap(), &json!({"cmd": "manager.status"})).await;
    assert_eq!(status["success"], 0);
    let port = status["result"]["result_publisher_port"].as_u64().unwrap() as u16;

    let mut result_sub = SubSocket::new();
    result_sub
        .connect(&format!("tcp://127.0.0.1:{port}"))
        .await
        .unwrap();
    result_sub.subscribe("abc123").await.unwrap();
    tokio::time::sleep(SETTLE).await;

    let mut push = PushSocket::new();
    push.connect(&cfg.sink.clone().unwrap()).await.unwrap();
    let result = json!({"uuid": "abc123", "msg": "Executed service status request", "result": {"returncode": 0}});
    push.send(ZmqMessage::from(serde_json::to_vec(&result).unwrap()))
        .await
        .unwrap();

    let msg = timeout(TIMEOUT, result_sub.recv()).await.unwrap().unwrap();
    let frames: Vec<_> = msg.iter().cloned().collect();
    assert_eq!(frames[0].to_vec(), b"abc123".to_vec());
    let republished: Value = serde_json::from_slice(&frames[1]).unwrap();
    assert_eq!(republished, result);

    req(&cfg.management.unwrap(), &json!({"cmd": "manager.shutdown"})).await;
    timeout(TIMEOUT, handle).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn management_rejects_unknown_command() {
    let cfg = broker_config(17030);
    let broker = Broker::bind(cfg.clone().validate().unwrap()).await.unwrap();
    let handle = tokio::spawn(broker.run());
    tokio::time::sleep(SETTLE).await;

    let reply = req(&cfg.management.clone().unwrap(), &json!({"cmd": "manager.nonsense"})).await;
    assert_eq!(reply["success"], -1);
    assert_eq!(reply["msg"], "Unknown management command requested");

    req(&cfg.management.unwrap(), &json!({"cmd": "manager.shutdown"})).await;
    timeout(TIMEOUT, handle).await.unwrap().unwrap().unwrap();
}

