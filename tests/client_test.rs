//! End-to-end pipeline tests: client helpers driven against a real
//! broker and a fake agent built from raw sockets.

use std::time::Duration;

use serde_json::{json, Value};
use zeromq::{PushSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage};

use dispatchd::broker::Broker;
use dispatchd::client::{request_with_retry, submit_and_collect};
use dispatchd::config::BrokerConfig;

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

#[tokio::test]
async fn single_agent_round_trip_via_client_helpers() {
    let cfg = broker_config(17200);
    let broker = Broker::bind(cfg.clone().validate().unwrap()).await.unwrap();
    let broker_handle = tokio::spawn(broker.run());
    tokio::time::sleep(SETTLE).await;

    let mut fake_fanout = SubSocket::new();
    fake_fanout.connect(&cfg.fanout.clone().unwrap()).await.unwrap();
    fake_fanout.subscribe("Linux").await.unwrap();
    let mut fake_sink = PushSocket::new();
    fake_sink.connect(&cfg.sink.clone().unwrap()).await.unwrap();
    tokio::time::sleep(SETTLE).await;

    let fake_agent = tokio::spawn(async move {
        let msg = fake_fanout.recv().await.unwrap();
        let frames: Vec<_> = msg.iter().cloned().collect();
        let request: Value = serde_json::from_slice(&frames[1]).unwrap();

        let result = json!({
            "uuid": request["uuid"],
            "msg": "Executed service status request",
            "result": {
                "node": "fake-node",
                "service": request["service"],
                "returncode": 0,
                "stdout": "",
                "stderr": "",
                "system": "Linux",
                "version": "6.1.0",
            },
        });
        fake_sink
            .send(ZmqMessage::from(serde_json::to_vec(&result).unwrap()))
            .await
            .unwrap();
    });

    let request = json!({"cmd": "status", "service": "sshd", "topic": "Linux"});
    let results = submit_and_collect(
        &cfg.intake.clone().unwrap(),
        &request,
        3,
        Duration::from_secs(2),
        "127.0.0.1",
        Duration::from_secs(1),
    )
    .await;

    fake_agent.await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["result"]["service"], "sshd");
    assert_eq!(results[0]["result"]["returncode"], 0);

    let shutdown_reply = request_with_retry(
        &cfg.management.unwrap(),
        &json!({"cmd": "manager.shutdown"}),
        3,
        Duration::from_secs(1),
    )
    .await;
    assert_eq!(shutdown_reply["success"], 0);
    tokio::time::timeout(Duration::from_secs(5), broker_handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn topic_miss_yields_empty_collect() {
    let cfg = broker_config(17210);
    let broker = Broker::bind(cfg.clone().validate().unwrap()).await.unwrap();
    let broker_handle = tokio::spawn(broker.run());
    tokio::time::sleep(SETTLE).await;

    let mut fake_fanout = SubSocket::new();
    fake_fanout.connect(&cfg.fanout.clone().unwrap()).await.unwrap();
    fake_fanout.subscribe("FreeBSD").await.unwrap();
    tokio::time::sleep(SETTLE).await;

    let request = json!({"cmd": "status", "service": "sshd", "topic": "Linux"});
    let results = submit_and_collect(
        &cfg.intake.clone().unwrap(),
        &request,
        3,
        Duration::from_secs(2),
        "127.0.0.1",
        Duration::from_millis(300),
    )
    .await;

    assert!(results.is_empty());
    let no_match = tokio::time::timeout(Duration::from_millis(200), fake_fanout.recv()).await;
    assert!(no_match.is_err(), "subscriber on a disjoint prefix should not see the publish");

    request_with_retry(
        &cfg.management.unwrap(),
        &json!({"cmd": "manager.shutdown"}),
        3,
        Duration::from_secs(1),
    )
    .await;
    tokio::time::timeout(Duration::from_secs(5), broker_handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

