//! End-to-end tests against an in-process WebSocket node.

use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use hydra_client::{ClientConfig, HeadClient};
use hydra_core::{ConnectionStatus, HydraError, Transaction, TxType};
use serde_json::{json, Value as Json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

enum Outbound {
    Frame(String),
    Close,
}

/// A node that accepts one connection and is driven by the test.
struct MockNode {
    addr: std::net::SocketAddr,
    received: mpsc::UnboundedReceiver<Json>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl MockNode {
    async fn start(handshake_delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (received_tx, received) = mpsc::unbounded_channel();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            sleep(handshake_delay).await;
            let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
            loop {
                tokio::select! {
                    frame = socket.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            let _ = received_tx.send(serde_json::from_str(&text).unwrap());
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    },
                    command = outbound_rx.recv() => match command {
                        Some(Outbound::Frame(text)) => socket.send(Message::Text(text)).await.unwrap(),
                        Some(Outbound::Close) | None => {
                            let _ = socket.close(None).await;
                            break;
                        }
                    },
                }
            }
        });

        Self {
            addr,
            received,
            outbound,
        }
    }

    fn config(&self) -> ClientConfig {
        ClientConfig::new(format!("http://{}", self.addr))
    }

    fn push(&self, message: Json) {
        self.outbound.send(Outbound::Frame(message.to_string())).unwrap();
    }

    fn push_raw(&self, text: &str) {
        self.outbound.send(Outbound::Frame(text.to_string())).unwrap();
    }

    fn close(&self) {
        self.outbound.send(Outbound::Close).unwrap();
    }

    async fn next_command(&mut self) -> Json {
        timeout(WAIT, self.received.recv())
            .await
            .expect("no command received")
            .expect("node stopped")
    }
}

fn status_log(client: &HeadClient) -> mpsc::UnboundedReceiver<ConnectionStatus> {
    let (tx, rx) = mpsc::unbounded_channel();
    client.on_status_change(move |status| {
        let _ = tx.send(*status);
    });
    rx
}

async fn wait_status(client: &HeadClient, want: ConnectionStatus) {
    let mut watch = client.status_watch();
    timeout(WAIT, watch.wait_for(|status| *status == want))
        .await
        .expect("status timeout")
        .unwrap();
}

async fn drain(log: &mut mpsc::UnboundedReceiver<ConnectionStatus>) -> Vec<ConnectionStatus> {
    // Let in-flight publishes land.
    sleep(Duration::from_millis(200)).await;
    let mut seen = Vec::new();
    while let Ok(status) = log.try_recv() {
        seen.push(status);
    }
    seen
}

fn tx_verdict(tag: &str, cbor_hex: &str, extra: Json) -> Json {
    let mut message = json!({
        "tag": tag,
        "headId": "84e657e3dd5241caac75b749195f78684023583736cc08b2896290ab",
        "transaction": {
            "type": "Witnessed Tx ConwayEra",
            "description": "",
            "cborHex": cbor_hex,
        },
        "seq": 7,
        "timestamp": "2024-10-08T13:05:58.195938Z",
    });
    if let (Some(message), Json::Object(extra)) = (message.as_object_mut(), extra) {
        message.extend(extra);
    }
    message
}

#[tokio::test]
async fn test_status_follows_transport_and_head() {
    let node = MockNode::start(Duration::ZERO).await;
    let client = HeadClient::new(node.config()).unwrap();
    let mut log = status_log(&client);

    client.connect().unwrap();
    wait_status(&client, ConnectionStatus::Connected).await;

    node.push(json!({ "tag": "HeadIsOpen", "headId": "ab", "seq": 1 }));
    wait_status(&client, ConnectionStatus::Open).await;

    // Same status again publishes nothing.
    node.push(json!({ "tag": "Greetings", "headStatus": "Open", "hydraNodeVersion": "0.19.0" }));
    node.close();
    wait_status(&client, ConnectionStatus::Disconnected).await;

    assert_eq!(
        drain(&mut log).await,
        vec![
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected,
            ConnectionStatus::Open,
            ConnectionStatus::Disconnected,
        ]
    );
}

#[tokio::test]
async fn test_messages_are_published_and_garbage_dropped() {
    let node = MockNode::start(Duration::ZERO).await;
    let client = HeadClient::new(node.config()).unwrap();
    let (tx, mut tags) = mpsc::unbounded_channel();
    client.on_message(move |message| {
        let _ = tx.send(message.tag().to_string());
    });

    client.connect().unwrap();
    wait_status(&client, ConnectionStatus::Connected).await;

    node.push_raw("not json");
    node.push(json!({ "seq": 2 }));
    node.push(json!({ "tag": "BrandNewEvent", "seq": 3 }));
    node.push(json!({ "tag": "HeadIsInitializing", "headId": "ab", "parties": [] }));
    wait_status(&client, ConnectionStatus::Initializing).await;

    assert_eq!(tags.recv().await.unwrap(), "BrandNewEvent");
    assert_eq!(tags.recv().await.unwrap(), "HeadIsInitializing");
    assert!(tags.try_recv().is_err());
}

#[tokio::test]
async fn test_commands_reach_the_node() {
    let mut node = MockNode::start(Duration::ZERO).await;
    let client = HeadClient::new(node.config()).unwrap();
    client.connect().unwrap();

    client.init().await.unwrap();
    client.get_utxo().await.unwrap();
    assert_eq!(node.next_command().await, json!({ "tag": "Init" }));
    assert_eq!(node.next_command().await, json!({ "tag": "GetUTxO" }));
}

#[tokio::test]
async fn test_head_status_field_on_any_message() {
    let node = MockNode::start(Duration::ZERO).await;
    let client = HeadClient::new(node.config()).unwrap();
    client.connect().unwrap();
    wait_status(&client, ConnectionStatus::Connected).await;

    node.push(json!({ "tag": "PeerConnected", "peer": "bob", "headStatus": "Open", "seq": 4 }));
    wait_status(&client, ConnectionStatus::Open).await;
}

#[tokio::test]
async fn test_decommit_reaches_the_node() {
    let mut node = MockNode::start(Duration::ZERO).await;
    let client = HeadClient::new(node.config()).unwrap();
    client.connect().unwrap();

    let decommit_tx = Transaction::new(TxType::Tx, "84a300d901028182").with_description("payout");
    client.decommit(decommit_tx).await.unwrap();

    let command = node.next_command().await;
    assert_eq!(command["tag"], "Decommit");
    assert_eq!(command["decommitTx"]["type"], "Tx ConwayEra");
    assert_eq!(command["decommitTx"]["description"], "payout");
    assert_eq!(command["decommitTx"]["cborHex"], "84a300d901028182");
    assert!(command.get("transaction").is_none());
}

#[tokio::test]
async fn test_concurrent_submissions_are_correlated() {
    let mut node = MockNode::start(Duration::ZERO).await;
    let client = HeadClient::new(node.config()).unwrap();
    client.connect().unwrap();
    wait_status(&client, ConnectionStatus::Connected).await;

    let tx_a = "84a300d90102818258201111";
    let tx_b = "84a300d90102818258202222";
    let submit_a = tokio::spawn({
        let client = client.clone();
        async move { client.submit_tx(tx_a).await }
    });
    let submit_b = tokio::spawn({
        let client = client.clone();
        async move { client.submit_tx(tx_b).await }
    });

    let mut sent = vec![node.next_command().await, node.next_command().await];
    sent.sort_by_key(|command| command["transaction"]["cborHex"].as_str().map(str::to_string));
    assert_eq!(sent[0]["tag"], "NewTx");
    assert_eq!(sent[0]["transaction"]["type"], "Witnessed Tx ConwayEra");
    assert_eq!(sent[0]["transaction"]["cborHex"], tx_a);
    assert_eq!(sent[1]["transaction"]["cborHex"], tx_b);

    node.push(tx_verdict(
        "TxInvalid",
        tx_a,
        json!({ "utxo": {}, "validationError": { "reason": "ValueNotConserved" } }),
    ));
    let verdict_a = timeout(WAIT, submit_a).await.unwrap().unwrap();
    match verdict_a {
        Err(HydraError::ProtocolValidation { validation_error }) => {
            assert_eq!(validation_error["reason"], "ValueNotConserved");
        }
        other => panic!("unexpected verdict for A: {other:?}"),
    }

    sleep(Duration::from_millis(100)).await;
    assert!(!submit_b.is_finished());

    let tx_id = "c".repeat(64);
    let mut valid_b = tx_verdict("TxValid", &tx_b.to_uppercase(), json!({}));
    valid_b["transaction"]["txId"] = json!(tx_id);
    node.push(valid_b);
    let verdict_b = timeout(WAIT, submit_b).await.unwrap().unwrap();
    assert_eq!(verdict_b.unwrap(), tx_id);

    assert_eq!(client.events().subscriber_count(), 0);
}

#[tokio::test]
async fn test_tx_valid_top_level_transaction_id() {
    let mut node = MockNode::start(Duration::ZERO).await;
    let client = HeadClient::new(node.config()).unwrap();
    client.connect().unwrap();

    let tx = "84a400";
    let submit = tokio::spawn({
        let client = client.clone();
        async move { client.submit_tx(tx).await }
    });
    node.next_command().await;

    let tx_id = "d".repeat(64);
    node.push(tx_verdict("TxValid", tx, json!({ "transactionId": tx_id })));
    assert_eq!(timeout(WAIT, submit).await.unwrap().unwrap().unwrap(), tx_id);
}

#[tokio::test]
async fn test_disconnect_fails_pending_submission() {
    let mut node = MockNode::start(Duration::ZERO).await;
    let client = HeadClient::new(node.config()).unwrap();
    client.connect().unwrap();
    wait_status(&client, ConnectionStatus::Connected).await;
    let mut log = status_log(&client);

    let submit = tokio::spawn({
        let client = client.clone();
        async move { client.submit_tx("84a500").await }
    });
    node.next_command().await;

    client.disconnect();
    let verdict = timeout(WAIT, submit).await.unwrap().unwrap();
    assert!(matches!(
        verdict,
        Err(HydraError::ConnectionLost {
            status: ConnectionStatus::Idle
        })
    ));

    // One IDLE event and no DISCONNECTED once the transport winds down.
    assert_eq!(drain(&mut log).await, vec![ConnectionStatus::Idle]);
    assert_eq!(client.status(), ConnectionStatus::Idle);
    assert_eq!(client.events().subscriber_count(), 1);
}

#[tokio::test]
async fn test_transport_loss_fails_pending_submission() {
    let mut node = MockNode::start(Duration::ZERO).await;
    let client = HeadClient::new(node.config()).unwrap();
    client.connect().unwrap();

    let submit = tokio::spawn({
        let client = client.clone();
        async move { client.submit_tx("84a600").await }
    });
    node.next_command().await;
    node.close();

    let verdict = timeout(WAIT, submit).await.unwrap().unwrap();
    assert!(matches!(
        verdict,
        Err(HydraError::ConnectionLost {
            status: ConnectionStatus::Disconnected
        })
    ));
}

#[tokio::test]
async fn test_connect_again_after_transport_loss() {
    let node = MockNode::start(Duration::ZERO).await;
    let client = HeadClient::new(node.config()).unwrap();
    client.connect().unwrap();
    wait_status(&client, ConnectionStatus::Connected).await;
    node.close();
    wait_status(&client, ConnectionStatus::Disconnected).await;

    let mut log = status_log(&client);
    client.connect().unwrap();
    let first = timeout(WAIT, log.recv()).await.unwrap().unwrap();
    assert_eq!(first, ConnectionStatus::Connecting);
    client.disconnect();
}

#[tokio::test]
async fn test_send_waits_for_slow_handshake() {
    let mut node = MockNode::start(Duration::from_secs(3)).await;
    let client = HeadClient::new(node.config()).unwrap();
    client.connect().unwrap();

    let started = Instant::now();
    client.close().await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(node.next_command().await, json!({ "tag": "Close" }));
}

#[tokio::test]
async fn test_send_gives_up_after_timeout() {
    let client = HeadClient::new(ClientConfig::new("http://127.0.0.1:1")).unwrap();

    let started = Instant::now();
    let err = client.fanout().await.unwrap_err();
    assert!(started.elapsed() >= Duration::from_secs(5));
    match err {
        HydraError::ConnectionDeliveryFailure { tag, waited } => {
            assert_eq!(tag, "Fanout");
            assert!(waited >= Duration::from_secs(5));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
