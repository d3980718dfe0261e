//! Relay client tests against a local WebSocket server.

use std::sync::Arc;
use std::time::Duration;

use agent_msg::{ConnectionState, Error, Messenger, RelayClient, RelayMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

/// A relay that accepts a single client, records what it sends and pushes
/// whatever the test hands it.
struct TestRelay {
    url: String,
    received: mpsc::UnboundedReceiver<String>,
    push: mpsc::UnboundedSender<Message>,
}

impl TestRelay {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (received_tx, received) = mpsc::unbounded_channel();
        let (push, mut push_rx) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            let (mut sink, mut source) = ws.split();

            loop {
                tokio::select! {
                    msg = source.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            let _ = received_tx.send(text.to_string());
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    },
                    out = push_rx.recv() => match out {
                        Some(msg) => {
                            let closing = matches!(msg, Message::Close(_));
                            if sink.send(msg).await.is_err() || closing {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });

        Self { url, received, push }
    }

    fn push_text(&self, text: &str) {
        self.push.send(Message::Text(text.to_string())).unwrap();
    }

    fn close(&self) {
        self.push.send(Message::Close(None)).unwrap();
    }

    async fn next_frame(&mut self) -> serde_json::Value {
        let text = timeout(WAIT, self.received.recv()).await.unwrap().unwrap();
        serde_json::from_str(&text).unwrap()
    }
}

fn message_frame(from: &str, message: &str) -> String {
    serde_json::json!({
        "type": "message",
        "from": from,
        "to": "scout",
        "message": message,
        "timestamp": "2024-05-01T12:00:00.000Z",
    })
    .to_string()
}

fn collecting_client(agent: &str) -> (RelayClient, mpsc::UnboundedReceiver<RelayMessage>) {
    let client = RelayClient::new(agent);
    let (tx, rx) = mpsc::unbounded_channel();
    client.on_message(move |msg| {
        let _ = tx.send(msg);
    });
    (client, rx)
}

#[tokio::test]
async fn test_relay_lifecycle() {
    let mut relay = TestRelay::start().await;
    let client = RelayClient::new("scout");

    let err = client.send("base", "too early").await.unwrap_err();
    assert!(matches!(err, Error::NotConnected { .. }));

    client.connect(&relay.url).await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);

    client.send("base", "hello").await.unwrap();
    let frame = relay.next_frame().await;
    assert_eq!(frame["type"], "message");
    assert_eq!(frame["from"], "scout");
    assert_eq!(frame["to"], "base");
    assert_eq!(frame["message"], "hello");
    assert!(frame["timestamp"].is_string());

    relay.close();
    timeout(WAIT, client.closed()).await.unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let err = client.send("base", "too late").await.unwrap_err();
    assert!(err.is_not_connected());
}

#[tokio::test]
async fn test_connect_to_unreachable_endpoint() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let client = RelayClient::new("scout");
    let err = client.connect(&url).await.unwrap_err();

    assert!(matches!(err, Error::Connection { ref endpoint, .. } if *endpoint == url));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(client.send("base", "hello").await.unwrap_err().is_not_connected());
}

#[tokio::test]
async fn test_send_while_connecting_fails_fast() {
    // Accepts TCP but never answers the WebSocket handshake.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let _silent = tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
    });

    let client = Arc::new(RelayClient::new("scout"));
    let connecting = {
        let client = Arc::clone(&client);
        let url = url.clone();
        tokio::spawn(async move { client.connect(&url).await })
    };

    timeout(WAIT, async {
        while client.state() != ConnectionState::Connecting {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let err = client.send("base", "hello").await.unwrap_err();
    assert!(err.is_not_connected());

    connecting.abort();
    let _ = connecting.await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_inbound_messages_in_order_and_noise_discarded() {
    let relay = TestRelay::start().await;
    let (client, mut inbox) = collecting_client("scout");
    client.connect(&relay.url).await.unwrap();

    relay.push_text(&message_frame("base", "one"));
    relay.push_text("this is not json");
    relay.push_text(r#"{"type":"presence","agent":"base"}"#);
    relay.push_text(&message_frame("rover", "two"));
    relay.push_text(r#"{"type":"message","from":"base"}"#);
    relay.push_text(&message_frame("base", "three"));

    let mut got = Vec::new();
    for _ in 0..3 {
        let msg = timeout(WAIT, inbox.recv()).await.unwrap().unwrap();
        got.push((msg.from, msg.message));
    }

    assert_eq!(
        got,
        vec![
            ("base".to_string(), "one".to_string()),
            ("rover".to_string(), "two".to_string()),
            ("base".to_string(), "three".to_string()),
        ]
    );
    assert_eq!(client.dropped_frames(), 2);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_client_close_then_reconnect() {
    let mut first = TestRelay::start().await;
    let client = RelayClient::new("scout");

    client.connect(&first.url).await.unwrap();
    client.close().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(client.send("base", "gone").await.unwrap_err().is_not_connected());
    assert!(timeout(WAIT, first.received.recv()).await.unwrap().is_none());

    let mut second = TestRelay::start().await;
    client.connect(&second.url).await.unwrap();
    client.send("base", "back").await.unwrap();
    assert_eq!(second.next_frame().await["message"], "back");
}

#[tokio::test]
async fn test_concurrent_connects_leave_one_connection() {
    let mut first = TestRelay::start().await;
    let second = TestRelay::start().await;
    let (client, mut inbox) = collecting_client("scout");

    let (a, b) = tokio::join!(client.connect(&first.url), client.connect(&second.url));
    a.unwrap();
    b.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);

    // The earlier connection was closed when the later one took over.
    assert!(timeout(WAIT, first.received.recv()).await.unwrap().is_none());

    second.push_text(&message_frame("base", "from-second"));
    let msg = timeout(WAIT, inbox.recv()).await.unwrap().unwrap();
    assert_eq!(msg.message, "from-second");
    assert!(inbox.try_recv().is_err());

    second.close();
    timeout(WAIT, client.closed()).await.unwrap();
    assert!(client.send("base", "gone").await.unwrap_err().is_not_connected());
}

#[tokio::test]
async fn test_messenger_relay_is_independent_of_mailbox() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let mut relay = TestRelay::start().await;
    let messenger = Messenger::new("scout", temp_dir.path()).unwrap();

    let (tx, mut pushed) = mpsc::unbounded_channel();
    messenger.on_relay_message(move |msg| {
        let _ = tx.send(msg);
    });
    messenger.connect_relay(&relay.url).await.unwrap();

    messenger.send_relay("base", "live").await.unwrap();
    assert_eq!(relay.next_frame().await["message"], "live");
    assert_eq!(messenger.mailbox().pending_count("base").unwrap(), 0);

    messenger.send("base", "durable").unwrap();
    assert_eq!(messenger.mailbox().pending_count("base").unwrap(), 1);

    relay.push_text(&message_frame("base", "pushed"));
    let msg = timeout(WAIT, pushed.recv()).await.unwrap().unwrap();
    assert_eq!(msg.message, "pushed");
    assert!(messenger.check_inbox(true).unwrap().is_empty());

    messenger.close_relay().await;
    assert!(messenger.send_relay("base", "after").await.unwrap_err().is_not_connected());
}
