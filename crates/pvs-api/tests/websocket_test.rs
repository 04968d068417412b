#![allow(clippy::unwrap_used)]
// Integration tests for the live-data loop against a local WebSocket server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use pvs_api::websocket::{LiveDataConfig, LiveDataHandler, ReconnectPolicy, run_live_data};

// ── Helpers ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Connect,
    Frame(serde_json::Value),
    Disconnect,
}

struct Recorder {
    tx: mpsc::UnboundedSender<Event>,
    reconnect: bool,
}

impl LiveDataHandler for Recorder {
    fn on_connect(&mut self) {
        let _ = self.tx.send(Event::Connect);
    }

    fn on_frame(&mut self, frame: &serde_json::Value) {
        let _ = self.tx.send(Event::Frame(frame.clone()));
    }

    fn on_disconnect(&mut self) {
        let _ = self.tx.send(Event::Disconnect);
    }

    fn may_reconnect(&self) -> bool {
        self.reconnect
    }
}

/// Records connects, disconnects and every `may_reconnect` query with
/// its time. The loop asks once before its reconnect sleep and once after.
#[derive(Debug)]
enum Mark {
    Connect,
    Disconnect,
    Retry(Instant),
}

struct Timeline {
    tx: mpsc::UnboundedSender<Mark>,
}

impl LiveDataHandler for Timeline {
    fn on_connect(&mut self) {
        let _ = self.tx.send(Mark::Connect);
    }

    fn on_frame(&mut self, _frame: &serde_json::Value) {}

    fn on_disconnect(&mut self) {
        let _ = self.tx.send(Mark::Disconnect);
    }

    fn may_reconnect(&self) -> bool {
        let _ = self.tx.send(Mark::Retry(Instant::now()));
        true
    }
}

async fn next_mark(rx: &mut mpsc::UnboundedReceiver<Mark>) -> Mark {
    tokio::time::timeout(Duration::from_secs(600), rx.recv())
        .await
        .expect("timed out waiting for handler mark")
        .expect("handler dropped")
}

/// Time the loop slept between its two `may_reconnect` queries.
async fn slept(rx: &mut mpsc::UnboundedReceiver<Mark>) -> Duration {
    let Mark::Retry(before) = next_mark(rx).await else {
        panic!("expected pre-sleep retry mark");
    };
    let Mark::Retry(after) = next_mark(rx).await else {
        panic!("expected post-sleep retry mark");
    };
    after - before
}

async fn refused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

fn test_config(port: u16) -> LiveDataConfig {
    let mut config = LiveDataConfig::new(Url::parse(&format!("ws://127.0.0.1:{port}")).unwrap());
    config.connect_timeout = Duration::from_secs(2);
    config.ping_interval = Duration::from_secs(10);
    config.reconnect = ReconnectPolicy {
        fast_delay: Duration::from_millis(50),
        ..ReconnectPolicy::default()
    };
    config
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for handler event")
        .expect("handler dropped")
}

fn power_frame(pv_p: &str) -> String {
    json!({ "notification": "power", "params": { "pv_p": pv_p } }).to_string()
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_frames_dispatched_and_reconnect_after_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        // First connection: one good frame, one malformed frame, then close.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::text(power_frame("1.5"))).await.unwrap();
        ws.send(Message::text("{not json")).await.unwrap();
        ws.close(None).await.unwrap();

        // Second connection: one frame, then hold open.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::text(power_frame("2.5"))).await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_live_data(
        test_config(port),
        Recorder {
            tx,
            reconnect: true,
        },
        cancel.clone(),
    ));

    assert_eq!(next(&mut rx).await, Event::Connect);
    match next(&mut rx).await {
        Event::Frame(frame) => assert_eq!(frame["params"]["pv_p"], "1.5"),
        other => panic!("expected frame, got {other:?}"),
    }
    assert_eq!(next(&mut rx).await, Event::Disconnect);

    assert_eq!(next(&mut rx).await, Event::Connect);
    match next(&mut rx).await {
        Event::Frame(frame) => assert_eq!(frame["params"]["pv_p"], "2.5"),
        other => panic!("expected frame, got {other:?}"),
    }

    cancel.cancel();
    assert_eq!(next(&mut rx).await, Event::Disconnect);
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_stale_connection_is_closed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        // Never send anything.
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let mut config = test_config(port);
    config.watchdog_interval = Duration::from_millis(50);
    config.stale_after = Duration::from_millis(150);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_live_data(
        config,
        Recorder {
            tx,
            reconnect: false,
        },
        CancellationToken::new(),
    ));

    assert_eq!(next(&mut rx).await, Event::Connect);
    assert_eq!(next(&mut rx).await, Event::Disconnect);
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_refused_connection_ends_when_reconnect_declined() {
    let port = refused_port().await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_live_data(
        test_config(port),
        Recorder {
            tx,
            reconnect: false,
        },
        CancellationToken::new(),
    ));

    assert_eq!(next(&mut rx).await, Event::Disconnect);
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_refused_connections_back_off_and_cancel_interrupts_sleep() {
    let mut config = test_config(refused_port().await);
    config.reconnect = ReconnectPolicy {
        jitter: 0.0,
        ..ReconnectPolicy::default()
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_live_data(config, Timeline { tx }, cancel.clone()));

    let mut delays = Vec::new();
    for _ in 0..7 {
        assert!(matches!(next_mark(&mut rx).await, Mark::Disconnect));
        delays.push(slept(&mut rx).await.as_secs());
    }
    assert_eq!(delays, vec![2, 2, 2, 5, 15, 45, 135]);

    // Eighth failure: the loop is now in a 300s sleep.
    assert!(matches!(next_mark(&mut rx).await, Mark::Disconnect));
    assert!(matches!(next_mark(&mut rx).await, Mark::Retry(_)));
    let cancelled_at = Instant::now();
    cancel.cancel();
    task.await.unwrap();
    assert_eq!(cancelled_at.elapsed(), Duration::ZERO);
}

#[tokio::test]
async fn test_stale_close_counts_as_failure_and_connect_resets() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                let _ws = tokio_tungstenite::accept_async(stream).await;
                tokio::time::sleep(Duration::from_secs(30)).await;
            });
        }
    });

    let mut config = test_config(port);
    config.watchdog_interval = Duration::from_millis(20);
    config.stale_after = Duration::from_millis(100);
    config.reconnect = ReconnectPolicy {
        fast_retries: 0,
        fast_delay: Duration::from_millis(20),
        initial_base: Duration::from_millis(400),
        jitter: 0.0,
        ..ReconnectPolicy::default()
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_live_data(config, Timeline { tx }, cancel.clone()));

    // Every stale close is one failure after a fresh connect, so each
    // delay is the initial base, never the fast delay or a doubled base.
    for _ in 0..2 {
        assert!(matches!(next_mark(&mut rx).await, Mark::Connect));
        assert!(matches!(next_mark(&mut rx).await, Mark::Disconnect));
        let delay = slept(&mut rx).await;
        assert!(
            delay >= Duration::from_millis(400) && delay < Duration::from_millis(1000),
            "unexpected delay {delay:?}"
        );
    }

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_server_close_is_acknowledged() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.close(None).await.unwrap();

        let mut acknowledged = false;
        while let Some(message) = ws.next().await {
            match message {
                Ok(Message::Close(_)) => acknowledged = true,
                Ok(_) => {}
                Err(_) => break,
            }
        }
        let _ = done_tx.send(acknowledged);
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_live_data(
        test_config(port),
        Recorder {
            tx,
            reconnect: false,
        },
        CancellationToken::new(),
    ));

    assert_eq!(next(&mut rx).await, Event::Connect);
    assert_eq!(next(&mut rx).await, Event::Disconnect);
    let acknowledged = tokio::time::timeout(Duration::from_secs(5), done_rx)
        .await
        .unwrap()
        .unwrap();
    assert!(acknowledged, "gateway never saw a close reply");
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
}
