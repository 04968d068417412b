//! Live-data WebSocket stream with staleness watchdog and auto-reconnect.
//!
//! The PVS pushes sub-second power readings as JSON text frames on
//! `ws://<host>:9002`. [`run_live_data`] owns one fresh connection per
//! attempt and drives a [`LiveDataHandler`] through the connection's
//! lifecycle: `on_connect` once the upgrade succeeds, `on_frame` for every
//! decoded JSON frame, `on_disconnect` whenever the connection ends for
//! any reason (including cancellation).
//!
//! Reconnection uses a tiered policy: a few fast retries, then exponential
//! backoff with jitter. See [`Backoff`].
//!
//! # Example
//!
//! ```rust,ignore
//! use pvs_api::websocket::{run_live_data, live_data_url, LiveDataConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel = CancellationToken::new();
//! let config = LiveDataConfig::new(live_data_url("192.168.1.50")?);
//! tokio::spawn(run_live_data(config, my_handler, cancel.clone()));
//!
//! // later
//! cancel.cancel();
//! ```

use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;

/// TCP port the gateway serves live data on.
pub const LIVE_DATA_PORT: u16 = 9002;

/// Build the live-data socket URL for a gateway host.
pub fn live_data_url(host: &str) -> Result<Url, Error> {
    Ok(Url::parse(&format!("ws://{host}:{LIVE_DATA_PORT}"))?)
}

// ── LiveDataHandler ──────────────────────────────────────────────────

/// Receives the lifecycle of every live-data connection.
///
/// All methods run on the connection loop's own task, so a `on_disconnect`
/// for one connection always completes before the next `on_connect`.
pub trait LiveDataHandler: Send + 'static {
    /// The upgrade succeeded; nothing has been read yet.
    fn on_connect(&mut self);

    /// A text frame that parsed as JSON.
    fn on_frame(&mut self, frame: &serde_json::Value);

    /// The connection is gone (closed, failed, stale, or cancelled).
    fn on_disconnect(&mut self);

    /// Asked after every disconnect. Returning `false` ends the loop.
    fn may_reconnect(&self) -> bool {
        true
    }
}

// ── ReconnectPolicy ──────────────────────────────────────────────────

/// Tiered reconnect configuration.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Consecutive failures retried at `fast_delay`. Default: 3.
    pub fast_retries: u32,

    /// Delay for fast retries and after a clean close. Default: 2s.
    pub fast_delay: Duration,

    /// Starting backoff base once fast retries are exhausted. Default: 5s.
    pub initial_base: Duration,

    /// Upper bound on any delay and on the base. Default: 300s.
    pub max_delay: Duration,

    /// Cap on the doubling exponent. Default: 5.
    pub max_exponent: u32,

    /// Multiplier applied to the base after each backoff delay. Default: 1.5.
    pub base_growth: f64,

    /// Relative jitter applied to backoff delays. Default: 0.2 (±20%).
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            fast_retries: 3,
            fast_delay: Duration::from_secs(2),
            initial_base: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            max_exponent: 5,
            base_growth: 1.5,
            jitter: 0.2,
        }
    }
}

// ── Backoff ──────────────────────────────────────────────────────────

/// Reconnect delay state for one live-data loop.
///
/// Failures `1..=fast_retries` wait `fast_delay`. Past that:
///
/// `delay = min(base * 2^min(failures - fast_retries - 1, max_exponent), max) * jitter`
///
/// clamped to `max`, after which `base = min(base * base_growth, max)`.
/// A successful connect resets both the counter and the base.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    failures: u32,
    base: Duration,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        let base = policy.initial_base;
        Self {
            policy,
            failures: 0,
            base,
        }
    }

    /// Consecutive failures since the last successful connect.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Current backoff base.
    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn reset(&mut self) {
        self.failures = 0;
        self.base = self.policy.initial_base;
    }

    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    /// Delay before the next attempt, with random jitter.
    pub fn next_delay(&mut self) -> Duration {
        let spread = self.policy.jitter.max(0.0);
        let factor = 1.0 - spread + 2.0 * spread * rand::random::<f64>();
        self.next_delay_with(factor)
    }

    /// Delay before the next attempt, with a caller-chosen jitter factor.
    pub fn next_delay_with(&mut self, jitter_factor: f64) -> Duration {
        if self.failures <= self.policy.fast_retries {
            return self.policy.fast_delay;
        }

        let max = self.policy.max_delay.as_secs_f64();
        let exponent = (self.failures - self.policy.fast_retries - 1).min(self.policy.max_exponent);
        let nominal = (self.base.as_secs_f64() * 2_f64.powf(f64::from(exponent))).min(max);
        let delay = within(nominal * jitter_factor, max);

        self.base = Duration::from_secs_f64(within(
            self.base.as_secs_f64() * self.policy.base_growth,
            max,
        ));

        Duration::from_secs_f64(delay)
    }
}

/// Bound `secs` to `0..=max`. NaN and negatives become zero.
fn within(secs: f64, max: f64) -> f64 {
    if secs > 0.0 { secs.min(max) } else { 0.0 }
}

// ── LiveDataConfig ───────────────────────────────────────────────────

/// Connection parameters for the live-data loop.
#[derive(Debug, Clone)]
pub struct LiveDataConfig {
    pub url: Url,

    /// Bound on TCP connect + upgrade. Default: 10s.
    pub connect_timeout: Duration,

    /// Protocol ping interval. Default: 30s.
    pub ping_interval: Duration,

    /// How often the watchdog checks for staleness. Default: 30s.
    pub watchdog_interval: Duration,

    /// Idle time after which the connection is considered stale. Default: 90s.
    pub stale_after: Duration,

    pub reconnect: ReconnectPolicy,
}

impl LiveDataConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            connect_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(30),
            watchdog_interval: Duration::from_secs(30),
            stale_after: Duration::from_secs(90),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → read → on exit, backoff → reconnect.
///
/// Returns when `cancel` fires or the handler declines to reconnect.
pub async fn run_live_data<H: LiveDataHandler>(
    config: LiveDataConfig,
    mut handler: H,
    cancel: CancellationToken,
) {
    let mut backoff = Backoff::new(config.reconnect.clone());

    loop {
        tracing::info!(
            url = %config.url,
            attempt = backoff.failures() + 1,
            "Connecting to live-data socket"
        );

        let result = connect_and_read(&config, &mut handler, &mut backoff, &cancel).await;
        handler.on_disconnect();

        match result {
            Ok(()) => tracing::info!("Live-data socket disconnected"),
            Err(e) => {
                backoff.record_failure();
                tracing::warn!(error = %e, failures = backoff.failures(), "Live-data socket failed");
            }
        }

        if cancel.is_cancelled() || !handler.may_reconnect() {
            break;
        }

        let delay = backoff.next_delay();
        tracing::info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            failures = backoff.failures(),
            "Waiting before live-data reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        if !handler.may_reconnect() {
            break;
        }
    }

    tracing::debug!("Live-data loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish a single connection and read frames until it drops.
///
/// `Ok(())` means a clean close, end of stream, or cancellation.
async fn connect_and_read<H: LiveDataHandler>(
    config: &LiveDataConfig,
    handler: &mut H,
    backoff: &mut Backoff,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    let connect = tokio::time::timeout(
        config.connect_timeout,
        tokio_tungstenite::connect_async(config.url.as_str()),
    );

    let ws_stream = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(()),
        result = connect => match result {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
            Err(_) => {
                return Err(Error::Timeout {
                    timeout_secs: config.connect_timeout.as_secs(),
                });
            }
        },
    };

    tracing::info!(url = %config.url, "Live-data socket connected");
    backoff.reset();
    handler.on_connect();

    let (mut write, mut read) = ws_stream.split();

    let (seen_tx, seen_rx) = watch::channel(Instant::now());
    let stale = CancellationToken::new();
    let watchdog_stop = cancel.child_token();
    let watchdog_task = tokio::spawn(watchdog(
        seen_rx,
        config.watchdog_interval,
        config.stale_after,
        stale.clone(),
        watchdog_stop.clone(),
    ));

    let mut ping = tokio::time::interval_at(
        Instant::now() + config.ping_interval,
        config.ping_interval,
    );

    let result = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break Ok(()),
            () = stale.cancelled() => {
                break Err(Error::StaleConnection {
                    idle_secs: seen_tx.borrow().elapsed().as_secs(),
                });
            }
            _ = ping.tick() => {
                if let Err(e) = write.send(tungstenite::Message::Ping(Bytes::new())).await {
                    break Err(Error::WebSocketConnect(e.to_string()));
                }
            }
            frame = read.next() => match frame {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    seen_tx.send_replace(Instant::now());
                    decode_and_dispatch(&text, handler);
                }
                Some(Ok(tungstenite::Message::Binary(_))) => {
                    seen_tx.send_replace(Instant::now());
                    tracing::debug!("Ignoring binary live-data frame");
                }
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    if let Some(ref cf) = frame {
                        tracing::info!(
                            code = %cf.code,
                            reason = %cf.reason,
                            "Live-data close frame received"
                        );
                    } else {
                        tracing::info!("Live-data close frame received (no payload)");
                    }
                    // Flushes the queued close reply.
                    match tokio::time::timeout(config.connect_timeout, write.close()).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => tracing::debug!(error = %e, "Live-data close reply failed"),
                        Err(_) => tracing::debug!("Live-data close reply timed out"),
                    }
                    break Ok(());
                }
                Some(Err(e)) => break Err(Error::WebSocketConnect(e.to_string())),
                None => {
                    tracing::info!("Live-data stream ended");
                    break Ok(());
                }
                // tungstenite answers pings itself; pongs and raw frames carry no data
                Some(Ok(_)) => {}
            },
        }
    };

    watchdog_stop.cancel();
    if let Err(e) = watchdog_task.await {
        tracing::debug!(error = %e, "Live-data watchdog did not exit cleanly");
    }

    result
}

/// Staleness watchdog for one connection.
///
/// Every `interval`, fires `stale` if the last data frame is older than
/// `stale_after`, then exits.
async fn watchdog(
    seen: watch::Receiver<Instant>,
    interval: Duration,
    stale_after: Duration,
    stale: CancellationToken,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = stop.cancelled() => return,
            () = tokio::time::sleep(interval) => {}
        }

        let idle = seen.borrow().elapsed();
        if idle > stale_after {
            tracing::warn!(
                idle_secs = idle.as_secs(),
                "Live-data socket appears stale, closing"
            );
            stale.cancel();
            return;
        }
    }
}

// ── Frame decoding ───────────────────────────────────────────────────

/// Parse a text frame as JSON and hand it to the handler.
///
/// Malformed frames are logged and dropped; they never end the connection.
fn decode_and_dispatch<H: LiveDataHandler>(text: &str, handler: &mut H) {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(frame) => handler.on_frame(&frame),
        Err(e) => tracing::debug!(error = %e, "Invalid JSON in live-data frame"),
    }
}

// ── Tests ────────────────────────────────────────────────────────────
