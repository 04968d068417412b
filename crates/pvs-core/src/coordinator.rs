// ── Poll coordinator ──
//
// Owns the device session and everything that depends on it: the
// scheduled refresh cycle with its one-shot re-authentication retry, the
// live-data socket task, and orderly shutdown of both.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use pvs_api::websocket::{self, LiveDataConfig};
use pvs_api::{DeviceClient, Snapshot};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{CoordinatorConfig, CoordinatorOptions, LiveDataSettings};
use crate::convert::LiveValue;
use crate::error::CoreError;
use crate::lifecycle::HostLifecycle;
use crate::listeners::{ListenerRegistry, Subscription};
use crate::live_data::{LiveHandler, LiveShared};
use crate::store::{SnapshotStore, SnapshotStream};

/// Fetch attempts per refresh cycle: the first, plus one after re-auth.
const MAX_ATTEMPTS: u32 = 2;

// ── CoordinatorStatus ───────────────────────────────────────────────

/// Outcome of the most recent poll, observable by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorStatus {
    /// No poll has completed yet.
    Idle,
    Ok,
    /// The last scheduled poll failed; polling continues.
    Degraded { message: String },
    /// Credentials were rejected. Polling has stopped.
    NeedsReauth,
    Stopped,
}

// ── Coordinator ─────────────────────────────────────────────────────

/// Data-acquisition coordinator for one gateway.
///
/// Cheaply cloneable via `Arc<CoordinatorInner>`.
pub struct Coordinator<C: DeviceClient> {
    inner: Arc<CoordinatorInner<C>>,
}

impl<C: DeviceClient> Clone for Coordinator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct CoordinatorInner<C> {
    client: Mutex<C>,
    host: String,
    options: watch::Sender<CoordinatorOptions>,
    live_settings: LiveDataSettings,
    shutdown_timeout: Duration,
    setup_complete: Arc<AtomicBool>,
    store: SnapshotStore,
    live: Arc<LiveShared>,
    lifecycle: HostLifecycle,
    status: watch::Sender<CoordinatorStatus>,
    cancel: CancellationToken,
    /// Poll loop and lifecycle watcher.
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    live_task: Mutex<Option<LiveTask>>,
    started: AtomicBool,
    shut_down: AtomicBool,
}

/// A running live-data channel.
struct LiveTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl<C: DeviceClient> Coordinator<C> {
    /// Create a coordinator. Does NOT poll -- call
    /// [`first_refresh`](Self::first_refresh), then [`start`](Self::start).
    pub fn new(client: C, config: &CoordinatorConfig, lifecycle: HostLifecycle) -> Self {
        let host = client.host().to_owned();
        let (options, _) = watch::channel(config.options.clone());
        let (status, _) = watch::channel(CoordinatorStatus::Idle);

        Self {
            inner: Arc::new(CoordinatorInner {
                client: Mutex::new(client),
                host,
                options,
                live_settings: config.live.clone(),
                shutdown_timeout: config.shutdown_timeout,
                setup_complete: Arc::new(AtomicBool::new(false)),
                store: SnapshotStore::new(),
                live: Arc::new(LiveShared::new(ListenerRegistry::new())),
                lifecycle,
                status,
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
                live_task: Mutex::new(None),
                started: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn host(&self) -> &str {
        &self.inner.host
    }

    pub fn is_setup_complete(&self) -> bool {
        self.inner.setup_complete.load(Ordering::SeqCst)
    }

    pub fn options(&self) -> CoordinatorOptions {
        self.inner.options.borrow().clone()
    }

    pub fn lifecycle(&self) -> &HostLifecycle {
        &self.inner.lifecycle
    }

    // ── Snapshot access ─────────────────────────────────────────────

    /// The latest snapshot, if any poll has succeeded.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.inner.store.current()
    }

    /// Subscribe to "data updated": fires on every successful poll.
    pub fn subscribe_snapshots(&self) -> SnapshotStream {
        self.inner.store.subscribe()
    }

    pub fn status(&self) -> CoordinatorStatus {
        self.inner.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<CoordinatorStatus> {
        self.inner.status.subscribe()
    }

    // ── Live-data access ────────────────────────────────────────────

    /// Current value of a live-data field by internal name.
    pub fn live_value(&self, name: &str) -> Option<LiveValue> {
        self.inner.live.session().value(name)
    }

    /// Copy of the live-data cache; `None` while no socket is connected.
    pub fn live_data(&self) -> Option<BTreeMap<&'static str, Option<LiveValue>>> {
        self.inner.live.session().data().cloned()
    }

    pub fn is_live_data_initialized(&self) -> bool {
        self.inner.live.session().is_initialized()
    }

    /// Register `callback` for changes to one live-data field.
    pub fn subscribe_live(
        &self,
        field: impl Into<String>,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.live.listeners().subscribe(field, callback)
    }

    // ── Refresh cycle ───────────────────────────────────────────────

    /// Initial refresh at startup. Any error here is fatal to startup.
    pub async fn first_refresh(&self) -> Result<Arc<Snapshot>, CoreError> {
        let result = self.refresh().await;
        match &result {
            Ok(_) => self.publish_status(CoordinatorStatus::Ok),
            Err(e) if e.needs_reauth() => self.publish_status(CoordinatorStatus::NeedsReauth),
            Err(e) => self.publish_status(CoordinatorStatus::Degraded {
                message: e.to_string(),
            }),
        }
        result
    }

    /// Run one refresh cycle: authenticate if needed, fetch, store.
    ///
    /// An auth failure on the first fetch of a previously authenticated
    /// session clears the session and retries the cycle once; a second
    /// auth failure is [`CoreError::AuthenticationFailed`].
    ///
    /// Whenever this cycle establishes a new session the live-data channel
    /// is restarted, whether or not the fetch that follows succeeds.
    pub async fn refresh(&self) -> Result<Arc<Snapshot>, CoreError> {
        let mut became_ready = false;
        let fetched = self.fetch_with_reauth(&mut became_ready).await;

        if became_ready && !matches!(&fetched, Err(e) if e.needs_reauth()) {
            self.restart_live_data().await;
        }

        let snapshot = self.inner.store.replace(fetched?);
        debug!(
            inverters = snapshot.inverters.len(),
            meters = snapshot.meters.len(),
            "snapshot stored"
        );
        Ok(snapshot)
    }

    /// Setup (when needed) and fetch under the client lock.
    ///
    /// Sets `became_ready` when `setup_complete` went false → true.
    #[allow(clippy::cognitive_complexity)]
    async fn fetch_with_reauth(&self, became_ready: &mut bool) -> Result<Snapshot, CoreError> {
        let inner = &self.inner;
        let mut client = inner.client.lock().await;

        for attempt in 0..MAX_ATTEMPTS {
            if !inner.setup_complete.load(Ordering::SeqCst) {
                debug!(host = %inner.host, "setting up device session");
                match self.guarded(client.setup()).await? {
                    Ok(()) => {
                        inner.setup_complete.store(true, Ordering::SeqCst);
                        *became_ready = true;
                        info!(host = %inner.host, "device session established");
                    }
                    Err(e) if e.is_auth_error() => {
                        error!(error = %e, "gateway rejected credentials during setup");
                        return Err(CoreError::AuthenticationFailed {
                            message: e.to_string(),
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "gateway setup failed");
                        let message = e.to_string();
                        return Err(if e.is_protocol_error() {
                            CoreError::ProtocolFailed { message }
                        } else {
                            CoreError::CommunicationFailed { message }
                        });
                    }
                }
            }

            match self.guarded(client.update()).await? {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) if e.is_auth_error() => {
                    if attempt == 0 && inner.setup_complete.swap(false, Ordering::SeqCst) {
                        warn!(error = %e, "session rejected, re-authenticating");
                        continue;
                    }
                    error!(error = %e, "gateway rejected credentials after re-authentication");
                    return Err(CoreError::AuthenticationFailed {
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    let err = CoreError::from(e);
                    debug!(error = %err, "fetch failed");
                    return Err(err);
                }
            }
        }

        Err(CoreError::Internal(
            "refresh cycle ended without a result".into(),
        ))
    }

    /// Race a device call against coordinator cancellation.
    async fn guarded<T>(
        &self,
        call: impl Future<Output = Result<T, pvs_api::Error>>,
    ) -> Result<Result<T, pvs_api::Error>, CoreError> {
        tokio::select! {
            biased;
            () = self.inner.cancel.cancelled() => Err(CoreError::Cancelled),
            result = call => Ok(result),
        }
    }

    fn publish_status(&self, status: CoordinatorStatus) {
        self.inner.status.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
    }

    // ── Background tasks ────────────────────────────────────────────

    /// Spawn the scheduled poll loop and the host-lifecycle watcher.
    pub async fn start(&self) -> Result<(), CoreError> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(CoreError::Cancelled);
        }
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(CoreError::Internal("coordinator already started".into()));
        }

        let mut handles = self.inner.task_handles.lock().await;
        handles.push(tokio::spawn(poll_task(
            self.clone(),
            self.inner.cancel.clone(),
        )));
        handles.push(tokio::spawn(lifecycle_task(
            self.inner.lifecycle.clone(),
            self.inner.cancel.clone(),
        )));

        info!(
            host = %self.inner.host,
            period_s = self.options().update_period.as_secs_f64(),
            "polling started"
        );
        Ok(())
    }

    /// Apply new options. The poll interval takes effect at the next
    /// cycle boundary; the live-data channel is restarted.
    pub async fn update_options(&self, options: CoordinatorOptions) {
        info!(
            period_s = options.update_period.as_secs_f64(),
            live_data = options.live_data_enabled,
            "options updated"
        );
        self.inner.options.send_replace(options);
        self.restart_live_data().await;
    }

    /// Tear down any live-data channel, then start a fresh one if live
    /// data is enabled and the session is set up.
    async fn restart_live_data(&self) {
        let inner = &self.inner;
        let mut slot = inner.live_task.lock().await;

        if let Some(previous) = slot.take() {
            debug!("stopping previous live-data channel");
            previous.cancel.cancel();
            join_or_abort(previous.handle, inner.shutdown_timeout, "live-data").await;
        }
        // An aborted task never ran its disconnect path.
        inner.live.clear();

        if inner.shut_down.load(Ordering::SeqCst) || inner.cancel.is_cancelled() {
            return;
        }
        if !inner.options.borrow().live_data_enabled {
            debug!("live data disabled");
            return;
        }
        if !inner.setup_complete.load(Ordering::SeqCst) {
            return;
        }

        let url = match &inner.live_settings.url {
            Some(url) => url.clone(),
            None => match websocket::live_data_url(&inner.host) {
                Ok(url) => url,
                Err(e) => {
                    warn!(error = %e, host = %inner.host, "invalid live-data URL");
                    return;
                }
            },
        };

        let mut config = LiveDataConfig::new(url);
        config.reconnect = inner.live_settings.reconnect.clone();

        let cancel = inner.cancel.child_token();
        let handler = LiveHandler::new(Arc::clone(&inner.live), {
            let setup_complete = Arc::clone(&inner.setup_complete);
            let options = inner.options.subscribe();
            let lifecycle = inner.lifecycle.clone();
            move || {
                setup_complete.load(Ordering::SeqCst)
                    && options.borrow().live_data_enabled
                    && !lifecycle.is_stopping()
            }
        });

        let handle = tokio::spawn(live_data_task(
            config,
            handler,
            inner.lifecycle.clone(),
            inner.live_settings.start_delay,
            cancel.clone(),
        ));
        *slot = Some(LiveTask { cancel, handle });
        debug!("live-data channel scheduled");
    }

    // ── Shutdown ────────────────────────────────────────────────────

    /// Cancel all background work, wait briefly for it, and clear the
    /// live-data cache. Calling this again is a no-op.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            debug!("coordinator already shut down");
            return;
        }

        self.inner.cancel.cancel();

        if let Some(live) = self.inner.live_task.lock().await.take() {
            live.cancel.cancel();
            join_or_abort(live.handle, self.inner.shutdown_timeout, "live-data").await;
        }

        let handles: Vec<_> = self.inner.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            join_or_abort(handle, self.inner.shutdown_timeout, "background").await;
        }

        self.inner.live.clear();
        self.publish_status(CoordinatorStatus::Stopped);
        info!(host = %self.inner.host, "coordinator shut down");
    }
}

/// Await a task for at most `timeout`, aborting it if it does not finish.
async fn join_or_abort(mut handle: JoinHandle<()>, timeout: Duration, name: &str) {
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(task = name, error = %e, "task ended abnormally"),
        Err(_) => {
            warn!(task = name, "task did not stop in time, aborting");
            handle.abort();
            let _ = handle.await;
        }
    }
}

// ── Task bodies ─────────────────────────────────────────────────────

/// Scheduled polling. Sleeps the current interval, refreshes, repeats.
///
/// Stops for good on cancellation, host stop, or an authentication failure.
async fn poll_task<C: DeviceClient>(coordinator: Coordinator<C>, cancel: CancellationToken) {
    let mut options = coordinator.inner.options.subscribe();
    let lifecycle = coordinator.inner.lifecycle.clone();
    let mut last = Instant::now();

    loop {
        let deadline = last + options.borrow_and_update().update_period;

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = lifecycle.wait_stopping() => break,
            changed = options.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            () = tokio::time::sleep_until(deadline) => {}
        }

        last = Instant::now();
        match coordinator.refresh().await {
            Ok(_) => coordinator.publish_status(CoordinatorStatus::Ok),
            Err(CoreError::Cancelled) => break,
            Err(e) if e.needs_reauth() => {
                error!(error = %e, "authentication failed, polling stopped");
                coordinator.publish_status(CoordinatorStatus::NeedsReauth);
                break;
            }
            Err(e) => {
                warn!(error = %e, "scheduled refresh failed");
                coordinator.publish_status(CoordinatorStatus::Degraded {
                    message: e.to_string(),
                });
            }
        }
    }

    debug!("poll loop exiting");
}

/// Cancel all coordinator work once the host starts stopping.
async fn lifecycle_task(lifecycle: HostLifecycle, cancel: CancellationToken) {
    tokio::select! {
        biased;
        () = cancel.cancelled() => {}
        () = lifecycle.wait_stopping() => {
            info!("host stopping, cancelling coordinator tasks");
            cancel.cancel();
        }
    }
}

/// Wait for the host to run, then a grace period, then run the socket loop.
async fn live_data_task(
    config: LiveDataConfig,
    handler: LiveHandler,
    lifecycle: HostLifecycle,
    start_delay: Duration,
    cancel: CancellationToken,
) {
    let running = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        running = lifecycle.wait_running() => running,
    };
    if !running {
        return;
    }

    tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        () = tokio::time::sleep(start_delay) => {}
    }

    websocket::run_live_data(config, handler, cancel).await;
}
