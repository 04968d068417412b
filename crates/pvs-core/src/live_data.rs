// ── Live-data cache ──
//
// The per-connection state behind the live-data channel: a map from
// field name to converted value, allocated on connect and discarded on
// disconnect, plus the connection's timestamp unit. `LiveHandler` plugs
// this into `pvs_api::websocket::run_live_data`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use pvs_api::LiveDataHandler;
use serde_json::Value;
use tracing::debug;

use crate::convert::{self, FieldKind, LiveValue, TimestampFormat};
use crate::listeners::ListenerRegistry;

/// One field of the `power` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveField {
    /// Key inside the frame's `params` object.
    pub wire: &'static str,
    /// Internal name (device variable path).
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn field(wire: &'static str, name: &'static str, kind: FieldKind) -> LiveField {
    LiveField { wire, name, kind }
}

/// Every field the gateway pushes.
pub static LIVE_FIELDS: [LiveField; 12] = [
    field("time", "/sys/livedata/time", FieldKind::Timestamp),
    field("pv_p", "/sys/livedata/pv_p", FieldKind::Numeric),
    field("pv_en", "/sys/livedata/pv_en", FieldKind::Numeric),
    field("net_p", "/sys/livedata/net_p", FieldKind::Numeric),
    field("net_en", "/sys/livedata/net_en", FieldKind::Numeric),
    field("site_load_p", "/sys/livedata/site_load_p", FieldKind::Numeric),
    field("site_load_en", "/sys/livedata/site_load_en", FieldKind::Numeric),
    field("ess_en", "/sys/livedata/ess_en", FieldKind::Numeric),
    field("ess_p", "/sys/livedata/ess_p", FieldKind::Numeric),
    field("soc", "/sys/livedata/soc", FieldKind::Numeric),
    field(
        "backupTimeRemaining",
        "/sys/livedata/backupTimeRemaining",
        FieldKind::Numeric,
    ),
    field("midstate", "/sys/livedata/midstate", FieldKind::Text),
];

/// Look up a field by internal name.
pub fn live_field(name: &str) -> Option<&'static LiveField> {
    LIVE_FIELDS.iter().find(|f| f.name == name)
}

/// Cached values, keyed by internal field name. `None` values are absent.
pub type LiveData = BTreeMap<&'static str, Option<LiveValue>>;

// ── LiveSession ─────────────────────────────────────────────────────

/// Cache and timestamp unit for the current connection.
#[derive(Debug, Default)]
pub struct LiveSession {
    data: Option<LiveData>,
    timestamp_format: TimestampFormat,
}

impl LiveSession {
    /// Called on every successful connect.
    ///
    /// Allocates the cache with every field absent if none exists, and
    /// resets the timestamp unit.
    pub fn connect(&mut self) {
        if self.data.is_none() {
            self.data = Some(LIVE_FIELDS.iter().map(|f| (f.name, None)).collect());
            debug!(fields = LIVE_FIELDS.len(), "live-data cache initialized");
        }
        self.timestamp_format = TimestampFormat::Unknown;
    }

    /// Discard the cache.
    pub fn disconnect(&mut self) {
        self.data = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.data.is_some()
    }

    pub fn data(&self) -> Option<&LiveData> {
        self.data.as_ref()
    }

    /// Current value of a field; `None` if uninitialized, unknown or absent.
    pub fn value(&self, name: &str) -> Option<LiveValue> {
        self.data.as_ref()?.get(name)?.clone()
    }

    pub fn timestamp_format(&self) -> TimestampFormat {
        self.timestamp_format
    }

    /// Apply one decoded frame and return the fields whose value changed.
    ///
    /// Only `{"notification": "power", "params": {...}}` frames are
    /// relevant; anything else, or any frame while the cache is
    /// uninitialized, changes nothing.
    pub fn apply(&mut self, frame: &Value, now: DateTime<Utc>) -> BTreeSet<&'static str> {
        let mut changed = BTreeSet::new();

        if frame.get("notification").and_then(Value::as_str) != Some("power") {
            return changed;
        }
        let Some(params) = frame.get("params") else {
            return changed;
        };
        let Some(data) = self.data.as_mut() else {
            return changed;
        };

        for field in &LIVE_FIELDS {
            let Some(raw) = params.get(field.wire) else {
                continue;
            };
            let value = convert::convert(raw, field.kind, &mut self.timestamp_format, now);
            let slot = data.entry(field.name).or_default();
            if *slot != value {
                *slot = value;
                changed.insert(field.name);
            }
        }

        changed
    }
}

// ── Shared state + socket handler ───────────────────────────────────

/// Live-data state shared between the coordinator and its socket task.
#[derive(Default)]
pub struct LiveShared {
    session: Mutex<LiveSession>,
    listeners: ListenerRegistry,
}

impl LiveShared {
    pub fn new(listeners: ListenerRegistry) -> Self {
        Self {
            session: Mutex::new(LiveSession::default()),
            listeners,
        }
    }

    /// Lock the session. A poisoned lock is recovered; the session holds
    /// no invariants a panicking writer could break halfway.
    pub fn session(&self) -> MutexGuard<'_, LiveSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Apply a frame, then notify listeners of changed fields outside the lock.
    pub fn process(&self, frame: &Value) {
        let changed = self.session().apply(frame, Utc::now());
        if !changed.is_empty() {
            debug!(changed = changed.len(), "live-data fields changed");
            self.listeners.notify(&changed);
        }
    }

    pub fn clear(&self) {
        self.session().disconnect();
    }
}

type ReconnectGate = Box<dyn Fn() -> bool + Send + Sync>;

/// Bridges the socket loop to the shared cache.
pub struct LiveHandler {
    shared: Arc<LiveShared>,
    may_reconnect: ReconnectGate,
}

impl LiveHandler {
    pub fn new(shared: Arc<LiveShared>, may_reconnect: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self {
            shared,
            may_reconnect: Box::new(may_reconnect),
        }
    }
}

impl LiveDataHandler for LiveHandler {
    fn on_connect(&mut self) {
        self.shared.session().connect();
    }

    fn on_frame(&mut self, frame: &Value) {
        self.shared.process(frame);
    }

    fn on_disconnect(&mut self) {
        self.shared.clear();
    }

    fn may_reconnect(&self) -> bool {
        (self.may_reconnect)()
    }
}
