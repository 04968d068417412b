//! Data-acquisition core for PVS solar gateways.
//!
//! Sits between `pvs-api` and a host (the `pvs` CLI, or any embedding
//! runtime):
//!
//! - **[`Coordinator`]**: Owns the device session. [`first_refresh()`](Coordinator::first_refresh)
//!   authenticates and loads the first [`Snapshot`](pvs_api::Snapshot);
//!   [`start()`](Coordinator::start) spawns scheduled polling;
//!   [`shutdown()`](Coordinator::shutdown) tears everything down.
//!
//! - **Live data** ([`live_data`]): Per-connection cache of the gateway's
//!   push fields, converted by [`convert`] and diffed on every frame.
//!
//! - **[`ListenerRegistry`]**: Per-field change callbacks with disposable
//!   [`Subscription`]s.
//!
//! - **[`HostLifecycle`]**: Host state that gates live data and stops polling.

pub mod config;
pub mod convert;
pub mod coordinator;
pub mod error;
pub mod lifecycle;
pub mod listeners;
pub mod live_data;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{CoordinatorConfig, CoordinatorOptions, LiveDataSettings, TlsVerification};
pub use convert::{FieldKind, LiveValue, TimestampFormat};
pub use coordinator::{Coordinator, CoordinatorStatus};
pub use error::CoreError;
pub use lifecycle::{HostLifecycle, HostState};
pub use listeners::{ListenerRegistry, Subscription};
pub use live_data::{LIVE_FIELDS, LiveField};
pub use store::{SnapshotStore, SnapshotStream, SnapshotWatchStream};
