// pvs-api: Async Rust client for PVS gateways (varserver HTTP + live-data WebSocket)

pub mod client;
pub mod error;
pub mod model;
pub mod transport;
pub mod varserver;
pub mod websocket;

pub use client::{DeviceClient, PvsClient};
pub use error::Error;
pub use model::{DeviceKind, Snapshot};
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{LiveDataConfig, LiveDataHandler, ReconnectPolicy};
