pub mod client;
pub mod handler;
pub mod message;
pub mod sse;

pub use client::{SseAutoConfigClient, UpstreamClient, UpstreamClientError, run_with_reconnect};
pub use handler::{AutoConfigHandler, EnvironmentSink, millis_to_instant};
pub use message::{AutoConfigMessage, EnvRep, decode};
