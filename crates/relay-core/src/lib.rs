pub mod config;
pub mod credential;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod model;
pub mod request_context;
pub mod upstream_status;
