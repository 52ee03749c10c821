pub mod relay;

pub use relay::{Relay, RelayConfig};
