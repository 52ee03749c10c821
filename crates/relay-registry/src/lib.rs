pub mod context;
pub mod registry;
pub mod rotation;

pub use context::{DeprecatedCredential, EnvironmentContext};
pub use registry::EnvironmentRegistry;
pub use rotation::{RotationOutcome, apply_rotation, set_credentials};
