pub mod config;
pub mod error;
pub mod types;

pub use config::{DeployConfig, TimingConfig};
pub use error::{ControlPlaneError, ControlPlaneResult};
pub use types::*;
