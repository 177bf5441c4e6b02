//! Traffic signals that coordinate their red/green cycles by broadcasting
//! state changes to every other signal at the intersection.

pub mod config;
pub mod error;
pub mod global_variables;
pub mod monitoring;
pub mod shared_data;
pub mod signal_system;

pub use error::{ConfigError, ConfigurationError, SignalError};
pub use shared_data::{Notification, Phase, SignalId, SignalKind, SignalSnapshot};
pub use signal_system::intersection_controller::IntersectionController;
pub use signal_system::signal::Signal;
