// Probewatch Core - Orchestration Logic & Ports
// NO infrastructure dependencies: samplers and transports are injected through ports

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
