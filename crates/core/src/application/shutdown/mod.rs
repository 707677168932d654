// Shutdown Coordinator - one-shot signals, service handles and the registry

mod graceful;
mod manager;
mod service;

pub use graceful::GracefulShutdown;
pub use manager::{ShutdownManager, WaitReport};
pub use service::ServiceHandle;
