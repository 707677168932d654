// Port Layer - Interfaces for external collaborators

pub mod id_provider; // For deterministic testing
pub mod progress;
pub mod resource_sampler;
pub mod service;
pub mod time_provider;

// Re-exports
pub use id_provider::IdProvider;
pub use progress::{NoopProgressReporter, ProgressEvent, ProgressReporter};
pub use resource_sampler::{ResourceSampler, SystemMemory};
pub use service::ServiceLifecycle;
pub use time_provider::TimeProvider;
