// Probewatch Infrastructure - System Adapters
// Implements: ResourceSampler

pub mod system_sampler;

pub use system_sampler::SystemResourceSampler;
