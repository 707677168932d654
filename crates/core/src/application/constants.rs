// Orchestration constants (no magic values)
use std::time::Duration;

/// Jitter is a uniform component up to this fraction of the capped delay (10%)
pub const JITTER_FRACTION_DIVISOR: u32 = 10;

/// Default concurrency ceiling for fan-out work
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

/// Default grace period for services to acknowledge shutdown (10s)
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Default per-step timeout applied by the scan runner (10 minutes)
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(600);
