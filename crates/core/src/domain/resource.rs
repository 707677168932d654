// Resource Domain Model

use super::error::{DomainError, Result};
use std::time::Duration;

/// Bytes per mebibyte, used for log fields
pub const MIB: u64 = 1024 * 1024;

/// Immutable snapshot produced by each monitor tick
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSample {
    /// Milliseconds since epoch
    pub timestamp: i64,
    /// Resident set size of this process
    pub app_memory_bytes: u64,
    pub system_memory_used_bytes: u64,
    pub system_memory_total_bytes: u64,
    /// 0.0 - 100.0
    pub system_memory_percent: f64,
    pub worker_count: usize,
    /// 0.0 - 100.0, averaged over the configured CPU window
    pub cpu_percent: f64,
    /// Number of reclaim passes run by the monitor so far
    pub reclaim_cycles: u64,
}

impl ResourceSample {
    /// Used fraction of system memory (0.0 - 1.0)
    pub fn system_memory_fraction(&self) -> f64 {
        self.system_memory_percent / 100.0
    }

    /// CPU usage as a fraction of total capacity (0.0 - 1.0)
    pub fn cpu_fraction(&self) -> f64 {
        self.cpu_percent / 100.0
    }
}

/// Resource thresholds
///
/// Warning bands are fractions of the configured maxima. The shutdown
/// triggers are fractions of total system capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceThresholds {
    pub max_app_memory_bytes: u64,
    /// Fraction of `max_app_memory_bytes` that triggers a reclaim pass
    pub app_memory_warning_fraction: f64,
    pub max_workers: usize,
    /// Fraction of `max_workers` that triggers a warning
    pub worker_warning_fraction: f64,
    /// Used system memory fraction that triggers auto-shutdown
    pub system_memory_shutdown_fraction: f64,
    /// CPU fraction that triggers auto-shutdown
    pub cpu_shutdown_fraction: f64,
    pub sample_interval: Duration,
    /// Window CPU usage is averaged over
    pub cpu_sample_window: Duration,
    pub auto_shutdown: bool,
}

impl Default for ResourceThresholds {
    fn default() -> Self {
        Self {
            max_app_memory_bytes: 2048 * MIB,
            app_memory_warning_fraction: 0.8,
            max_workers: 10_000,
            worker_warning_fraction: 0.8,
            system_memory_shutdown_fraction: 0.9,
            cpu_shutdown_fraction: 0.95,
            sample_interval: Duration::from_secs(5),
            cpu_sample_window: Duration::from_millis(200),
            auto_shutdown: true,
        }
    }
}

impl ResourceThresholds {
    /// App memory level at which a reclaim pass is requested
    pub fn app_memory_warning_bytes(&self) -> u64 {
        (self.max_app_memory_bytes as f64 * self.app_memory_warning_fraction) as u64
    }

    /// Worker count at which a warning is logged
    pub fn worker_warning_count(&self) -> usize {
        (self.max_workers as f64 * self.worker_warning_fraction) as usize
    }

    /// Reject configurations the monitor cannot act on
    pub fn validate(&self) -> Result<()> {
        check_fraction("app_memory_warning_fraction", self.app_memory_warning_fraction)?;
        check_fraction("worker_warning_fraction", self.worker_warning_fraction)?;
        check_fraction(
            "system_memory_shutdown_fraction",
            self.system_memory_shutdown_fraction,
        )?;
        check_fraction("cpu_shutdown_fraction", self.cpu_shutdown_fraction)?;

        if self.max_app_memory_bytes == 0 {
            return Err(DomainError::InvalidThreshold {
                name: "max_app_memory_bytes",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_workers == 0 {
            return Err(DomainError::InvalidThreshold {
                name: "max_workers",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.sample_interval.is_zero() {
            return Err(DomainError::InvalidThreshold {
                name: "sample_interval",
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

fn check_fraction(name: &'static str, value: f64) -> Result<()> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(DomainError::InvalidThreshold {
            name,
            reason: format!("{} is outside (0, 1]", value),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds_are_valid() {
        assert!(ResourceThresholds::default().validate().is_ok());
    }

    #[test]
    fn test_warning_levels_are_fractions_of_maxima() {
        let thresholds = ResourceThresholds {
            max_app_memory_bytes: 1000,
            app_memory_warning_fraction: 0.75,
            max_workers: 200,
            worker_warning_fraction: 0.5,
            ..Default::default()
        };

        assert_eq!(thresholds.app_memory_warning_bytes(), 750);
        assert_eq!(thresholds.worker_warning_count(), 100);
    }

    #[test]
    fn test_fraction_out_of_range_rejected() {
        let thresholds = ResourceThresholds {
            cpu_shutdown_fraction: 1.5,
            ..Default::default()
        };

        let err = thresholds.validate().unwrap_err();
        assert!(err.to_string().contains("cpu_shutdown_fraction"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let thresholds = ResourceThresholds {
            sample_interval: Duration::ZERO,
            ..Default::default()
        };

        assert!(thresholds.validate().is_err());
    }
}
