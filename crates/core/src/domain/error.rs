// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid threshold {name}: {reason}")]
    InvalidThreshold { name: &'static str, reason: String },

    #[error("Invalid retry policy: {0}")]
    InvalidRetryPolicy(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
