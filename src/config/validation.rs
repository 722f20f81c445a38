//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (port non-zero, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServerConfig;

/// A single semantic problem in a config.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("routes.root must not be empty")]
    EmptyRoot,

    #[error("routes.extension must be non-empty and contain no dot (got {0:?})")]
    BadExtension(String),

    #[error("listener.port must be non-zero")]
    ZeroPort,

    #[error("observability.metrics_address is not a socket address: {0}")]
    BadMetricsAddress(String),
}

/// Check a parsed config for semantic problems.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.routes.root.as_os_str().is_empty() {
        errors.push(ValidationError::EmptyRoot);
    }

    let ext = &config.routes.extension;
    if ext.is_empty() || ext.contains('.') {
        errors.push(ValidationError::BadExtension(ext.clone()));
    }

    if config.listener.port == 0 {
        errors.push(ValidationError::ZeroPort);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::BadMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
