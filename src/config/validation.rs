//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges (timeouts > 0, limits > 0)
//! - Require at least one transport
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::RelayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: must be greater than zero")]
    Zero { field: &'static str },

    #[error("no transport enabled: enable http or tunnel")]
    NoTransport,
}

/// Check `config` and collect every problem found.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !config.http.enabled && !config.tunnel.enabled {
        errors.push(ValidationError::NoTransport);
    }

    if config.http.enabled {
        check_address(&mut errors, "http.bind_address", &config.http.bind_address);
        check_nonzero(&mut errors, "http.max_body_bytes", config.http.max_body_bytes as u64);
    }

    if config.tunnel.enabled {
        check_address(&mut errors, "tunnel.bind_address", &config.tunnel.bind_address);
        check_nonzero(&mut errors, "tunnel.max_connections", config.tunnel.max_connections as u64);
        check_nonzero(&mut errors, "tunnel.max_frame_bytes", config.tunnel.max_frame_bytes as u64);
        check_nonzero(&mut errors, "tunnel.max_in_flight", config.tunnel.max_in_flight as u64);
    }

    check_nonzero(&mut errors, "timeouts.request_secs", config.timeouts.request_secs);

    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_nonzero(errors: &mut Vec<ValidationError>, field: &'static str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::Zero { field });
    }
}
