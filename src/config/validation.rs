//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges
//! - Detect listeners bound to the same address
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RedirectorConfig → Result<(), Vec<ValidationError>>

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::RedirectorConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn check_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) -> Option<SocketAddr> {
    match value.parse::<SocketAddr>() {
        Ok(addr) => Some(addr),
        Err(e) => {
            errors.push(ValidationError::new(field, format!("invalid socket address {:?}: {}", value, e)));
            None
        }
    }
}

/// Check a parsed configuration.
pub fn validate_config(config: &RedirectorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let redirect = check_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);

    let control = if config.control.enabled {
        check_addr(&mut errors, "control.bind_address", &config.control.bind_address)
    } else {
        None
    };
    if let Some(dir) = &config.control.ui_dir {
        if dir.trim().is_empty() {
            errors.push(ValidationError::new("control.ui_dir", "must not be empty when set"));
        }
    }

    if config.storage.path.trim().is_empty() {
        errors.push(ValidationError::new("storage.path", "must not be empty"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level {:?}", config.observability.log_level),
        ));
    }

    let metrics = if config.observability.metrics_enabled {
        check_addr(&mut errors, "observability.metrics_address", &config.observability.metrics_address)
    } else {
        None
    };

    if redirect.is_some() && redirect == control {
        errors.push(ValidationError::new(
            "control.bind_address",
            "must differ from listener.bind_address",
        ));
    }
    if metrics.is_some() && (metrics == redirect || metrics == control) {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must differ from the redirect and control addresses",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&RedirectorConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = RedirectorConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.storage.path = "  ".into();
        config.timeouts.request_secs = 0;
        config.observability.log_level = "loud".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "storage.path",
                "timeouts.request_secs",
                "observability.log_level"
            ]
        );
    }

    #[test]
    fn test_address_clash() {
        let mut config = RedirectorConfig::default();
        config.control.bind_address = "0.0.0.0:10100".into();
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "0.0.0.0:10100".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "control.bind_address");
        assert_eq!(errors[1].field, "observability.metrics_address");
    }

    #[test]
    fn test_disabled_control_is_not_checked() {
        let mut config = RedirectorConfig::default();
        config.control.enabled = false;
        config.control.bind_address = "garbage".into();
        assert!(validate_config(&config).is_ok());
    }
}
