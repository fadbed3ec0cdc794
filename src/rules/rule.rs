//! Rule value type.

use serde::{Deserialize, Serialize};

/// One redirect rule: a service name and the source of its location template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub service: String,
    pub location_template: String,
}

impl Rule {
    pub fn new(service: impl Into<String>, location_template: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            location_template: location_template.into(),
        }
    }
}

/// Strip leading and trailing path separators.
pub fn normalize_service(service: &str) -> &str {
    service.trim_matches('/')
}
