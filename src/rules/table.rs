//! Compiled rule table.
//!
//! # Responsibilities
//! - Compile every rule of a storage snapshot
//! - Resolve a request path to a service and its template
//!
//! # Design Decisions
//! - Immutable after construction; a reload builds a new table
//! - All-or-nothing: the first rule that fails to compile aborts the build
//! - Exact match first, then the longest whole-segment prefix

use std::collections::HashMap;

use super::{normalize_service, Rule, RuleCompilationError};
use crate::template::Template;

/// A compiled, immutable mapping of service name → template.
#[derive(Debug, Default)]
pub struct RuleTable {
    generation: u64,
    templates: HashMap<String, Template>,
}

/// Result of resolving a request path against the table.
#[derive(Debug, Clone, Copy)]
pub struct Resolved<'t, 'p> {
    pub service: &'t str,
    pub template: &'t Template,
    /// Unmatched path tail with its leading `/`; empty on an exact match.
    pub rest: &'p str,
}

impl RuleTable {
    /// Empty table, generation 0.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile `rules` into a table tagged with `generation`.
    pub fn compile(generation: u64, rules: &[Rule]) -> Result<Self, RuleCompilationError> {
        let mut templates = HashMap::with_capacity(rules.len());
        for rule in rules {
            let service = normalize_service(&rule.service);
            if service.is_empty() {
                tracing::warn!(service = %rule.service, "Ignoring rule with empty service name");
                continue;
            }
            let template = Template::compile(service, &rule.location_template).map_err(|source| {
                RuleCompilationError {
                    service: service.to_string(),
                    source,
                }
            })?;
            templates.insert(service.to_string(), template);
        }
        Ok(Self {
            generation,
            templates,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn contains(&self, service: &str) -> bool {
        self.templates.contains_key(service)
    }

    pub fn get(&self, service: &str) -> Option<&Template> {
        self.templates.get(service)
    }

    /// Service names in the table, unordered.
    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Find the rule for a request path.
    pub fn resolve<'p>(&self, path: &'p str) -> Option<Resolved<'_, 'p>> {
        let name = normalize_service(path);
        if name.is_empty() {
            return None;
        }

        let mut candidate = name;
        loop {
            if let Some((service, template)) = self.templates.get_key_value(candidate) {
                return Some(Resolved {
                    service,
                    template,
                    rest: &name[candidate.len()..],
                });
            }
            candidate = &candidate[..candidate.rfind('/')?];
        }
    }
}
