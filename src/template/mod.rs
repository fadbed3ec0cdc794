//! Location templates.
//!
//! # Data Flow
//! ```text
//! template source (rule text)
//!     → lexer.rs (text runs + action tokens, trim markers, comments)
//!     → parse.rs (node tree: text, actions, if/with blocks)
//!     → Template (immutable, shared via the rule table)
//!
//! Per request:
//!     Binding { request, service, path }
//!     → exec.rs (walk tree, resolve fields, call builtins)
//!     → rendered target URL
//! ```
//!
//! # Design Decisions
//! - Syntax follows Go's `text/template` so existing rules keep working
//! - Templates see a fixed set of request fields (see `value.rs`), never the raw request
//! - Unknown fields are a render error, not a compile error
//! - Compilation is pure: no I/O, same source always renders the same way
//! - Builtin function set is closed (see `funcs.rs`)

mod context;
mod exec;
mod funcs;
mod lexer;
mod parse;
mod value;

use std::fmt;

use thiserror::Error;

pub use context::{decode_path, Binding, FormValues, RequestContext};

/// Malformed template source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("template: {name}:{line}: {message}")]
pub struct TemplateSyntaxError {
    pub name: String,
    pub line: usize,
    pub message: String,
}

impl TemplateSyntaxError {
    pub(crate) fn new(name: &str, line: usize, message: &str) -> Self {
        Self {
            name: name.to_string(),
            line,
            message: message.to_string(),
        }
    }
}

/// Template execution failed for one request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("template: {name}:{line}: executing {name:?} at <{action}>: {message}")]
pub struct RenderError {
    pub name: String,
    pub line: usize,
    pub action: String,
    pub message: String,
}

/// A compiled location template.
#[derive(Clone)]
pub struct Template {
    name: String,
    source: String,
    tree: Vec<parse::Node>,
}

impl Template {
    /// Compile `source`. `name` identifies the template in error messages.
    pub fn compile(name: &str, source: &str) -> Result<Self, TemplateSyntaxError> {
        let items = lexer::lex(name, source)?;
        let tree = parse::parse(name, items)?;
        Ok(Self {
            name: name.to_string(),
            source: source.to_string(),
            tree,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render against a bound request. Output is returned as produced; callers trim.
    pub fn render(&self, binding: Binding<'_>) -> Result<String, RenderError> {
        let mut state = exec::State::new(&self.name, binding);
        let root = value::Value::Request(binding);
        state.walk(&root, &self.tree)?;
        Ok(state.finish())
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("source", &self.source)
            .finish()
    }
}
