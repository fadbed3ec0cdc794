//! Templated HTTP redirect dispatcher.
//!
//! Maps a request path to a service name, renders that service's location
//! template against the request and answers with a redirect.

pub mod config;
pub mod control;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod rules;
pub mod stats;
pub mod storage;
pub mod template;

pub use config::schema::RedirectorConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use rules::{Engine, RedirectOutcome, Rule};
pub use template::{RequestContext, Template};
