//! # xml-validator Library
//!
//! Validates XML documents against W3C XML Schema (XSD 1.0) sets. A root
//! schema is resolved to its full transitive closure of imports and includes,
//! compiled once per request, and the document is checked in a single
//! streaming pass that classifies it as MALFORMED, INVALID or VALID with every
//! diagnostic found along the way.

pub mod cache;
pub mod check;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod http_client;
pub mod loader;
pub mod outcome;
pub mod output;
pub mod schema;
pub mod server;
pub mod service;
pub mod validator;
pub mod xml;

pub use cache::{CacheConfig, CachingLoader};
pub use cli::{Cli, VerbosityLevel};
pub use config::{Config, ConfigManager};
pub use diagnostics::{Severity, SourceLocation, ValidationDiagnostic};
pub use error::{Cancelled, InputError, LoadError, ResolutionError, ServiceError};
pub use http_client::{AsyncHttpClient, HttpClientConfig};
pub use loader::{ContentLoader, DefaultContentLoader, DocumentSource};
pub use outcome::{Classification, ValidationOutcome, classify};
pub use output::Output;
pub use schema::{CompiledSchema, ResolverOptions, SchemaReference, SchemaSet, SchemaSetResolver};
pub use service::{ServiceOptions, XmlValidationService};
pub use validator::{EngineReport, ValidationEngine};
