//! Validation service
//!
//! Orchestrates one request: the document and the schema set are loaded
//! concurrently, then compilation and the streaming walk run on the blocking
//! pool under a semaphore and a timeout. Every request owns its state; the
//! service itself only holds loaders and limits.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::{CacheConfig, CachingLoader};
use crate::config::Config;
use crate::error::{LoadResult, ServiceError};
use crate::http_client::HttpClientConfig;
use crate::loader::{ContentLoader, DefaultContentLoader, DocumentSource};
use crate::outcome::ValidationOutcome;
use crate::schema::{CompiledSchema, ResolverOptions, SchemaReference, SchemaSetResolver};
use crate::validator::ValidationEngine;

/// Limits applied to the CPU-bound part of a request
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceOptions {
    /// Upper bound on compilation plus the streaming walk
    pub validation_timeout: Duration,
    /// Blocking validations allowed to run at once
    pub max_concurrent_validations: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            validation_timeout: Duration::from_secs(60),
            max_concurrent_validations: num_cpus::get(),
        }
    }
}

pub struct XmlValidationService {
    documents: Arc<dyn ContentLoader>,
    resolver: SchemaSetResolver<Arc<dyn ContentLoader>>,
    permits: Arc<Semaphore>,
    options: ServiceOptions,
}

impl XmlValidationService {
    pub fn new(
        documents: Arc<dyn ContentLoader>,
        schemas: Arc<dyn ContentLoader>,
        resolver_options: ResolverOptions,
        options: ServiceOptions,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(options.max_concurrent_validations.max(1)));
        Self {
            documents,
            resolver: SchemaSetResolver::new(schemas, resolver_options),
            permits,
            options,
        }
    }

    /// Build the production service: one HTTP/file loader shared by documents
    /// and schemas, with schema text optionally cached
    pub fn from_config(config: &Config) -> LoadResult<Self> {
        let http = HttpClientConfig {
            timeout_seconds: config.network.timeout_seconds,
            retry_attempts: config.network.retry_attempts,
            retry_delay_ms: config.network.retry_delay_ms,
            max_response_bytes: config.network.max_response_bytes,
            ..HttpClientConfig::default()
        };
        let loader: Arc<dyn ContentLoader> = Arc::new(DefaultContentLoader::new(
            http,
            config.network.allow_file_urls,
        )?);

        let schemas: Arc<dyn ContentLoader> = if config.cache.enabled {
            let cache = CacheConfig {
                max_entries: config.cache.max_entries,
                ttl_seconds: config.cache.ttl_seconds,
            };
            Arc::new(CachingLoader::new(loader.clone(), &cache))
        } else {
            loader.clone()
        };

        let resolver_options = ResolverOptions {
            fetch_timeout: Duration::from_secs(config.network.timeout_seconds),
            max_documents: config.validation.max_schema_documents,
        };
        let options = ServiceOptions {
            validation_timeout: Duration::from_secs(config.validation.timeout_seconds),
            max_concurrent_validations: config
                .validation
                .max_concurrent_validations
                .unwrap_or_else(num_cpus::get),
        };

        Ok(Self::new(loader, schemas, resolver_options, options))
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    /// Validate one document against the schema set rooted at `schema`
    pub async fn validate_document(
        &self,
        source: DocumentSource,
        schema: SchemaReference,
    ) -> Result<ValidationOutcome, ServiceError> {
        self.validate_document_cancellable(source, schema, CancellationToken::new())
            .await
    }

    /// As [`validate_document`](Self::validate_document); cancelling `cancel`,
    /// or dropping the returned future, stops the streaming walk
    pub async fn validate_document_cancellable(
        &self,
        source: DocumentSource,
        schema: SchemaReference,
        cancel: CancellationToken,
    ) -> Result<ValidationOutcome, ServiceError> {
        let started = Instant::now();
        let guard = cancel.clone().drop_guard();

        let document = async {
            match source {
                DocumentSource::Inline(text) => Ok(text),
                DocumentSource::Remote(url) => self
                    .documents
                    .load(&url)
                    .await
                    .map_err(ServiceError::from),
            }
        };
        let resolution = async { self.resolver.resolve(&schema).await.map_err(ServiceError::from) };
        let (text, set) = tokio::try_join!(document, resolution)?;
        debug!(
            schema = %schema.location,
            documents = set.len(),
            bytes = text.len(),
            "Loaded document and schema set"
        );

        // Waiting for a permit does not count against the validation timeout
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        let token = cancel.clone();
        let work = async move {
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let compiled = CompiledSchema::compile(&set)?;
                let report = ValidationEngine::new(&compiled).validate(&text, &token)?;
                Ok::<_, ServiceError>(report)
            })
            .await
            .map_err(|e| ServiceError::Internal(format!("Validation task failed: {}", e)))?
        };

        let report = match tokio::time::timeout(self.options.validation_timeout, work).await {
            Ok(result) => result?,
            Err(_) => {
                cancel.cancel();
                return Err(ServiceError::Timeout {
                    seconds: self.options.validation_timeout.as_secs(),
                });
            }
        };
        guard.disarm();

        let outcome = report.into_outcome();
        info!(
            outcome = %outcome.classification(),
            errors = outcome.error_count(),
            warnings = outcome.warning_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Validation finished"
        );
        Ok(outcome)
    }
}
