use thiserror::Error;

/// Failure to fetch or read a document or schema
///
/// Stored as plain data so the error can be cloned out of shared caches.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("HTTP error: {url} - {details}")]
    Http { url: String, details: String },

    #[error("HTTP status error: {status} for {url} - {message}")]
    HttpStatus {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Request timeout: {url} after {timeout_seconds} seconds")]
    Timeout { url: String, timeout_seconds: u64 },

    #[error("IO error: {url} - {details}")]
    Io { url: String, details: String },

    #[error("Not found: {url}")]
    NotFound { url: String },

    #[error("Unsupported URL scheme '{scheme}': {url}")]
    UnsupportedScheme { url: String, scheme: String },

    #[error("Access to file URLs is disabled: {url}")]
    FileAccessDisabled { url: String },

    #[error("Content too large: {url} exceeds {limit_bytes} bytes")]
    TooLarge { url: String, limit_bytes: u64 },

    #[error("Content is not valid UTF-8 text: {url}")]
    Decode { url: String },
}

impl LoadError {
    /// The location that failed to load
    pub fn url(&self) -> &str {
        match self {
            LoadError::Http { url, .. }
            | LoadError::HttpStatus { url, .. }
            | LoadError::Timeout { url, .. }
            | LoadError::Io { url, .. }
            | LoadError::NotFound { url }
            | LoadError::UnsupportedScheme { url, .. }
            | LoadError::FileAccessDisabled { url }
            | LoadError::TooLarge { url, .. }
            | LoadError::Decode { url } => url,
        }
    }

    /// Transient failures worth another attempt under a retry policy
    pub fn is_transient(&self) -> bool {
        match self {
            LoadError::Http { .. } | LoadError::Timeout { .. } => true,
            LoadError::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Failure to build a complete schema set from a root reference
///
/// Always a service/configuration problem, never a statement about the
/// candidate document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Failed to load schema {url}: {source}")]
    Load {
        url: String,
        #[source]
        source: LoadError,
    },

    #[error("Schema parsing error: {url} - {details}")]
    SchemaParsing { url: String, details: String },

    #[error("Schema namespace mismatch: {url} declares '{found}' but '{expected}' was expected")]
    NamespaceMismatch {
        url: String,
        expected: String,
        found: String,
    },

    #[error(
        "Conflicting schema documents for namespace '{namespace}': {existing} and {conflicting}"
    )]
    NamespaceConflict {
        namespace: String,
        existing: String,
        conflicting: String,
    },

    #[error("Duplicate definition of {kind} '{name}' in {url}")]
    DuplicateDefinition {
        kind: &'static str,
        name: String,
        url: String,
    },

    #[error("Unresolved {kind} reference '{name}' in {url}")]
    UnresolvedReference {
        kind: &'static str,
        name: String,
        url: String,
    },

    #[error("Unresolved import of namespace '{namespace}' from {url}: no schema document provides it")]
    UnresolvedImport { namespace: String, url: String },

    #[error("Circular {kind} definition involving '{name}'")]
    CircularDefinition { kind: &'static str, name: String },

    #[error("Unsupported schema construct in {url}: {details}")]
    Unsupported { url: String, details: String },

    #[error("Invalid schema component in {url}: {details}")]
    InvalidComponent { url: String, details: String },

    #[error("Schema set exceeds the limit of {limit} documents")]
    TooManyDocuments { limit: usize },
}

/// Problems with the request itself, reported before any work is done
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("XML body is empty")]
    MissingBody,

    #[error("Header [{header}] for XSD Schema URL is empty")]
    MissingSchemaHeader { header: String },

    #[error("Invalid reference '{value}': {details}")]
    InvalidReference { value: String, details: String },
}

/// The streaming walk was abandoned before it finished
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Validation was cancelled")]
pub struct Cancelled;

/// Everything that can stop a request from producing a verdict
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("Validation timeout after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Short machine-readable category used in responses and logs
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Load(_) => "load",
            ServiceError::Resolution(_) => "resolution",
            ServiceError::Timeout { .. } => "timeout",
            ServiceError::Cancelled(_) => "cancelled",
            ServiceError::Internal(_) => "internal",
        }
    }
}

/// Loader result type alias
pub type LoadResult<T> = std::result::Result<T, LoadError>;

/// Resolution result type alias
pub type ResolutionResult<T> = std::result::Result<T, ResolutionError>;
