//! Content loading for documents and schemas
//!
//! The core only ever sees the [`ContentLoader`] trait. The default
//! implementation serves `http`/`https` through [`AsyncHttpClient`] and,
//! when enabled, `file://` URLs from the local filesystem.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use tracing::debug;

use crate::error::{InputError, LoadError, LoadResult};
use crate::http_client::{AsyncHttpClient, HttpClientConfig};

/// Fetches the text behind an absolute URL
#[async_trait]
pub trait ContentLoader: Send + Sync {
    async fn load(&self, location: &Url) -> Result<String, LoadError>;
}

#[async_trait]
impl<T: ContentLoader + ?Sized> ContentLoader for Arc<T> {
    async fn load(&self, location: &Url) -> Result<String, LoadError> {
        (**self).load(location).await
    }
}

/// Loader for `http`, `https` and (optionally) `file` URLs
pub struct DefaultContentLoader {
    http: AsyncHttpClient,
    allow_file_urls: bool,
}

impl DefaultContentLoader {
    pub fn new(config: HttpClientConfig, allow_file_urls: bool) -> LoadResult<Self> {
        Ok(Self {
            http: AsyncHttpClient::new(config)?,
            allow_file_urls,
        })
    }

    async fn load_file(&self, location: &Url) -> LoadResult<String> {
        if !self.allow_file_urls {
            return Err(LoadError::FileAccessDisabled {
                url: location.to_string(),
            });
        }

        let path = location.to_file_path().map_err(|_| LoadError::Io {
            url: location.to_string(),
            details: "URL does not name a local path".to_string(),
        })?;

        let limit = self.http.config().max_response_bytes;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| io_error(location, e))?;
        if metadata.len() > limit {
            return Err(LoadError::TooLarge {
                url: location.to_string(),
                limit_bytes: limit,
            });
        }

        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| io_error(location, e))?;
        String::from_utf8(data).map_err(|_| LoadError::Decode {
            url: location.to_string(),
        })
    }
}

#[async_trait]
impl ContentLoader for DefaultContentLoader {
    async fn load(&self, location: &Url) -> Result<String, LoadError> {
        debug!(url = %location, "Loading content");
        match location.scheme() {
            "http" | "https" => self.http.fetch_text(location).await,
            "file" => self.load_file(location).await,
            scheme => Err(LoadError::UnsupportedScheme {
                url: location.to_string(),
                scheme: scheme.to_string(),
            }),
        }
    }
}

fn io_error(location: &Url, error: std::io::Error) -> LoadError {
    match error.kind() {
        std::io::ErrorKind::NotFound => LoadError::NotFound {
            url: location.to_string(),
        },
        _ => LoadError::Io {
            url: location.to_string(),
            details: error.to_string(),
        },
    }
}

/// Where the candidate document comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    /// The XML text itself
    Inline(String),
    /// A URL to fetch the XML text from
    Remote(Url),
}

impl DocumentSource {
    /// Interpret a request body: text starting with `http` is a URL, anything else is XML
    pub fn from_body(body: &str) -> Result<Self, InputError> {
        let trimmed = body.trim_start();
        if trimmed.is_empty() {
            return Err(InputError::MissingBody);
        }

        let looks_like_url = trimmed
            .get(..4)
            .is_some_and(|head| head.eq_ignore_ascii_case("http"));
        if looks_like_url {
            return parse_reference(trimmed).map(DocumentSource::Remote);
        }

        Ok(DocumentSource::Inline(body.to_string()))
    }

    /// Short label for logs
    pub fn describe(&self) -> String {
        match self {
            DocumentSource::Inline(text) => format!("inline ({} bytes)", text.len()),
            DocumentSource::Remote(url) => url.to_string(),
        }
    }
}

/// Parse an absolute URL reference
pub fn parse_reference(value: &str) -> Result<Url, InputError> {
    Url::parse(value.trim()).map_err(|e| InputError::InvalidReference {
        value: value.trim().to_string(),
        details: e.to_string(),
    })
}

/// Turn a command-line argument into a URL: explicit http/https/file URLs
/// pass through, anything else is taken as a local path
pub fn location_from_argument(argument: &str) -> Result<Url, InputError> {
    if let Ok(url) = Url::parse(argument)
        && matches!(url.scheme(), "http" | "https" | "file")
    {
        return Ok(url);
    }

    let absolute = std::path::absolute(Path::new(argument)).map_err(|e| {
        InputError::InvalidReference {
            value: argument.to_string(),
            details: e.to_string(),
        }
    })?;
    Url::from_file_path(&absolute).map_err(|_| InputError::InvalidReference {
        value: argument.to_string(),
        details: "not an absolute path".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn loader(allow_file_urls: bool) -> DefaultContentLoader {
        DefaultContentLoader::new(HttpClientConfig::default(), allow_file_urls).unwrap()
    }

    #[test]
    fn test_body_with_xml_is_inline() {
        let source = DocumentSource::from_body("  <Invoice id=\"1\"/>").unwrap();
        assert_eq!(
            source,
            DocumentSource::Inline("  <Invoice id=\"1\"/>".to_string())
        );
    }

    #[test]
    fn test_body_with_url_is_remote() {
        let source = DocumentSource::from_body("\n  HTTPS://example.com/doc.xml\n").unwrap();
        match source {
            DocumentSource::Remote(url) => assert_eq!(url.as_str(), "https://example.com/doc.xml"),
            other => panic!("Expected remote source, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_body_is_rejected() {
        assert_eq!(DocumentSource::from_body(""), Err(InputError::MissingBody));
        assert_eq!(DocumentSource::from_body(" \n\t"), Err(InputError::MissingBody));
    }

    #[test]
    fn test_unparsable_url_body() {
        let result = DocumentSource::from_body("http//missing-colon");
        assert!(matches!(result, Err(InputError::InvalidReference { .. })));
    }

    #[test]
    fn test_location_from_argument() {
        let url = location_from_argument("https://example.com/a.xsd").unwrap();
        assert_eq!(url.scheme(), "https");

        let url = location_from_argument("schemas/invoice.xsd").unwrap();
        assert_eq!(url.scheme(), "file");
        assert!(url.path().ends_with("schemas/invoice.xsd"));
    }

    #[tokio::test]
    async fn test_file_urls_disabled_by_default() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "<a/>").unwrap();
        let url = Url::from_file_path(file.path()).unwrap();

        let result = loader(false).load(&url).await;
        assert!(matches!(result, Err(LoadError::FileAccessDisabled { .. })));
    }

    #[tokio::test]
    async fn test_file_url_loading() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "<a/>").unwrap();
        let url = Url::from_file_path(file.path()).unwrap();

        let text = loader(true).load(&url).await.unwrap();
        assert_eq!(text, "<a/>");
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::TempDir::new().unwrap();
        let url = Url::from_file_path(dir.path().join("missing.xsd")).unwrap();

        let result = loader(true).load(&url).await;
        assert!(matches!(result, Err(LoadError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let url = Url::parse("ftp://example.com/schema.xsd").unwrap();
        match loader(true).load(&url).await {
            Err(LoadError::UnsupportedScheme { scheme, .. }) => assert_eq!(scheme, "ftp"),
            other => panic!("Expected unsupported scheme, got {:?}", other),
        }
    }
}
