//! Batch validation behind the `check` command

use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::error::InputError;
use crate::loader::{DocumentSource, location_from_argument};
use crate::output::{CheckReport, DocumentReport, DocumentResult};
use crate::schema::SchemaReference;
use crate::service::XmlValidationService;

/// Validate every document argument against the schema argument
///
/// Arguments are URLs or local paths. Documents run concurrently, bounded by
/// the service's validation limit, and are reported in argument order.
pub async fn check_documents(
    service: &XmlValidationService,
    schema: &str,
    documents: &[String],
) -> Result<CheckReport, InputError> {
    let started = Instant::now();
    let root = SchemaReference::new(location_from_argument(schema)?);
    let sources = documents
        .iter()
        .map(|argument| Ok((argument.clone(), location_from_argument(argument)?)))
        .collect::<Result<Vec<_>, InputError>>()?;

    let concurrency = service.options().max_concurrent_validations.max(1);
    let reports = stream::iter(sources)
        .map(|(argument, url)| {
            let root = root.clone();
            async move {
                let document_started = Instant::now();
                let result = service
                    .validate_document(DocumentSource::Remote(url), root)
                    .await;
                debug!(document = %argument, ok = result.is_ok(), "Document checked");
                DocumentReport::new(
                    argument,
                    document_started.elapsed(),
                    DocumentResult::from_result(result),
                )
            }
        })
        .buffered(concurrency)
        .collect::<Vec<_>>()
        .await;

    Ok(CheckReport {
        schema: root.location.to_string(),
        documents: reports,
        duration_ms: started.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{ContentLoader, DefaultContentLoader};
    use crate::http_client::HttpClientConfig;
    use crate::schema::ResolverOptions;
    use crate::service::ServiceOptions;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn service() -> XmlValidationService {
        let loader: Arc<dyn ContentLoader> =
            Arc::new(DefaultContentLoader::new(HttpClientConfig::default(), true).unwrap());
        XmlValidationService::new(
            loader.clone(),
            loader,
            ResolverOptions::default(),
            ServiceOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_check_local_files() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("note.xsd"),
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="note" type="xs:string"/>
</xs:schema>"#,
        )
        .unwrap();
        fs::write(dir.path().join("good.xml"), "<note>hello</note>").unwrap();
        fs::write(dir.path().join("broken.xml"), "<note>hello").unwrap();

        let path = |name: &str| dir.path().join(name).to_string_lossy().into_owned();
        let documents = vec![path("good.xml"), path("broken.xml"), path("absent.xml")];

        let report = check_documents(&service(), &path("note.xsd"), &documents)
            .await
            .unwrap();

        assert_eq!(report.documents.len(), 3);
        assert_eq!(report.documents[0].document, documents[0]);
        assert!(report.documents[0].result.is_valid());
        assert_eq!(report.malformed_count(), 1);
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.exit_code(), 2);
    }
}
