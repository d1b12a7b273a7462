use std::collections::{HashMap, HashSet};
use std::time::Duration;

use futures::future::try_join_all;
use reqwest::Url;
use tokio::time::timeout;
use tracing::debug;

use super::document::{ReferenceKind, SchemaDocument};
use super::{SchemaReference, SchemaSet};
use crate::error::{LoadError, ResolutionError, ResolutionResult};
use crate::loader::ContentLoader;
use crate::xml::{XML_NAMESPACE, XSD_NAMESPACE};

/// Limits applied while following a schema graph
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Timeout for each schema fetch
    pub fetch_timeout: Duration,
    /// Largest number of documents a set may contain
    pub max_documents: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            max_documents: 256,
        }
    }
}

/// How a document was reached, which decides the namespace it must declare
#[derive(Debug, Clone)]
enum Origin {
    Root { expected: Option<String> },
    Import { namespace: Option<String> },
    Include { namespace: Option<String> },
}

#[derive(Debug, Clone)]
struct Pending {
    location: Url,
    origin: Origin,
}

/// Follows `xs:import` and `xs:include` from a root schema to closure
pub struct SchemaSetResolver<L> {
    loader: L,
    options: ResolverOptions,
}

impl<L: ContentLoader> SchemaSetResolver<L> {
    pub fn new(loader: L, options: ResolverOptions) -> Self {
        Self { loader, options }
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Resolve `root` and every document reachable from it
    ///
    /// Documents are visited breadth-first. All fetches of one level run
    /// concurrently and each URL is fetched at most once. The first failure
    /// aborts the whole resolution; a partial set is never returned.
    pub async fn resolve(&self, root: &SchemaReference) -> ResolutionResult<SchemaSet> {
        let mut set = SchemaSet::new();
        let mut fetched: HashMap<Url, String> = HashMap::new();
        let mut visited: HashSet<(Option<String>, Url)> = HashSet::new();
        let mut hints: Vec<(Option<String>, Url)> = Vec::new();

        let mut level = vec![Pending {
            location: root.location.clone(),
            origin: Origin::Root {
                expected: root.namespace.clone(),
            },
        }];

        while !level.is_empty() {
            self.fetch_level(&level, &mut fetched).await?;

            let mut next = Vec::new();
            for pending in level {
                let text = fetched.get(&pending.location).ok_or_else(|| {
                    ResolutionError::Load {
                        url: pending.location.to_string(),
                        source: LoadError::NotFound {
                            url: pending.location.to_string(),
                        },
                    }
                })?;
                let mut document = SchemaDocument::parse(&pending.location, text)?;
                let effective = effective_namespace(&document, &pending.origin)?;

                if !visited.insert((effective.clone(), pending.location.clone())) {
                    continue;
                }

                if !matches!(pending.origin, Origin::Include { .. })
                    && set.contains_namespace(effective.as_deref())
                    && !set.contains_location(effective.as_deref(), &pending.location)
                {
                    let existing = set
                        .origin(effective.as_deref())
                        .map(Url::to_string)
                        .unwrap_or_default();
                    return Err(ResolutionError::NamespaceConflict {
                        namespace: display_namespace(effective.as_deref()),
                        existing,
                        conflicting: pending.location.to_string(),
                    });
                }

                document.effective_namespace = effective.clone();
                for reference in &document.references {
                    let origin = match reference.kind {
                        ReferenceKind::Import => Origin::Import {
                            namespace: reference.namespace.clone(),
                        },
                        ReferenceKind::Include => Origin::Include {
                            namespace: effective.clone(),
                        },
                    };
                    match &reference.location {
                        Some(location) => next.push(Pending {
                            location: location.clone(),
                            origin,
                        }),
                        None => hints.push((reference.namespace.clone(), document.location.clone())),
                    }
                }

                debug!(
                    url = %document.location,
                    namespace = %display_namespace(effective.as_deref()),
                    references = document.references.len(),
                    "Resolved schema document"
                );
                set.push(document);

                if set.len() > self.options.max_documents {
                    return Err(ResolutionError::TooManyDocuments {
                        limit: self.options.max_documents,
                    });
                }
            }
            level = next;
        }

        for (namespace, referrer) in hints {
            let built_in = matches!(namespace.as_deref(), Some(XML_NAMESPACE | XSD_NAMESPACE));
            if !built_in && !set.contains_namespace(namespace.as_deref()) {
                return Err(ResolutionError::UnresolvedImport {
                    namespace: display_namespace(namespace.as_deref()),
                    url: referrer.to_string(),
                });
            }
        }

        Ok(set)
    }

    async fn fetch_level(
        &self,
        level: &[Pending],
        fetched: &mut HashMap<Url, String>,
    ) -> ResolutionResult<()> {
        let mut seen = HashSet::new();
        let missing: Vec<&Url> = level
            .iter()
            .map(|pending| &pending.location)
            .filter(|url| !fetched.contains_key(*url) && seen.insert(*url))
            .collect();

        let texts = try_join_all(missing.iter().map(|url| self.fetch(url))).await?;
        for (url, text) in missing.into_iter().zip(texts) {
            fetched.insert(url.clone(), text);
        }
        Ok(())
    }

    async fn fetch(&self, url: &Url) -> ResolutionResult<String> {
        match timeout(self.options.fetch_timeout, self.loader.load(url)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(source)) => Err(ResolutionError::Load {
                url: url.to_string(),
                source,
            }),
            Err(_) => Err(ResolutionError::Load {
                url: url.to_string(),
                source: LoadError::Timeout {
                    url: url.to_string(),
                    timeout_seconds: self.options.fetch_timeout.as_secs(),
                },
            }),
        }
    }
}

fn effective_namespace(
    document: &SchemaDocument,
    origin: &Origin,
) -> ResolutionResult<Option<String>> {
    let declared = document.target_namespace.clone();
    let mismatch = |expected: &Option<String>| ResolutionError::NamespaceMismatch {
        url: document.location.to_string(),
        expected: display_namespace(expected.as_deref()),
        found: display_namespace(declared.as_deref()),
    };

    match origin {
        Origin::Root { expected: Some(expected) } if declared.as_ref() != Some(expected) => {
            Err(mismatch(&Some(expected.clone())))
        }
        Origin::Root { .. } => Ok(declared.clone()),
        Origin::Import { namespace } if *namespace != declared => Err(mismatch(namespace)),
        Origin::Import { .. } => Ok(declared.clone()),
        Origin::Include { namespace } => match &declared {
            None => Ok(namespace.clone()),
            Some(_) if declared == *namespace => Ok(declared.clone()),
            Some(_) => Err(mismatch(namespace)),
        },
    }
}

fn display_namespace(namespace: Option<&str>) -> String {
    namespace.unwrap_or("(no namespace)").to_string()
}
