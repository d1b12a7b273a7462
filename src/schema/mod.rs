//! Schema resolution and compilation
//!
//! A [`SchemaReference`] is resolved by [`SchemaSetResolver`] into a
//! transitively closed [`SchemaSet`], which [`CompiledSchema::compile`]
//! turns into the immutable state the streaming validator runs against.

pub mod automaton;
pub mod compiler;
pub mod datatypes;
pub mod document;
pub mod model;
pub mod resolver;

use std::collections::BTreeMap;

use reqwest::Url;

pub use document::{ImportReference, ReferenceKind, SchemaDocument, SchemaNode};
pub use model::CompiledSchema;
pub use resolver::{ResolverOptions, SchemaSetResolver};

/// Absolute URL of a schema document, optionally with the namespace the
/// referrer expects it to declare
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaReference {
    pub location: Url,
    pub namespace: Option<String>,
}

impl SchemaReference {
    pub fn new(location: Url) -> Self {
        Self {
            location,
            namespace: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// Every schema document reachable from one root, keyed by namespace
#[derive(Debug, Clone)]
pub struct SchemaSet {
    documents: Vec<SchemaDocument>,
    /// Namespace (empty string for none) to the indices of its documents;
    /// the first index is the document that introduced the namespace
    namespaces: BTreeMap<String, Vec<usize>>,
}

impl SchemaSet {
    pub(crate) fn new() -> Self {
        Self {
            documents: Vec::new(),
            namespaces: BTreeMap::new(),
        }
    }

    pub(crate) fn push(&mut self, document: SchemaDocument) {
        let key = namespace_key(document.effective_namespace.as_deref());
        self.namespaces
            .entry(key)
            .or_default()
            .push(self.documents.len());
        self.documents.push(document);
    }

    /// The root document, first in discovery order
    pub fn root(&self) -> Option<&SchemaDocument> {
        self.documents.first()
    }

    /// Documents in breadth-first discovery order
    pub fn documents(&self) -> &[SchemaDocument] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn contains_namespace(&self, namespace: Option<&str>) -> bool {
        self.namespaces.contains_key(&namespace_key(namespace))
    }

    /// Location of the document that introduced `namespace`
    pub fn origin(&self, namespace: Option<&str>) -> Option<&Url> {
        self.namespaces
            .get(&namespace_key(namespace))
            .and_then(|indices| indices.first())
            .map(|index| &self.documents[*index].location)
    }

    pub fn contains_location(&self, namespace: Option<&str>, location: &Url) -> bool {
        self.namespaces
            .get(&namespace_key(namespace))
            .is_some_and(|indices| {
                indices
                    .iter()
                    .any(|index| &self.documents[*index].location == location)
            })
    }

    /// Namespaces described by the set (`None` for the absent namespace)
    pub fn namespaces(&self) -> impl Iterator<Item = Option<&str>> {
        self.namespaces
            .keys()
            .map(|key| Some(key.as_str()).filter(|ns| !ns.is_empty()))
    }
}

fn namespace_key(namespace: Option<&str>) -> String {
    namespace.unwrap_or_default().to_string()
}
