//! Parsing of a single XSD document
//!
//! Schema text is read once with quick-xml into a small tree of XSD
//! elements. Annotations and foreign-namespace content are checked for
//! well-formedness and otherwise dropped. Each node keeps the namespace
//! bindings in scope so QName-valued attributes can be resolved later.

use std::sync::Arc;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use reqwest::Url;

use crate::error::{ResolutionError, ResolutionResult};
use crate::xml::{LineTracker, NamespaceStack, QualifiedName, UndeclaredPrefix};

/// One element of a schema document in the XSD namespace
#[derive(Debug, Clone)]
pub struct SchemaNode {
    /// Local name within the XSD namespace (`element`, `complexType`, ...)
    pub kind: String,
    attributes: Vec<(String, String)>,
    pub children: Vec<SchemaNode>,
    namespaces: Arc<NamespaceStack>,
    pub line: u32,
}

impl SchemaNode {
    /// Value of an unqualified attribute
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Children other than `annotation`
    pub fn content(&self) -> impl Iterator<Item = &SchemaNode> {
        self.children.iter().filter(|child| !child.is("annotation"))
    }

    pub fn child(&self, kind: &str) -> Option<&SchemaNode> {
        self.children.iter().find(|child| child.is(kind))
    }

    /// Resolve a QName-valued attribute value against this node's bindings
    pub fn resolve_qname(&self, value: &str) -> Result<QualifiedName, UndeclaredPrefix> {
        self.namespaces.resolve_value(value)
    }
}

/// Whether a reference pulls in another namespace or more of the same one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Import,
    Include,
}

/// An `xs:import` or `xs:include` found in a schema document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReference {
    pub kind: ReferenceKind,
    /// Namespace named by an import (`None` imports the absent namespace)
    pub namespace: Option<String>,
    /// `schemaLocation` resolved against the referring document
    pub location: Option<Url>,
}

/// A parsed schema document
#[derive(Debug, Clone)]
pub struct SchemaDocument {
    pub location: Url,
    /// `targetNamespace` as declared in the document
    pub target_namespace: Option<String>,
    /// Namespace the document's components land in; differs from the
    /// declared one only for chameleon includes
    pub effective_namespace: Option<String>,
    pub element_form_qualified: bool,
    pub attribute_form_qualified: bool,
    pub references: Vec<ImportReference>,
    pub root: SchemaNode,
}

impl SchemaDocument {
    /// Parse schema text fetched from `location`
    pub fn parse(location: &Url, text: &str) -> ResolutionResult<Self> {
        let root = parse_tree(location, text)?;
        if root.kind != "schema" {
            return Err(parsing(
                location,
                format!("root element is '{}', expected xs:schema", root.kind),
            ));
        }

        let target_namespace = root
            .attr("targetNamespace")
            .filter(|ns| !ns.is_empty())
            .map(str::to_string);
        let element_form_qualified = root.attr("elementFormDefault") == Some("qualified");
        let attribute_form_qualified = root.attr("attributeFormDefault") == Some("qualified");

        let mut references = Vec::new();
        for child in &root.children {
            match child.kind.as_str() {
                "import" => references.push(ImportReference {
                    kind: ReferenceKind::Import,
                    namespace: child
                        .attr("namespace")
                        .filter(|ns| !ns.is_empty())
                        .map(str::to_string),
                    location: resolve_location(location, child.attr("schemaLocation"))?,
                }),
                "include" => {
                    let resolved = resolve_location(location, child.attr("schemaLocation"))?
                        .ok_or_else(|| {
                            parsing(location, "xs:include without schemaLocation".to_string())
                        })?;
                    references.push(ImportReference {
                        kind: ReferenceKind::Include,
                        namespace: None,
                        location: Some(resolved),
                    });
                }
                kind @ ("redefine" | "override") => {
                    return Err(ResolutionError::Unsupported {
                        url: location.to_string(),
                        details: format!("xs:{} is not supported", kind),
                    });
                }
                _ => {}
            }
        }

        Ok(Self {
            location: location.clone(),
            effective_namespace: target_namespace.clone(),
            target_namespace,
            element_form_qualified,
            attribute_form_qualified,
            references,
            root,
        })
    }

    /// Included without a target namespace, adopting the includer's
    pub fn is_chameleon(&self) -> bool {
        self.target_namespace.is_none() && self.effective_namespace.is_some()
    }
}

fn resolve_location(base: &Url, location: Option<&str>) -> ResolutionResult<Option<Url>> {
    match location.map(str::trim).filter(|l| !l.is_empty()) {
        Some(location) => base
            .join(location)
            .map(Some)
            .map_err(|e| parsing(base, format!("bad schemaLocation '{}': {}", location, e))),
        None => Ok(None),
    }
}

fn parsing(location: &Url, details: String) -> ResolutionError {
    ResolutionError::SchemaParsing {
        url: location.to_string(),
        details,
    }
}

struct Builder {
    node: SchemaNode,
    /// Inside annotation or foreign content, children are not kept
    discard: bool,
}

fn parse_tree(location: &Url, text: &str) -> ResolutionResult<SchemaNode> {
    let mut reader = Reader::from_str(text);
    let mut lines = LineTracker::new(text);
    let mut namespaces = NamespaceStack::new();
    let mut current_scope = Arc::new(namespaces.clone());
    let mut scopes: Vec<Arc<NamespaceStack>> = Vec::new();
    let mut stack: Vec<Builder> = Vec::new();
    let mut root: Option<SchemaNode> = None;

    loop {
        let position = reader.buffer_position() as usize;
        let event = reader.read_event().map_err(|e| {
            let at = lines.locate(reader.error_position() as usize);
            parsing(location, format!("{} at {}", e, at))
        })?;

        match event {
            Event::Start(_) | Event::Empty(_) if root.is_some() && stack.is_empty() => {
                return Err(parsing(location, "content after the root element".to_string()));
            }
            Event::Start(start) => {
                let builder = open(
                    location,
                    &start,
                    &mut namespaces,
                    &mut current_scope,
                    &mut scopes,
                    &stack,
                    lines.locate(position).line,
                )?;
                stack.push(builder);
            }
            Event::Empty(start) => {
                let builder = open(
                    location,
                    &start,
                    &mut namespaces,
                    &mut current_scope,
                    &mut scopes,
                    &stack,
                    lines.locate(position).line,
                )?;
                close(builder, &mut stack, &mut root);
                namespaces.pop_scope();
                current_scope = scopes.pop().unwrap_or_else(|| Arc::new(NamespaceStack::new()));
            }
            Event::End(_) => {
                if let Some(builder) = stack.pop() {
                    close(builder, &mut stack, &mut root);
                }
                namespaces.pop_scope();
                current_scope = scopes.pop().unwrap_or_else(|| Arc::new(NamespaceStack::new()));
            }
            Event::Text(text) => {
                text.unescape().map_err(|e| parsing(location, e.to_string()))?;
            }
            Event::DocType(_) => {
                return Err(parsing(location, "DOCTYPE is not allowed".to_string()));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(parsing(
            location,
            format!("unexpected end of document inside xs:{}", open.node.kind),
        ));
    }
    root.ok_or_else(|| parsing(location, "document has no root element".to_string()))
}

fn open(
    location: &Url,
    start: &BytesStart<'_>,
    namespaces: &mut NamespaceStack,
    current_scope: &mut Arc<NamespaceStack>,
    scopes: &mut Vec<Arc<NamespaceStack>>,
    stack: &[Builder],
    line: u32,
) -> ResolutionResult<Builder> {
    namespaces.push_scope();
    scopes.push(current_scope.clone());

    let mut attributes = Vec::new();
    let mut declared = false;
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| parsing(location, e.to_string()))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|e| parsing(location, e.to_string()))?
            .into_owned();
        if namespaces.declare(&key, &value) {
            declared = true;
        } else {
            attributes.push((key, value));
        }
    }
    if declared {
        *current_scope = Arc::new(namespaces.clone());
    }

    let raw_name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let name = namespaces
        .resolve_element(&raw_name)
        .map_err(|e| parsing(location, e.to_string()))?;

    let parent_discards = stack.last().is_some_and(|b| b.discard);
    let discard = parent_discards || !name.is_xsd() || name.local == "annotation";

    Ok(Builder {
        node: SchemaNode {
            kind: if name.is_xsd() {
                name.local
            } else {
                name.to_string()
            },
            attributes,
            children: Vec::new(),
            namespaces: current_scope.clone(),
            line,
        },
        discard,
    })
}

fn close(builder: Builder, stack: &mut [Builder], root: &mut Option<SchemaNode>) {
    match stack.last_mut() {
        Some(parent) if !parent.discard => parent.node.children.push(builder.node),
        Some(_) => {}
        None => *root = Some(builder.node),
    }
}
