//! Shared XML plumbing for schema parsing and document validation.
//!
//! Both the schema parser and the streaming validator walk quick-xml events and
//! need the same three things: qualified names, an in-scope namespace stack,
//! and a way to turn byte offsets into line/column positions.

use std::fmt;

use crate::diagnostics::SourceLocation;

/// Namespace of XML Schema definitions
pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// Namespace of the schema-instance attributes (`xsi:type`, `xsi:nil`, ...)
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Namespace bound to the reserved `xml` prefix
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// An expanded XML name: optional namespace URI plus local part
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    pub namespace: Option<String>,
    pub local: String,
}

impl QualifiedName {
    pub fn new(namespace: Option<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.filter(|ns| !ns.is_empty()),
            local: local.into(),
        }
    }

    pub fn local(local: impl Into<String>) -> Self {
        Self::new(None, local)
    }

    pub fn xsd(local: impl Into<String>) -> Self {
        Self::new(Some(XSD_NAMESPACE.to_string()), local)
    }

    pub fn is_xsd(&self) -> bool {
        self.namespace.as_deref() == Some(XSD_NAMESPACE)
    }

    pub fn in_namespace(&self, namespace: Option<&str>) -> bool {
        self.namespace.as_deref() == namespace
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// Split a raw `prefix:local` name into its parts
pub fn split_prefixed(raw: &str) -> (Option<&str>, &str) {
    match raw.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, raw),
    }
}

/// Error raised when a prefix has no in-scope binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndeclaredPrefix(pub String);

impl fmt::Display for UndeclaredPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is an undeclared prefix", self.0)
    }
}

/// Stack of in-scope namespace bindings, one scope per open element
#[derive(Debug, Default, Clone)]
pub struct NamespaceStack {
    bindings: Vec<(String, String)>,
    marks: Vec<usize>,
}

impl NamespaceStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_scope(&mut self) {
        self.marks.push(self.bindings.len());
    }

    pub fn pop_scope(&mut self) {
        if let Some(mark) = self.marks.pop() {
            self.bindings.truncate(mark);
        }
    }

    /// Bind `prefix` (empty string for the default namespace) in the current scope
    pub fn bind(&mut self, prefix: &str, uri: &str) {
        self.bindings.push((prefix.to_string(), uri.to_string()));
    }

    /// Record a namespace declaration attribute, returning `true` if `raw` was one
    pub fn declare(&mut self, raw: &str, value: &str) -> bool {
        if raw == "xmlns" {
            self.bind("", value);
            true
        } else if let Some(prefix) = raw.strip_prefix("xmlns:") {
            self.bind(prefix, value);
            true
        } else {
            false
        }
    }

    /// Namespace URI bound to `prefix`; `None` prefix looks up the default namespace
    pub fn lookup(&self, prefix: Option<&str>) -> Result<Option<String>, UndeclaredPrefix> {
        let key = prefix.unwrap_or("");
        match key {
            "xml" => return Ok(Some(XML_NAMESPACE.to_string())),
            "xmlns" => return Ok(Some(XMLNS_NAMESPACE.to_string())),
            _ => {}
        }

        match self.bindings.iter().rev().find(|(p, _)| p == key) {
            Some((_, uri)) if uri.is_empty() => Ok(None),
            Some((_, uri)) => Ok(Some(uri.clone())),
            None if prefix.is_none() => Ok(None),
            None => Err(UndeclaredPrefix(key.to_string())),
        }
    }

    /// Resolve an element name; unprefixed names take the default namespace
    pub fn resolve_element(&self, raw: &str) -> Result<QualifiedName, UndeclaredPrefix> {
        let (prefix, local) = split_prefixed(raw);
        Ok(QualifiedName::new(self.lookup(prefix)?, local))
    }

    /// Resolve an attribute name; unprefixed attributes are in no namespace
    pub fn resolve_attribute(&self, raw: &str) -> Result<QualifiedName, UndeclaredPrefix> {
        match split_prefixed(raw) {
            (Some(prefix), local) => Ok(QualifiedName::new(self.lookup(Some(prefix))?, local)),
            (None, local) => Ok(QualifiedName::local(local)),
        }
    }

    /// Resolve a QName-valued attribute value (`xsi:type`, `type="tns:Foo"`)
    pub fn resolve_value(&self, value: &str) -> Result<QualifiedName, UndeclaredPrefix> {
        self.resolve_element(value.trim())
    }
}

/// Incremental byte-offset to line/column translation over a document
///
/// Offsets are expected to grow monotonically, as they do while streaming.
/// A smaller offset restarts the scan from the top.
pub struct LineTracker<'a> {
    text: &'a str,
    offset: usize,
    line: u32,
    column: u32,
}

impl<'a> LineTracker<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            offset: 0,
            line: 1,
            column: 0,
        }
    }

    /// Each byte is scanned once while offsets only grow
    pub fn locate(&mut self, position: usize) -> SourceLocation {
        let position = position.min(self.text.len());
        if position < self.offset {
            self.offset = 0;
            self.line = 1;
            self.column = 0;
        }

        for byte in &self.text.as_bytes()[self.offset..position] {
            if *byte == b'\n' {
                self.line += 1;
                self.column = 0;
            } else if *byte & 0xC0 != 0x80 {
                // Count chars, not UTF-8 continuation bytes
                self.column += 1;
            }
        }
        self.offset = position;

        SourceLocation {
            line: self.line,
            column: self.column + 1,
        }
    }
}

/// Whitespace handling of a simple type (`xs:whiteSpace` facet)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WhiteSpace {
    Preserve,
    Replace,
    Collapse,
}

impl WhiteSpace {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "preserve" => Some(Self::Preserve),
            "replace" => Some(Self::Replace),
            "collapse" => Some(Self::Collapse),
            _ => None,
        }
    }

    pub fn apply(self, value: &str) -> String {
        match self {
            Self::Preserve => value.to_string(),
            Self::Replace => value
                .chars()
                .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
                .collect(),
            Self::Collapse => xml_tokens(value).collect::<Vec<_>>().join(" "),
        }
    }
}

/// Splits on the four XML whitespace characters only
pub fn xml_tokens(value: &str) -> impl Iterator<Item = &str> {
    value
        .split([' ', '\t', '\n', '\r'])
        .filter(|token| !token.is_empty())
}

pub fn is_xml_whitespace(text: &str) -> bool {
    text.chars().all(|c| matches!(c, ' ' | '\t' | '\n' | '\r'))
}
