//! Compiled schema components
//!
//! Everything the validator needs, held in flat arenas indexed by
//! [`ElementId`] and [`TypeId`]. A `CompiledSchema` is immutable after
//! compilation and can be shared freely between threads.

use std::collections::{HashMap, HashSet};
use std::fmt;

use regex::Regex;

use super::automaton::Automaton;
use super::datatypes::{Builtin, DecimalValue};
use crate::xml::{NamespaceStack, QualifiedName, WhiteSpace, xml_tokens};

pub type ElementId = usize;
pub type TypeId = usize;

/// Namespaces a wildcard admits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceConstraint {
    Any,
    /// Any namespace except these (`##other`)
    Not(Vec<Option<String>>),
    /// Exactly these namespaces
    Only(Vec<Option<String>>),
}

impl NamespaceConstraint {
    pub fn allows(&self, namespace: Option<&str>) -> bool {
        match self {
            NamespaceConstraint::Any => true,
            NamespaceConstraint::Not(excluded) => {
                !excluded.iter().any(|ns| ns.as_deref() == namespace)
            }
            NamespaceConstraint::Only(allowed) => {
                allowed.iter().any(|ns| ns.as_deref() == namespace)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessContents {
    Strict,
    Lax,
    Skip,
}

impl ProcessContents {
    pub fn parse(value: Option<&str>) -> Option<Self> {
        match value.unwrap_or("strict") {
            "strict" => Some(Self::Strict),
            "lax" => Some(Self::Lax),
            "skip" => Some(Self::Skip),
            _ => None,
        }
    }
}

/// `xs:any` / `xs:anyAttribute`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wildcard {
    pub namespaces: NamespaceConstraint,
    pub process: ProcessContents,
}

impl Wildcard {
    pub fn any(process: ProcessContents) -> Self {
        Self {
            namespaces: NamespaceConstraint::Any,
            process,
        }
    }

    pub fn allows(&self, name: &QualifiedName) -> bool {
        self.namespaces.allows(name.namespace.as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct ElementDecl {
    pub name: QualifiedName,
    pub type_id: TypeId,
    pub nillable: bool,
    pub is_abstract: bool,
    pub default: Option<String>,
    pub fixed: Option<String>,
    pub substitution_head: Option<ElementId>,
}

/// A global attribute declaration
#[derive(Debug, Clone)]
pub struct AttributeDecl {
    pub name: QualifiedName,
    pub type_id: TypeId,
    pub default: Option<String>,
    pub fixed: Option<String>,
}

/// An attribute as used by a complex type
#[derive(Debug, Clone)]
pub struct AttributeUse {
    pub name: QualifiedName,
    pub type_id: TypeId,
    pub required: bool,
    pub default: Option<String>,
    pub fixed: Option<String>,
}

/// Constraining facets accumulated along a simple type's derivation
#[derive(Debug, Clone)]
pub struct Facets {
    pub whitespace: WhiteSpace,
    /// One regex per derivation step; every step must match
    pub patterns: Vec<Regex>,
    pub enumeration: Option<Vec<String>>,
    pub length: Option<usize>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min_inclusive: Option<String>,
    pub max_inclusive: Option<String>,
    pub min_exclusive: Option<String>,
    pub max_exclusive: Option<String>,
    pub total_digits: Option<usize>,
    pub fraction_digits: Option<usize>,
}

impl Facets {
    pub fn new(whitespace: WhiteSpace) -> Self {
        Self {
            whitespace,
            patterns: Vec::new(),
            enumeration: None,
            length: None,
            min_length: None,
            max_length: None,
            min_inclusive: None,
            max_inclusive: None,
            min_exclusive: None,
            max_exclusive: None,
            total_digits: None,
            fraction_digits: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Variety {
    Atomic(Builtin),
    List(TypeId),
    Union(Vec<TypeId>),
}

#[derive(Debug, Clone)]
pub struct SimpleType {
    pub name: Option<QualifiedName>,
    pub variety: Variety,
    pub facets: Facets,
}

/// `xs:all` content: each member at most once, in any order
#[derive(Debug, Clone)]
pub struct AllGroup {
    /// Member declarations and whether each is required
    pub members: Vec<(ElementId, bool)>,
    /// The whole group may be absent (`minOccurs="0"`)
    pub optional: bool,
}

#[derive(Debug, Clone)]
pub enum ContentModel {
    Automaton(Automaton),
    All(AllGroup),
}

#[derive(Debug, Clone)]
pub enum ContentType {
    Empty,
    Simple(TypeId),
    ElementOnly(ContentModel),
    Mixed(ContentModel),
}

#[derive(Debug, Clone)]
pub struct ComplexType {
    pub name: Option<QualifiedName>,
    pub content: ContentType,
    pub attributes: Vec<AttributeUse>,
    pub attribute_wildcard: Option<Wildcard>,
    pub is_abstract: bool,
}

#[derive(Debug, Clone)]
pub enum TypeDef {
    Simple(SimpleType),
    Complex(ComplexType),
}

/// Which identity table a value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Id,
    IdRef,
    IdRefs,
}

/// The failed facet of a simple value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetViolation(pub String);

impl fmt::Display for FacetViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable validation state compiled from a schema set
#[derive(Debug)]
pub struct CompiledSchema {
    pub(crate) elements: HashMap<QualifiedName, ElementId>,
    pub(crate) types: HashMap<QualifiedName, TypeId>,
    pub(crate) attributes: HashMap<QualifiedName, AttributeDecl>,
    pub(crate) element_decls: Vec<ElementDecl>,
    pub(crate) type_defs: Vec<TypeDef>,
    /// Head element to every element that may substitute for it
    pub(crate) substitutions: HashMap<ElementId, Vec<ElementId>>,
    pub(crate) namespaces: HashSet<Option<String>>,
    pub(crate) notices: Vec<String>,
    pub(crate) any_type: TypeId,
}

impl CompiledSchema {
    pub fn global_element(&self, name: &QualifiedName) -> Option<ElementId> {
        self.elements.get(name).copied()
    }

    pub fn global_type(&self, name: &QualifiedName) -> Option<TypeId> {
        self.types.get(name).copied()
    }

    pub fn global_attribute(&self, name: &QualifiedName) -> Option<&AttributeDecl> {
        self.attributes.get(name)
    }

    pub fn element(&self, id: ElementId) -> &ElementDecl {
        &self.element_decls[id]
    }

    pub fn type_def(&self, id: TypeId) -> &TypeDef {
        &self.type_defs[id]
    }

    pub fn any_type(&self) -> TypeId {
        self.any_type
    }

    /// Whether some schema document in the set targets `namespace`
    pub fn describes_namespace(&self, namespace: Option<&str>) -> bool {
        self.namespaces.contains(&namespace.map(str::to_string))
    }

    /// Non-fatal notices about constructs that are not enforced
    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    /// The declaration a child named `name` matches when `decl` is expected:
    /// `decl` itself or a member of its substitution group
    pub fn match_element(&self, decl: ElementId, name: &QualifiedName) -> Option<ElementId> {
        if self.element_decls[decl].name == *name {
            return Some(decl);
        }
        self.substitutions
            .get(&decl)?
            .iter()
            .copied()
            .find(|member| self.element_decls[*member].name == *name)
    }

    /// Human-readable name of a type for messages
    pub fn type_name(&self, id: TypeId) -> String {
        let name = match &self.type_defs[id] {
            TypeDef::Simple(simple) => simple.name.as_ref(),
            TypeDef::Complex(complex) => complex.name.as_ref(),
        };
        match name {
            Some(name) if name.is_xsd() => format!("xs:{}", name.local),
            Some(name) => name.local.clone(),
            None => "anonymous".to_string(),
        }
    }

    /// Built-in at the root of an atomic type's derivation
    fn atomic_builtin(&self, id: TypeId) -> Option<Builtin> {
        match &self.type_defs[id] {
            TypeDef::Simple(SimpleType {
                variety: Variety::Atomic(builtin),
                ..
            }) => Some(*builtin),
            _ => None,
        }
    }

    pub fn id_kind(&self, id: TypeId) -> Option<IdKind> {
        match &self.type_defs[id] {
            TypeDef::Simple(simple) => match &simple.variety {
                Variety::Atomic(Builtin::Id) => Some(IdKind::Id),
                Variety::Atomic(Builtin::IdRef) => Some(IdKind::IdRef),
                Variety::List(item) if self.atomic_builtin(*item) == Some(Builtin::IdRef) => {
                    Some(IdKind::IdRefs)
                }
                _ => None,
            },
            TypeDef::Complex(_) => None,
        }
    }

    /// Whitespace-normalize a literal for the given simple type
    pub fn normalize(&self, id: TypeId, raw: &str) -> String {
        match &self.type_defs[id] {
            TypeDef::Simple(simple) => simple.facets.whitespace.apply(raw),
            TypeDef::Complex(_) => raw.to_string(),
        }
    }

    /// Equality of two literals in the value space of a simple type
    pub fn values_equal(&self, id: TypeId, left: &str, right: &str) -> bool {
        let left = self.normalize(id, left);
        let right = self.normalize(id, right);
        match self.atomic_builtin(id) {
            Some(builtin) => builtin.equal(&left, &right),
            None => left == right,
        }
    }

    /// Check a literal against a simple type, including all facets
    pub fn check_value(
        &self,
        id: TypeId,
        raw: &str,
        namespaces: &NamespaceStack,
    ) -> Result<(), FacetViolation> {
        let TypeDef::Simple(simple) = &self.type_defs[id] else {
            return Ok(());
        };
        let value = simple.facets.whitespace.apply(raw);

        match &simple.variety {
            Variety::Atomic(builtin) => {
                builtin.check(&value).map_err(FacetViolation)?;
                if matches!(builtin, Builtin::QName | Builtin::Notation) {
                    namespaces
                        .resolve_value(&value)
                        .map_err(|e| FacetViolation(format!("The QName prefix {}.", e)))?;
                }
                check_facets(&simple.facets, *builtin, &value, builtin.length(&value))
            }
            Variety::List(item) => {
                for token in xml_tokens(&value) {
                    self.check_value(*item, token, namespaces)?;
                }
                let count = xml_tokens(&value).count();
                check_facets(&simple.facets, Builtin::String, &value, count)
            }
            Variety::Union(members) => {
                let accepted = members
                    .iter()
                    .any(|member| self.check_value(*member, raw, namespaces).is_ok());
                if !accepted {
                    return Err(FacetViolation(format!(
                        "The value '{}' is not valid according to any of the memberTypes of the union.",
                        value
                    )));
                }
                check_facets(&simple.facets, Builtin::String, &value, value.chars().count())
            }
        }
    }
}

fn check_facets(
    facets: &Facets,
    builtin: Builtin,
    value: &str,
    length: usize,
) -> Result<(), FacetViolation> {
    let fail = |facet: &str| Err(FacetViolation(format!("The {} constraint failed.", facet)));

    if facets.length.is_some_and(|l| length != l) {
        return Err(FacetViolation(
            "The actual length is not equal to the specified length.".to_string(),
        ));
    }
    if facets.min_length.is_some_and(|l| length < l) {
        return Err(FacetViolation(
            "The actual length is less than the MinLength value.".to_string(),
        ));
    }
    if facets.max_length.is_some_and(|l| length > l) {
        return Err(FacetViolation(
            "The actual length is greater than the MaxLength value.".to_string(),
        ));
    }

    if facets.patterns.iter().any(|pattern| !pattern.is_match(value)) {
        return fail("Pattern");
    }

    if let Some(values) = &facets.enumeration
        && !values.iter().any(|allowed| builtin.equal(allowed, value))
    {
        return fail("Enumeration");
    }

    let compare = |bound: &Option<String>| bound.as_deref().map(|b| builtin.compare(value, b));
    if let Some(ordering) = compare(&facets.min_inclusive)
        && !matches!(ordering, Some(o) if o.is_ge())
    {
        return fail("MinInclusive");
    }
    if let Some(ordering) = compare(&facets.max_inclusive)
        && !matches!(ordering, Some(o) if o.is_le())
    {
        return fail("MaxInclusive");
    }
    if let Some(ordering) = compare(&facets.min_exclusive)
        && !matches!(ordering, Some(o) if o.is_gt())
    {
        return fail("MinExclusive");
    }
    if let Some(ordering) = compare(&facets.max_exclusive)
        && !matches!(ordering, Some(o) if o.is_lt())
    {
        return fail("MaxExclusive");
    }

    if facets.total_digits.is_some() || facets.fraction_digits.is_some() {
        if let Some(decimal) = DecimalValue::parse(value) {
            if facets.total_digits.is_some_and(|t| decimal.total_digits() > t) {
                return fail("TotalDigits");
            }
            if facets
                .fraction_digits
                .is_some_and(|f| decimal.fraction_digits() > f)
            {
                return fail("FractionDigits");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facets() -> Facets {
        Facets::new(WhiteSpace::Collapse)
    }

    #[test]
    fn test_namespace_constraints() {
        let other = NamespaceConstraint::Not(vec![Some("urn:a".to_string()), None]);
        assert!(other.allows(Some("urn:b")));
        assert!(!other.allows(Some("urn:a")));
        assert!(!other.allows(None));

        let local = NamespaceConstraint::Only(vec![None]);
        assert!(local.allows(None));
        assert!(!local.allows(Some("urn:a")));
    }

    #[test]
    fn test_length_facets() {
        let mut f = facets();
        f.min_length = Some(2);
        f.max_length = Some(4);
        assert!(check_facets(&f, Builtin::String, "abc", 3).is_ok());
        assert!(check_facets(&f, Builtin::String, "a", 1).is_err());
        let error = check_facets(&f, Builtin::String, "abcde", 5).unwrap_err();
        assert!(error.to_string().contains("MaxLength"));
    }

    #[test]
    fn test_range_and_digit_facets() {
        let mut f = facets();
        f.min_inclusive = Some("0".to_string());
        f.max_exclusive = Some("100".to_string());
        f.fraction_digits = Some(2);
        assert!(check_facets(&f, Builtin::Decimal, "99.99", 5).is_ok());
        assert_eq!(
            check_facets(&f, Builtin::Decimal, "100", 3).unwrap_err().0,
            "The MaxExclusive constraint failed."
        );
        assert!(check_facets(&f, Builtin::Decimal, "-1", 2).is_err());
        assert!(check_facets(&f, Builtin::Decimal, "1.234", 5).is_err());
    }

    #[test]
    fn test_enumeration_uses_value_space() {
        let mut f = facets();
        f.enumeration = Some(vec!["1.0".to_string(), "2.5".to_string()]);
        assert!(check_facets(&f, Builtin::Decimal, "1", 1).is_ok());
        assert!(check_facets(&f, Builtin::Decimal, "2", 1).is_err());
    }
}
