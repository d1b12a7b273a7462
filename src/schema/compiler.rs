//! Schema set to [`CompiledSchema`]
//!
//! Global components of every document are registered first so references
//! can be resolved in any order. Types and elements are then compiled on
//! demand; a derivation chain that comes back to a type still being
//! compiled is reported as circular. Groups and attribute groups are
//! expanded inline at each point of use.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::SchemaSet;
use super::automaton::{Automaton, Occurs, Particle, Term};
use super::datatypes::{BUILTIN_LISTS, Builtin, compile_patterns};
use super::document::{SchemaDocument, SchemaNode};
use super::model::{
    AllGroup, AttributeDecl, AttributeUse, CompiledSchema, ComplexType, ContentModel,
    ContentType, ElementDecl, ElementId, Facets, NamespaceConstraint, ProcessContents,
    SimpleType, TypeDef, TypeId, Variety, Wildcard,
};
use crate::error::{ResolutionError, ResolutionResult};
use crate::xml::{QualifiedName, WhiteSpace, XML_NAMESPACE, xml_tokens};

/// Largest `minOccurs`/`maxOccurs` expanded into an automaton
const MAX_OCCURS: u32 = 4096;

impl CompiledSchema {
    /// Compile every component of a resolved schema set
    pub fn compile(set: &SchemaSet) -> ResolutionResult<CompiledSchema> {
        let mut compiler = Compiler::new(set);
        compiler.register_builtins();
        compiler.register_globals()?;
        compiler.run()
    }
}

/// A global component waiting to be compiled
#[derive(Debug, Clone)]
struct Global<'a> {
    doc: usize,
    node: &'a SchemaNode,
    name: QualifiedName,
}

enum Slot<'a, T> {
    Pending(Global<'a>),
    InProgress(Option<QualifiedName>),
    Done(T),
}

struct Compiler<'a> {
    set: &'a SchemaSet,
    type_ids: HashMap<QualifiedName, TypeId>,
    types: Vec<Slot<'a, TypeDef>>,
    /// Content particle of each complex type, for extension
    particles: Vec<Option<Particle>>,
    element_ids: HashMap<QualifiedName, ElementId>,
    elements: Vec<Slot<'a, ElementDecl>>,
    attribute_nodes: HashMap<QualifiedName, Global<'a>>,
    attributes: HashMap<QualifiedName, AttributeDecl>,
    groups: HashMap<QualifiedName, Global<'a>>,
    attribute_groups: HashMap<QualifiedName, Global<'a>>,
    /// Group references currently being expanded
    expanding: Vec<QualifiedName>,
    notices: Vec<String>,
    any_type: TypeId,
    any_simple_type: TypeId,
}

impl<'a> Compiler<'a> {
    fn new(set: &'a SchemaSet) -> Self {
        Self {
            set,
            type_ids: HashMap::new(),
            types: Vec::new(),
            particles: Vec::new(),
            element_ids: HashMap::new(),
            elements: Vec::new(),
            attribute_nodes: HashMap::new(),
            attributes: HashMap::new(),
            groups: HashMap::new(),
            attribute_groups: HashMap::new(),
            expanding: Vec::new(),
            notices: Vec::new(),
            any_type: 0,
            any_simple_type: 0,
        }
    }

    fn document(&self, doc: usize) -> &'a SchemaDocument {
        &self.set.documents()[doc]
    }

    fn url(&self, doc: usize) -> String {
        self.document(doc).location.to_string()
    }

    fn invalid(&self, doc: usize, node: &SchemaNode, details: impl Into<String>) -> ResolutionError {
        ResolutionError::InvalidComponent {
            url: self.url(doc),
            details: format!("{} (line {})", details.into(), node.line),
        }
    }

    fn push_type(&mut self, slot: Slot<'a, TypeDef>) -> TypeId {
        self.types.push(slot);
        self.particles.push(None);
        self.types.len() - 1
    }

    fn register_builtins(&mut self) {
        for builtin in Builtin::ALL {
            let name = QualifiedName::xsd(builtin.name());
            let id = self.push_type(Slot::Done(TypeDef::Simple(SimpleType {
                name: Some(name.clone()),
                variety: Variety::Atomic(builtin),
                facets: Facets::new(builtin.whitespace()),
            })));
            if builtin == Builtin::AnySimpleType {
                self.any_simple_type = id;
            }
            self.type_ids.insert(name, id);
        }

        for (list_name, item) in BUILTIN_LISTS {
            let item_id = self.type_ids[&QualifiedName::xsd(item.name())];
            let mut facets = Facets::new(WhiteSpace::Collapse);
            facets.min_length = Some(1);
            let name = QualifiedName::xsd(list_name);
            let id = self.push_type(Slot::Done(TypeDef::Simple(SimpleType {
                name: Some(name.clone()),
                variety: Variety::List(item_id),
                facets,
            })));
            self.type_ids.insert(name, id);
        }

        let any_particle = Particle::Term {
            term: Term::Wildcard(Wildcard::any(ProcessContents::Lax)),
            occurs: Occurs { min: 0, max: None },
        };
        let automaton = Automaton::build(&any_particle).unwrap_or_else(|_| Automaton::empty());
        let name = QualifiedName::xsd("anyType");
        self.any_type = self.push_type(Slot::Done(TypeDef::Complex(ComplexType {
            name: Some(name.clone()),
            content: ContentType::Mixed(ContentModel::Automaton(automaton)),
            attributes: Vec::new(),
            attribute_wildcard: Some(Wildcard::any(ProcessContents::Lax)),
            is_abstract: false,
        })));
        self.type_ids.insert(name, self.any_type);
    }

    fn register_globals(&mut self) -> ResolutionResult<()> {
        let set = self.set;
        for (doc, document) in set.documents().iter().enumerate() {
            for node in document.root.content() {
                let kind: &'static str = match node.kind.as_str() {
                    "element" => "element",
                    "complexType" | "simpleType" => "type",
                    "attribute" => "attribute",
                    "group" => "group",
                    "attributeGroup" => "attributeGroup",
                    _ => continue,
                };
                let local = node
                    .attr("name")
                    .ok_or_else(|| self.invalid(doc, node, format!("global xs:{} without a name", node.kind)))?;
                let name = QualifiedName::new(document.effective_namespace.clone(), local);
                let global = Global {
                    doc,
                    node,
                    name: name.clone(),
                };

                let duplicate = match kind {
                    "element" => {
                        let id = self.elements.len();
                        self.elements.push(Slot::Pending(global));
                        self.element_ids.insert(name.clone(), id).is_some()
                    }
                    "type" => {
                        if self.type_ids.contains_key(&name) {
                            true
                        } else {
                            let id = self.push_type(Slot::Pending(global));
                            self.type_ids.insert(name.clone(), id);
                            false
                        }
                    }
                    "attribute" => self.attribute_nodes.insert(name.clone(), global).is_some(),
                    "group" => self.groups.insert(name.clone(), global).is_some(),
                    _ => self.attribute_groups.insert(name.clone(), global).is_some(),
                };
                if duplicate {
                    return Err(ResolutionError::DuplicateDefinition {
                        kind,
                        name: name.to_string(),
                        url: document.location.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn run(mut self) -> ResolutionResult<CompiledSchema> {
        self.register_xml_attributes();

        let mut attribute_names: Vec<QualifiedName> = self.attribute_nodes.keys().cloned().collect();
        attribute_names.sort();
        for name in attribute_names {
            if let Some(global) = self.attribute_nodes.get(&name).cloned() {
                let decl = self.global_attribute(&global)?;
                self.attributes.insert(name, decl);
            }
        }

        for id in 0..self.types.len() {
            self.ensure_type(id)?;
        }
        for id in 0..self.elements.len() {
            self.ensure_element(id)?;
        }

        let element_decls = finish(self.elements)?;
        let type_defs = finish(self.types)?;

        let mut substitutions: HashMap<ElementId, Vec<ElementId>> = HashMap::new();
        for (member, decl) in element_decls.iter().enumerate() {
            let mut seen = HashSet::new();
            let mut head = decl.substitution_head;
            while let Some(h) = head {
                if !seen.insert(h) {
                    break;
                }
                substitutions.entry(h).or_default().push(member);
                head = element_decls[h].substitution_head;
            }
        }

        let namespaces = self
            .set
            .namespaces()
            .map(|ns| ns.map(str::to_string))
            .collect();

        debug!(
            elements = self.element_ids.len(),
            types = type_defs.len(),
            notices = self.notices.len(),
            "Compiled schema set"
        );

        Ok(CompiledSchema {
            elements: self.element_ids,
            types: self.type_ids,
            attributes: self.attributes,
            element_decls,
            type_defs,
            substitutions,
            namespaces,
            notices: self.notices,
            any_type: self.any_type,
        })
    }

    /// Attributes of the reserved `xml` namespace, unless a schema defines them
    fn register_xml_attributes(&mut self) {
        let builtins = [
            ("lang", Builtin::Language),
            ("space", Builtin::NCName),
            ("base", Builtin::AnyUri),
            ("id", Builtin::Id),
        ];
        for (local, builtin) in builtins {
            let name = QualifiedName::new(Some(XML_NAMESPACE.to_string()), local);
            if self.attribute_nodes.contains_key(&name) {
                continue;
            }
            let type_id = self.type_ids[&QualifiedName::xsd(builtin.name())];
            self.attributes.insert(
                name.clone(),
                AttributeDecl {
                    name,
                    type_id,
                    default: None,
                    fixed: None,
                },
            );
        }
    }

    /// Resolve a QName-valued attribute; chameleon documents map
    /// unqualified names into their adopted namespace
    fn qname(&self, doc: usize, node: &SchemaNode, value: &str) -> ResolutionResult<QualifiedName> {
        let mut name = node
            .resolve_qname(value.trim())
            .map_err(|e| self.invalid(doc, node, format!("'{}': {}", value, e)))?;
        let document = self.document(doc);
        if name.namespace.is_none() && document.is_chameleon() {
            name.namespace = document.effective_namespace.clone();
        }
        Ok(name)
    }

    fn unresolved(&self, doc: usize, kind: &'static str, name: &QualifiedName) -> ResolutionError {
        ResolutionError::UnresolvedReference {
            kind,
            name: name.to_string(),
            url: self.url(doc),
        }
    }

    fn type_ref(&self, doc: usize, node: &SchemaNode, value: &str) -> ResolutionResult<TypeId> {
        let name = self.qname(doc, node, value)?;
        self.type_ids
            .get(&name)
            .copied()
            .ok_or_else(|| self.unresolved(doc, "type", &name))
    }

    fn ensure_type(&mut self, id: TypeId) -> ResolutionResult<()> {
        let global = match &self.types[id] {
            Slot::Done(_) => return Ok(()),
            Slot::InProgress(name) => {
                return Err(ResolutionError::CircularDefinition {
                    kind: "type",
                    name: name
                        .as_ref()
                        .map_or_else(|| "anonymous".to_string(), |n| n.to_string()),
                });
            }
            Slot::Pending(global) => global.clone(),
        };

        self.types[id] = Slot::InProgress(Some(global.name.clone()));
        let def = self.compile_type(global.doc, global.node, Some(global.name), id)?;
        self.types[id] = Slot::Done(def);
        Ok(())
    }

    fn type_def(&self, id: TypeId) -> Option<&TypeDef> {
        match &self.types[id] {
            Slot::Done(def) => Some(def),
            _ => None,
        }
    }

    /// Compile an inline `simpleType`/`complexType` child into a fresh id
    fn anonymous_type(&mut self, doc: usize, node: &'a SchemaNode) -> ResolutionResult<TypeId> {
        let id = self.push_type(Slot::InProgress(None));
        let def = self.compile_type(doc, node, None, id)?;
        self.types[id] = Slot::Done(def);
        Ok(id)
    }

    fn compile_type(
        &mut self,
        doc: usize,
        node: &'a SchemaNode,
        name: Option<QualifiedName>,
        id: TypeId,
    ) -> ResolutionResult<TypeDef> {
        if node.is("simpleType") {
            self.compile_simple(doc, node, name).map(TypeDef::Simple)
        } else {
            self.compile_complex(doc, node, name, id)
                .map(TypeDef::Complex)
        }
    }

    /// The type named by `attribute` or given inline as a child of `node`
    fn declared_type(
        &mut self,
        doc: usize,
        node: &'a SchemaNode,
        attribute: &str,
    ) -> ResolutionResult<Option<TypeId>> {
        if let Some(value) = node.attr(attribute) {
            return self.type_ref(doc, node, value).map(Some);
        }
        match node
            .content()
            .find(|child| child.is("simpleType") || child.is("complexType"))
        {
            Some(inline) => self.anonymous_type(doc, inline).map(Some),
            None => Ok(None),
        }
    }

    fn simple_base(&mut self, doc: usize, node: &'a SchemaNode, id: TypeId) -> ResolutionResult<SimpleType> {
        self.ensure_type(id)?;
        match self.type_def(id) {
            Some(TypeDef::Simple(simple)) => Ok(simple.clone()),
            _ => Err(self.invalid(doc, node, "a simple type must derive from a simple type")),
        }
    }

    fn compile_simple(
        &mut self,
        doc: usize,
        node: &'a SchemaNode,
        name: Option<QualifiedName>,
    ) -> ResolutionResult<SimpleType> {
        let derivation = node
            .content()
            .next()
            .ok_or_else(|| self.invalid(doc, node, "empty xs:simpleType"))?;

        match derivation.kind.as_str() {
            "restriction" => {
                let base = self
                    .declared_type(doc, derivation, "base")?
                    .ok_or_else(|| self.invalid(doc, derivation, "xs:restriction without a base"))?;
                let mut simple = self.simple_base(doc, derivation, base)?;
                simple.name = name;
                let builtin = match simple.variety {
                    Variety::Atomic(builtin) => builtin,
                    _ => Builtin::String,
                };
                self.apply_facets(doc, derivation, builtin, &mut simple.facets)?;
                Ok(simple)
            }
            "list" => {
                let item = self
                    .declared_type(doc, derivation, "itemType")?
                    .ok_or_else(|| self.invalid(doc, derivation, "xs:list without an item type"))?;
                self.simple_base(doc, derivation, item)?;
                Ok(SimpleType {
                    name,
                    variety: Variety::List(item),
                    facets: Facets::new(WhiteSpace::Collapse),
                })
            }
            "union" => {
                let mut members = Vec::new();
                for value in xml_tokens(derivation.attr("memberTypes").unwrap_or_default()) {
                    members.push(self.type_ref(doc, derivation, value)?);
                }
                for inline in derivation.content().filter(|c| c.is("simpleType")) {
                    members.push(self.anonymous_type(doc, inline)?);
                }
                if members.is_empty() {
                    return Err(self.invalid(doc, derivation, "xs:union without member types"));
                }
                for member in &members {
                    self.simple_base(doc, derivation, *member)?;
                }
                Ok(SimpleType {
                    name,
                    variety: Variety::Union(members),
                    facets: Facets::new(WhiteSpace::Collapse),
                })
            }
            other => Err(self.invalid(doc, derivation, format!("unexpected xs:{} in xs:simpleType", other))),
        }
    }

    fn apply_facets(
        &mut self,
        doc: usize,
        restriction: &'a SchemaNode,
        builtin: Builtin,
        facets: &mut Facets,
    ) -> ResolutionResult<()> {
        let mut patterns = Vec::new();
        let mut enumeration = Vec::new();

        for facet in restriction.content() {
            let kind = facet.kind.as_str();
            if matches!(
                kind,
                "simpleType" | "attribute" | "attributeGroup" | "anyAttribute" | "sequence" | "choice" | "all" | "group"
            ) {
                continue;
            }
            let Some(value) = facet.attr("value") else {
                return Err(self.invalid(doc, facet, format!("xs:{} without a value", kind)));
            };
            let count = || {
                value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| self.invalid(doc, facet, format!("xs:{} value '{}' is not a count", kind, value)))
            };

            match kind {
                "pattern" => patterns.push(value.to_string()),
                "enumeration" => enumeration.push(facets.whitespace.apply(value)),
                "length" => facets.length = Some(count()?),
                "minLength" => facets.min_length = Some(count()?),
                "maxLength" => facets.max_length = Some(count()?),
                "totalDigits" => facets.total_digits = Some(count()?),
                "fractionDigits" => facets.fraction_digits = Some(count()?),
                "minInclusive" | "maxInclusive" | "minExclusive" | "maxExclusive" => {
                    let bound = value.trim().to_string();
                    if builtin.check(&bound).is_err() {
                        return Err(self.invalid(
                            doc,
                            facet,
                            format!("xs:{} value '{}' is not a valid {}", kind, value, builtin.name()),
                        ));
                    }
                    let slot = match kind {
                        "minInclusive" => &mut facets.min_inclusive,
                        "maxInclusive" => &mut facets.max_inclusive,
                        "minExclusive" => &mut facets.min_exclusive,
                        _ => &mut facets.max_exclusive,
                    };
                    *slot = Some(bound);
                }
                "whiteSpace" => {
                    facets.whitespace = WhiteSpace::parse(value)
                        .ok_or_else(|| self.invalid(doc, facet, format!("unknown whiteSpace '{}'", value)))?;
                }
                other => {
                    self.notices.push(format!(
                        "The xs:{} facet in {} is not enforced.",
                        other,
                        self.url(doc)
                    ));
                }
            }
        }

        if !patterns.is_empty() {
            let regex = compile_patterns(&patterns).map_err(|e| {
                self.invalid(doc, restriction, format!("pattern '{}': {}", patterns.join("|"), e))
            })?;
            facets.patterns.push(regex);
        }
        if !enumeration.is_empty() {
            facets.enumeration = Some(enumeration);
        }
        Ok(())
    }

    fn compile_complex(
        &mut self,
        doc: usize,
        node: &'a SchemaNode,
        name: Option<QualifiedName>,
        id: TypeId,
    ) -> ResolutionResult<ComplexType> {
        let is_abstract = node.attr("abstract") == Some("true");
        let mut mixed = node.attr("mixed") == Some("true");
        let mut attributes = Vec::new();
        let mut attribute_wildcard = None;

        let content = match node.content().next() {
            Some(simple_content) if simple_content.is("simpleContent") => {
                let derivation = derivation_of(simple_content)
                    .ok_or_else(|| self.invalid(doc, simple_content, "empty xs:simpleContent"))?;
                let base = self
                    .declared_type(doc, derivation, "base")?
                    .ok_or_else(|| self.invalid(doc, derivation, "derivation without a base"))?;
                self.ensure_type(base)?;

                let base_simple = match self.type_def(base) {
                    Some(TypeDef::Simple(_)) => base,
                    Some(TypeDef::Complex(complex)) => {
                        attributes = complex.attributes.clone();
                        attribute_wildcard = complex.attribute_wildcard.clone();
                        match complex.content {
                            ContentType::Simple(simple) => simple,
                            _ => {
                                return Err(self.invalid(
                                    doc,
                                    derivation,
                                    "xs:simpleContent base must have simple content",
                                ));
                            }
                        }
                    }
                    None => return Err(self.invalid(doc, derivation, "base type is not compiled")),
                };

                let simple = if derivation.is("restriction") {
                    let mut restricted = match derivation.content().find(|c| c.is("simpleType")) {
                        Some(inline) => {
                            let inline_id = self.anonymous_type(doc, inline)?;
                            self.simple_base(doc, derivation, inline_id)?
                        }
                        None => self.simple_base(doc, derivation, base_simple)?,
                    };
                    restricted.name = None;
                    let builtin = match restricted.variety {
                        Variety::Atomic(builtin) => builtin,
                        _ => Builtin::String,
                    };
                    self.apply_facets(doc, derivation, builtin, &mut restricted.facets)?;
                    self.push_type(Slot::Done(TypeDef::Simple(restricted)))
                } else {
                    base_simple
                };

                self.collect_attributes(doc, derivation, &mut attributes, &mut attribute_wildcard)?;
                ContentType::Simple(simple)
            }
            Some(complex_content) if complex_content.is("complexContent") => {
                if let Some(value) = complex_content.attr("mixed") {
                    mixed = value == "true";
                }
                let derivation = derivation_of(complex_content)
                    .ok_or_else(|| self.invalid(doc, complex_content, "empty xs:complexContent"))?;
                let base = self
                    .declared_type(doc, derivation, "base")?
                    .ok_or_else(|| self.invalid(doc, derivation, "derivation without a base"))?;
                self.ensure_type(base)?;

                let own = self.particle_of(doc, derivation)?;
                let particle = match self.type_def(base) {
                    Some(TypeDef::Complex(complex)) => {
                        attributes = complex.attributes.clone();
                        attribute_wildcard = complex.attribute_wildcard.clone();
                        if derivation.is("extension") {
                            match (self.particles[base].clone(), own) {
                                (Some(inherited), Some(own)) => Some(Particle::Sequence {
                                    items: vec![inherited, own],
                                    occurs: Occurs::ONCE,
                                }),
                                (inherited, own) => inherited.or(own),
                            }
                        } else {
                            own
                        }
                    }
                    _ => {
                        return Err(self.invalid(
                            doc,
                            derivation,
                            "xs:complexContent base must be a complex type",
                        ));
                    }
                };

                self.collect_attributes(doc, derivation, &mut attributes, &mut attribute_wildcard)?;
                self.particles[id] = particle.clone();
                self.content_type(doc, node, particle, mixed)?
            }
            _ => {
                let particle = self.particle_of(doc, node)?;
                self.collect_attributes(doc, node, &mut attributes, &mut attribute_wildcard)?;
                self.particles[id] = particle.clone();
                self.content_type(doc, node, particle, mixed)?
            }
        };

        Ok(ComplexType {
            name,
            content,
            attributes,
            attribute_wildcard,
            is_abstract,
        })
    }

    fn content_type(
        &self,
        doc: usize,
        node: &SchemaNode,
        particle: Option<Particle>,
        mixed: bool,
    ) -> ResolutionResult<ContentType> {
        let model = match particle.filter(|p| !p.is_empty()) {
            None if mixed => ContentModel::Automaton(Automaton::empty()),
            None => return Ok(ContentType::Empty),
            Some(Particle::All { items, occurs }) => {
                let mut members = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Particle::Term {
                            term: Term::Element(element),
                            occurs,
                        } => members.push((element, occurs.min > 0)),
                        _ => return Err(self.invalid(doc, node, "xs:all may only contain elements")),
                    }
                }
                ContentModel::All(AllGroup {
                    members,
                    optional: occurs.min == 0,
                })
            }
            Some(particle) => ContentModel::Automaton(
                Automaton::build(&particle).map_err(|e| self.invalid(doc, node, e))?,
            ),
        };
        Ok(if mixed {
            ContentType::Mixed(model)
        } else {
            ContentType::ElementOnly(model)
        })
    }

    /// The model group directly under `node`, if any
    fn particle_of(&mut self, doc: usize, node: &'a SchemaNode) -> ResolutionResult<Option<Particle>> {
        match node
            .content()
            .find(|c| matches!(c.kind.as_str(), "sequence" | "choice" | "all" | "group"))
        {
            Some(group) => self.particle(doc, group).map(Some),
            None => Ok(None),
        }
    }

    fn particle(&mut self, doc: usize, node: &'a SchemaNode) -> ResolutionResult<Particle> {
        let occurs = self.occurs(doc, node)?;
        match node.kind.as_str() {
            "element" => Ok(Particle::Term {
                term: Term::Element(self.local_element(doc, node)?),
                occurs,
            }),
            "any" => Ok(Particle::Term {
                term: Term::Wildcard(self.wildcard(doc, node)?),
                occurs,
            }),
            kind @ ("sequence" | "choice" | "all") => {
                let mut items = Vec::new();
                for child in node.content() {
                    items.push(self.particle(doc, child)?);
                }
                Ok(match kind {
                    "sequence" => Particle::Sequence { items, occurs },
                    "choice" => Particle::Choice { items, occurs },
                    _ => Particle::All { items, occurs },
                })
            }
            "group" => {
                let reference = node
                    .attr("ref")
                    .ok_or_else(|| self.invalid(doc, node, "local xs:group without ref"))?;
                let name = self.qname(doc, node, reference)?;
                let global = self
                    .groups
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| self.unresolved(doc, "group", &name))?;
                if self.expanding.contains(&name) {
                    return Err(ResolutionError::CircularDefinition {
                        kind: "group",
                        name: name.to_string(),
                    });
                }

                self.expanding.push(name);
                let model = self.particle_of(global.doc, global.node);
                self.expanding.pop();

                Ok(match model? {
                    Some(model) if model.occurs() == Occurs::ONCE => with_occurs(model, occurs),
                    Some(model) => Particle::Sequence {
                        items: vec![model],
                        occurs,
                    },
                    None => Particle::Sequence {
                        items: Vec::new(),
                        occurs,
                    },
                })
            }
            other => Err(self.invalid(doc, node, format!("unexpected xs:{} in a content model", other))),
        }
    }

    fn occurs(&mut self, doc: usize, node: &SchemaNode) -> ResolutionResult<Occurs> {
        let parse = |attribute: &str, value: &str| {
            value
                .trim()
                .parse::<u64>()
                .map_err(|_| self.invalid(doc, node, format!("{}='{}' is not a count", attribute, value)))
        };
        let min = match node.attr("minOccurs") {
            Some(value) => parse("minOccurs", value)?,
            None => 1,
        };
        let max = match node.attr("maxOccurs") {
            Some("unbounded") => None,
            Some(value) => Some(parse("maxOccurs", value)?),
            None => Some(1),
        };
        if max.is_some_and(|max| max < min) {
            return Err(self.invalid(doc, node, "maxOccurs is less than minOccurs"));
        }

        let limit = u64::from(MAX_OCCURS);
        if min > limit || max.is_some_and(|max| max > limit) {
            self.notices.push(format!(
                "Occurrence bounds above {} in {} (line {}) are treated as {}.",
                MAX_OCCURS,
                self.url(doc),
                node.line,
                MAX_OCCURS
            ));
        }
        let clamp = |value: u64| value.min(limit) as u32;
        Ok(Occurs {
            min: clamp(min),
            max: max.map(clamp),
        })
    }

    fn wildcard(&self, doc: usize, node: &SchemaNode) -> ResolutionResult<Wildcard> {
        let target = self.document(doc).effective_namespace.clone();
        let namespaces = match node.attr("namespace").map(str::trim).unwrap_or("##any") {
            "##any" => NamespaceConstraint::Any,
            "##other" => {
                let mut excluded = vec![None];
                if target.is_some() {
                    excluded.insert(0, target);
                }
                NamespaceConstraint::Not(excluded)
            }
            list => NamespaceConstraint::Only(
                xml_tokens(list)
                    .map(|token| match token {
                        "##targetNamespace" => target.clone(),
                        "##local" => None,
                        uri => Some(uri.to_string()),
                    })
                    .collect(),
            ),
        };
        let process = ProcessContents::parse(node.attr("processContents")).ok_or_else(|| {
            self.invalid(doc, node, "processContents must be strict, lax or skip")
        })?;
        Ok(Wildcard {
            namespaces,
            process,
        })
    }

    fn note_identity_constraints(&mut self, node: &SchemaNode, name: &QualifiedName) {
        for constraint in node
            .content()
            .filter(|c| matches!(c.kind.as_str(), "key" | "keyref" | "unique"))
        {
            self.notices.push(format!(
                "The identity constraint xs:{} '{}' on element '{}' is not enforced.",
                constraint.kind,
                constraint.attr("name").unwrap_or_default(),
                name.local
            ));
        }
    }

    fn local_element(&mut self, doc: usize, node: &'a SchemaNode) -> ResolutionResult<ElementId> {
        if let Some(reference) = node.attr("ref") {
            let name = self.qname(doc, node, reference)?;
            return self
                .element_ids
                .get(&name)
                .copied()
                .ok_or_else(|| self.unresolved(doc, "element", &name));
        }

        let local = node
            .attr("name")
            .ok_or_else(|| self.invalid(doc, node, "local xs:element without name or ref"))?;
        let document = self.document(doc);
        let qualified = match node.attr("form") {
            Some(form) => form == "qualified",
            None => document.element_form_qualified,
        };
        let namespace = if qualified {
            document.effective_namespace.clone()
        } else {
            None
        };
        let name = QualifiedName::new(namespace, local);
        self.note_identity_constraints(node, &name);

        let type_id = self.declared_type(doc, node, "type")?.unwrap_or(self.any_type);
        let decl = ElementDecl {
            name,
            type_id,
            nillable: node.attr("nillable") == Some("true"),
            is_abstract: false,
            default: node.attr("default").map(str::to_string),
            fixed: node.attr("fixed").map(str::to_string),
            substitution_head: None,
        };
        self.elements.push(Slot::Done(decl));
        Ok(self.elements.len() - 1)
    }

    fn ensure_element(&mut self, id: ElementId) -> ResolutionResult<()> {
        let global = match &self.elements[id] {
            Slot::Done(_) => return Ok(()),
            Slot::InProgress(name) => {
                return Err(ResolutionError::CircularDefinition {
                    kind: "substitutionGroup",
                    name: name
                        .as_ref()
                        .map_or_else(|| "anonymous".to_string(), |n| n.to_string()),
                });
            }
            Slot::Pending(global) => global.clone(),
        };
        self.elements[id] = Slot::InProgress(Some(global.name.clone()));

        let (doc, node) = (global.doc, global.node);
        let head = match node.attr("substitutionGroup").and_then(|v| xml_tokens(v).next()) {
            Some(reference) => {
                let name = self.qname(doc, node, reference)?;
                let head = self
                    .element_ids
                    .get(&name)
                    .copied()
                    .ok_or_else(|| self.unresolved(doc, "element", &name))?;
                self.ensure_element(head)?;
                Some(head)
            }
            None => None,
        };

        self.note_identity_constraints(node, &global.name);
        let type_id = match self.declared_type(doc, node, "type")? {
            Some(type_id) => type_id,
            None => match head.and_then(|h| match &self.elements[h] {
                Slot::Done(decl) => Some(decl.type_id),
                _ => None,
            }) {
                Some(type_id) => type_id,
                None => self.any_type,
            },
        };

        self.elements[id] = Slot::Done(ElementDecl {
            name: global.name,
            type_id,
            nillable: node.attr("nillable") == Some("true"),
            is_abstract: node.attr("abstract") == Some("true"),
            default: node.attr("default").map(str::to_string),
            fixed: node.attr("fixed").map(str::to_string),
            substitution_head: head,
        });
        Ok(())
    }

    fn global_attribute(&mut self, global: &Global<'a>) -> ResolutionResult<AttributeDecl> {
        let type_id = self
            .declared_type(global.doc, global.node, "type")?
            .unwrap_or(self.any_simple_type);
        Ok(AttributeDecl {
            name: global.name.clone(),
            type_id,
            default: global.node.attr("default").map(str::to_string),
            fixed: global.node.attr("fixed").map(str::to_string),
        })
    }

    /// Merge the attribute uses declared under `node` into `uses`
    fn collect_attributes(
        &mut self,
        doc: usize,
        node: &'a SchemaNode,
        uses: &mut Vec<AttributeUse>,
        wildcard: &mut Option<Wildcard>,
    ) -> ResolutionResult<()> {
        for child in node.content() {
            match child.kind.as_str() {
                "attribute" => {
                    let required = child.attr("use") == Some("required");
                    let prohibited = child.attr("use") == Some("prohibited");
                    let attribute = self.attribute_use(doc, child, required)?;
                    uses.retain(|existing| existing.name != attribute.name);
                    if !prohibited {
                        uses.push(attribute);
                    }
                }
                "attributeGroup" => {
                    let reference = child
                        .attr("ref")
                        .ok_or_else(|| self.invalid(doc, child, "local xs:attributeGroup without ref"))?;
                    let name = self.qname(doc, child, reference)?;
                    let global = self
                        .attribute_groups
                        .get(&name)
                        .cloned()
                        .ok_or_else(|| self.unresolved(doc, "attributeGroup", &name))?;
                    if self.expanding.contains(&name) {
                        return Err(ResolutionError::CircularDefinition {
                            kind: "attributeGroup",
                            name: name.to_string(),
                        });
                    }
                    self.expanding.push(name);
                    let result = self.collect_attributes(global.doc, global.node, uses, wildcard);
                    self.expanding.pop();
                    result?;
                }
                "anyAttribute" => *wildcard = Some(self.wildcard(doc, child)?),
                _ => {}
            }
        }
        Ok(())
    }

    fn attribute_use(&mut self, doc: usize, node: &'a SchemaNode, required: bool) -> ResolutionResult<AttributeUse> {
        if let Some(reference) = node.attr("ref") {
            let name = self.qname(doc, node, reference)?;
            let decl = self
                .attributes
                .get(&name)
                .ok_or_else(|| self.unresolved(doc, "attribute", &name))?;
            return Ok(AttributeUse {
                name,
                type_id: decl.type_id,
                required,
                default: node.attr("default").map(str::to_string).or_else(|| decl.default.clone()),
                fixed: node.attr("fixed").map(str::to_string).or_else(|| decl.fixed.clone()),
            });
        }

        let local = node
            .attr("name")
            .ok_or_else(|| self.invalid(doc, node, "local xs:attribute without name or ref"))?;
        let document = self.document(doc);
        let qualified = match node.attr("form") {
            Some(form) => form == "qualified",
            None => document.attribute_form_qualified,
        };
        let namespace = if qualified {
            document.effective_namespace.clone()
        } else {
            None
        };
        let type_id = self
            .declared_type(doc, node, "type")?
            .unwrap_or(self.any_simple_type);
        Ok(AttributeUse {
            name: QualifiedName::new(namespace, local),
            type_id,
            required,
            default: node.attr("default").map(str::to_string),
            fixed: node.attr("fixed").map(str::to_string),
        })
    }
}

fn derivation_of(node: &SchemaNode) -> Option<&SchemaNode> {
    node.content()
        .find(|c| c.is("extension") || c.is("restriction"))
}

fn with_occurs(particle: Particle, occurs: Occurs) -> Particle {
    match particle {
        Particle::Term { term, .. } => Particle::Term { term, occurs },
        Particle::Sequence { items, .. } => Particle::Sequence { items, occurs },
        Particle::Choice { items, .. } => Particle::Choice { items, occurs },
        Particle::All { items, .. } => Particle::All { items, occurs },
    }
}

fn finish<T>(slots: Vec<Slot<'_, T>>) -> ResolutionResult<Vec<T>> {
    slots
        .into_iter()
        .map(|slot| match slot {
            Slot::Done(value) => Ok(value),
            Slot::Pending(global) => Err(ResolutionError::CircularDefinition {
                kind: "component",
                name: global.name.to_string(),
            }),
            Slot::InProgress(name) => Err(ResolutionError::CircularDefinition {
                kind: "component",
                name: name.map_or_else(|| "anonymous".to_string(), |n| n.to_string()),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaDocument;
    use crate::xml::NamespaceStack;
    use reqwest::Url;

    const HEADER: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema""#;

    fn compile(documents: &[(&str, &str)]) -> ResolutionResult<CompiledSchema> {
        let mut set = SchemaSet::new();
        for (location, text) in documents {
            let url = Url::parse(location).unwrap();
            set.push(SchemaDocument::parse(&url, text).unwrap());
        }
        CompiledSchema::compile(&set)
    }

    fn compile_one(body: &str) -> CompiledSchema {
        let text = format!("{} targetNamespace=\"urn:t\" xmlns:t=\"urn:t\">{}</xs:schema>", HEADER, body);
        compile(&[("http://example.com/t.xsd", &text)]).unwrap()
    }

    fn name(local: &str) -> QualifiedName {
        QualifiedName::new(Some("urn:t".to_string()), local)
    }

    #[test]
    fn test_simple_type_facets() {
        let schema = compile_one(
            r#"<xs:simpleType name="Code">
                 <xs:restriction base="xs:string">
                   <xs:pattern value="[A-Z]{3}"/>
                   <xs:enumeration value="EUR"/>
                   <xs:enumeration value="USD"/>
                 </xs:restriction>
               </xs:simpleType>
               <xs:simpleType name="Amount">
                 <xs:restriction base="xs:decimal">
                   <xs:minInclusive value="0"/>
                   <xs:fractionDigits value="2"/>
                 </xs:restriction>
               </xs:simpleType>"#,
        );
        let namespaces = NamespaceStack::new();
        let code = schema.global_type(&name("Code")).unwrap();
        assert!(schema.check_value(code, "EUR", &namespaces).is_ok());
        assert_eq!(
            schema.check_value(code, "GBP", &namespaces).unwrap_err().0,
            "The Enumeration constraint failed."
        );
        assert_eq!(
            schema.check_value(code, "eur", &namespaces).unwrap_err().0,
            "The Pattern constraint failed."
        );

        let amount = schema.global_type(&name("Amount")).unwrap();
        assert!(schema.check_value(amount, " 12.50 ", &namespaces).is_ok());
        assert!(schema.check_value(amount, "-1", &namespaces).is_err());
        assert!(schema.check_value(amount, "abc", &namespaces).is_err());
    }

    #[test]
    fn test_extension_appends_content_and_attributes() {
        let schema = compile_one(
            r#"<xs:complexType name="Base">
                 <xs:sequence><xs:element name="a" type="xs:string"/></xs:sequence>
                 <xs:attribute name="id" type="xs:ID" use="required"/>
               </xs:complexType>
               <xs:complexType name="Derived">
                 <xs:complexContent>
                   <xs:extension base="t:Base">
                     <xs:sequence><xs:element name="b" type="xs:string"/></xs:sequence>
                     <xs:attribute name="extra" type="xs:int"/>
                   </xs:extension>
                 </xs:complexContent>
               </xs:complexType>"#,
        );
        let derived = schema.global_type(&name("Derived")).unwrap();
        let TypeDef::Complex(complex) = schema.type_def(derived) else {
            panic!("expected a complex type");
        };
        assert_eq!(complex.attributes.len(), 2);
        assert!(complex.attributes[0].required);
        let ContentType::ElementOnly(ContentModel::Automaton(automaton)) = &complex.content else {
            panic!("expected element-only content");
        };
        assert_eq!(automaton.expected(&automaton.start()).len(), 1);
    }

    #[test]
    fn test_substitution_groups_are_transitive() {
        let schema = compile_one(
            r#"<xs:element name="Shape" type="xs:string" abstract="true"/>
               <xs:element name="Polygon" substitutionGroup="t:Shape"/>
               <xs:element name="Square" substitutionGroup="t:Polygon"/>"#,
        );
        let shape = schema.global_element(&name("Shape")).unwrap();
        let square = schema.global_element(&name("Square")).unwrap();
        assert_eq!(schema.match_element(shape, &name("Square")), Some(square));
        assert!(schema.element(shape).is_abstract);
        // Inherits the head's type
        assert_eq!(schema.element(square).type_id, schema.element(shape).type_id);
    }

    #[test]
    fn test_duplicate_global_definition() {
        let a = format!("{} targetNamespace=\"urn:t\"><xs:element name=\"Invoice\"/></xs:schema>", HEADER);
        let b = format!("{} targetNamespace=\"urn:t\"><xs:element name=\"Invoice\"/></xs:schema>", HEADER);
        let result = compile(&[("http://example.com/a.xsd", &a), ("http://example.com/b.xsd", &b)]);
        assert!(matches!(
            result,
            Err(ResolutionError::DuplicateDefinition { kind: "element", .. })
        ));
    }

    #[test]
    fn test_unresolved_type_reference() {
        let text = format!(
            "{} xmlns:c=\"urn:common\"><xs:element name=\"a\" type=\"c:Missing\"/></xs:schema>",
            HEADER
        );
        let error = compile(&[("http://example.com/a.xsd", &text)]).unwrap_err();
        assert!(matches!(error, ResolutionError::UnresolvedReference { kind: "type", .. }));
        assert!(error.to_string().contains("{urn:common}Missing"));
    }

    #[test]
    fn test_circular_derivation_and_groups() {
        let text = format!(
            r#"{} xmlns:t="urn:t" targetNamespace="urn:t">
                 <xs:simpleType name="A"><xs:restriction base="t:B"/></xs:simpleType>
                 <xs:simpleType name="B"><xs:restriction base="t:A"/></xs:simpleType>
               </xs:schema>"#,
            HEADER
        );
        assert!(matches!(
            compile(&[("http://example.com/a.xsd", &text)]),
            Err(ResolutionError::CircularDefinition { kind: "type", .. })
        ));

        let text = format!(
            r#"{} xmlns:t="urn:t" targetNamespace="urn:t">
                 <xs:group name="G"><xs:sequence><xs:group ref="t:G"/></xs:sequence></xs:group>
                 <xs:complexType name="T"><xs:group ref="t:G"/></xs:complexType>
               </xs:schema>"#,
            HEADER
        );
        assert!(matches!(
            compile(&[("http://example.com/a.xsd", &text)]),
            Err(ResolutionError::CircularDefinition { kind: "group", .. })
        ));
    }

    #[test]
    fn test_identity_constraints_become_notices() {
        let schema = compile_one(
            r#"<xs:element name="Orders">
                 <xs:complexType><xs:sequence/></xs:complexType>
                 <xs:key name="orderKey"><xs:selector xpath="t:Order"/><xs:field xpath="@id"/></xs:key>
               </xs:element>"#,
        );
        assert_eq!(schema.notices().len(), 1);
        assert!(schema.notices()[0].contains("orderKey"));
    }

    #[test]
    fn test_chameleon_include_adopts_namespace() {
        let mut set = SchemaSet::new();
        let root = format!(
            "{} targetNamespace=\"urn:t\" xmlns:t=\"urn:t\"><xs:element name=\"Root\" type=\"t:Part\"/></xs:schema>",
            HEADER
        );
        let part = format!(
            "{}><xs:complexType name=\"Part\"><xs:attribute name=\"kind\" type=\"Kind\"/></xs:complexType><xs:simpleType name=\"Kind\"><xs:restriction base=\"xs:token\"/></xs:simpleType></xs:schema>",
            HEADER
        );
        set.push(SchemaDocument::parse(&Url::parse("http://example.com/root.xsd").unwrap(), &root).unwrap());
        let mut included =
            SchemaDocument::parse(&Url::parse("http://example.com/part.xsd").unwrap(), &part).unwrap();
        included.effective_namespace = Some("urn:t".to_string());
        set.push(included);

        let schema = CompiledSchema::compile(&set).unwrap();
        assert!(schema.global_type(&name("Part")).is_some());
        assert!(schema.global_type(&name("Kind")).is_some());
    }

    #[test]
    fn test_untranslatable_pattern() {
        let text = format!(
            r#"{}><xs:simpleType name="S"><xs:restriction base="xs:string"><xs:pattern value="\p{{IsBasicLatin}}+"/></xs:restriction></xs:simpleType></xs:schema>"#,
            HEADER
        );
        assert!(matches!(
            compile(&[("http://example.com/a.xsd", &text)]),
            Err(ResolutionError::InvalidComponent { .. })
        ));
    }
}
