//! Streaming validation engine
//!
//! The candidate document is pull-parsed with quick-xml and checked against a
//! [`CompiledSchema`] one event at a time; no tree is built. Each open
//! element keeps a frame with its content-model state. Conformance problems
//! are recorded and the walk continues; a well-formedness error stops it and
//! replaces everything gathered so far with a single diagnostic.

use std::collections::HashSet;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tokio_util::sync::CancellationToken;

use crate::diagnostics::{SourceLocation, ValidationDiagnostic};
use crate::error::Cancelled;
use crate::outcome::{ValidationOutcome, classify};
use crate::schema::CompiledSchema;
use crate::schema::automaton::{Automaton, StateSet, Term};
use crate::schema::model::{
    AllGroup, AttributeUse, ContentModel, ContentType, ElementId, IdKind, NamespaceConstraint,
    ProcessContents, TypeDef, TypeId, Wildcard,
};
use crate::xml::{
    LineTracker, NamespaceStack, QualifiedName, XSI_NAMESPACE, is_xml_whitespace, xml_tokens,
};

/// Events between two looks at the cancellation token
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Raw result of one walk, before classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineReport {
    pub well_formed: bool,
    pub diagnostics: Vec<ValidationDiagnostic>,
}

impl EngineReport {
    pub fn into_outcome(self) -> ValidationOutcome {
        classify(self.well_formed, self.diagnostics)
    }
}

/// Validates documents against one compiled schema
///
/// The engine holds no per-document state, so a single instance can be
/// shared by any number of threads.
#[derive(Debug, Clone, Copy)]
pub struct ValidationEngine<'s> {
    schema: &'s CompiledSchema,
}

impl<'s> ValidationEngine<'s> {
    pub fn new(schema: &'s CompiledSchema) -> Self {
        Self { schema }
    }

    /// Walk `text` to the end, or until `cancel` fires
    pub fn validate(&self, text: &str, cancel: &CancellationToken) -> Result<EngineReport, Cancelled> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        Walk::new(self.schema, text).run(cancel)
    }

    /// Like [`validate`](Self::validate) for raw bytes; invalid UTF-8 is malformed
    pub fn validate_bytes(
        &self,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<EngineReport, Cancelled> {
        match decode_document(bytes) {
            Ok(text) => self.validate(text, cancel),
            Err(report) => Ok(report),
        }
    }
}

/// Decode a document as UTF-8, or report it malformed at the first bad byte
pub fn decode_document(bytes: &[u8]) -> Result<&str, EngineReport> {
    std::str::from_utf8(bytes).map_err(|e| {
        let valid = std::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default();
        let location = LineTracker::new(valid).locate(valid.len());
        EngineReport {
            well_formed: false,
            diagnostics: vec![ValidationDiagnostic::error(
                "Invalid character in the given encoding.",
                Some(location),
            )],
        }
    })
}

/// Why a walk stopped early
enum Stop {
    Malformed(ValidationDiagnostic),
    Cancelled,
}

fn malformed(message: impl Into<String>, location: SourceLocation) -> Stop {
    Stop::Malformed(ValidationDiagnostic::error(message, Some(location)))
}

enum ContentState<'s> {
    Empty,
    Simple(TypeId),
    Sequence {
        automaton: &'s Automaton,
        states: StateSet,
        failed: bool,
    },
    All {
        group: &'s AllGroup,
        seen: Vec<bool>,
        failed: bool,
    },
}

struct Typed<'s> {
    decl: ElementId,
    content: ContentState<'s>,
    mixed: bool,
    nil: bool,
    /// Character data of a simple-content element
    text: String,
    has_children: bool,
    has_text: bool,
    text_reported: bool,
}

enum FrameState<'s> {
    /// Not covered by any declaration; content is not checked
    Skip,
    Typed(Typed<'s>),
}

struct Frame<'s> {
    label: String,
    location: SourceLocation,
    state: FrameState<'s>,
}

struct Walk<'s, 't> {
    schema: &'s CompiledSchema,
    reader: Reader<&'t [u8]>,
    lines: LineTracker<'t>,
    namespaces: NamespaceStack,
    frames: Vec<Frame<'s>>,
    diagnostics: Vec<ValidationDiagnostic>,
    ids: HashSet<String>,
    idrefs: Vec<(String, SourceLocation)>,
    seen_root: bool,
}

impl<'s, 't> Walk<'s, 't> {
    fn new(schema: &'s CompiledSchema, text: &'t str) -> Self {
        let diagnostics = schema
            .notices()
            .iter()
            .map(|notice| ValidationDiagnostic::warning(notice.clone(), None))
            .collect();

        Self {
            schema,
            reader: Reader::from_str(text),
            lines: LineTracker::new(text),
            namespaces: NamespaceStack::new(),
            frames: Vec::new(),
            diagnostics,
            ids: HashSet::new(),
            idrefs: Vec::new(),
            seen_root: false,
        }
    }

    fn run(mut self, cancel: &CancellationToken) -> Result<EngineReport, Cancelled> {
        match self.walk(cancel) {
            Ok(()) => {
                self.check_references();
                Ok(EngineReport {
                    well_formed: true,
                    diagnostics: self.diagnostics,
                })
            }
            Err(Stop::Malformed(diagnostic)) => Ok(EngineReport {
                well_formed: false,
                diagnostics: vec![diagnostic],
            }),
            Err(Stop::Cancelled) => Err(Cancelled),
        }
    }

    fn error(&mut self, message: String, location: SourceLocation) {
        self.diagnostics
            .push(ValidationDiagnostic::error(message, Some(location)));
    }

    fn walk(&mut self, cancel: &CancellationToken) -> Result<(), Stop> {
        let mut events: u64 = 0;
        loop {
            if events % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(Stop::Cancelled);
            }
            events += 1;

            let position = self.reader.buffer_position() as usize;
            let event = match self.reader.read_event() {
                Ok(event) => event,
                Err(e) => {
                    let at = self.lines.locate(self.reader.error_position() as usize);
                    return Err(malformed(e.to_string(), at));
                }
            };

            match event {
                Event::Start(start) => self.start_element(&start, position, false)?,
                Event::Empty(start) => self.start_element(&start, position, true)?,
                Event::End(_) => {
                    let location = self.lines.locate(position);
                    self.end_element(location);
                }
                Event::Text(text) => {
                    let location = self.lines.locate(position);
                    let content = text
                        .unescape()
                        .map_err(|e| malformed(e.to_string(), location))?;
                    self.text(&content, location)?;
                }
                Event::CData(data) => {
                    let location = self.lines.locate(position);
                    let content = String::from_utf8_lossy(&data).into_owned();
                    self.text(&content, location)?;
                }
                Event::DocType(_) => {
                    let location = self.lines.locate(position);
                    return Err(malformed(
                        "For security reasons DTD is prohibited in this XML document.",
                        location,
                    ));
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let end = self.lines.locate(usize::MAX);
        if let Some(frame) = self.frames.last() {
            return Err(malformed(
                format!(
                    "Unexpected end of file has occurred. The following elements are not closed: {}.",
                    frame.label
                ),
                end,
            ));
        }
        if !self.seen_root {
            return Err(malformed("Root element is missing.", end));
        }
        Ok(())
    }

    fn start_element(&mut self, start: &BytesStart<'_>, position: usize, empty: bool) -> Result<(), Stop> {
        let location = self.lines.locate(position);
        if self.frames.is_empty() {
            if self.seen_root {
                return Err(malformed("There are multiple root elements.", location));
            }
            self.seen_root = true;
        }

        self.namespaces.push_scope();
        let mut raw_attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| malformed(e.to_string(), location))?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute
                .unescape_value()
                .map_err(|e| malformed(e.to_string(), location))?
                .into_owned();
            if !self.namespaces.declare(&key, &value) {
                raw_attributes.push((key, value));
            }
        }

        let raw_name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let name = self
            .namespaces
            .resolve_element(&raw_name)
            .map_err(|e| malformed(format!("{}.", e), location))?;
        let mut attributes = Vec::with_capacity(raw_attributes.len());
        for (key, value) in raw_attributes {
            let attribute = self
                .namespaces
                .resolve_attribute(&key)
                .map_err(|e| malformed(format!("{}.", e), location))?;
            attributes.push((attribute, value));
        }

        let decl = self.admit(&name, location);
        let frame = self.open(name, decl, &attributes, location);
        self.frames.push(frame);

        if empty {
            self.end_element(location);
        }
        Ok(())
    }

    fn admit_root(&mut self, name: &QualifiedName, location: SourceLocation) -> Option<ElementId> {
        if let Some(decl) = self.schema.global_element(name) {
            return Some(decl);
        }
        if self.schema.describes_namespace(name.namespace.as_deref()) {
            self.error(format!("The '{}' element is not declared.", name.local), location);
        } else {
            self.diagnostics.push(ValidationDiagnostic::warning(
                format!("Could not find schema information for the element '{}'.", name.local),
                Some(location),
            ));
        }
        None
    }

    /// Advance the parent's content model over a new child, returning the
    /// declaration the child is validated against
    fn admit(&mut self, name: &QualifiedName, location: SourceLocation) -> Option<ElementId> {
        let schema = self.schema;
        let Some(parent) = self.frames.last_mut() else {
            return self.admit_root(name, location);
        };
        let FrameState::Typed(typed) = &mut parent.state else {
            return None;
        };
        typed.has_children = true;
        let parent_label = parent.label.as_str();

        let mut problems = Vec::new();
        if typed.nil {
            problems.push(nil_content(parent_label));
        }

        let decl = match &mut typed.content {
            ContentState::Empty => {
                problems.push(format!(
                    "The element '{}' cannot contain child element '{}' because the parent element's content model is empty.",
                    parent_label, name.local
                ));
                None
            }
            ContentState::Simple(_) => {
                problems.push(format!(
                    "The element '{}' cannot contain child element '{}' because the parent element's content model is text only.",
                    parent_label, name.local
                ));
                None
            }
            ContentState::Sequence {
                automaton,
                failed: true,
                ..
            } => local_or_global(schema, automaton.terms(), name),
            ContentState::All {
                group,
                failed: true,
                ..
            } => member_or_global(schema, *group, name),
            ContentState::Sequence {
                automaton,
                states,
                failed,
            } => {
                let automaton: &'s Automaton = *automaton;
                match automaton.step(states, |term| term_matches(schema, term, name)) {
                    Some((next, term)) => {
                        *states = next;
                        match term {
                            Term::Element(expected) => schema.match_element(*expected, name),
                            Term::Wildcard(wildcard) => {
                                admit_wildcard(schema, wildcard, name, &mut problems)
                            }
                        }
                    }
                    None => {
                        *failed = true;
                        problems.push(invalid_child(
                            parent_label,
                            name,
                            &describe_expected(schema, automaton.expected(states)),
                        ));
                        local_or_global(schema, automaton.terms(), name)
                    }
                }
            }
            ContentState::All {
                group,
                seen,
                failed,
            } => {
                let member = group
                    .members
                    .iter()
                    .position(|(member, _)| schema.match_element(*member, name).is_some());
                match member {
                    Some(index) if !seen[index] => {
                        seen[index] = true;
                        schema.match_element(group.members[index].0, name)
                    }
                    _ => {
                        *failed = true;
                        let expected = group
                            .members
                            .iter()
                            .zip(seen.iter())
                            .filter(|(_, seen)| !**seen)
                            .map(|((member, _), _)| schema.element(*member).name.local.clone())
                            .collect::<Vec<_>>()
                            .join(", ");
                        problems.push(invalid_child(parent_label, name, &expected));
                        member_or_global(schema, *group, name)
                    }
                }
            }
        };

        for problem in problems {
            self.error(problem, location);
        }
        decl
    }

    fn open(
        &mut self,
        name: QualifiedName,
        decl: Option<ElementId>,
        attributes: &[(QualifiedName, String)],
        location: SourceLocation,
    ) -> Frame<'s> {
        let schema = self.schema;
        let label = name.local;
        let Some(decl_id) = decl else {
            return Frame {
                label,
                location,
                state: FrameState::Skip,
            };
        };
        let decl = schema.element(decl_id);
        if decl.is_abstract {
            self.error(
                format!("The element '{}' is abstract or its type is abstract.", label),
                location,
            );
        }

        let mut type_id = decl.type_id;
        let mut nil = false;
        for (attribute, value) in attributes {
            if !attribute.in_namespace(Some(XSI_NAMESPACE)) {
                continue;
            }
            match attribute.local.as_str() {
                "type" => {
                    match self
                        .namespaces
                        .resolve_value(value)
                        .ok()
                        .and_then(|qname| schema.global_type(&qname))
                    {
                        Some(derived) => type_id = derived,
                        None => self.error(format!("This is an invalid xsi:type '{}'.", value.trim()), location),
                    }
                }
                "nil" => match value.trim() {
                    "true" | "1" if decl.nillable => nil = true,
                    "true" | "1" => self.error(
                        "If the 'nillable' attribute is false in the schema, the 'xsi:nil' attribute must not be present in the instance.".to_string(),
                        location,
                    ),
                    "false" | "0" => {}
                    other => self.error(
                        format!(
                            "The 'xsi:nil' attribute is invalid - The value '{}' is invalid according to its datatype 'xs:boolean'.",
                            other
                        ),
                        location,
                    ),
                },
                _ => {}
            }
        }
        if nil && decl.fixed.is_some() {
            self.error(
                format!(
                    "There must be no fixed value on element '{}' when 'xsi:nil' is true.",
                    label
                ),
                location,
            );
        }

        self.check_attributes(&label, type_id, attributes, location);

        let (content, mixed) = match schema.type_def(type_id) {
            TypeDef::Simple(_) => (ContentState::Simple(type_id), false),
            TypeDef::Complex(complex) => {
                if complex.is_abstract {
                    self.error(
                        format!("The element '{}' is abstract or its type is abstract.", label),
                        location,
                    );
                }
                match &complex.content {
                    ContentType::Empty => (ContentState::Empty, false),
                    ContentType::Simple(simple) => (ContentState::Simple(*simple), false),
                    ContentType::ElementOnly(model) => (model_state(model), false),
                    ContentType::Mixed(model) => (model_state(model), true),
                }
            }
        };

        Frame {
            label,
            location,
            state: FrameState::Typed(Typed {
                decl: decl_id,
                content,
                mixed,
                nil,
                text: String::new(),
                has_children: false,
                has_text: false,
                text_reported: false,
            }),
        }
    }

    fn check_attributes(
        &mut self,
        element: &str,
        type_id: TypeId,
        attributes: &[(QualifiedName, String)],
        location: SourceLocation,
    ) {
        let schema = self.schema;
        let (uses, wildcard): (&'s [AttributeUse], Option<&'s Wildcard>) = match schema.type_def(type_id) {
            TypeDef::Complex(complex) => (
                complex.attributes.as_slice(),
                complex.attribute_wildcard.as_ref(),
            ),
            TypeDef::Simple(_) => (&[][..], None),
        };
        let mut present = vec![false; uses.len()];

        for (name, value) in attributes {
            if name.in_namespace(Some(XSI_NAMESPACE)) {
                if !matches!(
                    name.local.as_str(),
                    "type" | "nil" | "schemaLocation" | "noNamespaceSchemaLocation"
                ) {
                    self.error(format!("The '{}' attribute is not declared.", name.local), location);
                }
                continue;
            }

            if let Some(index) = uses.iter().position(|u| u.name == *name) {
                present[index] = true;
                let attribute = &uses[index];
                self.check_simple(
                    "attribute",
                    &name.local,
                    attribute.type_id,
                    value,
                    attribute.fixed.as_deref(),
                    location,
                );
                continue;
            }

            match wildcard.filter(|w| w.allows(name)) {
                Some(wildcard) if wildcard.process == ProcessContents::Skip => {}
                Some(wildcard) => match schema.global_attribute(name) {
                    Some(decl) => self.check_simple(
                        "attribute",
                        &name.local,
                        decl.type_id,
                        value,
                        decl.fixed.as_deref(),
                        location,
                    ),
                    None if wildcard.process == ProcessContents::Strict => {
                        self.error(format!("The '{}' attribute is not declared.", name.local), location);
                    }
                    None => {}
                },
                None => {
                    self.error(format!("The '{}' attribute is not declared.", name.local), location);
                }
            }
        }

        for (attribute, present) in uses.iter().zip(present) {
            if attribute.required && !present {
                self.error(
                    format!(
                        "The required attribute '{}' is missing on element '{}'.",
                        attribute.name.local, element
                    ),
                    location,
                );
            }
        }
    }

    /// Check a simple value, its fixed constraint and ID bookkeeping
    fn check_simple(
        &mut self,
        kind: &str,
        label: &str,
        type_id: TypeId,
        raw: &str,
        fixed: Option<&str>,
        location: SourceLocation,
    ) {
        let schema = self.schema;
        if let Err(violation) = schema.check_value(type_id, raw, &self.namespaces) {
            self.error(
                format!(
                    "The '{}' {} is invalid - The value '{}' is invalid according to its datatype '{}' - {}",
                    label,
                    kind,
                    raw,
                    schema.type_name(type_id),
                    violation
                ),
                location,
            );
            return;
        }

        if let Some(fixed) = fixed
            && !schema.values_equal(type_id, raw, fixed)
        {
            self.error(
                format!(
                    "The value of the '{}' {} does not equal its fixed value '{}'.",
                    label, kind, fixed
                ),
                location,
            );
        }

        match schema.id_kind(type_id) {
            Some(IdKind::Id) => {
                let id = schema.normalize(type_id, raw);
                if !self.ids.insert(id.clone()) {
                    self.error(format!("'{}' is already used as an ID.", id), location);
                }
            }
            Some(IdKind::IdRef) => self.idrefs.push((schema.normalize(type_id, raw), location)),
            Some(IdKind::IdRefs) => {
                for token in xml_tokens(raw) {
                    self.idrefs.push((token.to_string(), location));
                }
            }
            None => {}
        }
    }

    fn text(&mut self, content: &str, location: SourceLocation) -> Result<(), Stop> {
        let Some(frame) = self.frames.last_mut() else {
            if !is_xml_whitespace(content) {
                return Err(malformed("Data at the root level is invalid.", location));
            }
            return Ok(());
        };
        let FrameState::Typed(typed) = &mut frame.state else {
            return Ok(());
        };

        let blank = is_xml_whitespace(content);
        if !blank {
            typed.has_text = true;
        }
        if let ContentState::Simple(_) = typed.content {
            typed.text.push_str(content);
            return Ok(());
        }
        if blank || typed.mixed || typed.nil || typed.text_reported {
            return Ok(());
        }

        typed.text_reported = true;
        let message = match &typed.content {
            ContentState::Empty => format!(
                "The element '{}' cannot contain text. Content model is empty.",
                frame.label
            ),
            ContentState::Sequence {
                automaton, states, ..
            } => {
                let expected = describe_expected(self.schema, automaton.expected(states));
                if expected.is_empty() {
                    format!("The element '{}' cannot contain text.", frame.label)
                } else {
                    format!(
                        "The element '{}' cannot contain text. List of possible elements expected: '{}'.",
                        frame.label, expected
                    )
                }
            }
            _ => format!("The element '{}' cannot contain text.", frame.label),
        };
        self.error(message, location);
        Ok(())
    }

    fn end_element(&mut self, location: SourceLocation) {
        if let Some(frame) = self.frames.pop()
            && let FrameState::Typed(typed) = frame.state
        {
            self.close(&frame.label, typed, frame.location, location);
        }
        self.namespaces.pop_scope();
    }

    fn close(&mut self, label: &str, typed: Typed<'s>, start: SourceLocation, end: SourceLocation) {
        let schema = self.schema;
        if typed.nil {
            if typed.has_text {
                self.error(nil_content(label), start);
            }
            return;
        }

        match typed.content {
            ContentState::Empty => {}
            ContentState::Simple(type_id) => {
                let decl = schema.element(typed.decl);
                let text = match (&decl.default, typed.text.is_empty()) {
                    (Some(default), true) => default.clone(),
                    _ => typed.text,
                };
                self.check_simple("element", label, type_id, &text, decl.fixed.as_deref(), start);
            }
            ContentState::Sequence {
                automaton,
                states,
                failed,
            } => {
                if !failed && !automaton.accepts(&states) {
                    let expected = describe_expected(schema, automaton.expected(&states));
                    self.error(incomplete(label, &expected), end);
                }
            }
            ContentState::All {
                group,
                seen,
                failed,
            } => {
                let started = seen.iter().any(|s| *s);
                if failed || (!started && group.optional) {
                    return;
                }
                let missing: Vec<String> = group
                    .members
                    .iter()
                    .zip(seen)
                    .filter(|((_, required), seen)| *required && !seen)
                    .map(|((member, _), _)| schema.element(*member).name.local.clone())
                    .collect();
                if !missing.is_empty() {
                    self.error(incomplete(label, &missing.join(", ")), end);
                }
            }
        }
    }

    fn check_references(&mut self) {
        let dangling: Vec<(String, SourceLocation)> = self
            .idrefs
            .iter()
            .filter(|(id, _)| !self.ids.contains(id))
            .cloned()
            .collect();
        for (id, location) in dangling {
            self.error(format!("Reference to undeclared ID is '{}'.", id), location);
        }
    }
}

fn model_state(model: &ContentModel) -> ContentState<'_> {
    match model {
        ContentModel::Automaton(automaton) => ContentState::Sequence {
            automaton,
            states: automaton.start(),
            failed: false,
        },
        ContentModel::All(group) => ContentState::All {
            group,
            seen: vec![false; group.members.len()],
            failed: false,
        },
    }
}

fn term_matches(schema: &CompiledSchema, term: &Term, name: &QualifiedName) -> bool {
    match term {
        Term::Element(decl) => schema.match_element(*decl, name).is_some(),
        Term::Wildcard(wildcard) => wildcard.allows(name),
    }
}

/// Declaration for a child once its parent's model has failed: a local
/// declaration of the model with that name, else a global one
fn local_or_global(
    schema: &CompiledSchema,
    terms: &[Term],
    name: &QualifiedName,
) -> Option<ElementId> {
    terms
        .iter()
        .find_map(|term| match term {
            Term::Element(decl) => schema.match_element(*decl, name),
            Term::Wildcard(_) => None,
        })
        .or_else(|| schema.global_element(name))
}

fn member_or_global(
    schema: &CompiledSchema,
    group: &AllGroup,
    name: &QualifiedName,
) -> Option<ElementId> {
    group
        .members
        .iter()
        .find_map(|(member, _)| schema.match_element(*member, name))
        .or_else(|| schema.global_element(name))
}

fn admit_wildcard(
    schema: &CompiledSchema,
    wildcard: &Wildcard,
    name: &QualifiedName,
    problems: &mut Vec<String>,
) -> Option<ElementId> {
    match wildcard.process {
        ProcessContents::Skip => None,
        ProcessContents::Lax => schema.global_element(name),
        ProcessContents::Strict => {
            let decl = schema.global_element(name);
            if decl.is_none() {
                problems.push(format!("The '{}' element is not declared.", name.local));
            }
            decl
        }
    }
}

fn describe_expected(schema: &CompiledSchema, terms: Vec<&Term>) -> String {
    let mut names: Vec<String> = Vec::new();
    for term in terms {
        let label = match term {
            Term::Element(decl) => schema.element(*decl).name.local.clone(),
            Term::Wildcard(wildcard) => match &wildcard.namespaces {
                NamespaceConstraint::Only(namespaces) if namespaces.len() == 1 => match &namespaces[0] {
                    Some(ns) => format!("any element in namespace '{}'", ns),
                    None => "any element in no namespace".to_string(),
                },
                _ => "any element".to_string(),
            },
        };
        if !names.contains(&label) {
            names.push(label);
        }
    }
    names.join(", ")
}

fn invalid_child(parent: &str, child: &QualifiedName, expected: &str) -> String {
    if expected.is_empty() {
        format!("The element '{}' has invalid child element '{}'.", parent, child.local)
    } else {
        format!(
            "The element '{}' has invalid child element '{}'. List of possible elements expected: '{}'.",
            parent, child.local, expected
        )
    }
}

fn incomplete(label: &str, expected: &str) -> String {
    format!(
        "The element '{}' has incomplete content. List of possible elements expected: '{}'.",
        label, expected
    )
}

fn nil_content(label: &str) -> String {
    format!(
        "Element '{}' must have no character or element children because 'xsi:nil' is true.",
        label
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;
    use crate::outcome::Classification;
    use crate::schema::{SchemaDocument, SchemaSet};
    use reqwest::Url;

    const INVOICE_XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns="urn:invoice" targetNamespace="urn:invoice" elementFormDefault="qualified">
  <xs:simpleType name="Currency">
    <xs:restriction base="xs:string">
      <xs:enumeration value="EUR"/>
      <xs:enumeration value="USD"/>
    </xs:restriction>
  </xs:simpleType>
  <xs:element name="Invoice">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="Line" maxOccurs="unbounded">
          <xs:complexType>
            <xs:simpleContent>
              <xs:extension base="xs:decimal">
                <xs:attribute name="ref" type="xs:IDREF"/>
              </xs:extension>
            </xs:simpleContent>
          </xs:complexType>
        </xs:element>
        <xs:element name="Currency" type="Currency"/>
        <xs:element name="Note" type="xs:string" minOccurs="0" nillable="true"/>
        <xs:element name="Version" type="xs:string" minOccurs="0" fixed="1.0"/>
      </xs:sequence>
      <xs:attribute name="id" type="xs:ID" use="required"/>
      <xs:attribute name="issued" type="xs:date"/>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

    fn schema(text: &str) -> CompiledSchema {
        let url = Url::parse("http://example.com/invoice.xsd").unwrap();
        let mut set = SchemaSet::new();
        set.push(SchemaDocument::parse(&url, text).unwrap());
        CompiledSchema::compile(&set).unwrap()
    }

    fn check(schema: &CompiledSchema, document: &str) -> ValidationOutcome {
        ValidationEngine::new(schema)
            .validate(document, &CancellationToken::new())
            .unwrap()
            .into_outcome()
    }

    fn messages(outcome: &ValidationOutcome) -> Vec<&str> {
        outcome.diagnostics().iter().map(|d| d.message.as_str()).collect()
    }

    #[test]
    fn test_valid_document() {
        let schema = schema(INVOICE_XSD);
        let outcome = check(
            &schema,
            r#"<?xml version="1.0"?>
<Invoice xmlns="urn:invoice" id="inv-1" issued="2024-02-29">
  <Line ref="inv-1">10.50</Line>
  <Line>2</Line>
  <Currency>EUR</Currency>
  <Note xsi:nil="true" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"/>
  <Version>1.0</Version>
</Invoice>"#,
        );
        assert_eq!(outcome.classification(), Classification::Valid, "{:?}", messages(&outcome));
        assert!(outcome.diagnostics().is_empty());
    }

    #[test]
    fn test_missing_required_attribute() {
        let schema = schema(INVOICE_XSD);
        let outcome = check(
            &schema,
            r#"<Invoice xmlns="urn:invoice"><Line>1</Line><Currency>EUR</Currency></Invoice>"#,
        );
        assert_eq!(outcome.classification(), Classification::Invalid);
        assert_eq!(outcome.error_count(), 1);
        assert!(messages(&outcome)[0].contains("required attribute 'id'"));
        let location = outcome.diagnostics()[0].location.unwrap();
        assert_eq!((location.line, location.column), (1, 1));
    }

    #[test]
    fn test_all_errors_are_reported() {
        let schema = schema(INVOICE_XSD);
        let outcome = check(
            &schema,
            r#"<Invoice xmlns="urn:invoice" id="a" issued="2023-02-29">
  <Line>abc</Line>
  <Currency>GBP</Currency>
  <Version>2.0</Version>
</Invoice>"#,
        );
        assert_eq!(outcome.classification(), Classification::Invalid);
        let messages = messages(&outcome);
        assert_eq!(messages.len(), 4, "{:?}", messages);
        assert!(messages[0].starts_with("The 'issued' attribute is invalid"));
        assert!(messages[1].contains("The value 'abc' is invalid according to its datatype 'xs:decimal'"));
        assert!(messages[2].ends_with("The Enumeration constraint failed."));
        assert!(messages[3].contains("does not equal its fixed value"));
        assert_eq!(outcome.diagnostics()[2].location.unwrap().line, 3);
    }

    #[test]
    fn test_content_model_violations() {
        let schema = schema(INVOICE_XSD);
        let outcome = check(
            &schema,
            r#"<Invoice xmlns="urn:invoice" id="a"><Currency>EUR</Currency></Invoice>"#,
        );
        assert_eq!(
            messages(&outcome),
            vec![
                "The element 'Invoice' has invalid child element 'Currency'. List of possible elements expected: 'Line'."
            ]
        );

        let outcome = check(&schema, r#"<Invoice xmlns="urn:invoice" id="a"><Line>1</Line></Invoice>"#);
        assert_eq!(
            messages(&outcome),
            vec![
                "The element 'Invoice' has incomplete content. List of possible elements expected: 'Line, Currency'."
            ]
        );
    }

    #[test]
    fn test_large_single_line_document() {
        let schema = schema(INVOICE_XSD);
        let document = format!(
            r#"<Invoice xmlns="urn:invoice" id="a">{}<Currency>GBP</Currency></Invoice>"#,
            "<Line>1</Line>".repeat(100_000)
        );
        let outcome = check(&schema, &document);
        assert_eq!(outcome.error_count(), 1);
        let location = outcome.diagnostics()[0].location.unwrap();
        assert_eq!(location.line, 1);
        assert!(location.column > 1_400_000, "{:?}", location);
    }

    #[test]
    fn test_siblings_after_invalid_child_are_still_checked() {
        let schema = schema(INVOICE_XSD);
        let outcome = check(
            &schema,
            r#"<Invoice xmlns="urn:invoice" id="a"><Bogus/><Line>abc</Line><Currency>GBP</Currency></Invoice>"#,
        );
        let messages = messages(&outcome);
        assert_eq!(messages.len(), 3, "{:?}", messages);
        assert!(messages[0].contains("invalid child element 'Bogus'"));
        assert!(messages[1].contains("The value 'abc' is invalid according to its datatype 'xs:decimal'"));
        assert!(messages[2].ends_with("The Enumeration constraint failed."));
    }

    #[test]
    fn test_malformed_document_reports_only_syntax() {
        let schema = schema(INVOICE_XSD);
        let report = ValidationEngine::new(&schema)
            .validate(
                "<Invoice xmlns=\"urn:invoice\">\n  <Currency>GBP</Currency>\n</Invoic>",
                &CancellationToken::new(),
            )
            .unwrap();
        assert!(!report.well_formed);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].location.unwrap().line, 3);
        assert_eq!(report.into_outcome().classification(), Classification::Malformed);
    }

    #[test]
    fn test_well_formedness_failures() {
        let schema = schema(INVOICE_XSD);
        for document in [
            "",
            "<Invoice xmlns=\"urn:invoice\" id=\"a\">",
            "<a/><b/>",
            "<a x=\"1\" x=\"2\"/>",
            "<p:a/>",
            "<a>&bogus;</a>",
            "text<a/>",
            "<!DOCTYPE a [<!ENTITY x \"y\">]><a/>",
        ] {
            let report = ValidationEngine::new(&schema)
                .validate(document, &CancellationToken::new())
                .unwrap();
            assert!(!report.well_formed, "{:?} should be malformed", document);
            assert_eq!(report.diagnostics.len(), 1);
        }
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let schema = schema(INVOICE_XSD);
        let report = ValidationEngine::new(&schema)
            .validate_bytes(b"<a>\xff</a>", &CancellationToken::new())
            .unwrap();
        assert!(!report.well_formed);
    }

    #[test]
    fn test_unknown_root_namespace_is_a_warning() {
        let schema = schema(INVOICE_XSD);
        let outcome = check(&schema, r#"<Order xmlns="urn:orders"><Anything/></Order>"#);
        assert_eq!(outcome.classification(), Classification::Valid);
        assert_eq!(outcome.diagnostics()[0].severity, Severity::Warning);
        assert!(messages(&outcome)[0].contains("Could not find schema information for the element 'Order'"));

        let outcome = check(&schema, r#"<Order xmlns="urn:invoice"/>"#);
        assert_eq!(outcome.classification(), Classification::Invalid);
    }

    #[test]
    fn test_identity_tables() {
        let schema = schema(INVOICE_XSD);
        let outcome = check(
            &schema,
            r#"<Invoice xmlns="urn:invoice" id="a"><Line ref="missing">1</Line><Currency>EUR</Currency></Invoice>"#,
        );
        assert_eq!(
            messages(&outcome),
            vec!["Reference to undeclared ID is 'missing'."]
        );
    }

    #[test]
    fn test_nil_rules() {
        let schema = schema(INVOICE_XSD);
        let outcome = check(
            &schema,
            r#"<Invoice xmlns="urn:invoice" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" id="a">
  <Line xsi:nil="true">1</Line><Currency>EUR</Currency><Note xsi:nil="true">text</Note>
</Invoice>"#,
        );
        let messages = messages(&outcome);
        assert_eq!(messages.len(), 2, "{:?}", messages);
        assert!(messages[0].contains("'nillable' attribute is false"));
        assert!(messages[1].contains("because 'xsi:nil' is true"));
    }

    #[test]
    fn test_all_group_and_wildcards() {
        let schema = schema(
            r###"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="Person">
    <xs:complexType>
      <xs:all>
        <xs:element name="first" type="xs:string"/>
        <xs:element name="last" type="xs:string"/>
        <xs:element name="middle" type="xs:string" minOccurs="0"/>
      </xs:all>
    </xs:complexType>
  </xs:element>
  <xs:element name="Envelope">
    <xs:complexType>
      <xs:sequence>
        <xs:any namespace="##other" processContents="skip" maxOccurs="unbounded"/>
      </xs:sequence>
      <xs:anyAttribute processContents="skip"/>
    </xs:complexType>
  </xs:element>
</xs:schema>"###,
        );
        assert!(check(&schema, "<Person><last>B</last><first>A</first></Person>").is_valid());
        let outcome = check(&schema, "<Person><first>A</first><first>B</first></Person>");
        assert!(messages(&outcome)[0].contains("invalid child element 'first'"));
        let outcome = check(&schema, "<Person><middle>M</middle></Person>");
        assert!(messages(&outcome)[0].contains("incomplete content"));

        assert!(check(&schema, r#"<Envelope any="1"><x:Body xmlns:x="urn:x"><free/></x:Body></Envelope>"#).is_valid());
        let outcome = check(&schema, "<Envelope><Local/></Envelope>");
        assert_eq!(outcome.classification(), Classification::Invalid);
    }

    #[test]
    fn test_schema_notices_are_warnings() {
        let schema = schema(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="Root">
    <xs:complexType><xs:attribute name="id" type="xs:string"/></xs:complexType>
    <xs:unique name="u"><xs:selector xpath="."/><xs:field xpath="@id"/></xs:unique>
  </xs:element>
</xs:schema>"#,
        );
        let outcome = check(&schema, r#"<Root id="x"/>"#);
        assert_eq!(outcome.classification(), Classification::Valid);
        assert_eq!(outcome.warning_count(), 1);
    }

    #[test]
    fn test_cancelled_walk_has_no_report() {
        let schema = schema(INVOICE_XSD);
        let token = CancellationToken::new();
        token.cancel();
        let result = ValidationEngine::new(&schema).validate("<Invoice/>", &token);
        assert_eq!(result, Err(Cancelled));
    }
}
