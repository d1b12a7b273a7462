//! Outcome classification
//!
//! Maps the engine's structured report to the terminal verdict of a request.
//! Malformed and schema-invalid documents are kept apart as plain data, never
//! as competing error types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diagnostics::ValidationDiagnostic;

/// Verdict for one validated document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Classification {
    /// The document could not be parsed as XML
    Malformed,
    /// Parsed, but at least one schema error was raised
    Invalid,
    /// Parsed with no schema errors (warnings allowed)
    Valid,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Malformed => f.write_str("MALFORMED"),
            Classification::Invalid => f.write_str("INVALID"),
            Classification::Valid => f.write_str("VALID"),
        }
    }
}

/// Terminal, immutable result of one validation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    classification: Classification,
    diagnostics: Vec<ValidationDiagnostic>,
}

impl ValidationOutcome {
    pub fn classification(&self) -> Classification {
        self.classification
    }

    /// Every diagnostic gathered, in document order
    pub fn diagnostics(&self) -> &[ValidationDiagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<ValidationDiagnostic> {
        self.diagnostics
    }

    pub fn is_valid(&self) -> bool {
        self.classification == Classification::Valid
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationDiagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics.len() - self.error_count()
    }
}

/// Classify an engine report; diagnostics pass through unchanged
pub fn classify(well_formed: bool, diagnostics: Vec<ValidationDiagnostic>) -> ValidationOutcome {
    let classification = if !well_formed {
        Classification::Malformed
    } else if diagnostics.iter().any(ValidationDiagnostic::is_error) {
        Classification::Invalid
    } else {
        Classification::Valid
    };

    ValidationOutcome {
        classification,
        diagnostics,
    }
}
