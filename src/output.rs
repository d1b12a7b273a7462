//! Report formatting for the `check` command

use std::time::Duration;

use serde::Serialize;

use crate::cli::{OutputFormat, VerbosityLevel};
use crate::diagnostics::Severity;
use crate::error::ServiceError;
use crate::outcome::{Classification, ValidationOutcome};

/// What happened to one document
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DocumentResult {
    Verdict(ValidationOutcome),
    Failure { kind: String, error: String },
}

impl DocumentResult {
    pub fn from_result(result: Result<ValidationOutcome, ServiceError>) -> Self {
        match result {
            Ok(outcome) => DocumentResult::Verdict(outcome),
            Err(error) => DocumentResult::Failure {
                kind: error.kind().to_string(),
                error: error.to_string(),
            },
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, DocumentResult::Verdict(outcome) if outcome.is_valid())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    pub document: String,
    pub duration_ms: u64,
    #[serde(flatten)]
    pub result: DocumentResult,
}

impl DocumentReport {
    pub fn new(document: impl Into<String>, duration: Duration, result: DocumentResult) -> Self {
        Self {
            document: document.into(),
            duration_ms: duration.as_millis() as u64,
            result,
        }
    }
}

/// Results of one `check` run
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    pub schema: String,
    pub documents: Vec<DocumentReport>,
    pub duration_ms: u64,
}

impl CheckReport {
    fn count(&self, classification: Classification) -> usize {
        self.documents
            .iter()
            .filter(|report| {
                matches!(&report.result, DocumentResult::Verdict(outcome)
                    if outcome.classification() == classification)
            })
            .count()
    }

    pub fn valid_count(&self) -> usize {
        self.count(Classification::Valid)
    }

    pub fn invalid_count(&self) -> usize {
        self.count(Classification::Invalid)
    }

    pub fn malformed_count(&self) -> usize {
        self.count(Classification::Malformed)
    }

    pub fn failure_count(&self) -> usize {
        self.documents
            .iter()
            .filter(|report| matches!(report.result, DocumentResult::Failure { .. }))
            .count()
    }

    /// 0 when every document is valid, 2 on any load or resolution failure,
    /// otherwise 1
    pub fn exit_code(&self) -> i32 {
        if self.failure_count() > 0 {
            2
        } else if self.documents.iter().all(|report| report.result.is_valid()) {
            0
        } else {
            1
        }
    }
}

/// Output formatter for `check` results
pub struct Output {
    format: OutputFormat,
    verbosity: VerbosityLevel,
    show_colors: bool,
}

impl Output {
    pub fn new(format: OutputFormat, verbosity: VerbosityLevel) -> Self {
        Self {
            format,
            verbosity,
            show_colors: format == OutputFormat::Human && atty::is(atty::Stream::Stdout),
        }
    }

    pub fn without_colors(mut self) -> Self {
        self.show_colors = false;
        self
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    pub fn format_report(&self, report: &CheckReport) -> serde_json::Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report),
            OutputFormat::Summary => Ok(self.format_summary(report)),
            OutputFormat::Human => {
                let mut output = String::new();
                for document in &report.documents {
                    if self.verbosity == VerbosityLevel::Quiet && document.result.is_valid() {
                        continue;
                    }
                    output.push_str(&self.format_document(document));
                    output.push('\n');
                }
                if self.verbosity != VerbosityLevel::Quiet {
                    output.push('\n');
                    output.push_str(&self.format_summary(report));
                }
                Ok(output)
            }
        }
    }

    pub fn format_document(&self, report: &DocumentReport) -> String {
        let duration_str = format_duration(Duration::from_millis(report.duration_ms));

        match &report.result {
            DocumentResult::Verdict(outcome) => {
                let (marker, color) = match outcome.classification() {
                    Classification::Valid => ("✓ VALID", "32"),
                    Classification::Invalid => ("✗ INVALID", "31"),
                    Classification::Malformed => ("✗ MALFORMED", "35"),
                };
                let mut output = format!(
                    "{}  {} ({})",
                    self.colorize(marker, color),
                    report.document,
                    duration_str
                );

                let errors = outcome.error_count();
                if errors > 0 {
                    output.push_str(&format!(
                        " - {} error{}",
                        errors,
                        if errors == 1 { "" } else { "s" }
                    ));
                }

                if self.verbosity != VerbosityLevel::Quiet {
                    for diagnostic in outcome.diagnostics() {
                        if diagnostic.severity == Severity::Warning
                            && self.verbosity < VerbosityLevel::Verbose
                        {
                            continue;
                        }
                        output.push_str(&format!("\n    {}", diagnostic));
                    }
                }
                output
            }
            DocumentResult::Failure { error, .. } => {
                format!(
                    "{}  {} ({}) - {}",
                    self.colorize("⚠ ERROR", "33"),
                    report.document,
                    duration_str,
                    error
                )
            }
        }
    }

    fn format_summary(&self, report: &CheckReport) -> String {
        let mut output = String::new();
        output.push_str("Validation Summary:\n");
        output.push_str(&format!("  Schema: {}\n", report.schema));
        output.push_str(&format!("  Total documents: {}\n", report.documents.len()));
        output.push_str(&format!(
            "  {} {}\n",
            self.colorize("Valid:", "32"),
            report.valid_count()
        ));

        if report.invalid_count() > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Invalid:", "31"),
                report.invalid_count()
            ));
        }
        if report.malformed_count() > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Malformed:", "35"),
                report.malformed_count()
            ));
        }
        if report.failure_count() > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Errors:", "33"),
                report.failure_count()
            ));
        }

        output.push_str(&format!(
            "  Duration: {}\n",
            format_duration(Duration::from_millis(report.duration_ms))
        ));
        output
    }
}

fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs_f64();
    if total_secs < 1.0 {
        format!("{:.0}ms", duration.as_millis())
    } else if total_secs < 60.0 {
        format!("{:.2}s", total_secs)
    } else {
        let mins = (total_secs / 60.0) as u64;
        let secs = total_secs % 60.0;
        format!("{}m{:.1}s", mins, secs)
    }
}
