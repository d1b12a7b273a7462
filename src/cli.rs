use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::Config;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only show failures
    Quiet,
    /// Show one line per document
    #[default]
    Normal,
    /// Show every diagnostic, warnings included
    Verbose,
}

impl VerbosityLevel {
    pub fn from_config(config: &Config) -> Self {
        if config.output.quiet {
            VerbosityLevel::Quiet
        } else if config.output.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}

/// Report format for `check`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Colored text for terminals
    Human,
    /// One JSON document with every result
    Json,
    /// Counts only
    Summary,
}

/// XML Schema validation service
#[derive(Parser, Debug, Clone)]
#[command(name = "xml-validator")]
#[command(about = "Validate XML documents against XSD schema sets")]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP validation service
    Serve(ServeArgs),
    /// Validate local files or URLs and exit
    Check(CheckArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long = "host")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Timeout for each document or schema fetch in seconds
    #[arg(long = "timeout")]
    pub timeout: Option<u64>,

    /// Serve file:// URLs from the local filesystem
    #[arg(long = "allow-file-urls")]
    pub allow_file_urls: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Root schema as a URL or local path
    #[arg(short = 's', long = "schema")]
    pub schema: String,

    /// Documents to validate, as URLs or local paths
    #[arg(required = true)]
    pub documents: Vec<String>,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum)]
    pub format: Option<OutputFormat>,

    /// Timeout for each document or schema fetch in seconds
    #[arg(long = "timeout")]
    pub timeout: Option<u64>,

    /// Show every diagnostic, warnings included
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Only report documents that are not valid
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_parsing() {
        let cli = Cli::try_parse_from(["xml-validator", "serve", "--host", "0.0.0.0", "-p", "80"])
            .unwrap();
        match cli.command {
            Command::Serve(args) => {
                assert_eq!(args.host.as_deref(), Some("0.0.0.0"));
                assert_eq!(args.port, Some(80));
                assert_eq!(args.timeout, None);
                assert!(!args.allow_file_urls);
            }
            other => panic!("Expected serve, got {:?}", other),
        }
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_check_parsing() {
        let cli = Cli::try_parse_from([
            "xml-validator",
            "check",
            "--schema",
            "https://example.com/root.xsd",
            "a.xml",
            "b.xml",
            "--format",
            "summary",
            "--config",
            "custom.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        match cli.command {
            Command::Check(args) => {
                assert_eq!(args.schema, "https://example.com/root.xsd");
                assert_eq!(args.documents, vec!["a.xml", "b.xml"]);
                assert_eq!(args.format, Some(OutputFormat::Summary));
            }
            other => panic!("Expected check, got {:?}", other),
        }
    }

    #[test]
    fn test_check_requires_documents_and_schema() {
        assert!(Cli::try_parse_from(["xml-validator", "check", "--schema", "a.xsd"]).is_err());
        assert!(Cli::try_parse_from(["xml-validator", "check", "a.xml"]).is_err());
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        let result = Cli::try_parse_from([
            "xml-validator",
            "check",
            "-s",
            "a.xsd",
            "-v",
            "-q",
            "a.xml",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_verbosity_from_config() {
        let mut config = Config::default();
        assert_eq!(VerbosityLevel::from_config(&config), VerbosityLevel::Normal);
        config.output.verbose = true;
        assert_eq!(VerbosityLevel::from_config(&config), VerbosityLevel::Verbose);
        config.output.quiet = true;
        assert_eq!(VerbosityLevel::from_config(&config), VerbosityLevel::Quiet);
    }
}
