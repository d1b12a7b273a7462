use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use xml_validator::cli::{CheckArgs, Cli, Command, OutputFormat, VerbosityLevel};
use xml_validator::config::{Config, ConfigManager, LoggingConfig};
use xml_validator::output::Output;
use xml_validator::{XmlValidationService, check, server};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse_args();

    let config = ConfigManager::load_config(&cli)
        .await
        .context("Failed to load configuration")?;
    init_tracing(&config.logging);

    match &cli.command {
        Command::Serve(_) => {
            serve(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Check(args) => run_check(config, args).await,
    }
}

/// Logs go to stderr so `check` output stays parseable
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.filter.as_str()));

    let (plain, json) = if logging.json {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            ),
        )
    } else {
        (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .init();
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let service = XmlValidationService::from_config(&config)
        .context("Failed to create validation service")?;
    let router = server::router(Arc::new(service), config.server.max_body_bytes);

    let addr = ConfigManager::get_bind_address(&config);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    server::serve(listener, router, async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
        }
    })
    .await
    .context("Server error")?;

    Ok(())
}

async fn run_check(config: Config, args: &CheckArgs) -> anyhow::Result<ExitCode> {
    let service = XmlValidationService::from_config(&config)
        .context("Failed to create validation service")?;

    let report = check::check_documents(&service, &args.schema, &args.documents).await?;

    let format = OutputFormat::from(config.output.format.clone());
    let output = Output::new(format, VerbosityLevel::from_config(&config));
    print!("{}", output.format_report(&report)?);
    if format == OutputFormat::Json {
        println!();
    }

    Ok(ExitCode::from(report.exit_code() as u8))
}
