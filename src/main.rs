//! caseledger command-line entry point.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use caseledger::cases::export::{CaseBundle, ExportFormat, ExportOptions, export_case};
use caseledger::cases::verify::DEFAULT_IMPORT_SAMPLE;
use caseledger::cases::{load_case_bundle, verify_import, verify_schema};
use caseledger::config::{CasesConfig, Config};
use caseledger::settings::Settings;
use caseledger::web::{GatewayState, start_server};

#[derive(Debug, Parser)]
#[command(name = "caseledger", version, about = "Legal case-management backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP API.
    Serve {
        /// Override GATEWAY_HOST.
        #[arg(long)]
        host: Option<IpAddr>,
        /// Override GATEWAY_PORT.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Read-only checks against the configured database.
    Verify {
        #[command(subcommand)]
        check: VerifyCommand,
    },
    /// Export one case as CSV tables or a JSON document.
    Export {
        /// Case number to load from the database.
        #[arg(required_unless_present = "input", conflicts_with = "input")]
        case_number: Option<String>,
        /// Format a previously fetched bundle (JSON) instead of querying the database.
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "json")]
        format: ExportFormat,
        /// Directory the export files are written to.
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum VerifyCommand {
    /// Check that the cases table exposes every required column.
    Schema,
    /// Report the case count and the most recently created cases.
    Import {
        #[arg(long, default_value_t = DEFAULT_IMPORT_SAMPLE)]
        sample: usize,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "caseledger=info,tower_http=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Command::Serve { host, port } => serve(host, port).await,
        Command::Verify { check } => verify(check).await,
        Command::Export {
            case_number,
            input,
            format,
            out,
        } => export(case_number, input, format, &out).await,
    }
}

async fn serve(host: Option<IpAddr>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = Config::from_env().context("failed to load configuration")?;
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }

    tracing::info!(
        backend = config.database.backend.as_str(),
        target = %config.database.display_target(),
        "Connecting to database"
    );
    let store = caseledger::db::connect_from_config(&config.database).await?;

    let state = Arc::new(GatewayState::new(store, config.cases.clone()));
    let addr = start_server(config.gateway.socket_addr(), state.clone()).await?;
    println!("caseledger listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    state.shutdown().await;
    Ok(())
}

async fn verify(check: VerifyCommand) -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    let store = caseledger::db::open_from_config(&config.database).await?;

    match check {
        VerifyCommand::Schema => {
            let report = verify_schema(store.as_ref()).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.ok {
                anyhow::bail!(
                    "case schema is incomplete (missing: {})",
                    report.missing_columns.join(", ")
                );
            }
        }
        VerifyCommand::Import { sample } => {
            let report = verify_import(store.as_ref(), sample).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

async fn export(
    case_number: Option<String>,
    input: Option<PathBuf>,
    format: ExportFormat,
    out: &Path,
) -> anyhow::Result<()> {
    let (bundle, cases) = match (input, case_number) {
        (Some(path), _) => {
            let _ = dotenvy::dotenv();
            let cases = CasesConfig::resolve(&Settings::load()?)?;
            let raw = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let bundle: CaseBundle = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a case bundle", path.display()))?;
            (bundle, cases)
        }
        (None, Some(case_number)) => {
            let config = Config::from_env().context("failed to load configuration")?;
            let store = caseledger::db::connect_from_config(&config.database).await?;
            let bundle = load_case_bundle(store.as_ref(), &case_number).await?;
            (bundle, config.cases)
        }
        (None, None) => anyhow::bail!("either a case number or --input is required"),
    };

    let output = export_case(&bundle, format, &ExportOptions::new(cases.export_source))?;

    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("failed to create {}", out.display()))?;
    for file in output.into_files() {
        let path = out.join(&file.filename);
        tokio::fs::write(&path, file.content.as_bytes())
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("{}", path.display());
    }
    Ok(())
}
