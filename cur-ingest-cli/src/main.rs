/*!
Binary entry point: argument parsing, layered configuration, backend
registration, and the four subcommands from spec.md §6. This crate is
glue only — all orchestration logic lives in `cur_ingest`.
*/

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use cur_ingest::{
    orchestrator::{self, CancellationToken, SourceConfig, Strategy},
    registry::BackendRegistry,
    reader::FileFormat,
    store::{AwsCredentials, AzureCredentials, Credentials},
    BillingPeriod, Error as IngestError, ExportName, FormatVersion, Vendor,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "cur-ingest", about = "Ingest AWS CUR / Azure Cost Export data into an analytical warehouse")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short = 'c', long, default_value = "config.toml")]
    config: PathBuf,

    /// `sql` or `http`
    #[arg(long)]
    backend: Option<String>,

    /// `aws` or `azure`
    #[arg(long)]
    vendor: Option<String>,

    /// Source bucket or container
    #[arg(long)]
    bucket: Option<String>,

    /// Path prefix (AWS) or directory (Azure)
    #[arg(long)]
    prefix: Option<String>,

    /// Caller-supplied logical export name
    #[arg(long)]
    export_name: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the orchestrator: discover, skip-or-load, write, refresh the unified view
    Import {
        /// Manifest schema version: v1 or v2 (AWS only)
        #[arg(long)]
        format: Option<String>,
        /// Inclusive start month, YYYY-MM
        #[arg(long)]
        start: Option<String>,
        /// Inclusive end month, YYYY-MM
        #[arg(long)]
        end: Option<String>,
        /// Force reload regardless of recorded state
        #[arg(long)]
        reset: bool,
        /// separate (default) or single
        #[arg(long)]
        strategy: Option<String>,
        /// csv, parquet, or auto
        #[arg(long)]
        export_format: Option<String>,
        /// Azure only: whether the export is partitioned
        #[arg(long)]
        azure_partitioned: bool,
        /// Collect per-manifest errors and continue instead of aborting on the first
        #[arg(long)]
        continue_on_error: bool,
    },
    /// List discovered manifests for the configured export, without loading
    ListManifests {
        #[arg(long)]
        format: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        azure_partitioned: bool,
    },
    /// Print the current-version table, or a single period's version history
    ShowState {
        /// YYYY-MM; when given, prints full load history for that month instead
        #[arg(long)]
        billing_period: Option<String>,
    },
    /// Enumerate exports known to the state store and their current tables
    ListExports,
}

#[tokio::main]
async fn main() -> ExitCode {
    install_logging();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::from(0),
        Err(CliError::Config(err)) => {
            error!(error = %err, "configuration invalid");
            ExitCode::from(2)
        }
        Err(CliError::Load(err)) => {
            error!(error = %err, "run failed");
            ExitCode::from(1)
        }
    }
}

fn install_logging() {
    let filter = EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}

enum CliError {
    Config(IngestError),
    Load(IngestError),
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = Config::from_file(&cli.config).map_err(CliError::Config)?;
    config.apply_env();
    config.apply_overlay(Config {
        backend: cli.backend.clone(),
        vendor: cli.vendor.clone(),
        bucket: cli.bucket.clone(),
        prefix: cli.prefix.clone(),
        export_name: cli.export_name.clone(),
        ..Config::default()
    });

    match &cli.command {
        Commands::Import {
            format,
            start,
            end,
            reset,
            strategy,
            export_format,
            azure_partitioned,
            continue_on_error,
        } => {
            let mut config = config;
            config.apply_overlay(Config {
                format_version: format.clone(),
                start_date: start.clone(),
                end_date: end.clone(),
                reset: Some(*reset),
                strategy: strategy.clone(),
                export_format: export_format.clone(),
                azure_partitioned: Some(*azure_partitioned),
                continue_on_error: Some(*continue_on_error),
                ..Config::default()
            });
            run_import(config).await
        }
        Commands::ListManifests { format, start, end, azure_partitioned } => {
            let mut config = config;
            config.apply_overlay(Config {
                format_version: format.clone(),
                start_date: start.clone(),
                end_date: end.clone(),
                azure_partitioned: Some(*azure_partitioned),
                ..Config::default()
            });
            run_list_manifests(config).await
        }
        Commands::ShowState { billing_period } => run_show_state(config, billing_period.clone()).await,
        Commands::ListExports => run_list_exports(config).await,
    }
}

/// Parse the subset of `Config` needed to build a `SourceConfig`, and
/// build the backend it names. Shared by every subcommand.
fn build_source(config: &Config) -> Result<SourceConfig, IngestError> {
    config.validate().map_err(config_err)?;

    let vendor: Vendor = config
        .vendor
        .as_deref()
        .expect("validated")
        .parse()
        .map_err(config_err)?;

    let export_name = ExportName::parse(config.export_name.as_deref().expect("validated").to_string())
        .map_err(config_err)?;

    let format_version = match config.format_version.as_deref() {
        Some(raw) => FormatVersion::from_str(raw).map_err(config_err)?,
        None => FormatVersion::V1,
    };

    let start = config
        .start_date
        .as_deref()
        .map(BillingPeriod::parse)
        .transpose()
        .map_err(config_err)?;
    let end = config
        .end_date
        .as_deref()
        .map(BillingPeriod::parse)
        .transpose()
        .map_err(config_err)?;

    let strategy = match config.strategy.as_deref() {
        Some("single") => Strategy::Single,
        Some("separate") | None => Strategy::Separate,
        Some(other) => {
            return Err(IngestError::ConfigInvalid(format!(
                "strategy must be 'separate' or 'single', got '{other}'"
            )))
        }
    };

    let export_format = match config.export_format.as_deref() {
        Some("csv") => Some(FileFormat::Csv),
        Some("parquet") => Some(FileFormat::Parquet),
        Some("auto") | None => None,
        Some(other) => {
            return Err(IngestError::ConfigInvalid(format!(
                "export_format must be 'csv', 'parquet', or 'auto', got '{other}'"
            )))
        }
    };

    let credentials = match vendor {
        Vendor::Aws => Credentials::Aws(AwsCredentials {
            access_key_id: config.aws.access_key_id.clone(),
            secret_access_key: config.aws.secret_access_key.clone(),
            session_token: config.aws.session_token.clone(),
            region: config.aws.region.clone(),
        }),
        Vendor::Azure => Credentials::Azure(AzureCredentials {
            account: config.azure.account.clone(),
            access_key: config.azure.access_key.clone(),
            connection_string: config.azure.connection_string.clone(),
        }),
    };

    Ok(SourceConfig {
        vendor,
        bucket: config.bucket.clone().expect("validated"),
        prefix: config.prefix.clone().expect("validated"),
        export_name,
        format_version,
        start,
        end,
        reset: config.reset.unwrap_or(false),
        azure_partitioned: config.azure_partitioned.unwrap_or(false),
        strategy,
        export_format,
        credentials,
    })
}

fn build_backend(config: &Config) -> Result<Arc<dyn cur_ingest::Backend>, IngestError> {
    let mut registry = BackendRegistry::new();
    registry.register("sql", ingest_sql_backend::backend::factory());
    registry.register("http", ingest_http_backend::backend::factory());

    let backend_name = config.backend.as_deref().expect("validated");
    let mut backend_config = cur_ingest::registry::BackendConfig::new();
    match backend_name {
        "sql" => {
            if let Some(url) = &config.sql.url {
                backend_config.insert("url".to_string(), url.clone());
            }
        }
        "http" => {
            if let Some(url) = &config.http.url {
                backend_config.insert("url".to_string(), url.clone());
            }
            if let Some(database) = &config.http.database {
                backend_config.insert("database".to_string(), database.clone());
            }
            if let Some(user) = &config.http.user {
                backend_config.insert("user".to_string(), user.clone());
            }
            if let Some(password) = &config.http.password {
                backend_config.insert("password".to_string(), password.clone());
            }
        }
        _ => {}
    }

    registry.create(backend_name, &backend_config)
}

fn config_err<E: std::fmt::Display>(err: E) -> IngestError {
    IngestError::ConfigInvalid(err.to_string())
}

async fn run_import(config: Config) -> Result<(), CliError> {
    let source = build_source(&config).map_err(CliError::Config)?;
    let backend = build_backend(&config).map_err(CliError::Config)?;
    let continue_on_error = config.continue_on_error.unwrap_or(false);

    info!(
        vendor = %source.vendor,
        export = %source.export_name,
        backend = backend.name(),
        "starting import"
    );

    let cancellation = CancellationToken::new();
    let ctrl_c_token = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("cancellation requested, finishing current manifest then stopping");
            ctrl_c_token.cancel();
        }
    });

    let summary = orchestrator::run(backend, &source, &cancellation, continue_on_error)
        .await
        .map_err(CliError::Load)?;

    for (table, rows) in &summary.loaded {
        println!("loaded {table}: {rows} rows");
    }
    for period in &summary.skipped {
        println!("skipped {period}: already loaded");
    }
    for (period, message) in &summary.failed {
        println!("failed {period}: {message}");
    }

    if !summary.failed.is_empty() {
        return Err(CliError::Load(IngestError::BackendWrite(format!(
            "{} manifest(s) failed",
            summary.failed.len()
        ))));
    }

    Ok(())
}

async fn run_list_manifests(config: Config) -> Result<(), CliError> {
    let source = build_source(&config).map_err(CliError::Config)?;
    let object_store = cur_ingest::store::build_object_store(&source.bucket, &source.credentials)
        .map_err(CliError::Load)?;

    let refs = cur_ingest::manifest_locator::locate(
        object_store.as_ref(),
        source.vendor,
        &source.bucket,
        &source.prefix,
        source.export_name.as_str(),
        source.format_version,
        source.start,
        source.end,
    )
    .await
    .map_err(CliError::Load)?;

    if refs.is_empty() {
        println!("no manifests found");
    }
    for manifest_ref in refs {
        println!("{}  {}", manifest_ref.billing_period, manifest_ref.key);
    }
    Ok(())
}

async fn run_show_state(config: Config, billing_period: Option<String>) -> Result<(), CliError> {
    config.validate().map_err(CliError::Config)?;
    let vendor: Vendor = config
        .vendor
        .as_deref()
        .expect("validated")
        .parse()
        .map_err(|err| CliError::Config(config_err(err)))?;
    let export_name = config.export_name.as_deref().expect("validated");
    let backend = build_backend(&config).map_err(CliError::Config)?;
    let state = backend.state_store().await.map_err(CliError::Load)?;

    match billing_period {
        Some(raw) => {
            let period = BillingPeriod::parse(&raw).map_err(|err| CliError::Config(config_err(err)))?;
            let history = state.version_history(vendor, export_name, period).await.map_err(CliError::Load)?;
            println!("{:<36} {:<9} {:<24} {:<24} {:>10} {:>6}", "version_id", "current", "started_at", "completed_at", "rows", "files");
            for entry in history {
                println!(
                    "{:<36} {:<9} {:<24} {:<24} {:>10} {:>6}",
                    entry.version_id,
                    entry.is_current,
                    entry.started_at,
                    entry.completed_at.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string()),
                    entry.row_count.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string()),
                    entry.file_count,
                );
                if let Some(message) = entry.error_message {
                    println!("    error: {message}");
                }
            }
        }
        None => {
            let current = state.current_versions(vendor, export_name).await.map_err(CliError::Load)?;
            println!("{:<9} {:<36} {:<24} {:>10} {:>6}", "period", "version_id", "loaded_at", "rows", "files");
            for version in current {
                println!(
                    "{:<9} {:<36} {:<24} {:>10} {:>6}",
                    version.billing_period, version.version_id, version.loaded_at, version.row_count, version.file_count
                );
            }
        }
    }
    Ok(())
}

async fn run_list_exports(config: Config) -> Result<(), CliError> {
    config.validate_backend_only().map_err(CliError::Config)?;
    let backend = build_backend(&config).map_err(CliError::Config)?;
    let state = backend.state_store().await.map_err(CliError::Load)?;

    let exports = state.known_exports().await.map_err(CliError::Load)?;
    if exports.is_empty() {
        println!("no exports recorded");
        return Ok(());
    }

    for (vendor, export) in exports {
        let current = state.current_versions(vendor, &export).await.map_err(CliError::Load)?;
        println!("{vendor} / {export}  ({} month(s) loaded)", current.len());
        for version in current {
            let sanitized = cur_ingest_spec::sanitize::sanitize_export(
                &ExportName::parse(export.clone()).map_err(|err| CliError::Config(config_err(err)))?,
            );
            let table = format!("{sanitized}_{}", version.billing_period.table_suffix());
            println!("    {}  ->  {table}", version.billing_period);
        }
    }
    Ok(())
}
