use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

use roof_inspect::app::validation::validate_report;
use roof_inspect::config::Config;
use roof_inspect::domain::{NewUser, UserRole};
use roof_inspect::logging::init_logging;
use roof_inspect::observability;
use roof_inspect::photos::photo_store_from_config;
use roof_inspect::server::{start_server, AppState};
use roof_inspect::storage::{load_bundle, open_storage, Storage};

#[derive(Parser)]
#[command(name = "roof_inspect")]
#[command(about = "Roofing inspection reports, PDFs, mobile sync and LBP complaints")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (defaults to roof_inspect.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Create or upgrade the database schema
    Migrate,
    /// Add a user; the first user always becomes an admin
    CreateUser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        /// INSPECTOR, REVIEWER or ADMIN
        #[arg(long, default_value = "INSPECTOR")]
        role: UserRole,
    },
    /// Print the completion check for a report
    Validate {
        #[arg(long)]
        report: Uuid,
    },
    /// Write a report PDF to disk
    RenderPdf {
        #[arg(long)]
        report: Uuid,
        #[arg(long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let _log_guard = init_logging(&config.logging);

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            let storage = open_storage(&config.database)?;
            let photos = photo_store_from_config(&config.photos)?;
            let metrics_enabled = config.metrics.enabled;
            let mut state = AppState::new(storage, photos, config);
            if metrics_enabled {
                state = state.with_metrics(observability::init()?);
            }
            start_server(state).await?;
        }
        Commands::Migrate => {
            // Opening runs every pending migration
            open_storage(&config.database)?;
            println!("Database at {} is up to date", config.database.path);
        }
        Commands::CreateUser { email, name, role } => {
            let storage = open_storage(&config.database)?;
            // The operator acts as the first admin once one exists
            let admin = storage
                .list_users()
                .await?
                .into_iter()
                .find(|u| u.is_admin());
            let user = roof_inspect::app::UserUseCase::new(storage)
                .create(
                    admin.as_ref(),
                    NewUser {
                        email,
                        name,
                        role: Some(role),
                        ..Default::default()
                    },
                )
                .await?;
            if user.role != role {
                warn!("First user is always an admin; created {} as {}", user.email, user.role);
            }
            println!("{}\t{}\t{}", user.id, user.role, user.email);
        }
        Commands::Validate { report } => {
            let storage = open_storage(&config.database)?;
            let bundle = bundle(storage.as_ref(), report).await?;
            let result = validate_report(&bundle, Utc::now().date_naive());
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.valid {
                bail!("report {} is not ready for review", report);
            }
        }
        Commands::RenderPdf { report, out } => {
            let storage = open_storage(&config.database)?;
            let bundle = bundle(storage.as_ref(), report).await?;
            let inspector = storage
                .get_user(bundle.report.inspector_id)
                .await?
                .context("report inspector no longer exists")?;
            let bytes = roof_inspect::pdf::render_report(&bundle, &inspector)?;
            std::fs::write(&out, &bytes)
                .with_context(|| format!("writing {}", out.display()))?;
            info!("Wrote {} ({} bytes)", out.display(), bytes.len());
            println!("{}", out.display());
        }
    }
    Ok(())
}

async fn bundle(
    storage: &dyn Storage,
    id: Uuid,
) -> Result<roof_inspect::domain::ReportBundle> {
    let Some(report) = storage.get_report(id).await? else {
        bail!("report {} not found", id);
    };
    Ok(load_bundle(storage, report).await?)
}

