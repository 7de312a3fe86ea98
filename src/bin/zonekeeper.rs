use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use zonekeeper::{
    SharedState, ZoneManager,
    config::{AppConfig, NameCase},
    db::{self, domain_repo::DomainType},
};

#[derive(Parser, Debug)]
#[command(author, version, about, rename_all = "kebab-case")]
struct Cli {
    /// Path to the SQLite database file
    #[arg(long, value_name = "PATH", global = true, default_value = "powerdns.sqlite3")]
    db: PathBuf,
    /// Type given to newly imported zones
    #[arg(long, value_name = "TYPE", global = true, default_value = "NATIVE")]
    zone_type: DomainType,
    /// Keep owner names in their original case instead of lowercasing
    #[arg(long, global = true)]
    preserve_case: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Command {
    /// Import a zone file
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Zone origin, when the file has no $ORIGIN
        #[arg(long, value_name = "ZONE")]
        origin: Option<String>,
        /// Replace the zone if it already exists
        #[arg(long)]
        overwrite: bool,
    },
    /// Import a zone by AXFR
    ImportAxfr {
        #[arg(value_name = "ZONE")]
        origin: String,
        /// Nameserver as host, IP or IP:port
        #[arg(value_name = "SERVER")]
        nameserver: String,
        #[arg(long)]
        overwrite: bool,
    },
    /// Write a zone as zone text
    Export {
        #[arg(value_name = "ZONE")]
        origin: String,
        /// Output file (stdout when omitted)
        #[arg(long, short, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Write every zone into a directory, one `<zone>.zone` file each
    ExportAll {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
    /// Recompute auth flags and ordernames
    Rectify {
        #[arg(value_name = "ZONE", required = true)]
        origins: Vec<String>,
    },
    /// Move a zone's SOA serial forward
    BumpSerial {
        #[arg(value_name = "ZONE")]
        origin: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let state = init_shared_state(&cli).await?;

    match cli.command {
        Command::Import {
            file,
            origin,
            overwrite,
        } => {
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let domain = state
                .import_zone_text(origin.as_deref(), &text, overwrite)
                .await
                .with_context(|| format!("failed to import {}", file.display()))?;
            info!(zone = %domain.name, "import finished");
        }
        Command::ImportAxfr {
            origin,
            nameserver,
            overwrite,
        } => {
            let domain = state
                .import_zone_axfr(&origin, &nameserver, overwrite)
                .await
                .with_context(|| format!("failed to transfer {origin} from {nameserver}"))?;
            info!(zone = %domain.name, "transfer finished");
        }
        Command::Export { origin, output } => {
            let text = state
                .export_zone_text(&origin)
                .await
                .with_context(|| format!("failed to export {origin}"))?;
            match output {
                Some(path) => tokio::fs::write(&path, text)
                    .await
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => print!("{text}"),
            }
        }
        Command::ExportAll { dir } => {
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("failed to create {}", dir.display()))?;
            for origin in state.zone_names().await? {
                let text = state
                    .export_zone_text(&origin)
                    .await
                    .with_context(|| format!("failed to export {origin}"))?;
                let path = dir.join(format!("{origin}.zone"));
                tokio::fs::write(&path, text)
                    .await
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
        }
        Command::Rectify { origins } => {
            for origin in origins {
                let report = state
                    .rectify_zone(&origin)
                    .await
                    .with_context(|| format!("failed to rectify {origin}"))?;
                println!(
                    "{}: {} records, {} updated, {} non-authoritative ({})",
                    report.zone, report.records, report.updated, report.non_auth, report.mode
                );
            }
        }
        Command::BumpSerial { origin } => {
            let serial = state
                .bump_serial(&origin)
                .await
                .with_context(|| format!("failed to bump the serial of {origin}"))?;
            println!("{origin}: {serial}");
        }
    }

    Ok(())
}

async fn init_shared_state(cli: &Cli) -> Result<SharedState> {
    if let Some(parent) = cli.db.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create db directory {}", parent.display()))?;
    }

    let db = db::init_db(&cli.db).await?;
    let config = AppConfig {
        default_zone_type: cli.zone_type,
        name_case: if cli.preserve_case {
            NameCase::Preserve
        } else {
            NameCase::Lowercase
        },
        ..AppConfig::default()
    };
    Ok(SharedState::new(ZoneManager::new(db, config)))
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,sqlx=warn".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}
