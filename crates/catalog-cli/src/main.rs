//! `catalog`: ingest catalog files and inspect the results.
//!
//! Reads configuration from the environment (see `Config::from_env`).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use catalog_cli::{original_name, print_json, truncate_string};
use catalog_core::models::CatalogListQuery;
use catalog_core::Config;
use catalog_infra::init_telemetry;
use catalog_worker::{CatalogApp, ChainOutcome};
use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "catalog", about = "Catalog ingestion CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a CSV or TXT file for ingestion
    Ingest {
        /// Path to the file
        file: PathBuf,
        /// Owning user UUID
        #[arg(long)]
        user: Uuid,
        /// Wait for processing to finish, printing lifecycle events
        #[arg(long)]
        wait: bool,
    },
    /// Process uploads left pending or processing
    Resume,
    /// Keep processing queued uploads until interrupted
    Worker,
    /// List uploads, newest first
    Uploads {
        #[arg(long, default_value = "20")]
        limit: i64,
        #[arg(long, default_value = "0")]
        offset: i64,
    },
    /// Delete an upload and its stored file
    Delete {
        /// Upload UUID
        id: Uuid,
    },
    /// Search the catalog
    Products {
        #[arg(long)]
        search: Option<String>,
        /// unique_key, product_title, style_number, piece_price, created_at or updated_at
        #[arg(long)]
        sort: Option<String>,
        /// asc or desc
        #[arg(long)]
        direction: Option<String>,
        #[arg(long)]
        page: Option<i64>,
    },
}

fn report(outcome: &ChainOutcome, upload_id: Uuid) {
    match outcome {
        ChainOutcome::Completed => println!("Upload {} completed", upload_id),
        ChainOutcome::Failed(message) => println!("Upload {} failed: {}", upload_id, message),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate()?;
    init_telemetry(None, config.log_json)
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    let app = CatalogApp::from_config(&config).await?;

    match cli.command {
        Commands::Ingest { file, user, wait } => {
            let name = original_name(&file)?;
            let reader = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("Failed to open {}", file.display()))?;

            let events = app.topic.as_ref().filter(|_| wait).map(|t| t.subscribe());
            let (upload, ticket) = app
                .service
                .submit_reader(user, &name, Box::pin(reader))
                .await?;
            print_json(&upload)?;

            if wait {
                if let Some(mut rx) = events {
                    tokio::spawn(async move {
                        while let Ok(message) = rx.recv().await {
                            if let Ok(line) = serde_json::to_string(&message) {
                                println!("{}", line);
                            }
                        }
                    });
                }
                let outcome = ticket.wait().await?;
                report(&outcome, upload.id);
            } else {
                // Exiting stops this process's queue; a running worker picks the upload up.
                drop(ticket);
                println!(
                    "Upload {} queued; run `catalog worker` to process it",
                    upload.id
                );
            }
        }
        Commands::Resume => {
            let tickets = app.service.resume_unfinished().await?;
            println!("Resuming {} upload(s)", tickets.len());
            for ticket in tickets {
                let upload_id = ticket.upload_id;
                let outcome = ticket.wait().await?;
                report(&outcome, upload_id);
            }
        }
        Commands::Worker => {
            tracing::info!(environment = %config.environment, "Starting catalog worker");
            let poll_interval = Duration::from_millis(config.worker_poll_interval_ms);
            app.run_until(poll_interval, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for shutdown signal");
                }
            })
            .await;
            return Ok(());
        }
        Commands::Uploads { limit, offset } => {
            let uploads = app.service.list_uploads(limit, offset).await?;
            for summary in &uploads {
                println!(
                    "{}  {:<10}  {:>6}  {}",
                    summary.upload.id,
                    summary.upload.status,
                    summary.products_count,
                    truncate_string(&summary.upload.original_name, 40)
                );
            }
        }
        Commands::Delete { id } => {
            app.service.delete_upload(id).await?;
            print_json(&serde_json::json!({ "success": true, "message": format!("Upload {} deleted", id) }))?;
        }
        Commands::Products {
            search,
            sort,
            direction,
            page,
        } => {
            let query = CatalogListQuery::from_params(
                search.as_deref(),
                sort.as_deref(),
                direction.as_deref(),
                page,
            );
            let page = app.catalog.search(&query).await?;
            print_json(&page)?;
        }
    }

    app.shutdown().await;
    Ok(())
}
