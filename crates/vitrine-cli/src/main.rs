//! Vitrine CLI: run the upload event worker, ingest local files and drive work orders.
//!
//! Configuration comes from the environment (and `.env`); see `vitrine_core::Config`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use vitrine_cli::events::{guess_content_type, metadata_map, parse_event_line, parse_metadata_pair};
use vitrine_cli::{init_tracing, App, LogFormat};
use vitrine_core::models::{CallerContext, UploadEvent, WorkOrderPayload};
use vitrine_core::Config;
use vitrine_worker::{ConsumerConfig, UploadEventConsumer};

#[derive(Parser)]
#[command(name = "vitrine", about = "Vitrine media ingestion and work orders")]
struct Cli {
    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume upload events (one JSON object per line) and run the pipelines
    Worker {
        /// File of JSON-lines events; stdin when omitted
        #[arg(long)]
        events: Option<PathBuf>,
    },
    /// Upload a local file as an original and process it
    Ingest {
        /// Local file to upload
        file: PathBuf,
        /// Storage key, e.g. uploads/images/42/photo.jpg
        #[arg(long)]
        key: String,
        /// Content type; guessed from the file extension when omitted
        #[arg(long)]
        content_type: Option<String>,
        /// Custom metadata as key=value (repeatable), e.g. uploadId=abc
        #[arg(long = "meta", value_parser = parse_metadata_pair)]
        metadata: Vec<(String, String)>,
    },
    /// Work-order lifecycle operations
    WorkOrder {
        /// Uid of the calling user
        #[arg(long, env = "VITRINE_UID")]
        uid: Option<String>,
        #[command(subcommand)]
        action: WorkOrderCommands,
    },
    /// Archive and delete a service request
    DeleteRequest {
        source_request_id: String,
        /// Uid of the calling user
        #[arg(long, env = "VITRINE_UID")]
        uid: Option<String>,
    },
}

#[derive(Subcommand)]
enum WorkOrderCommands {
    /// Issue a work order for a service request
    Create {
        source_request_id: String,
        /// Issue even when the request is not flagged as a work order
        #[arg(long)]
        force_emit: bool,
    },
    /// Pause the work order linked to a service request
    Pause { source_request_id: String },
    /// Resume the work order linked to a service request
    Resume { source_request_id: String },
    /// Complete a work order by id or by its service request
    Complete {
        #[arg(long, required_unless_present = "source_request_id")]
        work_order_id: Option<String>,
        #[arg(long)]
        source_request_id: Option<String>,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

fn caller(uid: Option<String>) -> CallerContext {
    CallerContext { uid }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        _ = terminate => tracing::info!("Received terminate signal"),
    }
}

async fn run_worker(app: &App, events: Option<PathBuf>) -> anyhow::Result<()> {
    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &events {
        Some(path) => Box::new(BufReader::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let consumer = UploadEventConsumer::start(
        Arc::new(app.dispatcher()?),
        ConsumerConfig::from(&app.config.worker),
    );

    let mut lines = reader.lines();
    let mut line_number = 0usize;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read upload events")?,
            _ = &mut shutdown => break,
        };
        let Some(line) = line else {
            break;
        };
        line_number += 1;
        match parse_event_line(&line, line_number) {
            Ok(Some(event)) => consumer.submit(event).await?,
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Skipping malformed upload event"),
        }
    }

    let summary = consumer.shutdown().await?;
    print_json(&summary)
}

async fn run_ingest(
    app: &App,
    file: PathBuf,
    key: String,
    content_type: Option<String>,
    metadata: Vec<(String, String)>,
) -> anyhow::Result<()> {
    let content_type = match content_type {
        Some(content_type) => content_type,
        None => guess_content_type(&file)
            .map(str::to_string)
            .with_context(|| format!("Cannot guess content type of {}, pass --content-type", file.display()))?,
    };
    let data = tokio::fs::read(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let size_bytes = data.len() as u64;
    let metadata = metadata_map(metadata);

    app.blobs
        .put_object(&key, Bytes::from(data), &content_type, &metadata)
        .await
        .context("Failed to upload original")?;

    let mut event = UploadEvent::new(key, content_type, size_bytes);
    event.custom_metadata = metadata;
    let outcome = app.dispatcher()?.dispatch(&event).await?;
    print_json(&outcome)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    let app = App::from_config(config).await?;

    match cli.command {
        Commands::Worker { events } => run_worker(&app, events).await?,
        Commands::Ingest {
            file,
            key,
            content_type,
            metadata,
        } => run_ingest(&app, file, key, content_type, metadata).await?,
        Commands::WorkOrder { uid, action } => {
            let caller = caller(uid);
            let service = app.work_orders();
            match action {
                WorkOrderCommands::Create {
                    source_request_id,
                    force_emit,
                } => {
                    let payload =
                        WorkOrderPayload::for_request(source_request_id).with_force_emit(force_emit);
                    print_json(&service.create(&caller, &payload).await?)?;
                }
                WorkOrderCommands::Pause { source_request_id } => {
                    let payload = WorkOrderPayload::for_request(source_request_id);
                    print_json(&service.pause(&caller, &payload).await?)?;
                }
                WorkOrderCommands::Resume { source_request_id } => {
                    let payload = WorkOrderPayload::for_request(source_request_id);
                    print_json(&service.resume(&caller, &payload).await?)?;
                }
                WorkOrderCommands::Complete {
                    work_order_id,
                    source_request_id,
                } => {
                    let payload = WorkOrderPayload {
                        work_order_id,
                        source_request_id,
                        force_emit: None,
                    };
                    print_json(&service.complete(&caller, &payload).await?)?;
                }
            }
        }
        Commands::DeleteRequest {
            source_request_id,
            uid,
        } => {
            let payload = WorkOrderPayload::for_request(source_request_id);
            let response = app
                .work_orders()
                .delete_service_request(&caller(uid), &payload)
                .await?;
            print_json(&response)?;
        }
    }

    Ok(())
}
