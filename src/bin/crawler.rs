// src/bin/crawler.rs

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use docflow::config::load_crawler_config;
use docflow::config::worker::Args;
use docflow::data_model::DocumentState;
use docflow::events::{CrawlerEventListener, LoggingEventListener};
use docflow::registry::ComponentRegistry;
use docflow::utils::common::{init_tracing, setup_prometheus_metrics};
use docflow::worker_logic::{build_services_from_config, read_references, Crawler};

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] {msg} {pos}/{len} ({percent}%) ({per_sec}, ETA: {eta})";

fn create_progress_bar(total_items: u64, message: &str, template: &str) -> ProgressBar {
    let pb = ProgressBar::new(total_items);
    pb.set_message(message.to_string());
    pb.set_style(
        ProgressStyle::default_bar()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = init_tracing(args.log_json, args.log_dir.as_deref(), "crawler.log");

    let mut config = load_crawler_config(&args.config)
        .with_context(|| format!("Could not load configuration from {}", args.config.display()))?;
    if let Some(num_workers) = args.num_workers {
        config.crawler.num_workers = num_workers;
    }

    let registry = ComponentRegistry::with_builtins();
    let listeners: Vec<Arc<dyn CrawlerEventListener>> = vec![Arc::new(LoggingEventListener)];
    let services = build_services_from_config(&config, &registry, listeners)
        .context("Could not build crawler components")?;

    if args.validate_config {
        info!(config = %args.config.display(), "Configuration is valid.");
        return Ok(());
    }

    if let Err(e) = setup_prometheus_metrics(args.metrics_port).await {
        error!("Failed to start Prometheus metrics endpoint: {}", e);
    }

    let mut references = args.references.clone();
    if let Some(file) = &args.references_file {
        references.extend(read_references(file)?);
    }
    if references.is_empty() {
        bail!("No references to crawl; pass them as arguments or with --references-file");
    }

    let committers: Vec<String> = services
        .committers
        .committer_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    info!("Crawler started.");
    info!("Configuration: {}", args.config.display());
    info!("References: {}", references.len());
    info!("Workers: {}", config.crawler.num_workers);

    let pb = if args.no_progress {
        ProgressBar::hidden()
    } else {
        create_progress_bar(references.len() as u64, "Crawling", PROGRESS_TEMPLATE)
    };

    let progress = pb.clone();
    let crawler = Crawler::new(services, config.crawler.num_workers).on_outcome(move |outcome| {
        progress.inc(1);
        if outcome.state != DocumentState::Done {
            progress.set_message(format!("Last rejected: {}", outcome.reference));
        }
    });

    let cancel = crawler.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping crawl after in-flight documents.");
            cancel.cancel();
        }
    });

    let summary = crawler.crawl(references).await;
    pb.finish_with_message("Crawl complete");

    info!("--------------------");
    info!("Crawl Summary:");
    info!("  References: {}", summary.total);
    info!("    - Done: {}", summary.done);
    info!("    - Rejected: {}", summary.rejected);
    info!("    - Bad status: {}", summary.bad_status);
    info!("    - Unsupported: {}", summary.unsupported);
    info!("    - Error: {}", summary.error);
    if summary.incomplete > 0 {
        info!("    - Interrupted: {}", summary.incomplete);
    }
    info!("  Committers: {}", committers.join(", "));
    info!("--------------------");

    Ok(())
}
