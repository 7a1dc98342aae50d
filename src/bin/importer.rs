// src/bin/importer.rs

use std::fs;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{info, warn};

use docflow::config::importer::Args;
use docflow::config::{load_crawler_config, ImporterSettings};
use docflow::pipeline::importer::{ImportResponse, ImportStatus};
use docflow::registry::ComponentRegistry;
use docflow::utils::common::init_tracing;
use docflow::utils::stream::CachedStreamFactory;
use docflow::worker_logic::build_importer_from_config;

/// Appends the text of every successful node, depth first.
fn collect_text(response: &mut ImportResponse, out: &mut String) -> std::io::Result<()> {
    if let Some(doc) = response.document.as_mut() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&doc.content_string()?);
    } else if response.status != ImportStatus::Success {
        warn!(
            reference = %response.reference,
            status = %response.status,
            "{}",
            response.description
        );
    }
    for child in response.nested.iter_mut() {
        collect_text(child, out)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = init_tracing(false, None, "importer.log");

    let mut settings = match &args.config {
        Some(path) => {
            load_crawler_config(path)
                .with_context(|| format!("Could not load configuration from {}", path.display()))?
                .importer
        }
        None => ImporterSettings::default(),
    };
    if args.content_type.is_some() {
        settings.default_content_type = args.content_type.clone();
    }

    let registry = ComponentRegistry::with_builtins();
    let importer = build_importer_from_config(&settings, &registry, CachedStreamFactory::default())
        .context("Could not build importer")?;

    info!(input = %args.input.display(), "Importing");
    let mut response = importer.import_path(&args.input).await;
    if !response.is_success() {
        bail!(
            "Import of {} ended with {}: {}",
            args.input.display(),
            response.status,
            response.description
        );
    }

    let mut text = String::new();
    collect_text(&mut response, &mut text).context("Could not read imported content")?;
    fs::write(&args.output, text)
        .with_context(|| format!("Could not write {}", args.output.display()))?;
    info!(
        output = %args.output.display(),
        documents = response.node_count(),
        "Import complete"
    );
    Ok(())
}
