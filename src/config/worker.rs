use std::path::PathBuf;

use clap::Parser;

/// Crawls references through the fetch, filter, import and commit pipeline.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the crawler configuration YAML file.
    #[arg(short = 'c', long, default_value = "config/crawler_config.yaml")]
    pub config: PathBuf,

    /// References (URLs or file paths) to crawl.
    pub references: Vec<String>,

    /// File with one reference per line; blank lines and lines starting
    /// with '#' are ignored.
    #[arg(short = 'f', long)]
    pub references_file: Option<PathBuf>,

    /// Overrides the number of workers from the configuration.
    #[arg(short = 'w', long)]
    pub num_workers: Option<usize>,

    /// Optional: Port for the Prometheus metrics HTTP endpoint
    #[arg(long)]
    pub metrics_port: Option<u16>,

    /// Validate the crawler configuration and exit
    #[arg(long)]
    pub validate_config: bool,

    /// Emit logs as JSON.
    #[arg(long)]
    pub log_json: bool,

    /// Also write logs to daily rolling files in this directory.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Disable the progress bar.
    #[arg(long)]
    pub no_progress: bool,
}
