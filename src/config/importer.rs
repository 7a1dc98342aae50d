use std::path::PathBuf;

use clap::Parser;

/// Imports a single local file and writes the extracted text.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// File to import.
    #[arg(short = 'i', long)]
    pub input: PathBuf,

    /// Where to write the extracted text. Nested documents are appended.
    #[arg(short = 'o', long)]
    pub output: PathBuf,

    /// Optional crawler configuration; only its `importer` section is used.
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Content type of the input, when known.
    #[arg(short = 't', long)]
    pub content_type: Option<String>,
}
