//! Command-line interface definitions for listing_harvest.
//!
//! All arguments can be provided via command-line flags or environment variables.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for a scrape run.
///
/// # Examples
///
/// ```sh
/// # Built-in sources, output to ./data/properties.json
/// listing_harvest
///
/// # Custom source list, only one of its sources, faster politeness gate
/// listing_harvest -c sources.yaml -s realestateinnepal.com --min-interval-ms 500
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML source configuration
    #[arg(short, long, env = "HARVEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory the artifact is written into
    #[arg(short, long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// File name of the artifact inside the data directory
    #[arg(short, long, default_value = "properties.json")]
    pub output_file: String,

    /// Only scrape these source ids (repeatable)
    #[arg(short, long = "source")]
    pub sources: Vec<String>,

    /// Override every source's minimum delay between requests
    #[arg(long)]
    pub min_interval_ms: Option<u64>,
}

impl Cli {
    pub fn output_path(&self) -> PathBuf {
        self.data_dir.join(&self.output_file)
    }
}
