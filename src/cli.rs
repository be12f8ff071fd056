use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub const DEFAULT_CATEGORIES_URL: &str = "https://sat-questions.onrender.com/categories";

#[derive(Parser, Debug)]
#[command(
    name = "satbank",
    version,
    about = "SAT question bank scraping and import tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import questions from a structured JSON export.
    Import(ImportArgs),
    /// Scrape questions from the live site.
    Scrape(ScrapeArgs),
    /// Report database row counts.
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// Path to the JSON export, a top-level object keyed by UID.
    pub json_path: PathBuf,

    #[arg(long, default_value = "satbank.sqlite")]
    pub db_path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ScrapeArgs {
    #[arg(long, default_value = "satbank.sqlite")]
    pub db_path: PathBuf,

    #[arg(long, default_value = DEFAULT_CATEGORIES_URL)]
    pub base_url: String,

    /// Maximum number of question pages to process (0 = all).
    #[arg(long, default_value_t = 0)]
    pub limit: usize,

    /// Parse without writing to the database.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Fixed delay applied before every request, in milliseconds.
    #[arg(long, default_value_t = 400)]
    pub delay_ms: u64,

    #[arg(long, default_value = "manifests")]
    pub manifest_dir: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = "satbank.sqlite")]
    pub db_path: PathBuf,
}
