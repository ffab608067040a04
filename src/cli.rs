use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sitepulse", version)]
#[command(about = "Site audit and optimization engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file (JSON, TOML, or YAML)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API consumed by the dashboard
    Serve(ServeArgs),

    /// Crawl a site once and print its report
    Audit(AuditArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Directory where reports and state are persisted
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Base URL of the keyword-data provider
    #[arg(long)]
    pub provider_url: Option<String>,
}

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// The URL to start crawling from
    #[arg(value_name = "URL")]
    pub url: String,

    /// Maximum number of pages to crawl
    #[arg(short, long)]
    pub max_pages: Option<usize>,

    /// Number of concurrent requests
    #[arg(short = 'c', long)]
    pub concurrency: Option<usize>,

    /// Rate limit for requests per second (e.g., 1.0 for 1 req/s)
    #[arg(short = 'r', long)]
    pub rate_limit: Option<f64>,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    pub output: String,

    /// Save the report as JSON to this file
    #[arg(short, long)]
    pub save: Option<String>,

    /// Ignore robots.txt rules
    #[arg(long)]
    pub ignore_robots: bool,

    /// Directory where reports and state are persisted; diffs against the
    /// previous audit stored there
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}
