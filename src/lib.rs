pub mod aggregator;
pub mod cli;
pub mod config;
pub mod crawler;
pub mod error;
pub mod fetcher;
pub mod http_client;
pub mod keywords;
pub mod models;
pub mod remediation;
pub mod reporter;
pub mod robots;
pub mod rules;
pub mod server;
pub mod service;
pub mod store;
pub mod url_utils;

use anyhow::Result;
use cli::{AuditArgs, Cli, Command};
use colored::*;
use config::{Config, Settings};
use reporter::Reporter;
use service::AuditService;

pub async fn run(cli: Cli) -> Result<()> {
    let settings = Config::load(cli.config.as_deref())?
        .merge_with_cli(&cli)
        .into_settings();

    match cli.command {
        Command::Serve(_) => server::serve(settings).await,
        Command::Audit(args) => audit(args, settings).await,
    }
}

async fn audit(args: AuditArgs, settings: Settings) -> Result<()> {
    // Validate URL
    if !args.url.starts_with("http://") && !args.url.starts_with("https://") {
        anyhow::bail!("URL must start with http:// or https://");
    }

    let json = args.output == "json";
    if !json {
        println!(
            "{}",
            "Sitepulse - Site Audit & Optimization Engine"
                .bright_cyan()
                .bold()
        );
        println!("{}", "=".repeat(50).bright_blue());
        println!();
        println!("{} {}", "Starting crawl:".bright_white().bold(), args.url);
        println!("{} {}", "Max pages:".bright_white().bold(), settings.max_pages);
        println!();
    }

    let service = AuditService::new(settings)?;
    let report = service.run_crawl(&args.url, None, !json).await?;
    let bundle = Reporter::bundle(report, service.page_audits());

    match args.output.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&bundle)?),
        _ => Reporter::print_text_report(&bundle),
    }

    if let Some(filename) = args.save {
        Reporter::save_json_report(&bundle, &filename)?;
    }

    Ok(())
}
