mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use price_check::{
    AnalysisSummary, CancellationToken, LimitedGateway, MarketStatus, MaterialDomain,
    MissingPricePolicy, OpenAIGateway, PipelineConfig, PipelineError, PriceChecker,
    RetryingGateway,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Exit code for a temporarily unavailable upstream (EX_TEMPFAIL).
const EXIT_TEMPFAIL: u8 = 75;
const EXIT_CANCELLED: u8 = 130;

type Gateway = LimitedGateway<RetryingGateway<OpenAIGateway>>;

#[derive(Parser)]
#[command(
    name = "price-check",
    version,
    about = "Check procurement quotes against market prices"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract materials from a quote and classify each price against the market
    Analyze {
        /// Text file with the document contents
        #[arg(short, long)]
        input: PathBuf,

        /// Date used to frame "current" prices (default: today)
        #[arg(long)]
        date: Option<String>,

        /// Model identifier
        #[arg(long)]
        model: Option<String>,

        /// Material domain: construction or hospital
        #[arg(long, default_value = "construction")]
        domain: MaterialDomain,

        /// How to record items without a price: null or zero
        #[arg(long, default_value = "null")]
        missing_price: MissingPricePolicy,

        /// Fraction beyond the nearest bound before a price is flagged
        #[arg(long)]
        threshold: Option<f64>,

        /// Skip the extra search for items without a full price range
        #[arg(long)]
        no_supplementary_search: bool,
    },

    /// Find and verify market prices for a single material
    Quote {
        /// Material description
        #[arg(short, long)]
        description: String,

        /// Minimum number of supplier links to look for
        #[arg(long, default_value_t = 3)]
        min_links: usize,

        /// Date used to frame "current" prices (default: today)
        #[arg(long)]
        date: Option<String>,

        /// Model identifier
        #[arg(long)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,price_check=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling run");
            trigger.cancel();
        }
    });

    match run(cli, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report_error(&e),
    }
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    let config = Config::from_env()?;

    match cli.command {
        Command::Analyze {
            input,
            date,
            model,
            domain,
            missing_price,
            threshold,
            no_supplementary_search,
        } => {
            let document = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;

            let mut pipeline = base_pipeline(&config, model)
                .with_domain(domain)
                .with_missing_price_policy(missing_price)
                .with_supplementary_search(!no_supplementary_search);
            if let Some(threshold) = threshold {
                pipeline = pipeline.with_significance_threshold(threshold);
            }

            let checker = PriceChecker::with_config(build_gateway(&config)?, pipeline);
            let date = date.unwrap_or_else(today);

            let items = checker
                .analyze_quote_with_cancel(&document, &date, cancel)
                .await?;

            println!("{}", serde_json::to_string_pretty(&items)?);
            print_summary(&AnalysisSummary::from_items(&items));
        }

        Command::Quote {
            description,
            min_links,
            date,
            model,
        } => {
            let checker =
                PriceChecker::with_config(build_gateway(&config)?, base_pipeline(&config, model));
            let date = date.unwrap_or_else(today);

            let quotation = checker
                .quote_material_with_cancel(&description, &date, min_links, cancel)
                .await?;

            println!("{}", serde_json::to_string_pretty(&quotation)?);
        }
    }

    Ok(())
}

/// The stage timeout wraps the retrying gateway, so it must outlast every
/// attempt and backoff delay rather than a single HTTP request.
fn base_pipeline(config: &Config, model: Option<String>) -> PipelineConfig {
    PipelineConfig::default()
        .with_model(model.unwrap_or_else(|| config.default_model().to_string()))
        .with_call_timeout(config.retry.total_budget(config.timeout()))
}

fn build_gateway(config: &Config) -> Result<Gateway> {
    let openai = OpenAIGateway::new(config.gateway.clone())
        .context("Failed to create OpenAI gateway")?;
    let retrying = RetryingGateway::with_config(openai, config.retry.clone());
    let limited = LimitedGateway::new(retrying, config.max_in_flight);

    Ok(match config.requests_per_minute {
        Some(rpm) => limited.with_requests_per_minute(rpm),
        None => limited,
    })
}

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

fn print_summary(summary: &AnalysisSummary) {
    eprintln!();
    eprintln!("{}", format!("{} items analyzed", summary.total).bold());
    eprintln!(
        "  {} {}",
        MarketStatus::WithinMarket.label().green(),
        summary.within_market
    );
    eprintln!(
        "  {} {}",
        MarketStatus::AboveMarket.label().red(),
        summary.above_market
    );
    eprintln!(
        "  {} {}",
        MarketStatus::BelowMarket.label().yellow(),
        summary.below_market
    );
    eprintln!(
        "  {} {}",
        MarketStatus::ResearchNeeded.label().bright_black(),
        summary.research_needed
    );

    if !summary.flagged.is_empty() {
        eprintln!();
        eprintln!("{}", "Items needing attention:".bold());
        for item in &summary.flagged {
            let variation = item
                .percentage_variation
                .map(|v| format!("{v:+.2}%"))
                .unwrap_or_else(|| "n/a".to_string());
            eprintln!("  - {} [{}] {}", item.material, item.status, variation);
        }
    }
}

fn report_error(error: &anyhow::Error) -> ExitCode {
    match error.downcast_ref::<PipelineError>() {
        Some(e) if e.is_overloaded() => {
            eprintln!("{} {}", "error:".red().bold(), e);
            eprintln!(
                "{}",
                "The model service is overloaded. Try again shortly.".yellow()
            );
            ExitCode::from(EXIT_TEMPFAIL)
        }
        Some(PipelineError::Cancelled) => {
            eprintln!("{}", "Cancelled.".yellow());
            ExitCode::from(EXIT_CANCELLED)
        }
        Some(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            if let Some(raw) = e.raw_text() {
                eprintln!("{}", "Raw model output:".bold());
                eprintln!("{raw}");
            }
            ExitCode::FAILURE
        }
        None => {
            eprintln!("{} {:#}", "error:".red().bold(), error);
            ExitCode::FAILURE
        }
    }
}
