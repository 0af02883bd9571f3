use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;
use pantry_core::classifier::RetryPolicy;
use pantry_core::config::{API_KEY_ENV, ScrapeConfig, TransformConfig};
use pantry_core::scrape::{ScrapeSummary, run_scrape};
use pantry_core::transform::{TransformSummary, classifier_from_config, run_transform};
use pantry_scanner::{BrowserContext, HttpBrowser};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Installs the global log subscriber. `RUST_LOG` overrides the default level.
pub fn init_tracing(quiet: bool) {
    let default_level = if quiet { "error" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// Treats an empty or blank key as missing.
pub fn api_key_from(value: Option<String>) -> Option<String> {
    value
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
}

fn api_key_from_env() -> Option<String> {
    api_key_from(std::env::var(API_KEY_ENV).ok())
}

fn path_arg(args: &ArgMatches, id: &str) -> Option<PathBuf> {
    args.get_one::<String>(id).map(|p| expand_path(p))
}

fn seconds_arg(args: &ArgMatches, id: &str) -> Option<Duration> {
    args.get_one::<u64>(id).map(|s| Duration::from_secs(*s))
}

pub fn scrape_config_from_args(args: &ArgMatches, quiet: bool) -> ScrapeConfig {
    let defaults = ScrapeConfig::default();
    ScrapeConfig {
        catalog_url: args
            .get_one::<Url>("url")
            .map(|u| u.to_string())
            .unwrap_or(defaults.catalog_url),
        concurrency: args
            .get_one::<usize>("threads")
            .copied()
            .unwrap_or(defaults.concurrency),
        catalog_timeout: seconds_arg(args, "catalog-timeout").unwrap_or(defaults.catalog_timeout),
        navigation_timeout: seconds_arg(args, "timeout").unwrap_or(defaults.navigation_timeout),
        extract_timeout: defaults.extract_timeout,
        output: path_arg(args, "output").unwrap_or(defaults.output),
        show_progress: !quiet && !args.get_flag("no-progress"),
    }
}

/// Builds the transform settings. `input` overrides the `--input` argument,
/// which the `run` command does not have.
pub fn transform_config_from_args(
    args: &ArgMatches,
    input: Option<PathBuf>,
    api_key: Option<String>,
    quiet: bool,
) -> TransformConfig {
    let defaults = TransformConfig::default();
    let retry = RetryPolicy {
        max_attempts: args
            .get_one::<usize>("attempts")
            .copied()
            .unwrap_or(defaults.retry.max_attempts),
        retry_delay: seconds_arg(args, "retry-delay").unwrap_or(defaults.retry.retry_delay),
        min_spacing: seconds_arg(args, "record-delay").unwrap_or(defaults.retry.min_spacing),
    };

    TransformConfig {
        input: input
            .or_else(|| path_arg(args, "input"))
            .unwrap_or(defaults.input),
        snapshot: path_arg(args, "snapshot").unwrap_or(defaults.snapshot),
        prompt_file: path_arg(args, "prompt-file").unwrap_or(defaults.prompt_file),
        out_dir: path_arg(args, "out-dir").unwrap_or(defaults.out_dir),
        model: args
            .get_one::<String>("model")
            .cloned()
            .unwrap_or(defaults.model),
        base_url: args
            .get_one::<Url>("base-url")
            .map(|u| u.to_string())
            .unwrap_or(defaults.base_url),
        api_key,
        retry,
        show_progress: !quiet && !args.get_flag("no-progress"),
    }
}

pub fn format_scrape_summary(summary: &ScrapeSummary, output: &std::path::Path) -> String {
    format!(
        "{} Scraped {} products ({} pages failed, {} without ingredients, {} without nutrition)\n  {} {}",
        "✓".green().bold(),
        summary.products.to_string().bright_white().bold(),
        summary.failed_pages,
        summary.missing_ingredients,
        summary.missing_nutrition,
        "→".blue(),
        output.display()
    )
}

pub fn format_transform_summary(summary: &TransformSummary, config: &TransformConfig) -> String {
    let mut report = format!(
        "{} Transformed {} records ({} from snapshot), {} distinct ingredients, {} nutrition rows\n",
        "✓".green().bold(),
        summary.records.to_string().bright_white().bold(),
        summary.fallbacks,
        summary.distinct_ingredients,
        summary.nutrition_records
    );
    for path in [
        config.frequency_path(),
        config.nutrition_path(),
        config.cleaned_path(),
    ] {
        report.push_str(&format!("  {} {}\n", "→".blue(), path.display()));
    }
    report
}

fn print_step(msg: &str, quiet: bool) {
    if !quiet {
        println!("\n{} {}", "▶".bright_cyan().bold(), msg.bright_white().bold());
    }
}

async fn scrape(config: &ScrapeConfig, quiet: bool) -> Result<ScrapeSummary> {
    print_step(
        &format!(
            "Scraping {} ({} pages at a time)",
            config.catalog_url, config.concurrency
        ),
        quiet,
    );
    let context: Arc<dyn BrowserContext> =
        Arc::new(HttpBrowser::new().context("Failed to build HTTP client")?);
    let summary = run_scrape(config, context)
        .await
        .with_context(|| format!("Scrape of {} failed", config.catalog_url))?;
    println!("{}", format_scrape_summary(&summary, &config.output));
    Ok(summary)
}

async fn transform(config: &TransformConfig, quiet: bool) -> Result<TransformSummary> {
    print_step(
        &format!("Transforming {}", config.input.display()),
        quiet,
    );
    debug!("Using model {} at {}", config.model, config.base_url);
    let classifier = classifier_from_config(config)?;
    let summary = run_transform(config, classifier)
        .await
        .with_context(|| format!("Transform of {} failed", config.input.display()))?;
    print!("{}", format_transform_summary(&summary, config));
    Ok(summary)
}

pub async fn handle_scrape(sub_matches: &ArgMatches, quiet: bool) -> Result<()> {
    let config = scrape_config_from_args(sub_matches, quiet);
    scrape(&config, quiet).await?;
    Ok(())
}

pub async fn handle_transform(sub_matches: &ArgMatches, quiet: bool) -> Result<()> {
    let config = transform_config_from_args(sub_matches, None, api_key_from_env(), quiet);
    transform(&config, quiet).await?;
    Ok(())
}

pub async fn handle_run(sub_matches: &ArgMatches, quiet: bool) -> Result<()> {
    let scrape_config = scrape_config_from_args(sub_matches, quiet);
    let transform_config = transform_config_from_args(
        sub_matches,
        Some(scrape_config.output.clone()),
        api_key_from_env(),
        quiet,
    );

    // Fail on a missing key or prompt before spending time on the scrape.
    classifier_from_config(&transform_config)?;

    scrape(&scrape_config, quiet).await?;
    transform(&transform_config, quiet).await?;
    Ok(())
}
