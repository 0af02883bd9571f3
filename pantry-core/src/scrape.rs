use crate::config::ScrapeConfig;
use crate::error::Result;
use crate::store;
use indicatif::{ProgressBar, ProgressStyle};
use pantry_scanner::{
    BoundedFetcher, BrowserContext, IngredientSectionExtractor, ListingCollector,
    NutritionTableExtractor, ProductDetail, ProgressCallback,
};
use std::sync::Arc;
use tracing::info;

/// Outcome of a scrape run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeSummary {
    pub products: usize,
    pub failed_pages: usize,
    pub missing_ingredients: usize,
    pub missing_nutrition: usize,
}

impl ScrapeSummary {
    pub fn from_details(details: &[ProductDetail]) -> Self {
        Self {
            products: details.len(),
            failed_pages: details.iter().filter(|d| d.error.is_some()).count(),
            missing_ingredients: details.iter().filter(|d| !d.has_ingredients()).count(),
            missing_nutrition: details.iter().filter(|d| d.nutrition_raw.is_empty()).count(),
        }
    }
}

/// Collects the catalog and fetches every product page.
pub async fn execute_scrape(
    config: &ScrapeConfig,
    context: Arc<dyn BrowserContext>,
) -> Result<Vec<ProductDetail>> {
    let collector = ListingCollector::new(context.clone(), &config.catalog_url)?
        .with_navigation_timeout(config.catalog_timeout);
    let stubs = collector.collect().await?;

    let progress_bar = if config.show_progress {
        let pb = ProgressBar::new(stubs.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message("Extracting ingredients from product pages...");
        Some(Arc::new(pb))
    } else {
        None
    };

    let mut fetcher = BoundedFetcher::new(context)
        .with_concurrency(config.concurrency)
        .with_navigation_timeout(config.navigation_timeout)
        .with_extractors(
            IngredientSectionExtractor::default().with_timeout(config.extract_timeout),
            NutritionTableExtractor::default().with_timeout(config.extract_timeout),
        );

    if let Some(ref pb) = progress_bar {
        let pb_clone = pb.clone();
        let callback: ProgressCallback = Arc::new(move |_done: usize, _url: String| {
            pb_clone.inc(1);
        });
        fetcher = fetcher.with_progress_callback(callback);
    }

    let details = fetcher.fetch_all(stubs).await?;

    if let Some(ref pb) = progress_bar {
        pb.finish_with_message("done");
    }

    Ok(details)
}

/// Runs the scrape and saves the products CSV.
pub async fn run_scrape(
    config: &ScrapeConfig,
    context: Arc<dyn BrowserContext>,
) -> Result<ScrapeSummary> {
    let details = execute_scrape(config, context).await?;
    store::write_products_csv(&config.output, &details)?;

    let summary = ScrapeSummary::from_details(&details);
    info!(
        "Scraped {} products ({} failed pages)",
        summary.products, summary.failed_pages
    );
    Ok(summary)
}
