use crate::classifier::{DEFAULT_BASE_URL, DEFAULT_MODEL, RetryPolicy};
use pantry_scanner::extract::EXTRACT_TIMEOUT;
use pantry_scanner::fetcher::{DEFAULT_CONCURRENCY, DEFAULT_NAVIGATION_TIMEOUT};
use pantry_scanner::listing::CATALOG_TIMEOUT;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CATALOG_URL: &str = "https://www.mulinobianco.it/prodotti/biscotti-e-dolcetti";
pub const DEFAULT_OUTPUT_DIR: &str = "scraped";
pub const PRODUCTS_FILE: &str = "products.csv";
pub const SNAPSHOT_FILE: &str = "ingredients.txt";
pub const FREQUENCY_FILE: &str = "ingredients_freq.json";
pub const NUTRITION_FILE: &str = "nutrition.csv";
pub const PROMPT_FILE: &str = "prompt.txt";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Settings for the listing + detail fetch phase.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub catalog_url: String,
    pub concurrency: usize,
    pub catalog_timeout: Duration,
    pub navigation_timeout: Duration,
    pub extract_timeout: Duration,
    pub output: PathBuf,
    pub show_progress: bool,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            catalog_timeout: CATALOG_TIMEOUT,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            extract_timeout: EXTRACT_TIMEOUT,
            output: PathBuf::from(DEFAULT_OUTPUT_DIR).join(PRODUCTS_FILE),
            show_progress: false,
        }
    }
}

/// Settings for the normalization phase.
#[derive(Debug, Clone)]
pub struct TransformConfig {
    pub input: PathBuf,
    pub snapshot: PathBuf,
    pub prompt_file: PathBuf,
    pub out_dir: PathBuf,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub retry: RetryPolicy,
    pub show_progress: bool,
}

impl Default for TransformConfig {
    fn default() -> Self {
        let out_dir = PathBuf::from(DEFAULT_OUTPUT_DIR);
        Self {
            input: out_dir.join(PRODUCTS_FILE),
            snapshot: out_dir.join(SNAPSHOT_FILE),
            prompt_file: PathBuf::from(PROMPT_FILE),
            out_dir,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            retry: RetryPolicy::default(),
            show_progress: false,
        }
    }
}

impl TransformConfig {
    pub fn frequency_path(&self) -> PathBuf {
        self.out_dir.join(FREQUENCY_FILE)
    }

    pub fn nutrition_path(&self) -> PathBuf {
        self.out_dir.join(NUTRITION_FILE)
    }

    /// Cleaned lists land under the snapshot file name so the next run can fall back on them.
    pub fn cleaned_path(&self) -> PathBuf {
        self.out_dir.join(SNAPSHOT_FILE)
    }
}
