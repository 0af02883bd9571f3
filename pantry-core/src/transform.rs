use crate::classifier::{Classifier, GeminiClassifier, RateLimitedClassifier};
use crate::config::{API_KEY_ENV, TransformConfig};
use crate::error::{PipelineError, Result};
use crate::frequency::FrequencyTable;
use crate::normalize::{FallbackSnapshot, IngredientList, IngredientNormalizer, NormalizeProgress};
use crate::nutrition::{NutritionParser, NutritionRecord};
use crate::store;
use indicatif::{ProgressBar, ProgressStyle};
use pantry_scanner::ProductDetail;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub ingredients: Vec<IngredientList>,
    pub frequencies: FrequencyTable,
    pub nutrition: Vec<NutritionRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformSummary {
    pub records: usize,
    pub fallbacks: usize,
    pub distinct_ingredients: usize,
    pub nutrition_records: usize,
}

/// Runs ingredient normalization and nutrition parsing side by side. The two
/// stages only read `details` and share nothing else.
pub async fn execute_transform(
    details: &[ProductDetail],
    normalizer: IngredientNormalizer,
    parser: &NutritionParser,
) -> TransformOutput {
    let ((ingredients, frequencies), nutrition) = tokio::join!(normalizer.run(details), async {
        parser.parse_all(details)
    });

    TransformOutput {
        ingredients,
        frequencies,
        nutrition,
    }
}

/// Builds the default classifier from the configuration.
pub fn classifier_from_config(config: &TransformConfig) -> Result<Arc<dyn Classifier>> {
    let api_key = config
        .api_key
        .clone()
        .ok_or_else(|| PipelineError::Config(format!("{} is not set", API_KEY_ENV)))?;
    let prompt = store::read_prompt(&config.prompt_file)?;
    let classifier = GeminiClassifier::with_base_url(&config.base_url, &api_key, &config.model, prompt)?;
    Ok(Arc::new(classifier))
}

/// Loads the products CSV and snapshot, runs both stages and writes the
/// frequency table, the nutrition table and the cleaned ingredient lists.
pub async fn run_transform(
    config: &TransformConfig,
    classifier: Arc<dyn Classifier>,
) -> Result<TransformSummary> {
    let details = store::read_products_csv(&config.input)?;
    info!("Loaded {} products from {}", details.len(), config.input.display());

    let snapshot = if config.snapshot.exists() {
        store::read_snapshot(&config.snapshot)?
    } else {
        warn!(
            "No ingredient snapshot at {}; failed records will have no fallback",
            config.snapshot.display()
        );
        FallbackSnapshot::default()
    };

    let mut normalizer =
        IngredientNormalizer::new(RateLimitedClassifier::new(classifier, config.retry), snapshot);

    let progress_bar = if config.show_progress {
        let pb = ProgressBar::new(details.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message("Classifying ingredients...");
        let pb = Arc::new(pb);
        let pb_clone = pb.clone();
        let progress: NormalizeProgress = Arc::new(move |done: usize, _total: usize| {
            pb_clone.set_position(done as u64);
        });
        normalizer = normalizer.with_progress(progress);
        Some(pb)
    } else {
        None
    };

    let output = execute_transform(&details, normalizer, &NutritionParser::default()).await;

    if let Some(ref pb) = progress_bar {
        pb.finish_with_message("done");
    }

    store::write_frequency_json(&config.frequency_path(), &output.frequencies)?;
    store::write_nutrition_csv(&config.nutrition_path(), &output.nutrition)?;
    let cleaned: Vec<Vec<String>> = output
        .ingredients
        .iter()
        .map(|list| list.tokens.clone())
        .collect();
    store::write_snapshot(&config.cleaned_path(), &cleaned)?;

    Ok(TransformSummary {
        records: output.ingredients.len(),
        fallbacks: output.ingredients.iter().filter(|l| l.is_fallback()).count(),
        distinct_ingredients: output.frequencies.len(),
        nutrition_records: output.nutrition.len(),
    })
}
