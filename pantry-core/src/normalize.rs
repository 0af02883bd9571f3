// Ingredient normalization: classify each record's raw ingredient text, falling
// back to the previous run's lists when the classifier cannot be used.

use crate::classifier::RateLimitedClassifier;
use crate::frequency::FrequencyTable;
use pantry_scanner::ProductDetail;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// How a record's token list was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationOutcome {
    Parsed { attempts: usize },
    Fallback,
    /// Classification failed and the snapshot has no entry for the record.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngredientList {
    pub tokens: Vec<String>,
    pub outcome: ClassificationOutcome,
}

impl IngredientList {
    pub fn is_fallback(&self) -> bool {
        !matches!(self.outcome, ClassificationOutcome::Parsed { .. })
    }
}

/// Ingredient lists from a previous run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackSnapshot {
    /// Entry `i` belongs to record `i` of the current run.
    Positional(Vec<Vec<String>>),
    /// Entries keyed by product detail URL.
    Keyed(HashMap<String, Vec<String>>),
}

impl Default for FallbackSnapshot {
    fn default() -> Self {
        FallbackSnapshot::Positional(Vec::new())
    }
}

impl FallbackSnapshot {
    pub fn lookup(&self, index: usize, detail_url: &str) -> Option<&[String]> {
        match self {
            FallbackSnapshot::Positional(lists) => lists.get(index).map(Vec::as_slice),
            FallbackSnapshot::Keyed(lists) => lists.get(detail_url).map(Vec::as_slice),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FallbackSnapshot::Positional(lists) => lists.len(),
            FallbackSnapshot::Keyed(lists) => lists.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Called after each record with `(completed, total)`.
pub type NormalizeProgress = Arc<dyn Fn(usize, usize) + Send + Sync>;

pub struct IngredientNormalizer {
    client: RateLimitedClassifier,
    fallback: FallbackSnapshot,
    progress: Option<NormalizeProgress>,
}

impl IngredientNormalizer {
    pub fn new(client: RateLimitedClassifier, fallback: FallbackSnapshot) -> Self {
        Self {
            client,
            fallback,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: NormalizeProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Normalizes one record and folds its tokens into `table`.
    pub async fn normalize_one(
        &mut self,
        index: usize,
        detail: &ProductDetail,
        table: &mut FrequencyTable,
    ) -> IngredientList {
        let list = match self.client.classify_tokens(&detail.ingredients_raw).await {
            Ok(classified) => {
                info!("Record #{} ({}): {:?}", index, detail.name(), classified.tokens);
                IngredientList {
                    tokens: classified.tokens,
                    outcome: ClassificationOutcome::Parsed {
                        attempts: classified.attempts,
                    },
                }
            }
            Err(e) => match self.fallback.lookup(index, detail.detail_url()) {
                Some(tokens) => {
                    warn!(
                        "Failed to get ingredients while processing record #{} ({}), using previous snapshot: {}",
                        index,
                        detail.name(),
                        e
                    );
                    IngredientList {
                        tokens: tokens.to_vec(),
                        outcome: ClassificationOutcome::Fallback,
                    }
                }
                None => {
                    warn!(
                        "Failed to get ingredients for record #{} ({}) and the snapshot has no entry for it: {}",
                        index,
                        detail.name(),
                        e
                    );
                    IngredientList {
                        tokens: Vec::new(),
                        outcome: ClassificationOutcome::Unavailable,
                    }
                }
            },
        };

        table.record(list.tokens.as_slice());
        list
    }

    /// Processes records in order; output position `i` belongs to input `i`.
    pub async fn run(mut self, details: &[ProductDetail]) -> (Vec<IngredientList>, FrequencyTable) {
        if let FallbackSnapshot::Positional(lists) = &self.fallback
            && !lists.is_empty()
            && lists.len() != details.len()
        {
            warn!(
                "Snapshot has {} entries but {} records are being processed; positional fallback may be misaligned",
                lists.len(),
                details.len()
            );
        }

        let mut table = FrequencyTable::new();
        let mut lists = Vec::with_capacity(details.len());

        for (index, detail) in details.iter().enumerate() {
            lists.push(self.normalize_one(index, detail, &mut table).await);
            if let Some(ref progress) = self.progress {
                progress(index + 1, details.len());
            }
        }

        let fallbacks = lists.iter().filter(|l| l.is_fallback()).count();
        info!(
            "Normalized {} records ({} from snapshot), {} distinct ingredients",
            lists.len(),
            fallbacks,
            table.len()
        );
        (lists, table)
    }
}
