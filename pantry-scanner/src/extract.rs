// Field extractors for product detail pages. Both are fail-soft: every error
// is logged and reduced to the field's sentinel.

use crate::error::Result;
use crate::product::NOT_AVAILABLE;
use crate::session::{PageSession, parse_selector};
use scraper::{ElementRef, Html};
use std::time::Duration;
use tracing::{debug, warn};

pub const INGREDIENTS_CONTAINER: &str = "div.ingredients-box div.text-cnt";
pub const INGREDIENTS_HEADING: &str = "h5.mb-blue-title";
/// Heading prefix of the "contains" section.
pub const CONTAINS_MARKER: &str = "CON";
pub const NUTRITION_TABLE: &str = "#nutritionalValues table";
pub const EXTRACT_TIMEOUT: Duration = Duration::from_secs(8);

/// Reads the cleaned text of the "CON..." ingredient section.
#[derive(Debug, Clone)]
pub struct IngredientSectionExtractor {
    container: String,
    heading: String,
    marker: String,
    timeout: Duration,
}

impl Default for IngredientSectionExtractor {
    fn default() -> Self {
        Self {
            container: INGREDIENTS_CONTAINER.to_string(),
            heading: INGREDIENTS_HEADING.to_string(),
            marker: CONTAINS_MARKER.to_string(),
            timeout: EXTRACT_TIMEOUT,
        }
    }
}

impl IngredientSectionExtractor {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_selectors(mut self, container: &str, heading: &str) -> Self {
        self.container = container.to_string();
        self.heading = heading.to_string();
        self
    }

    /// Returns the section text, or `"N/A"` when it is missing.
    pub async fn extract(&self, page: &dyn PageSession) -> String {
        match self.try_extract(page).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!(
                    "No '{}' ingredient section on {}",
                    self.marker,
                    page.current_url().unwrap_or("<unknown>")
                );
                NOT_AVAILABLE.to_string()
            }
            Err(e) => {
                warn!("Error extracting ingredients: {}", e);
                NOT_AVAILABLE.to_string()
            }
        }
    }

    async fn try_extract(&self, page: &dyn PageSession) -> Result<Option<String>> {
        page.wait_for_selector(&self.container, self.timeout).await?;
        for block in page.query_all_html(&self.container).await? {
            if let Some(text) = section_text(&block, &self.heading, &self.marker)? {
                return Ok(Some(text));
            }
        }
        Ok(None)
    }
}

/// Finds the first heading starting with `marker` inside `html` and returns the
/// whitespace-collapsed text of its next sibling element, links flattened to
/// their text.
pub fn section_text(html: &str, heading_selector: &str, marker: &str) -> Result<Option<String>> {
    let heading_selector = parse_selector(heading_selector)?;
    let fragment = Html::parse_fragment(html);

    for heading in fragment.select(&heading_selector) {
        let title = heading.text().collect::<String>().trim().to_uppercase();
        if !title.starts_with(marker) {
            continue;
        }

        let Some(block) = heading.next_siblings().find_map(ElementRef::wrap) else {
            debug!("Heading '{}' has no sibling block", title);
            return Ok(None);
        };
        return Ok(Some(collapse_text(block)));
    }

    Ok(None)
}

// Anchor contents are plain text nodes of the block, so walking every text
// node is the same as replacing each link with its text first.
// `split_whitespace` also splits on non-breaking spaces.
fn collapse_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reads the nutrition table as rows of non-empty cell texts.
#[derive(Debug, Clone)]
pub struct NutritionTableExtractor {
    table: String,
    timeout: Duration,
}

impl Default for NutritionTableExtractor {
    fn default() -> Self {
        Self {
            table: NUTRITION_TABLE.to_string(),
            timeout: EXTRACT_TIMEOUT,
        }
    }
}

impl NutritionTableExtractor {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the table rows, or an empty list when the table is missing.
    pub async fn extract(&self, page: &dyn PageSession) -> Vec<Vec<String>> {
        match self.try_extract(page).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Error extracting nutrition table: {}", e);
                Vec::new()
            }
        }
    }

    async fn try_extract(&self, page: &dyn PageSession) -> Result<Vec<Vec<String>>> {
        page.wait_for_selector(&self.table, self.timeout).await?;
        match page.query_html(&self.table).await? {
            Some(html) => table_rows(&html),
            None => Ok(Vec::new()),
        }
    }
}

/// One entry per `tr` with at least one non-empty `td`; blank cells are dropped.
pub fn table_rows(html: &str) -> Result<Vec<Vec<String>>> {
    let row_selector = parse_selector("tr")?;
    let cell_selector = parse_selector("td")?;
    let fragment = Html::parse_fragment(html);

    let rows = fragment
        .select(&row_selector)
        .map(|row| {
            row.select(&cell_selector)
                .map(collapse_text)
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|cells| !cells.is_empty())
        .collect();

    Ok(rows)
}
