// Persisted inputs and outputs of a run.

use crate::error::{PipelineError, Result};
use crate::frequency::FrequencyTable;
use crate::literal;
use crate::normalize::FallbackSnapshot;
use crate::nutrition::{ENERGY_COLUMN, Nutrient, NutritionRecord};
use pantry_scanner::{ProductDetail, ProductStub};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;

/// One line of the products CSV. `nutrition` holds the raw rows as a JSON
/// array of arrays.
#[derive(Debug, Serialize, Deserialize)]
struct ProductRow {
    name: String,
    image_url: String,
    detail_url: String,
    ingredients: String,
    nutrition: String,
    #[serde(default)]
    error: Option<String>,
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn write_products_csv(path: &Path, details: &[ProductDetail]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    for detail in details {
        writer.serialize(ProductRow {
            name: detail.stub.name.clone(),
            image_url: detail.stub.image_url.clone(),
            detail_url: detail.stub.detail_url.clone(),
            ingredients: detail.ingredients_raw.clone(),
            nutrition: serde_json::to_string(&detail.nutrition_raw)?,
            error: detail.error.clone(),
        })?;
    }
    writer.flush()?;
    info!("Saved {} products to {}", details.len(), path.display());
    Ok(())
}

/// Reads a products CSV. The nutrition column may be JSON or a literal list.
pub fn read_products_csv(path: &Path) -> Result<Vec<ProductDetail>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut details = Vec::new();

    for row in reader.deserialize::<ProductRow>() {
        let row = row?;
        let nutrition_raw = if row.nutrition.trim().is_empty() {
            Vec::new()
        } else {
            literal::parse_token_lists(&row.nutrition)?
        };
        details.push(ProductDetail {
            stub: ProductStub::new(row.name, row.image_url, row.detail_url),
            ingredients_raw: row.ingredients,
            nutrition_raw,
            error: row.error.filter(|e| !e.is_empty()),
        });
    }

    Ok(details)
}

/// Reads a fallback snapshot: a literal list of lists (positional) or a JSON
/// object keyed by detail URL.
pub fn read_snapshot(path: &Path) -> Result<FallbackSnapshot> {
    let content = fs::read_to_string(path)?;
    let trimmed = content.trim();

    if trimmed.is_empty() {
        return Ok(FallbackSnapshot::default());
    }
    if trimmed.starts_with('{') {
        let keyed: HashMap<String, Vec<String>> = serde_json::from_str(trimmed)?;
        return Ok(FallbackSnapshot::Keyed(keyed));
    }
    Ok(FallbackSnapshot::Positional(literal::parse_token_lists(trimmed)?))
}

/// Writes ingredient lists so a later run can use them as its positional snapshot.
pub fn write_snapshot(path: &Path, lists: &[Vec<String>]) -> Result<()> {
    ensure_parent(path)?;
    fs::write(path, literal::render_token_lists(lists))?;
    Ok(())
}

pub fn write_frequency_json(path: &Path, table: &FrequencyTable) -> Result<()> {
    ensure_parent(path)?;
    fs::write(path, serde_json::to_string_pretty(table)?)?;
    info!(
        "Saved {} ingredient frequencies to {}",
        table.len(),
        path.display()
    );
    Ok(())
}

pub fn write_nutrition_csv(path: &Path, records: &[NutritionRecord]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec!["name", ENERGY_COLUMN];
    header.extend(Nutrient::ALL.iter().map(|n| n.column()));
    writer.write_record(&header)?;

    for record in records {
        let mut line = vec![
            record.name.clone(),
            record.energy_kcal.map(|k| k.to_string()).unwrap_or_default(),
        ];
        line.extend(
            Nutrient::ALL
                .iter()
                .map(|n| record.grams(*n).map(|g| g.to_string()).unwrap_or_default()),
        );
        writer.write_record(&line)?;
    }

    writer.flush()?;
    info!("Saved {} nutrition records to {}", records.len(), path.display());
    Ok(())
}

pub fn read_prompt(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| PipelineError::Config(format!("cannot read prompt {}: {}", path.display(), e)))
}
