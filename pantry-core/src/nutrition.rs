// Deterministic decoding of raw nutrition table rows.

use pantry_scanner::ProductDetail;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub const ENERGY_COLUMN: &str = "energia (kcal)";
pub const ENERGY_ROW: usize = 2;
pub const FIRST_NUTRIENT_ROW: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Nutrient {
    Energia,
    Fibre,
    Proteine,
    Sale,
    Carboidrati,
    Grassi,
}

impl Nutrient {
    pub const ALL: [Nutrient; 6] = [
        Nutrient::Energia,
        Nutrient::Fibre,
        Nutrient::Proteine,
        Nutrient::Sale,
        Nutrient::Carboidrati,
        Nutrient::Grassi,
    ];

    /// Output column name.
    pub fn column(&self) -> &'static str {
        match self {
            Nutrient::Energia => "energia (g)",
            Nutrient::Fibre => "fibre (g)",
            Nutrient::Proteine => "proteine (g)",
            Nutrient::Sale => "sale (g)",
            Nutrient::Carboidrati => "carboidrati (g)",
            Nutrient::Grassi => "grassi (g)",
        }
    }

    /// Matches a row label: exact for the plain labels, prefix for the
    /// labels that carry a qualifier ("CARBOIDRATI totali", "GRASSI di cui...").
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        match label {
            "ENERGIA" => Some(Nutrient::Energia),
            "FIBRE" => Some(Nutrient::Fibre),
            "PROTEINE" => Some(Nutrient::Proteine),
            "SALE" => Some(Nutrient::Sale),
            _ if label.starts_with("CARBOIDRATI") => Some(Nutrient::Carboidrati),
            _ if label.starts_with("GRASSI") => Some(Nutrient::Grassi),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionRecord {
    pub name: String,
    /// `None` when the energy row could not be decoded.
    pub energy_kcal: Option<u32>,
    pub nutrients: BTreeMap<Nutrient, f64>,
}

impl NutritionRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            energy_kcal: None,
            nutrients: BTreeMap::new(),
        }
    }

    pub fn grams(&self, nutrient: Nutrient) -> Option<f64> {
        self.nutrients.get(&nutrient).copied()
    }
}

#[derive(Debug, Clone)]
pub struct NutritionParser {
    energy_row: usize,
    first_nutrient_row: usize,
}

impl Default for NutritionParser {
    fn default() -> Self {
        Self {
            energy_row: ENERGY_ROW,
            first_nutrient_row: FIRST_NUTRIENT_ROW,
        }
    }
}

impl NutritionParser {
    pub fn parse_all(&self, details: &[ProductDetail]) -> Vec<NutritionRecord> {
        details
            .iter()
            .map(|detail| self.parse(detail.name(), &detail.nutrition_raw))
            .collect()
    }

    /// Decodes what it can; fields that do not parse are left out.
    pub fn parse(&self, name: &str, rows: &[Vec<String>]) -> NutritionRecord {
        let mut record = NutritionRecord::new(name);

        if rows.is_empty() {
            debug!("No nutrition rows for {}", name);
            return record;
        }

        record.energy_kcal = self.energy(rows);
        if record.energy_kcal.is_none() {
            warn!("Could not read energy (kcal) for {}", name);
        }

        for row in rows.iter().skip(self.first_nutrient_row) {
            let [label, value, ..] = row.as_slice() else {
                continue;
            };
            let Some(nutrient) = Nutrient::from_label(label) else {
                continue;
            };
            match parse_grams(value) {
                Some(grams) => {
                    record.nutrients.insert(nutrient, grams);
                }
                None => warn!(
                    "Skipping {} for {}: cannot parse '{}'",
                    nutrient.column(),
                    name,
                    value
                ),
            }
        }

        record
    }

    // The energy row has no stable label of its own, so it is read by
    // position first and only searched for by label when that fails.
    fn energy(&self, rows: &[Vec<String>]) -> Option<u32> {
        if let Some(kcal) = rows
            .get(self.energy_row)
            .and_then(|row| row.get(1))
            .and_then(|cell| parse_kcal(cell))
        {
            return Some(kcal);
        }

        rows.iter()
            .filter(|row| row.first().is_some_and(|l| l.trim().starts_with("ENERGIA")))
            .filter_map(|row| row.get(1))
            .filter(|cell| cell.to_lowercase().contains("kcal"))
            .find_map(|cell| parse_kcal(cell))
    }
}

/// Reads the kilocalorie figure from a cell such as `"1890 kJ / 450 kcal"`:
/// the number next to the `kcal` unit, else the third whitespace token.
pub fn parse_kcal(cell: &str) -> Option<u32> {
    let lower = cell.to_ascii_lowercase();

    if let Some(pos) = lower.find("kcal") {
        let before = lower[..pos].trim_end();
        let mut leading: Vec<char> = before.chars().rev().take_while(|c| is_number_char(*c)).collect();
        leading.reverse();
        if let Some(kcal) = whole_kcal(&leading.into_iter().collect::<String>()) {
            return Some(kcal);
        }

        let after = lower[pos + "kcal".len()..].trim_start();
        let trailing: String = after.chars().take_while(|c| is_number_char(*c)).collect();
        if let Some(kcal) = whole_kcal(&trailing) {
            return Some(kcal);
        }
    }

    cell.split_whitespace().nth(2).and_then(whole_kcal)
}

fn is_number_char(c: char) -> bool {
    c.is_ascii_digit() || c == '.' || c == ','
}

/// Integer part of a number written with `.` or `,` separators. A final group
/// of exactly three digits is a thousands group (`1.200`), anything else is a
/// decimal part (`450,5`).
fn whole_kcal(token: &str) -> Option<u32> {
    let token = token.trim_matches(|c| c == '.' || c == ',');
    let integer = match token.rfind(['.', ',']) {
        Some(i) if token[i + 1..].chars().filter(char::is_ascii_digit).count() == 3 => token,
        Some(i) => &token[..i],
        None => token,
    };
    digits(integer)
}

fn digits(token: &str) -> Option<u32> {
    let digits: String = token.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

/// Reads a gram quantity such as `"3,2 g"` or `"< 0,5 g"`.
pub fn parse_grams(cell: &str) -> Option<f64> {
    let amount = cell.split(" g").next().unwrap_or(cell).replace(',', ".");
    let cleaned: String = amount
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}
