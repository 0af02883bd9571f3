use serde::{Deserialize, Serialize};

/// Placeholder stored when a field was attempted but could not be extracted.
pub const NOT_AVAILABLE: &str = "N/A";

/// Catalog entry as collected from the listing page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductStub {
    pub name: String,
    pub image_url: String,
    pub detail_url: String,
}

impl ProductStub {
    pub fn new(
        name: impl Into<String>,
        image_url: impl Into<String>,
        detail_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            image_url: image_url.into(),
            detail_url: detail_url.into(),
        }
    }
}

/// A stub enriched with the raw fields read from its detail page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub stub: ProductStub,
    pub ingredients_raw: String,
    pub nutrition_raw: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProductDetail {
    pub fn new(stub: ProductStub, ingredients_raw: String, nutrition_raw: Vec<Vec<String>>) -> Self {
        Self {
            stub,
            ingredients_raw,
            nutrition_raw,
            error: None,
        }
    }

    /// Detail for a page that could not be loaded: both fields hold their sentinel.
    pub fn with_error(stub: ProductStub, error: String) -> Self {
        Self {
            stub,
            ingredients_raw: NOT_AVAILABLE.to_string(),
            nutrition_raw: Vec::new(),
            error: Some(error),
        }
    }

    pub fn name(&self) -> &str {
        &self.stub.name
    }

    pub fn detail_url(&self) -> &str {
        &self.stub.detail_url
    }

    pub fn has_ingredients(&self) -> bool {
        self.ingredients_raw != NOT_AVAILABLE
    }
}
