pub mod error;
pub mod extract;
pub mod fetcher;
pub mod listing;
pub mod product;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use error::ScanError;
pub use extract::{IngredientSectionExtractor, NutritionTableExtractor};
pub use fetcher::{BoundedFetcher, ProgressCallback};
pub use listing::{ConsentOutcome, ListingCollector};
pub use product::{NOT_AVAILABLE, ProductDetail, ProductStub};
pub use session::{BrowserContext, HttpBrowser, PageSession};
