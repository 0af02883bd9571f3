use crate::error::{Result, ScanError};
use crate::extract::{IngredientSectionExtractor, NutritionTableExtractor};
use crate::product::{ProductDetail, ProductStub};
use crate::session::{BrowserContext, PageSession};
use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

pub const DEFAULT_CONCURRENCY: usize = 6;
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Called after each detail page with `(completed, detail_url)`.
pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;

/// Fetches product detail pages with at most `concurrency` pages open at once.
pub struct BoundedFetcher {
    context: Arc<dyn BrowserContext>,
    concurrency: usize,
    navigation_timeout: Duration,
    ingredients: IngredientSectionExtractor,
    nutrition: NutritionTableExtractor,
    progress_callback: Option<ProgressCallback>,
}

impl BoundedFetcher {
    pub fn new(context: Arc<dyn BrowserContext>) -> Self {
        Self {
            context,
            concurrency: DEFAULT_CONCURRENCY,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            ingredients: IngredientSectionExtractor::default(),
            nutrition: NutritionTableExtractor::default(),
            progress_callback: None,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub fn with_extractors(
        mut self,
        ingredients: IngredientSectionExtractor,
        nutrition: NutritionTableExtractor,
    ) -> Self {
        self.ingredients = ingredients;
        self.nutrition = nutrition;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Returns one detail per stub, in the order the stubs were given.
    pub async fn fetch_all(&self, stubs: Vec<ProductStub>) -> Result<Vec<ProductDetail>> {
        info!(
            "Fetching {} product pages with {} concurrent pages",
            stubs.len(),
            self.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let completed = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::with_capacity(stubs.len());

        for stub in stubs {
            let context = self.context.clone();
            let semaphore = semaphore.clone();
            let completed = completed.clone();
            let progress_cb = self.progress_callback.clone();
            let ingredients = self.ingredients.clone();
            let nutrition = self.nutrition.clone();
            let timeout = self.navigation_timeout;

            let handle = tokio::spawn(async move {
                let detail = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        fetch_detail(context.as_ref(), stub, timeout, &ingredients, &nutrition)
                            .await
                    }
                    Err(e) => ProductDetail::with_error(stub, format!("semaphore closed: {}", e)),
                };

                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(ref callback) = progress_cb {
                    callback(done, detail.stub.detail_url.clone());
                }
                detail
            });

            handles.push(handle);
        }

        // join_all yields results in handle order, not completion order.
        let details = join_all(handles)
            .await
            .into_iter()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(ScanError::JoinError)?;

        let failed = details.iter().filter(|d| d.error.is_some()).count();
        info!(
            "Fetched {} product pages ({} failed)",
            details.len(),
            failed
        );
        Ok(details)
    }
}

/// Opens a page for `stub`, extracts both fields and always closes the page.
/// Page-level failures yield a detail carrying sentinels and the error.
pub async fn fetch_detail(
    context: &dyn BrowserContext,
    stub: ProductStub,
    navigation_timeout: Duration,
    ingredients: &IngredientSectionExtractor,
    nutrition: &NutritionTableExtractor,
) -> ProductDetail {
    let mut page = match context.open_page().await {
        Ok(page) => page,
        Err(e) => {
            warn!("Could not open page for {}: {}", stub.detail_url, e);
            return ProductDetail::with_error(stub, e.to_string());
        }
    };

    let outcome = navigate_and_extract(
        page.as_mut(),
        &stub.detail_url,
        navigation_timeout,
        ingredients,
        nutrition,
    )
    .await;

    if let Err(e) = page.close().await {
        warn!("Failed to close page for {}: {}", stub.detail_url, e);
    }

    match outcome {
        Ok((ingredients_raw, nutrition_raw)) => {
            ProductDetail::new(stub, ingredients_raw, nutrition_raw)
        }
        Err(e) => {
            warn!("Failed to fetch {}: {}", stub.detail_url, e);
            ProductDetail::with_error(stub, e.to_string())
        }
    }
}

async fn navigate_and_extract(
    page: &mut dyn PageSession,
    url: &str,
    timeout: Duration,
    ingredients: &IngredientSectionExtractor,
    nutrition: &NutritionTableExtractor,
) -> Result<(String, Vec<Vec<String>>)> {
    debug!("Fetching {}", url);
    page.navigate(url, timeout).await?;
    let ingredients_raw = ingredients.extract(page).await;
    let nutrition_raw = nutrition.extract(page).await;
    Ok((ingredients_raw, nutrition_raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::NOT_AVAILABLE;
    use crate::session::HttpBrowser;
    use crate::testing::FakeBrowser;
    use std::sync::Mutex as StdMutex;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn detail_page(ingredient: &str) -> String {
        format!(
            r#"<html><body>
              <div class="ingredients-box"><div class="text-cnt">
                <h5 class="mb-blue-title">CON</h5><p>{ingredient}</p>
              </div></div>
              <div id="nutritionalValues"><table>
                <tr><td>SALE</td><td>0,5 g</td></tr>
              </table></div>
            </body></html>"#
        )
    }

    fn stub(i: usize) -> ProductStub {
        ProductStub::new(
            format!("Product {}", i),
            format!("http://shop.test/img/{}.png", i),
            format!("http://shop.test/p/{}", i),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_pages_never_exceed_ceiling() {
        let browser = FakeBrowser::new(
            (0..20).map(|i| (stub(i).detail_url, detail_page(&format!("item{}", i)))),
        )
        .with_delay(Duration::from_millis(50));
        let counters = browser.counters.clone();

        let fetcher = BoundedFetcher::new(Arc::new(browser)).with_concurrency(3);
        let details = fetcher.fetch_all((0..20).map(stub).collect()).await.unwrap();

        assert_eq!(details.len(), 20);
        let peak = counters.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak of {} open pages exceeds ceiling", peak);
        assert_eq!(peak, 3);
        assert_eq!(counters.opened.load(Ordering::SeqCst), 20);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 20);
        assert_eq!(counters.open.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_details_stay_paired_with_their_stubs() {
        let browser = FakeBrowser::new(
            (0..8).map(|i| (stub(i).detail_url, detail_page(&format!("item{}", i)))),
        )
        .with_delay(Duration::from_millis(5));

        let fetcher = BoundedFetcher::new(Arc::new(browser)).with_concurrency(2);
        let details = fetcher.fetch_all((0..8).map(stub).collect()).await.unwrap();

        for (i, detail) in details.iter().enumerate() {
            assert_eq!(detail.stub, stub(i));
            assert_eq!(detail.ingredients_raw, format!("item{}", i));
            assert_eq!(detail.nutrition_raw, vec![vec!["SALE".to_string(), "0,5 g".to_string()]]);
            assert!(detail.error.is_none());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_page_yields_sentinel_detail() {
        // Only stubs 0 and 2 have a page; stub 1 fails navigation.
        let browser = FakeBrowser::new([
            (stub(0).detail_url, detail_page("zucchero")),
            (stub(2).detail_url, detail_page("farina")),
        ]);
        let counters = browser.counters.clone();

        let fetcher = BoundedFetcher::new(Arc::new(browser)).with_concurrency(1);
        let details = fetcher.fetch_all((0..3).map(stub).collect()).await.unwrap();

        assert_eq!(details.len(), 3);
        assert_eq!(details[0].ingredients_raw, "zucchero");
        assert_eq!(details[2].ingredients_raw, "farina");

        let failed = &details[1];
        assert_eq!(failed.stub, stub(1));
        assert_eq!(failed.ingredients_raw, NOT_AVAILABLE);
        assert!(failed.nutrition_raw.is_empty());
        assert!(failed.error.as_deref().unwrap().contains("HTTP 404"));

        // The failed page was still closed.
        assert_eq!(counters.closed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_progress_callback_reports_every_item() {
        let browser = FakeBrowser::new((0..4).map(|i| (stub(i).detail_url, detail_page("x"))));
        let seen: Arc<StdMutex<Vec<(usize, String)>>> = Arc::new(StdMutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let fetcher = BoundedFetcher::new(Arc::new(browser))
            .with_concurrency(2)
            .with_progress_callback(Arc::new(move |done, url| {
                seen_clone.lock().unwrap().push((done, url));
            }));
        fetcher.fetch_all((0..4).map(stub).collect()).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        let mut counts: Vec<usize> = seen.iter().map(|(done, _)| *done).collect();
        counts.sort();
        assert_eq!(counts, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_fetch_over_http() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/p/ok"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string(detail_page("cacao")),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/p/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let stubs = vec![
            ProductStub::new("Ok", "img", format!("{}/p/ok", mock_server.uri())),
            ProductStub::new("Broken", "img", format!("{}/p/broken", mock_server.uri())),
        ];

        let fetcher = BoundedFetcher::new(Arc::new(HttpBrowser::new().unwrap()))
            .with_navigation_timeout(Duration::from_secs(5));
        let details = fetcher.fetch_all(stubs).await.unwrap();

        assert_eq!(details[0].ingredients_raw, "cacao");
        assert!(details[0].error.is_none());
        assert_eq!(details[1].ingredients_raw, NOT_AVAILABLE);
        assert!(details[1].error.as_deref().unwrap().contains("HTTP 500"));
    }
}
