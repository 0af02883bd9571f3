use crate::error::{Result, ScanError};
use crate::product::{NOT_AVAILABLE, ProductStub};
use crate::session::{BrowserContext, PageSession, parse_selector};
use scraper::Html;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub const CONSENT_REJECT_BUTTON: &str = "#onetrust-reject-all-handler";
pub const PRODUCT_TILE: &str =
    r#"div[mb-component="ProductListComponent"] div.thumbnail[data-type="PRODUCT"]"#;
pub const TILE_BODY: &str = ".thumbnail-product";
pub const TILE_NAME: &str = ".thumbnail__image__text .inner-text";
pub const TILE_IMAGE: &str = ".thumbnail__image img";
pub const TILE_LINK: &str = ".thumbnail__image__widelink";

pub const CATALOG_TIMEOUT: Duration = Duration::from_secs(60);
pub const CONSENT_TIMEOUT: Duration = Duration::from_secs(7);
pub const GRID_TIMEOUT: Duration = Duration::from_secs(15);

/// Result of trying to dismiss the cookie consent overlay. Never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentOutcome {
    Dismissed,
    Absent,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ListingSelectors {
    pub consent_button: String,
    pub tile: String,
    pub tile_body: String,
    pub name: String,
    pub image: String,
    pub link: String,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            consent_button: CONSENT_REJECT_BUTTON.to_string(),
            tile: PRODUCT_TILE.to_string(),
            tile_body: TILE_BODY.to_string(),
            name: TILE_NAME.to_string(),
            image: TILE_IMAGE.to_string(),
            link: TILE_LINK.to_string(),
        }
    }
}

/// Scans a catalog page once and returns its product stubs.
pub struct ListingCollector {
    context: Arc<dyn BrowserContext>,
    catalog_url: Url,
    selectors: ListingSelectors,
    navigation_timeout: Duration,
    consent_timeout: Duration,
    grid_timeout: Duration,
}

impl ListingCollector {
    pub fn new(context: Arc<dyn BrowserContext>, catalog_url: &str) -> Result<Self> {
        let catalog_url = Url::parse(catalog_url)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", catalog_url, e)))?;

        Ok(Self {
            context,
            catalog_url,
            selectors: ListingSelectors::default(),
            navigation_timeout: CATALOG_TIMEOUT,
            consent_timeout: CONSENT_TIMEOUT,
            grid_timeout: GRID_TIMEOUT,
        })
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub async fn collect(&self) -> Result<Vec<ProductStub>> {
        info!("Collecting products from {}", self.catalog_url);

        let mut page = self.context.open_page().await?;
        let result = self.collect_from(page.as_mut()).await;
        if let Err(e) = page.close().await {
            warn!("Failed to close catalog page: {}", e);
        }
        result
    }

    async fn collect_from(&self, page: &mut dyn PageSession) -> Result<Vec<ProductStub>> {
        page.navigate(self.catalog_url.as_str(), self.navigation_timeout)
            .await?;

        dismiss_consent(page, &self.selectors.consent_button, self.consent_timeout).await;

        page.wait_for_selector(&self.selectors.tile, self.grid_timeout)
            .await?;
        let tiles = page.query_all_html(&self.selectors.tile).await?;
        info!("Found {} products", tiles.len());

        let mut stubs = Vec::with_capacity(tiles.len());
        for (idx, tile) in tiles.iter().enumerate() {
            if let Some(stub) = parse_tile(tile, idx + 1, &self.catalog_url, &self.selectors)? {
                stubs.push(stub);
            }
        }

        Ok(stubs)
    }
}

/// Clicks the consent reject button if present.
pub async fn dismiss_consent(
    page: &mut dyn PageSession,
    selector: &str,
    timeout: Duration,
) -> ConsentOutcome {
    match page.click(selector, timeout).await {
        Ok(()) => {
            info!("Cookie banner declined");
            ConsentOutcome::Dismissed
        }
        Err(ScanError::SelectorNotFound(_)) | Err(ScanError::Timeout { .. }) => {
            info!("Cookie decline button not found or already handled");
            ConsentOutcome::Absent
        }
        Err(e) => {
            warn!("Could not dismiss cookie banner: {}", e);
            ConsentOutcome::Failed
        }
    }
}

/// Reads one product tile. Tiles without a body or a detail link are skipped;
/// a missing name or image is kept as `"N/A"`.
pub fn parse_tile(
    html: &str,
    position: usize,
    base: &Url,
    selectors: &ListingSelectors,
) -> Result<Option<ProductStub>> {
    let body_selector = parse_selector(&selectors.tile_body)?;
    let name_selector = parse_selector(&selectors.name)?;
    let image_selector = parse_selector(&selectors.image)?;
    let link_selector = parse_selector(&selectors.link)?;

    let fragment = Html::parse_fragment(html);
    let Some(body) = fragment.select(&body_selector).next() else {
        warn!("No {} inside product #{}", selectors.tile_body, position);
        return Ok(None);
    };

    let Some(href) = body
        .select(&link_selector)
        .next()
        .and_then(|el| el.value().attr("href"))
    else {
        warn!("No detail link inside product #{}", position);
        return Ok(None);
    };
    let Some(detail_url) = resolve_url(base, href) else {
        warn!("Unresolvable detail link '{}' in product #{}", href, position);
        return Ok(None);
    };

    let name = body
        .select(&name_selector)
        .next()
        .map(|el| el.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" "))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| {
            debug!("No name inside product #{}", position);
            NOT_AVAILABLE.to_string()
        });

    let image_url = body
        .select(&image_selector)
        .next()
        .and_then(|img| img.value().attr("data-src").or_else(|| img.value().attr("src")))
        .and_then(|src| resolve_url(base, src))
        .unwrap_or_else(|| {
            debug!("No image inside product #{}", position);
            NOT_AVAILABLE.to_string()
        });

    Ok(Some(ProductStub {
        name,
        image_url,
        detail_url,
    }))
}

pub fn resolve_url(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") || href.starts_with('#') {
        return None;
    }
    base.join(href).ok().map(|url| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBrowser;
    use std::sync::atomic::Ordering;

    const CATALOG: &str = "http://shop.test/prodotti/biscotti";

    fn tile(name: &str, img: &str, href: &str) -> String {
        format!(
            r#"<div class="thumbnail" data-type="PRODUCT">
                 <div class="thumbnail-product">
                   <a class="thumbnail__image__widelink" href="{href}"></a>
                   <div class="thumbnail__image">
                     <img data-src="{img}" src="/placeholder.gif">
                     <div class="thumbnail__image__text"><span class="inner-text"> {name} </span></div>
                   </div>
                 </div>
               </div>"#
        )
    }

    fn catalog(tiles: &[String], with_banner: bool) -> String {
        let banner = if with_banner {
            r#"<div id="onetrust-banner"><button id="onetrust-reject-all-handler">Rifiuta</button></div>"#
        } else {
            ""
        };
        format!(
            r#"<html><body>{banner}
               <div mb-component="ProductListComponent">{}</div>
               <div class="thumbnail" data-type="PRODUCT"><div class="thumbnail-product"></div></div>
            </body></html>"#,
            tiles.join("\n")
        )
    }

    fn collector(html: String) -> (ListingCollector, FakeBrowser) {
        let browser = FakeBrowser::new([(CATALOG.to_string(), html)]);
        let collector = ListingCollector::new(Arc::new(browser.clone()), CATALOG).unwrap();
        (collector, browser)
    }

    #[tokio::test]
    async fn test_collects_tiles_and_resolves_urls() {
        let html = catalog(
            &[
                tile("Abbracci", "/img/abbracci.png", "/prodotti/abbracci"),
                tile("Baiocchi", "https://cdn.test/baiocchi.png", "https://shop.test/prodotti/baiocchi"),
            ],
            true,
        );
        let (collector, browser) = collector(html);

        let stubs = collector.collect().await.unwrap();

        assert_eq!(
            stubs,
            vec![
                ProductStub::new(
                    "Abbracci",
                    "http://shop.test/img/abbracci.png",
                    "http://shop.test/prodotti/abbracci"
                ),
                ProductStub::new(
                    "Baiocchi",
                    "https://cdn.test/baiocchi.png",
                    "https://shop.test/prodotti/baiocchi"
                ),
            ]
        );
        assert_eq!(browser.counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tiles_outside_grid_are_ignored_and_broken_tiles_skipped() {
        let broken = r#"<div class="thumbnail" data-type="PRODUCT"><p>promo</p></div>"#.to_string();
        let no_link = r#"<div class="thumbnail" data-type="PRODUCT">
            <div class="thumbnail-product"><span class="inner-text">X</span></div></div>"#
            .to_string();
        let html = catalog(
            &[broken, tile("Macine", "/m.png", "/prodotti/macine"), no_link],
            false,
        );
        let (collector, _) = collector(html);

        let stubs = collector.collect().await.unwrap();
        assert_eq!(stubs.len(), 1);
        assert_eq!(stubs[0].name, "Macine");
    }

    #[tokio::test]
    async fn test_collect_is_idempotent() {
        let html = catalog(
            &[
                tile("Pan di Stelle", "/a.png", "/prodotti/pan-di-stelle"),
                tile("Galletti", "/b.png", "/prodotti/galletti"),
            ],
            true,
        );
        let (collector, _) = collector(html);

        let first = collector.collect().await.unwrap();
        let second = collector.collect().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_missing_grid_is_an_error() {
        let (collector, browser) = collector("<html><body></body></html>".to_string());
        let err = collector.collect().await.unwrap_err();
        assert!(matches!(err, ScanError::Timeout { .. }));
        assert_eq!(browser.counters.open.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dismiss_consent_outcomes() {
        let browser = FakeBrowser::new([
            ("http://a.test/".to_string(), catalog(&[], true)),
            ("http://b.test/".to_string(), catalog(&[], false)),
        ]);

        let mut with_banner = browser.loaded("http://a.test/").await;
        assert_eq!(
            dismiss_consent(with_banner.as_mut(), CONSENT_REJECT_BUTTON, CONSENT_TIMEOUT).await,
            ConsentOutcome::Dismissed
        );

        let mut without_banner = browser.loaded("http://b.test/").await;
        assert_eq!(
            dismiss_consent(without_banner.as_mut(), CONSENT_REJECT_BUTTON, CONSENT_TIMEOUT).await,
            ConsentOutcome::Absent
        );

        assert_eq!(
            dismiss_consent(without_banner.as_mut(), "button[", CONSENT_TIMEOUT).await,
            ConsentOutcome::Failed
        );
    }

    #[test]
    fn test_resolve_url() {
        let base = Url::parse(CATALOG).unwrap();
        assert_eq!(
            resolve_url(&base, "/prodotti/x").as_deref(),
            Some("http://shop.test/prodotti/x")
        );
        assert_eq!(
            resolve_url(&base, "https://other.test/y").as_deref(),
            Some("https://other.test/y")
        );
        assert_eq!(resolve_url(&base, ""), None);
        assert_eq!(resolve_url(&base, "javascript:void(0)"), None);
    }
}
