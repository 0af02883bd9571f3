use crate::error::{Result, ScanError};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36";

/// Long-lived rendering context shared by every page of a run.
#[async_trait]
pub trait BrowserContext: Send + Sync {
    /// Opens a fresh page. Pages are never reused across products.
    async fn open_page(&self) -> Result<Box<dyn PageSession>>;
}

/// One renderable page. Callers must `close` it on every exit path.
#[async_trait]
pub trait PageSession: Send + Sync {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()>;

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// Outer HTML of the first element matching `selector`.
    async fn query_html(&self, selector: &str) -> Result<Option<String>>;

    /// Outer HTML of every element matching `selector`, in document order.
    async fn query_all_html(&self, selector: &str) -> Result<Vec<String>>;

    async fn click(&mut self, selector: &str, timeout: Duration) -> Result<()>;

    async fn close(&mut self) -> Result<()>;

    fn current_url(&self) -> Option<&str>;
}

pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| ScanError::InvalidSelector(format!("{}: {}", selector, e)))
}

/// A loaded document that is queried as-is, without script execution.
#[derive(Debug, Clone)]
pub struct StaticDocument {
    url: String,
    body: String,
}

impl StaticDocument {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn contains(&self, selector: &str) -> Result<bool> {
        let selector = parse_selector(selector)?;
        let document = Html::parse_document(&self.body);
        Ok(document.select(&selector).next().is_some())
    }

    pub fn first_html(&self, selector: &str) -> Result<Option<String>> {
        let selector = parse_selector(selector)?;
        let document = Html::parse_document(&self.body);
        Ok(document.select(&selector).next().map(|el| el.html()))
    }

    pub fn all_html(&self, selector: &str) -> Result<Vec<String>> {
        let selector = parse_selector(selector)?;
        let document = Html::parse_document(&self.body);
        Ok(document.select(&selector).map(|el| el.html()).collect())
    }

    /// The document never changes, so a missing element is reported immediately.
    pub fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()> {
        if self.contains(selector)? {
            Ok(())
        } else {
            Err(ScanError::Timeout {
                what: selector.to_string(),
                timeout_ms: timeout.as_millis(),
            })
        }
    }

    pub fn click(&self, selector: &str) -> Result<()> {
        if self.contains(selector)? {
            Ok(())
        } else {
            Err(ScanError::SelectorNotFound(selector.to_string()))
        }
    }
}

/// Rendering context backed by plain HTTP fetches.
#[derive(Clone)]
pub struct HttpBrowser {
    client: Client,
}

impl HttpBrowser {
    pub fn new() -> Result<Self> {
        Self::with_user_agent(DEFAULT_USER_AGENT)
    }

    pub fn with_user_agent(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .cookie_store(true)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl BrowserContext for HttpBrowser {
    async fn open_page(&self) -> Result<Box<dyn PageSession>> {
        Ok(Box::new(HttpPage {
            client: self.client.clone(),
            document: None,
            closed: false,
        }))
    }
}

pub struct HttpPage {
    client: Client,
    document: Option<StaticDocument>,
    closed: bool,
}

impl HttpPage {
    fn document(&self) -> Result<&StaticDocument> {
        if self.closed {
            return Err(ScanError::PageClosed);
        }
        self.document
            .as_ref()
            .ok_or_else(|| ScanError::Other("page has not been navigated".to_string()))
    }
}

#[async_trait]
impl PageSession for HttpPage {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        if self.closed {
            return Err(ScanError::PageClosed);
        }
        debug!("Navigating to {}", url);

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| navigation_error(url, e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::Navigation {
                url: url.to_string(),
                reason: format!("HTTP {}", status.as_u16()),
            });
        }

        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| navigation_error(url, e, timeout))?;

        self.document = Some(StaticDocument::new(final_url, body));
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        self.document()?.wait_for(selector, timeout)
    }

    async fn query_html(&self, selector: &str) -> Result<Option<String>> {
        self.document()?.first_html(selector)
    }

    async fn query_all_html(&self, selector: &str) -> Result<Vec<String>> {
        self.document()?.all_html(selector)
    }

    async fn click(&mut self, selector: &str, _timeout: Duration) -> Result<()> {
        self.document()?.click(selector)
    }

    async fn close(&mut self) -> Result<()> {
        self.document = None;
        self.closed = true;
        Ok(())
    }

    fn current_url(&self) -> Option<&str> {
        self.document.as_ref().map(|d| d.url())
    }
}

fn navigation_error(url: &str, error: reqwest::Error, timeout: Duration) -> ScanError {
    if error.is_timeout() {
        ScanError::Timeout {
            what: url.to_string(),
            timeout_ms: timeout.as_millis(),
        }
    } else {
        ScanError::Navigation {
            url: url.to_string(),
            reason: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    const PAGE: &str = r#"<html><body>
        <div id="grid"><div class="tile">One</div><div class="tile">Two</div></div>
        <button id="accept">OK</button>
    </body></html>"#;

    #[test]
    fn test_static_document_queries() {
        let doc = StaticDocument::new("http://example.com/", PAGE);

        assert!(doc.contains("#grid").unwrap());
        assert!(!doc.contains("#missing").unwrap());
        assert_eq!(doc.all_html("div.tile").unwrap().len(), 2);
        assert_eq!(
            doc.first_html("div.tile").unwrap().as_deref(),
            Some(r#"<div class="tile">One</div>"#)
        );
    }

    #[test]
    fn test_static_document_wait_reports_timeout() {
        let doc = StaticDocument::new("http://example.com/", PAGE);
        let err = doc
            .wait_for("#missing", Duration::from_millis(250))
            .unwrap_err();
        assert!(matches!(err, ScanError::Timeout { timeout_ms: 250, .. }));
    }

    #[test]
    fn test_invalid_selector_is_reported() {
        let doc = StaticDocument::new("http://example.com/", PAGE);
        assert!(matches!(
            doc.contains("div[").unwrap_err(),
            ScanError::InvalidSelector(_)
        ));
    }

    #[tokio::test]
    async fn test_http_page_navigate_and_query() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/catalog"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_bytes(PAGE.as_bytes()),
            )
            .mount(&mock_server)
            .await;

        let browser = HttpBrowser::new().unwrap();
        let mut page = browser.open_page().await.unwrap();
        let url = format!("{}/catalog", mock_server.uri());

        page.navigate(&url, Duration::from_secs(5)).await.unwrap();
        page.wait_for_selector("#grid", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(page.query_all_html("div.tile").await.unwrap().len(), 2);
        assert!(page.click("#accept", Duration::from_secs(1)).await.is_ok());
        assert!(matches!(
            page.click("#reject", Duration::from_secs(1)).await,
            Err(ScanError::SelectorNotFound(_))
        ));
        assert_eq!(page.current_url(), Some(url.as_str()));

        page.close().await.unwrap();
        assert!(matches!(
            page.query_html("#grid").await,
            Err(ScanError::PageClosed)
        ));
    }

    #[tokio::test]
    async fn test_http_page_navigation_failure_on_error_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let browser = HttpBrowser::new().unwrap();
        let mut page = browser.open_page().await.unwrap();
        let err = page
            .navigate(&format!("{}/gone", mock_server.uri()), Duration::from_secs(5))
            .await
            .unwrap_err();

        match err {
            ScanError::Navigation { reason, .. } => assert_eq!(reason, "HTTP 404"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_http_page_navigation_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html></html>")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;

        let browser = HttpBrowser::new().unwrap();
        let mut page = browser.open_page().await.unwrap();
        let err = page
            .navigate(&format!("{}/slow", mock_server.uri()), Duration::from_millis(50))
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::Timeout { .. }));
    }
}
