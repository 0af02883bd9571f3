// In-memory rendering context used by the unit tests of this crate.

use crate::error::{Result, ScanError};
use crate::session::{BrowserContext, PageSession, StaticDocument};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
pub(crate) struct Counters {
    pub open: AtomicUsize,
    pub peak: AtomicUsize,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
}

#[derive(Clone, Default)]
pub(crate) struct FakeBrowser {
    pages: Arc<HashMap<String, String>>,
    delay: Duration,
    pub counters: Arc<Counters>,
}

impl FakeBrowser {
    pub fn new(pages: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            pages: Arc::new(pages.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Opens a page already navigated to `url`.
    pub async fn loaded(&self, url: &str) -> Box<dyn PageSession> {
        let mut page = self.open_page().await.unwrap();
        page.navigate(url, Duration::from_secs(1)).await.unwrap();
        page
    }
}

#[async_trait]
impl BrowserContext for FakeBrowser {
    async fn open_page(&self) -> Result<Box<dyn PageSession>> {
        let now_open = self.counters.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(now_open, Ordering::SeqCst);
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            browser: self.clone(),
            document: None,
            closed: false,
        }))
    }
}

pub(crate) struct FakePage {
    browser: FakeBrowser,
    document: Option<StaticDocument>,
    closed: bool,
}

impl FakePage {
    fn document(&self) -> Result<&StaticDocument> {
        self.document.as_ref().ok_or(ScanError::PageClosed)
    }
}

#[async_trait]
impl PageSession for FakePage {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<()> {
        if !self.browser.delay.is_zero() {
            tokio::time::sleep(self.browser.delay).await;
        }
        let body = self
            .browser
            .pages
            .get(url)
            .ok_or_else(|| ScanError::Navigation {
                url: url.to_string(),
                reason: "HTTP 404".to_string(),
            })?;
        self.document = Some(StaticDocument::new(url, body.clone()));
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
        if !self.closed {
            self.closed = true;
            self.document = None;
            self.browser.counters.open.fetch_sub(1, Ordering::SeqCst);
            self.browser.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn current_url(&self) -> Option<&str> {
        self.document.as_ref().map(|d| d.url())
    }
}
