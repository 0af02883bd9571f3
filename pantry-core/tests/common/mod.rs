#![allow(dead_code)]

use async_trait::async_trait;
use pantry_core::classifier::Classifier;
use pantry_core::{PipelineError, Result};
use pantry_scanner::{ProductDetail, ProductStub};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Classifier that plays back a fixed list of replies. `Err` entries become
/// classifier errors; once the script runs out every call fails.
pub struct ScriptedClassifier {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    calls: AtomicUsize,
    inputs: Mutex<Vec<String>>,
}

impl ScriptedClassifier {
    pub fn new<'a>(
        replies: impl IntoIterator<Item = std::result::Result<&'a str, &'a str>>,
    ) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, raw_text: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(raw_text.to_string());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(e)) => Err(PipelineError::Classifier(e)),
            None => Err(PipelineError::Classifier("script exhausted".to_string())),
        }
    }
}

pub fn detail(name: &str, ingredients: &str) -> ProductDetail {
    ProductDetail::new(
        ProductStub::new(
            name,
            format!("http://shop.test/img/{}.png", name.to_lowercase()),
            format!("http://shop.test/prodotti/{}", name.to_lowercase()),
        ),
        ingredients.to_string(),
        Vec::new(),
    )
}

pub fn tokens(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
