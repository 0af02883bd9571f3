use crate::error::{PipelineError, Result};
use crate::literal;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// External service turning raw ingredient text into a literal token sequence.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, raw_text: &str) -> Result<String>;
}

/// Gemini `generateContent` client. The prompt is prepended to every input.
pub struct GeminiClassifier {
    client: Client,
    endpoint: String,
    api_key: String,
    prompt: String,
}

impl GeminiClassifier {
    pub fn new(api_key: &str, model: &str, prompt: String) -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, api_key, model, prompt)
    }

    pub fn with_base_url(base_url: &str, api_key: &str, model: &str, prompt: String) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(PipelineError::Config("missing classifier API key".to_string()));
        }
        let model = model.trim().trim_start_matches("models/");
        if model.is_empty() {
            return Err(PipelineError::Config("missing classifier model name".to_string()));
        }

        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            base_url.trim_end_matches('/'),
            model
        );

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.trim().to_string(),
            prompt,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl Classifier for GeminiClassifier {
    async fn classify(&self, raw_text: &str) -> Result<String> {
        let text = format!("{}{}", self.prompt, raw_text);
        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: &text }],
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(PipelineError::Classifier(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: GenerateResponse = response.json().await?;
        let reply: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
            .ok_or_else(|| PipelineError::Classifier("response has no candidates".to_string()))?;

        debug!("Classifier replied with {} bytes", reply.len());
        Ok(reply)
    }
}

/// Attempt budget and pacing for classifier calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub retry_delay: Duration,
    /// Minimum time between the starts of two consecutive records.
    pub min_spacing: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
            min_spacing: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedTokens {
    pub tokens: Vec<String>,
    pub attempts: usize,
}

/// Wraps a [`Classifier`] with bounded retries and per-record spacing. A reply
/// that does not parse as a token sequence counts as a failed attempt.
pub struct RateLimitedClassifier {
    inner: Arc<dyn Classifier>,
    policy: RetryPolicy,
    last_record: Option<Instant>,
}

impl RateLimitedClassifier {
    pub fn new(inner: Arc<dyn Classifier>, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            last_record: None,
        }
    }

    /// Classifies one record, waiting first if the previous record started
    /// less than `min_spacing` ago.
    pub async fn classify_tokens(&mut self, raw_text: &str) -> Result<ClassifiedTokens> {
        self.pace().await;

        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.attempt(raw_text).await {
                Ok(tokens) => return Ok(ClassifiedTokens { tokens, attempts: attempt }),
                Err(e) => {
                    warn!("Classifier attempt {}/{} failed: {}", attempt, max_attempts, e);
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        tokio::time::sleep(self.policy.retry_delay).await;
                    }
                }
            }
        }

        Err(PipelineError::Exhausted {
            attempts: max_attempts,
            last_error,
        })
    }

    async fn attempt(&self, raw_text: &str) -> Result<Vec<String>> {
        let reply = self.inner.classify(raw_text).await?;
        Ok(literal::parse_tokens(&reply)?)
    }

    async fn pace(&mut self) {
        if let Some(last) = self.last_record {
            let elapsed = last.elapsed();
            if elapsed < self.policy.min_spacing {
                tokio::time::sleep(self.policy.min_spacing - elapsed).await;
            }
        }
        self.last_record = Some(Instant::now());
    }
}
