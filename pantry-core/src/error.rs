use crate::literal::LiteralError;
use pantry_scanner::ScanError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Scan failed: {0}")]
    Scan(#[from] ScanError),

    #[error("Classifier request failed: {0}")]
    ClassifierHttp(#[from] reqwest::Error),

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Classifier gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: usize, last_error: String },

    #[error("Literal parse error: {0}")]
    Literal(#[from] LiteralError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
