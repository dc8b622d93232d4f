//! Error types for lambench

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("benchmark error: {0}")]
    Bench(String),
}

impl BenchError {
    /// Exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            BenchError::Config(_) => 2,
            BenchError::Io(_) => 5,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, BenchError>;
