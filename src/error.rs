use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrendError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Dataset produced no numeric values")]
    EmptyDataset,

    #[error("Failed to load dataset: {0}")]
    LoadFailed(String),

    #[error("Invalid month '{0}': expected YYYY-MM")]
    InvalidMonth(String),

    #[error("Branch summary total {summary_total} does not match matching facts total {fact_total}")]
    ConservationViolation { summary_total: f64, fact_total: f64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl TrendError {
    /// True for the errors a dataset load reports to the user as a message.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            TrendError::MissingColumn(_) | TrendError::EmptyDataset | TrendError::LoadFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TrendError>;
