use thiserror::Error;

/// Domain errors raised while classifying, matching and annotating cities.
/// I/O failures go through `anyhow` with context instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MapError {
    #[error("Invalid score scale: {0}")]
    InvalidScale(String),
    #[error("Score {score} of {city} is outside the scale [{lower}, {upper})")]
    ScoreOutOfRange {
        city: String,
        score: f64,
        lower: f64,
        upper: f64,
    },
    #[error("Annotation columns are misaligned: {0}")]
    MisalignedColumns(String),
    #[error("Column '{0}' not found in table")]
    MissingColumn(String),
    #[error("Invalid record at row {row}: {reason}")]
    InvalidRecord { row: usize, reason: String },
    #[error("Unknown color: {0}")]
    UnknownColor(String),
    #[error("Unsupported input format: {0}")]
    UnsupportedFormat(String),
}
