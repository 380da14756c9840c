use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the ingestion pipeline and the inference adapter.
///
/// Per-file load failures are collected in `loader::LoadReport` instead of
/// being raised; everything here aborts the current batch or prediction.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("required column `{0}` is missing from the raw readings")]
    MissingColumn(String),

    #[error("no raw readings could be loaded from {0:?}")]
    EmptyInput(PathBuf),

    #[error("readings contain no timestamps to derive a weather span from")]
    NoReadings,

    #[error("device id `{0}` does not encode a numeric floor")]
    DeviceIdFormat(String),

    #[error("invalid configuration value for `{key}`: {value}")]
    Config { key: String, value: String },

    #[error("weather fetch failed after {attempts} attempts: {message}")]
    WeatherFetch { attempts: u32, message: String },

    #[error("expected {expected} uploaded files, got {actual}")]
    WrongFileCount { expected: usize, actual: usize },

    #[error("uploaded file {file} could not be parsed: {message}")]
    UploadParse { file: String, message: String },

    #[error("readings span more than one room: {0:?}")]
    MultipleRooms(Vec<String>),

    #[error("resampling produced {actual} daily rows, expected {expected}")]
    WindowSize { expected: usize, actual: usize },

    #[error("the resampled days are not consecutive calendar days")]
    NonConsecutiveDays,

    #[error("value `{value}` in column `{column}` is not covered by the fitted encoder")]
    UnseenCategory { column: String, value: String },

    #[error("scaler expects {expected} feature columns, got {actual}")]
    ScalerShape { expected: usize, actual: usize },

    #[error("model artifact missing: {0:?}")]
    ArtifactMissing(PathBuf),

    #[error("model bridge failed: {0}")]
    ModelBridge(String),

    #[error(transparent)]
    Polars(#[from] polars::error::PolarsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
