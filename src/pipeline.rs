use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::dataset;
use crate::error::{PipelineError, Result};
use crate::external_data::{enrich_with_weather, WeatherFetcher};
use crate::features;
use crate::loader::{self, LoadError};
use crate::preprocess;

/// Outcome summary of one batch ingestion run.
#[derive(Debug)]
pub struct IngestSummary {
    pub rows_written: usize,
    pub files_read: usize,
    pub file_errors: Vec<LoadError>,
    pub output_path: PathBuf,
}

/// The batch pipeline: load raw exports, clean, enrich with weather, build
/// features, persist as Parquet. Each run owns its in-memory tables and its
/// output path; nothing is shared across runs.
pub struct IngestPipeline {
    config: PipelineConfig,
    fetcher: WeatherFetcher,
}

impl IngestPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let fetcher = WeatherFetcher::new(config.weather.clone())?;
        Ok(Self { config, fetcher })
    }

    pub async fn run(&self) -> Result<IngestSummary> {
        let data_dir = self.config.resolved_data_dir();
        let output_path = self.config.resolved_output_path();

        info!("Stage 1: Loading raw exports");
        let report = loader::load_raw_dir(&data_dir, &self.config.raw_extension)?;
        if report.frame.height() == 0 {
            return Err(PipelineError::EmptyInput(data_dir));
        }

        info!("Stage 2: Cleaning readings");
        let cleaned = preprocess::clean_readings(&report.frame, &self.config.timestamp_format)?;

        info!("Stage 3: Enriching with weather observations");
        let enriched = enrich_with_weather(&cleaned, &self.fetcher).await?;

        info!("Stage 4: Building features");
        let mut features = features::build_features(&enriched, &self.config.device_prefix)?;

        info!("Stage 5: Persisting dataset");
        dataset::write_parquet(&mut features, &output_path)?;

        if !report.errors.is_empty() {
            warn!("{} raw export files were skipped", report.errors.len());
        }

        Ok(IngestSummary {
            rows_written: features.height(),
            files_read: report.files_read,
            file_errors: report.errors,
            output_path,
        })
    }
}
