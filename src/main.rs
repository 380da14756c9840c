use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

mod artifacts;
mod config;
mod dataset;
mod error;
mod external_data;
mod features;
mod inference;
mod loader;
mod pipeline;
mod preprocess;
mod torch_bridge;

use crate::artifacts::ModelArtifacts;
use crate::config::PipelineConfig;
use crate::inference::InferenceAdapter;
use crate::pipeline::IngestPipeline;

#[derive(Parser, Debug)]
#[command(name = "aqm_pipeline")]
#[command(about = "Indoor air-quality ingestion and forecasting pipeline", long_about = None)]
struct Args {
    /// Base directory all relative paths resolve against
    #[arg(long, env = "AQM_BASE_DIR", default_value = ".")]
    base_dir: PathBuf,

    /// Directory holding the raw per-device export files
    #[arg(long, env = "AQM_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Output path for the persisted feature dataset
    #[arg(long, env = "AQM_OUTPUT_PATH")]
    output: Option<PathBuf>,

    /// Latitude for the weather lookup
    #[arg(long)]
    latitude: Option<f64>,

    /// Longitude for the weather lookup
    #[arg(long)]
    longitude: Option<f64>,

    /// Run a single-room forecast instead of the batch pipeline
    #[arg(long)]
    predict: bool,

    /// Artifact directory of the trained model (predict mode); defaults to
    /// the newest directory under <base-dir>/models
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Raw export file for the forecast window, once per day (predict mode)
    #[arg(long = "input-file")]
    input_files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("aqm_pipeline=info".parse()?),
        )
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let args = Args::parse();

    let mut config = PipelineConfig::default().with_base_dir(&args.base_dir);
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(output) = args.output {
        config.output_path = output;
    }
    if let Some(latitude) = args.latitude {
        config.weather.latitude = latitude;
    }
    if let Some(longitude) = args.longitude {
        config.weather.longitude = longitude;
    }

    if args.predict {
        let model_dir = match args.model_dir {
            Some(dir) => dir,
            None => artifacts::list_model_dirs(&config.base_dir.join("models"))?
                .pop()
                .ok_or_else(|| anyhow::anyhow!("no model directories found under models/"))?,
        };

        let artifacts = ModelArtifacts::load(&model_dir)?;
        let adapter = InferenceAdapter::new(artifacts, config);
        let forecast = adapter.predict_from_files(&args.input_files)?;

        info!(
            "Room {}: predicted {:.2} °C for {}",
            forecast.room,
            forecast.temperature,
            forecast.target_date.format("%d.%m.%Y")
        );
    } else {
        let pipeline = IngestPipeline::new(config)?;

        let total_start = Instant::now();
        let summary = pipeline.run().await?;

        info!(
            "Pipeline completed in {:.2} seconds: {} rows from {} files ({} skipped)",
            total_start.elapsed().as_secs_f32(),
            summary.rows_written,
            summary.files_read,
            summary.file_errors.len()
        );
    }

    Ok(())
}
