use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

/// Everything the batch pipeline and the inference adapter need to know
/// about their surroundings. Relative paths resolve against `base_dir`
/// instead of the process working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub base_dir: PathBuf,
    pub data_dir: PathBuf,
    pub output_path: PathBuf,
    /// Extension of the raw gateway export files, without the dot.
    pub raw_extension: String,
    /// Building prefix encoded into every device id.
    pub device_prefix: String,
    /// strptime format of the `date_time` column in the exports.
    pub timestamp_format: String,
    pub weather: WeatherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    pub endpoint: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub request_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            data_dir: PathBuf::from("data/hka-aqm-n"),
            output_path: PathBuf::from("data/processed/data_building_n.parquet"),
            raw_extension: String::from("dat"),
            device_prefix: String::from("hka-aqm-n"),
            timestamp_format: String::from("%Y-%m-%d %H:%M:%S"),
            weather: WeatherConfig::default(),
        }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from("https://archive-api.open-meteo.com/v1/archive"),
            // Karlsruhe
            latitude: 49.014_920,
            longitude: 8.390_050,
            timezone: String::from("Europe/Berlin"),
            max_retries: 5,
            backoff_factor: 0.2,
            request_timeout_secs: 60,
        }
    }
}

impl PipelineConfig {
    pub fn with_base_dir(mut self, base_dir: &Path) -> Self {
        self.base_dir = base_dir.to_path_buf();
        self
    }

    pub fn resolved_data_dir(&self) -> PathBuf {
        resolve(&self.base_dir, &self.data_dir)
    }

    pub fn resolved_output_path(&self) -> PathBuf {
        resolve(&self.base_dir, &self.output_path)
    }

    #[allow(dead_code)]
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(base_dir) = std::env::var("AQM_BASE_DIR") {
            config.base_dir = PathBuf::from(base_dir);
        }

        if let Ok(data_dir) = std::env::var("AQM_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(output) = std::env::var("AQM_OUTPUT_PATH") {
            config.output_path = PathBuf::from(output);
        }

        if let Ok(latitude) = std::env::var("AQM_LATITUDE") {
            config.weather.latitude = parse_coordinate("AQM_LATITUDE", &latitude)?;
        }

        if let Ok(longitude) = std::env::var("AQM_LONGITUDE") {
            config.weather.longitude = parse_coordinate("AQM_LONGITUDE", &longitude)?;
        }

        Ok(config)
    }
}

fn parse_coordinate(key: &str, value: &str) -> Result<f64> {
    value.parse().map_err(|_| PipelineError::Config {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
