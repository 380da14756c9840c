use ndarray::{Array2, ArrayView2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::torch_bridge::{ForecastModel, TorchRunnerModel};

fn default_feature_range() -> (f64, f64) {
    (0.0, 1.0)
}

/// Min-max scaler fitted at training time; transform-only here. The
/// feature name order is the model's input column contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub feature_names: Vec<String>,
    pub data_min: Vec<f64>,
    pub data_max: Vec<f64>,
    #[serde(default = "default_feature_range")]
    pub feature_range: (f64, f64),
}

impl MinMaxScaler {
    pub fn load(path: &Path) -> Result<Self> {
        let file =
            File::open(path).map_err(|_| PipelineError::ArtifactMissing(path.to_path_buf()))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    fn scale_value(&self, value: f64, idx: usize) -> f64 {
        let (low, high) = self.feature_range;
        let span = self.data_max[idx] - self.data_min[idx];
        if span == 0.0 {
            return low;
        }
        (value - self.data_min[idx]) / span * (high - low) + low
    }

    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.feature_names.len() {
            return Err(PipelineError::ScalerShape {
                expected: self.feature_names.len(),
                actual: x.ncols(),
            });
        }

        let mut out = x.to_owned();
        for ((_, idx), value) in out.indexed_iter_mut() {
            *value = self.scale_value(*value, idx);
        }
        Ok(out)
    }

    /// Map a single scaled target value back to its original unit. Only
    /// valid for a scaler fitted on one output column.
    pub fn inverse_transform_scalar(&self, value: f64) -> Result<f64> {
        if self.data_min.len() != 1 {
            return Err(PipelineError::ScalerShape {
                expected: 1,
                actual: self.data_min.len(),
            });
        }

        let (low, high) = self.feature_range;
        let span = high - low;
        let std = if span == 0.0 { 0.0 } else { (value - low) / span };
        Ok(std * (self.data_max[0] - self.data_min[0]) + self.data_min[0])
    }
}

/// One-hot encoder with categories fixed at training time. A value outside
/// the fitted categories is a hard error, never an all-zero row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneHotEncoder {
    pub columns: Vec<String>,
    pub categories: Vec<Vec<String>>,
}

impl OneHotEncoder {
    pub fn load(path: &Path) -> Result<Self> {
        let file =
            File::open(path).map_err(|_| PipelineError::ArtifactMissing(path.to_path_buf()))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Output column names, in output order.
    pub fn feature_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .zip(&self.categories)
            .flat_map(|(column, cats)| cats.iter().map(move |cat| format!("{column}_{cat}")))
            .collect()
    }

    /// Replace each encoded column with its 0/1 indicator columns.
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut out = df.clone();

        for (column, cats) in self.columns.iter().zip(&self.categories) {
            let values = render_as_strings(df.column(column)?)?;

            for value in values.iter().flatten() {
                if !cats.contains(value) {
                    return Err(PipelineError::UnseenCategory {
                        column: column.clone(),
                        value: value.clone(),
                    });
                }
            }

            for cat in cats {
                let indicator: Vec<f64> = values
                    .iter()
                    .map(|v| match v {
                        Some(v) if v == cat => 1.0,
                        _ => 0.0,
                    })
                    .collect();
                out.with_column(Series::new(&format!("{column}_{cat}"), indicator))?;
            }
        }

        for column in &self.columns {
            out = out.drop(column)?;
        }

        Ok(out)
    }
}

fn render_as_strings(series: &Series) -> Result<Vec<Option<String>>> {
    let rendered = match series.dtype() {
        DataType::String => series
            .str()?
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect(),
        // floors arrive as integers
        _ => series
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|v| v.map(|v| v.to_string()))
            .collect(),
    };
    Ok(rendered)
}

/// Everything a trained model ships with, loaded from one artifact
/// directory: the opaque net, both scalers, and the categorical encoder.
pub struct ModelArtifacts {
    pub model: Box<dyn ForecastModel>,
    pub x_scaler: MinMaxScaler,
    pub y_scaler: MinMaxScaler,
    pub encoder: OneHotEncoder,
}

impl ModelArtifacts {
    pub fn load(dir: &Path) -> Result<Self> {
        Ok(Self {
            model: Box::new(TorchRunnerModel::new(dir)?),
            x_scaler: MinMaxScaler::load(&dir.join("x_scaler.json"))?,
            y_scaler: MinMaxScaler::load(&dir.join("y_scaler.json"))?,
            encoder: OneHotEncoder::load(&dir.join("encoder.json"))?,
        })
    }
}

/// Available artifact directories under `base`, sorted by name so the most
/// recent training run lists last.
pub fn list_model_dirs(base: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(base)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}
