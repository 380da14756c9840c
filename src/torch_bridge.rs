use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{error, info};

use crate::error::{PipelineError, Result};

/// Opaque trained forecaster: a fixed-shape numeric window in, a
/// fixed-shape prediction out. Loading and execution belong to the
/// implementation; callers never see the architecture.
pub trait ForecastModel {
    fn predict(&self, window: ArrayView2<'_, f64>) -> Result<Vec<f64>>;
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    model_path: &'a str,
    window: Vec<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    status: String,
    prediction: Option<Vec<f64>>,
    error: Option<String>,
}

/// Runs the trained recurrent net through the runner script shipped in the
/// artifact directory, JSON on stdin, JSON on stdout.
pub struct TorchRunnerModel {
    runner: PathBuf,
    model_path: PathBuf,
}

impl TorchRunnerModel {
    pub fn new(dir: &Path) -> Result<Self> {
        let runner = dir.join("run_model.py");
        let model_path = dir.join("model.pt");

        for path in [&runner, &model_path] {
            if !path.exists() {
                return Err(PipelineError::ArtifactMissing(path.clone()));
            }
        }

        Ok(Self { runner, model_path })
    }
}

impl ForecastModel for TorchRunnerModel {
    fn predict(&self, window: ArrayView2<'_, f64>) -> Result<Vec<f64>> {
        let model_path = self.model_path.to_string_lossy();
        let request = PredictRequest {
            model_path: &model_path,
            window: window.rows().into_iter().map(|row| row.to_vec()).collect(),
        };
        let request_json = serde_json::to_string(&request)?;

        info!(
            "Invoking forecast runner with a {}x{} window",
            window.nrows(),
            window.ncols()
        );

        let mut child = Command::new("python3")
            .arg(&self.runner)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PipelineError::ModelBridge(format!("failed to spawn runner: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request_json.as_bytes())
                .map_err(|e| PipelineError::ModelBridge(format!("failed to write request: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| PipelineError::ModelBridge(format!("runner did not finish: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("Forecast runner exited with {}: {}", output.status, stderr);
            return Err(PipelineError::ModelBridge(format!(
                "runner exited with {}",
                output.status
            )));
        }

        let response: PredictResponse = serde_json::from_slice(&output.stdout)
            .map_err(|e| PipelineError::ModelBridge(format!("unreadable runner response: {e}")))?;

        match response.status.as_str() {
            "success" => response.prediction.ok_or_else(|| {
                PipelineError::ModelBridge(String::from("runner returned no prediction"))
            }),
            _ => {
                let message = response
                    .error
                    .unwrap_or_else(|| String::from("unknown runner error"));
                Err(PipelineError::ModelBridge(message))
            }
        }
    }
}
