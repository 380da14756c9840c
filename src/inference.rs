use chrono::{Datelike, Duration, NaiveDate};
use ndarray::Array2;
use polars::prelude::*;
use std::path::PathBuf;
use tracing::info;

use crate::artifacts::ModelArtifacts;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::features;
use crate::loader;
use crate::preprocess;

/// Days of history the trained net consumes; the prediction targets the
/// day right after the window.
pub const WINDOW_DAYS: usize = 6;

/// One next-day temperature forecast for a single room.
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    pub room: String,
    pub target_date: NaiveDate,
    pub temperature: f64,
}

/// Position of a date within its calendar year, mapped onto the unit
/// circle and shifted into [0, 1] on both axes. Jan 1 of consecutive years
/// lands on (nearly) the same point, up to leap-year length rounding.
pub fn project_date_to_unit_circle(date: NaiveDate) -> (f64, f64) {
    let days_in_year = if date.leap_year() { 366.0 } else { 365.0 };
    let position = f64::from(date.ordinal()) / days_in_year;
    let alpha = position * std::f64::consts::TAU;
    ((alpha.sin() + 1.0) / 2.0, (alpha.cos() + 1.0) / 2.0)
}

/// Same projection for the day of the week (0 = Monday .. 6 = Sunday).
pub fn project_day_of_week_to_unit_circle(day_of_week: i64) -> (f64, f64) {
    let alpha = day_of_week as f64 / 7.0 * std::f64::consts::TAU;
    ((alpha.sin() + 1.0) / 2.0, (alpha.cos() + 1.0) / 2.0)
}

/// Reapplies the batch cleaning and feature steps to a short upload window,
/// encodes it into the trained model's input space and returns the day-7
/// forecast. Every validation failure halts before the model runs.
pub struct InferenceAdapter {
    artifacts: ModelArtifacts,
    config: PipelineConfig,
}

impl InferenceAdapter {
    pub fn new(artifacts: ModelArtifacts, config: PipelineConfig) -> Self {
        Self { artifacts, config }
    }

    /// Full inference path from uploaded raw export files, one per day.
    pub fn predict_from_files(&self, files: &[PathBuf]) -> Result<Forecast> {
        if files.len() != WINDOW_DAYS {
            return Err(PipelineError::WrongFileCount {
                expected: WINDOW_DAYS,
                actual: files.len(),
            });
        }

        let report = loader::load_raw_files(files)?;
        if let Some(err) = report.errors.first() {
            // an unreadable upload is a validation failure here, not a
            // skippable item like in the batch loader
            return Err(PipelineError::UploadParse {
                file: err.file.clone(),
                message: err.message.clone(),
            });
        }

        self.predict_from_frame(&report.frame)
    }

    /// Inference path from an already-concatenated raw frame: clean,
    /// derive calendar features, encode, resample to daily rows, scale,
    /// run the net, inverse-scale.
    pub fn predict_from_frame(&self, raw: &DataFrame) -> Result<Forecast> {
        let cleaned = preprocess::clean_readings(raw, &self.config.timestamp_format)?;
        let featured = features::add_calendar_features(&cleaned, &self.config.device_prefix)?;
        let featured = features::drop_telemetry(&featured);
        let featured = featured
            .lazy()
            .sort(["date_time"], Default::default())
            .collect()?;

        if featured.height() == 0 {
            return Err(PipelineError::WindowSize {
                expected: WINDOW_DAYS,
                actual: 0,
            });
        }

        let room = single_room(&featured)?;

        let encoded = self.encode(&featured)?;
        let daily = self.resample_daily(&encoded)?;
        let dates = check_consecutive(&daily)?;

        let window = self.to_matrix(&daily)?;
        let scaled = self.artifacts.x_scaler.transform(window.view())?;
        let prediction = self.artifacts.model.predict(scaled.view())?;
        let first = prediction
            .first()
            .copied()
            .ok_or_else(|| PipelineError::ModelBridge(String::from("empty prediction")))?;
        let temperature = self.artifacts.y_scaler.inverse_transform_scalar(first)?;

        let target_date = dates[WINDOW_DAYS - 1] + Duration::days(1);
        let forecast = Forecast {
            room,
            target_date,
            temperature: (temperature * 100.0).round() / 100.0,
        };

        info!(
            "Predicted {:.2} for room {} on {}",
            forecast.temperature, forecast.room, forecast.target_date
        );

        Ok(forecast)
    }

    fn encode(&self, df: &DataFrame) -> Result<DataFrame> {
        let with_circles = add_cyclical_encodings(df)?;
        self.artifacts.encoder.transform(&with_circles)
    }

    /// One row per (room, calendar day), averaging the model's feature
    /// columns; rows left with any null are dropped.
    fn resample_daily(&self, df: &DataFrame) -> Result<DataFrame> {
        let means: Vec<Expr> = self
            .artifacts
            .x_scaler
            .feature_names
            .iter()
            .map(|name| col(name.as_str()).mean())
            .collect();

        let daily = df
            .clone()
            .lazy()
            .group_by_stable([col("room"), col("date")])
            .agg(means)
            .drop_nulls(None)
            .sort(["date"], Default::default())
            .collect()?;

        Ok(daily)
    }

    fn to_matrix(&self, daily: &DataFrame) -> Result<Array2<f64>> {
        let names = &self.artifacts.x_scaler.feature_names;
        let mut matrix = Array2::<f64>::zeros((daily.height(), names.len()));

        for (j, name) in names.iter().enumerate() {
            let column = daily.column(name)?.cast(&DataType::Float64)?;
            for (i, value) in column.f64()?.into_iter().enumerate() {
                matrix[[i, j]] = value.unwrap_or(0.0);
            }
        }

        Ok(matrix)
    }
}

/// Project `date` and `day_of_week` onto their unit circles, adding the
/// four *_circle_x/y columns the model was trained on.
pub fn add_cyclical_encodings(df: &DataFrame) -> Result<DataFrame> {
    let height = df.height();

    let mut date_x: Vec<Option<f64>> = Vec::with_capacity(height);
    let mut date_y: Vec<Option<f64>> = Vec::with_capacity(height);
    for value in df.column("date")?.date()?.into_iter() {
        match value {
            Some(days) => {
                let (x, y) = project_date_to_unit_circle(features::days_to_date(days));
                date_x.push(Some(x));
                date_y.push(Some(y));
            }
            None => {
                date_x.push(None);
                date_y.push(None);
            }
        }
    }

    let mut dow_x: Vec<Option<f64>> = Vec::with_capacity(height);
    let mut dow_y: Vec<Option<f64>> = Vec::with_capacity(height);
    for value in df.column("day_of_week")?.i64()?.into_iter() {
        match value {
            Some(day) => {
                let (x, y) = project_day_of_week_to_unit_circle(day);
                dow_x.push(Some(x));
                dow_y.push(Some(y));
            }
            None => {
                dow_x.push(None);
                dow_y.push(None);
            }
        }
    }

    let mut out = df.clone();
    out.with_column(Series::new("date_circle_x", date_x))?;
    out.with_column(Series::new("date_circle_y", date_y))?;
    out.with_column(Series::new("day_of_week_circle_x", dow_x))?;
    out.with_column(Series::new("day_of_week_circle_y", dow_y))?;

    Ok(out)
}

fn single_room(df: &DataFrame) -> Result<String> {
    let unique = df.column("room")?.unique_stable()?;
    if unique.len() != 1 {
        let rooms = unique
            .str()?
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect();
        return Err(PipelineError::MultipleRooms(rooms));
    }

    Ok(unique
        .str()?
        .get(0)
        .unwrap_or_default()
        .to_string())
}

/// The resampled window must hold exactly `WINDOW_DAYS` rows covering
/// consecutive calendar days.
fn check_consecutive(daily: &DataFrame) -> Result<Vec<NaiveDate>> {
    if daily.height() != WINDOW_DAYS {
        return Err(PipelineError::WindowSize {
            expected: WINDOW_DAYS,
            actual: daily.height(),
        });
    }

    let dates: Vec<NaiveDate> = daily
        .column("date")?
        .date()?
        .into_iter()
        .flatten()
        .map(features::days_to_date)
        .collect();

    if dates.len() != WINDOW_DAYS {
        return Err(PipelineError::WindowSize {
            expected: WINDOW_DAYS,
            actual: dates.len(),
        });
    }

    for pair in dates.windows(2) {
        if pair[1] - pair[0] != Duration::days(1) {
            return Err(PipelineError::NonConsecutiveDays);
        }
    }

    Ok(dates)
}
