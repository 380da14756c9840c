use chrono::{NaiveDate, NaiveDateTime, Timelike};
use polars::prelude::*;
use serde_json::Value;
use std::time::Duration as StdDuration;
use tracing::{info, warn};

use crate::config::WeatherConfig;
use crate::error::{PipelineError, Result};
use crate::features::date_to_days;

/// Hourly variables requested from the archive endpoint, in the order their
/// response arrays are consumed.
const HOURLY_VARIABLES: &str =
    "temperature_2m,relative_humidity_2m,rain,snowfall,wind_speed_10m,pressure_msl";

/// Weather columns attached to every enriched reading.
pub const OUTSIDE_COLUMNS: [&str; 6] = [
    "outside_tmp",
    "outside_hum",
    "outside_rain",
    "outside_snowfall",
    "outside_wind_speed",
    "outside_pressure",
];

/// Fetches hourly weather observations from the Open-Meteo archive for a
/// fixed coordinate. Retries with exponential backoff live here; callers
/// treat a fetch as all-or-nothing.
pub struct WeatherFetcher {
    http_client: reqwest::Client,
    config: WeatherConfig,
}

impl WeatherFetcher {
    pub fn new(config: WeatherConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PipelineError::WeatherFetch {
                attempts: 0,
                message: e.to_string(),
            })?;

        Ok(Self {
            http_client,
            config,
        })
    }

    /// Fetch the full date span in one call. One row per (date, hour),
    /// values rounded to 3 decimals, localized to the configured timezone.
    pub async fn fetch_hourly(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<DataFrame> {
        info!(
            "Fetching weather for lat={}, lon={} from {} to {}",
            self.config.latitude, self.config.longitude, start_date, end_date
        );

        let mut last_error = String::new();
        for attempt in 1..=self.config.max_retries {
            match self.fetch_once(start_date, end_date).await {
                Ok(df) => return Ok(df),
                Err(e) => {
                    last_error = e.to_string();
                    warn!(
                        "Weather fetch attempt {}/{} failed: {}",
                        attempt, self.config.max_retries, last_error
                    );
                    if attempt < self.config.max_retries {
                        let backoff = self.config.backoff_factor * f64::from(1u32 << (attempt - 1));
                        tokio::time::sleep(StdDuration::from_secs_f64(backoff)).await;
                    }
                }
            }
        }

        Err(PipelineError::WeatherFetch {
            attempts: self.config.max_retries,
            message: last_error,
        })
    }

    async fn fetch_once(&self, start_date: NaiveDate, end_date: NaiveDate) -> Result<DataFrame> {
        let params = [
            ("latitude", self.config.latitude.to_string()),
            ("longitude", self.config.longitude.to_string()),
            ("start_date", start_date.format("%Y-%m-%d").to_string()),
            ("end_date", end_date.format("%Y-%m-%d").to_string()),
            ("timezone", self.config.timezone.clone()),
            ("hourly", HOURLY_VARIABLES.to_string()),
        ];

        let response = self
            .http_client
            .get(&self.config.endpoint)
            .query(&params)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PipelineError::WeatherFetch {
                attempts: 1,
                message: e.to_string(),
            })?;

        let data: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::WeatherFetch {
                attempts: 1,
                message: e.to_string(),
            })?;

        parse_hourly_response(&data)
    }
}

/// Turn the archive response into a (date, hour)-keyed frame with the six
/// outside_* columns. The API already localized the timestamps via the
/// timezone request parameter, so they parse as naive local times.
fn parse_hourly_response(data: &Value) -> Result<DataFrame> {
    let hourly = data
        .get("hourly")
        .ok_or_else(|| malformed("no hourly block in weather response"))?;
    let time_array = hourly
        .get("time")
        .and_then(|v| v.as_array())
        .ok_or_else(|| malformed("missing time array in weather response"))?;

    let mut days: Vec<i32> = Vec::with_capacity(time_array.len());
    let mut hours: Vec<i64> = Vec::with_capacity(time_array.len());
    let mut tmp = Vec::with_capacity(time_array.len());
    let mut hum = Vec::with_capacity(time_array.len());
    let mut rain = Vec::with_capacity(time_array.len());
    let mut snowfall = Vec::with_capacity(time_array.len());
    let mut wind_speed = Vec::with_capacity(time_array.len());
    let mut pressure = Vec::with_capacity(time_array.len());

    for (i, time_val) in time_array.iter().enumerate() {
        let Some(time_str) = time_val.as_str() else {
            continue;
        };
        let Ok(dt) = NaiveDateTime::parse_from_str(time_str, "%Y-%m-%dT%H:%M") else {
            continue;
        };

        days.push(date_to_days(dt.date()));
        hours.push(i64::from(dt.time().hour()));
        tmp.push(extract_rounded(hourly, "temperature_2m", i));
        hum.push(extract_rounded(hourly, "relative_humidity_2m", i));
        rain.push(extract_rounded(hourly, "rain", i));
        snowfall.push(extract_rounded(hourly, "snowfall", i));
        wind_speed.push(extract_rounded(hourly, "wind_speed_10m", i));
        pressure.push(extract_rounded(hourly, "pressure_msl", i));
    }

    let mut df = df![
        "date" => days,
        "hour" => hours,
        "outside_tmp" => tmp,
        "outside_hum" => hum,
        "outside_rain" => rain,
        "outside_snowfall" => snowfall,
        "outside_wind_speed" => wind_speed,
        "outside_pressure" => pressure,
    ]?;

    let date = df.column("date")?.cast(&DataType::Date)?;
    df.with_column(date)?;

    Ok(df)
}

fn extract_rounded(hourly: &Value, key: &str, index: usize) -> Option<f64> {
    hourly
        .get(key)
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.get(index))
        .and_then(|v| v.as_f64())
        .map(|f| (f * 1000.0).round() / 1000.0)
}

fn malformed(message: &str) -> PipelineError {
    PipelineError::WeatherFetch {
        attempts: 1,
        message: message.to_string(),
    }
}

/// Min/max calendar dates covered by the readings' `date_time` column.
pub fn date_span(readings: &DataFrame) -> Result<(NaiveDate, NaiveDate)> {
    let ts = readings.column("date_time")?.datetime()?;
    let time_unit = ts.time_unit();

    let to_date = |value: i64| {
        let millis = match time_unit {
            TimeUnit::Milliseconds => value,
            TimeUnit::Microseconds => value / 1_000,
            TimeUnit::Nanoseconds => value / 1_000_000,
        };
        chrono::DateTime::from_timestamp_millis(millis).map(|dt| dt.date_naive())
    };

    match (ts.min().and_then(to_date), ts.max().and_then(to_date)) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(PipelineError::NoReadings),
    }
}

/// Left-join weather observations onto the readings by (date, hour) derived
/// from `date_time`. Readings without a matching observation keep null
/// outside_* fields; no reading is ever dropped here.
pub fn join_weather(readings: &DataFrame, weather: &DataFrame) -> Result<DataFrame> {
    let joined = readings
        .clone()
        .lazy()
        .with_columns([
            col("date_time").dt().date().alias("date"),
            col("date_time").dt().hour().cast(DataType::Int64).alias("hour"),
        ])
        .join(
            weather.clone().lazy(),
            [col("date"), col("hour")],
            [col("date"), col("hour")],
            JoinArgs::new(JoinType::Left),
        )
        .collect()?;

    Ok(joined)
}

/// The batch enrichment step: derive the span, fetch once, join.
pub async fn enrich_with_weather(
    readings: &DataFrame,
    fetcher: &WeatherFetcher,
) -> Result<DataFrame> {
    let (start_date, end_date) = date_span(readings)?;
    let weather = fetcher.fetch_hourly(start_date, end_date).await?;
    info!("Fetched {} hourly weather rows", weather.height());
    join_weather(readings, &weather)
}
