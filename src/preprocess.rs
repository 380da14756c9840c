use polars::prelude::*;
use tracing::info;

use crate::error::{PipelineError, Result};

pub const REQUIRED_COLUMNS: [&str; 6] = ["device_id", "date_time", "tmp", "hum", "CO2", "VOC"];

/// Physically plausible sensor ranges, exclusive on both ends. These are
/// empirical limits of the deployed devices; dashboard percentile
/// comparisons depend on exactly this filtered population.
pub const TMP_RANGE: (f64, f64) = (-20.0, 50.0);
pub const HUM_RANGE: (f64, f64) = (0.0, 100.0);
pub const CO2_RANGE: (f64, f64) = (0.0, 10_000.0);
pub const VOC_RANGE: (f64, f64) = (0.0, 10_000.0);

/// Turn a raw reading table into a cleaned one: parsed timestamps, trimmed
/// device ids, implausible values filtered, duplicates and incomplete rows
/// dropped. Returns a new frame; the input is left untouched.
pub fn clean_readings(df: &DataFrame, timestamp_format: &str) -> Result<DataFrame> {
    for name in REQUIRED_COLUMNS {
        if df.column(name).is_err() {
            return Err(PipelineError::MissingColumn(name.to_string()));
        }
    }

    let mut lf = df.clone().lazy();

    // Strict parse: a single unparseable timestamp fails the whole batch.
    if df.column("date_time")?.dtype() == &DataType::String {
        lf = lf.with_column(col("date_time").str().strip_chars(lit(NULL)).str().to_datetime(
            Some(TimeUnit::Milliseconds),
            None,
            StrptimeOptions {
                format: Some(timestamp_format.to_string()),
                ..Default::default()
            },
            lit("raise"),
        ));
    }

    lf = lf.with_column(col("device_id").str().strip_chars(lit(NULL)));

    // snr comes space-padded out of the gateway export
    if let Ok(snr) = df.column("snr") {
        if snr.dtype() == &DataType::String {
            lf = lf.with_column(
                col("snr")
                    .str()
                    .strip_chars(lit(NULL))
                    .cast(DataType::Float64),
            );
        }
    }

    let in_range = range_filter("tmp", TMP_RANGE)
        .and(range_filter("hum", HUM_RANGE))
        .and(range_filter("CO2", CO2_RANGE))
        .and(range_filter("VOC", VOC_RANGE));

    let cleaned = lf
        .filter(in_range)
        .unique_stable(None, UniqueKeepStrategy::First)
        .drop_nulls(Some(vec![col("tmp"), col("hum"), col("CO2"), col("VOC")]))
        .collect()?;

    info!(
        "Cleaned readings: {} of {} rows kept",
        cleaned.height(),
        df.height()
    );

    Ok(cleaned)
}

fn range_filter(name: &str, (low, high): (f64, f64)) -> Expr {
    col(name).gt(lit(low)).and(col(name).lt(lit(high)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_frame() -> DataFrame {
        df![
            "device_id" => [" hka-aqm-n203 ", "hka-aqm-n203", "hka-aqm-n112"],
            "date_time" => ["2023-01-02 10:00:00", "2023-01-02 11:00:00", "2023-01-02 12:00:00"],
            "tmp" => [21.5, 120.0, 19.0],
            "hum" => [45.0, 50.0, 55.0],
            "CO2" => [600.0, 700.0, 800.0],
            "VOC" => [120.0, 130.0, 140.0],
        ]
        .unwrap()
    }

    #[test]
    fn out_of_range_rows_are_dropped() {
        let cleaned = clean_readings(&raw_frame(), "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(cleaned.height(), 2);
    }

    #[test]
    fn device_ids_are_trimmed() {
        let cleaned = clean_readings(&raw_frame(), "%Y-%m-%d %H:%M:%S").unwrap();
        let ids = cleaned.column("device_id").unwrap();
        assert_eq!(ids.str().unwrap().get(0), Some("hka-aqm-n203"));
    }

    #[test]
    fn missing_required_column_is_fatal() {
        let df = df!["tmp" => [20.0]].unwrap();
        let err = clean_readings(&df, "%Y-%m-%d %H:%M:%S").unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn(_)));
    }

    #[test]
    fn unparseable_timestamp_is_fatal() {
        let df = df![
            "device_id" => ["hka-aqm-n203"],
            "date_time" => ["yesterday-ish"],
            "tmp" => [21.0],
            "hum" => [45.0],
            "CO2" => [600.0],
            "VOC" => [120.0],
        ]
        .unwrap();
        assert!(clean_readings(&df, "%Y-%m-%d %H:%M:%S").is_err());
    }
}
