use chrono::{Duration, NaiveDate};
use polars::prelude::*;
use tracing::info;

use crate::error::{PipelineError, Result};

/// Device telemetry columns that never make it past feature building.
pub const TELEMETRY_COLUMNS: [&str; 12] = [
    "vis",
    "IR",
    "WIFI",
    "BLE",
    "rssi",
    "channel_rssi",
    "snr",
    "gateway",
    "channel_index",
    "spreading_factor",
    "bandwidth",
    "f_cnt",
];

/// Column order of the persisted feature dataset.
pub const FEATURE_SCHEMA: [&str; 19] = [
    "room",
    "floor",
    "date",
    "date_time",
    "month",
    "hour",
    "day_of_week",
    "is_weekend",
    "season",
    "tmp",
    "hum",
    "CO2",
    "VOC",
    "outside_tmp",
    "outside_hum",
    "outside_rain",
    "outside_snowfall",
    "outside_wind_speed",
    "outside_pressure",
];

/// Meteorological season for a month, as used in Germany.
pub fn season_for_month(month: u32) -> &'static str {
    match month {
        12 | 1 | 2 => "winter",
        3 | 4 | 5 => "spring",
        6 | 7 | 8 => "summer",
        _ => "autumn",
    }
}

pub(crate) fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
}

pub(crate) fn date_to_days(date: NaiveDate) -> i32 {
    (date - epoch()).num_days() as i32
}

pub(crate) fn days_to_date(days: i32) -> NaiveDate {
    epoch() + Duration::days(i64::from(days))
}

/// Derive `room` and `floor` from the device id. The room is whatever
/// follows the building prefix; its first character encodes the floor.
fn room_and_floor(df: &DataFrame, device_prefix: &str) -> Result<(Series, Series)> {
    let device = df.column("device_id")?.str()?;

    let mut rooms: Vec<String> = Vec::with_capacity(df.height());
    let mut floors: Vec<i64> = Vec::with_capacity(df.height());

    for value in device.into_iter() {
        let id = value.ok_or_else(|| PipelineError::DeviceIdFormat(String::from("<null>")))?;
        let room = id.strip_prefix(device_prefix).unwrap_or(id);
        let floor = room
            .chars()
            .next()
            .and_then(|c| c.to_digit(10))
            .ok_or_else(|| PipelineError::DeviceIdFormat(id.to_string()))?;
        rooms.push(room.to_string());
        floors.push(i64::from(floor));
    }

    Ok((Series::new("room", rooms), Series::new("floor", floors)))
}

/// Add the room/floor and calendar columns: date, month, hour, day_of_week
/// (0 = Monday), is_weekend and season, all derived from `date_time`.
pub fn add_calendar_features(df: &DataFrame, device_prefix: &str) -> Result<DataFrame> {
    let (rooms, floors) = room_and_floor(df, device_prefix)?;

    let mut out = df.clone();
    out.with_column(rooms)?;
    out.with_column(floors)?;

    let out = out
        .lazy()
        .with_columns([
            col("date_time").dt().date().alias("date"),
            col("date_time").dt().month().cast(DataType::Int64).alias("month"),
            col("date_time").dt().hour().cast(DataType::Int64).alias("hour"),
            (col("date_time").dt().weekday().cast(DataType::Int64) - lit(1))
                .alias("day_of_week"),
        ])
        .with_columns([
            col("day_of_week").gt_eq(lit(5)).alias("is_weekend"),
            season_expr(),
        ])
        .collect()?;

    Ok(out)
}

fn season_expr() -> Expr {
    when(col("month").eq(lit(12)).or(col("month").lt_eq(lit(2))))
        .then(lit("winter"))
        .when(col("month").lt_eq(lit(5)))
        .then(lit("spring"))
        .when(col("month").lt_eq(lit(8)))
        .then(lit("summer"))
        .otherwise(lit("autumn"))
        .alias("season")
}

/// Drop the device id and every telemetry column that is present.
pub fn drop_telemetry(df: &DataFrame) -> DataFrame {
    let mut out = df.clone();
    for name in TELEMETRY_COLUMNS.iter().chain(std::iter::once(&"device_id")) {
        if let Ok(dropped) = out.drop(name) {
            out = dropped;
        }
    }
    out
}

/// Build the full persisted feature table from an enriched readings frame.
/// The output schema is exactly `FEATURE_SCHEMA`, in that order.
pub fn build_features(df: &DataFrame, device_prefix: &str) -> Result<DataFrame> {
    let with_calendar = add_calendar_features(df, device_prefix)?;

    let selected = with_calendar
        .lazy()
        .select(
            FEATURE_SCHEMA
                .iter()
                .map(|name| col(*name))
                .collect::<Vec<_>>(),
        )
        .collect()?;

    info!(
        "Feature table: {} rows, {} columns",
        selected.height(),
        selected.width()
    );

    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_datetime(df: DataFrame) -> DataFrame {
        df.lazy()
            .with_column(col("date_time").str().to_datetime(
                Some(TimeUnit::Milliseconds),
                None,
                StrptimeOptions {
                    format: Some(String::from("%Y-%m-%d %H:%M:%S")),
                    ..Default::default()
                },
                lit("raise"),
            ))
            .collect()
            .unwrap()
    }

    #[test]
    fn season_mapping_is_total() {
        let expected = [
            (1, "winter"),
            (2, "winter"),
            (3, "spring"),
            (4, "spring"),
            (5, "spring"),
            (6, "summer"),
            (7, "summer"),
            (8, "summer"),
            (9, "autumn"),
            (10, "autumn"),
            (11, "autumn"),
            (12, "winter"),
        ];
        for (month, season) in expected {
            assert_eq!(season_for_month(month), season);
        }
    }

    #[test]
    fn room_and_floor_are_derived_from_device_id() {
        let df = df![
            "device_id" => ["hka-aqm-n203"],
            "date_time" => ["2023-01-02 10:00:00"],
        ]
        .unwrap();
        let df = with_datetime(df);

        let out = add_calendar_features(&df, "hka-aqm-n").unwrap();
        assert_eq!(out.column("room").unwrap().str().unwrap().get(0), Some("203"));
        assert_eq!(out.column("floor").unwrap().i64().unwrap().get(0), Some(2));
    }

    #[test]
    fn non_numeric_floor_is_an_error() {
        let df = df![
            "device_id" => ["hka-aqm-nXY"],
            "date_time" => ["2023-01-02 10:00:00"],
        ]
        .unwrap();
        let df = with_datetime(df);

        let err = add_calendar_features(&df, "hka-aqm-n").unwrap_err();
        assert!(matches!(err, PipelineError::DeviceIdFormat(_)));
    }

    #[test]
    fn weekday_monday_is_zero_and_weekend_is_flagged() {
        // 2023-01-02 was a Monday, 2023-01-07 a Saturday
        let df = df![
            "device_id" => ["hka-aqm-n203", "hka-aqm-n203"],
            "date_time" => ["2023-01-02 10:00:00", "2023-01-07 10:00:00"],
        ]
        .unwrap();
        let df = with_datetime(df);

        let out = add_calendar_features(&df, "hka-aqm-n").unwrap();
        let dow = out.column("day_of_week").unwrap().i64().unwrap();
        assert_eq!(dow.get(0), Some(0));
        assert_eq!(dow.get(1), Some(5));

        let weekend = out.column("is_weekend").unwrap().bool().unwrap();
        assert_eq!(weekend.get(0), Some(false));
        assert_eq!(weekend.get(1), Some(true));
    }
}
