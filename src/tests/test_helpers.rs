#[cfg(test)]
pub mod test_helpers {
    use chrono::NaiveDate;
    use ndarray::ArrayView2;
    use polars::prelude::*;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::artifacts::{MinMaxScaler, ModelArtifacts, OneHotEncoder};
    use crate::error::Result;
    use crate::features::date_to_days;
    use crate::torch_bridge::ForecastModel;

    pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
    pub const DEVICE_PREFIX: &str = "hka-aqm-n";

    /// Model input columns in the order the trained scaler was fitted on.
    pub fn model_feature_names() -> Vec<String> {
        [
            "tmp",
            "hum",
            "CO2",
            "VOC",
            "date_circle_x",
            "date_circle_y",
            "day_of_week_circle_x",
            "day_of_week_circle_y",
            "season_autumn",
            "season_spring",
            "season_summer",
            "season_winter",
            "floor_0",
            "floor_1",
            "floor_2",
            "floor_3",
        ]
        .iter()
        .map(|name| name.to_string())
        .collect()
    }

    /// A stub net that records how often it ran and always predicts the
    /// same scaled value.
    pub struct ConstModel {
        value: f64,
        calls: Arc<AtomicUsize>,
    }

    impl ConstModel {
        pub fn new(value: f64) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    value,
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    impl ForecastModel for ConstModel {
        fn predict(&self, _window: ArrayView2<'_, f64>) -> Result<Vec<f64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![self.value])
        }
    }

    pub fn fitted_encoder() -> OneHotEncoder {
        OneHotEncoder {
            columns: vec![String::from("season"), String::from("floor")],
            categories: vec![
                ["autumn", "spring", "summer", "winter"]
                    .iter()
                    .map(|c| c.to_string())
                    .collect(),
                ["0", "1", "2", "3"].iter().map(|c| c.to_string()).collect(),
            ],
        }
    }

    /// Identity-ish artifacts: inputs fitted on [0, 1], target on [10, 30].
    pub fn stub_artifacts(model: ConstModel) -> ModelArtifacts {
        let names = model_feature_names();
        ModelArtifacts {
            model: Box::new(model),
            x_scaler: MinMaxScaler {
                data_min: vec![0.0; names.len()],
                data_max: vec![1.0; names.len()],
                feature_names: names,
                feature_range: (0.0, 1.0),
            },
            y_scaler: MinMaxScaler {
                feature_names: vec![String::from("tmp")],
                data_min: vec![10.0],
                data_max: vec![30.0],
                feature_range: (0.0, 1.0),
            },
            encoder: fitted_encoder(),
        }
    }

    pub fn consecutive_days(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
        (0..n)
            .map(|i| start + chrono::Duration::days(i as i64))
            .collect()
    }

    /// Raw in-memory readings for one device, two samples per day.
    pub fn raw_window(device_id: &str, dates: &[NaiveDate]) -> DataFrame {
        let mut device = Vec::new();
        let mut date_time = Vec::new();
        let mut tmp = Vec::new();
        let mut hum = Vec::new();
        let mut co2 = Vec::new();
        let mut voc = Vec::new();

        for (i, date) in dates.iter().enumerate() {
            for hour in [9, 15] {
                device.push(device_id.to_string());
                date_time.push(format!("{} {:02}:00:00", date.format("%Y-%m-%d"), hour));
                tmp.push(18.0 + i as f64);
                hum.push(45.0);
                co2.push(600.0);
                voc.push(120.0);
            }
        }

        df![
            "device_id" => device,
            "date_time" => date_time,
            "tmp" => tmp,
            "hum" => hum,
            "CO2" => co2,
            "VOC" => voc,
        ]
        .unwrap()
    }

    /// Write a syntactically valid raw export: preamble line, header, then
    /// two semicolon-delimited readings for the given day.
    pub fn write_raw_export(dir: &Path, name: &str, device_id: &str, date: NaiveDate) -> PathBuf {
        let path = dir.join(name);
        let mut content = String::from("# hka-aqm gateway export\n");
        content.push_str("device_id;date_time;tmp;hum;CO2;VOC;snr\n");
        for hour in [9, 15] {
            content.push_str(&format!(
                "{device_id};{} {:02}:00:00;21.5;45.0;600.0;120.0; -7.5\n",
                date.format("%Y-%m-%d"),
                hour
            ));
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Hourly weather rows for one date, keyed like the archive response.
    pub fn weather_frame(date: NaiveDate, hours: &[i64]) -> DataFrame {
        let mut df = df![
            "date" => vec![date_to_days(date); hours.len()],
            "hour" => hours.to_vec(),
            "outside_tmp" => vec![5.125; hours.len()],
            "outside_hum" => vec![80.0; hours.len()],
            "outside_rain" => vec![0.2; hours.len()],
            "outside_snowfall" => vec![0.0; hours.len()],
            "outside_wind_speed" => vec![10.5; hours.len()],
            "outside_pressure" => vec![1013.25; hours.len()],
        ]
        .unwrap();

        let date_col = df.column("date").unwrap().cast(&DataType::Date).unwrap();
        df.with_column(date_col).unwrap();
        df
    }
}
