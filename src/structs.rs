use crate::error::FetchError;
use crate::season::Season;
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use log::{Level, Log, Metadata, Record as LogRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Simple logger implementation
pub struct SimpleLogger;

impl Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &LogRecord) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let stamp = Local::now().format("%H:%M:%S%.3f");
        match record.level() {
            Level::Error | Level::Warn => {
                eprintln!("{} [{}] {}", stamp, record.level(), record.args())
            }
            _ => println!("{} [{}] {}", stamp, record.level(), record.args()),
        }
    }

    fn flush(&self) {}
}

/// One historical weather sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub city: String,
    pub timestamp: NaiveDateTime,
    pub season: Season,
    pub temperature: f64,
}

/// Mean and sample standard deviation of one season's temperatures.
///
/// `std` is `None` when the season has a single observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeasonStats {
    pub average: f64,
    pub std: Option<f64>,
    pub count: u32,
}

impl SeasonStats {
    /// The (average - std, average + std) band, if the std is defined.
    pub fn band(&self) -> Option<(f64, f64)> {
        self.std.map(|std| (self.average - std, self.average + std))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub timestamp: NaiveDateTime,
    pub trend: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyPoint {
    pub timestamp: NaiveDateTime,
    pub temperature: f64,
    pub is_anomaly: bool,
}

/// Ordinary-least-squares line of temperature against ordinal day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendLine {
    pub slope: f64,
    pub intercept: f64,
}

impl TrendLine {
    pub fn predict(&self, ordinal: f64) -> f64 {
        self.intercept + self.slope * ordinal
    }

    pub fn slope_per_year(&self) -> f64 {
        self.slope * 365.25
    }
}

/// Descriptive and predictive statistics for one city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityStatistics {
    pub city: String,
    pub count: u32,
    pub mean_temp: f64,
    pub min_temp: f64,
    pub max_temp: f64,
    pub season_profile: BTreeMap<Season, SeasonStats>,
    pub trend_line: TrendLine,
    pub trend: Vec<TrendPoint>,
    pub anomalies: Vec<AnomalyPoint>,
}

impl CityStatistics {
    pub fn anomaly_count(&self) -> usize {
        self.anomalies.iter().filter(|p| p.is_anomaly).count()
    }
}

/// Current reading for one city, or the reason there is none.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LiveTemperature {
    Reading {
        celsius: f64,
        retrieved_at: DateTime<Utc>,
    },
    NoData {
        reason: FetchError,
    },
}

impl LiveTemperature {
    pub fn celsius(&self) -> Option<f64> {
        match self {
            LiveTemperature::Reading { celsius, .. } => Some(*celsius),
            LiveTemperature::NoData { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&FetchError> {
        match self {
            LiveTemperature::Reading { .. } => None,
            LiveTemperature::NoData { reason } => Some(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    NoData,
    RecordHeat,
    RecordCold,
    Normal,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Verdict::NoData => "no data",
            Verdict::RecordHeat => "record heat",
            Verdict::RecordCold => "record cold",
            Verdict::Normal => "normal",
        };
        f.pad(text)
    }
}

/// Flattened per-city row written by the exporters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitySummary {
    pub city: String,
    pub observations: u32,
    pub mean_temp: f64,
    pub min_temp: f64,
    pub max_temp: f64,
    pub anomaly_count: u32,
    pub trend_per_year: f64,
    pub season: Season,
    pub season_avg: Option<f64>,
    pub season_std: Option<f64>,
    pub current_temp: Option<f64>,
    pub verdict: Option<Verdict>,
}

/// Configuration for per-city statistics
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub window: usize,
    pub sigma: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window: 30,
            sigma: 2.0,
        }
    }
}

pub const DEFAULT_ENDPOINT: &str = "https://api.openweathermap.org/data/2.5/weather";

/// Configuration for the current-temperature client
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub endpoint: String,
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}
