use crate::error::Result;
use crate::season::Season;
use crate::structs::{CityStatistics, CitySummary, LiveTemperature, Verdict};
use arrow_array::{Float64Array, RecordBatch, StringArray, UInt32Array};
use arrow_schema::{DataType, Field, Schema};
use csv::Writer;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::collections::BTreeMap;
use std::{fs::File, path::Path, sync::Arc};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Flattens per-city statistics, live readings and verdicts into one row per
/// city for the selected season.
///
/// `live` and `verdicts` may be empty when no live check was run.
pub fn build_summaries(
    stats: &BTreeMap<String, CityStatistics>,
    season: Season,
    live: &BTreeMap<String, LiveTemperature>,
    verdicts: &BTreeMap<String, Verdict>,
) -> Vec<CitySummary> {
    stats
        .values()
        .map(|city| {
            let season_stats = city.season_profile.get(&season);
            CitySummary {
                city: city.city.clone(),
                observations: city.count,
                mean_temp: city.mean_temp,
                min_temp: city.min_temp,
                max_temp: city.max_temp,
                anomaly_count: city.anomaly_count() as u32,
                trend_per_year: city.trend_line.slope_per_year(),
                season,
                season_avg: season_stats.map(|s| s.average),
                season_std: season_stats.and_then(|s| s.std),
                current_temp: live.get(&city.city).and_then(LiveTemperature::celsius),
                verdict: verdicts.get(&city.city).copied(),
            }
        })
        .collect()
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_default()
}

/// Writes per-city summaries to a CSV file with formatted numeric values.
///
/// Absent values (no season band, no live reading) are written as empty cells.
///
/// # Errors
/// Returns error if file cannot be created or written to.
pub fn write_csv(results: &[CitySummary], output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    let mut writer = Writer::from_writer(file);

    writer.write_record([
        "City",
        "Observations",
        "Mean_Temp",
        "Min_Temp",
        "Max_Temp",
        "Anomaly_Count",
        "Trend_Per_Year",
        "Season",
        "Season_Avg",
        "Season_Std",
        "Current_Temp",
        "Verdict",
    ])?;

    for summary in results {
        writer.write_record(&[
            summary.city.to_string(),
            summary.observations.to_string(),
            format!("{:.2}", summary.mean_temp),
            format!("{:.2}", summary.min_temp),
            format!("{:.2}", summary.max_temp),
            summary.anomaly_count.to_string(),
            format!("{:.4}", summary.trend_per_year),
            summary.season.to_string(),
            optional(summary.season_avg),
            optional(summary.season_std),
            optional(summary.current_temp),
            summary.verdict.map(|v| v.to_string()).unwrap_or_default(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Writes per-city summaries to a pretty-formatted JSON file.
///
/// # Errors
/// Returns error if file cannot be created or serialization fails.
pub fn write_json(results: &[CitySummary], output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    serde_json::to_writer_pretty(file, results)?;
    Ok(())
}

/// Writes the live check's per-city readings to a pretty-formatted JSON
/// object keyed by city. Cities without a reading carry the typed failure.
///
/// # Errors
/// Returns error if file cannot be created or serialization fails.
pub fn write_live_json(live: &BTreeMap<String, LiveTemperature>, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    serde_json::to_writer_pretty(file, live)?;
    Ok(())
}

/// Writes per-city summaries to a columnar Parquet file using Arrow format.
///
/// Season band, current temperature and verdict columns are nullable.
///
/// # Errors
/// Returns error if file cannot be created, schema is invalid, or Arrow operations fail.
pub fn write_parquet(results: &[CitySummary], output_path: &Path) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("city", DataType::Utf8, false),
        Field::new("observations", DataType::UInt32, false),
        Field::new("mean_temp", DataType::Float64, false),
        Field::new("min_temp", DataType::Float64, false),
        Field::new("max_temp", DataType::Float64, false),
        Field::new("anomaly_count", DataType::UInt32, false),
        Field::new("trend_per_year", DataType::Float64, false),
        Field::new("season", DataType::Utf8, false),
        Field::new("season_avg", DataType::Float64, true),
        Field::new("season_std", DataType::Float64, true),
        Field::new("current_temp", DataType::Float64, true),
        Field::new("verdict", DataType::Utf8, true),
    ]));

    let cities = StringArray::from_iter_values(results.iter().map(|r| r.city.as_str()));
    let observations: UInt32Array = results.iter().map(|r| r.observations).collect();
    let mean_temps: Float64Array = results.iter().map(|r| r.mean_temp).collect();
    let min_temps: Float64Array = results.iter().map(|r| r.min_temp).collect();
    let max_temps: Float64Array = results.iter().map(|r| r.max_temp).collect();
    let anomaly_counts: UInt32Array = results.iter().map(|r| r.anomaly_count).collect();
    let trends: Float64Array = results.iter().map(|r| r.trend_per_year).collect();
    let seasons = StringArray::from_iter_values(results.iter().map(|r| r.season.as_str()));
    let season_avgs: Float64Array = results.iter().map(|r| r.season_avg).collect();
    let season_stds: Float64Array = results.iter().map(|r| r.season_std).collect();
    let current_temps: Float64Array = results.iter().map(|r| r.current_temp).collect();
    let verdicts: StringArray = results
        .iter()
        .map(|r| r.verdict.map(|v| v.to_string()))
        .collect();

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(cities),
            Arc::new(observations),
            Arc::new(mean_temps),
            Arc::new(min_temps),
            Arc::new(max_temps),
            Arc::new(anomaly_counts),
            Arc::new(trends),
            Arc::new(seasons),
            Arc::new(season_avgs),
            Arc::new(season_stds),
            Arc::new(current_temps),
            Arc::new(verdicts),
        ],
    )?;

    let file = File::create(output_path)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(())
}

/// Writes the per-observation trend and anomaly series, one row per
/// observation, for charting.
pub fn write_series_csv(stats: &BTreeMap<String, CityStatistics>, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    let mut writer = Writer::from_writer(file);

    writer.write_record(["City", "Timestamp", "Temperature", "Trend", "Is_Anomaly"])?;

    for city in stats.values() {
        for (point, trend) in city.anomalies.iter().zip(&city.trend) {
            writer.write_record(&[
                city.city.clone(),
                point.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                format!("{:.2}", point.temperature),
                format!("{:.4}", trend.trend),
                point.is_anomaly.to_string(),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}
