use crate::error::{PipelineError, Result};
use crate::season::Season;
use crate::structs::ObservationRecord;
use arrow_array::{Array, Float64Array, RecordBatch, StringArray};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::debug;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::Deserialize;
use std::{fs::File, io::Read, path::Path};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
const REQUIRED_COLUMNS: [&str; 4] = ["city", "timestamp", "temperature", "season"];

#[derive(Debug, Deserialize)]
struct RawRow {
    city: String,
    timestamp: String,
    temperature: f64,
    season: String,
}

/// Reads the historical observation dataset.
///
/// Files with a `.parquet` extension are read through Arrow; anything else is
/// treated as CSV with a header row.
///
/// # Errors
///
/// Returns `PipelineError::DataFormat` if a required column is missing or any
/// row carries an unparseable timestamp, season or temperature. No partial
/// result is returned.
pub fn read_observations(path: &Path) -> Result<Vec<ObservationRecord>> {
    let is_parquet = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("parquet"));

    let records = if is_parquet {
        debug!("Reading Parquet file: {}", path.display());
        read_parquet(File::open(path)?)?
    } else {
        debug!("Reading CSV file: {}", path.display());
        read_csv(File::open(path)?)?
    };

    debug!("Loaded {} observations from {}", records.len(), path.display());
    Ok(records)
}

/// Parses CSV observations from any reader.
pub fn read_csv<R: Read>(source: R) -> Result<Vec<ObservationRecord>> {
    let mut reader = csv::Reader::from_reader(source);

    let headers = reader.headers()?.clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(PipelineError::DataFormat(format!(
                "Column not found: {}",
                column
            )));
        }
    }

    let mut records = Vec::new();
    for (i, row) in reader.deserialize::<RawRow>().enumerate() {
        // header is line 1
        let line = i + 2;
        let row = row.map_err(|e| PipelineError::DataFormat(format!("line {}: {}", line, e)))?;
        records.push(build_record(
            row.city,
            &row.timestamp,
            &row.season,
            row.temperature,
            line,
        )?);
    }

    Ok(records)
}

/// Parses Parquet observations; `city`, `timestamp` and `season` must be
/// Utf8 columns and `temperature` Float64.
pub fn read_parquet(file: File) -> Result<Vec<ObservationRecord>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut records = Vec::new();
    let mut row_offset = 0;
    for batch_result in reader {
        let batch = batch_result.map_err(PipelineError::Arrow)?;
        let city_col = get_column_str(&batch, "city")?;
        let timestamp_col = get_column_str(&batch, "timestamp")?;
        let season_col = get_column_str(&batch, "season")?;
        let temp_col = get_column_f64(&batch, "temperature")?;

        for i in 0..batch.num_rows() {
            let row = row_offset + i + 1;
            if city_col.is_null(i)
                || timestamp_col.is_null(i)
                || season_col.is_null(i)
                || temp_col.is_null(i)
            {
                return Err(PipelineError::DataFormat(format!("row {}: null value", row)));
            }
            records.push(build_record(
                city_col.value(i).to_string(),
                timestamp_col.value(i),
                season_col.value(i),
                temp_col.value(i),
                row,
            )?);
        }
        row_offset += batch.num_rows();
    }

    Ok(records)
}

fn build_record(
    city: String,
    timestamp: &str,
    season: &str,
    temperature: f64,
    row: usize,
) -> Result<ObservationRecord> {
    let timestamp = parse_timestamp(timestamp).ok_or_else(|| {
        PipelineError::DataFormat(format!("row {}: unparseable timestamp {:?}", row, timestamp))
    })?;
    let season = season
        .parse::<Season>()
        .map_err(|e| PipelineError::DataFormat(format!("row {}: {}", row, e)))?;
    if !temperature.is_finite() {
        return Err(PipelineError::DataFormat(format!(
            "row {}: temperature is not finite",
            row
        )));
    }

    Ok(ObservationRecord {
        city,
        timestamp,
        season,
        temperature,
    })
}

/// Accepts plain dates, naive date-times and RFC 3339 timestamps.
///
/// Offsets are normalised to UTC before the offset is dropped.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, DATE_FORMAT) {
        return date.and_hms_opt(0, 0, 0);
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.naive_utc())
}

fn get_column_f64<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Float64Array> {
    batch
        .column_by_name(name)
        .ok_or_else(|| PipelineError::DataFormat(format!("Column not found: {}", name)))?
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| PipelineError::DataFormat(format!("Column {} is not Float64", name)))
}

fn get_column_str<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| PipelineError::DataFormat(format!("Column not found: {}", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| PipelineError::DataFormat(format!("Column {} is not Utf8/String", name)))
}
