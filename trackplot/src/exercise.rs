//! Tabular exercise export (Samsung Health style): one CSV row per activity,
//! each pointing at a JSON file that holds the recorded locations.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::batch::BatchReport;
use crate::config::ExerciseExportConfig;
use crate::sources::TrackSource;
use crate::track::{Track, TrackPoint};
use crate::TrackError;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseField {
    Duration,
    LocationData,
    StartTime,
    MaxAltitude,
    MinAltitude,
    UpdateTime,
    CreateTime,
    MaxSpeed,
    Distance,
    MeanSpeed,
    EndTime,
    DataUuid,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ColumnMapping {
    pub column: String,
    pub field: ExerciseField,
}

/// Vendor column names and the record fields they feed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColumnSchema {
    pub activity_type_column: String,
    pub columns: Vec<ColumnMapping>,
}

const SAMSUNG_HEALTH_ACTIVITY_COLUMN: &str = "com.samsung.health.exercise.exercise_type";

const SAMSUNG_HEALTH_COLUMNS: &[(&str, ExerciseField)] = &[
    ("com.samsung.health.exercise.duration", ExerciseField::Duration),
    ("com.samsung.health.exercise.location_data", ExerciseField::LocationData),
    ("com.samsung.health.exercise.start_time", ExerciseField::StartTime),
    ("com.samsung.health.exercise.max_altitude", ExerciseField::MaxAltitude),
    ("com.samsung.health.exercise.min_altitude", ExerciseField::MinAltitude),
    ("com.samsung.health.exercise.update_time", ExerciseField::UpdateTime),
    ("com.samsung.health.exercise.create_time", ExerciseField::CreateTime),
    ("com.samsung.health.exercise.max_speed", ExerciseField::MaxSpeed),
    ("com.samsung.health.exercise.distance", ExerciseField::Distance),
    ("com.samsung.health.exercise.mean_speed", ExerciseField::MeanSpeed),
    ("com.samsung.health.exercise.end_time", ExerciseField::EndTime),
    ("com.samsung.health.exercise.datauuid", ExerciseField::DataUuid),
];

impl ColumnSchema {
    pub fn samsung_health() -> Self {
        Self {
            activity_type_column: SAMSUNG_HEALTH_ACTIVITY_COLUMN.to_string(),
            columns: SAMSUNG_HEALTH_COLUMNS
                .iter()
                .map(|(column, field)| ColumnMapping {
                    column: column.to_string(),
                    field: *field,
                })
                .collect(),
        }
    }

    pub fn column_for(&self, field: ExerciseField) -> Option<&str> {
        self.columns
            .iter()
            .find(|m| m.field == field)
            .map(|m| m.column.as_str())
    }
}

impl Default for ColumnSchema {
    fn default() -> Self {
        Self::samsung_health()
    }
}

/// One activity row after column extraction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExerciseRecord {
    /// 1-based data row number (header excluded).
    pub row: usize,
    pub data_uuid: Option<String>,
    pub location_data: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
    pub duration_ms: Option<f64>,
    pub distance_m: Option<f64>,
    pub min_altitude: Option<f64>,
    pub max_altitude: Option<f64>,
    pub max_speed: Option<f64>,
    pub mean_speed: Option<f64>,
}

impl ExerciseRecord {
    /// Identifier used in logs and errors: the uuid when present, else the row.
    pub fn id(&self) -> String {
        match self.data_uuid.as_ref() {
            Some(uuid) => uuid.clone(),
            None => format!("row {}", self.row),
        }
    }

    fn assign(&mut self, field: ExerciseField, raw: &str) -> Result<(), String> {
        let raw = raw.trim();
        let text = || {
            if raw.is_empty() {
                None
            } else {
                Some(raw.to_string())
            }
        };
        match field {
            ExerciseField::Duration => self.duration_ms = parse_number("duration", raw)?,
            ExerciseField::Distance => self.distance_m = parse_number("distance", raw)?,
            ExerciseField::MinAltitude => self.min_altitude = parse_number("min_altitude", raw)?,
            ExerciseField::MaxAltitude => self.max_altitude = parse_number("max_altitude", raw)?,
            ExerciseField::MaxSpeed => self.max_speed = parse_number("max_speed", raw)?,
            ExerciseField::MeanSpeed => self.mean_speed = parse_number("mean_speed", raw)?,
            ExerciseField::LocationData => self.location_data = text(),
            ExerciseField::StartTime => self.start_time = text(),
            ExerciseField::EndTime => self.end_time = text(),
            ExerciseField::CreateTime => self.create_time = text(),
            ExerciseField::UpdateTime => self.update_time = text(),
            ExerciseField::DataUuid => self.data_uuid = text(),
        }
        Ok(())
    }
}

fn parse_number(name: &str, raw: &str) -> Result<Option<f64>, String> {
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| format!("{} '{}' is not a number", name, raw))
}

/// One entry of a location JSON file.
#[derive(Clone, Debug, Deserialize)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    /// Milliseconds since the Unix epoch.
    pub start_time: i64,
}

pub struct ExerciseExportSource {
    config: ExerciseExportConfig,
}

impl ExerciseExportSource {
    pub fn new(config: ExerciseExportConfig) -> Self {
        Self { config }
    }

    /// Rows matching the configured activity type, with mapped columns extracted.
    pub fn read_records(&self, report: &mut BatchReport) -> Result<Vec<ExerciseRecord>, TrackError> {
        let path = &self.config.csv_path;
        let text = fs::read_to_string(path).map_err(|e| TrackError::io(path, e))?;
        let body = skip_lines(&text, self.config.header_lines);

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(body.as_bytes());
        let headers = reader
            .headers()
            .map_err(|e| TrackError::malformed(path.display().to_string(), e.to_string()))?
            .clone();
        let index: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim(), i))
            .collect();

        let schema = &self.config.schema;
        let missing_column = |column: &str| {
            TrackError::malformed(
                path.display().to_string(),
                format!("missing column '{}'", column),
            )
        };
        let type_idx = *index
            .get(schema.activity_type_column.as_str())
            .ok_or_else(|| missing_column(&schema.activity_type_column))?;
        let mut columns = Vec::with_capacity(schema.columns.len());
        for mapping in &schema.columns {
            let idx = *index
                .get(mapping.column.as_str())
                .ok_or_else(|| missing_column(&mapping.column))?;
            columns.push((idx, mapping.field));
        }

        let mut records = Vec::new();
        let mut total_rows = 0usize;
        for (i, row) in reader.records().enumerate() {
            total_rows += 1;
            let row_no = i + 1;
            let label = format!("{} row {}", path.display(), row_no);
            let parsed = row
                .map_err(|e| TrackError::malformed(label.clone(), e.to_string()))
                .and_then(|row| {
                    if !activity_matches(row.get(type_idx), self.config.activity_type)
                        .map_err(|reason| TrackError::malformed(label.clone(), reason))?
                    {
                        return Ok(None);
                    }
                    let mut record = ExerciseRecord {
                        row: row_no,
                        ..ExerciseRecord::default()
                    };
                    for (idx, field) in &columns {
                        record
                            .assign(*field, row.get(*idx).unwrap_or(""))
                            .map_err(|reason| TrackError::malformed(label.clone(), reason))?;
                    }
                    Ok(Some(record))
                });
            if let Some(Some(record)) = report.settle(&label, parsed)? {
                records.push(record);
            }
        }
        info!(
            "{}: {} of {} rows match activity type {}",
            path.display(),
            records.len(),
            total_rows,
            self.config.activity_type
        );
        Ok(records)
    }

    /// `<json_dir>/<first char of name>/<name>`.
    pub fn location_path(&self, location_data: &str) -> Option<PathBuf> {
        let shard = location_data.chars().next()?;
        Some(
            self.config
                .json_dir
                .join(shard.to_string())
                .join(location_data),
        )
    }

    pub fn load_track(&self, record: &ExerciseRecord) -> Result<Track, TrackError> {
        let name = record
            .location_data
            .as_deref()
            .ok_or_else(|| TrackError::malformed(record.id(), "no location data reference"))?;
        let path = self
            .location_path(name)
            .ok_or_else(|| TrackError::malformed(record.id(), "empty location data reference"))?;
        let samples = read_location_file(&path)?;
        debug!("{}: {} samples from {}", record.id(), samples.len(), path.display());

        let origin = path.display().to_string();
        let mut points = Vec::with_capacity(samples.len());
        for (i, sample) in samples.into_iter().enumerate() {
            let timestamp = Utc
                .timestamp_millis_opt(sample.start_time)
                .single()
                .ok_or_else(|| {
                    TrackError::malformed(
                        format!("{} point {}", origin, i),
                        format!("start_time {} is out of range", sample.start_time),
                    )
                })?;
            points.push(TrackPoint {
                timestamp,
                latitude: sample.latitude,
                longitude: sample.longitude,
                elevation: Some(sample.altitude),
            });
        }
        Track::new(points, origin)
    }
}

impl TrackSource for ExerciseExportSource {
    fn name(&self) -> &str {
        "exercise export"
    }

    fn read_tracks(&self, report: &mut BatchReport) -> Result<Vec<Track>, TrackError> {
        let records = self.read_records(report)?;
        let mut tracks = Vec::with_capacity(records.len());
        for record in &records {
            if let Some(track) = report.settle(&record.id(), self.load_track(record))? {
                tracks.push(track);
            }
        }
        Ok(tracks)
    }
}

fn read_location_file(path: &Path) -> Result<Vec<LocationSample>, TrackError> {
    let file = File::open(path).map_err(|e| TrackError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| TrackError::malformed(path.display().to_string(), e.to_string()))
}

fn skip_lines(text: &str, count: usize) -> &str {
    let mut rest = text;
    for _ in 0..count {
        match rest.find('\n') {
            Some(pos) => rest = &rest[pos + 1..],
            None => return "",
        }
    }
    rest
}

/// Blank activity cells never match; non-numeric ones are malformed.
fn activity_matches(cell: Option<&str>, code: i64) -> Result<bool, String> {
    let cell = cell.unwrap_or("").trim();
    if cell.is_empty() {
        return Ok(false);
    }
    if let Ok(value) = cell.parse::<i64>() {
        return Ok(value == code);
    }
    match cell.parse::<f64>() {
        Ok(value) => Ok(value == code as f64),
        Err(_) => Err(format!("activity type '{}' is not a number", cell)),
    }
}
