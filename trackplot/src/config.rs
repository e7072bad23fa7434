//! Run configuration. Every path and constant the pipeline uses lives here and
//! is passed explicitly into readers and renderers.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::batch::FailurePolicy;
use crate::exercise::{ColumnSchema, ExerciseField};
use crate::geo::RegionRule;
use crate::TrackError;

/// Samsung Health activity code for cycling.
pub const CYCLING_ACTIVITY_TYPE: i64 = 11007;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub sources: SourcesConfig,
    pub tracks_dir: PathBuf,
    pub plots_dir: PathBuf,
    pub normalize: NormalizeConfig,
    pub render: RenderOptions,
    pub on_error: FailurePolicy,
    pub regions: Vec<RegionRule>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: SourcesConfig::default(),
            tracks_dir: PathBuf::from("gpx"),
            plots_dir: PathBuf::from("plots"),
            normalize: NormalizeConfig::default(),
            render: RenderOptions::default(),
            on_error: FailurePolicy::Abort,
            regions: RegionRule::builtin(),
        }
    }
}

impl Config {
    /// Load a JSON configuration file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, TrackError> {
        let text = fs::read_to_string(path).map_err(|e| TrackError::io(path, e))?;
        let config: Config = serde_json::from_str(&text)
            .map_err(|e| TrackError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TrackError> {
        self.render.validate()?;
        if !self.normalize.timezone_offset_hours.is_finite()
            || self.normalize.timezone_offset_hours.abs() > 24.0
        {
            return Err(TrackError::InvalidConfig(format!(
                "timezone offset must be within ±24 hours, got {}",
                self.normalize.timezone_offset_hours
            )));
        }
        if let Some(exercise) = self.sources.exercise.as_ref() {
            exercise.schema.validate()?;
        }
        for region in &self.regions {
            if region.name.trim().is_empty() {
                return Err(TrackError::InvalidConfig("region rule without a name".into()));
            }
        }
        Ok(())
    }

    pub fn region(&self, name: &str) -> Option<&RegionRule> {
        self.regions.iter().find(|r| r.name == name)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourcesConfig {
    /// Directory of vendor GPX files (e.g. an Adidas Running `GPS-data` folder).
    pub gpx_dir: Option<PathBuf>,
    pub exercise: Option<ExerciseExportConfig>,
}

/// Location of a Samsung Health style exercise export.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExerciseExportConfig {
    pub csv_path: PathBuf,
    /// Root of the JSON tree, sharded by the first character of each file name.
    pub json_dir: PathBuf,
    pub activity_type: i64,
    /// Lines preceding the CSV header row.
    pub header_lines: usize,
    pub schema: ColumnSchema,
}

impl Default for ExerciseExportConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::new(),
            json_dir: PathBuf::new(),
            activity_type: CYCLING_ACTIVITY_TYPE,
            header_lines: 1,
            schema: ColumnSchema::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NormalizeConfig {
    pub timezone_offset_hours: f64,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            timezone_offset_hours: 3.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderOptions {
    pub dpi: u32,
    pub figure_width_in: f64,
    pub figure_height_in: f64,
    /// Fraction of the data span added on each side of the bounding box.
    pub margin_fraction: f64,
    /// `plot_all` drops tracks whose minimum longitude is not above this value.
    pub min_longitude: f64,
    pub line_width_pt: f64,
    pub line_color: String,
    /// TrueType/OpenType font used for labels; a built-in bitmap font is used otherwise.
    pub font_file: Option<PathBuf>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            dpi: 600,
            figure_width_in: 6.4,
            figure_height_in: 4.8,
            margin_fraction: 0.1,
            min_longitude: 1.0,
            line_width_pt: 1.0,
            line_color: "#0000ff".to_string(),
            font_file: None,
        }
    }
}

impl RenderOptions {
    pub fn validate(&self) -> Result<(), TrackError> {
        if self.dpi == 0 {
            return Err(TrackError::InvalidConfig("dpi must be positive".into()));
        }
        if !(self.figure_width_in > 0.0 && self.figure_height_in > 0.0) {
            return Err(TrackError::InvalidConfig("figure size must be positive".into()));
        }
        if !(self.margin_fraction >= 0.0 && self.margin_fraction.is_finite()) {
            return Err(TrackError::InvalidConfig(format!(
                "margin fraction must be >= 0, got {}",
                self.margin_fraction
            )));
        }
        if !(self.line_width_pt > 0.0) {
            return Err(TrackError::InvalidConfig("line width must be positive".into()));
        }
        self.line_rgb()?;
        Ok(())
    }

    /// Raster size in pixels.
    pub fn pixel_size(&self) -> (u32, u32) {
        let dpi = self.dpi as f64;
        (
            (self.figure_width_in * dpi).round().max(1.0) as u32,
            (self.figure_height_in * dpi).round().max(1.0) as u32,
        )
    }

    pub fn points_to_pixels(&self, points: f64) -> f64 {
        points * self.dpi as f64 / 72.0
    }

    pub fn line_rgb(&self) -> Result<(u8, u8, u8), TrackError> {
        parse_hex_color(&self.line_color)
    }
}

fn parse_hex_color(text: &str) -> Result<(u8, u8, u8), TrackError> {
    let invalid = || TrackError::InvalidConfig(format!("colour must look like #rrggbb, got '{}'", text));
    let hex = text.strip_prefix('#').ok_or_else(invalid)?;
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(invalid());
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
    Ok((channel(0)?, channel(2)?, channel(4)?))
}

impl ColumnSchema {
    pub fn validate(&self) -> Result<(), TrackError> {
        if self.activity_type_column.trim().is_empty() {
            return Err(TrackError::InvalidConfig(
                "column schema needs an activity type column".into(),
            ));
        }
        if self.column_for(ExerciseField::LocationData).is_none() {
            return Err(TrackError::InvalidConfig(
                "column schema must map the location_data field".into(),
            ));
        }
        Ok(())
    }
}
