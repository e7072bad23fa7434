//! Fitness-track normalization and route plotting.
//!
//! Vendor exports are read into [`Track`] values, normalized into GPX files
//! named after their start time, and rendered back as route maps.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod batch;
pub mod config;
pub mod convert;
pub mod exercise;
pub mod font_safe;
pub mod geo;
pub mod gpx_io;
pub mod normalize;
pub mod render;
pub mod sources;
pub mod track;

pub use batch::{BatchReport, FailurePolicy, RecordFailure};
pub use config::{Config, ExerciseExportConfig, NormalizeConfig, RenderOptions, SourcesConfig};
pub use convert::{run_convert, ConvertSummary, NameCollision};
pub use exercise::{ColumnMapping, ColumnSchema, ExerciseExportSource, ExerciseField, ExerciseRecord};
pub use geo::{BoundingBox, GeoFilter, RegionRule};
pub use normalize::{normalize, write_normalized, NormalizeOptions, NormalizedTrack};
pub use render::{RenderOutcome, Renderer};
pub use sources::{GpxDirectorySource, TrackSource};
pub use track::{date_to_str, Track, TrackMetadata, TrackPoint};

#[derive(Error, Debug)]
pub enum TrackError {
    #[error("missing file: {}", path.display())]
    MissingFile { path: PathBuf },
    #[error("malformed data in {record}: {reason}")]
    MalformedData { record: String, reason: String },
    #[error("track from {origin} has no points")]
    EmptyTrack { origin: String },
    #[error("no tracks matched filter '{filter}'")]
    FilterNoMatch { filter: String },
    #[error("failed to parse GPX file {}: {reason}", path.display())]
    GpxParse { path: PathBuf, reason: String },
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("plotting error: {0}")]
    Plot(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TrackError {
    /// Wrap an I/O failure, reporting absent paths as [`TrackError::MissingFile`].
    pub fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            TrackError::MissingFile {
                path: path.to_path_buf(),
            }
        } else {
            TrackError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    pub fn malformed(record: impl Into<String>, reason: impl Into<String>) -> Self {
        TrackError::MalformedData {
            record: record.into(),
            reason: reason.into(),
        }
    }

    /// Stable name of the error kind, shown to users next to the message.
    pub fn kind(&self) -> &'static str {
        match self {
            TrackError::MissingFile { .. } => "MissingFileError",
            TrackError::MalformedData { .. } | TrackError::GpxParse { .. } => "MalformedDataError",
            TrackError::EmptyTrack { .. } => "EmptyTrackError",
            TrackError::FilterNoMatch { .. } => "FilterNoMatchError",
            TrackError::Io { .. } => "IoError",
            TrackError::Plot(_) => "PlotError",
            TrackError::InvalidConfig(_) => "ConfigError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_missing_file() {
        let err = TrackError::io(
            Path::new("gpx/none.gpx"),
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, TrackError::MissingFile { .. }));
        assert_eq!(err.kind(), "MissingFileError");
        assert_eq!(err.to_string(), "missing file: gpx/none.gpx");
    }

    #[test]
    fn other_io_errors_keep_their_source() {
        let err = TrackError::io(
            Path::new("plots"),
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, TrackError::Io { .. }));
        assert_eq!(err.kind(), "IoError");
    }
}
