use std::fs;
use std::path::{Path, PathBuf};

use chrono::Duration;
use tracing::debug;

use crate::gpx_io::write_track_file;
use crate::track::{date_to_str, Track};
use crate::TrackError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Added to every timestamp to turn device time into local wall-clock time.
    pub offset: Duration,
}

impl NormalizeOptions {
    pub fn from_hours(hours: f64) -> Self {
        Self {
            offset: Duration::milliseconds((hours * 3_600_000.0).round() as i64),
        }
    }
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self::from_hours(3.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedTrack {
    track: Track,
    file_stem: String,
}

impl NormalizedTrack {
    pub fn track(&self) -> &Track {
        &self.track
    }

    /// `YYYYMMDD_HHMMSS` of the shifted start time.
    pub fn file_stem(&self) -> &str {
        &self.file_stem
    }

    pub fn file_name(&self) -> String {
        format!("{}.gpx", self.file_stem)
    }
}

/// Shift timestamps, drop descriptive metadata and name the result after its start.
pub fn normalize(track: &Track, options: &NormalizeOptions) -> NormalizedTrack {
    let track = track.shifted_and_stripped(options.offset);
    let file_stem = date_to_str(&track.start_time());
    NormalizedTrack { track, file_stem }
}

/// Write `<dir>/<stem>.gpx`, creating `dir` if needed. Existing files are overwritten.
pub fn write_normalized(normalized: &NormalizedTrack, dir: &Path) -> Result<PathBuf, TrackError> {
    fs::create_dir_all(dir).map_err(|e| TrackError::io(dir, e))?;
    let path = dir.join(normalized.file_name());
    write_track_file(&normalized.track, &path)?;
    debug!("Wrote {} ({} points)", path.display(), normalized.track.len());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{TrackMetadata, TrackPoint};
    use chrono::{TimeZone, Utc};

    fn ride() -> Track {
        let points = vec![
            TrackPoint {
                timestamp: Utc.with_ymd_and_hms(2022, 8, 16, 15, 54, 20).unwrap(),
                latitude: 41.0,
                longitude: 29.0,
                elevation: Some(10.0),
            },
            TrackPoint {
                timestamp: Utc.with_ymd_and_hms(2022, 8, 16, 15, 54, 30).unwrap(),
                latitude: 41.001,
                longitude: 29.002,
                elevation: Some(11.0),
            },
        ];
        let metadata = TrackMetadata {
            creator: Some("Runtastic".into()),
            copyright_year: Some(2022),
            track_name: Some("ride".into()),
            ..TrackMetadata::default()
        };
        Track::new(points, "ride").unwrap().with_metadata(metadata)
    }

    #[test]
    fn applies_offset_and_names_by_shifted_start() {
        let normalized = normalize(&ride(), &NormalizeOptions::default());
        assert_eq!(normalized.file_stem(), "20220816_185420");
        assert_eq!(normalized.file_name(), "20220816_185420.gpx");
        assert!(normalized.track().metadata().is_empty());
        assert_eq!(normalized.track().len(), 2);
    }

    #[test]
    fn fractional_offsets() {
        let options = NormalizeOptions::from_hours(5.5);
        assert_eq!(options.offset, Duration::minutes(330));
        let normalized = normalize(&ride(), &options);
        assert_eq!(normalized.file_stem(), "20220816_212420");
    }

    #[test]
    fn zero_offset_is_a_fixed_point() {
        let options = NormalizeOptions::from_hours(0.0);
        let once = normalize(&ride(), &options);
        let twice = normalize(once.track(), &options);
        assert_eq!(once, twice);
    }

    #[test]
    fn equal_start_times_share_a_name() {
        let a = normalize(&ride(), &NormalizeOptions::default());
        let mut points = ride().points().to_vec();
        points[1].latitude = 40.0;
        let b = normalize(&Track::new(points, "other").unwrap(), &NormalizeOptions::default());
        assert_eq!(a.file_name(), b.file_name());
    }
}
