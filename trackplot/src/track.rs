use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

use crate::TrackError;

#[derive(Clone, Debug, PartialEq)]
pub struct TrackPoint {
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>,
}

/// Descriptive fields carried over from the vendor file. Normalization clears all of them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackMetadata {
    pub creator: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub keywords: Option<String>,
    pub links: Vec<String>,
    pub copyright_author: Option<String>,
    pub copyright_license: Option<String>,
    pub copyright_year: Option<i32>,
    pub track_name: Option<String>,
    pub track_comment: Option<String>,
    pub track_description: Option<String>,
    pub track_source: Option<String>,
    pub track_type: Option<String>,
    pub track_links: Vec<String>,
}

impl TrackMetadata {
    pub fn is_empty(&self) -> bool {
        *self == TrackMetadata::default()
    }
}

/// One recorded activity: a non-empty, chronologically ordered point sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    points: Vec<TrackPoint>,
    metadata: TrackMetadata,
    origin: String,
}

impl Track {
    /// Build a track, rejecting an empty point list. `origin` names the file or
    /// record the points came from and ends up in the error.
    pub fn new(points: Vec<TrackPoint>, origin: impl Into<String>) -> Result<Self, TrackError> {
        let origin = origin.into();
        if points.is_empty() {
            return Err(TrackError::EmptyTrack { origin });
        }
        Ok(Self {
            points,
            metadata: TrackMetadata::default(),
            origin,
        })
    }

    pub fn with_metadata(mut self, metadata: TrackMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// File or record the points were read from.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    pub fn metadata(&self) -> &TrackMetadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.points[0].timestamp
    }

    /// Copy of the track with every timestamp moved by `offset` and no metadata.
    pub fn shifted_and_stripped(&self, offset: Duration) -> Track {
        let points = self
            .points
            .iter()
            .map(|p| TrackPoint {
                timestamp: p.timestamp + offset,
                ..p.clone()
            })
            .collect();
        Track {
            points,
            metadata: TrackMetadata::default(),
            origin: self.origin.clone(),
        }
    }
}

/// `YYYYMMDD_HHMMSS` with zero-padded components.
pub fn date_to_str<T: Datelike + Timelike>(date: &T) -> String {
    format!(
        "{:04}{:02}{:02}_{:02}{:02}{:02}",
        date.year(),
        date.month(),
        date.day(),
        date.hour(),
        date.minute(),
        date.second()
    )
}
