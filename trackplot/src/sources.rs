use std::path::PathBuf;

use tracing::{debug, info};

use crate::batch::BatchReport;
use crate::gpx_io::{list_gpx_files, read_track_file};
use crate::track::Track;
use crate::TrackError;

/// A vendor export that yields tracks. Per-record failures go through `report`,
/// which decides whether they abort the read or are skipped.
pub trait TrackSource {
    fn name(&self) -> &str;

    fn read_tracks(&self, report: &mut BatchReport) -> Result<Vec<Track>, TrackError>;
}

/// A directory of GPX files that already hold complete point sequences.
pub struct GpxDirectorySource {
    dir: PathBuf,
}

impl GpxDirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl TrackSource for GpxDirectorySource {
    fn name(&self) -> &str {
        "gpx directory"
    }

    fn read_tracks(&self, report: &mut BatchReport) -> Result<Vec<Track>, TrackError> {
        let files = list_gpx_files(&self.dir)?;
        info!("{}: {} GPX files", self.dir.display(), files.len());
        let mut tracks = Vec::with_capacity(files.len());
        for path in files {
            let label = path.display().to_string();
            if let Some(track) = report.settle(&label, read_track_file(&path))? {
                debug!("{}: {} points", label, track.len());
                tracks.push(track);
            }
        }
        Ok(tracks)
    }
}
