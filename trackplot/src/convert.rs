use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::batch::BatchReport;
use crate::config::Config;
use crate::exercise::ExerciseExportSource;
use crate::normalize::{normalize, write_normalized, NormalizeOptions};
use crate::sources::{GpxDirectorySource, TrackSource};
use crate::TrackError;

#[derive(Debug)]
pub struct ConvertSummary {
    pub written: Vec<PathBuf>,
    /// Tracks written per source, in run order.
    pub per_source: Vec<(String, usize)>,
    pub report: BatchReport,
    /// Output names written more than once in this run; the later track wins.
    pub collisions: Vec<NameCollision>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameCollision {
    pub file_name: String,
    /// Origin of the track that was overwritten.
    pub previous: String,
    /// Origin of the track that replaced it.
    pub current: String,
}

/// Build the readers the configuration enables, in a fixed order.
pub fn configured_sources(config: &Config) -> Vec<Box<dyn TrackSource>> {
    let mut sources: Vec<Box<dyn TrackSource>> = Vec::new();
    if let Some(dir) = config.sources.gpx_dir.as_ref() {
        sources.push(Box::new(GpxDirectorySource::new(dir.clone())));
    }
    if let Some(exercise) = config.sources.exercise.as_ref() {
        sources.push(Box::new(ExerciseExportSource::new(exercise.clone())));
    }
    sources
}

/// Read every configured source, normalize each track and write it to `tracks_dir`.
pub fn run_convert(config: &Config) -> Result<ConvertSummary, TrackError> {
    config.validate()?;
    let sources = configured_sources(config);
    if sources.is_empty() {
        return Err(TrackError::InvalidConfig(
            "no sources configured (set a GPX directory or an exercise export)".into(),
        ));
    }

    let options = NormalizeOptions::from_hours(config.normalize.timezone_offset_hours);
    let mut report = BatchReport::new(config.on_error);
    let mut written = Vec::new();
    let mut per_source = Vec::new();
    let mut collisions = Vec::new();
    let mut seen: HashMap<String, String> = HashMap::new();

    for source in &sources {
        let tracks = source.read_tracks(&mut report)?;
        let mut count = 0usize;
        for track in &tracks {
            let normalized = normalize(track, &options);
            if let Some(previous) =
                seen.insert(normalized.file_name(), track.origin().to_string())
            {
                warn!(
                    "{}: {} overwrites {} (same start time)",
                    normalized.file_name(),
                    track.origin(),
                    previous
                );
                collisions.push(NameCollision {
                    file_name: normalized.file_name(),
                    previous,
                    current: track.origin().to_string(),
                });
            }
            written.push(write_normalized(&normalized, &config.tracks_dir)?);
            count += 1;
        }
        info!("{}: wrote {} tracks", source.name(), count);
        per_source.push((source.name().to_string(), count));
    }

    Ok(ConvertSummary {
        written,
        per_source,
        report,
        collisions,
    })
}
