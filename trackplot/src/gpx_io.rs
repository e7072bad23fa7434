//! Reading and writing GPX track files.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use geo_types::Point;
use gpx::{Gpx, GpxCopyright, GpxVersion, Link, Metadata, Person, Track as GpxTrack, TrackSegment, Waypoint};
use time::OffsetDateTime;

use crate::track::{Track, TrackMetadata, TrackPoint};
use crate::TrackError;

/// Sorted list of `*.gpx` files (extension matched case-insensitively) in `dir`.
pub fn list_gpx_files(dir: &Path) -> Result<Vec<PathBuf>, TrackError> {
    let entries = fs::read_dir(dir).map_err(|e| TrackError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| TrackError::io(dir, e))?.path();
        let is_gpx = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("gpx"))
            .unwrap_or(false);
        if is_gpx && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub fn read_track_file(path: &Path) -> Result<Track, TrackError> {
    let file = File::open(path).map_err(|e| TrackError::io(path, e))?;
    let gpx = gpx::read(BufReader::new(file)).map_err(|e| TrackError::GpxParse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    track_from_gpx(gpx, &path.display().to_string())
}

/// Flatten every track and segment of `gpx` into one point sequence.
pub fn track_from_gpx(gpx: Gpx, origin: &str) -> Result<Track, TrackError> {
    let mut metadata = TrackMetadata {
        creator: gpx.creator.clone(),
        ..TrackMetadata::default()
    };
    if let Some(meta) = gpx.metadata.as_ref() {
        metadata.name = meta.name.clone();
        metadata.description = meta.description.clone();
        metadata.author = meta.author.as_ref().and_then(|p| p.name.clone());
        metadata.keywords = meta.keywords.clone();
        metadata.links = meta.links.iter().map(|l| l.href.clone()).collect();
        if let Some(copyright) = meta.copyright.as_ref() {
            metadata.copyright_author = copyright.author.clone();
            metadata.copyright_license = copyright.license.clone();
            metadata.copyright_year = copyright.year;
        }
    }
    if let Some(first) = gpx.tracks.first() {
        metadata.track_name = first.name.clone();
        metadata.track_comment = first.comment.clone();
        metadata.track_description = first.description.clone();
        metadata.track_source = first.source.clone();
        metadata.track_type = first.type_.clone();
        metadata.track_links = first.links.iter().map(|l| l.href.clone()).collect();
    }

    let mut points = Vec::new();
    for track in gpx.tracks {
        for segment in track.segments {
            for waypoint in segment.points {
                let index = points.len();
                let geo = waypoint.point();
                let time = waypoint.time.ok_or_else(|| {
                    TrackError::malformed(format!("{} point {}", origin, index), "missing <time>")
                })?;
                let timestamp = gpx_time_to_utc(time)
                    .map_err(|reason| TrackError::malformed(format!("{} point {}", origin, index), reason))?;
                points.push(TrackPoint {
                    timestamp,
                    latitude: geo.y(),
                    longitude: geo.x(),
                    elevation: waypoint.elevation,
                });
            }
        }
    }

    Ok(Track::new(points, origin)?.with_metadata(metadata))
}

/// GPX 1.1 document with a single `trk`/`trkseg`. Metadata time is the track start.
pub fn track_to_gpx(track: &Track) -> Result<Gpx, TrackError> {
    let source = track.metadata();

    let mut metadata = Metadata::default();
    metadata.name = source.name.clone();
    metadata.description = source.description.clone();
    metadata.keywords = source.keywords.clone();
    metadata.links = source.links.iter().map(|href| link(href)).collect();
    metadata.time = Some(utc_to_gpx_time(track.start_time())?);
    if let Some(name) = source.author.as_ref() {
        let mut author = Person::default();
        author.name = Some(name.clone());
        metadata.author = Some(author);
    }
    if source.copyright_author.is_some()
        || source.copyright_license.is_some()
        || source.copyright_year.is_some()
    {
        let mut copyright = GpxCopyright::default();
        copyright.author = source.copyright_author.clone();
        copyright.license = source.copyright_license.clone();
        copyright.year = source.copyright_year;
        metadata.copyright = Some(copyright);
    }

    let mut segment = TrackSegment::new();
    for point in track.points() {
        let mut waypoint = Waypoint::new(Point::new(point.longitude, point.latitude));
        waypoint.elevation = point.elevation;
        waypoint.time = Some(utc_to_gpx_time(point.timestamp)?);
        segment.points.push(waypoint);
    }

    let mut gpx_track = GpxTrack::new();
    gpx_track.name = source.track_name.clone();
    gpx_track.comment = source.track_comment.clone();
    gpx_track.description = source.track_description.clone();
    gpx_track.source = source.track_source.clone();
    gpx_track.type_ = source.track_type.clone();
    gpx_track.links = source.track_links.iter().map(|href| link(href)).collect();
    gpx_track.segments.push(segment);

    let mut gpx = Gpx::default();
    gpx.version = GpxVersion::Gpx11;
    gpx.creator = source.creator.clone();
    gpx.metadata = Some(metadata);
    gpx.tracks.push(gpx_track);
    Ok(gpx)
}

pub fn write_track_file(track: &Track, path: &Path) -> Result<(), TrackError> {
    let gpx = track_to_gpx(track)?;
    let file = File::create(path).map_err(|e| TrackError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    gpx::write(&gpx, &mut writer).map_err(|e| TrackError::GpxParse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    writer.flush().map_err(|e| TrackError::io(path, e))
}

fn link(href: &str) -> Link {
    let mut link = Link::default();
    link.href = href.to_string();
    link
}

fn gpx_time_to_utc(time: gpx::Time) -> Result<DateTime<Utc>, String> {
    let iso = time.format().map_err(|e| e.to_string())?;
    DateTime::parse_from_rfc3339(&iso)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| e.to_string())
}

fn utc_to_gpx_time(timestamp: DateTime<Utc>) -> Result<gpx::Time, TrackError> {
    let nanos = timestamp.timestamp_nanos_opt().ok_or_else(|| {
        TrackError::malformed(timestamp.to_rfc3339(), "timestamp outside the representable range")
    })?;
    let odt = OffsetDateTime::from_unix_timestamp_nanos(nanos as i128)
        .map_err(|e| TrackError::malformed(timestamp.to_rfc3339(), e.to_string()))?;
    Ok(odt.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const RUNTASTIC_GPX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="Runtastic: Life is short - live long, http://www.runtastic.com" xmlns="http://www.topografix.com/GPX/1/1">
  <metadata>
    <name>Evening ride</name>
    <desc>Along the coast</desc>
    <copyright author="www.runtastic.com">
      <year>2022</year>
      <license>http://www.runtastic.com</license>
    </copyright>
    <link href="http://www.runtastic.com"><text>runtastic</text></link>
    <time>2022-05-01T15:54:20Z</time>
  </metadata>
  <trk>
    <name>ride</name>
    <link href="http://www.runtastic.com/sport-sessions/1"><text>session</text></link>
    <trkseg>
      <trkpt lat="41.0125" lon="28.9781"><ele>12.0</ele><time>2022-05-01T15:54:20Z</time></trkpt>
      <trkpt lat="41.0131" lon="28.9790"><ele>13.5</ele><time>2022-05-01T15:54:25Z</time></trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="41.0140" lon="28.9802"><time>2022-05-01T15:54:30Z</time></trkpt>
    </trkseg>
  </trk>
</gpx>"#;

    fn parse(text: &str) -> Result<Track, TrackError> {
        let gpx = gpx::read(Cursor::new(text.as_bytes())).unwrap();
        track_from_gpx(gpx, "memory.gpx")
    }

    #[test]
    fn reads_points_and_vendor_metadata() {
        let track = parse(RUNTASTIC_GPX).unwrap();
        assert_eq!(track.len(), 3);
        let first = &track.points()[0];
        assert_eq!(first.latitude, 41.0125);
        assert_eq!(first.longitude, 28.9781);
        assert_eq!(first.elevation, Some(12.0));
        assert_eq!(track.points()[2].elevation, None);
        assert_eq!(track.start_time().to_rfc3339(), "2022-05-01T15:54:20+00:00");

        let meta = track.metadata();
        assert_eq!(meta.name.as_deref(), Some("Evening ride"));
        assert_eq!(meta.copyright_year, Some(2022));
        assert_eq!(meta.track_name.as_deref(), Some("ride"));
        assert_eq!(meta.track_links.len(), 1);
        assert!(meta.creator.as_deref().unwrap_or("").starts_with("Runtastic"));
    }

    #[test]
    fn point_without_time_is_malformed() {
        let text = RUNTASTIC_GPX.replace("<time>2022-05-01T15:54:30Z</time>", "");
        let err = parse(&text).unwrap_err();
        assert!(matches!(err, TrackError::MalformedData { ref record, .. } if record == "memory.gpx point 2"));
    }

    #[test]
    fn gpx_without_points_is_empty_track() {
        let text = r#"<?xml version="1.0"?><gpx version="1.1" creator="x"><trk><trkseg></trkseg></trk></gpx>"#;
        assert!(matches!(parse(text).unwrap_err(), TrackError::EmptyTrack { .. }));
    }

    #[test]
    fn write_then_read_keeps_points() {
        let track = parse(RUNTASTIC_GPX).unwrap();
        let gpx = track_to_gpx(&track).unwrap();
        assert_eq!(gpx.tracks.len(), 1);
        assert_eq!(gpx.tracks[0].segments.len(), 1);

        let mut bytes = Vec::new();
        gpx::write(&gpx, &mut bytes).unwrap();
        let reread = track_from_gpx(gpx::read(Cursor::new(bytes)).unwrap(), "again").unwrap();
        assert_eq!(reread.points(), track.points());
    }
}
