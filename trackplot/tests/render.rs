use std::fs;
use std::path::Path;

use assert_float_eq::*;
use chrono::{Duration, TimeZone, Utc};
use tempdir::TempDir;
use trackplot::gpx_io::write_track_file;
use trackplot::{
    date_to_str, BoundingBox, GeoFilter, RegionRule, RenderOptions, Renderer, Track, TrackError,
    TrackPoint,
};

fn track(coords: &[(f64, f64)], start_hour: u32) -> Track {
    let start = Utc.with_ymd_and_hms(2022, 8, 16, start_hour, 0, 0).unwrap();
    let points = coords
        .iter()
        .enumerate()
        .map(|(i, (lon, lat))| TrackPoint {
            timestamp: start + Duration::seconds(5 * i as i64),
            latitude: *lat,
            longitude: *lon,
            elevation: Some(10.0),
        })
        .collect();
    Track::new(points, "fixture").unwrap()
}

fn write_tracks(dir: &Path, tracks: &[Track]) {
    fs::create_dir_all(dir).unwrap();
    for t in tracks {
        let name = format!("{}.gpx", date_to_str(&t.start_time()));
        write_track_file(t, &dir.join(name)).unwrap();
    }
}

fn small_renderer(plots_dir: &Path) -> Renderer {
    let options = RenderOptions {
        dpi: 20,
        ..RenderOptions::default()
    };
    Renderer::new(options, plots_dir).unwrap()
}

fn istanbul_ride() -> Track {
    track(&[(28.95, 40.98), (29.01, 41.02), (29.07, 41.06)], 8)
}

fn antalya_ride() -> Track {
    track(&[(30.60, 36.85), (30.70, 36.88), (30.75, 36.90)], 9)
}

fn null_island() -> Track {
    track(&[(0.0, 0.0), (0.0, 0.0)], 10)
}

fn png_files(dir: &Path) -> Vec<String> {
    if !dir.exists() {
        return Vec::new();
    }
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".png"))
        .collect();
    names.sort();
    names
}

#[test]
fn plot_gpx_writes_a_png_named_after_the_file() {
    let temp_dir = TempDir::new("render-plot_gpx_writes_a_png").unwrap();
    let tracks_dir = temp_dir.path().join("gpx");
    write_tracks(&tracks_dir, &[istanbul_ride()]);
    let plots_dir = temp_dir.path().join("plots");

    let outcome = small_renderer(&plots_dir)
        .plot_gpx(&tracks_dir.join("20220816_080000.gpx"))
        .unwrap();

    assert_eq!(outcome.tracks, 1);
    let name = outcome.path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.ends_with("-gpx=20220816_080000.png"), "{}", name);
    assert_eq!(name.len(), "YYYYMMDD_HHMMSS".len() + "-gpx=20220816_080000.png".len());
    let bytes = fs::read(&outcome.path).unwrap();
    assert_eq!(&bytes[1..4], b"PNG");

    assert_float_absolute_eq!(outcome.bounds.min_lon, 28.94, 1e-9);
    assert_float_absolute_eq!(outcome.bounds.max_lon, 29.08, 1e-9);
    assert_float_absolute_eq!(outcome.bounds.min_lat, 40.97, 1e-9);
    assert_float_absolute_eq!(outcome.bounds.max_lat, 41.07, 1e-9);
}

#[test]
fn plot_all_skips_tracks_near_the_origin() {
    let temp_dir = TempDir::new("render-plot_all_skips_tracks_near_the_origin").unwrap();
    let tracks_dir = temp_dir.path().join("gpx");
    let tracks = [istanbul_ride(), antalya_ride(), null_island()];
    write_tracks(&tracks_dir, &tracks);
    let plots_dir = temp_dir.path().join("plots");

    let outcome = small_renderer(&plots_dir).plot_all(&tracks_dir).unwrap();
    assert_eq!(outcome.tracks, 2);
    assert!(outcome.path.to_string_lossy().ends_with("-all.png"));

    // Axis bounds cover the union of every drawn track.
    let union =
        BoundingBox::union_all(tracks[..2].iter().map(BoundingBox::of_track)).unwrap();
    assert!(outcome.bounds.contains(&union));
    assert!(outcome.bounds.min_lon > 1.0);
}

#[test]
fn plot_condition_draws_only_matching_tracks() {
    let temp_dir = TempDir::new("render-plot_condition_draws_only_matching").unwrap();
    let tracks_dir = temp_dir.path().join("gpx");
    write_tracks(&tracks_dir, &[istanbul_ride(), antalya_ride(), null_island()]);
    let plots_dir = temp_dir.path().join("plots");

    let filter = GeoFilter::from_rule(&RegionRule::antalya());
    let outcome = small_renderer(&plots_dir)
        .plot_condition(&tracks_dir, &filter)
        .unwrap();

    assert_eq!(outcome.tracks, 1);
    assert!(outcome
        .path
        .to_string_lossy()
        .ends_with("-condition=antalya.png"));
    assert!(outcome.bounds.max_lat < 37.0);
    assert_eq!(png_files(&plots_dir).len(), 1);
}

#[test]
fn no_match_writes_no_image() {
    let temp_dir = TempDir::new("render-no_match_writes_no_image").unwrap();
    let tracks_dir = temp_dir.path().join("gpx");
    write_tracks(&tracks_dir, &[istanbul_ride()]);
    let plots_dir = temp_dir.path().join("plots");
    let renderer = small_renderer(&plots_dir);

    let filter = GeoFilter::new("north", |extent| extent.min_lat > 60.0);
    let err = renderer.plot_condition(&tracks_dir, &filter).unwrap_err();
    assert!(matches!(err, TrackError::FilterNoMatch { ref filter } if filter == "north"));

    let empty_dir = temp_dir.path().join("empty");
    fs::create_dir_all(&empty_dir).unwrap();
    let err = renderer.plot_all(&empty_dir).unwrap_err();
    assert!(matches!(err, TrackError::FilterNoMatch { .. }));

    assert!(png_files(&plots_dir).is_empty());
}

#[test]
fn missing_track_file_is_reported() {
    let temp_dir = TempDir::new("render-missing_track_file_is_reported").unwrap();
    let renderer = small_renderer(&temp_dir.path().join("plots"));
    let err = renderer
        .plot_gpx(&temp_dir.path().join("absent.gpx"))
        .unwrap_err();
    assert!(matches!(err, TrackError::MissingFile { .. }));
}

#[test]
fn single_point_track_still_renders() {
    let temp_dir = TempDir::new("render-single_point_track_still_renders").unwrap();
    let tracks_dir = temp_dir.path().join("gpx");
    write_tracks(&tracks_dir, &[track(&[(29.0, 41.0)], 7)]);
    let outcome = small_renderer(&temp_dir.path().join("plots"))
        .plot_all(&tracks_dir)
        .unwrap();
    assert!(outcome.path.exists());
}

#[test]
fn short_route_stays_inside_the_drawn_view() {
    let temp_dir = TempDir::new("render-short_route_stays_inside_the_drawn_view").unwrap();
    let tracks_dir = temp_dir.path().join("gpx");
    let short = track(&[(29.001, 41.001), (29.011, 41.005), (29.021, 41.009)], 6);
    write_tracks(&tracks_dir, &[short.clone()]);

    let outcome = small_renderer(&temp_dir.path().join("plots"))
        .plot_all(&tracks_dir)
        .unwrap();

    // Reported bounds are rounded inside the route,
    assert_float_absolute_eq!(outcome.bounds.min_lon, 29.0, 1e-9);
    assert_float_absolute_eq!(outcome.bounds.max_lon, 29.02, 1e-9);
    // while the drawn axes still cover every point.
    let extent = BoundingBox::of_track(&short);
    let (x, y) = &outcome.view;
    assert!(x.start <= extent.min_lon && x.end >= extent.max_lon, "{:?}", x);
    assert!(y.start <= extent.min_lat && y.end >= extent.max_lat, "{:?}", y);
    assert_float_absolute_eq!(x.end - x.start, y.end - y.start, 1e-9);
}
