//! Route maps: one polyline per track, longitude on X and latitude on Y.

use std::fs;
use std::ops::Range;
use std::panic;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use tracing::{debug, info};

use crate::config::{Config, RenderOptions};
use crate::font_safe::FontSafeBackend;
use crate::geo::{BoundingBox, GeoFilter};
use crate::gpx_io::{list_gpx_files, read_track_file};
use crate::track::{date_to_str, Track};
use crate::TrackError;

const TITLE_FONT_PT: f64 = 12.0;
const LABEL_FONT_PT: f64 = 10.0;
const MARGIN_PT: f64 = 8.0;
const TICK_COUNT: usize = 6;

#[derive(Clone, Debug, PartialEq)]
pub struct RenderOutcome {
    pub path: PathBuf,
    /// Number of polylines drawn.
    pub tracks: usize,
    /// Data extent grown by the margin and rounded to two decimals.
    pub bounds: BoundingBox,
    /// Square axis ranges actually drawn; always covers every track point.
    pub view: (Range<f64>, Range<f64>),
}

pub struct Renderer {
    options: RenderOptions,
    plots_dir: PathBuf,
}

impl Renderer {
    pub fn new(options: RenderOptions, plots_dir: impl Into<PathBuf>) -> Result<Self, TrackError> {
        options.validate()?;
        if let Some(font) = options.font_file.as_ref() {
            register_label_font(font)?;
        }
        Ok(Self {
            options,
            plots_dir: plots_dir.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, TrackError> {
        Self::new(config.render.clone(), config.plots_dir.clone())
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Render a single track file with bounds taken from its own extent.
    pub fn plot_gpx(&self, file: &Path) -> Result<RenderOutcome, TrackError> {
        let track = read_track_file(file)?;
        let stem = file
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("track")
            .to_string();
        self.render(
            "Bicycle Route",
            &stem,
            &format!("gpx={}", stem),
            &[track],
            render_stamp(),
        )
    }

    /// Render every track in `dir` whose minimum longitude clears the configured guard.
    pub fn plot_all(&self, dir: &Path) -> Result<RenderOutcome, TrackError> {
        let guard = GeoFilter::min_longitude_above(self.options.min_longitude);
        let tracks = select_tracks(dir, &guard)?;
        self.render("Bicycle Routes", guard.name(), "all", &tracks, render_stamp())
    }

    /// Render the tracks in `dir` accepted by `filter`.
    pub fn plot_condition(&self, dir: &Path, filter: &GeoFilter) -> Result<RenderOutcome, TrackError> {
        let tracks = select_tracks(dir, filter)?;
        self.render(
            &format!("Bicycle Routes - {}", filter.name()),
            filter.name(),
            &format!("condition={}", filter.name()),
            &tracks,
            render_stamp(),
        )
    }

    fn render(
        &self,
        title: &str,
        selection: &str,
        discriminator: &str,
        tracks: &[Track],
        stamp: NaiveDateTime,
    ) -> Result<RenderOutcome, TrackError> {
        let extent = BoundingBox::union_all(tracks.iter().map(BoundingBox::of_track)).ok_or_else(
            || TrackError::FilterNoMatch {
                filter: selection.to_string(),
            },
        )?;
        let bounds = extent.with_margin(self.options.margin_fraction);
        // Rounding can pull the margin box inside short routes.
        let view = bounds.union(&extent).square_view();

        fs::create_dir_all(&self.plots_dir).map_err(|e| TrackError::io(&self.plots_dir, e))?;
        let path = self
            .plots_dir
            .join(format!("{}-{}.png", date_to_str(&stamp), discriminator));

        let size = self.options.pixel_size();
        let draw = || -> Result<(), TrackError> {
            let backend = BitMapBackend::new(&path, size);
            let root = FontSafeBackend::new(backend).into_drawing_area();
            draw_routes(root, title, tracks, view.clone(), &self.options)
        };
        panic::catch_unwind(panic::AssertUnwindSafe(draw))
            .map_err(|_| TrackError::Plot("plotting backend panicked".into()))??;

        info!(
            "Wrote plot: {} ({} tracks, lon {:.2}..{:.2}, lat {:.2}..{:.2})",
            path.display(),
            tracks.len(),
            bounds.min_lon,
            bounds.max_lon,
            bounds.min_lat,
            bounds.max_lat
        );
        Ok(RenderOutcome {
            path,
            tracks: tracks.len(),
            bounds,
            view,
        })
    }
}

fn render_stamp() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Load every normalized track in `dir` and keep those accepted by `filter`.
pub fn select_tracks(dir: &Path, filter: &GeoFilter) -> Result<Vec<Track>, TrackError> {
    let mut selected = Vec::new();
    for path in list_gpx_files(dir)? {
        let track = read_track_file(&path)?;
        if filter.matches(&track) {
            selected.push(track);
        } else {
            debug!("{} rejected by filter '{}'", path.display(), filter.name());
        }
    }
    if selected.is_empty() {
        return Err(TrackError::FilterNoMatch {
            filter: filter.name().to_string(),
        });
    }
    Ok(selected)
}

fn plot_error<E: std::fmt::Display>(err: E) -> TrackError {
    TrackError::Plot(err.to_string())
}

fn draw_routes<DB>(
    root: DrawingArea<DB, plotters::coord::Shift>,
    title: &str,
    tracks: &[Track],
    (x_range, y_range): (Range<f64>, Range<f64>),
    opts: &RenderOptions,
) -> Result<(), TrackError>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE).map_err(plot_error)?;

    // Square canvas so that equal spans on both axes get equal pixels.
    let (w, h) = root.dim_in_pixel();
    let side = w.min(h);
    let area = root.shrink(((w - side) / 2, (h - side) / 2), (side, side));

    let title_px = opts.points_to_pixels(TITLE_FONT_PT);
    let label_px = opts.points_to_pixels(LABEL_FONT_PT);
    let margin_px = opts.points_to_pixels(MARGIN_PT).round() as u32;
    let label_area_px = (label_px * 4.5).round() as u32;

    let mut chart = ChartBuilder::on(&area)
        .caption(title, FontDesc::new(FontFamily::SansSerif, title_px, FontStyle::Normal))
        .margin(margin_px)
        .margin_right(margin_px + title_px.round() as u32)
        .set_label_area_size(LabelAreaPosition::Left, label_area_px)
        .set_label_area_size(LabelAreaPosition::Bottom, label_area_px)
        .build_cartesian_2d(x_range, y_range)
        .map_err(plot_error)?;

    let label_font = FontDesc::new(FontFamily::SansSerif, label_px, FontStyle::Normal);
    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(TICK_COUNT)
        .y_labels(TICK_COUNT)
        .x_desc("Longitude")
        .y_desc("Latitude")
        .x_label_formatter(&|v| format!("{:.2}", v))
        .y_label_formatter(&|v| format!("{:.2}", v))
        .label_style(label_font.clone())
        .axis_desc_style(label_font)
        .draw()
        .map_err(plot_error)?;

    let (r, g, b) = opts.line_rgb()?;
    let line_style = ShapeStyle {
        color: RGBColor(r, g, b).to_rgba(),
        filled: false,
        stroke_width: opts.points_to_pixels(opts.line_width_pt).round().max(1.0) as u32,
    };
    for track in tracks {
        chart
            .draw_series(LineSeries::new(
                track.points().iter().map(|p| (p.longitude, p.latitude)),
                line_style,
            ))
            .map_err(plot_error)?;
    }

    area.present().map_err(plot_error)?;
    Ok(())
}

/// Register a font file for the sans-serif family used by every label.
fn register_label_font(path: &Path) -> Result<(), TrackError> {
    let bytes = fs::read(path).map_err(|e| TrackError::io(path, e))?;
    // Registered fonts must live for the rest of the process.
    let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
    plotters::style::register_font("sans-serif", FontStyle::Normal, bytes).map_err(|_| {
        TrackError::InvalidConfig(format!("{} is not a usable font", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renderer_rejects_invalid_options() {
        let options = RenderOptions {
            dpi: 0,
            ..RenderOptions::default()
        };
        assert!(matches!(
            Renderer::new(options, "plots"),
            Err(TrackError::InvalidConfig(_))
        ));
    }

    #[test]
    fn missing_font_file_is_reported() {
        let options = RenderOptions {
            font_file: Some(PathBuf::from("/nonexistent/font.ttf")),
            ..RenderOptions::default()
        };
        assert!(matches!(
            Renderer::new(options, "plots"),
            Err(TrackError::MissingFile { .. })
        ));
    }

    #[test]
    fn select_tracks_on_missing_directory() {
        let filter = GeoFilter::min_longitude_above(1.0);
        let err = select_tracks(Path::new("/nonexistent/gpx"), &filter).unwrap_err();
        assert!(matches!(err, TrackError::MissingFile { .. }));
    }
}
