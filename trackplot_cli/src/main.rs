use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use trackplot::{
    run_convert, Config, ExerciseExportConfig, FailurePolicy, GeoFilter, RenderOutcome, Renderer,
    TrackError,
};

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT_HASH"), ")");

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about = "Normalize fitness exports to GPX and plot route maps", long_about = None)]
struct Cli {
    /// JSON configuration file; flags override its values
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert vendor exports into normalized GPX files named by start time
    Convert(ConvertArgs),
    /// Render route maps from the normalized GPX directory
    Render(RenderArgs),
    /// List the region filters available to `render --mode filter`
    Filters,
}

#[derive(Parser, Debug)]
struct ConvertArgs {
    /// Directory of vendor GPX files
    #[arg(long, value_hint = ValueHint::DirPath)]
    gpx_dir: Option<PathBuf>,

    /// Exercise summary CSV of a Samsung Health style export
    #[arg(long, value_hint = ValueHint::FilePath, requires = "exercise_json_dir")]
    exercise_csv: Option<PathBuf>,

    /// Root of the exercise export's location JSON tree
    #[arg(long, value_hint = ValueHint::DirPath, requires = "exercise_csv")]
    exercise_json_dir: Option<PathBuf>,

    /// Output directory for normalized tracks
    #[arg(long, value_hint = ValueHint::DirPath)]
    tracks_dir: Option<PathBuf>,

    /// Hours added to every timestamp
    #[arg(long, allow_hyphen_values = true)]
    offset_hours: Option<f64>,

    /// Activity code selecting exercise rows
    #[arg(long)]
    activity_type: Option<i64>,

    /// What to do with a record that cannot be read
    #[arg(long, value_enum)]
    on_error: Option<OnErrorOpt>,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    #[arg(long, value_enum, default_value_t = RenderMode::All)]
    mode: RenderMode,

    /// Track file for `--mode single`; bare names resolve inside the tracks directory
    #[arg(long, value_hint = ValueHint::FilePath, required_if_eq("mode", "single"))]
    file: Option<PathBuf>,

    /// Region name for `--mode filter`
    #[arg(long, required_if_eq("mode", "filter"))]
    filter: Option<String>,

    /// Directory of normalized tracks
    #[arg(long, value_hint = ValueHint::DirPath)]
    tracks_dir: Option<PathBuf>,

    /// Output directory for PNG files
    #[arg(long, value_hint = ValueHint::DirPath)]
    plots_dir: Option<PathBuf>,

    #[arg(long)]
    dpi: Option<u32>,

    /// Fraction of the data span added around the routes
    #[arg(long)]
    margin: Option<f64>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum RenderMode {
    Single,
    All,
    Filter,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OnErrorOpt {
    Abort,
    Skip,
}

impl From<OnErrorOpt> for FailurePolicy {
    fn from(value: OnErrorOpt) -> Self {
        match value {
            OnErrorOpt::Abort => FailurePolicy::Abort,
            OnErrorOpt::Skip => FailurePolicy::Skip,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Convert(args) => handle_convert(config, args),
        Command::Render(args) => handle_render(config, args),
        Command::Filters => handle_filters(&config),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .map_err(report)
            .with_context(|| format!("loading configuration {}", path.display())),
        None => Ok(Config::default()),
    }
}

/// Render a library error as `Kind: message`.
fn report(err: TrackError) -> anyhow::Error {
    anyhow!("{}: {}", err.kind(), err)
}

fn handle_convert(mut config: Config, args: ConvertArgs) -> Result<()> {
    if let Some(dir) = args.gpx_dir {
        config.sources.gpx_dir = Some(dir);
    }
    if let (Some(csv_path), Some(json_dir)) = (args.exercise_csv, args.exercise_json_dir) {
        let exercise = config
            .sources
            .exercise
            .get_or_insert_with(ExerciseExportConfig::default);
        exercise.csv_path = csv_path;
        exercise.json_dir = json_dir;
    }
    if let Some(code) = args.activity_type {
        match config.sources.exercise.as_mut() {
            Some(exercise) => exercise.activity_type = code,
            None => warn!("--activity-type ignored: no exercise export configured"),
        }
    }
    if let Some(dir) = args.tracks_dir {
        config.tracks_dir = dir;
    }
    if let Some(hours) = args.offset_hours {
        config.normalize.timezone_offset_hours = hours;
    }
    if let Some(policy) = args.on_error {
        config.on_error = policy.into();
    }

    let summary = run_convert(&config).map_err(report)?;
    for (source, count) in &summary.per_source {
        println!("{}: {} track(s)", source, count);
    }
    println!(
        "Wrote {} track(s) to {}",
        summary.written.len(),
        config.tracks_dir.display()
    );
    if !summary.report.is_clean() {
        eprintln!("{}", summary.report.summary());
        return Err(anyhow!(
            "{} record(s) skipped",
            summary.report.failures().len()
        ));
    }
    Ok(())
}

fn handle_render(mut config: Config, args: RenderArgs) -> Result<()> {
    if let Some(dir) = args.tracks_dir {
        config.tracks_dir = dir;
    }
    if let Some(dir) = args.plots_dir {
        config.plots_dir = dir;
    }
    if let Some(dpi) = args.dpi {
        config.render.dpi = dpi;
    }
    if let Some(margin) = args.margin {
        config.render.margin_fraction = margin;
    }
    config.validate().map_err(report)?;

    let renderer = Renderer::from_config(&config).map_err(report)?;
    let outcome = match args.mode {
        RenderMode::Single => {
            let file = args
                .file
                .ok_or_else(|| anyhow!("--file is required with --mode single"))?;
            let file = resolve_track_file(&file, &config.tracks_dir);
            renderer.plot_gpx(&file).map_err(report)?
        }
        RenderMode::All => renderer.plot_all(&config.tracks_dir).map_err(report)?,
        RenderMode::Filter => {
            let name = args
                .filter
                .ok_or_else(|| anyhow!("--filter is required with --mode filter"))?;
            let rule = config.region(&name).ok_or_else(|| {
                let known: Vec<&str> = config.regions.iter().map(|r| r.name.as_str()).collect();
                anyhow!(
                    "unknown filter '{}' (available: {})",
                    name,
                    known.join(", ")
                )
            })?;
            renderer
                .plot_condition(&config.tracks_dir, &GeoFilter::from_rule(rule))
                .map_err(report)?
        }
    };
    print_outcome(&outcome);
    Ok(())
}

/// A path that does not exist as given is looked up in the tracks directory.
fn resolve_track_file(file: &Path, tracks_dir: &Path) -> PathBuf {
    if file.exists() || file.is_absolute() {
        return file.to_path_buf();
    }
    let candidate = tracks_dir.join(file);
    if candidate.extension().is_none() {
        candidate.with_extension("gpx")
    } else {
        candidate
    }
}

fn print_outcome(outcome: &RenderOutcome) {
    info!("{} track(s) drawn", outcome.tracks);
    println!("{}", outcome.path.display());
}

fn handle_filters(config: &Config) -> Result<()> {
    for rule in &config.regions {
        match rule.description.as_deref() {
            Some(desc) => println!("{:<12} {} ({})", rule.name, desc, rule.condition()),
            None => println!("{:<12} {}", rule.name, rule.condition()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_render_modes() {
        let cli = Cli::try_parse_from([
            "trackplot", "render", "--mode", "filter", "--filter", "istanbul", "--dpi", "100",
        ])
        .unwrap();
        match cli.command {
            Command::Render(args) => {
                assert!(matches!(args.mode, RenderMode::Filter));
                assert_eq!(args.filter.as_deref(), Some("istanbul"));
                assert_eq!(args.dpi, Some(100));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn single_mode_requires_a_file() {
        assert!(Cli::try_parse_from(["trackplot", "render", "--mode", "single"]).is_err());
    }

    #[test]
    fn negative_offsets_are_accepted() {
        let cli =
            Cli::try_parse_from(["trackplot", "--verbose", "convert", "--offset-hours", "-5"])
                .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::Convert(args) => assert_eq!(args.offset_hours, Some(-5.0)),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn bare_names_resolve_into_tracks_dir() {
        let resolved = resolve_track_file(Path::new("20220816_185420"), Path::new("/data/gpx"));
        assert_eq!(resolved, PathBuf::from("/data/gpx/20220816_185420.gpx"));
        let absolute = resolve_track_file(Path::new("/tmp/x.gpx"), Path::new("gpx"));
        assert_eq!(absolute, PathBuf::from("/tmp/x.gpx"));
    }

    #[test]
    fn errors_are_prefixed_with_their_kind() {
        let err = report(TrackError::FilterNoMatch {
            filter: "antalya".into(),
        });
        assert_eq!(
            err.to_string(),
            "FilterNoMatchError: no tracks matched filter 'antalya'"
        );
    }
}
