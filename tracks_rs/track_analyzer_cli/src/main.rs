use std::fs;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueHint};
use rayon::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use track_analyzer::{
    parse_track_input, AnalyzerSettings, GpsAnalyzer, MovementItem, ProcessedTrack, TrackError,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "GPS track analysis CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze one or more GPX/FIT files into segments, stops and a movement timeline
    Analyze(AnalyzeArgs),
    /// Summarize what a GPX/FIT file contains without analyzing it
    Inspect(InspectArgs),
    /// Print the effective settings as JSON
    Settings(SettingsArgs),
}

#[derive(Parser, Debug)]
struct AnalyzeArgs {
    /// GPX/FIT files to analyze
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Directory for `<stem>.analysis.json` results (`-` for stdout)
    #[arg(short, long, default_value = ".", value_hint = ValueHint::DirPath)]
    output_dir: PathBuf,

    /// Settings JSON; missing keys keep their defaults
    #[arg(long, value_hint = ValueHint::FilePath)]
    settings: Option<PathBuf>,

    /// Also write the movement timeline as `<stem>.timeline.csv`
    #[arg(long, action = ArgAction::SetTrue)]
    timeline_csv: bool,

    /// Pretty-print JSON output
    #[arg(long, action = ArgAction::SetTrue)]
    pretty: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// GPX/FIT files to inspect
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct SettingsArgs {
    /// Settings JSON to merge over the defaults
    #[arg(long, value_hint = ValueHint::FilePath)]
    settings: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Analyze(args) => args.verbose,
        Command::Inspect(args) => args.verbose,
        Command::Settings(_) => false,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Analyze(args) => handle_analyze(args),
        Command::Inspect(args) => handle_inspect(args),
        Command::Settings(args) => handle_settings(args),
    }
}

fn load_settings(path: Option<&PathBuf>) -> Result<AnalyzerSettings> {
    let Some(path) = path else {
        return Ok(AnalyzerSettings::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings {}", path.display()))?;
    AnalyzerSettings::from_json_str(&text)
        .with_context(|| format!("invalid settings in {}", path.display()))
}

fn format_hint(path: &Path) -> &str {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("gpx")
}

fn handle_analyze(args: AnalyzeArgs) -> Result<()> {
    let settings = load_settings(args.settings.as_ref())?;
    let to_stdout = args.output_dir.as_os_str() == "-";
    if !to_stdout {
        fs::create_dir_all(&args.output_dir)
            .with_context(|| format!("failed to create {}", args.output_dir.display()))?;
    }

    let t_start = Instant::now();
    let outcomes: Vec<(PathBuf, Result<ProcessedTrack>)> = args
        .inputs
        .par_iter()
        .map(|path| (path.clone(), analyze_file(path, &settings)))
        .collect();

    let mut failures = 0;
    for (path, outcome) in outcomes {
        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                failures += 1;
                let internal = err
                    .downcast_ref::<TrackError>()
                    .map_or(false, TrackError::is_internal);
                if internal {
                    error!("{}: {:#}", path.display(), err);
                } else {
                    warn!("{}: {:#}", path.display(), err);
                }
                continue;
            }
        };
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("track");
        if to_stdout {
            write_json(io::stdout().lock(), &result, args.pretty)?;
        } else {
            let json_path = args.output_dir.join(format!("{stem}.analysis.json"));
            let file = File::create(&json_path)
                .with_context(|| format!("failed to create {}", json_path.display()))?;
            write_json(file, &result, args.pretty)?;
            info!("Wrote {}", json_path.display());
        }
        if args.timeline_csv {
            if to_stdout {
                write_timeline(io::stdout().lock(), &result.movement)?;
            } else {
                let csv_path = args.output_dir.join(format!("{stem}.timeline.csv"));
                let file = File::create(&csv_path)
                    .with_context(|| format!("failed to create {}", csv_path.display()))?;
                write_timeline(file, &result.movement)?;
                info!("Wrote {}", csv_path.display());
            }
        }
    }

    info!(
        "Analyzed {} file(s) in {:.1} ms",
        args.inputs.len() - failures,
        t_start.elapsed().as_secs_f64() * 1000.0
    );
    if failures > 0 {
        return Err(anyhow!("{failures} of {} file(s) failed", args.inputs.len()));
    }
    Ok(())
}

fn analyze_file(path: &Path, settings: &AnalyzerSettings) -> Result<ProcessedTrack> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let input = parse_track_input(&data, format_hint(path))?;
    let result = GpsAnalyzer::new(settings).process(input)?;
    Ok(result)
}

fn write_json<W: Write>(mut writer: W, result: &ProcessedTrack, pretty: bool) -> Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut writer, result)?;
    } else {
        serde_json::to_writer(&mut writer, result)?;
    }
    writeln!(writer)?;
    Ok(())
}

fn write_timeline<W: Write>(handle: W, movement: &[MovementItem]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(handle);
    writer.write_record(["start_time", "end_time", "seconds", "category"])?;
    for item in movement {
        let seconds = (item.end_time - item.start_time).num_milliseconds() as f64 / 1000.0;
        let category = serde_json::to_value(item.category)?;
        writer.write_record([
            item.start_time.to_rfc3339(),
            item.end_time.to_rfc3339(),
            format!("{seconds:.0}"),
            category.as_str().unwrap_or_default().to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn handle_inspect(args: InspectArgs) -> Result<()> {
    for path in &args.inputs {
        let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let input = parse_track_input(&data, format_hint(path))
            .with_context(|| format!("failed to parse {}", path.display()))?;
        println!("{}", path.display());
        for (index, track) in input.tracks.iter().enumerate() {
            let points: Vec<_> = track.segments.iter().flatten().collect();
            let untimed = points.iter().filter(|p| p.time.is_none()).count();
            let first = points.iter().find_map(|p| p.time);
            let last = points.iter().rev().find_map(|p| p.time);
            println!(
                "  track {index} {:?}: {} segment(s), {} point(s), {} without time",
                track.name.as_deref().unwrap_or("-"),
                track.segments.len(),
                points.len(),
                untimed
            );
            if let (Some(first), Some(last)) = (first, last) {
                println!("    {} .. {}", first.to_rfc3339(), last.to_rfc3339());
            }
        }
        println!("  {} waypoint(s)", input.waypoints.len());
    }
    Ok(())
}

fn handle_settings(args: SettingsArgs) -> Result<()> {
    let settings = load_settings(args.settings.as_ref())?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, &settings)?;
    writeln!(handle)?;
    info!("Settings fingerprint {}", settings.fingerprint());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use track_analyzer::MovementCategory;

    #[test]
    fn timeline_csv_has_header_and_rows() {
        let start = Utc.with_ymd_and_hms(2024, 5, 4, 10, 0, 0).unwrap();
        let movement = vec![MovementItem {
            start_time: start,
            end_time: start + chrono::Duration::seconds(90),
            category: MovementCategory::StoppedWalking,
        }];
        let mut buffer = Vec::new();
        write_timeline(&mut buffer, &movement).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "start_time,end_time,seconds,category");
        assert!(lines[1].ends_with(",90,STOPPED_WALKING"));
    }

    #[test]
    fn format_hint_uses_extension() {
        assert_eq!(format_hint(Path::new("ride.fit")), "fit");
        assert_eq!(format_hint(Path::new("walk")), "gpx");
    }
}
