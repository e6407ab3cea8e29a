use anyhow::{Context, Result};
use clap::Parser;
use formtrack::source::{JsonLinesSource, LandmarkSource, SyntheticSource};
use formtrack::{ExerciseKind, FormtrackConfig, FormtrackOrchestrator};
use std::path::Path;
use tracing::{error, info};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};

#[derive(Parser, Debug)]
#[command(name = "formtrack")]
#[command(about = "Exercise telemetry from pose landmarks")]
#[command(version)]
#[command(long_about = "Reads 17-point pose landmarks as JSON lines, computes joint angles, \
tracks movement phases, counts validated repetitions and scores form. Per-frame telemetry \
is written to stdout as JSON lines; logs go to stderr.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "formtrack.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Exercise to track, overriding the configuration
    #[arg(short, long, value_name = "EXERCISE", help = "bicep_curl, squat, push_up, wall_sit or neck_flexion")]
    exercise: Option<ExerciseKind>,

    /// Landmark input
    #[arg(short, long, value_name = "PATH", help = "JSON-lines landmark file, or - for stdin (default)")]
    input: Option<String>,

    /// Generate synthetic repetitions instead of reading input
    #[arg(long, help = "Run on generated landmark frames")]
    demo: bool,

    /// Repetitions generated in demo mode
    #[arg(long, default_value_t = 5, requires = "demo")]
    reps: u32,

    /// Frame rate of generated frames
    #[arg(long, default_value_t = 30, requires = "demo")]
    fps: u32,

    /// Pace generated frames in real time
    #[arg(long, requires = "demo", help = "Emit demo frames at the frame rate instead of as fast as possible")]
    realtime: bool,

    /// Write every session event, not just frame telemetry
    #[arg(long, help = "Write all session events to stdout")]
    events: bool,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and the selected profile, then exit")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to a file
    #[arg(long, value_name = "PATH", help = "Append logs to this file")]
    log_file: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print!("{}", FormtrackConfig::default().to_toml()?);
        return Ok(());
    }

    let log_guard = init_logging(&args)?;

    info!("Starting formtrack v{}", env!("CARGO_PKG_VERSION"));

    let config = FormtrackConfig::load_from_file(&args.config).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;
    info!("Configuration loaded from: {}", args.config);

    let kind = args.exercise.unwrap_or(config.session.exercise);

    if args.validate_config {
        let mut valid = true;
        match config.validate() {
            Ok(()) => println!("✓ Configuration is valid"),
            Err(e) => {
                eprintln!("✗ Configuration validation failed: {}", e);
                valid = false;
            }
        }
        match config.resolve_profile(kind) {
            Ok(profile) => println!("✓ Profile '{}' is valid", profile.name),
            Err(e) => {
                eprintln!("✗ Profile validation failed for {}: {}", kind, e);
                valid = false;
            }
        }
        drop(log_guard);
        std::process::exit(if valid { 0 } else { 1 });
    }

    let profile = config
        .checked_profile(kind)
        .with_context(|| format!("Invalid configuration for {}", kind))?;
    info!("Tracking {}", profile.name);

    let source: Box<dyn LandmarkSource> = if args.demo {
        Box::new(SyntheticSource::new(profile.clone(), args.reps, args.fps).realtime(args.realtime))
    } else {
        match args.input.as_deref() {
            None | Some("-") => Box::new(JsonLinesSource::stdin()),
            Some(path) => Box::new(
                JsonLinesSource::open(path)
                    .await
                    .with_context(|| format!("Failed to open input {}", path))?,
            ),
        }
    };

    let mut orchestrator =
        FormtrackOrchestrator::new(config, profile, source, Box::new(tokio::io::stdout()))?;
    orchestrator.set_event_output(args.events);

    orchestrator.initialize().await.map_err(|e| {
        error!("Failed to initialize: {}", e);
        e
    })?;
    orchestrator.start().await.map_err(|e| {
        error!("Failed to start: {}", e);
        e
    })?;

    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("Error during execution: {}", e);
        e
    })?;

    info!("formtrack exited with code: {}", exit_code);
    // process::exit skips destructors; flush the log file first
    drop(log_guard);
    std::process::exit(exit_code);
}

/// Install the tracing subscriber. Logs go to stderr so stdout carries only
/// telemetry; the returned guard flushes the log file on drop.
fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("formtrack={}", log_level)));

    let stderr_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_writer(std::io::stderr).boxed()
        }
    };

    let (file_layer, guard) = match args.log_file.as_deref() {
        Some(path) => {
            let (writer, guard) = log_file_writer(Path::new(path))?;
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Background writer appending to `path`. Buffered lines reach the file only
/// once the guard is dropped.
fn log_file_writer(path: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    let directory = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .with_context(|| format!("Log file path has no file name: {}", path.display()))?;
    let appender = tracing_appender::rolling::never(directory, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_log_file_tail_is_written_when_guard_drops() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("formtrack.log");

        let (mut writer, guard) = log_file_writer(&path).unwrap();
        writer.write_all(b"formtrack exited with code: 0\n").unwrap();
        drop(guard);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "formtrack exited with code: 0\n");
    }

    #[test]
    fn test_log_file_path_needs_a_file_name() {
        assert!(log_file_writer(Path::new("/")).is_err());
    }

    #[test]
    fn test_validate_config_flag_parses() {
        let args = Args::parse_from(["formtrack", "--validate-config", "-e", "squat"]);
        assert!(args.validate_config);
        assert_eq!(args.exercise, Some(ExerciseKind::Squat));
    }
}
