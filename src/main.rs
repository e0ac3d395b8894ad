//! scrobbledb CLI
//!
//! Command-line front end over the scrobble service:
//! - Record and import scrobbles
//! - Charts, pulse, performance and number-one series
//! - Artist and track overviews
//! - Artist data-quality checks

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use scrobbledb::config::{generate_default_config, Config, LoggingConfig};
use scrobbledb::import::{ColumnMap, CsvImporter};
use scrobbledb::query::{ChartEntry, RangeOptions, TimePoint, TimeWindow};
use scrobbledb::reconcile::IssueReport;
use scrobbledb::service::{
    ArtistInfo, EntityRef, PerformanceEntry, PulseEntry, ScrobbleService, ScrobbleSubmission,
    SearchKind, SearchResults, TopEntry, TrackInfo,
};
use scrobbledb::store::{MemoryStore, Scrobble, ScrobbleStore};
use serde::Serialize;
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "scrobbledb")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Scrobble analytics over your listening history")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the usual locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import listening history from a CSV file
    Import {
        /// Path to CSV file
        path: PathBuf,
        /// The file has no header row (columns: artist,album,title,date)
        #[arg(long)]
        no_header: bool,
        /// Split the artist column on this separator
        #[arg(long)]
        artist_separator: Option<String>,
        /// Dry run (don't actually import)
        #[arg(long)]
        dry_run: bool,
    },

    /// Record a scrobble
    Scrobble {
        /// Track title
        title: String,
        /// Track artist (repeat for several)
        #[arg(short, long, required = true)]
        artist: Vec<String>,
        #[arg(short = 'A', long)]
        album: Option<String>,
        /// When it was played: "now", "yesterday", a date or unix seconds
        #[arg(short, long)]
        time: Option<String>,
        /// Seconds listened
        #[arg(short, long)]
        duration: Option<u32>,
        #[arg(long, default_value = "cli")]
        client: String,
    },

    /// List scrobbles in a window, newest first
    Scrobbles {
        #[command(flatten)]
        range: RangeArgs,
        #[command(flatten)]
        entity: EntityArgs,
        /// Only print the number of scrobbles
        #[arg(long)]
        count: bool,
    },

    /// Artist or track chart for a window
    Charts {
        #[command(subcommand)]
        kind: ChartCommand,
    },

    /// Scrobble count per window
    Pulse {
        #[command(flatten)]
        range: RangeArgs,
        #[command(flatten)]
        entity: EntityArgs,
    },

    /// Chart rank of an artist or track per window
    Performance {
        #[command(flatten)]
        range: RangeArgs,
        #[command(flatten)]
        entity: EntityArgs,
    },

    /// Number one per window
    Top {
        #[command(subcommand)]
        kind: TopCommand,
    },

    /// All-time overview of an artist or track
    Info {
        #[command(subcommand)]
        kind: InfoCommand,
    },

    /// Artist data-quality suggestions
    Issues {
        /// Recompute instead of showing the last report
        #[arg(long)]
        check: bool,
    },

    /// Search artists (or tracks) by name
    Search {
        query: String,
        #[arg(long)]
        tracks: bool,
    },

    /// Show service status and cache statistics
    Status,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum ChartCommand {
    Artists {
        #[command(flatten)]
        range: RangeArgs,
    },
    Tracks {
        #[command(flatten)]
        range: RangeArgs,
        /// Only this artist's tracks
        #[arg(long)]
        artist: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum TopCommand {
    Artists {
        #[command(flatten)]
        range: RangeArgs,
    },
    Tracks {
        #[command(flatten)]
        range: RangeArgs,
    },
}

#[derive(Subcommand)]
pub enum InfoCommand {
    Artist {
        name: String,
    },
    Track {
        title: String,
        #[arg(short, long, required = true)]
        artist: Vec<String>,
    },
}

/// Time-range options shared by the query commands
#[derive(Args, Debug, Default)]
pub struct RangeArgs {
    /// Start point, e.g. 2020, 2020/05, 2020/05/14, 2020/w20, yesterday
    #[arg(long)]
    since: Option<String>,
    /// End point (its period is included)
    #[arg(long)]
    to: Option<String>,
    /// Span back from the end, e.g. 7d, 2w, 3m, 1y
    #[arg(long)]
    within: Option<String>,
    /// One calendar period as the whole range
    #[arg(long)]
    timerange: Option<String>,
    /// Series step: day, week, month or year
    #[arg(long)]
    step: Option<String>,
    /// Number of series windows
    #[arg(long)]
    stepn: Option<u32>,
    /// Steps per series window
    #[arg(long)]
    trail: Option<u32>,
}

impl From<RangeArgs> for RangeOptions {
    fn from(args: RangeArgs) -> Self {
        RangeOptions {
            since: args.since,
            to: args.to,
            within: args.within,
            timerange: args.timerange,
            step: args.step,
            stepn: args.stepn,
            trail: args.trail,
        }
    }
}

/// Artist or track selection
#[derive(Args, Debug, Default)]
pub struct EntityArgs {
    /// Artist name; with --track, the track's artists
    #[arg(long)]
    artist: Vec<String>,
    /// Track title
    #[arg(long)]
    track: Option<String>,
}

impl EntityArgs {
    fn entity(self) -> anyhow::Result<Option<EntityRef>> {
        let EntityArgs { artist, track } = self;
        match track {
            Some(_) if artist.is_empty() => bail!("--track needs at least one --artist"),
            Some(title) => Ok(Some(EntityRef::track(title, artist))),
            None if artist.len() > 1 => bail!("give one --artist, or --track with its artists"),
            None => Ok(artist.into_iter().next().map(EntityRef::artist)),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let config = generate_default_config();
        match output {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, &config)?;
                println!("Config written to {:?}", path);
            }
            None => print!("{}", config),
        }
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_logging(&config.logging);

    let data_file = config.store.data_file.clone();
    let store = Arc::new(
        MemoryStore::load(&data_file)
            .await
            .with_context(|| format!("loading {}", data_file.display()))?,
    );
    let service = ScrobbleService::new(store.clone() as Arc<dyn ScrobbleStore>, config.service_config());
    service.start().await?;

    let format = cli.format;
    let mutated = run(cli.command, &service, format).await?;

    if mutated {
        store
            .save(&data_file)
            .await
            .with_context(|| format!("saving {}", data_file.display()))?;
        tracing::info!(path = %data_file.display(), "Store saved");
    }

    Ok(())
}

/// Run one command; returns whether the store changed
async fn run(command: Commands, service: &ScrobbleService, format: OutputFormat) -> anyhow::Result<bool> {
    match command {
        Commands::Import {
            path,
            no_header,
            artist_separator,
            dry_run,
        } => {
            if !path.exists() {
                bail!("File not found: {:?}", path);
            }

            let mut importer = CsvImporter::new().with_header(!no_header);
            if no_header {
                importer = importer.with_columns(ColumnMap::default());
            }
            if let Some(separator) = &artist_separator {
                importer = importer.with_artist_separator(separator);
            }
            let result = importer.import(&path)?;

            println!("Import results:");
            println!("  Rows processed: {}", result.rows_processed);
            println!("  Rows failed: {}", result.rows_failed);

            if !result.errors.is_empty() {
                println!();
                println!("Errors (first 10):");
                for error in result.errors.iter().take(10) {
                    println!("  {}", error);
                }
            }

            if dry_run {
                println!();
                println!("(Dry run - no scrobbles were imported)");
                return Ok(false);
            }

            let imported = service.import_scrobbles(result.scrobbles).await?;
            println!("  Imported: {}", imported);
            Ok(imported > 0)
        }

        Commands::Scrobble {
            title,
            artist,
            album,
            time,
            duration,
            client,
        } => {
            let mut submission = ScrobbleSubmission::new(artist, title).client(client);
            if let Some(album) = album {
                submission = submission.album(album);
            }
            if let Some(duration) = duration {
                submission = submission.duration(duration);
            }
            if let Some(time) = time {
                let point: TimePoint = time.parse()?;
                submission = submission.time(point.start(Utc::now().timestamp()));
            }

            let outcome = service.submit_scrobble(submission).await?;
            match format {
                OutputFormat::Json => print_json(&outcome)?,
                OutputFormat::Table => match (&outcome.scrobble, &outcome.reason) {
                    (Some(scrobble), _) => {
                        println!("Scrobbled {} at {}", scrobble.track, format_time(scrobble.time))
                    }
                    (None, reason) => {
                        println!("Rejected: {}", reason.as_deref().unwrap_or("unknown reason"))
                    }
                },
            }
            Ok(outcome.is_success())
        }

        Commands::Scrobbles { range, entity, count } => {
            let options = RangeOptions::from(range);
            let entity = entity.entity()?;

            if count {
                let total = service.count_scrobbles(&options, entity.as_ref()).await?;
                match format {
                    OutputFormat::Json => print_json(&serde_json::json!({ "scrobbles": total }))?,
                    OutputFormat::Table => println!("{} scrobbles", total),
                }
            } else {
                let scrobbles = service.list_scrobbles(&options, entity.as_ref()).await?;
                match format {
                    OutputFormat::Json => print_json(&scrobbles)?,
                    OutputFormat::Table => print_scrobbles(&scrobbles),
                }
            }
            Ok(false)
        }

        Commands::Charts { kind } => {
            match kind {
                ChartCommand::Artists { range } => {
                    let chart = service.chart_artists(&range.into()).await?;
                    output(format, &chart, |c| print_chart("Artist", c))?;
                }
                ChartCommand::Tracks { range, artist } => {
                    let chart = service.chart_tracks(&range.into(), artist.as_deref()).await?;
                    output(format, &chart, |c| print_chart("Track", c))?;
                }
            }
            Ok(false)
        }

        Commands::Pulse { range, entity } => {
            let entity = entity.entity()?;
            let pulse = service.pulse(&range.into(), entity.as_ref()).await?;
            output(format, &pulse, print_pulse)?;
            Ok(false)
        }

        Commands::Performance { range, entity } => {
            let Some(entity) = entity.entity()? else {
                bail!("performance needs --artist or --track");
            };
            let performance = service.performance(&range.into(), &entity).await?;
            output(format, &performance, print_performance)?;
            Ok(false)
        }

        Commands::Top { kind } => {
            match kind {
                TopCommand::Artists { range } => {
                    let top = service.top_artists(&range.into()).await?;
                    output(format, &top, |t| print_top(t))?;
                }
                TopCommand::Tracks { range } => {
                    let top = service.top_tracks(&range.into()).await?;
                    output(format, &top, |t| print_top(t))?;
                }
            }
            Ok(false)
        }

        Commands::Info { kind } => {
            match kind {
                InfoCommand::Artist { name } => {
                    let info = service.artist_info(&name).await?;
                    output(format, &info, print_artist_info)?;
                }
                InfoCommand::Track { title, artist } => {
                    let info = service.track_info(&title, &artist).await?;
                    output(format, &info, print_track_info)?;
                }
            }
            Ok(false)
        }

        Commands::Issues { check } => {
            let report = if check {
                service.check_issues().await?
            } else {
                service.issues().await?
            };
            output(format, &report, print_issues)?;
            Ok(false)
        }

        Commands::Search { query, tracks } => {
            let kind = if tracks { SearchKind::Track } else { SearchKind::Artist };
            let results = service.search(&query, kind).await?;
            output(format, &results, print_search)?;
            Ok(false)
        }

        Commands::Status => {
            let status = service.status().await;
            let stats = service.cache_stats().await;
            match format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "status": status,
                    "cache": stats,
                }))?,
                OutputFormat::Table => {
                    println!("scrobbledb v{}", env!("CARGO_PKG_VERSION"));
                    println!();
                    println!("Status: {}", status);
                    println!();
                    println!("Cache:");
                    println!("  Enabled: {}", stats.enabled);
                    println!("  Entries: {}", stats.entries);
                    println!("  Hits: {}", stats.hits);
                    println!("  Misses: {}", stats.misses);
                }
            }
            Ok(false)
        }

        // Handled before the store is opened
        Commands::Config { .. } => Ok(false),
    }
}

fn init_logging(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("scrobbledb={}", config.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn output<T: Serialize>(format: OutputFormat, value: &T, table: impl FnOnce(&T)) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(value),
        OutputFormat::Table => {
            table(value);
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_time(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn format_date(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// `[since, to)` as calendar dates; the end date is the last day included
fn format_window(range: &TimeWindow) -> String {
    format!("{} .. {}", format_date(range.since), format_date(range.to - 1))
}

fn print_scrobbles(scrobbles: &[Scrobble]) {
    if scrobbles.is_empty() {
        println!("No scrobbles for the selected time range");
        return;
    }

    println!("{:<17} {}", "Time", "Track");
    println!("{}", "-".repeat(60));
    for scrobble in scrobbles {
        println!("{:<17} {}", format_time(scrobble.time), scrobble.track);
    }
}

fn print_chart<E: Display>(label: &str, chart: &Vec<ChartEntry<E>>) {
    if chart.is_empty() {
        println!("No scrobbles for the selected time range");
        return;
    }

    println!("{:>5}  {:<50} {:>8}", "Rank", label, "Scrobbles");
    println!("{}", "-".repeat(66));
    for entry in chart {
        println!("{:>5}  {:<50} {:>8}", entry.rank, entry.entity.to_string(), entry.count);
    }
}

fn print_pulse(pulse: &Vec<PulseEntry>) {
    println!("{:<26} {:>9}", "Range", "Scrobbles");
    println!("{}", "-".repeat(36));
    for entry in pulse {
        println!("{:<26} {:>9}", format_window(&entry.range), entry.scrobbles);
    }
}

fn print_performance(performance: &Vec<PerformanceEntry>) {
    println!("{:<26} {:>5}", "Range", "Rank");
    println!("{}", "-".repeat(32));
    for entry in performance {
        let rank = entry.rank.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string());
        println!("{:<26} {:>5}", format_window(&entry.range), rank);
    }
}

fn print_top<E: Display>(top: &Vec<TopEntry<E>>) {
    println!("{:<26} {:<40} {:>9}", "Range", "Number one", "Scrobbles");
    println!("{}", "-".repeat(77));
    for entry in top {
        let entity = entry
            .entity
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<26} {:<40} {:>9}", format_window(&entry.range), entity, entry.scrobbles);
    }
}

fn print_artist_info(info: &ArtistInfo) {
    println!("{}", info.artist);
    println!();
    println!("  Scrobbles: {}", info.scrobbles);
    match (info.position, &info.replace) {
        (Some(position), _) => println!("  Position: #{}", position),
        (None, Some(replace)) => println!("  Counted as: {}", replace),
        (None, None) => println!("  Position: -"),
    }
    if !info.associated.is_empty() {
        println!("  Includes: {}", info.associated.join(", "));
    }
    if let Some(certification) = info.certification {
        println!("  Certification: {:?}", certification);
    }
    print_achievements(info.medals.as_ref(), info.topweeks);
}

fn print_track_info(info: &TrackInfo) {
    println!("{}", info.track);
    println!();
    println!("  Scrobbles: {}", info.scrobbles);
    match info.position {
        Some(position) => println!("  Position: #{}", position),
        None => println!("  Position: -"),
    }
    if let Some(certification) = info.certification {
        println!("  Certification: {:?}", certification);
    }
    print_achievements(info.medals.as_ref(), info.topweeks);
}

fn print_achievements(medals: Option<&scrobbledb::ledger::Medals>, topweeks: Option<u32>) {
    if let Some(medals) = medals.filter(|m| !m.is_empty()) {
        let years = |years: &[i32]| years.iter().map(|y| y.to_string()).collect::<Vec<_>>().join(", ");
        println!("  Medals:");
        if !medals.gold.is_empty() {
            println!("    Gold: {}", years(&medals.gold));
        }
        if !medals.silver.is_empty() {
            println!("    Silver: {}", years(&medals.silver));
        }
        if !medals.bronze.is_empty() {
            println!("    Bronze: {}", years(&medals.bronze));
        }
    }
    if let Some(weeks) = topweeks.filter(|w| *w > 0) {
        println!("  Weeks at number one: {}", weeks);
    }
}

fn print_issues(report: &IssueReport) {
    if report.is_empty() {
        println!("No issues found.");
        return;
    }

    for duplicate in &report.duplicates {
        println!("duplicate   {} -> {}", duplicate.name, duplicate.duplicate_of);
    }
    for combined in &report.combined {
        println!("combined    {} = {}", combined.name, combined.components.join(" + "));
    }
    for new_artist in &report.new_artists {
        println!("new artist  {} (in {})", new_artist.name, new_artist.found_in);
    }
}

fn print_search(results: &SearchResults) {
    if results.is_empty() {
        println!("No matches.");
        return;
    }

    match results {
        SearchResults::Artists(artists) => artists.iter().for_each(|a| println!("{}", a)),
        SearchResults::Tracks(tracks) => tracks.iter().for_each(|t| println!("{}", t)),
    }
}
