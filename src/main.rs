use clap::{Args, Parser, Subcommand};
use raw_previews::job::registry::JobRegistry;
use raw_previews::scan;
use raw_previews::state::catalog::Catalog;
use raw_previews::state::settings::SettingsStore;
use raw_previews::state::stems::load_stem_list;
use raw_previews::{
    Demosaic, FileOutcome, JobSnapshot, Outcome, OutputFormat, PreviewOptions, Result, SizeMode,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Settings namespace shared with the dashboard
const SETTINGS_NAMESPACE: &str = "previews";

/// How often progress is polled while a job runs
const REFRESH_INTERVAL: Duration = Duration::from_millis(500);

/// How many failures to show at the end of a run
const FAILURES_SHOWN: usize = 20;

#[derive(Debug, Parser)]
#[command(name = "raw-previews", version, about = "Generate model-ready previews from RAW photos")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Convert RAW files into previews
    Generate(GenerateArgs),
    /// List the RAW files a job would process, in processing order
    Scan(ScanArgs),
}

/// Which source files take part
#[derive(Debug, Args)]
struct SelectionArgs {
    /// Only convert files whose stem appears in this list (.csv `name` column or one name per line)
    #[arg(long, value_name = "FILE")]
    stems: Option<PathBuf>,

    /// Only convert files referenced by this catalog
    #[arg(long, value_name = "FILE")]
    catalog: Option<PathBuf>,

    /// Process at most this many files (0 = no limit)
    #[arg(long)]
    limit: Option<usize>,

    /// Search subfolders
    #[arg(long, overrides_with = "no_recursive")]
    recursive: bool,

    /// Only search the top level of the source folder
    #[arg(long)]
    no_recursive: bool,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    /// RAW source folder
    source: PathBuf,

    /// Previews output folder
    out: PathBuf,

    #[command(flatten)]
    selection: SelectionArgs,

    /// none, exact_224 or short256_center224
    #[arg(long)]
    size_mode: Option<SizeMode>,

    /// jpeg or webp
    #[arg(long)]
    format: Option<OutputFormat>,

    /// Encoder quality (60-95)
    #[arg(long)]
    quality: Option<u8>,

    /// Concurrent conversions (1-16)
    #[arg(long)]
    workers: Option<usize>,

    /// Regenerate previews that already exist
    #[arg(long, overrides_with = "no_overwrite")]
    overwrite: bool,

    /// Skip previews that already exist
    #[arg(long)]
    no_overwrite: bool,

    /// Demosaic at half resolution (faster)
    #[arg(long, overrides_with = "full_size")]
    half_size: bool,

    /// Demosaic at full resolution
    #[arg(long)]
    full_size: bool,

    /// Apply the as-shot camera white balance
    #[arg(long, overrides_with = "no_camera_wb")]
    camera_wb: bool,

    /// Leave white balance neutral
    #[arg(long)]
    no_camera_wb: bool,

    /// Linear exposure multiplier
    #[arg(long)]
    bright: Option<f32>,

    /// Print the final report as JSON
    #[arg(long)]
    json: bool,

    /// Settings file to read defaults from and remember options in
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Do not remember the options used for this run
    #[arg(long)]
    forget: bool,
}

#[derive(Debug, Args)]
struct ScanArgs {
    /// RAW source folder
    source: PathBuf,

    #[command(flatten)]
    selection: SelectionArgs,
}

#[derive(Serialize)]
struct Report {
    job: JobSnapshot,
    failures: Vec<FileOutcome>,
}

/// Resolve a `--flag` / `--no-flag` pair
fn toggle(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

impl SelectionArgs {
    /// Allow-list from `--stems` and `--catalog`; with both, a file must be in each
    fn allow_list(&self) -> Result<Option<BTreeSet<String>>> {
        let from_file = self.stems.as_deref().map(load_stem_list).transpose()?;
        let from_catalog = match &self.catalog {
            Some(path) => Some(Catalog::open(path)?.file_stems()?),
            None => None,
        };

        Ok(match (from_file, from_catalog) {
            (Some(a), Some(b)) => Some(a.intersection(&b).cloned().collect()),
            (a, b) => a.or(b),
        })
    }
}

impl GenerateArgs {
    /// Command-line flags win over remembered options
    fn apply(&self, options: &mut PreviewOptions) {
        if let Some(size_mode) = self.size_mode {
            options.size_mode = size_mode;
        }
        if let Some(format) = self.format {
            options.format = format;
        }
        if let Some(quality) = self.quality {
            options.quality = quality;
        }
        if let Some(workers) = self.workers {
            options.workers = workers;
        }
        if let Some(limit) = self.selection.limit {
            options.limit = limit;
        }
        if let Some(recursive) = toggle(self.selection.recursive, self.selection.no_recursive) {
            options.recursive = recursive;
        }
        if let Some(overwrite) = toggle(self.overwrite, self.no_overwrite) {
            options.overwrite = overwrite;
        }
        if let Some(half) = toggle(self.half_size, self.full_size) {
            options.develop.demosaic = if half {
                Demosaic::HalfSize
            } else {
                Demosaic::Bilinear
            };
        }
        if let Some(camera_wb) = toggle(self.camera_wb, self.no_camera_wb) {
            options.develop.use_camera_wb = camera_wb;
        }
        if let Some(bright) = self.bright {
            options.develop.bright = bright;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("raw_previews=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Generate(args) => generate(args).await,
        Command::Scan(args) => scan_sources(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn generate(args: GenerateArgs) -> Result<()> {
    let mut store = args
        .settings
        .clone()
        .or_else(SettingsStore::default_path)
        .map(SettingsStore::load);

    let mut options: PreviewOptions = store
        .as_ref()
        .map(|store| store.get(SETTINGS_NAMESPACE))
        .unwrap_or_default();
    args.apply(&mut options);

    let config = options.clone().validate(args.selection.allow_list()?)?;

    if !args.forget {
        if let Some(store) = store.as_mut() {
            store.update(SETTINGS_NAMESPACE, &options)?;
            if let Err(err) = store.save_if_changed() {
                tracing::warn!("could not remember options: {}", err);
            }
        }
    }

    let registry = JobRegistry::new();
    let job = registry.start_job(&args.source, &args.out, config)?;

    let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snap = job.snapshot();
                tracing::info!(
                    status = %snap.status,
                    total = snap.total,
                    completed = snap.completed,
                    skipped = snap.skipped,
                    failed = snap.failed,
                    "{:>5.1}%",
                    snap.progress * 100.0
                );
                if snap.status.is_terminal() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c(), if !job.is_cancel_requested() => {
                tracing::warn!("interrupted, letting in-flight previews finish");
                job.cancel();
            }
        }
    }

    let snapshot = Arc::clone(&job).finished().await;
    let failures: Vec<FileOutcome> = job
        .recent_outcomes(usize::MAX)
        .into_iter()
        .filter(|outcome| outcome.outcome == Outcome::Failed)
        .collect();

    if args.json {
        let report = Report {
            job: snapshot,
            failures,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for failure in failures.iter().rev().take(FAILURES_SHOWN).rev() {
        println!(
            "failed  {}: {}",
            failure.source.display(),
            failure.error.as_deref().unwrap_or("unknown error")
        );
    }
    println!(
        "{}: {} total, {} completed, {} skipped, {} failed -> {}",
        snapshot.status,
        snapshot.total,
        snapshot.completed,
        snapshot.skipped,
        snapshot.failed,
        snapshot.out_dir.display()
    );
    Ok(())
}

fn scan_sources(args: ScanArgs) -> Result<()> {
    let recursive = toggle(args.selection.recursive, args.selection.no_recursive).unwrap_or(true);
    let limit = args.selection.limit.filter(|&limit| limit > 0);
    let stems = args.selection.allow_list()?;

    let files = scan::collect_sources(&args.source, recursive, stems.as_ref(), limit);
    for file in &files {
        println!("{}", file.display());
    }
    tracing::info!(files = files.len(), source = %args.source.display(), "scan complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_remembered_options() {
        let cli = Cli::parse_from([
            "raw-previews",
            "generate",
            "raw",
            "out",
            "--format",
            "webp",
            "--quality",
            "70",
            "--no-recursive",
            "--half-size",
            "--limit",
            "5",
        ]);
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };

        let mut options = PreviewOptions {
            overwrite: true,
            ..PreviewOptions::default()
        };
        args.apply(&mut options);
        assert_eq!(options.format, OutputFormat::Webp);
        assert_eq!(options.quality, 70);
        assert!(!options.recursive);
        assert_eq!(options.limit, 5);
        assert_eq!(options.develop.demosaic, Demosaic::HalfSize);
        // Untouched flags keep the remembered value
        assert!(options.overwrite);
        assert_eq!(options.size_mode, SizeMode::Exact);
    }

    #[test]
    fn test_size_mode_parses_from_cli() {
        let cli = Cli::parse_from(["raw-previews", "generate", "a", "b", "--size-mode", "short256_center224"]);
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.size_mode, Some(SizeMode::ShortEdgeCenterCrop));
    }

    #[test]
    fn test_toggle() {
        assert_eq!(toggle(true, false), Some(true));
        assert_eq!(toggle(false, true), Some(false));
        assert_eq!(toggle(false, false), None);
    }

    #[test]
    fn test_allow_list_intersection() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("keep.txt");
        std::fs::write(&list, "a\nb\n").unwrap();

        let catalog = dir.path().join("catalog.lrcat");
        let conn = rusqlite::Connection::open(&catalog).unwrap();
        conn.execute("CREATE TABLE AgLibraryFile (baseName TEXT)", []).unwrap();
        conn.execute("INSERT INTO AgLibraryFile (baseName) VALUES ('b'), ('c')", []).unwrap();
        drop(conn);

        let selection = SelectionArgs {
            stems: Some(list),
            catalog: Some(catalog),
            limit: None,
            recursive: false,
            no_recursive: false,
        };
        let stems: Vec<String> = selection.allow_list().unwrap().unwrap().into_iter().collect();
        assert_eq!(stems, vec!["b"]);
    }
}
