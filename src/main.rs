use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use fieldstamp::config::{Config, Settings, CONFIG_FILE_NAME};
use fieldstamp::core::incident::IncidentPolicy;
use fieldstamp::services::runner::RunReport;
use fieldstamp::services::{cleanup, history};
use fieldstamp::{DryRunSink, PixelDifference, Runner, StampSink, TextStamper};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    name = "fieldstamp",
    version,
    about = "Stamp plausible capture times onto work-session photos"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (default: ./config.json, then the user config dir)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Folder to process (default: folder_path from the configuration)
    #[arg(short, long, value_name = "DIR")]
    root: Option<PathBuf>,
    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
    /// Only show what would be stamped
    #[arg(long)]
    dry_run: bool,
    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
    /// Keep previously stamped files
    #[arg(long)]
    no_clean: bool,
    /// Leave landscape photos unrotated
    #[arg(long)]
    no_rotate: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stamp incident and leaf folders
    Works {
        #[command(flatten)]
        run: RunArgs,
        /// How incident stages are timed
        #[arg(long, value_enum)]
        policy: Option<IncidentPolicy>,
    },

    /// Stamp one photo per dated folder
    Days {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Delete previously stamped files
    Clean {
        #[arg(short, long, value_name = "DIR")]
        root: Option<PathBuf>,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Rotate landscape photos in leaf folders to portrait
    Rotate {
        #[arg(short, long, value_name = "DIR")]
        root: Option<PathBuf>,
    },

    /// List stamp history records
    History {
        #[arg(short, long, value_name = "DIR")]
        root: Option<PathBuf>,
    },

    /// Write a starter configuration file
    Init {
        #[arg(value_name = "FILE", default_value = CONFIG_FILE_NAME)]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Works { run, policy } => {
            let mut settings = load_settings(cli.config.as_deref(), run.root.as_deref())?;
            if let Some(policy) = policy {
                settings.policy = policy;
            }
            ensure_dir(&settings.root)?;
            prepare_root(&settings.root, &run);

            println!("▶ Stamping works in: {}", settings.root.display());
            let report = execute(&settings, &run, |runner| runner.run_works(&settings.root))?;
            finish(&settings.root, &run, &report)?;
        }

        Commands::Days { run } => {
            let settings = load_settings(cli.config.as_deref(), run.root.as_deref())?;
            ensure_dir(&settings.root)?;
            prepare_root(&settings.root, &run);

            println!("▶ Stamping days in: {}", settings.root.display());
            let report = execute(&settings, &run, |runner| Ok(runner.run_days(&settings.root)))?;
            finish(&settings.root, &run, &report)?;
        }

        Commands::Clean { root, yes } => {
            let root = resolve_root(cli.config.as_deref(), root)?;
            let found = cleanup::find_stamped(&root);
            if found.is_empty() {
                println!("No stamped files found.");
                return Ok(());
            }
            for path in &found {
                println!("   🗑️  {}", path.display());
            }

            let confirmed = yes
                || Confirm::new()
                    .with_prompt(format!("Delete {} stamped file(s)?", found.len()))
                    .default(false)
                    .interact()
                    .context("Failed to read confirmation")?;
            if !confirmed {
                println!("Aborted.");
                return Ok(());
            }

            let removed = cleanup::remove_stamped(&root);
            println!("✅ Removed {} stamped file(s)", removed);
        }

        Commands::Rotate { root } => {
            let root = resolve_root(cli.config.as_deref(), root)?;
            ensure_dir(&root)?;
            let rotated = cleanup::rotate_landscape(&root);
            println!("✅ Rotated {} landscape photo(s)", rotated);
        }

        Commands::History { root } => {
            let root = resolve_root(cli.config.as_deref(), root)?;
            let history_file = history::history_path(&root);
            let records = history::read(&root)
                .with_context(|| format!("Could not open history file {:?}", history_file))?;

            println!("🗂️  Stamp History:");
            for (i, rec) in records.iter().enumerate() {
                println!(
                    "[{}] {}\n     source: {}\n     output: {}\n     stamped: {} {}\n     location: {}\n",
                    i,
                    rec.run_at,
                    rec.source,
                    rec.output,
                    rec.date,
                    rec.time,
                    rec.location.replace('\n', " / ")
                );
            }
        }

        Commands::Init { path, force } => {
            if path.exists() && !force {
                anyhow::bail!("{} already exists; pass --force to overwrite", path.display());
            }
            let text = Config::default().to_json_pretty()?;
            fs::write(&path, text).with_context(|| format!("Failed to write {:?}", path))?;
            println!("✅ Wrote starter configuration to {}", path.display());
        }
    }

    Ok(())
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_default_env();
    // RUST_LOG wins unless -v was given explicitly
    if verbosity > 0 || std::env::var_os("RUST_LOG").is_none() {
        builder.filter_level(level);
    }
    builder.init();
}

fn load_settings(config: Option<&Path>, root: Option<&Path>) -> Result<Settings> {
    let config = Config::discover(config).context("Failed to load configuration")?;
    let mut settings = config.resolve().context("Invalid configuration")?;
    if let Some(root) = root {
        settings.root = root.to_path_buf();
    }
    Ok(settings)
}

fn resolve_root(config: Option<&Path>, root: Option<PathBuf>) -> Result<PathBuf> {
    match root {
        Some(root) => Ok(root),
        None => Ok(Config::discover(config)
            .context("Failed to load configuration; pass --root instead")?
            .folder_path),
    }
}

fn ensure_dir(root: &Path) -> Result<()> {
    if !root.is_dir() {
        anyhow::bail!("{} is not a directory", root.display());
    }
    Ok(())
}

fn prepare_root(root: &Path, run: &RunArgs) {
    if run.dry_run {
        log::info!("Dry run: skipping cleanup and rotation");
        return;
    }
    let passes = cleanup::Prepare {
        clean: !run.no_clean,
        rotate: !run.no_rotate,
    };
    let done = cleanup::prepare(root, passes);
    if passes.clean {
        println!("🧹 Removed {} stamped file(s)", done.removed);
    }
    if passes.rotate {
        println!("🔄 Rotated {} landscape photo(s)", done.rotated);
    }
}

/// Build the sink and progress bar, then hand a ready runner to `f`.
fn execute<F>(settings: &Settings, run: &RunArgs, f: F) -> Result<RunReport>
where
    F: FnOnce(&Runner) -> std::io::Result<RunReport>,
{
    let seed = run.seed.unwrap_or_else(rand::random);
    log::info!("Using seed {}", seed);

    let sink: Box<dyn StampSink> = if run.dry_run {
        Box::new(DryRunSink)
    } else {
        Box::new(TextStamper::from_settings(settings).context("Failed to load stamp font")?)
    };
    let metric = PixelDifference::new();

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} folders")?,
    );
    let runner = Runner::new(settings, sink.as_ref(), &metric, seed).with_progress(pb);

    let start = Instant::now();
    let report = f(&runner).with_context(|| format!("Failed to read {:?}", settings.root))?;
    log::info!("Run took {:.2?}", start.elapsed());
    Ok(report)
}

fn finish(root: &Path, run: &RunArgs, report: &RunReport) -> Result<()> {
    if !run.dry_run {
        let records = report.history_records();
        history::append(root, &records).with_context(|| {
            format!("Failed to write history file {:?}", history::history_path(root))
        })?;
    }

    if run.json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    print_summary(report, run.dry_run);
    Ok(())
}

fn print_summary(report: &RunReport, dry_run: bool) {
    for folder in &report.folders {
        if folder.stamps.is_empty() && folder.error.is_none() {
            continue;
        }
        println!("\n✨ {}", folder.folder.display());
        if let Some(error) = &folder.error {
            println!("   ⚠️  skipped: {}", error);
        }
        for stamp in &folder.stamps {
            let name = stamp
                .source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match &stamp.error {
                Some(e) => println!("   ❌ {} failed: {}", name, e),
                None => println!("   📷 {} {} {}", stamp.date, stamp.time, name),
            }
        }
        for path in &folder.skipped {
            println!("   ⏭️  unstamped extra {}", path.display());
        }
    }

    println!(
        "\nStamped {} photo(s), {} failed, {} folder(s) skipped. Seed: {}",
        report.stamped(),
        report.failed(),
        report.failed_folders(),
        report.seed
    );
    if dry_run {
        println!("⚠️  Dry-run only; no files were changed.");
    }
}
