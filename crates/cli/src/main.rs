use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

use jobs::{BatchLoader, JobStatus};
use project::{
    load_timeline, save_timeline, validate_stored, FsAssetChecker, LoadOptions, LoaderContext,
    PersistenceStore, ProjectDb,
};
use schema::{encode, migrate};
use timeline::Timeline;

#[derive(Parser)]
#[command(name = "timeline-cli")]
#[command(about = "Inspect, migrate and load stored timelines")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Timeline database (defaults to the per-user data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Store an empty timeline under a key
    New {
        /// Asset key
        key: String,

        /// Frame rate
        #[arg(long, default_value = "30")]
        fps: f64,
    },

    /// Store a timeline document exactly as it appears on disk
    Import {
        /// Asset key
        key: String,

        /// JSON document to import
        file: PathBuf,
    },

    /// Load a stored timeline and print the loading report
    Load {
        /// Asset key
        key: String,

        /// Fail on the first invalid clip instead of skipping it
        #[arg(long)]
        strict: bool,

        /// Skip the asset existence check
        #[arg(long)]
        no_asset_check: bool,

        /// Check assets against the filesystem instead of the asset table
        #[arg(long)]
        fs_assets: bool,

        /// Base directory for relative asset paths (with --fs-assets)
        #[arg(long)]
        asset_base: Option<PathBuf>,

        /// Write the loaded timeline as a current-version document
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a stored document without loading it
    Validate {
        /// Asset key
        key: String,
    },

    /// Migrate a document file to the current schema
    Migrate {
        /// JSON document to migrate
        file: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load several timelines in parallel
    BatchLoad {
        /// Asset keys (every stored key if omitted)
        keys: Vec<String>,

        /// Worker threads
        #[arg(short, long, default_value = "4")]
        workers: usize,

        /// Fail each timeline on its first invalid clip
        #[arg(long)]
        strict: bool,
    },

    /// Record a media asset and its duration
    RegisterAsset {
        /// Asset path
        path: String,

        /// Duration in seconds
        #[arg(short, long)]
        duration: Option<f64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let db_path = cli.db.unwrap_or_else(project::default_db_path);

    match cli.command {
        Commands::New { key, fps } => new_command(&db_path, &key, fps),
        Commands::Import { key, file } => import_command(&db_path, &key, &file),
        Commands::Load {
            key,
            strict,
            no_asset_check,
            fs_assets,
            asset_base,
            output,
        } => {
            let mut options = if strict {
                LoadOptions::strict()
            } else {
                LoadOptions::default()
            };
            options.validate_assets = !no_asset_check;
            let assets = fs_assets.then(|| match asset_base {
                Some(base) => FsAssetChecker::with_base(base),
                None => FsAssetChecker::new(),
            });
            load_command(&db_path, &key, options, assets, output.as_deref())
        }
        Commands::Validate { key } => validate_command(&db_path, &key),
        Commands::Migrate { file, output } => migrate_command(&file, output.as_deref()),
        Commands::BatchLoad {
            keys,
            workers,
            strict,
        } => batch_load_command(&db_path, keys, workers, strict),
        Commands::RegisterAsset { path, duration } => {
            register_asset_command(&db_path, &path, duration)
        }
    }
}

fn open_db(path: &Path) -> Result<Arc<ProjectDb>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let db = ProjectDb::open_or_create(path)
        .with_context(|| format!("opening database {}", path.display()))?;
    Ok(Arc::new(db))
}

fn context(db: Arc<ProjectDb>) -> LoaderContext {
    LoaderContext::new(db.clone())
        .with_asset_checker(db.clone())
        .with_duration_lookup(db)
}

fn read_json(file: &Path) -> Result<serde_json::Value> {
    let text =
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", file.display()))
}

fn write_or_print(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}

fn new_command(db_path: &Path, key: &str, fps: f64) -> Result<()> {
    let timeline = Timeline::new(fps).context("invalid frame rate")?;
    let ctx = context(open_db(db_path)?);
    if ctx.store().load_raw(key)?.is_some() {
        bail!("a timeline is already stored under {key}");
    }
    save_timeline(&ctx, key, &timeline)?;
    info!("Created timeline {} at {} fps", key, timeline.frame_rate());
    Ok(())
}

fn import_command(db_path: &Path, key: &str, file: &Path) -> Result<()> {
    let raw = read_json(file)?;
    let db = open_db(db_path)?;
    db.save_raw(key, &raw)?;
    info!("Imported {} as {}", file.display(), key);
    Ok(())
}

fn load_command(
    db_path: &Path,
    key: &str,
    options: LoadOptions,
    fs_assets: Option<FsAssetChecker>,
    output: Option<&Path>,
) -> Result<()> {
    let db = open_db(db_path)?;
    let mut ctx = context(db);
    if let Some(checker) = fs_assets {
        ctx = ctx.with_asset_checker(Arc::new(checker));
    }

    let outcome =
        load_timeline(&ctx, key, options).with_context(|| format!("loading timeline {key}"))?;
    let report = &outcome.report;
    info!(
        "Loaded {}/{} clips ({:.1}%) in {:.1} ms",
        report.loaded_clips,
        report.total_clips,
        report.success_rate(),
        report.elapsed_ms
    );
    for issue in &report.issues {
        warn!("[{}] {}", issue.kind, issue.message);
    }
    println!("{}", serde_json::to_string_pretty(report)?);

    if let Some(path) = output {
        let document = encode(&outcome.timeline, Utc::now());
        write_or_print(&document.to_json_pretty()?, Some(path))?;
    }
    Ok(())
}

fn validate_command(db_path: &Path, key: &str) -> Result<()> {
    let ctx = context(open_db(db_path)?);
    let Some(validation) = validate_stored(&ctx, key)? else {
        bail!("no timeline stored under {key}");
    };
    println!("{}", serde_json::to_string_pretty(&validation)?);
    if !validation.overall_valid {
        warn!("{} is not valid", key);
    }
    Ok(())
}

fn migrate_command(file: &Path, output: Option<&Path>) -> Result<()> {
    let raw = read_json(file)?;
    let migration =
        migrate(raw, Utc::now()).with_context(|| format!("migrating {}", file.display()))?;
    match migration.migrated_from() {
        Some(from) => info!("Migrated {} from {}", file.display(), from.as_str()),
        None => info!("{} needs no migration", file.display()),
    }
    for warning in &migration.warnings {
        warn!("{}", warning);
    }
    write_or_print(
        &serde_json::to_string_pretty(&migration.document)?,
        output,
    )
}

fn batch_load_command(db_path: &Path, keys: Vec<String>, workers: usize, strict: bool) -> Result<()> {
    let db = open_db(db_path)?;
    let keys = if keys.is_empty() {
        db.list_timeline_keys()?
    } else {
        keys
    };
    if keys.is_empty() {
        warn!("No timelines to load");
        return Ok(());
    }

    let options = if strict {
        LoadOptions::strict()
    } else {
        LoadOptions::default()
    };
    let loader = BatchLoader::new(context(db), options, workers);
    let batch = loader.load_all_with(&keys, |event| match &event.status {
        JobStatus::Failed(reason) => warn!("{}: {}", event.key, reason),
        JobStatus::Done { clips } => info!("{}: {} clips", event.key, clips),
        _ => {}
    });

    info!(
        "Loaded {}/{} timelines ({:.1}%)",
        batch.summary.successfully_loaded,
        batch.summary.total_requested,
        batch.summary.success_rate()
    );
    println!("{}", serde_json::to_string_pretty(&batch.summary)?);
    Ok(())
}

fn register_asset_command(db_path: &Path, path: &str, duration: Option<f64>) -> Result<()> {
    if let Some(d) = duration {
        if !d.is_finite() || d < 0.0 {
            bail!("duration must be a non-negative number of seconds");
        }
    }
    let db = open_db(db_path)?;
    db.upsert_asset(path, duration)?;
    info!("Registered {}", path);
    Ok(())
}
