//! medley - scan music folders into a track catalog.
//!
//! Usage:
//!   medley scan full                 Re-read every collection folder
//!   medley scan update [DIR]         Rescan changed directories
//!   medley scan import FILE          Commit a saved scanner stream
//!   medley folders list|set DIR...   Show or change the collection folders
//!   medley devices                   List known devices
//!   medley tracks                    List catalogued tracks

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result, bail, eyre};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use medley_core::{MemoryCatalog, NoopPlaylistImporter, ScannerConfig};
use medley_devices::{DeviceDescriptor, DeviceResolver, DeviceTable};
use medley_scan::{ImportSource, ScanEvent, ScanManager};

#[derive(Parser)]
#[command(
    name = "medley",
    version,
    about = "Music collection scanner and catalog indexer"
)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the catalog and device table
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Scanner executable, overriding the config file
    #[arg(long, global = true)]
    scanner: Option<PathBuf>,

    /// Treat a volume as mounted for this run, as UUID=MOUNT_PATH
    #[arg(long = "mount", value_name = "UUID=PATH", global = true)]
    mounts: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a collection scan
    Scan {
        #[command(subcommand)]
        kind: ScanKind,
    },

    /// Show or change the collection folders
    Folders {
        #[command(subcommand)]
        action: FolderAction,
    },

    /// List every device the collection has seen
    Devices,

    /// List catalogued tracks
    Tracks,
}

#[derive(Subcommand)]
enum ScanKind {
    /// Re-read every file of the collection
    Full,
    /// Rescan the collection, or one directory of it, skipping unchanged directories
    Update {
        /// Directory inside the collection
        directory: Option<PathBuf>,
    },
    /// Commit a saved scanner stream instead of scanning
    Import {
        /// File holding the stream
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum FolderAction {
    /// Show the collection folders
    List,
    /// Replace the collection folders
    Set {
        #[arg(required = true)]
        folders: Vec<PathBuf>,
    },
}

/// Catalog and device table locations.
struct Store {
    catalog: PathBuf,
    devices: PathBuf,
}

impl Store {
    fn new(data_dir: Option<PathBuf>) -> Result<Self> {
        let dir = data_dir
            .or_else(|| dirs::data_dir().map(|d| d.join("medley")))
            .ok_or_else(|| eyre!("No data directory, pass --data-dir"))?;
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create data directory {}", dir.display()))?;
        Ok(Self {
            catalog: dir.join("catalog.json"),
            devices: dir.join("devices.json"),
        })
    }

    fn resolver(&self, mounts: &[String]) -> Result<Arc<DeviceResolver>> {
        let table = DeviceTable::open(&self.devices).context("Cannot open device table")?;
        let resolver = Arc::new(DeviceResolver::new(Arc::new(table)));
        for mount in mounts {
            let (uuid, path) = mount
                .split_once('=')
                .ok_or_else(|| eyre!("Invalid --mount {mount:?}, expected UUID=PATH"))?;
            let descriptor = DeviceDescriptor::volume(uuid, uuid, path);
            match resolver.on_device_appeared(&descriptor) {
                Some(id) => debug!(%id, uuid, path, "Volume mounted"),
                None => bail!("Cannot register volume {uuid}"),
            }
        }
        Ok(resolver)
    }

    fn catalog(&self) -> Result<MemoryCatalog> {
        MemoryCatalog::load_or_default(&self.catalog).context("Cannot load catalog")
    }
}

fn load_config(path: Option<&Path>) -> Result<ScannerConfig> {
    let config = match path {
        Some(path) => ScannerConfig::load(path)?,
        None => ScannerConfig::load_default()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env("MEDLEY_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let store = Store::new(cli.data_dir)?;

    match cli.command {
        Command::Scan { kind } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(scanner) = cli.scanner {
                config.scanner_path = scanner;
            }
            run_scan(&store, &cli.mounts, config, kind).await?;
        }
        Command::Folders { action } => run_folders(&store, &cli.mounts, action)?,
        Command::Devices => run_devices(&store, &cli.mounts)?,
        Command::Tracks => run_tracks(&store)?,
    }

    Ok(())
}

/// Run one scan and wait for it to end.
async fn run_scan(store: &Store, mounts: &[String], mut config: ScannerConfig, kind: ScanKind) -> Result<()> {
    let resolver = store.resolver(mounts)?;
    if resolver.collection_folders().is_empty() && !matches!(kind, ScanKind::Import { .. }) {
        bail!("No collection folders configured, run `medley folders set DIR...`");
    }

    let catalog = Arc::new(store.catalog()?);
    // one-shot runs neither watch folders nor wait for the version check
    config.monitor_changes = false;
    config.check_version = false;
    if let Ok(version) = medley_scan::worker_version(&config.scanner_path).await {
        if version != medley_core::VERSION {
            eprintln!(
                "Warning: scanner version {version} does not match medley {}",
                medley_core::VERSION
            );
        }
    }

    let manager = ScanManager::new(
        config,
        catalog.clone(),
        resolver,
        Arc::new(NoopPlaylistImporter),
    );
    let mut events = manager.subscribe();

    match kind {
        ScanKind::Full => manager.request_full_scan(),
        ScanKind::Update { directory } => {
            manager.request_incremental_scan(directory.as_deref());
            if !manager.is_running() {
                bail!("Nothing to scan: the directory is not inside the collection");
            }
        }
        ScanKind::Import { file } => manager.request_import(ImportSource::File(file)),
    }

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                bail!("Scan manager stopped unexpectedly")
            }
        };
        match event {
            ScanEvent::Started {
                scan_type,
                directories,
            } => {
                eprintln!("Starting {scan_type} scan of {} folder(s)", directories.len());
            }
            ScanEvent::ImportStarted => eprintln!("Importing scanner stream..."),
            ScanEvent::Progress(progress) => match progress.fraction() {
                Some(fraction) => eprint!(
                    "\r{:>5.1}% {}",
                    fraction * 100.0,
                    progress.current_path.display()
                ),
                None => eprint!(
                    "\r{} directories {}",
                    progress.directories_received,
                    progress.current_path.display()
                ),
            },
            ScanEvent::Restarting { attempt } => {
                eprintln!("\nScanner crashed, restarting (attempt {attempt})");
            }
            ScanEvent::VersionMismatch { expected, found } => {
                eprintln!("Warning: scanner version {found} does not match medley {expected}");
            }
            ScanEvent::Finished {
                scan_type,
                summary,
                elapsed,
            } => {
                eprintln!();
                println!("{scan_type} scan finished in {:.2}s", elapsed.as_secs_f64());
                println!(
                    " {} directories ({} unchanged), {} tracks stored",
                    summary.directories, summary.skipped, summary.tracks_upserted
                );
                println!(
                    " {} tracks and {} directories removed",
                    summary.tracks_deleted, summary.directories_deleted
                );
                for error in &summary.errors {
                    println!(" warning: {error}");
                }
                break;
            }
            ScanEvent::Aborted { reason } => {
                eprintln!();
                println!("Scan aborted: {reason}");
                break;
            }
            ScanEvent::Failed { message } => {
                eprintln!();
                bail!("Scan failed: {message}");
            }
        }
    }

    catalog.save(&store.catalog).context("Cannot save catalog")?;
    info!(path = %store.catalog.display(), "Catalog saved");
    Ok(())
}

fn run_folders(store: &Store, mounts: &[String], action: FolderAction) -> Result<()> {
    let resolver = store.resolver(mounts)?;
    match action {
        FolderAction::List => {
            for folder in resolver.collection_folders() {
                println!("{}", folder.display());
            }
        }
        FolderAction::Set { folders } => {
            let folders = folders
                .iter()
                .map(|f| std::path::absolute(f).with_context(|| format!("Invalid folder {}", f.display())))
                .collect::<Result<Vec<_>>>()?;
            resolver
                .set_collection_folders(&folders)
                .context("Cannot save collection folders")?;
            println!("{} collection folder(s) set", folders.len());
        }
    }
    Ok(())
}

fn run_devices(store: &Store, mounts: &[String]) -> Result<()> {
    let resolver = store.resolver(mounts)?;
    let devices = resolver.devices();
    if devices.is_empty() {
        println!("No devices known");
        return Ok(());
    }
    for status in devices {
        let record = &status.record;
        let location = match &status.mount_path {
            Some(path) => format!("mounted at {}", path.display()),
            None => match &record.last_mount_point {
                Some(path) => format!("offline, last at {}", path.display()),
                None => "offline".to_string(),
            },
        };
        println!(
            "{:>4}  {:<12} {:<24} {}  (seen {})",
            record.id,
            record.kind,
            record.label.as_deref().unwrap_or(&record.identity),
            location,
            record.last_seen.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

fn run_tracks(store: &Store) -> Result<()> {
    let catalog = store.catalog()?;
    let mut tracks = catalog.tracks();
    tracks.sort_by(|a, b| a.record.path.cmp(&b.record.path));
    for track in &tracks {
        let record = &track.record;
        println!(
            "{}  {} - {}",
            record.path.display(),
            record.artist.as_deref().unwrap_or("?"),
            record.title.as_deref().unwrap_or("?")
        );
    }
    println!(
        "{} tracks in {} directories",
        tracks.len(),
        catalog.directory_count()
    );
    Ok(())
}
