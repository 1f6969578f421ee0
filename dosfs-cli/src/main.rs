//! dosfs CLI - Browse and edit a DOS overlay volume from the command line.
//!
//! Usage:
//!   dosfs --base DIR [--overlay DIR] <command>
//!
//! Examples:
//!   dosfs --base game dir                      # List the root, directories first
//!   dosfs --base game --lfn dir SAVES --json   # Long names, JSON output
//!   dosfs --base game --overlay save del A.TXT # Tombstone A.TXT in the overlay
//!   dosfs --config mount.json attrib X.DAT +H  # Hide a file
//!   dosfs --base game short "Long File.txt"    # Print the 8.3 alias

use std::io::{Read, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, info};

use dosfs_core::{
    DosAttributes, DosError, DosResult, MountConfig, OverlayIndex, SortOrder, WildcardPattern,
};

/// DOS overlay volume CLI
#[derive(Parser, Debug)]
#[command(name = "dosfs")]
#[command(about = "Inspect and modify a DOS volume backed by host directories")]
struct Args {
    /// JSON mount description
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base (read-only) host directory
    #[arg(short, long)]
    base: Option<PathBuf>,

    /// Writable overlay directory
    #[arg(short, long)]
    overlay: Option<PathBuf>,

    /// Accept long names in paths
    #[arg(long)]
    lfn: bool,

    /// Reject every change with "write protected"
    #[arg(long)]
    read_only: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a directory or a wildcard pattern
    Dir {
        path: Option<String>,
        #[arg(short, long, value_enum)]
        sort: Option<SortArg>,
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a file to stdout
    Type { path: String },
    /// Copy a host file into the volume
    Put { host_file: PathBuf, path: String },
    /// Delete a file
    Del { path: String },
    /// Rename or move a file
    Ren { old: String, new: String },
    /// Create a directory
    Md { path: String },
    /// Remove an empty directory
    Rd { path: String },
    /// Show or change attributes, e.g. `attrib FILE +H -A`
    Attrib {
        path: String,
        #[arg(allow_hyphen_values = true)]
        changes: Vec<String>,
    },
    /// Print the short-name form of a path
    Short { path: String },
    /// Print the long-name form of a path
    Long { path: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SortArg {
    Unsorted,
    Name,
    NameReversed,
    DirsFirst,
    DirsFirstReversed,
}

impl From<SortArg> for SortOrder {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Unsorted => SortOrder::Unsorted,
            SortArg::Name => SortOrder::Alphabetical,
            SortArg::NameReversed => SortOrder::AlphabeticalReversed,
            SortArg::DirsFirst => SortOrder::DirectoriesFirst,
            SortArg::DirsFirstReversed => SortOrder::DirectoriesFirstReversed,
        }
    }
}

/// Build the mount from `--config` and the command line overrides.
fn mount_config(args: &Args) -> Result<MountConfig, Box<dyn std::error::Error>> {
    let mut config = match (&args.config, &args.base) {
        (Some(path), _) => MountConfig::load(path)?,
        (None, Some(base)) => MountConfig::new(base),
        (None, None) => return Err("either --config or --base is required".into()),
    };
    if let (Some(_), Some(base)) = (&args.config, &args.base) {
        config.base = base.clone();
    }
    if let Some(overlay) = &args.overlay {
        config.overlay = Some(overlay.clone());
    }
    config.cache.lfn |= args.lfn;
    config.read_only |= args.read_only;
    Ok(config)
}

/// Parse `+R -H ...` into bits to set and bits to clear.
fn parse_changes(changes: &[String]) -> Result<(DosAttributes, DosAttributes), String> {
    let mut set = DosAttributes::empty();
    let mut clear = DosAttributes::empty();
    for change in changes {
        let mut chars = change.chars();
        let (sign, letter) = (chars.next(), chars.next());
        if chars.next().is_some() {
            return Err(format!("bad attribute change {:?}", change));
        }
        let bit = match letter.map(|c| c.to_ascii_uppercase()) {
            Some('R') => DosAttributes::READ_ONLY,
            Some('H') => DosAttributes::HIDDEN,
            Some('S') => DosAttributes::SYSTEM,
            Some('A') => DosAttributes::ARCHIVE,
            _ => return Err(format!("bad attribute change {:?}", change)),
        };
        match sign {
            Some('+') => set |= bit,
            Some('-') => clear |= bit,
            _ => return Err(format!("bad attribute change {:?}", change)),
        }
    }
    Ok((set, clear))
}

/// `DIR` pattern for a path: directories list their contents.
fn dir_pattern(index: &mut OverlayIndex, path: Option<&str>) -> String {
    match path {
        None => "*.*".to_string(),
        Some(path) if !WildcardPattern::is_wildcard(path) && index.test_dir(path) => {
            format!("{}\\*.*", path.trim_end_matches(['\\', '/']))
        }
        Some(path) => path.to_string(),
    }
}

fn run(index: &mut OverlayIndex, command: Command, default_sort: SortOrder) -> DosResult<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match command {
        Command::Dir { path, sort, json } => {
            let pattern = dir_pattern(index, path.as_deref());
            let sort = sort.map_or(default_sort, SortOrder::from);
            let entries = index.list_dir(&pattern, sort)?;
            if json {
                serde_json::to_writer_pretty(&mut out, &entries)?;
                writeln!(out)?;
                return Ok(());
            }
            for entry in &entries {
                let size = if entry.is_dir {
                    "<DIR>".to_string()
                } else {
                    entry.size.to_string()
                };
                writeln!(
                    out,
                    "{:<12} {:>10}  {}  {}",
                    entry.short_name, size, entry.attributes, entry.long_name
                )?;
            }
            writeln!(out, "{:>8} entries", entries.len())?;
        }
        Command::Type { path } => {
            let mut data = Vec::new();
            index.open(&path, false)?.read_to_end(&mut data)?;
            out.write_all(&data)?;
        }
        Command::Put { host_file, path } => {
            let data = std::fs::read(&host_file)?;
            index.create(&path)?.write_all(&data)?;
            info!("copied {} bytes to {}", data.len(), path);
        }
        Command::Del { path } => index.unlink(&path)?,
        Command::Ren { old, new } => index.rename(&old, &new)?,
        Command::Md { path } => index.make_dir(&path)?,
        Command::Rd { path } => index.remove_dir(&path)?,
        Command::Attrib { path, changes } => {
            let current = index.get_attr(&path)?;
            if changes.is_empty() {
                writeln!(out, "{}  {}", current, path)?;
                return Ok(());
            }
            let (set, clear) = parse_changes(&changes).map_err(DosError::AccessDenied)?;
            let attr = (current | set) - clear;
            debug!("attributes of {}: {:?} -> {:?}", path, current, attr);
            index.set_attr(&path, attr)?;
        }
        Command::Short { path } => {
            let short = index
                .cache()
                .short_path(&path)
                .ok_or_else(|| DosError::FileNotFound(path.clone()))?;
            writeln!(out, "{}", short)?;
        }
        Command::Long { path } => {
            let long = index
                .cache()
                .long_path(&path)
                .ok_or_else(|| DosError::FileNotFound(path.clone()))?;
            writeln!(out, "{}", long)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = mount_config(&args)?;
    let default_sort = config.cache.dir_sort;
    let command = args.command;

    // Host I/O is blocking; keep it off the async runtime.
    let result = tokio::task::spawn_blocking(move || {
        let mut index = OverlayIndex::new(&config)?;
        run(&mut index, command, default_sort)
    })
    .await?;

    if let Err(e) = result {
        eprintln!("Error {:02X}: {}", e.dos_code(), e);
        std::process::exit(1);
    }

    Ok(())
}
