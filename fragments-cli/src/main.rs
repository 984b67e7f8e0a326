/*!
Fragments CLI - Command-line interface for the fragments store.

Stores, lists, reads (optionally converted) and deletes fragments for one
owner, against either the in-process store or a local data directory, and
runs the conversion engine directly on local files.
*/

use anyhow::{anyhow, bail, Context};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use fragments_core::{
    config::StorageConfig,
    config::StorageBackend,
    convert, extension_for_mime, mime_for_extension, observability, Fragment, FragmentListing,
    FragmentService, FragmentsError,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "fragments")]
#[command(about = "CLI for the fragments store")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Storage backend (`memory` or `local`); `local` when only a data
    /// directory is given, `memory` otherwise
    #[arg(short, long, global = true, env = "FRAGMENTS_STORAGE")]
    storage: Option<String>,

    /// Data directory for the local backend
    #[arg(short, long, global = true, env = "FRAGMENTS_DATA_DIR")]
    data_dir: Option<String>,

    /// Owner whose fragments are addressed
    #[arg(short, long, global = true, env = "FRAGMENTS_OWNER")]
    owner: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert a local file without storing it
    Convert {
        /// Source type; inferred from the file extension when omitted
        #[arg(long)]
        from: Option<String>,
        /// Target mime type or extension (`html`, `image/png`, ...)
        #[arg(long)]
        to: String,
        file: PathBuf,
        /// Write to a file instead of stdout
        #[arg(short = 'O', long)]
        output: Option<PathBuf>,
    },
    #[command(flatten)]
    Stored(StoredCommands),
}

/// Commands that need a store and an owner.
#[derive(Subcommand, Debug)]
enum StoredCommands {
    /// Store a file as a new fragment
    Create {
        /// Content type; inferred from the file extension when omitted
        #[arg(short = 't', long = "type")]
        content_type: Option<String>,
        file: PathBuf,
    },
    /// List the owner's fragments
    List {
        /// Show full records instead of ids
        #[arg(short, long)]
        expand: bool,
    },
    /// Show the metadata of a fragment
    Info { id: String },
    /// Read a fragment, converted when an extension is given (`<id>.html`)
    Get {
        id: String,
        /// Write to a file instead of stdout
        #[arg(short = 'O', long)]
        output: Option<PathBuf>,
    },
    /// Replace the data of a fragment
    Update {
        id: String,
        /// Content type; must match the fragment's
        #[arg(short = 't', long = "type")]
        content_type: Option<String>,
        file: PathBuf,
    },
    /// Delete a fragment
    Delete {
        id: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Tabled)]
struct FragmentInfo {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Type")]
    content_type: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

impl From<&Fragment> for FragmentInfo {
    fn from(fragment: &Fragment) -> Self {
        Self {
            id: fragment.id().to_string(),
            content_type: fragment.content_type().to_string(),
            size: format_size(fragment.size()),
            created: format_timestamp(fragment.created()),
            updated: format_timestamp(fragment.updated()),
        }
    }
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    run(cli, &mut io::stdout().lock())
}

fn init_logging(verbose: bool, json: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    if let Err(e) = observability::init_observability(json, level) {
        eprintln!("Warning: {e}");
    }
}

fn run(cli: Cli, out: &mut dyn Write) -> Result<(), anyhow::Error> {
    let Cli {
        storage,
        data_dir,
        owner,
        command,
        ..
    } = cli;

    match command {
        Commands::Convert {
            from,
            to,
            file,
            output,
        } => convert_file(from.as_deref(), &to, &file, output.as_deref(), out),
        Commands::Stored(command) => {
            let storage_config = create_storage_config(storage, data_dir)?;
            let service = FragmentService::from_config(&storage_config)?;
            let owner = owner
                .ok_or_else(|| anyhow!("An owner is required (use --owner or FRAGMENTS_OWNER)"))?;
            run_stored(command, &service, &owner, out)
        }
    }
}

/// Commands that operate on stored fragments.
fn run_stored(
    command: StoredCommands,
    service: &FragmentService,
    owner: &str,
    out: &mut dyn Write,
) -> Result<(), anyhow::Error> {
    match command {
        StoredCommands::Create { content_type, file } => {
            let content_type = resolve_type(content_type, &file)?;
            let data = read_file(&file)?;
            let fragment = service.create(owner, &content_type, data)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&fragment)?)?;
        }
        StoredCommands::List { expand } => match service.list(owner, expand)? {
            FragmentListing::Ids(ids) if ids.is_empty() => writeln!(out, "No fragments found")?,
            FragmentListing::Ids(ids) => {
                for id in ids {
                    writeln!(out, "{id}")?;
                }
            }
            FragmentListing::Expanded(fragments) if fragments.is_empty() => {
                writeln!(out, "No fragments found")?
            }
            FragmentListing::Expanded(fragments) => {
                let rows: Vec<FragmentInfo> = fragments.iter().map(FragmentInfo::from).collect();
                writeln!(out, "{}", Table::new(rows))?;
            }
        },
        StoredCommands::Info { id } => {
            let fragment = service.info(owner, &id)?;
            writeln!(out, "Fragment Details:")?;
            writeln!(out, "  ID: {}", fragment.id())?;
            writeln!(out, "  Owner: {}", fragment.owner_id())?;
            writeln!(out, "  Type: {}", fragment.content_type())?;
            writeln!(out, "  Size: {}", format_size(fragment.size()))?;
            writeln!(out, "  Created: {}", format_timestamp(fragment.created()))?;
            writeln!(out, "  Updated: {}", format_timestamp(fragment.updated()))?;
            writeln!(out, "  Convertible to: {}", conversion_targets(fragment.mime_type()))?;
        }
        StoredCommands::Get { id, output } => {
            let rendered = service.read(owner, &id)?;
            info!(content_type = %rendered.content_type, size = rendered.data.len(), "Fragment read");
            write_output(&rendered.data, output.as_deref(), out)?;
        }
        StoredCommands::Update {
            id,
            content_type,
            file,
        } => {
            let content_type = match content_type {
                Some(t) => t,
                None => service.info(owner, &id)?.content_type().to_string(),
            };
            let data = read_file(&file)?;
            let fragment = service.update(owner, &id, &content_type, data)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&fragment)?)?;
        }
        StoredCommands::Delete { id, force } => {
            if !force && !confirm(&format!("Are you sure you want to delete fragment '{id}'?"))? {
                writeln!(out, "Deletion cancelled")?;
                return Ok(());
            }
            service.delete(owner, &id)?;
            writeln!(out, "✓ Fragment deleted successfully")?;
        }
    }

    Ok(())
}

/// Same resolution as `StorageConfig::from_env`; clap has already folded
/// the environment variables into the flags.
fn create_storage_config(
    storage: Option<String>,
    data_dir: Option<String>,
) -> Result<StorageConfig, anyhow::Error> {
    let config = StorageConfig::resolve(storage, data_dir)?;
    if config.backend == StorageBackend::Memory {
        warn!("Memory storage does not outlive this process; pass --data-dir to keep fragments");
    }
    info!(backend = %config.backend, "Storage configured");
    Ok(config)
}

/// Extensions a fragment of `mime` can be read as, e.g. `.md (text/markdown)`.
fn conversion_targets(mime: &str) -> String {
    convert::targets_for(mime)
        .into_iter()
        .map(|target| match extension_for_mime(target) {
            Some(ext) => format!(".{ext} ({target})"),
            None => target.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn convert_file(
    from: Option<&str>,
    to: &str,
    file: &Path,
    output: Option<&Path>,
    out: &mut dyn Write,
) -> Result<(), anyhow::Error> {
    let from = resolve_type(from.map(str::to_string), file)?;
    let to = if to.contains('/') {
        to.to_string()
    } else {
        mime_for_extension(to.trim_start_matches('.'))
            .ok_or_else(|| FragmentsError::unsupported_conversion(&from, to))?
            .to_string()
    };

    let data = read_file(file)?;
    let (converted, mime) = convert::convert(&from, data, &to)?.into_result()?;
    info!(from = %from, to = mime, size = converted.len(), "Converted file");
    write_output(&converted, output, out)
}

/// Explicit type if given, otherwise the one named by the file extension.
fn resolve_type(explicit: Option<String>, file: &Path) -> Result<String, anyhow::Error> {
    if let Some(content_type) = explicit {
        return Ok(content_type);
    }
    file.extension()
        .and_then(|ext| ext.to_str())
        .and_then(mime_for_extension)
        .map(str::to_string)
        .ok_or_else(|| {
            anyhow!(
                "Cannot infer a content type from {}; pass --type",
                file.display()
            )
        })
}

fn read_file(path: &Path) -> Result<Bytes, anyhow::Error> {
    let data =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(Bytes::from(data))
}

fn write_output(data: &[u8], output: Option<&Path>, out: &mut dyn Write) -> Result<(), anyhow::Error> {
    match output {
        Some(path) => {
            std::fs::write(path, data)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), size = data.len(), "Output written");
        }
        None => {
            out.write_all(data)?;
            out.flush()?;
        }
    }
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool, anyhow::Error> {
    print!("{prompt} (y/N): ");
    io::stdout().flush()?;

    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        bail!("No confirmation received; pass --force to delete without prompting");
    }
    Ok(input.trim().to_lowercase().starts_with('y'))
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_timestamp(timestamp: chrono::DateTime<chrono::Utc>) -> String {
    timestamp
        .with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
