/*!
Snapgraph CLI - command-line tools for hierarchy snapshots.

Inspects, verifies and converts snapshot files without needing the host
application that wrote them, and shows where a named snapshot would be stored.
*/

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use snapgraph_core::{
    container::{COMPONENTS_SECTION, OBJECT_FIELD, PARENT_FIELD, TEMPLATES_SECTION, TEMPLATE_NAME_FIELD},
    create_codec_from_config, Container, Entry, FieldValue, GzipCompressor, LocalFileStorage,
    Reference, SnapshotConfig, SnapshotFormat, SnapshotReport, StorageAdapter,
};
use std::path::PathBuf;
use tabled::{Table, Tabled};
use tracing::{debug, error, info};

#[derive(Parser)]
#[command(name = "snapgraph")]
#[command(about = "Inspect, verify and convert hierarchy snapshots")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Snapshot format of the input (binary, text, compressed); detected from content if omitted
    #[arg(short, long, global = true)]
    format: Option<SnapshotFormat>,

    /// Storage directory bare file names are resolved against
    #[arg(short, long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the template and component entries of a snapshot
    Inspect {
        /// Snapshot file
        file: String,
        /// Show the fields of each component entry
        #[arg(short, long)]
        detailed: bool,
    },
    /// Decode a snapshot and check its section framing
    Verify {
        /// Snapshot file
        file: String,
    },
    /// Re-encode a snapshot in another format
    Convert {
        /// Snapshot file to read
        input: String,
        /// Snapshot file to write
        output: String,
        /// Target format
        #[arg(long)]
        to: SnapshotFormat,
    },
    /// Show the file a named snapshot is stored at
    Path {
        /// Snapshot name
        name: String,
    },
}

#[derive(Tabled)]
struct EntryInfo {
    #[tabled(rename = "Section")]
    section: String,
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    type_name: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Fields")]
    fields: String,
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let mut config = SnapshotConfig::from_env().context("invalid SNAPGRAPH_* environment")?;
    if let Some(dir) = &cli.dir {
        config.storage_dir = Some(dir.clone());
    }
    if let Some(format) = cli.format {
        config.format = format;
    }
    config.validate()?;

    match &cli.command {
        Commands::Inspect { file, detailed } => inspect_snapshot(&cli, &config, file, *detailed)?,
        Commands::Verify { file } => verify_snapshot(&cli, &config, file)?,
        Commands::Convert { input, output, to } => {
            convert_snapshot(&cli, &config, input, output, *to)?
        }
        Commands::Path { name } => show_path(&config, name)?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"))
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn storage(config: &SnapshotConfig) -> LocalFileStorage {
    match &config.storage_dir {
        Some(dir) => LocalFileStorage::with_base_dir(dir),
        None => LocalFileStorage::new(),
    }
}

/// Guess the format from the leading bytes.
fn detect_format(bytes: &[u8]) -> SnapshotFormat {
    if bytes.starts_with(&[0x1f, 0x8b]) {
        SnapshotFormat::CompressedBinary
    } else if bytes.starts_with(&snapgraph_core::format::MAGIC_BYTES) {
        SnapshotFormat::Binary
    } else {
        SnapshotFormat::Text
    }
}

/// Read and decode a snapshot file, returning the raw bytes, format and document.
fn read_snapshot(
    cli: &Cli,
    config: &SnapshotConfig,
    file: &str,
) -> Result<(Vec<u8>, SnapshotFormat, Container), anyhow::Error> {
    let storage = storage(config);
    let bytes = storage
        .load(file)
        .with_context(|| format!("cannot read {}", storage.locate(file).display()))?;
    let format = cli.format.unwrap_or_else(|| detect_format(&bytes));
    debug!(file, format = %format, size = bytes.len(), "decoding snapshot");

    let container = format
        .decode(&bytes, &GzipCompressor::with_level(config.compression_level))
        .with_context(|| format!("{file} is not a valid {format} snapshot"))?;
    Ok((bytes, format, container))
}

fn inspect_snapshot(
    cli: &Cli,
    config: &SnapshotConfig,
    file: &str,
    detailed: bool,
) -> Result<(), anyhow::Error> {
    let (bytes, format, container) = read_snapshot(cli, config, file)?;

    println!("Snapshot: {file}");
    println!("  Format: {format}");
    println!("  Size: {}", format_size(bytes.len() as u64));
    println!("  Content Hash: {}", SnapshotReport::compute_hash(&bytes));

    let mut rows = Vec::new();
    for section in &container.sections {
        for (position, entry) in section.entries.iter().enumerate() {
            rows.push(describe_entry(&section.name, position, entry, detailed));
        }
    }

    if rows.is_empty() {
        println!("No entries found");
    } else {
        println!("{}", Table::new(rows));
    }
    Ok(())
}

fn describe_entry(section: &str, position: usize, entry: &Entry, detailed: bool) -> EntryInfo {
    let (name, type_name, address) = if section == TEMPLATES_SECTION {
        let template = match entry.field(TEMPLATE_NAME_FIELD) {
            Some(FieldValue::Data(serde_json::Value::String(name))) => name.clone(),
            _ => "?".to_string(),
        };
        let parent = match entry.field(PARENT_FIELD) {
            Some(FieldValue::Ref(reference)) => format_reference(reference),
            _ => "?".to_string(),
        };
        (template, "template".to_string(), parent)
    } else {
        let (name, type_name) = entry
            .tag
            .as_ref()
            .map(|tag| (tag.name.clone(), tag.type_name.clone()))
            .unwrap_or_default();
        let address = match entry.field(OBJECT_FIELD) {
            Some(FieldValue::Weak(weak)) => format_reference(&weak.address),
            _ => "?".to_string(),
        };
        (name, type_name, address)
    };

    let body = entry.fields.iter().filter(|field| field.name != OBJECT_FIELD);
    let fields = if detailed {
        body.map(|field| format!("{}={}", field.name, format_value(&field.value)))
            .collect::<Vec<_>>()
            .join(", ")
    } else {
        body.count().to_string()
    };

    EntryInfo {
        section: section.to_string(),
        position,
        name,
        type_name,
        address,
        fields,
    }
}

fn format_reference(reference: &Reference) -> String {
    match reference {
        Reference::Null => "null".to_string(),
        Reference::Index(index) => format!("#{index}"),
        Reference::Path(path) => path.clone(),
    }
}

fn format_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Data(data) => data.to_string(),
        FieldValue::Ref(reference) => format_reference(reference),
        FieldValue::Refs(references) => format!(
            "[{}]",
            references
                .iter()
                .map(format_reference)
                .collect::<Vec<_>>()
                .join(", ")
        ),
        FieldValue::Weak(weak) => format!("{}@{}", weak.type_name, format_reference(&weak.address)),
        FieldValue::Nested(fields) => format!(
            "{{{}}}",
            fields
                .iter()
                .map(|field| format!("{}={}", field.name, format_value(&field.value)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        FieldValue::Packed(bytes) => format!("<packed {}>", format_size(bytes.len() as u64)),
    }
}

/// Framing problems found in a decoded snapshot.
fn check_framing(container: &Container) -> Vec<String> {
    let mut problems = Vec::new();
    let names: Vec<&str> = container
        .sections
        .iter()
        .map(|section| section.name.as_str())
        .collect();
    if names != [TEMPLATES_SECTION, COMPONENTS_SECTION] {
        problems.push(format!(
            "expected sections [{TEMPLATES_SECTION}, {COMPONENTS_SECTION}], found {names:?}"
        ));
    }

    if let Some(section) = container.section(TEMPLATES_SECTION) {
        for (position, entry) in section.entries.iter().enumerate() {
            if !matches!(
                entry.field(TEMPLATE_NAME_FIELD),
                Some(FieldValue::Data(serde_json::Value::String(_)))
            ) {
                problems.push(format!("template entry {position} has no template name"));
            }
            if !matches!(entry.field(PARENT_FIELD), Some(FieldValue::Ref(_))) {
                problems.push(format!("template entry {position} has no parent reference"));
            }
        }
    }
    if let Some(section) = container.section(COMPONENTS_SECTION) {
        for (position, entry) in section.entries.iter().enumerate() {
            if entry.tag.is_none() {
                problems.push(format!("component entry {position} is untagged"));
            }
            if !matches!(entry.field(OBJECT_FIELD), Some(FieldValue::Weak(_))) {
                problems.push(format!("component entry {position} has no object reference"));
            }
        }
    }
    problems
}

fn verify_snapshot(cli: &Cli, config: &SnapshotConfig, file: &str) -> Result<(), anyhow::Error> {
    info!("Verifying snapshot: {}", file);

    let (_, format, container) = read_snapshot(cli, config, file)?;
    let problems = check_framing(&container);
    if problems.is_empty() {
        println!(
            "✓ {format} snapshot is valid ({} entries)",
            container.entry_count()
        );
        Ok(())
    } else {
        for problem in &problems {
            error!("✗ {}", problem);
        }
        bail!("{} framing problem(s) in {file}", problems.len())
    }
}

fn convert_snapshot(
    cli: &Cli,
    config: &SnapshotConfig,
    input: &str,
    output: &str,
    to: SnapshotFormat,
) -> Result<(), anyhow::Error> {
    let (_, from, mut container) = read_snapshot(cli, config, input)?;
    container.encoding = to.encoding();

    let bytes = to.encode(&container, &GzipCompressor::with_level(config.compression_level))?;
    let storage = storage(config);
    storage.save(&bytes, output)?;

    println!(
        "✓ Converted {input} ({from}) to {} ({to}, {})",
        storage.locate(output).display(),
        format_size(bytes.len() as u64)
    );
    Ok(())
}

fn show_path(config: &SnapshotConfig, name: &str) -> Result<(), anyhow::Error> {
    let codec = create_codec_from_config(config.clone())?;
    println!("{}", codec.get_filename(name, config.format).display());
    Ok(())
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
