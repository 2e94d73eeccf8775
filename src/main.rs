//! mftscope CLI
//!
//! Command-line interface over the MFT decoder: entry dumps, path
//! resolution, directory listings and resident-file carving.

use clap::{Parser, Subcommand};
use console::style;
use indicatif::HumanDuration;
use mftscope::logging::{self, LogLevel};
use mftscope::ntfs::structs::file_attributes;
use mftscope::{
    format_size, query, AttributeBody, DataAttribute, Entry, FileName, ImageScanner, MftImage, NamespaceIndex, ScanConfig,
    ScanReport, TreeNode,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// mftscope - NTFS Master File Table image decoder
///
/// Decodes every record of a raw MFT image, rebuilds the directory
/// namespace and carves resident file content.
#[derive(Parser)]
#[command(name = "mftscope")]
#[command(author = "mftscope Contributors")]
#[command(version)]
#[command(about = "NTFS MFT image decoder", long_about = None)]
struct Cli {
    /// Raw MFT image (or partition image) to read
    image: PathBuf,

    /// Log verbosity (RUST_LOG overrides)
    #[arg(long, value_enum, default_value_t = LogLevel::Warn, global = true)]
    log_level: LogLevel,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Decode records in parallel
    #[arg(long, global = true)]
    parallel: bool,

    /// Entry number of the namespace root
    #[arg(long, default_value_t = 5, global = true)]
    root: u64,

    /// Skip records not marked in use
    #[arg(long, global = true)]
    in_use_only: bool,

    /// Show a progress bar while scanning
    #[arg(long, global = true)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump decoded entries
    Entries {
        /// Only entries with a file name containing this text
        #[arg(short, long)]
        name: Option<String>,

        /// Only the entry with this number
        #[arg(long)]
        number: Option<u64>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Resolve the full path of a file name
    Path {
        /// Exact file name (case-sensitive)
        name: String,
    },

    /// List a directory's children (root when omitted)
    Ls {
        /// Directory name (use -- before names starting with -)
        #[arg(allow_hyphen_values = true)]
        name: Option<String>,
    },

    /// Print the directory tree
    Tree {
        /// Directory to start from (root when omitted)
        name: Option<String>,

        /// Levels to expand
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Find every path ending in a file name
    Find {
        /// Exact file name (case-sensitive)
        name: String,
    },

    /// Write an entry's resident $DATA to a file
    Carve {
        /// Entry number to carve
        number: u64,

        /// Directory to write into
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Show scan and namespace statistics
    Stats {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.log_level, cli.log_file.as_deref()) {
        eprintln!("{} {}", style("Warning:").yellow().bold(), e);
    }
    tracing::info!(version = mftscope::VERSION, image = %cli.image.display(), "mftscope starting up");

    let config = ScanConfig {
        parallel: cli.parallel,
        root_entry: cli.root,
        in_use_only: cli.in_use_only,
        show_progress: cli.progress,
    };

    let result = match cli.command {
        Commands::Entries { name, number, json } => {
            cmd_entries(&cli.image, &config, name.as_deref(), number, json)
        }
        Commands::Path { name } => cmd_path(&cli.image, &config, &name),
        Commands::Ls { name } => cmd_ls(&cli.image, &config, name.as_deref()),
        Commands::Tree { name, depth } => cmd_tree(&cli.image, &config, name.as_deref(), depth),
        Commands::Find { name } => cmd_find(&cli.image, &config, &name),
        Commands::Carve { number, output } => cmd_carve(&cli.image, &config, number, &output),
        Commands::Stats { json } => cmd_stats(&cli.image, &config, json),
    };

    if let Err(e) = result {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

fn scan<'i>(image: &'i MftImage, config: &ScanConfig) -> ScanReport<'i> {
    let report = ImageScanner::new(image).with_config(config.clone()).scan();

    if report.no_entries_found() {
        eprintln!("{} no entries found", style("→").cyan().bold());
    }
    if !report.issues.is_empty() {
        eprintln!(
            "{} skipped {} malformed records and {} malformed attribute chains",
            style("Warning:").yellow().bold(),
            report.malformed_records(),
            report.malformed_attributes()
        );
    }
    if report.cancelled {
        eprintln!("{} scan was cancelled, results are partial", style("Warning:").yellow().bold());
    }
    report
}

fn index_for(report: &ScanReport<'_>, config: &ScanConfig) -> NamespaceIndex {
    NamespaceIndex::build(&report.entries).with_root(config.root_entry)
}

fn not_found(what: &str, name: &str) {
    println!("{} {} '{}' not found", style("✗").red(), what, style(name).yellow());
}

/// Label/value pairs describing an attribute body
fn describe_body(body: &AttributeBody<'_>) -> Vec<(&'static str, String)> {
    fn or_err<T>(r: &Result<T, mftscope::DecodeError>, f: impl FnOnce(&T) -> Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        match r {
            Ok(v) => f(v),
            Err(e) => vec![("error", e.to_string())],
        }
    }

    match body {
        AttributeBody::StandardInformation(si) => or_err(si, |si| {
            let mut out = vec![
                ("created", si.created.to_string()),
                ("modified", si.modified.to_string()),
                ("mft modified", si.mft_modified.to_string()),
                ("accessed", si.accessed.to_string()),
                ("attributes", file_attributes::describe(si.file_attributes).join(", ")),
                ("max versions", si.max_versions.to_string()),
                ("version", si.version.to_string()),
                ("class id", si.class_id.to_string()),
            ];
            if let (Some(owner), Some(security)) = (si.owner_id, si.security_id) {
                out.push(("owner id", owner.to_string()));
                out.push(("security id", security.to_string()));
            }
            if let (Some(quota), Some(usn)) = (si.quota_charged, si.usn) {
                out.push(("quota charged", quota.to_string()));
                out.push(("usn", usn.to_string()));
            }
            out
        }),
        AttributeBody::FileName(f) => or_err(f, |f| {
            vec![
                (
                    "name",
                    match &f.name {
                        Ok(n) => n.clone(),
                        Err(e) => e.to_string(),
                    },
                ),
                ("namespace", format!("{:?}", f.namespace)),
                ("parent", format!("{} (seq {})", f.parent_entry, f.parent_sequence)),
                ("created", f.created.to_string()),
                ("modified", f.modified.to_string()),
                ("mft modified", f.mft_modified.to_string()),
                ("accessed", f.accessed.to_string()),
                ("allocated size", f.allocated_size.to_string()),
                ("real size", f.real_size.to_string()),
                ("flags", file_attributes::describe(f.flags).join(", ")),
                ("reparse value", format!("{:#x}", f.reparse_value)),
            ]
        }),
        AttributeBody::AttributeList(entries) => or_err(entries, |entries| {
            entries
                .iter()
                .map(|e| {
                    let kind = e
                        .attribute_type()
                        .map(|k| k.name().to_string())
                        .unwrap_or_else(|| format!("{:#x}", e.type_code));
                    ("entry", format!("{} in entry {} from vcn {} (id {})", kind, e.entry_number, e.starting_vcn, e.attribute_id))
                })
                .collect()
        }),
        AttributeBody::ObjectId(id) => or_err(id, |id| vec![("object id", id.to_string())]),
        AttributeBody::VolumeName(name) => or_err(name, |name| vec![("volume name", name.clone())]),
        AttributeBody::VolumeInformation(info) => or_err(info, |info| {
            vec![
                ("ntfs version", format!("{}.{}", info.major_version, info.minor_version)),
                ("volume flags", format!("{:#06x}", info.flags)),
            ]
        }),
        AttributeBody::Data(data) => or_err(data, |data| match data {
            DataAttribute::Resident {
                content_length,
                content_offset,
                content,
            } => vec![
                ("content length", content_length.to_string()),
                ("content offset", content_offset.to_string()),
                (
                    "content",
                    match content {
                        Ok(bytes) => format_size(bytes.len() as u64),
                        Err(e) => e.to_string(),
                    },
                ),
            ],
            DataAttribute::NonResident(h) => vec![
                ("start vcn", h.start_vcn.to_string()),
                ("end vcn", h.end_vcn.to_string()),
                ("data run offset", h.data_run_offset.to_string()),
                ("compression unit", h.compression_unit.to_string()),
                ("allocated size", h.allocated_size.to_string()),
                ("actual size", h.actual_size.to_string()),
                ("initialized size", h.initialized_size.to_string()),
            ],
        }),
        _ => Vec::new(),
    }
}

fn entry_json(entry: &Entry<'_>) -> Value {
    let attributes: Vec<Value> = entry
        .attributes
        .iter()
        .map(|attr| {
            let fields: serde_json::Map<String, Value> = describe_body(&attr.body)
                .into_iter()
                .map(|(k, v)| (k.to_string(), Value::String(v)))
                .collect();
            json!({
                "type": attr.type_name(),
                "offset": attr.offset,
                "length": attr.raw.len(),
                "resident": attr.is_resident(),
                "name": attr.name.as_ref().map(|n| n.clone().unwrap_or_else(|e| e.to_string())),
                "flags": attr.header.flags.to_string(),
                "id": attr.header.attribute_id,
                "fields": fields,
            })
        })
        .collect();

    json!({
        "entry": entry.entry_number,
        "offset": entry.offset,
        "header": entry.header,
        "flags": entry.header.flag_names(),
        "walk_end": entry.walk_end.to_string(),
        "attributes": attributes,
    })
}

fn print_entry(entry: &Entry<'_>) {
    let status = if entry.is_in_use() {
        style("in use").green()
    } else {
        style("free").dim()
    };
    println!(
        "{} {} {} {}",
        style("Entry").bold(),
        style(entry.entry_number).yellow(),
        style(format!("@{:#x}", entry.offset)).dim(),
        status
    );
    let h = &entry.header;
    println!(
        "  {} lsn {}, seq {}, links {}, {} / {} bytes, flags [{}]",
        style("Header:").bold(),
        h.log_sequence_number,
        h.sequence_number,
        h.hard_link_count,
        h.used_size,
        h.allocated_size,
        h.flag_names().join(", ")
    );
    if !h.is_base_record() {
        println!("  {} {}", style("Base record:").bold(), h.base_record_number());
    }

    for attr in &entry.attributes {
        let stream = match &attr.name {
            Some(Ok(name)) => format!(" :{name}"),
            Some(Err(e)) => format!(" :<{e}>"),
            None => String::new(),
        };
        let residency = match &attr.form {
            Ok(_) if attr.is_resident() => "resident".to_string(),
            Ok(_) => "non-resident".to_string(),
            Err(e) => e.to_string(),
        };
        println!(
            "  {}{} {} {} bytes, {}, data flags {}",
            style(attr.type_name()).cyan(),
            style(stream).magenta(),
            style(format!("@{:#x}", attr.offset)).dim(),
            attr.raw.len(),
            residency,
            attr.header.flags
        );
        for (label, value) in describe_body(&attr.body) {
            println!("      {} {}", style(format!("{label}:")).dim(), value);
        }
    }

    if !entry.walk_end.is_clean() {
        println!("  {} {}", style("Attribute walk stopped:").red(), entry.walk_end);
    }
    println!();
}

fn print_tree(node: &TreeNode, prefix: &str, last: bool, top: bool) {
    let marker = if node.cycle {
        style(" (cycle)").red().to_string()
    } else if node.truncated {
        style(" …").dim().to_string()
    } else {
        String::new()
    };
    if top {
        println!("{}{}", style(&node.name).cyan().bold(), marker);
    } else {
        let branch = if last { "└── " } else { "├── " };
        println!("{prefix}{branch}{} {}{marker}", node.name, style(format!("[{}]", node.entry)).dim());
    }

    let child_prefix = if top {
        String::new()
    } else if last {
        format!("{prefix}    ")
    } else {
        format!("{prefix}│   ")
    };
    for (i, child) in node.children.iter().enumerate() {
        print_tree(child, &child_prefix, i + 1 == node.children.len(), false);
    }
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_entries(image_path: &Path, config: &ScanConfig, name: Option<&str>, number: Option<u64>, as_json: bool) -> mftscope::Result<()> {
    let image = MftImage::open(image_path)?;
    let report = scan(&image, config);

    let mut selected: Vec<&Entry<'_>> = match name {
        Some(needle) => query::filter_by_name(&report.entries, needle),
        None => report.entries.iter().collect(),
    };
    if let Some(n) = number {
        selected.retain(|e| e.entry_number == n);
    }

    if as_json {
        let values: Vec<Value> = selected.iter().map(|e| entry_json(e)).collect();
        println!("{}", serde_json::to_string_pretty(&values)?);
        return Ok(());
    }

    for entry in &selected {
        print_entry(entry);
    }
    println!(
        "{} {} of {} entries",
        style("✓").green().bold(),
        style(selected.len()).cyan(),
        report.entries.len()
    );
    Ok(())
}

fn cmd_path(image_path: &Path, config: &ScanConfig, name: &str) -> mftscope::Result<()> {
    let image = MftImage::open(image_path)?;
    let report = scan(&image, config);
    let index = index_for(&report, config);

    match index.resolve_path(name) {
        Some(path) => {
            let note = if path.reached_root {
                String::new()
            } else {
                style(" (orphaned: root not reached)").yellow().to_string()
            };
            println!("{} {}{}", style(path.entry).dim(), style(&path).cyan(), note);
        }
        None => not_found("file", name),
    }
    Ok(())
}

fn cmd_ls(image_path: &Path, config: &ScanConfig, name: Option<&str>) -> mftscope::Result<()> {
    let image = MftImage::open(image_path)?;
    let report = scan(&image, config);
    let index = index_for(&report, config);
    let by_number: HashMap<u64, &Entry<'_>> = report.entries.iter().map(|e| (e.entry_number, e)).collect();

    let target = name.unwrap_or("\\");
    let Some(children) = index.list_children(target) else {
        not_found("directory", target);
        return Ok(());
    };

    for edge in &children {
        let entry = by_number.get(&edge.child);
        let is_dir = entry.is_some_and(|e| e.is_directory() || e.primary_file_name().is_some_and(FileName::is_directory));
        let modified = entry
            .and_then(|e| e.standard_information())
            .map(|si| si.modified.to_string())
            .unwrap_or_default();
        let size = entry
            .and_then(|e| e.data())
            .and_then(|(_, d)| d.as_ref().ok())
            .map(|d| format_size(d.size()))
            .unwrap_or_default();
        let shown = if is_dir {
            style(format!("{}\\", edge.name)).cyan().bold().to_string()
        } else {
            edge.name.clone()
        };
        println!(
            "  {:>8}  {:>27}  {:>10}  {}",
            style(edge.child).dim(),
            style(modified).dim(),
            style(size).yellow(),
            shown
        );
    }
    println!("{} {} entries", style("✓").green().bold(), children.len());
    Ok(())
}

fn cmd_tree(image_path: &Path, config: &ScanConfig, name: Option<&str>, depth: Option<usize>) -> mftscope::Result<()> {
    let image = MftImage::open(image_path)?;
    let report = scan(&image, config);
    let index = index_for(&report, config);

    let target = name.unwrap_or("\\");
    let Some(root) = index.entry_named(target) else {
        not_found("directory", target);
        return Ok(());
    };

    let mut tree = index.build_tree_with_depth(root, depth);
    tree.name = index.path_of(root).to_string();
    print_tree(&tree, "", true, true);
    Ok(())
}

fn cmd_find(image_path: &Path, config: &ScanConfig, name: &str) -> mftscope::Result<()> {
    let image = MftImage::open(image_path)?;
    let report = scan(&image, config);
    let index = index_for(&report, config);

    let paths = index.find_paths(name);
    if paths.is_empty() {
        not_found("file", name);
        return Ok(());
    }
    for path in &paths {
        println!("  {} {}", style(path.entry).dim(), style(path).cyan());
    }
    println!("{} {} matches", style("✓").green().bold(), paths.len());
    Ok(())
}

fn cmd_carve(image_path: &Path, config: &ScanConfig, number: u64, output: &Path) -> mftscope::Result<()> {
    let image = MftImage::open(image_path)?;
    let report = scan(&image, config);

    let Some(entry) = query::filter_by_number(&report.entries, number).into_iter().next() else {
        not_found("entry", &number.to_string());
        return Ok(());
    };

    // check before creating the output file
    query::extract_resident_data(entry)?;

    let target = output.join(query::carve_name(entry));
    let mut sink = BufWriter::new(File::create(&target)?);
    let written = query::carve(entry, &mut sink)?;

    println!(
        "{} wrote {} ({}) to {}",
        style("✓").green().bold(),
        style(written).cyan(),
        format_size(written),
        style(target.display()).yellow()
    );
    Ok(())
}

fn cmd_stats(image_path: &Path, config: &ScanConfig, as_json: bool) -> mftscope::Result<()> {
    let image = MftImage::open(image_path)?;
    let report = scan(&image, config);
    let index = index_for(&report, config);
    let ns = index.stats();
    let in_use = report.entries.iter().filter(|e| e.is_in_use()).count();

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "image": image_path.display().to_string(),
                "bytes": image.len(),
                "records_located": report.records_located,
                "entries": report.entries.len(),
                "in_use": in_use,
                "directories": report.directories(),
                "malformed_records": report.malformed_records(),
                "malformed_attributes": report.malformed_attributes(),
                "namespace": ns,
                "config": config,
                "elapsed_seconds": report.elapsed.as_secs_f64(),
            }))?
        );
        return Ok(());
    }

    println!();
    println!(
        "{} Scanned {} in {}",
        style("✓").green().bold(),
        style(format_size(image.len() as u64)).yellow(),
        style(HumanDuration(report.elapsed)).cyan()
    );
    println!();
    println!("  {} {}", style("Entries:").bold(), report.entries.len());
    println!("  {} {}", style("In use:").bold(), in_use);
    println!("  {} {}", style("Directories:").bold(), report.directories());
    println!("  {} {}", style("Names:").bold(), ns.edges);
    println!("  {} {}", style("Parents:").bold(), ns.parents);
    if ns.orphans > 0 {
        println!("  {} {}", style("Orphaned:").bold(), style(ns.orphans).red());
    }
    if ns.unreadable_names > 0 {
        println!("  {} {}", style("Unreadable names:").bold(), style(ns.unreadable_names).red());
    }
    if !report.issues.is_empty() {
        println!(
            "  {} {} records, {} attribute chains",
            style("Malformed:").bold(),
            style(report.malformed_records()).red(),
            style(report.malformed_attributes()).red()
        );
    }
    Ok(())
}
