use anyhow::{Context, Result};
use clap::Parser;
use class_scan::aggregate::{AggregateClassSource, ChildReport, LookupStats};
use class_scan::cli::{Cli, Commands, OutputFormat, SourceArgs};
use class_scan::config::{resolve_log_filter, resolve_scan_options};
use class_scan::counters::{ScanCount, ScanCounters};
use class_scan::factory::ClassSourceFactory;
use class_scan::index::{ClassIndex, ClassSummary, write_index};
use class_scan::logging::init_logging;
use class_scan::seeds::SeedSet;
use class_scan::source::{ClassScan, ClassSource, ScanPolicy};
use class_scan::streamer::{CollectingStreamer, ScannedClass};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;

fn main() -> Result<()> {
    let cli = parse_cli()?;
    init_logging(&resolve_log_filter(&cli));
    let factory = ClassSourceFactory::new(resolve_scan_options(&cli));

    match cli.command.clone() {
        Commands::Scan {
            sources,
            format,
            output,
        } => {
            let report = scan(&factory, &sources)?;
            write_scan_output(&report, format, output.as_deref())?;
        }
        Commands::Find {
            class_name,
            sources,
        } => {
            let class_name = normalize_class_name(&class_name);
            let result = find_class(&factory, &sources, &class_name)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Index { path, output } => {
            let index = build_index(&factory, &path)?;
            match output {
                Some(output) => {
                    write_output_file(&output, &index_bytes(&index)?)?;
                    let result = IndexResult {
                        source: path.to_string_lossy().to_string(),
                        output: output.to_string_lossy().to_string(),
                        classes: index.len(),
                    };
                    println!("{}", serde_json::to_string_pretty(&result)?);
                }
                None => {
                    let bytes = index_bytes(&index)?;
                    println!("{}", String::from_utf8_lossy(&bytes));
                }
            }
        }
    }

    Ok(())
}

fn parse_cli() -> Result<Cli> {
    let args: Vec<String> = std::env::args().collect();
    Ok(Cli::parse_from(rewrite_args_for_implicit_find(args)))
}

/// `class-scan a.b.C --seed dir` is shorthand for `class-scan find a.b.C --seed dir`.
fn rewrite_args_for_implicit_find(mut args: Vec<String>) -> Vec<String> {
    if args.len() <= 1 {
        return args;
    }

    let subcommands = ["scan", "find", "index", "help"];

    let mut idx = 1usize;
    while idx < args.len() {
        let a = args[idx].as_str();
        if a == "--" {
            idx += 1;
            break;
        }
        if a.starts_with('-') {
            idx += 1;
            continue;
        }
        break;
    }

    if idx < args.len() {
        let token = args[idx].as_str();
        if !subcommands.contains(&token) {
            args.insert(idx, "find".to_string());
        }
    }

    args
}

fn normalize_class_name(raw: &str) -> String {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("import") {
        s = rest.trim();
    }
    if s.ends_with(';') {
        s = s.trim_end_matches(';').trim();
    }
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

fn build_aggregate(factory: &ClassSourceFactory, sources: &SourceArgs) -> Result<AggregateClassSource> {
    if sources.is_empty() {
        anyhow::bail!("No class sources given (use --seed, --partial, --external or --classpath)");
    }

    let mut aggregate = factory.create_aggregate(&sources.app, &sources.module);
    let partitions = [
        (&sources.seed, ScanPolicy::Seed),
        (&sources.partial, ScanPolicy::Partial),
        (&sources.excluded, ScanPolicy::Excluded),
        (&sources.external, ScanPolicy::External),
    ];
    for (paths, policy) in partitions {
        for path in paths {
            factory.add_path(&mut aggregate, path, policy)?;
        }
    }
    if let Some(class_path) = sources.classpath.as_deref() {
        factory.add_class_path(&mut aggregate, class_path)?;
    }
    Ok(aggregate)
}

#[derive(Debug, Serialize)]
struct ScanReport {
    aggregate: String,
    duration_ms: u64,
    counts: ScanCounters,
    sources: Vec<ChildReport>,
    classes: Vec<ScannedClass>,
}

#[derive(Debug, Serialize)]
struct FindResult {
    class_name: String,
    source: Option<String>,
    content_hash: Option<String>,
    size: Option<u64>,
    lookups: LookupStats,
    duration_ms: u64,
}

#[derive(Debug, Serialize)]
struct IndexResult {
    source: String,
    output: String,
    classes: usize,
}

fn scan(factory: &ClassSourceFactory, sources: &SourceArgs) -> Result<ScanReport> {
    let start = Instant::now();
    let mut aggregate = build_aggregate(factory, sources)?;
    let mut streamer = CollectingStreamer::new();
    let mut seeds = SeedSet::new();

    aggregate.open().context("Failed to open class sources")?;
    let scanned = aggregate.scan_classes(&mut streamer, &mut seeds, ScanPolicy::Seed);
    aggregate.log_state();
    let closed = aggregate.close();
    scanned.context("Scan failed")?;
    closed.context("Failed to close class sources")?;

    Ok(ScanReport {
        aggregate: aggregate.canonical_name().to_string(),
        duration_ms: start.elapsed().as_millis() as u64,
        counts: aggregate.counters().clone(),
        sources: aggregate.reports(),
        classes: streamer.into_classes(),
    })
}

fn find_class(factory: &ClassSourceFactory, sources: &SourceArgs, class_name: &str) -> Result<FindResult> {
    let start = Instant::now();
    let mut aggregate = build_aggregate(factory, sources)?;
    let mut streamer = CollectingStreamer::new();

    aggregate.open().context("Failed to open class sources")?;
    let outcome = aggregate.scan_referenced_class(class_name, &mut streamer);
    let closed = aggregate.close();
    let outcome = outcome.with_context(|| format!("Failed to resolve class {class_name}"))?;
    closed.context("Failed to close class sources")?;

    if outcome != ClassScan::Processed {
        anyhow::bail!("Class not found: {class_name}");
    }
    let scanned = streamer.into_classes().into_iter().next();
    Ok(FindResult {
        class_name: class_name.to_string(),
        source: aggregate.resolved_source(class_name).map(str::to_string),
        content_hash: scanned.as_ref().and_then(|c| c.content_hash.clone()),
        size: scanned.as_ref().and_then(|c| c.size),
        lookups: aggregate.lookup_stats(),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Full traversal of one source; an existing index in the source is ignored.
fn build_index(factory: &ClassSourceFactory, path: &Path) -> Result<ClassIndex> {
    let mut source = factory.create_for_path(path)?;
    let mut streamer = CollectingStreamer::new();
    let mut seeds = SeedSet::new();

    source
        .open()
        .with_context(|| format!("Failed to open class source: {}", path.display()))?;
    let scanned = source.process_from_scratch(&mut streamer, &mut seeds, ScanPolicy::Seed);
    let closed = source.close();
    scanned.with_context(|| format!("Failed to scan class source: {}", path.display()))?;
    closed.with_context(|| format!("Failed to close class source: {}", path.display()))?;

    let unprocessed = source.counters().get(ScanCount::UnprocessedClass);
    if unprocessed > 0 {
        tracing::warn!(source = %path.display(), unprocessed, "index omits classes that failed to read");
    }
    Ok(ClassIndex::new(
        streamer
            .class_names()
            .into_iter()
            .map(ClassSummary::named)
            .collect(),
    ))
}

fn index_bytes(index: &ClassIndex) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    write_index(index, &mut bytes)?;
    Ok(bytes)
}

fn write_scan_output(report: &ScanReport, format: OutputFormat, output: Option<&Path>) -> Result<()> {
    let content = match format {
        OutputFormat::Json => serde_json::to_string_pretty(report)?,
        OutputFormat::Text => {
            let mut out = String::new();
            out.push_str(&format!("aggregate: {}\n", report.aggregate));
            out.push_str(&format!("duration_ms: {}\n", report.duration_ms));
            out.push_str(&format!("counts: {}\n", report.counts));
            for s in &report.sources {
                out.push_str(&format!(
                    "- source: {} ({}, {}, {}) included: {}, processed: {}\n",
                    s.name,
                    s.kind,
                    s.policy,
                    s.state,
                    s.counts.get(ScanCount::IncludedClass),
                    s.counts.get(ScanCount::ProcessedClass)
                ));
            }
            for c in &report.classes {
                out.push_str(&format!("{} <- {}\n", c.class_name, c.source));
            }
            out
        }
    };

    match output {
        Some(path) => write_output_file(path, content.as_bytes()),
        None => {
            print!("{content}");
            if !content.ends_with('\n') {
                println!();
            }
            Ok(())
        }
    }
}

fn write_output_file(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}
