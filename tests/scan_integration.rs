use class_scan::config::ScanOptions;
use class_scan::counters::ScanCount;
use class_scan::factory::ClassSourceFactory;
use class_scan::names;
use class_scan::seeds::SeedSet;
use class_scan::source::{ClassSource, ScanPolicy};
use class_scan::streamer::{CollectingStreamer, hash_bytes};
use serde_json::Value;
use std::path::Path;
use std::process::{Command, Output};

fn write_file(path: &Path, content: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

fn write_jar(path: &Path, entries: &[(&str, &[u8])]) -> anyhow::Result<()> {
    use std::io::Write;
    use zip::write::FileOptions;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, content) in entries {
        zip.start_file(*name, options)?;
        zip.write_all(content)?;
    }
    zip.finish()?;
    Ok(())
}

fn run(args: &[&str]) -> anyhow::Result<Output> {
    let out = Command::new(env!("CARGO_BIN_EXE_class-scan"))
        .args(args)
        .env_remove("CLASS_SCAN_USE_JANDEX")
        .env_remove("CLASS_SCAN_LOG")
        .output()?;
    Ok(out)
}

fn run_json(args: &[&str]) -> anyhow::Result<Value> {
    let out = run(args)?;
    if !out.status.success() {
        return Err(anyhow::anyhow!(
            "command failed: status={:?}, stderr={}",
            out.status.code(),
            String::from_utf8_lossy(&out.stderr)
        ));
    }
    Ok(serde_json::from_slice(&out.stdout)?)
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// A class directory, a jar overlapping it, and a war with a nested library.
fn layered_fixture(base: &Path) -> anyhow::Result<()> {
    write_file(&base.join("classes/a/B.class"), b"B-from-dir")?;
    write_file(&base.join("classes/a/C.class"), b"C-from-dir")?;
    write_file(&base.join("classes/lib/inner.jar/x/Y.class"), b"Y")?;
    write_jar(
        &base.join("lib/util.jar"),
        &[
            ("a/B.class", b"B-from-jar"),
            ("d/D.class", b"D"),
            ("META-INF/versions/9/d/D.class", b"D9"),
            ("module-info.class", b"M"),
        ],
    )?;
    write_jar(
        &base.join("web.war"),
        &[
            ("WEB-INF/classes/w/Web.class", b"W"),
            ("WEB-INF/lib/nested.jar", b"not scanned"),
            ("index.html", b"<html/>"),
        ],
    )?;
    Ok(())
}

#[test]
fn scan_masks_classes_by_first_source() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let base = dir.path();
    layered_fixture(base)?;
    let classes = path_str(&base.join("classes"));
    let jar = path_str(&base.join("lib/util.jar"));
    let war = path_str(&base.join("web.war"));

    let v = run_json(&["scan", "--seed", &classes, "--partial", &jar, "--partial", &war])?;

    let scanned: Vec<(String, String)> = v["classes"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(|c| {
            (
                c["class_name"].as_str().unwrap_or_default().to_string(),
                c["source"].as_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    let class_names: Vec<&str> = scanned.iter().map(|(n, _)| n.as_str()).collect();
    assert!(class_names.contains(&"a.B"));
    assert!(class_names.contains(&"a.C"));
    assert!(class_names.contains(&"d.D"));
    assert!(class_names.contains(&"w.Web"));
    assert!(!class_names.contains(&"x.Y"));
    assert_eq!(class_names.iter().filter(|n| **n == "a.B").count(), 1);

    let b_source = scanned
        .iter()
        .find(|(n, _)| n == "a.B")
        .map(|(_, s)| s.as_str());
    assert_eq!(b_source, Some(names::canonicalize(&classes).as_str()));

    let counts = &v["counts"];
    assert_eq!(counts["duplicate_classes"].as_u64(), Some(1));
    assert_eq!(counts["unsupported_classes"].as_u64(), Some(2));
    // The war is scoped to WEB-INF/classes, so only the expanded inner.jar counts.
    assert_eq!(counts["root_containers"].as_u64(), Some(1));

    let sources = v["sources"].as_array().cloned().unwrap_or_default();
    assert_eq!(sources.len(), 3);
    assert_eq!(sources[0]["policy"], "seed");
    assert_eq!(sources[1]["kind"], "jar");
    assert_eq!(sources[2]["kind"], "container");
    Ok(())
}

#[test]
fn scan_tolerates_a_source_that_cannot_open() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let base = dir.path();
    layered_fixture(base)?;
    let broken = base.join("broken.jar");
    write_file(&broken, b"this is not a zip archive")?;

    let v = run_json(&[
        "scan",
        "--seed",
        &path_str(&broken),
        "--seed",
        &path_str(&base.join("classes")),
    ])?;

    let sources = v["sources"].as_array().cloned().unwrap_or_default();
    assert_eq!(sources[0]["state"], "failed");
    assert_eq!(sources[1]["state"], "unopened");
    assert_eq!(v["counts"]["included_classes"].as_u64(), Some(2));
    Ok(())
}

#[test]
fn find_reports_the_winning_source() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let base = dir.path();
    layered_fixture(base)?;
    let classes = path_str(&base.join("classes"));
    let jar = path_str(&base.join("lib/util.jar"));

    let v = run_json(&["find", "a.B", "--seed", &classes, "--external", &jar])?;
    assert_eq!(v["class_name"], "a.B");
    assert_eq!(v["source"].as_str(), Some(names::canonicalize(&classes).as_str()));
    assert_eq!(v["content_hash"].as_str(), Some(hash_bytes(b"B-from-dir").as_str()));

    let v = run_json(&["import d.D;", "--seed", &classes, "--external", &jar])?;
    assert_eq!(v["class_name"], "d.D");
    assert_eq!(v["source"].as_str(), Some(names::canonicalize(&jar).as_str()));
    assert_eq!(v["size"].as_u64(), Some(1));

    let out = run(&["find", "a.Missing", "--seed", &classes])?;
    assert!(!out.status.success());
    Ok(())
}

#[test]
fn index_command_feeds_the_fast_path() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let base = dir.path();
    layered_fixture(base)?;
    let classes = base.join("classes");
    let index = classes.join("META-INF/jandex.idx");

    let v = run_json(&["index", &path_str(&classes), "-o", &path_str(&index)])?;
    assert_eq!(v["classes"].as_u64(), Some(2));
    assert!(index.is_file());

    let v = run_json(&["scan", "--seed", &path_str(&classes)])?;
    let from_index: Vec<bool> = v["classes"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(|c| c["from_index"].as_bool().unwrap_or(false))
        .collect();
    assert_eq!(from_index, vec![true, true]);

    let v = run_json(&["--no-jandex", "scan", "--seed", &path_str(&classes)])?;
    let classes = v["classes"].as_array().cloned().unwrap_or_default();
    assert_eq!(classes.len(), 2);
    assert!(classes.iter().all(|c| c["from_index"] == false));
    Ok(())
}

#[test]
fn text_report_lists_sources_and_classes() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let base = dir.path();
    layered_fixture(base)?;
    let out_file = base.join("out/report.txt");

    let out = run(&[
        "scan",
        "--seed",
        &path_str(&base.join("lib/util.jar")),
        "-f",
        "text",
        "-o",
        &path_str(&out_file),
    ])?;
    assert!(out.status.success());
    let text = std::fs::read_to_string(&out_file)?;
    assert!(text.contains("aggregate: app"));
    assert!(text.contains("(jar, seed, unopened)"));
    assert!(text.contains("d.D <- "));
    Ok(())
}

#[test]
fn scan_without_sources_fails() -> anyhow::Result<()> {
    let out = run(&["scan"])?;
    assert!(!out.status.success());
    Ok(())
}

#[test]
fn library_aggregate_scan_and_resolution() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let base = dir.path();
    layered_fixture(base)?;

    let factory = ClassSourceFactory::new(ScanOptions::new(false));
    let mut aggregate = factory.create_aggregate("shop", "web");
    factory.add_path(&mut aggregate, &base.join("web.war"), ScanPolicy::Seed)?;
    factory.add_path(&mut aggregate, &base.join("classes"), ScanPolicy::Partial)?;
    factory.add_path(&mut aggregate, &base.join("lib/util.jar"), ScanPolicy::External)?;

    let mut streamer = CollectingStreamer::new();
    let mut seeds = SeedSet::new();
    aggregate.open()?;
    aggregate.scan_classes(&mut streamer, &mut seeds, ScanPolicy::Seed)?;

    let mut scanned = streamer.class_names();
    assert_eq!(scanned.first(), Some(&"w.Web"));
    scanned.sort();
    assert_eq!(scanned, vec!["a.B", "a.C", "w.Web"]);
    assert!(!seeds.contains("d.D"));
    assert_eq!(aggregate.counters().get(ScanCount::RootContainer), 1);

    let mut referenced = CollectingStreamer::new();
    aggregate.scan_referenced_class("d.D", &mut referenced)?;
    assert_eq!(referenced.class_names(), vec!["d.D"]);
    assert_eq!(
        aggregate.resolved_source("d.D").map(str::to_string),
        Some(names::canonicalize(&path_str(&base.join("lib/util.jar"))))
    );
    aggregate.close()?;
    Ok(())
}
