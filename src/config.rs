use anyhow::{Context, Result};
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::cli::Cli;

pub const JANDEX_OVERRIDE_ENV: &str = "CLASS_SCAN_USE_JANDEX";
pub const LOG_FILTER_ENV: &str = "CLASS_SCAN_LOG";

const WAR_CLASSES_PREFIX: &str = "WEB-INF/classes";

const OVERRIDE_UNRESOLVED: u8 = 0;
const OVERRIDE_NONE: u8 = 1;
const OVERRIDE_FALSE: u8 = 2;
const OVERRIDE_TRUE: u8 = 3;

static JANDEX_OVERRIDE: AtomicU8 = AtomicU8::new(OVERRIDE_UNRESOLVED);

/// Immutable per-source options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    use_jandex: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self { use_jandex: true }
    }
}

impl ScanOptions {
    pub const fn new(use_jandex: bool) -> Self {
        Self { use_jandex }
    }

    /// Effective flag: the process-wide override wins when set.
    pub fn use_jandex(&self) -> bool {
        Self::resolve(self.use_jandex, jandex_override())
    }

    pub fn declared_use_jandex(&self) -> bool {
        self.use_jandex
    }

    pub fn resolve(declared: bool, override_value: Option<bool>) -> bool {
        override_value.unwrap_or(declared)
    }
}

/// Process-wide index override, read from `CLASS_SCAN_USE_JANDEX` on first use
/// unless set explicitly.
pub fn jandex_override() -> Option<bool> {
    let raw = match JANDEX_OVERRIDE.load(Ordering::Acquire) {
        OVERRIDE_UNRESOLVED => {
            let resolved = encode_override(
                std::env::var(JANDEX_OVERRIDE_ENV)
                    .ok()
                    .and_then(|v| parse_bool(&v)),
            );
            match JANDEX_OVERRIDE.compare_exchange(
                OVERRIDE_UNRESOLVED,
                resolved,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => resolved,
                Err(current) => current,
            }
        }
        current => current,
    };
    decode_override(raw)
}

pub fn set_jandex_override(value: Option<bool>) {
    JANDEX_OVERRIDE.store(encode_override(value), Ordering::Release);
}

fn encode_override(value: Option<bool>) -> u8 {
    match value {
        None => OVERRIDE_NONE,
        Some(false) => OVERRIDE_FALSE,
        Some(true) => OVERRIDE_TRUE,
    }
}

fn decode_override(raw: u8) -> Option<bool> {
    match raw {
        OVERRIDE_FALSE => Some(false),
        OVERRIDE_TRUE => Some(true),
        _ => None,
    }
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn resolve_scan_options(cli: &Cli) -> ScanOptions {
    ScanOptions::new(!cli.no_jandex)
}

pub fn resolve_log_filter(cli: &Cli) -> String {
    if cli.verbose {
        return "debug".to_string();
    }
    std::env::var(LOG_FILTER_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "warn".to_string())
}

/// Physical layout of a path handed to the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLayout {
    Directory,
    Jar,
    /// Archive presented as a container, optionally scoped to a sub-root.
    Archive { prefix: String },
}

pub fn classify_path(path: &Path) -> Result<SourceLayout> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to read class source path: {}", path.display()))?;
    if metadata.is_dir() {
        return Ok(SourceLayout::Directory);
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jar" => Ok(SourceLayout::Jar),
        "war" => Ok(SourceLayout::Archive {
            prefix: WAR_CLASSES_PREFIX.to_string(),
        }),
        "rar" | "ear" | "zip" => Ok(SourceLayout::Archive {
            prefix: String::new(),
        }),
        _ => anyhow::bail!("Unsupported class source: {}", path.display()),
    }
}
