//! Class sources over a hierarchical container.
//!
//! [`Container`] adapts some external module or archive abstraction into a
//! tree of entries. The container itself decides which child entries are
//! structural roots (nested deployment units); the scan counts those but never
//! descends into them. While a [`ContainerClassSource`] is open its container
//! is kept in fast mode so the backing archive stays open across the walk.

use std::collections::{HashMap, HashSet};
use std::fmt::{self, Debug};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zip::result::ZipError;

use crate::config::ScanOptions;
use crate::counters::{ScanCount, ScanCounters};
use crate::directory::is_nested_archive;
use crate::error::{ClassSourceError, Result};
use crate::index::INDEX_PATH;
use crate::jar::{JarArchive, entry_capacity, open_archive};
use crate::names;
use crate::seeds::SeedSet;
use crate::source::{ClassSource, ResourceStream, ScanContext, ScanPolicy, SourceCore, SourceKind};
use crate::streamer::ClassStreamer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Resource,
    Directory,
    /// A nested deployment unit; never descended into.
    Root,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEntry {
    /// Canonical path from the container root, without a trailing separator.
    pub path: String,
    pub kind: EntryKind,
}

impl ContainerEntry {
    pub fn new(path: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

pub trait Container: Debug {
    fn name(&self) -> &str;

    /// Keeps the backing storage open until fast mode is turned off again.
    fn set_fast_mode(&mut self, enabled: bool) -> Result<()>;

    /// Direct children of the directory at `path` (`""` is the root).
    fn list(&mut self, path: &str) -> Result<Vec<ContainerEntry>>;

    fn open(&mut self, path: &str) -> Result<Option<ResourceStream>>;

    fn release(&mut self, _path: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Listing {
    children: HashMap<String, Vec<ContainerEntry>>,
}

impl Listing {
    /// Synthesizes the directory tree implied by flat archive entry names,
    /// keeping archive order among siblings.
    fn build<I: IntoIterator<Item = String>>(entry_names: I) -> Self {
        let mut children: HashMap<String, Vec<ContainerEntry>> = HashMap::new();
        let mut seen: HashSet<String> = HashSet::new();

        for name in entry_names {
            let is_dir_entry = names::is_directory_resource(&name);
            let parts: Vec<&str> = name.split('/').filter(|p| !p.is_empty()).collect();
            for depth in 0..parts.len() {
                let path = parts[..=depth].join("/");
                if !seen.insert(path.clone()) {
                    continue;
                }
                let leaf = depth + 1 == parts.len();
                let kind = if is_nested_archive(parts[depth]) {
                    EntryKind::Root
                } else if !leaf || is_dir_entry {
                    EntryKind::Directory
                } else {
                    EntryKind::Resource
                };
                children
                    .entry(parts[..depth].join("/"))
                    .or_default()
                    .push(ContainerEntry::new(path, kind));
            }
        }
        Self { children }
    }

    fn list(&self, path: &str) -> Vec<ContainerEntry> {
        self.children
            .get(path.trim_matches('/'))
            .cloned()
            .unwrap_or_default()
    }
}

/// A zip-format archive (`.war`, `.rar`, `.ear`, `.jar`) presented as a
/// container. Nested archives are reported as roots.
pub struct ArchiveContainer {
    name: String,
    path: PathBuf,
    archive: Option<JarArchive>,
    listing: Option<Listing>,
    archive_opens: u64,
}

impl Debug for ArchiveContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveContainer")
            .field("path", &self.path)
            .field("fast_mode", &self.archive.is_some())
            .finish()
    }
}

impl ArchiveContainer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: names::canonical_path_name(&path),
            path,
            archive: None,
            listing: None,
            archive_opens: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_fast_mode(&self) -> bool {
        self.archive.is_some()
    }

    pub fn archive_opens(&self) -> u64 {
        self.archive_opens
    }

    fn with_archive<T>(&mut self, f: impl FnOnce(&mut JarArchive) -> Result<T>) -> Result<T> {
        if let Some(archive) = self.archive.as_mut() {
            return f(archive);
        }
        let mut archive = open_archive(&self.path)?;
        self.archive_opens += 1;
        f(&mut archive)
    }

    fn listing(&mut self) -> Result<&Listing> {
        if self.listing.is_none() {
            let path = self.path.clone();
            let entry_names = self.with_archive(|archive| {
                let mut entry_names = Vec::with_capacity(archive.len());
                for i in 0..archive.len() {
                    let entry = archive
                        .by_index_raw(i)
                        .map_err(|source| ClassSourceError::Archive {
                            path: path.clone(),
                            source,
                        })?;
                    entry_names.push(entry.name().to_string());
                }
                Ok(entry_names)
            })?;
            self.listing = Some(Listing::build(entry_names));
        }
        Ok(self.listing.get_or_insert_with(Listing::default))
    }
}

impl Container for ArchiveContainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_fast_mode(&mut self, enabled: bool) -> Result<()> {
        if enabled {
            if self.archive.is_none() {
                self.archive = Some(open_archive(&self.path)?);
                self.archive_opens += 1;
            }
        } else {
            self.archive = None;
        }
        Ok(())
    }

    fn list(&mut self, path: &str) -> Result<Vec<ContainerEntry>> {
        Ok(self.listing()?.list(path))
    }

    fn open(&mut self, path: &str) -> Result<Option<ResourceStream>> {
        let archive_path = self.path.clone();
        let name = self.name.clone();
        self.with_archive(|archive| {
            let mut entry = match archive.by_name(path) {
                Ok(entry) => entry,
                Err(ZipError::FileNotFound) => return Ok(None),
                Err(source) => {
                    return Err(ClassSourceError::Archive {
                        path: archive_path,
                        source,
                    });
                }
            };
            if entry.is_dir() {
                return Ok(None);
            }
            let mut bytes = Vec::with_capacity(entry_capacity(entry.size()));
            entry
                .read_to_end(&mut bytes)
                .map_err(|err| ClassSourceError::read(&name, path, err))?;
            Ok(Some(Box::new(Cursor::new(bytes)) as ResourceStream))
        })
    }
}

/// A class source over a [`Container`], optionally scoped to a sub-root such
/// as `WEB-INF/classes`. The index is resolved under that sub-root.
#[derive(Debug)]
pub struct ContainerClassSource {
    core: SourceCore,
    container: Box<dyn Container>,
    prefix: String,
    open_count: u32,
}

impl ContainerClassSource {
    pub fn new(options: ScanOptions, container: Box<dyn Container>) -> Self {
        let name = container.name().to_string();
        Self::with_name(name, options, container)
    }

    pub fn with_name(name: impl Into<String>, options: ScanOptions, container: Box<dyn Container>) -> Self {
        Self {
            core: SourceCore::new(SourceKind::Container, name, options),
            container,
            prefix: String::new(),
            open_count: 0,
        }
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = names::canonicalize(names::strip_leading_separator(prefix));
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn open_count(&self) -> u32 {
        self.open_count
    }

    fn entry_path(&self, resource_name: &str) -> String {
        names::join_resource(&self.prefix, resource_name)
    }
}

fn relative_name<'p>(prefix: &str, path: &'p str) -> &'p str {
    if prefix.is_empty() {
        return path;
    }
    path.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(path)
}

fn walk_entries(
    container: &mut dyn Container,
    prefix: &str,
    entries: Vec<ContainerEntry>,
    ctx: &mut ScanContext<'_>,
) -> ScanCounters {
    let mut local = ScanCounters::new();
    for entry in entries {
        local.add(ScanCount::Entry);
        match entry.kind {
            EntryKind::Root => {
                local.add(ScanCount::Container);
                local.add(ScanCount::RootContainer);
                debug!(source = ctx.source_name(), root = %entry.path, "not descending into nested root");
            }
            EntryKind::Directory => {
                local.add(ScanCount::Container);
                local.add(ScanCount::NonRootContainer);
                match container.list(&entry.path) {
                    Ok(children) => {
                        let nested = walk_entries(container, prefix, children, ctx);
                        local.merge(&nested);
                    }
                    Err(err) => {
                        local.add(ScanCount::FailedContainer);
                        warn!(source = ctx.source_name(), entry = %entry.path, error = %err, "failed to adapt container entry");
                    }
                }
            }
            EntryKind::Resource => {
                let resource_name = relative_name(prefix, &entry.path);
                ctx.visit_resource(
                    &mut local,
                    resource_name,
                    names::class_name_from_resource_name,
                    || container.open(&entry.path),
                );
                if let Err(err) = container.release(&entry.path) {
                    warn!(source = ctx.source_name(), entry = %entry.path, error = %err, "failed to release entry");
                }
            }
        }
    }
    local
}

impl ClassSource for ContainerClassSource {
    fn core(&self) -> &SourceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SourceCore {
        &mut self.core
    }

    fn open(&mut self) -> Result<()> {
        if self.open_count == 0 {
            self.container.set_fast_mode(true)?;
            debug!(source = %self.core.hash_text(), "entered fast mode");
        }
        self.open_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.open_count == 0 {
            warn!(source = %self.core.hash_text(), "close of a closed container");
            return Err(ClassSourceError::state(
                self.core.canonical_name(),
                "close of a closed container",
            ));
        }
        self.open_count -= 1;
        if self.open_count == 0 {
            self.container.set_fast_mode(false)?;
            debug!(source = %self.core.hash_text(), "left fast mode");
        }
        Ok(())
    }

    fn open_resource_stream(
        &mut self,
        _class_name: &str,
        resource_name: &str,
    ) -> Result<Option<ResourceStream>> {
        let path = self.entry_path(resource_name);
        self.container.open(&path)
    }

    fn close_resource_stream(&mut self, _class_name: &str, resource_name: &str) -> Result<()> {
        let path = self.entry_path(resource_name);
        self.container.release(&path)
    }

    fn open_index_stream(&mut self) -> Result<Option<ResourceStream>> {
        let path = self.entry_path(INDEX_PATH);
        self.container.open(&path)
    }

    fn process_from_scratch(
        &mut self,
        streamer: &mut dyn ClassStreamer,
        seeds: &mut SeedSet,
        policy: ScanPolicy,
    ) -> Result<()> {
        let source_name = self.core.canonical_name().to_string();
        let prefix = self.prefix.clone();
        let entries = self
            .container
            .list(&prefix)
            .map_err(|err| ClassSourceError::Adapt {
                source_name: source_name.clone(),
                entry: prefix.clone(),
                detail: err.to_string(),
            })?;

        let mut ctx = ScanContext::new(streamer, seeds, &source_name, policy);
        let counters = walk_entries(self.container.as_mut(), &prefix, entries, &mut ctx);
        self.core.counters_mut().merge(&counters);
        Ok(())
    }
}
