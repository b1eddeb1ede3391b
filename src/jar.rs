use memmap2::Mmap;
use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::config::ScanOptions;
use crate::counters::ScanCount;
use crate::error::{ClassSourceError, Result};
use crate::index::INDEX_PATH;
use crate::names;
use crate::seeds::SeedSet;
use crate::source::{ClassSource, ResourceStream, ScanContext, ScanPolicy, SourceCore, SourceKind};
use crate::streamer::ClassStreamer;

pub(crate) type JarArchive = ZipArchive<Cursor<Mmap>>;

/// A JAR file. The memory-mapped archive is held while `open_count > 0`.
pub struct JarClassSource {
    core: SourceCore,
    path: PathBuf,
    open_count: u32,
    archive: Option<JarArchive>,
    archive_opens: u64,
}

impl fmt::Debug for JarClassSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JarClassSource")
            .field("name", &self.core.name())
            .field("path", &self.path)
            .field("open_count", &self.open_count)
            .field("archive_held", &self.archive.is_some())
            .finish()
    }
}

impl JarClassSource {
    pub fn new(options: ScanOptions, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.to_string_lossy().to_string();
        Self::with_name(name, options, path)
    }

    pub fn with_name(name: impl Into<String>, options: ScanOptions, path: impl Into<PathBuf>) -> Self {
        Self {
            core: SourceCore::new(SourceKind::Jar, name, options),
            path: path.into(),
            open_count: 0,
            archive: None,
            archive_opens: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn open_count(&self) -> u32 {
        self.open_count
    }

    pub fn is_open(&self) -> bool {
        self.archive.is_some()
    }

    /// How many times the archive was physically opened.
    pub fn archive_opens(&self) -> u64 {
        self.archive_opens
    }

    fn inconsistent(&self, detail: &str) -> ClassSourceError {
        warn!(
            source = %self.core.hash_text(),
            open_count = self.open_count,
            archive_held = self.archive.is_some(),
            "{detail}"
        );
        ClassSourceError::state(self.core.canonical_name(), detail)
    }

    fn read_entry(&mut self, resource_name: &str) -> Result<Option<ResourceStream>> {
        let Some(archive) = self.archive.as_mut() else {
            return Err(ClassSourceError::state(
                self.core.canonical_name(),
                format!("cannot read {resource_name}: jar is not open"),
            ));
        };
        let mut entry = match archive.by_name(resource_name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(source) => {
                return Err(ClassSourceError::Archive {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let mut bytes = Vec::with_capacity(entry_capacity(entry.size()));
        entry
            .read_to_end(&mut bytes)
            .map_err(|err| ClassSourceError::read(self.core.canonical_name(), resource_name, err))?;
        Ok(Some(Box::new(Cursor::new(bytes))))
    }
}

/// Upper bound on the buffer reserved up front for one entry.
const MAX_PREALLOCATED_ENTRY: u64 = 1 << 20;

/// Capacity hint for reading an entry whose size the archive declares. The
/// declared size is untrusted, so larger entries grow their buffer as read.
pub(crate) fn entry_capacity(declared_size: u64) -> usize {
    usize::try_from(declared_size.min(MAX_PREALLOCATED_ENTRY)).unwrap_or(0)
}

pub(crate) fn open_archive(path: &Path) -> Result<JarArchive> {
    let file = File::open(path).map_err(|source| ClassSourceError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    // SAFETY: The file is opened read-only and the mapping owns its own handle
    // to the pages; it stays valid after `file` is dropped.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|source| ClassSourceError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    ZipArchive::new(Cursor::new(mmap)).map_err(|source| ClassSourceError::Archive {
        path: path.to_path_buf(),
        source,
    })
}

impl ClassSource for JarClassSource {
    fn core(&self) -> &SourceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SourceCore {
        &mut self.core
    }

    fn open(&mut self) -> Result<()> {
        if self.open_count == 0 {
            if self.archive.is_some() {
                return Err(self.inconsistent("archive held while closed"));
            }
            self.archive = Some(open_archive(&self.path)?);
            self.archive_opens += 1;
            debug!(source = %self.core.hash_text(), "opened jar");
        } else if self.archive.is_none() {
            return Err(self.inconsistent("archive missing while open"));
        }
        self.open_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.open_count == 0 {
            return Err(self.inconsistent("close of a closed jar"));
        }
        if self.archive.is_none() {
            return Err(self.inconsistent("archive missing while open"));
        }
        self.open_count -= 1;
        if self.open_count == 0 {
            self.archive = None;
            debug!(source = %self.core.hash_text(), "closed jar");
        }
        Ok(())
    }

    fn open_resource_stream(
        &mut self,
        _class_name: &str,
        resource_name: &str,
    ) -> Result<Option<ResourceStream>> {
        self.read_entry(resource_name)
    }

    fn open_index_stream(&mut self) -> Result<Option<ResourceStream>> {
        self.read_entry(INDEX_PATH)
    }

    fn process_from_scratch(
        &mut self,
        streamer: &mut dyn ClassStreamer,
        seeds: &mut SeedSet,
        policy: ScanPolicy,
    ) -> Result<()> {
        let source_name = self.core.canonical_name().to_string();
        let Some(archive) = self.archive.as_mut() else {
            return Err(ClassSourceError::state(&source_name, "cannot scan: jar is not open"));
        };
        let counters = self.core.counters_mut();
        let mut ctx = ScanContext::new(streamer, seeds, &source_name, policy);

        // Entries are already flat; directory entries are counted, never walked.
        for i in 0..archive.len() {
            counters.add(ScanCount::Entry);
            let entry = match archive.by_index(i) {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(source = %source_name, entry = i, error = %err, "failed to read jar entry");
                    continue;
                }
            };
            if entry.is_dir() {
                counters.add(ScanCount::Container);
                counters.add(ScanCount::NonRootContainer);
                continue;
            }
            let resource_name = entry.name().to_string();
            ctx.visit_resource(
                counters,
                &resource_name,
                names::class_name_from_resource_name,
                move || Ok(Some(entry)),
            );
        }
        Ok(())
    }
}
