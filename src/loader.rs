//! Class sources backed by a resource loader.
//!
//! A loader can answer "give me this resource" but cannot enumerate what it
//! holds, so a [`ClassLoaderClassSource`] contributes nothing to a full scan and
//! is only useful for resolving referenced classes.

use std::fmt::Debug;
use std::fs::File;
use std::io::{Cursor, ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::result::ZipError;

use crate::config::ScanOptions;
use crate::error::{ClassSourceError, Result};
use crate::jar::{entry_capacity, open_archive};
use crate::names;
use crate::seeds::SeedSet;
use crate::source::{ClassSource, ResourceStream, ScanPolicy, SourceCore, SourceKind};
use crate::streamer::ClassStreamer;

pub trait ResourceLoader: Debug {
    /// `Ok(None)` when no entry of the loader holds `resource_name`.
    fn open_resource(&self, resource_name: &str) -> Result<Option<ResourceStream>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassPathEntry {
    Directory(PathBuf),
    Jar(PathBuf),
}

impl ClassPathEntry {
    pub fn path(&self) -> &Path {
        match self {
            ClassPathEntry::Directory(path) | ClassPathEntry::Jar(path) => path,
        }
    }

    fn open_resource(&self, resource_name: &str) -> Result<Option<ResourceStream>> {
        match self {
            ClassPathEntry::Directory(root) => {
                let path = root.join(names::native_relative_path(resource_name));
                match File::open(&path) {
                    Ok(file) if path.is_file() => Ok(Some(Box::new(file))),
                    Ok(_) => Ok(None),
                    Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
                    Err(source) => Err(ClassSourceError::Open { path, source }),
                }
            }
            ClassPathEntry::Jar(jar) => {
                let mut archive = open_archive(jar)?;
                let mut entry = match archive.by_name(resource_name) {
                    Ok(entry) => entry,
                    Err(ZipError::FileNotFound) => return Ok(None),
                    Err(source) => {
                        return Err(ClassSourceError::Archive {
                            path: jar.clone(),
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
                    .map_err(|err| ClassSourceError::read(&jar.to_string_lossy(), resource_name, err))?;
                Ok(Some(Box::new(Cursor::new(bytes))))
            }
        }
    }
}

/// Ordered class path; the first entry holding a resource wins.
#[derive(Debug, Clone, Default)]
pub struct ClassPathLoader {
    entries: Vec<ClassPathEntry>,
}

impl ClassPathLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries ending in `.jar` are archives, everything else a directory.
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut loader = Self::new();
        for path in paths {
            let path = path.into();
            let is_jar = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("jar"));
            if is_jar {
                loader.push(ClassPathEntry::Jar(path));
            } else {
                loader.push(ClassPathEntry::Directory(path));
            }
        }
        loader
    }

    /// Splits a platform class path string (`:` or `;` separated).
    pub fn parse(class_path: &str) -> Self {
        Self::from_paths(std::env::split_paths(class_path).filter(|p| !p.as_os_str().is_empty()))
    }

    pub fn push(&mut self, entry: ClassPathEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ClassPathEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ResourceLoader for ClassPathLoader {
    fn open_resource(&self, resource_name: &str) -> Result<Option<ResourceStream>> {
        for entry in &self.entries {
            if let Some(stream) = entry.open_resource(resource_name)? {
                return Ok(Some(stream));
            }
        }
        Ok(None)
    }
}

#[derive(Debug)]
pub struct ClassLoaderClassSource {
    core: SourceCore,
    loader: Box<dyn ResourceLoader>,
}

impl ClassLoaderClassSource {
    pub fn new(name: impl Into<String>, options: ScanOptions, loader: Box<dyn ResourceLoader>) -> Self {
        Self {
            core: SourceCore::new(SourceKind::ClassLoader, name, options),
            loader,
        }
    }
}

impl ClassSource for ClassLoaderClassSource {
    fn core(&self) -> &SourceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SourceCore {
        &mut self.core
    }

    fn open(&mut self) -> Result<()> {
        debug!(source = %self.core.hash_text(), "open");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        debug!(source = %self.core.hash_text(), "close");
        Ok(())
    }

    fn open_resource_stream(
        &mut self,
        _class_name: &str,
        resource_name: &str,
    ) -> Result<Option<ResourceStream>> {
        self.loader.open_resource(resource_name)
    }

    fn process_from_scratch(
        &mut self,
        _streamer: &mut dyn ClassStreamer,
        _seeds: &mut SeedSet,
        policy: ScanPolicy,
    ) -> Result<()> {
        debug!(
            source = %self.core.hash_text(),
            policy = %policy,
            "class loaders cannot enumerate classes; nothing scanned"
        );
        Ok(())
    }
}
