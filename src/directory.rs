use ignore::WalkBuilder;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::config::ScanOptions;
use crate::counters::ScanCount;
use crate::error::{ClassSourceError, Result};
use crate::index::INDEX_PATH;
use crate::names;
use crate::seeds::SeedSet;
use crate::source::{ClassSource, ResourceStream, ScanContext, ScanPolicy, SourceCore, SourceKind};
use crate::streamer::ClassStreamer;

/// Directory names treated as expanded nested deployment units.
pub const NESTED_ARCHIVE_SUFFIXES: [&str; 4] = [".jar", ".war", ".rar", ".ear"];

/// Whether a path segment names a nested deployment unit. A bare suffix such
/// as `.jar` has no stem and does not count.
pub fn is_nested_archive(segment: &str) -> bool {
    let lower = segment.to_ascii_lowercase();
    NESTED_ARCHIVE_SUFFIXES
        .iter()
        .any(|suffix| lower.len() > suffix.len() && lower.ends_with(suffix))
}

/// A class directory such as `WEB-INF/classes` or a build output folder.
///
/// Resource names are kept canonical (`/` separated) everywhere except at the
/// filesystem boundary, where they are converted to native paths.
#[derive(Debug)]
pub struct DirectoryClassSource {
    core: SourceCore,
    root: PathBuf,
    sub_roots: Vec<PathBuf>,
}

impl DirectoryClassSource {
    pub fn new(options: ScanOptions, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root.to_string_lossy().to_string();
        Self::with_name(name, options, root)
    }

    pub fn with_name(name: impl Into<String>, options: ScanOptions, root: impl Into<PathBuf>) -> Self {
        Self {
            core: SourceCore::new(SourceKind::Directory, name, options),
            root: root.into(),
            sub_roots: Vec::new(),
        }
    }

    /// Declares relative directories (canonical form, e.g. `lib/module`) that
    /// belong to separately deployed units and must not be descended into.
    pub fn with_sub_roots<I, S>(mut self, sub_roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.sub_roots
            .extend(sub_roots.into_iter().map(|s| names::native_relative_path(s.as_ref())));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn open_file(&self, resource_name: &str) -> Result<Option<ResourceStream>> {
        let path = self.root.join(names::native_relative_path(resource_name));
        match std::fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => return Ok(None),
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ClassSourceError::Open { path, source }),
        }
        let file = File::open(&path).map_err(|source| ClassSourceError::Open { path, source })?;
        Ok(Some(Box::new(file)))
    }
}

fn is_root_boundary(root: &Path, sub_roots: &[PathBuf], dir: &Path) -> bool {
    let Ok(relative) = dir.strip_prefix(root) else {
        return false;
    };
    if relative.as_os_str().is_empty() {
        return false;
    }
    if sub_roots.iter().any(|sub_root| sub_root == relative) {
        return true;
    }
    dir.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(is_nested_archive)
}

impl ClassSource for DirectoryClassSource {
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
        self.open_file(resource_name)
    }

    fn open_index_stream(&mut self) -> Result<Option<ResourceStream>> {
        self.open_file(INDEX_PATH)
    }

    fn process_from_scratch(
        &mut self,
        streamer: &mut dyn ClassStreamer,
        seeds: &mut SeedSet,
        policy: ScanPolicy,
    ) -> Result<()> {
        let source_name = self.core.canonical_name().to_string();
        if !self.root.is_dir() {
            return Err(ClassSourceError::Open {
                path: self.root.clone(),
                source: std::io::Error::new(ErrorKind::NotFound, "class directory does not exist"),
            });
        }

        let boundaries = Arc::new(Mutex::new(Vec::<PathBuf>::new()));
        let walker = {
            let root = self.root.clone();
            let sub_roots = self.sub_roots.clone();
            let boundaries = Arc::clone(&boundaries);
            WalkBuilder::new(&self.root)
                .hidden(false)
                .ignore(false)
                .parents(false)
                .git_ignore(false)
                .git_global(false)
                .git_exclude(false)
                .follow_links(false)
                .filter_entry(move |entry| {
                    let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                    if is_dir && entry.depth() > 0 && is_root_boundary(&root, &sub_roots, entry.path()) {
                        if let Ok(mut seen) = boundaries.lock() {
                            seen.push(entry.path().to_path_buf());
                        }
                        return false;
                    }
                    true
                })
                .build()
        };

        let counters = self.core.counters_mut();
        let mut ctx = ScanContext::new(streamer, seeds, &source_name, policy);

        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(source = %source_name, error = %err, "failed to read directory entry");
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }
            counters.add(ScanCount::Entry);

            if entry.file_type().is_some_and(|t| t.is_dir()) {
                counters.add(ScanCount::Container);
                counters.add(ScanCount::NonRootContainer);
                continue;
            }

            let path = entry.path();
            let Some(resource_name) = path
                .strip_prefix(&self.root)
                .ok()
                .and_then(names::resource_name_from_relative_path)
            else {
                warn!(source = %source_name, path = %path.display(), "skipping unmappable path");
                continue;
            };
            ctx.visit_resource(
                counters,
                &resource_name,
                names::class_name_from_resource_name,
                || {
                    File::open(path).map(Some).map_err(|source| ClassSourceError::Open {
                        path: path.to_path_buf(),
                        source,
                    })
                },
            );
        }

        let boundaries = boundaries
            .lock()
            .map(|mut seen| std::mem::take(&mut *seen))
            .unwrap_or_default();
        for boundary in boundaries {
            counters.add(ScanCount::Entry);
            counters.add(ScanCount::Container);
            counters.add(ScanCount::RootContainer);
            debug!(source = %source_name, root = %boundary.display(), "not descending into nested root");
        }
        Ok(())
    }
}
