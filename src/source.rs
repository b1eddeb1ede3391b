//! The class source capability and the scan algorithm shared by every variant.
//!
//! A variant supplies the physical operations (open/close, entry traversal,
//! opening a resource or its index). Everything else lives here as provided
//! methods on [`ClassSource`]:
//!
//! - `scan_classes` tries the index fast path and falls back to the variant's
//!   full traversal;
//! - `scan_class` streams a single named class, used for specific seed classes
//!   and for referenced classes resolved on demand;
//! - [`ScanContext::visit_class`] is the per-class step of every traversal
//!   (reserved-name skip, first-source-wins add, filter, stream, count).

use serde::Serialize;
use std::fmt::{self, Debug};
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::ScanOptions;
use crate::counters::{ScanCount, ScanCounters};
use crate::error::{ClassSourceError, Result};
use crate::index::{ClassIndex, IndexReader, JsonIndexReader};
use crate::names;
use crate::seeds::SeedSet;
use crate::streamer::ClassStreamer;

/// Owned byte stream for one resource. Dropping it closes it.
pub type ResourceStream = Box<dyn Read>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPolicy {
    /// Primary classes of the scan.
    Seed,
    /// Scanned and masked like seeds, but not owned by the scan target.
    Partial,
    /// Never scanned, never used for resolution.
    Excluded,
    /// Never scanned; only used to resolve referenced classes.
    External,
}

impl ScanPolicy {
    pub const ALL: [ScanPolicy; 4] = [
        ScanPolicy::Seed,
        ScanPolicy::Partial,
        ScanPolicy::Excluded,
        ScanPolicy::External,
    ];

    pub fn value(self) -> u8 {
        match self {
            ScanPolicy::Seed => 0x01,
            ScanPolicy::Partial => 0x02,
            ScanPolicy::Excluded => 0x04,
            ScanPolicy::External => 0x08,
        }
    }

    pub fn is_scanned(self) -> bool {
        matches!(self, ScanPolicy::Seed | ScanPolicy::Partial)
    }

    pub fn is_resolvable(self) -> bool {
        !matches!(self, ScanPolicy::Excluded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScanPolicy::Seed => "seed",
            ScanPolicy::Partial => "partial",
            ScanPolicy::Excluded => "excluded",
            ScanPolicy::External => "external",
        }
    }
}

impl fmt::Display for ScanPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Aggregate,
    Directory,
    Jar,
    Container,
    ClassLoader,
    SimpleProvider,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SourceKind::Aggregate => "aggregate",
            SourceKind::Directory => "directory",
            SourceKind::Jar => "jar",
            SourceKind::Container => "container",
            SourceKind::ClassLoader => "class_loader",
            SourceKind::SimpleProvider => "simple_provider",
        };
        f.write_str(text)
    }
}

/// Outcome of streaming one named class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassScan {
    Processed,
    /// The streamer declined the class; no I/O was done.
    Filtered,
    /// The source has no resource for the class.
    Absent,
}

/// Identity, options and counters shared by every variant.
#[derive(Debug, Clone)]
pub struct SourceCore {
    kind: SourceKind,
    name: String,
    canonical_name: String,
    options: ScanOptions,
    counters: ScanCounters,
    index_reader: Arc<dyn IndexReader>,
}

impl SourceCore {
    pub fn new(kind: SourceKind, name: impl Into<String>, options: ScanOptions) -> Self {
        let name = name.into();
        let canonical_name = names::canonicalize(&name);
        Self {
            kind,
            name,
            canonical_name,
            options,
            counters: ScanCounters::new(),
            index_reader: Arc::new(JsonIndexReader),
        }
    }

    pub fn with_index_reader(mut self, reader: Arc<dyn IndexReader>) -> Self {
        self.index_reader = reader;
        self
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn canonical_name(&self) -> &str {
        &self.canonical_name
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn counters(&self) -> &ScanCounters {
        &self.counters
    }

    pub fn counters_mut(&mut self) -> &mut ScanCounters {
        &mut self.counters
    }

    pub fn index_reader(&self) -> Arc<dyn IndexReader> {
        Arc::clone(&self.index_reader)
    }

    pub fn set_index_reader(&mut self, reader: Arc<dyn IndexReader>) {
        self.index_reader = reader;
    }

    /// Diagnostic text, e.g. `jar(/apps/lib/util.jar)`.
    pub fn hash_text(&self) -> String {
        format!("{}({})", self.kind, self.canonical_name)
    }
}

pub trait ClassSource: Debug {
    fn core(&self) -> &SourceCore;

    fn core_mut(&mut self) -> &mut SourceCore;

    fn open(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    /// Opens the resource backing `class_name`. `Ok(None)` when absent.
    fn open_resource_stream(
        &mut self,
        class_name: &str,
        resource_name: &str,
    ) -> Result<Option<ResourceStream>>;

    /// Releases per-resource state after a stream was consumed.
    fn close_resource_stream(&mut self, _class_name: &str, _resource_name: &str) -> Result<()> {
        Ok(())
    }

    /// Opens the pre-built index, if this source has one.
    fn open_index_stream(&mut self) -> Result<Option<ResourceStream>> {
        Ok(None)
    }

    /// Full traversal of the physical structure.
    fn process_from_scratch(
        &mut self,
        streamer: &mut dyn ClassStreamer,
        seeds: &mut SeedSet,
        policy: ScanPolicy,
    ) -> Result<()>;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn canonical_name(&self) -> &str {
        self.core().canonical_name()
    }

    fn kind(&self) -> SourceKind {
        self.core().kind()
    }

    fn counters(&self) -> &ScanCounters {
        self.core().counters()
    }

    fn resource_name_from_class_name(&self, class_name: &str) -> String {
        names::resource_name_from_class_name(class_name)
    }

    fn class_name_from_resource_name(&self, resource_name: &str) -> String {
        names::class_name_from_resource_name(resource_name)
    }

    fn open_class_stream(&mut self, class_name: &str) -> Result<Option<ResourceStream>> {
        let resource_name = self.resource_name_from_class_name(class_name);
        self.open_resource_stream(class_name, &resource_name)
    }

    fn scan_classes(
        &mut self,
        streamer: &mut dyn ClassStreamer,
        seeds: &mut SeedSet,
        policy: ScanPolicy,
    ) -> Result<()> {
        let before = self.counters().clone();
        if self.process_from_cache(streamer, seeds, policy)? {
            debug!(source = %self.core().hash_text(), "scanned from index");
        } else {
            self.process_from_scratch(streamer, seeds, policy)?;
            debug!(source = %self.core().hash_text(), "scanned from scratch");
        }
        debug!(
            source = %self.core().hash_text(),
            counts = %self.counters().since(&before),
            "scan complete"
        );
        Ok(())
    }

    /// Index fast path. `Ok(false)` sends the caller to the full traversal.
    fn process_from_cache(
        &mut self,
        streamer: &mut dyn ClassStreamer,
        seeds: &mut SeedSet,
        policy: ScanPolicy,
    ) -> Result<bool> {
        if !self.core().options().use_jandex() {
            if tracing::enabled!(tracing::Level::DEBUG) && self.has_index() {
                debug!(source = %self.core().hash_text(), "index present but disabled");
            }
            return Ok(false);
        }

        let Some(index) = self.read_index() else {
            return Ok(false);
        };

        let source_name = self.canonical_name().to_string();
        let mut ctx = ScanContext::new(streamer, seeds, &source_name, policy);
        let counters = self.core_mut().counters_mut();
        for summary in &index.classes {
            counters.add(ScanCount::Entry);
            ctx.visit_summary(counters, summary);
        }
        Ok(true)
    }

    fn has_index(&mut self) -> bool {
        matches!(self.open_index_stream(), Ok(Some(_)))
    }

    /// Reads and decodes the index. Missing, unreadable and undecodable
    /// indexes all yield `None`.
    fn read_index(&mut self) -> Option<ClassIndex> {
        let reader = self.core().index_reader();
        let mut stream = match self.open_index_stream() {
            Ok(Some(stream)) => stream,
            Ok(None) => return None,
            Err(err) => {
                warn!(source = %self.core().hash_text(), error = %err, "failed to open index");
                return None;
            }
        };
        match reader.read_index(&mut stream) {
            Ok(index) => {
                debug!(
                    source = %self.core().hash_text(),
                    classes = index.len(),
                    "read class index"
                );
                Some(index)
            }
            Err(err) => {
                warn!(source = %self.core().hash_text(), error = %err, "failed to read index");
                None
            }
        }
    }

    fn scan_specific_seed_class(
        &mut self,
        class_name: &str,
        streamer: &mut dyn ClassStreamer,
    ) -> Result<ClassScan> {
        self.scan_class(class_name, streamer, ScanPolicy::Seed)
    }

    fn scan_referenced_class(
        &mut self,
        class_name: &str,
        streamer: &mut dyn ClassStreamer,
    ) -> Result<ClassScan> {
        self.scan_class(class_name, streamer, ScanPolicy::External)
    }

    /// Streams one class. Open and processing failures propagate; the stream
    /// is released either way and release failures are only logged.
    fn scan_class(
        &mut self,
        class_name: &str,
        streamer: &mut dyn ClassStreamer,
        policy: ScanPolicy,
    ) -> Result<ClassScan> {
        if !streamer.do_process(class_name, policy) {
            return Ok(ClassScan::Filtered);
        }

        let resource_name = self.resource_name_from_class_name(class_name);
        let source_name = self.canonical_name().to_string();
        let processed = {
            let Some(mut stream) = self.open_resource_stream(class_name, &resource_name)? else {
                return Ok(ClassScan::Absent);
            };
            streamer.process(&source_name, class_name, &mut stream, policy)
        };

        if let Err(err) = self.close_resource_stream(class_name, &resource_name) {
            warn!(source = %source_name, class = class_name, error = %err, "failed to close resource");
        }

        processed.map_err(|source| ClassSourceError::Process {
            source_name,
            class_name: class_name.to_string(),
            source,
        })?;
        Ok(ClassScan::Processed)
    }

    fn log_state(&self) {
        debug!(
            source = %self.core().hash_text(),
            name = self.name(),
            counts = %self.counters(),
            "class source state"
        );
    }
}

/// The pieces of one scan that every visited entry touches.
pub struct ScanContext<'s> {
    streamer: &'s mut dyn ClassStreamer,
    seeds: &'s mut SeedSet,
    source_name: &'s str,
    policy: ScanPolicy,
}

impl<'s> ScanContext<'s> {
    pub fn new(
        streamer: &'s mut dyn ClassStreamer,
        seeds: &'s mut SeedSet,
        source_name: &'s str,
        policy: ScanPolicy,
    ) -> Self {
        Self {
            streamer,
            seeds,
            source_name,
            policy,
        }
    }

    pub fn source_name(&self) -> &str {
        self.source_name
    }

    /// Claims `class_name` in the seed set. Returns `false` for reserved names
    /// and for classes an earlier source already claimed.
    fn claim(&mut self, counters: &mut ScanCounters, class_name: &str) -> bool {
        if names::is_unsupported_class_name(class_name) {
            counters.add(ScanCount::UnsupportedClass);
            debug!(source = self.source_name, class = class_name, "skipping unsupported class");
            return false;
        }
        if !self.seeds.add(class_name) {
            counters.add(ScanCount::DuplicateClass);
            return false;
        }
        counters.add(ScanCount::IncludedClass);
        true
    }

    /// Per-class step of a full traversal. Never fails: declined classes and
    /// open or processing errors are counted as unprocessed.
    pub fn visit_class<R, F>(&mut self, counters: &mut ScanCounters, class_name: &str, open: F)
    where
        R: Read,
        F: FnOnce() -> Result<Option<R>>,
    {
        counters.add(ScanCount::ClassResource);
        if !self.claim(counters, class_name) {
            return;
        }
        if !self.streamer.do_process(class_name, self.policy) {
            counters.add(ScanCount::UnprocessedClass);
            return;
        }

        let processed = match open() {
            Ok(Some(mut stream)) => {
                match self
                    .streamer
                    .process(self.source_name, class_name, &mut stream, self.policy)
                {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(source = self.source_name, class = class_name, error = %err, "failed to process class");
                        false
                    }
                }
            }
            Ok(None) => {
                warn!(source = self.source_name, class = class_name, "class resource vanished");
                false
            }
            Err(err) => {
                warn!(source = self.source_name, class = class_name, error = %err, "failed to open class");
                false
            }
        };

        counters.add(if processed {
            ScanCount::ProcessedClass
        } else {
            ScanCount::UnprocessedClass
        });
    }

    fn visit_summary(&mut self, counters: &mut ScanCounters, summary: &crate::index::ClassSummary) {
        counters.add(ScanCount::ClassResource);
        if !self.claim(counters, &summary.name) {
            return;
        }
        if !self.streamer.do_process(&summary.name, self.policy) {
            counters.add(ScanCount::UnprocessedClass);
            return;
        }
        match self
            .streamer
            .process_summary(self.source_name, summary, self.policy)
        {
            Ok(()) => counters.add(ScanCount::ProcessedClass),
            Err(err) => {
                warn!(source = self.source_name, class = %summary.name, error = %err, "failed to process indexed class");
                counters.add(ScanCount::UnprocessedClass);
            }
        }
    }

    /// Counts a non-container entry and streams it when it names a class.
    pub fn visit_resource<R, F>(
        &mut self,
        counters: &mut ScanCounters,
        resource_name: &str,
        class_name: impl FnOnce(&str) -> String,
        open: F,
    ) where
        R: Read,
        F: FnOnce() -> Result<Option<R>>,
    {
        counters.add(ScanCount::Resource);
        if !names::is_class_resource(resource_name) {
            counters.add(ScanCount::NonClassResource);
            return;
        }
        let class_name = class_name(resource_name);
        self.visit_class(counters, &class_name, open);
    }
}
