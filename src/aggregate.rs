//! An ordered set of child class sources scanned and resolved as one.
//!
//! Children are partitioned by [`ScanPolicy`]: seed and partial children are
//! scanned in insertion order (so the first child holding a class wins), while
//! external children only take part in resolution and excluded children in
//! neither.
//!
//! Resolution of a class name by [`ClassSource::open_resource_stream`] is
//! cached for the lifetime of the aggregate, across open/close cycles. The
//! cache assumes child contents do not change while the aggregate lives;
//! reusing an aggregate after its children changed on disk gives undefined
//! (stale) answers, so build a new aggregate instead.

use lasso::{Rodeo, Spur};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, warn};

use crate::config::ScanOptions;
use crate::counters::ScanCounters;
use crate::error::{ClassSourceError, Result};
use crate::seeds::SeedSet;
use crate::source::{ClassSource, ResourceStream, ScanPolicy, SourceCore, SourceKind};
use crate::streamer::ClassStreamer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildState {
    Unopened,
    Open,
    /// Open failed once; the child is ignored for the rest of the aggregate's life.
    Failed,
}

impl fmt::Display for ChildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChildState::Unopened => "unopened",
            ChildState::Open => "open",
            ChildState::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Found(usize),
    Absent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LookupStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Calls made into children while searching.
    pub child_lookups: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChildReport {
    pub name: String,
    pub kind: SourceKind,
    pub policy: ScanPolicy,
    pub state: ChildState,
    pub counts: ScanCounters,
}

#[derive(Debug)]
struct Child {
    id: usize,
    source: Box<dyn ClassSource>,
    policy: ScanPolicy,
    state: ChildState,
    failed_lookups: HashSet<Spur>,
}

impl Child {
    fn is_open(&self) -> bool {
        self.state == ChildState::Open
    }
}

pub struct AggregateClassSource {
    core: SourceCore,
    app_name: String,
    module_name: String,
    children: Vec<Child>,
    next_child_id: usize,
    open_count: u32,
    lookup_names: Rodeo,
    results: HashMap<Spur, Resolution>,
    stats: LookupStats,
}

impl fmt::Debug for AggregateClassSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateClassSource")
            .field("name", &self.core.canonical_name())
            .field("children", &self.children.len())
            .field("open_count", &self.open_count)
            .field("cached_results", &self.results.len())
            .finish()
    }
}

impl AggregateClassSource {
    pub fn new(app_name: impl Into<String>, module_name: impl Into<String>, options: ScanOptions) -> Self {
        let app_name = app_name.into();
        let module_name = module_name.into();
        let name = if module_name.is_empty() {
            app_name.clone()
        } else {
            format!("{app_name}/{module_name}")
        };
        Self {
            core: SourceCore::new(SourceKind::Aggregate, name, options),
            app_name,
            module_name,
            children: Vec::new(),
            next_child_id: 0,
            open_count: 0,
            lookup_names: Rodeo::default(),
            results: HashMap::new(),
            stats: LookupStats::default(),
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn open_count(&self) -> u32 {
        self.open_count
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Appends a child. A child added while the aggregate is open stays
    /// unopened until the aggregate is next opened from closed.
    pub fn add_class_source(&mut self, source: Box<dyn ClassSource>, policy: ScanPolicy) -> Result<()> {
        let position = self.children.len();
        self.insert_class_source(position, source, policy)
    }

    /// Inserts a child at `position` in scan order (clamped to the end).
    pub fn insert_class_source(
        &mut self,
        position: usize,
        source: Box<dyn ClassSource>,
        policy: ScanPolicy,
    ) -> Result<()> {
        let name = source.canonical_name().to_string();
        if self.children.iter().any(|c| c.source.canonical_name() == name) {
            return Err(ClassSourceError::DuplicateSource(name));
        }
        debug!(
            aggregate = %self.core.canonical_name(),
            source = %source.core().hash_text(),
            policy = %policy,
            "added class source"
        );
        let child = Child {
            id: self.next_child_id,
            source,
            policy,
            state: ChildState::Unopened,
            failed_lookups: HashSet::new(),
        };
        self.next_child_id += 1;
        let position = position.min(self.children.len());
        self.children.insert(position, child);
        Ok(())
    }

    pub fn scan_policy(&self, name: &str) -> Option<ScanPolicy> {
        self.find_child(name).map(|c| c.policy)
    }

    pub fn child_state(&self, name: &str) -> Option<ChildState> {
        self.find_child(name).map(|c| c.state)
    }

    pub fn child(&self, name: &str) -> Option<&dyn ClassSource> {
        self.find_child(name).map(|c| c.source.as_ref())
    }

    /// Canonical names of the children with `policy`, in scan order.
    pub fn source_names(&self, policy: ScanPolicy) -> Vec<&str> {
        self.children
            .iter()
            .filter(|c| c.policy == policy)
            .map(|c| c.source.canonical_name())
            .collect()
    }

    pub fn reports(&self) -> Vec<ChildReport> {
        self.children
            .iter()
            .map(|c| ChildReport {
                name: c.source.canonical_name().to_string(),
                kind: c.source.kind(),
                policy: c.policy,
                state: c.state,
                counts: c.source.counters().clone(),
            })
            .collect()
    }

    pub fn lookup_stats(&self) -> LookupStats {
        self.stats
    }

    /// Canonical name of the child a previous lookup settled on.
    pub fn resolved_source(&self, class_name: &str) -> Option<&str> {
        let key = self.lookup_names.get(class_name)?;
        match self.results.get(&key)? {
            Resolution::Found(id) => self.child_by_id(*id).map(|c| c.source.canonical_name()),
            Resolution::Absent => None,
        }
    }

    fn find_child(&self, name: &str) -> Option<&Child> {
        self.children
            .iter()
            .find(|c| c.source.canonical_name() == name || c.source.name() == name)
    }

    fn child_by_id(&self, id: usize) -> Option<&Child> {
        self.children.iter().find(|c| c.id == id)
    }

    fn child_by_id_mut(&mut self, id: usize) -> Option<&mut Child> {
        self.children.iter_mut().find(|c| c.id == id)
    }

    fn open_children(&mut self) {
        for child in &mut self.children {
            if child.state != ChildState::Unopened {
                continue;
            }
            match child.source.open() {
                Ok(()) => child.state = ChildState::Open,
                Err(err) => {
                    warn!(
                        aggregate = %self.core.canonical_name(),
                        source = %child.source.core().hash_text(),
                        error = %err,
                        "failed to open class source; ignoring it from now on"
                    );
                    child.state = ChildState::Failed;
                }
            }
        }
    }

    fn close_children(&mut self) {
        for child in &mut self.children {
            if !child.is_open() {
                continue;
            }
            if let Err(err) = child.source.close() {
                warn!(
                    aggregate = %self.core.canonical_name(),
                    source = %child.source.core().hash_text(),
                    error = %err,
                    "failed to close class source"
                );
            }
            child.state = ChildState::Unopened;
        }
    }
}

impl ClassSource for AggregateClassSource {
    fn core(&self) -> &SourceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SourceCore {
        &mut self.core
    }

    fn open(&mut self) -> Result<()> {
        if self.open_count == 0 {
            self.open_children();
            debug!(source = %self.core.hash_text(), "opened children");
        }
        self.open_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.open_count == 0 {
            warn!(source = %self.core.hash_text(), "close of a closed aggregate");
            return Err(ClassSourceError::state(
                self.core.canonical_name(),
                "close of a closed aggregate",
            ));
        }
        self.open_count -= 1;
        if self.open_count == 0 {
            self.close_children();
            debug!(source = %self.core.hash_text(), "closed children");
        }
        Ok(())
    }

    /// Resolves through the children. A child that errors is still recorded
    /// as the answer for `class_name` before the error is returned, so later
    /// lookups go straight back to it.
    fn open_resource_stream(
        &mut self,
        class_name: &str,
        _resource_name: &str,
    ) -> Result<Option<ResourceStream>> {
        let key = self.lookup_names.get_or_intern(class_name);
        match self.results.get(&key).copied() {
            Some(Resolution::Absent) => {
                self.stats.cache_hits += 1;
                return Ok(None);
            }
            Some(Resolution::Found(id)) => {
                self.stats.cache_hits += 1;
                return match self.child_by_id_mut(id) {
                    Some(child) => child.source.open_class_stream(class_name),
                    None => Ok(None),
                };
            }
            None => self.stats.cache_misses += 1,
        }

        for child in &mut self.children {
            if !child.is_open() || !child.policy.is_resolvable() || child.failed_lookups.contains(&key) {
                continue;
            }
            self.stats.child_lookups += 1;
            match child.source.open_class_stream(class_name) {
                Ok(Some(stream)) => {
                    self.results.insert(key, Resolution::Found(child.id));
                    return Ok(Some(stream));
                }
                Ok(None) => {
                    child.failed_lookups.insert(key);
                }
                Err(err) => {
                    self.results.insert(key, Resolution::Found(child.id));
                    warn!(
                        aggregate = %self.core.canonical_name(),
                        source = %child.source.core().hash_text(),
                        class = class_name,
                        error = %err,
                        "lookup failed"
                    );
                    return Err(err);
                }
            }
        }

        self.results.insert(key, Resolution::Absent);
        Ok(None)
    }

    fn close_resource_stream(&mut self, class_name: &str, _resource_name: &str) -> Result<()> {
        let Some(key) = self.lookup_names.get(class_name) else {
            return Ok(());
        };
        let Some(Resolution::Found(id)) = self.results.get(&key).copied() else {
            return Ok(());
        };
        match self.child_by_id_mut(id) {
            Some(child) => {
                let resource_name = child.source.resource_name_from_class_name(class_name);
                child.source.close_resource_stream(class_name, &resource_name)
            }
            None => Ok(()),
        }
    }

    /// Scans every open seed and partial child in order, each under its own
    /// policy. A child that fails to scan is logged and skipped.
    fn process_from_scratch(
        &mut self,
        streamer: &mut dyn ClassStreamer,
        seeds: &mut SeedSet,
        _policy: ScanPolicy,
    ) -> Result<()> {
        for child in &mut self.children {
            if !child.is_open() || !child.policy.is_scanned() {
                continue;
            }
            let before = child.source.counters().clone();
            if let Err(err) = child.source.scan_classes(streamer, seeds, child.policy) {
                warn!(
                    aggregate = %self.core.canonical_name(),
                    source = %child.source.core().hash_text(),
                    error = %err,
                    "failed to scan class source"
                );
            }
            let delta = child.source.counters().since(&before);
            self.core.counters_mut().merge(&delta);
        }
        Ok(())
    }

    fn log_state(&self) {
        debug!(
            source = %self.core.hash_text(),
            open_count = self.open_count,
            children = self.children.len(),
            counts = %self.core.counters(),
            lookups = ?self.stats,
            "aggregate state"
        );
        for child in &self.children {
            debug!(policy = %child.policy, state = %child.state, "child");
            child.source.log_state();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::ScanCount;
    use crate::jar::JarClassSource;
    use crate::provider::{MemoryProvider, SimpleProviderClassSource};
    use crate::source::{ClassScan, ScanContext};
    use crate::streamer::CollectingStreamer;
    use std::cell::Cell;
    use std::io::{Cursor, Read};
    use std::rc::Rc;

    #[derive(Debug, Default)]
    struct Calls {
        opens: Cell<u32>,
        lookups: Cell<u32>,
    }

    #[derive(Debug)]
    struct CountingSource {
        core: SourceCore,
        classes: Vec<(&'static str, &'static [u8])>,
        fail_open: bool,
        fail_lookup: Option<&'static str>,
        calls: Rc<Calls>,
    }

    impl CountingSource {
        fn new(name: &str, classes: &[(&'static str, &'static [u8])]) -> (Self, Rc<Calls>) {
            let calls = Rc::new(Calls::default());
            let source = Self {
                core: SourceCore::new(SourceKind::SimpleProvider, name, ScanOptions::new(false)),
                classes: classes.to_vec(),
                fail_open: false,
                fail_lookup: None,
                calls: Rc::clone(&calls),
            };
            (source, calls)
        }
    }

    impl ClassSource for CountingSource {
        fn core(&self) -> &SourceCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut SourceCore {
            &mut self.core
        }

        fn open(&mut self) -> Result<()> {
            self.calls.opens.set(self.calls.opens.get() + 1);
            if self.fail_open {
                return Err(ClassSourceError::state(self.core.canonical_name(), "cannot open"));
            }
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }

        fn open_resource_stream(
            &mut self,
            class_name: &str,
            _resource_name: &str,
        ) -> Result<Option<ResourceStream>> {
            self.calls.lookups.set(self.calls.lookups.get() + 1);
            if self.fail_lookup == Some(class_name) {
                return Err(ClassSourceError::state(self.core.canonical_name(), "lookup broke"));
            }
            Ok(self
                .classes
                .iter()
                .find(|(name, _)| *name == class_name)
                .map(|(_, bytes)| Box::new(Cursor::new(bytes.to_vec())) as ResourceStream))
        }

        fn process_from_scratch(
            &mut self,
            streamer: &mut dyn ClassStreamer,
            seeds: &mut SeedSet,
            policy: ScanPolicy,
        ) -> Result<()> {
            let source_name = self.core.canonical_name().to_string();
            let counters = self.core.counters_mut();
            let mut ctx = ScanContext::new(streamer, seeds, &source_name, policy);
            for (name, bytes) in &self.classes {
                counters.add(ScanCount::Entry);
                ctx.visit_class(counters, name, || Ok(Some(Cursor::new(*bytes))));
            }
            Ok(())
        }
    }

    fn provider(name: &str, classes: &[(&str, &[u8])]) -> Box<dyn ClassSource> {
        let mut provider = MemoryProvider::new(name);
        for (class_name, bytes) in classes {
            provider.insert(crate::names::resource_name_from_class_name(class_name), bytes.to_vec());
        }
        Box::new(SimpleProviderClassSource::new(ScanOptions::new(false), Box::new(provider)))
    }

    fn read_all(mut stream: ResourceStream) -> anyhow::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    #[test]
    fn first_source_wins_in_insertion_order() -> anyhow::Result<()> {
        let mut aggregate = AggregateClassSource::new("app", "web", ScanOptions::new(false));
        aggregate.add_class_source(provider("first", &[("a.B", b"first")]), ScanPolicy::Seed)?;
        aggregate.add_class_source(
            provider("second", &[("a.B", b"second"), ("a.C", b"C")]),
            ScanPolicy::Partial,
        )?;

        let mut streamer = CollectingStreamer::new();
        let mut seeds = SeedSet::new();
        aggregate.open()?;
        aggregate.scan_classes(&mut streamer, &mut seeds, ScanPolicy::Seed)?;
        aggregate.close()?;

        let classes = streamer.classes();
        assert_eq!(streamer.class_names(), vec!["a.B", "a.C"]);
        assert_eq!(classes[0].source, "first");
        assert_eq!(classes[0].policy, ScanPolicy::Seed);
        assert_eq!(classes[1].policy, ScanPolicy::Partial);
        assert_eq!(aggregate.counters().get(ScanCount::IncludedClass), 2);
        assert_eq!(aggregate.counters().get(ScanCount::DuplicateClass), 1);
        assert_eq!(aggregate.canonical_name(), "app/web");
        Ok(())
    }

    #[test]
    fn rescanning_only_counts_duplicates() -> anyhow::Result<()> {
        let mut aggregate = AggregateClassSource::new("app", "", ScanOptions::new(false));
        aggregate.add_class_source(provider("only", &[("a.B", b"B")]), ScanPolicy::Seed)?;
        let mut streamer = CollectingStreamer::new();
        let mut seeds = SeedSet::new();
        aggregate.open()?;
        aggregate.scan_classes(&mut streamer, &mut seeds, ScanPolicy::Seed)?;
        let after_first = aggregate.counters().clone();
        aggregate.scan_classes(&mut streamer, &mut seeds, ScanPolicy::Seed)?;
        aggregate.close()?;

        let delta = aggregate.counters().since(&after_first);
        assert_eq!(delta.get(ScanCount::IncludedClass), 0);
        assert_eq!(delta.get(ScanCount::DuplicateClass), 1);
        assert_eq!(streamer.classes().len(), 1);
        Ok(())
    }

    #[test]
    fn a_child_that_fails_to_open_is_ignored_for_good() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let (mut broken, calls) = CountingSource::new("broken", &[("x.Y", b"Y")]);
        broken.fail_open = true;

        let mut aggregate = AggregateClassSource::new("app", "ejb", ScanOptions::new(false));
        aggregate.add_class_source(Box::new(broken), ScanPolicy::Seed)?;
        aggregate.add_class_source(
            Box::new(JarClassSource::new(ScanOptions::new(false), dir.path().join("missing.jar"))),
            ScanPolicy::Seed,
        )?;
        aggregate.add_class_source(provider("good", &[("a.B", b"B")]), ScanPolicy::Seed)?;

        for _ in 0..2 {
            let mut streamer = CollectingStreamer::new();
            let mut seeds = SeedSet::new();
            aggregate.open()?;
            aggregate.scan_classes(&mut streamer, &mut seeds, ScanPolicy::Seed)?;
            assert_eq!(streamer.class_names(), vec!["a.B"]);
            assert!(aggregate.open_class_stream("x.Y")?.is_none());
            aggregate.close()?;
        }

        assert_eq!(calls.opens.get(), 1);
        assert_eq!(calls.lookups.get(), 0);
        assert_eq!(aggregate.child_state("broken"), Some(ChildState::Failed));
        assert_eq!(aggregate.child_state("good"), Some(ChildState::Unopened));
        Ok(())
    }

    #[test]
    fn failed_lookups_are_not_retried() -> anyhow::Result<()> {
        let (first, first_calls) = CountingSource::new("first", &[("a.B", b"B")]);
        let (second, second_calls) = CountingSource::new("second", &[]);
        let mut aggregate = AggregateClassSource::new("app", "m", ScanOptions::new(false));
        aggregate.add_class_source(Box::new(first), ScanPolicy::Seed)?;
        aggregate.add_class_source(Box::new(second), ScanPolicy::External)?;
        aggregate.open()?;

        assert!(aggregate.open_class_stream("a.Missing")?.is_none());
        assert!(aggregate.open_class_stream("a.Missing")?.is_none());
        assert_eq!(first_calls.lookups.get(), 1);
        assert_eq!(second_calls.lookups.get(), 1);

        let stats = aggregate.lookup_stats();
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.child_lookups, 2);
        aggregate.close()?;
        Ok(())
    }

    #[test]
    fn cached_success_sticks_to_the_first_answer() -> anyhow::Result<()> {
        let mut aggregate = AggregateClassSource::new("app", "m", ScanOptions::new(false));
        aggregate.add_class_source(provider("later", &[("a.B", b"later")]), ScanPolicy::Seed)?;
        aggregate.open()?;
        let bytes = read_all(aggregate.open_class_stream("a.B")?.expect("a.B resolves"))?;
        assert_eq!(bytes, b"later");
        aggregate.close()?;

        aggregate.insert_class_source(0, provider("earlier", &[("a.B", b"earlier")]), ScanPolicy::Seed)?;
        aggregate.open()?;
        assert_eq!(aggregate.child_state("earlier"), Some(ChildState::Open));
        let bytes = read_all(aggregate.open_class_stream("a.B")?.expect("a.B resolves"))?;
        assert_eq!(bytes, b"later");
        assert_eq!(aggregate.resolved_source("a.B"), Some("later"));
        aggregate.close()?;
        Ok(())
    }

    #[test]
    fn a_throwing_child_is_recorded_before_the_error_surfaces() -> anyhow::Result<()> {
        let (mut flaky, flaky_calls) = CountingSource::new("flaky", &[]);
        flaky.fail_lookup = Some("a.Bad");
        let (backup, backup_calls) = CountingSource::new("backup", &[("a.Bad", b"ok")]);

        let mut aggregate = AggregateClassSource::new("app", "m", ScanOptions::new(false));
        aggregate.add_class_source(Box::new(flaky), ScanPolicy::Seed)?;
        aggregate.add_class_source(Box::new(backup), ScanPolicy::Seed)?;
        aggregate.open()?;

        assert!(aggregate.open_class_stream("a.Bad").is_err());
        assert!(aggregate.open_class_stream("a.Bad").is_err());
        assert_eq!(flaky_calls.lookups.get(), 2);
        assert_eq!(backup_calls.lookups.get(), 0);
        assert_eq!(aggregate.resolved_source("a.Bad"), Some("flaky"));
        aggregate.close()?;
        Ok(())
    }

    #[test]
    fn policies_partition_scanning_and_resolution() -> anyhow::Result<()> {
        let mut aggregate = AggregateClassSource::new("app", "m", ScanOptions::new(false));
        aggregate.add_class_source(provider("seed", &[("a.S", b"S")]), ScanPolicy::Seed)?;
        aggregate.add_class_source(provider("excluded", &[("a.X", b"X")]), ScanPolicy::Excluded)?;
        aggregate.add_class_source(provider("external", &[("a.E", b"E")]), ScanPolicy::External)?;

        let mut streamer = CollectingStreamer::new();
        let mut seeds = SeedSet::new();
        aggregate.open()?;
        aggregate.scan_classes(&mut streamer, &mut seeds, ScanPolicy::Seed)?;
        assert_eq!(streamer.class_names(), vec!["a.S"]);
        assert!(!seeds.contains("a.E"));

        assert!(aggregate.open_class_stream("a.X")?.is_none());
        let mut referenced = CollectingStreamer::new();
        assert_eq!(
            aggregate.scan_referenced_class("a.E", &mut referenced)?,
            ClassScan::Processed
        );
        assert_eq!(aggregate.resolved_source("a.E"), Some("external"));
        aggregate.close()?;

        assert_eq!(aggregate.source_names(ScanPolicy::External), vec!["external"]);
        assert_eq!(aggregate.scan_policy("excluded"), Some(ScanPolicy::Excluded));
        assert_eq!(aggregate.scan_policy("nope"), None);
        Ok(())
    }

    #[test]
    fn lifecycle_is_reference_counted() -> anyhow::Result<()> {
        let (child, calls) = CountingSource::new("child", &[]);
        let mut aggregate = AggregateClassSource::new("app", "m", ScanOptions::new(false));
        aggregate.add_class_source(Box::new(child), ScanPolicy::Seed)?;

        aggregate.open()?;
        aggregate.open()?;
        assert_eq!(calls.opens.get(), 1);
        aggregate.close()?;
        assert_eq!(aggregate.child_state("child"), Some(ChildState::Open));
        aggregate.close()?;
        assert_eq!(aggregate.child_state("child"), Some(ChildState::Unopened));
        assert!(aggregate.close().is_err());

        aggregate.open()?;
        assert_eq!(calls.opens.get(), 2);
        aggregate.close()?;
        Ok(())
    }

    #[test]
    fn children_added_while_open_wait_for_the_next_open() -> anyhow::Result<()> {
        let mut aggregate = AggregateClassSource::new("app", "m", ScanOptions::new(false));
        aggregate.open()?;
        aggregate.add_class_source(provider("late", &[("a.L", b"L")]), ScanPolicy::Seed)?;
        assert_eq!(aggregate.child_state("late"), Some(ChildState::Unopened));

        let mut streamer = CollectingStreamer::new();
        let mut seeds = SeedSet::new();
        aggregate.scan_classes(&mut streamer, &mut seeds, ScanPolicy::Seed)?;
        assert!(streamer.classes().is_empty());
        aggregate.close()?;
        Ok(())
    }

    #[test]
    fn duplicate_child_names_are_rejected() -> anyhow::Result<()> {
        let mut aggregate = AggregateClassSource::new("app", "m", ScanOptions::new(false));
        aggregate.add_class_source(provider("dup", &[]), ScanPolicy::Seed)?;
        let err = aggregate
            .add_class_source(provider("dup", &[]), ScanPolicy::External)
            .expect_err("duplicate name");
        assert!(matches!(err, ClassSourceError::DuplicateSource(name) if name == "dup"));
        assert_eq!(aggregate.len(), 1);
        Ok(())
    }
}
