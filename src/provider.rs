use std::fmt::Debug;
use std::io::Cursor;
use tracing::debug;

use crate::config::ScanOptions;
use crate::counters::ScanCount;
use crate::error::Result;
use crate::index::INDEX_PATH;
use crate::names;
use crate::seeds::SeedSet;
use crate::source::{ClassSource, ResourceStream, ScanContext, ScanPolicy, SourceCore, SourceKind};
use crate::streamer::ClassStreamer;

/// A flat resource provider. Names may carry a leading `/`; names ending in
/// `/` are directory placeholders.
pub trait ClassProvider: Debug {
    fn name(&self) -> &str;

    fn resource_names(&self) -> Result<Vec<String>>;

    fn open_resource(&self, resource_name: &str) -> Result<Option<ResourceStream>>;
}

/// In-memory provider keeping resources in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    name: String,
    resources: Vec<(String, Vec<u8>)>,
}

impl MemoryProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: Vec::new(),
        }
    }

    /// Adds or replaces a resource; a replaced resource keeps its position.
    pub fn insert(&mut self, resource_name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        let resource_name = resource_name.into();
        let bytes = bytes.into();
        match self.resources.iter_mut().find(|(name, _)| *name == resource_name) {
            Some((_, existing)) => *existing = bytes,
            None => self.resources.push((resource_name, bytes)),
        }
    }

    pub fn with_resource(mut self, resource_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(resource_name, bytes);
        self
    }

    pub fn with_directory(mut self, directory: &str) -> Self {
        let directory = if directory.ends_with(names::RESOURCE_SEPARATOR) {
            directory.to_string()
        } else {
            format!("{directory}{}", names::RESOURCE_SEPARATOR)
        };
        self.insert(directory, Vec::new());
        self
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl ClassProvider for MemoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn resource_names(&self) -> Result<Vec<String>> {
        Ok(self.resources.iter().map(|(name, _)| name.clone()).collect())
    }

    fn open_resource(&self, resource_name: &str) -> Result<Option<ResourceStream>> {
        if names::is_directory_resource(resource_name) {
            return Ok(None);
        }
        Ok(self
            .resources
            .iter()
            .find(|(name, _)| name == resource_name)
            .map(|(_, bytes)| Box::new(Cursor::new(bytes.clone())) as ResourceStream))
    }
}

#[derive(Debug)]
pub struct SimpleProviderClassSource {
    core: SourceCore,
    provider: Box<dyn ClassProvider>,
}

impl SimpleProviderClassSource {
    pub fn new(options: ScanOptions, provider: Box<dyn ClassProvider>) -> Self {
        let name = provider.name().to_string();
        Self::with_name(name, options, provider)
    }

    pub fn with_name(name: impl Into<String>, options: ScanOptions, provider: Box<dyn ClassProvider>) -> Self {
        Self {
            core: SourceCore::new(SourceKind::SimpleProvider, name, options),
            provider,
        }
    }

    /// Providers disagree on whether names carry a leading separator; try both.
    fn open_either(&self, resource_name: &str) -> Result<Option<ResourceStream>> {
        if let Some(stream) = self.provider.open_resource(resource_name)? {
            return Ok(Some(stream));
        }
        let alternate = match resource_name.strip_prefix(names::RESOURCE_SEPARATOR) {
            Some(stripped) => stripped.to_string(),
            None => format!("{}{resource_name}", names::RESOURCE_SEPARATOR),
        };
        self.provider.open_resource(&alternate)
    }
}

impl ClassSource for SimpleProviderClassSource {
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

    fn class_name_from_resource_name(&self, resource_name: &str) -> String {
        names::class_name_from_provider_resource_name(resource_name)
    }

    fn open_resource_stream(
        &mut self,
        _class_name: &str,
        resource_name: &str,
    ) -> Result<Option<ResourceStream>> {
        self.open_either(resource_name)
    }

    fn open_index_stream(&mut self) -> Result<Option<ResourceStream>> {
        self.open_either(INDEX_PATH)
    }

    fn process_from_scratch(
        &mut self,
        streamer: &mut dyn ClassStreamer,
        seeds: &mut SeedSet,
        policy: ScanPolicy,
    ) -> Result<()> {
        let source_name = self.core.canonical_name().to_string();
        let resource_names = self.provider.resource_names()?;
        let provider = self.provider.as_ref();
        let counters = self.core.counters_mut();
        let mut ctx = ScanContext::new(streamer, seeds, &source_name, policy);

        for resource_name in &resource_names {
            counters.add(ScanCount::Entry);
            if names::is_directory_resource(resource_name) {
                counters.add(ScanCount::Container);
                counters.add(ScanCount::NonRootContainer);
                continue;
            }
            ctx.visit_resource(
                counters,
                resource_name,
                names::class_name_from_provider_resource_name,
                || provider.open_resource(resource_name),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{ClassIndex, ClassSummary, write_index};
    use crate::source::ClassScan;
    use crate::streamer::CollectingStreamer;
    use anyhow::Result;

    fn provider() -> MemoryProvider {
        MemoryProvider::new("generated")
            .with_directory("/a")
            .with_resource("/a/B.class", b"B".to_vec())
            .with_resource("a/C.class", b"C".to_vec())
            .with_resource("/META-INF/versions/9/a/B.class", b"B9".to_vec())
            .with_resource("/a/notes.txt", b"n".to_vec())
    }

    #[test]
    fn flat_listing_is_classified_from_names() -> Result<()> {
        let mut source = SimpleProviderClassSource::new(ScanOptions::new(false), Box::new(provider()));
        let mut streamer = CollectingStreamer::new();
        let mut seeds = SeedSet::new();
        source.scan_classes(&mut streamer, &mut seeds, ScanPolicy::Seed)?;

        assert_eq!(streamer.class_names(), vec!["a.B", "a.C"]);
        let counts = source.counters();
        assert_eq!(counts.get(ScanCount::Entry), 5);
        assert_eq!(counts.get(ScanCount::NonRootContainer), 1);
        assert_eq!(counts.get(ScanCount::UnsupportedClass), 1);
        assert_eq!(counts.get(ScanCount::NonClassResource), 1);
        assert_eq!(counts.get(ScanCount::ProcessedClass), 2);
        Ok(())
    }

    #[test]
    fn resolves_with_or_without_leading_separator() -> Result<()> {
        let mut source = SimpleProviderClassSource::new(ScanOptions::default(), Box::new(provider()));
        let mut streamer = CollectingStreamer::new();

        assert_eq!(source.scan_specific_seed_class("a.B", &mut streamer)?, ClassScan::Processed);
        assert_eq!(source.scan_specific_seed_class("a.C", &mut streamer)?, ClassScan::Processed);
        assert_eq!(source.scan_specific_seed_class("a.D", &mut streamer)?, ClassScan::Absent);
        assert_eq!(source.class_name_from_resource_name("/a/B.class"), "a.B");
        assert_eq!(source.class_name_from_resource_name("a/B.class"), "a.B");
        Ok(())
    }

    #[test]
    fn index_under_a_leading_separator_is_found() -> Result<()> {
        let mut buf = Vec::new();
        write_index(&ClassIndex::new(vec![ClassSummary::named("a.Indexed")]), &mut buf)?;
        let provider = MemoryProvider::new("indexed").with_resource(format!("/{INDEX_PATH}"), buf);
        let mut source = SimpleProviderClassSource::new(ScanOptions::new(true), Box::new(provider));
        assert!(source.has_index());
        Ok(())
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut provider = MemoryProvider::new("p");
        provider.insert("a/B.class", b"1".to_vec());
        provider.insert("a/C.class", b"2".to_vec());
        provider.insert("a/B.class", b"3".to_vec());
        assert_eq!(provider.len(), 2);
        assert_eq!(
            provider.resource_names().ok(),
            Some(vec!["a/B.class".to_string(), "a/C.class".to_string()])
        );
    }
}
