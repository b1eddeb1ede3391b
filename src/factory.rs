use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::aggregate::AggregateClassSource;
use crate::config::{ScanOptions, SourceLayout, classify_path};
use crate::container::{ArchiveContainer, Container, ContainerClassSource};
use crate::directory::DirectoryClassSource;
use crate::index::{IndexReader, JsonIndexReader};
use crate::jar::JarClassSource;
use crate::loader::{ClassLoaderClassSource, ClassPathLoader, ResourceLoader};
use crate::provider::{ClassProvider, SimpleProviderClassSource};
use crate::source::{ClassSource, ScanPolicy};

/// Name given to the resolution-only source built from `--classpath`.
pub const CLASS_PATH_SOURCE_NAME: &str = "classpath";

/// Builds every source variant with one set of options and one index reader.
#[derive(Debug, Clone)]
pub struct ClassSourceFactory {
    options: ScanOptions,
    index_reader: Arc<dyn IndexReader>,
}

impl Default for ClassSourceFactory {
    fn default() -> Self {
        Self::new(ScanOptions::default())
    }
}

impl ClassSourceFactory {
    pub fn new(options: ScanOptions) -> Self {
        Self {
            options,
            index_reader: Arc::new(JsonIndexReader),
        }
    }

    pub fn with_index_reader(mut self, index_reader: Arc<dyn IndexReader>) -> Self {
        self.index_reader = index_reader;
        self
    }

    pub fn options(&self) -> ScanOptions {
        self.options
    }

    fn prepared<S: ClassSource>(&self, mut source: S) -> S {
        source.core_mut().set_index_reader(Arc::clone(&self.index_reader));
        source
    }

    pub fn create_aggregate(&self, app_name: &str, module_name: &str) -> AggregateClassSource {
        self.prepared(AggregateClassSource::new(app_name, module_name, self.options))
    }

    pub fn create_directory(&self, root: impl Into<PathBuf>) -> DirectoryClassSource {
        self.prepared(DirectoryClassSource::new(self.options, root))
    }

    pub fn create_jar(&self, path: impl Into<PathBuf>) -> JarClassSource {
        self.prepared(JarClassSource::new(self.options, path))
    }

    pub fn create_container(&self, container: Box<dyn Container>, prefix: &str) -> ContainerClassSource {
        self.prepared(ContainerClassSource::new(self.options, container).with_prefix(prefix))
    }

    pub fn create_archive(&self, path: impl Into<PathBuf>, prefix: &str) -> ContainerClassSource {
        self.create_container(Box::new(ArchiveContainer::new(path)), prefix)
    }

    pub fn create_class_loader(&self, name: &str, loader: Box<dyn ResourceLoader>) -> ClassLoaderClassSource {
        self.prepared(ClassLoaderClassSource::new(name, self.options, loader))
    }

    pub fn create_simple(&self, provider: Box<dyn ClassProvider>) -> SimpleProviderClassSource {
        self.prepared(SimpleProviderClassSource::new(self.options, provider))
    }

    /// Picks the variant for a filesystem path by its layout.
    pub fn create_for_path(&self, path: &Path) -> Result<Box<dyn ClassSource>> {
        let layout = classify_path(path)?;
        debug!(path = %path.display(), layout = ?layout, "classified class source path");
        let source: Box<dyn ClassSource> = match layout {
            SourceLayout::Directory => Box::new(self.create_directory(path)),
            SourceLayout::Jar => Box::new(self.create_jar(path)),
            SourceLayout::Archive { prefix } => Box::new(self.create_archive(path, &prefix)),
        };
        Ok(source)
    }

    pub fn add_path(&self, aggregate: &mut AggregateClassSource, path: &Path, policy: ScanPolicy) -> Result<()> {
        let source = self.create_for_path(path)?;
        aggregate
            .add_class_source(source, policy)
            .with_context(|| format!("Failed to add class source: {}", path.display()))
    }

    /// Adds a resolution-only class loader over a platform class path string.
    pub fn add_class_path(&self, aggregate: &mut AggregateClassSource, class_path: &str) -> Result<()> {
        let loader = ClassPathLoader::parse(class_path);
        if loader.is_empty() {
            return Ok(());
        }
        let source = self.create_class_loader(CLASS_PATH_SOURCE_NAME, Box::new(loader));
        aggregate
            .add_class_source(Box::new(source), ScanPolicy::External)
            .context("Failed to add class path")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceKind;
    use std::fs::File;
    use std::io::Write;
    use zip::write::{FileOptions, ZipWriter};

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) -> Result<()> {
        let mut zip = ZipWriter::new(File::create(path)?);
        for (name, content) in entries {
            zip.start_file(*name, FileOptions::default())?;
            zip.write_all(content)?;
        }
        zip.finish()?;
        Ok(())
    }

    #[test]
    fn paths_map_to_variants() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let jar = dir.path().join("util.jar");
        write_zip(&jar, &[("u/Util.class", b"U")])?;
        let war = dir.path().join("web.war");
        write_zip(&war, &[("WEB-INF/classes/w/Web.class", b"W")])?;

        let factory = ClassSourceFactory::new(ScanOptions::new(false));
        assert_eq!(factory.create_for_path(dir.path())?.kind(), SourceKind::Directory);
        assert_eq!(factory.create_for_path(&jar)?.kind(), SourceKind::Jar);
        assert_eq!(factory.create_for_path(&war)?.kind(), SourceKind::Container);
        assert!(factory.create_for_path(&dir.path().join("missing.jar")).is_err());
        Ok(())
    }

    #[test]
    fn add_path_and_class_path_fill_partitions() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let jar = dir.path().join("util.jar");
        write_zip(&jar, &[("u/Util.class", b"U")])?;

        let factory = ClassSourceFactory::default();
        let mut aggregate = factory.create_aggregate("app", "web");
        factory.add_path(&mut aggregate, dir.path(), ScanPolicy::Seed)?;
        factory.add_path(&mut aggregate, &jar, ScanPolicy::Partial)?;
        factory.add_class_path(&mut aggregate, &jar.to_string_lossy())?;

        assert_eq!(aggregate.len(), 3);
        assert_eq!(aggregate.scan_policy(CLASS_PATH_SOURCE_NAME), Some(ScanPolicy::External));
        assert!(factory.add_path(&mut aggregate, &jar, ScanPolicy::Seed).is_err());
        Ok(())
    }
}
