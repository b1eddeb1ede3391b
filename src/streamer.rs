use anyhow::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Read;

use crate::index::ClassSummary;
use crate::source::ScanPolicy;

/// Caller-supplied filter and processor for newly discovered classes.
pub trait ClassStreamer {
    /// Pure filter consulted before any I/O for the class.
    fn do_process(&mut self, class_name: &str, policy: ScanPolicy) -> bool;

    fn process(
        &mut self,
        source_name: &str,
        class_name: &str,
        stream: &mut dyn Read,
        policy: ScanPolicy,
    ) -> Result<()>;

    /// Index fast path: the summary record stands in for the class bytes.
    fn process_summary(
        &mut self,
        source_name: &str,
        summary: &ClassSummary,
        policy: ScanPolicy,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Serialize)]
pub struct ScannedClass {
    pub class_name: String,
    pub source: String,
    pub policy: ScanPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub from_index: bool,
}

/// Records every streamed class in discovery order.
#[derive(Debug, Default)]
pub struct CollectingStreamer {
    classes: Vec<ScannedClass>,
    filter: Option<fn(&str, ScanPolicy) -> bool>,
}

impl CollectingStreamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(filter: fn(&str, ScanPolicy) -> bool) -> Self {
        Self {
            classes: Vec::new(),
            filter: Some(filter),
        }
    }

    pub fn classes(&self) -> &[ScannedClass] {
        &self.classes
    }

    pub fn into_classes(self) -> Vec<ScannedClass> {
        self.classes
    }

    pub fn class_names(&self) -> Vec<&str> {
        self.classes.iter().map(|c| c.class_name.as_str()).collect()
    }
}

impl ClassStreamer for CollectingStreamer {
    fn do_process(&mut self, class_name: &str, policy: ScanPolicy) -> bool {
        self.filter.is_none_or(|filter| filter(class_name, policy))
    }

    fn process(
        &mut self,
        source_name: &str,
        class_name: &str,
        stream: &mut dyn Read,
        policy: ScanPolicy,
    ) -> Result<()> {
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes)?;
        self.classes.push(ScannedClass {
            class_name: class_name.to_string(),
            source: source_name.to_string(),
            policy,
            content_hash: Some(hash_bytes(&bytes)),
            size: Some(bytes.len() as u64),
            from_index: false,
        });
        Ok(())
    }

    fn process_summary(
        &mut self,
        source_name: &str,
        summary: &ClassSummary,
        policy: ScanPolicy,
    ) -> Result<()> {
        self.classes.push(ScannedClass {
            class_name: summary.name.clone(),
            source: source_name.to_string(),
            policy,
            content_hash: None,
            size: None,
            from_index: true,
        });
        Ok(())
    }
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
