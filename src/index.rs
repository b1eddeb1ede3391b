//! Pre-built class index used as the scan fast path.
//!
//! A source that carries `META-INF/jandex.idx` can list its classes without
//! walking its entries. Decoding is delegated to an [`IndexReader`]; the
//! bundled [`JsonIndexReader`] understands the JSON document written by
//! [`write_index`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::io::{Read, Write};

pub const INDEX_PATH: &str = "META-INF/jandex.idx";
pub const INDEX_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSummary {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superclass: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<String>,
}

impl ClassSummary {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superclass: None,
            interfaces: Vec::new(),
            annotations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassIndex {
    pub version: u32,
    pub classes: Vec<ClassSummary>,
}

impl ClassIndex {
    pub fn new(classes: Vec<ClassSummary>) -> Self {
        Self {
            version: INDEX_VERSION,
            classes,
        }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Decodes an index stream. Any error is treated by callers as "no index".
pub trait IndexReader: Debug {
    fn read_index(&self, stream: &mut dyn Read) -> Result<ClassIndex>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonIndexReader;

impl IndexReader for JsonIndexReader {
    fn read_index(&self, stream: &mut dyn Read) -> Result<ClassIndex> {
        let index: ClassIndex =
            serde_json::from_reader(stream).context("Failed to parse class index")?;
        if index.version != INDEX_VERSION {
            anyhow::bail!(
                "Unsupported class index version {} (expected {INDEX_VERSION})",
                index.version
            );
        }
        Ok(index)
    }
}

pub fn write_index(index: &ClassIndex, out: &mut dyn Write) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, index).context("Failed to write class index")?;
    out.write_all(b"\n")?;
    Ok(())
}
