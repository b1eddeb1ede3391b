//! # class-scan
//!
//! Class source scanning for Java deployments: enumerate and stream class
//! files from directories, jars, archives, class loaders and in-memory
//! providers, with first-source-wins masking across an ordered aggregate.
//!
//! ## Architecture
//!
//! - **source**: The `ClassSource` capability and the shared scan algorithm
//! - **aggregate**: Ordered children partitioned by scan policy, with a sticky lookup cache
//! - **directory**: Class directories with nested-root boundaries
//! - **jar**: Reference-counted jar archives
//! - **container**: Hierarchical containers and the zip-backed `ArchiveContainer`
//! - **loader**: Resolution-only sources over a class path
//! - **provider**: Flat resource providers
//! - **factory**: Building sources from options and filesystem paths
//! - **index**: The class index fast path and its JSON document format
//! - **streamer**: Caller-supplied class filter and processor
//! - **seeds**: The class-name accumulator threaded through one scan
//! - **counters**: Per-source scan counters
//! - **names**: Class name and resource name mapping
//! - **config**: Option resolution from flags and environment
//! - **error**: Library error type
//! - **logging**: Subscriber setup for the binary

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod container;
pub mod counters;
pub mod directory;
pub mod error;
pub mod factory;
pub mod index;
pub mod jar;
pub mod loader;
pub mod logging;
pub mod names;
pub mod provider;
pub mod seeds;
pub mod source;
pub mod streamer;
