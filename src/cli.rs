use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "class-scan")]
#[command(about = "Scan class directories, jars and archives with first-source-wins class resolution")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Ignore pre-built class indexes and always walk the sources.
    #[arg(long, global = true)]
    pub no_jandex: bool,

    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

/// Sources of one aggregate, in scan order within each partition.
#[derive(Debug, Clone, Default, Args)]
pub struct SourceArgs {
    #[arg(long = "seed", value_name = "PATH")]
    pub seed: Vec<PathBuf>,

    #[arg(long = "partial", value_name = "PATH")]
    pub partial: Vec<PathBuf>,

    #[arg(long = "excluded", value_name = "PATH")]
    pub excluded: Vec<PathBuf>,

    #[arg(long = "external", value_name = "PATH")]
    pub external: Vec<PathBuf>,

    /// Resolution-only class path (platform separated list of dirs and jars).
    #[arg(long, value_name = "LIST")]
    pub classpath: Option<String>,

    #[arg(long, value_name = "NAME", default_value = "app")]
    pub app: String,

    #[arg(long, value_name = "NAME", default_value = "")]
    pub module: String,
}

impl SourceArgs {
    pub fn is_empty(&self) -> bool {
        self.seed.is_empty()
            && self.partial.is_empty()
            && self.excluded.is_empty()
            && self.external.is_empty()
            && self.classpath.is_none()
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Scan seed and partial sources and report every discovered class.
    Scan {
        #[command(flatten)]
        sources: SourceArgs,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Resolve one class through the aggregate.
    Find {
        class_name: String,

        #[command(flatten)]
        sources: SourceArgs,
    },
    /// Write a class index for one source.
    Index {
        path: PathBuf,

        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}
