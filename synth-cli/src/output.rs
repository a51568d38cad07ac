//! Output formatting: human-readable, JSON, or YAML, selected by the
//! top-level `--format` flag and shared by every subcommand.

use std::io::{self, Write};

use clap::ValueEnum;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain-text summary.
    Human,
    /// JSON, for scripting.
    Json,
    /// YAML.
    Yaml,
}

/// Anything the CLI prints gets a human rendering plus `Serialize` for the
/// structured formats.
pub trait Report: Serialize {
    fn write_human<W: Write>(&self, writer: W) -> anyhow::Result<()>;
}

impl OutputFormat {
    pub fn print<T: Report>(&self, value: &T) -> anyhow::Result<()> {
        match self {
            OutputFormat::Human => value.write_human(io::stdout()),
            OutputFormat::Json => {
                serde_json::to_writer_pretty(io::stdout(), value)?;
                println!();
                Ok(())
            }
            OutputFormat::Yaml => {
                serde_yaml::to_writer(io::stdout(), value)?;
                Ok(())
            }
        }
    }
}
