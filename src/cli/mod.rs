//! Command-line interface for traceview.
//!
//! Flags are merged over the discovered config: anything given on the
//! command line wins.

pub mod output;

use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::config::{Config, FilterRule, FilterSpec};
use crate::filter::LeafKind;
use crate::reader::block::LineEnding;
use crate::reader::loader::{LoaderOptions, DEFAULT_BLOCK_SIZE};

#[derive(Parser, Debug)]
#[command(name = "traceview")]
#[command(about = "Load a trace file and print the lines selected by filters", long_about = None)]
pub struct Args {
    /// Trace file to load
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Line format, e.g. "time|tid|user1|msg"
    #[arg(short = 'f', long)]
    pub format: Option<String>,

    /// Field separator (default: tab)
    #[arg(short = 's', long)]
    pub separator: Option<String>,

    /// Keep lines containing TEXT (repeatable)
    #[arg(short = 'm', long = "match", value_name = "TEXT")]
    pub matches: Vec<String>,

    /// Keep lines from thread TID, decimal or 0x-prefixed (repeatable)
    #[arg(long, value_name = "TID")]
    pub tid: Vec<String>,

    /// Keep lines whose user field has one of the values, e.g. "user1=net,disk"
    #[arg(long, value_name = "FIELD=VALUES")]
    pub user: Vec<String>,

    /// Keep lines by index: "10-20", "10..20" or a single "15"
    #[arg(long, value_name = "RANGE")]
    pub range: Vec<String>,

    /// Keep lines matching any command-line filter instead of all of them
    #[arg(long)]
    pub any: bool,

    /// Case-insensitive --match
    #[arg(short = 'i', long)]
    pub ignore_case: bool,

    /// Bytes read per load block
    #[arg(long, value_name = "BYTES")]
    pub block_size: Option<usize>,

    /// Lines end with a bare LF instead of CRLF
    #[arg(long)]
    pub lf: bool,

    /// Print selected lines as JSON, one object per line
    #[arg(long, conflicts_with = "count")]
    pub json: bool,

    /// Only print the number of selected lines
    #[arg(short = 'c', long)]
    pub count: bool,

    /// Keep running and print lines as they are appended
    #[arg(long, conflicts_with = "count")]
    pub follow: bool,

    /// Use this config file instead of discovering one
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// More log output on stderr (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// The command-line predicates as one group, `None` if there are none.
    pub fn filter_spec(&self) -> Option<FilterSpec> {
        let leaves: Vec<FilterSpec> = self
            .matches
            .iter()
            .map(|t| FilterSpec::leaf(LeafKind::Text, t.as_str(), self.ignore_case))
            .chain(self.tid.iter().map(|t| FilterSpec::leaf(LeafKind::Thread, t.as_str(), false)))
            .chain(self.user.iter().map(|t| FilterSpec::leaf(LeafKind::User, t.as_str(), false)))
            .chain(self.range.iter().map(|t| FilterSpec::leaf(LeafKind::Range, t.as_str(), false)))
            .collect();

        if leaves.is_empty() {
            return None;
        }

        let rule = if self.any {
            FilterRule::Any(leaves)
        } else {
            FilterRule::All(leaves)
        };
        Some(FilterSpec {
            rule,
            color: 0,
            enabled: true,
        })
    }

    /// Format and separators after applying command-line overrides.
    pub fn format<'a>(&'a self, config: &'a Config) -> Option<(&'a str, Option<&'a str>)> {
        let format = self.format.as_deref().or(config.format.as_deref())?;
        let separator = self.separator.as_deref().or(config.separator.as_deref());
        Some((format, separator))
    }

    pub fn loader_options(&self, config: &Config) -> LoaderOptions {
        LoaderOptions {
            block_size: self
                .block_size
                .or(config.block_size)
                .unwrap_or(DEFAULT_BLOCK_SIZE),
            line_ending: if self.lf {
                LineEnding::Lf
            } else {
                config.line_ending
            },
            ..LoaderOptions::default()
        }
    }

    /// Default log directive for the verbosity level.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    }
}
