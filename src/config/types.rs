//! Config types for traceview.
//!
//! `Raw*` structs mirror the YAML file; the validated [`Config`] is what the
//! rest of the crate consumes.

use std::fmt;

use serde::Deserialize;

use crate::filter::{CompositeOp, FilterError, FilterId, FilterKind, FilterTree, LeafKind};
use crate::reader::block::LineEnding;

/// Raw config file structure. Unknown fields are rejected.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    /// Trace format, e.g. `time|tid|user1|msg`.
    pub format: Option<String>,
    /// Field separator used when parsing lines.
    pub separator: Option<String>,
    pub line_ending: Option<LineEnding>,
    /// Bytes read per load block.
    pub block_size: Option<usize>,
    #[serde(default)]
    pub filters: Vec<RawFilter>,
}

/// A number or a string in YAML, e.g. `tid: 42` or `tid: "0x2a"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(u64),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

/// Raw filter entry. Exactly one of the predicate keys must be present.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawFilter {
    pub text: Option<String>,
    pub tid: Option<Scalar>,
    pub user: Option<String>,
    pub range: Option<Scalar>,
    pub any: Option<Vec<RawFilter>>,
    pub all: Option<Vec<RawFilter>>,
    pub color: Option<String>,
    pub enabled: Option<bool>,
    #[serde(default)]
    pub ignore_case: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterRule {
    Leaf {
        kind: LeafKind,
        text: String,
        ignore_case: bool,
    },
    Any(Vec<FilterSpec>),
    All(Vec<FilterSpec>),
}

/// Validated filter, ready to be added to a [`FilterTree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    pub rule: FilterRule,
    pub color: u8,
    pub enabled: bool,
}

impl FilterSpec {
    pub fn leaf(kind: LeafKind, text: impl Into<String>, ignore_case: bool) -> Self {
        Self {
            rule: FilterRule::Leaf {
                kind,
                text: text.into(),
                ignore_case,
            },
            color: 0,
            enabled: true,
        }
    }

    /// Add this filter and its nested filters under `parent`.
    pub fn install(&self, tree: &mut FilterTree, parent: FilterId) -> Result<FilterId, FilterError> {
        let id = match &self.rule {
            FilterRule::Leaf {
                kind,
                text,
                ignore_case,
            } => tree.add_leaf_text(parent, *kind, text, *ignore_case)?,
            FilterRule::Any(children) | FilterRule::All(children) => {
                let op = match self.rule {
                    FilterRule::Any(_) => CompositeOp::Or,
                    _ => CompositeOp::And,
                };
                let id = tree.add(parent, FilterKind::Composite(op))?;
                for child in children {
                    child.install(tree, id)?;
                }
                id
            }
        };
        tree.set_enabled(id, self.enabled)?;
        tree.set_color(id, self.color)?;
        Ok(id)
    }
}

/// Merged config from global and project files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub format: Option<String>,
    pub separator: Option<String>,
    pub line_ending: LineEnding,
    pub block_size: Option<usize>,
    pub filters: Vec<FilterSpec>,
}
