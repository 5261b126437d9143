//! Leaf predicates of the filter tree.
//!
//! Predicate text accepted by [`Leaf::parse`]:
//!
//! | kind  | text                   | selects                                         |
//! |-------|------------------------|-------------------------------------------------|
//! | text  | `timeout`              | lines whose message contains the text           |
//! | tid   | `42`, `0x2a`           | lines of that thread                            |
//! | user  | `user2=net,disk`       | lines whose user field equals one of the values |
//! | range | `10-20`, `10..20`, `7` | line indices in the inclusive range             |

use std::fmt;

use super::search::QuickSearch;
use super::FilterError;
use crate::index::bitset::BitSet;
use crate::reader::{LineSource, LineView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    Text,
    Thread,
    User,
    Range,
}

impl fmt::Display for LeafKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LeafKind::Text => "text",
            LeafKind::Thread => "tid",
            LeafKind::User => "user",
            LeafKind::Range => "range",
        })
    }
}

#[derive(Debug, Clone)]
pub enum Leaf {
    /// Substring of the message field
    Substring(QuickSearch),
    /// Exact thread id
    Thread(u32),
    /// User field `field` (0-based) equals one of `values`, ignoring ASCII case
    User { field: usize, values: Vec<Vec<u8>> },
    /// Line indices `start..=end`
    Range { start: usize, end: usize },
}

impl Leaf {
    /// Build a leaf from its predicate text.
    pub fn parse(kind: LeafKind, text: &str, ignore_case: bool) -> Result<Self, FilterError> {
        let invalid = |reason: &str| FilterError::InvalidPredicate {
            kind,
            text: text.to_string(),
            reason: reason.to_string(),
        };

        match kind {
            LeafKind::Text => {
                if text.is_empty() {
                    return Err(invalid("pattern is empty"));
                }
                Ok(Leaf::Substring(QuickSearch::new(text, ignore_case)))
            }
            LeafKind::Thread => parse_number(text.trim())
                .and_then(|n| u32::try_from(n).ok())
                .map(Leaf::Thread)
                .ok_or_else(|| invalid("expected a decimal or 0x-prefixed thread id")),
            LeafKind::User => {
                let (name, values) = text
                    .split_once('=')
                    .ok_or_else(|| invalid("expected userN=value[,value...]"))?;
                let field = match name.trim() {
                    "user1" => 0,
                    "user2" => 1,
                    "user3" => 2,
                    "user4" => 3,
                    _ => return Err(invalid("field must be user1..user4")),
                };
                let values: Vec<Vec<u8>> = values
                    .split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| v.as_bytes().to_vec())
                    .collect();
                if values.is_empty() {
                    return Err(invalid("no values given"));
                }
                Ok(Leaf::User { field, values })
            }
            LeafKind::Range => {
                let text = text.trim();
                let (start, end) = match text.split_once("..").or_else(|| text.split_once('-')) {
                    Some((start, end)) => (start.trim(), end.trim()),
                    None => (text, text),
                };
                let start = parse_number(start).ok_or_else(|| invalid("bad range start"))?;
                let end = parse_number(end).ok_or_else(|| invalid("bad range end"))?;
                if start > end {
                    return Err(invalid("range start is after its end"));
                }
                Ok(Leaf::Range {
                    start: start as usize,
                    end: end as usize,
                })
            }
        }
    }

    pub fn kind(&self) -> LeafKind {
        match self {
            Leaf::Substring(_) => LeafKind::Text,
            Leaf::Thread(_) => LeafKind::Thread,
            Leaf::User { .. } => LeafKind::User,
            Leaf::Range { .. } => LeafKind::Range,
        }
    }

    pub fn matches(&self, line: &LineView<'_>) -> bool {
        match self {
            Leaf::Substring(search) => search.is_match(line.msg()),
            Leaf::Thread(tid) => line.tid() == *tid,
            Leaf::User { field, values } => line
                .user(*field)
                .is_some_and(|v| values.iter().any(|want| want.eq_ignore_ascii_case(v))),
            Leaf::Range { start, end } => (*start..=*end).contains(&line.index()),
        }
    }

    /// Evaluate against every line of `source`.
    pub fn evaluate(&self, source: &impl LineSource) -> BitSet {
        let count = source.line_count();
        let mut set = BitSet::new(count);

        if let Leaf::Range { start, end } = *self {
            if count > 0 {
                for i in start..=end.min(count - 1) {
                    set.set(i);
                }
            }
            return set;
        }

        for i in 0..count {
            if source.with_line(i, |line| self.matches(&line)) == Some(true) {
                set.set(i);
            }
        }
        set
    }
}

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leaf::Substring(search) if search.ignore_case() => write!(f, "text {} (ignore case)", search),
            Leaf::Substring(search) => write!(f, "text {}", search),
            Leaf::Thread(tid) => write!(f, "tid {}", tid),
            Leaf::User { field, values } => {
                let values: Vec<_> = values.iter().map(|v| String::from_utf8_lossy(v)).collect();
                write!(f, "user{} in [{}]", field + 1, values.join(", "))
            }
            Leaf::Range { start, end } => write!(f, "lines {}..={}", start, end),
        }
    }
}

fn parse_number(text: &str) -> Option<u64> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}
