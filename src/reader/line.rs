use serde::Serialize;

use crate::parser::{LineFields, MAX_USER_FIELDS};

/// Color annotation meaning "no filter colored this line".
pub const NO_COLOR: u8 = 0;

/// One ingested line: a span of its block's narrow buffer plus parsed fields.
#[derive(Debug, Clone, Default)]
pub struct LineRecord {
    /// Global line index, assigned once at append time
    pub index: u32,
    /// Offset of the line in its block's buffer
    pub start: u32,
    /// Content length, terminator excluded
    pub len: u32,
    /// Terminator bytes following the content
    pub term_len: u8,
    pub fields: LineFields,
    pub parsed: bool,
    pub color: u8,
    /// Number of consumers that marked this line active
    pub active: i32,
}

impl LineRecord {
    /// Indices and block offsets are stored as `u32`: a store holds at most
    /// `u32::MAX` lines and a block buffer at most 4 GiB.
    pub fn new(index: usize, start: usize, len: usize, term_len: usize) -> Self {
        debug_assert!(u32::try_from(index).is_ok(), "line index {} exceeds u32", index);
        debug_assert!(
            u32::try_from(start + len).is_ok(),
            "block offset {} exceeds u32",
            start + len
        );
        Self {
            index: index as u32,
            start: start as u32,
            len: len as u32,
            term_len: term_len as u8,
            ..Self::default()
        }
    }

    pub fn content<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        let start = self.start as usize;
        &buf[start..start + self.len as usize]
    }
}

/// Borrowed view of a line while the store lock is held.
#[derive(Debug, Clone, Copy)]
pub struct LineView<'a> {
    pub record: &'a LineRecord,
    pub content: &'a [u8],
}

impl<'a> LineView<'a> {
    pub fn index(&self) -> usize {
        self.record.index as usize
    }

    pub fn msg(&self) -> &'a [u8] {
        self.record.fields.msg.slice(self.content)
    }

    pub fn time(&self) -> Option<&'a [u8]> {
        self.record.fields.time.map(|s| s.slice(self.content))
    }

    pub fn tid(&self) -> u32 {
        self.record.fields.tid
    }

    pub fn user(&self, field: usize) -> Option<&'a [u8]> {
        self.record
            .fields
            .user
            .get(field)
            .copied()
            .flatten()
            .map(|s| s.slice(self.content))
    }

    pub fn color(&self) -> u8 {
        self.record.color
    }

    pub fn to_line(&self) -> Line {
        let text = |b: &[u8]| String::from_utf8_lossy(b).into_owned();
        let mut user: [Option<String>; MAX_USER_FIELDS] = Default::default();
        for (i, slot) in user.iter_mut().enumerate() {
            *slot = self.user(i).map(text);
        }
        Line {
            index: self.index(),
            content: text(self.content),
            time: self.time().map(text),
            tid: self.tid(),
            user,
            msg: text(self.msg()),
            color: self.record.color,
            active: self.record.active,
        }
    }
}

/// Owned snapshot of a line handed to hosts.
///
/// Out-of-range lookups return `Line::default()`, an empty sentinel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Line {
    pub index: usize,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    pub tid: u32,
    pub user: [Option<String>; MAX_USER_FIELDS],
    pub msg: String,
    pub color: u8,
    pub active: i32,
}

impl Line {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.msg.is_empty()
    }
}
