//! Splits raw trace lines into structural fields.
//!
//! A trace format is a list of field names joined by one delimiter, for example
//! `time|tid|user1|msg`. Known names are `time`, `tid`, `user1`..`user4` and
//! `msg`; any other name occupies a slot without capturing it. Lines are split
//! on a single separator byte supplied alongside the format.

use memchr::memchr;
use thiserror::Error;

pub const MAX_USER_FIELDS: usize = 4;

const DEFAULT_SEPARATOR: u8 = b'\t';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("trace format is empty")]
    Empty,

    #[error("trace format has an empty field name at position {position}")]
    EmptyField { position: usize },

    #[error("unsupported separator {0:?}: exactly one separator byte is supported")]
    UnsupportedSeparator(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldId {
    Time,
    Tid,
    User(usize),
    Msg,
    Skip,
}

impl FieldId {
    fn from_name(name: &str) -> Self {
        match name {
            "time" => FieldId::Time,
            "tid" => FieldId::Tid,
            "msg" => FieldId::Msg,
            "user1" => FieldId::User(0),
            "user2" => FieldId::User(1),
            "user3" => FieldId::User(2),
            "user4" => FieldId::User(3),
            _ => FieldId::Skip,
        }
    }
}

/// Byte range relative to the start of a line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    pub start: u32,
    pub len: u32,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start: start as u32,
            len: (end - start) as u32,
        }
    }

    pub fn slice<'a>(&self, line: &'a [u8]) -> &'a [u8] {
        let start = (self.start as usize).min(line.len());
        let end = (start + self.len as usize).min(line.len());
        &line[start..end]
    }
}

/// Field spans extracted from one line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineFields {
    pub time: Option<Span>,
    pub tid: u32,
    pub user: [Option<Span>; MAX_USER_FIELDS],
    pub msg: Span,
}

impl LineFields {
    /// Fields for a line without a format: the whole line is the message.
    pub fn whole(len: usize) -> Self {
        Self {
            msg: Span::new(0, len),
            ..Self::default()
        }
    }
}

/// Which fields the active format captures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineDesc {
    pub time: bool,
    pub tid: bool,
    pub user: [bool; MAX_USER_FIELDS],
}

#[derive(Debug, Clone)]
pub struct TraceFormat {
    fields: Vec<FieldId>,
    separator: u8,
}

impl TraceFormat {
    /// Build a format from a field spec and the runtime separator set.
    ///
    /// `separators` defaults to a tab when `None`; more than one byte is rejected.
    pub fn new(spec: &str, separators: Option<&str>) -> Result<Self, FormatError> {
        let separator = match separators {
            None => DEFAULT_SEPARATOR,
            Some(s) if s.len() == 1 => s.as_bytes()[0],
            Some(s) => return Err(FormatError::UnsupportedSeparator(s.to_string())),
        };

        let spec = spec.trim();
        if spec.is_empty() {
            return Err(FormatError::Empty);
        }

        let fields = match spec.chars().find(|c| !c.is_ascii_alphanumeric()) {
            None => vec![FieldId::from_name(spec)],
            Some(delim) => {
                let mut fields = Vec::new();
                let mut position = 0;
                for name in spec.split(delim) {
                    if name.is_empty() {
                        return Err(FormatError::EmptyField { position });
                    }
                    fields.push(FieldId::from_name(name));
                    position += name.len() + delim.len_utf8();
                }
                fields
            }
        };

        Ok(Self { fields, separator })
    }

    pub fn fields(&self) -> &[FieldId] {
        &self.fields
    }

    pub fn separator(&self) -> u8 {
        self.separator
    }

    pub fn desc(&self) -> LineDesc {
        let mut desc = LineDesc::default();
        for field in &self.fields {
            match *field {
                FieldId::Time => desc.time = true,
                FieldId::Tid => desc.tid = true,
                FieldId::User(i) => desc.user[i] = true,
                FieldId::Msg | FieldId::Skip => {}
            }
        }
        desc
    }

    /// Split `line` into fields in a single pass.
    pub fn parse(&self, line: &[u8]) -> LineFields {
        let mut res = LineFields::default();
        let mut pos = 0;

        for field in &self.fields {
            pos = self.skip_separators(line, pos);
            if pos >= line.len() {
                res.msg = Span::new(line.len(), line.len());
                return res;
            }

            if *field == FieldId::Msg {
                res.msg = Span::new(pos, line.len());
                return res;
            }

            let end = memchr(self.separator, &line[pos..])
                .map(|off| pos + off)
                .unwrap_or(line.len());
            let span = Span::new(pos, end);

            match *field {
                FieldId::Time => res.time = Some(span),
                FieldId::Tid => res.tid = parse_tid(&line[pos..end]),
                FieldId::User(i) => res.user[i] = Some(span),
                FieldId::Msg | FieldId::Skip => {}
            }
            pos = end;
        }

        pos = self.skip_separators(line, pos);
        res.msg = Span::new(pos, line.len());
        res
    }

    fn skip_separators(&self, line: &[u8], mut pos: usize) -> usize {
        while pos < line.len() && line[pos] == self.separator {
            pos += 1;
        }
        pos
    }
}

/// Decimal thread id, or hex with a `0x` prefix. Stops at the first non-digit.
fn parse_tid(text: &[u8]) -> u32 {
    let text = text.trim_ascii();
    let (digits, radix) = match text {
        [b'0', b'x' | b'X', rest @ ..] => (rest, 16),
        _ => (text, 10),
    };

    let mut value: u32 = 0;
    for &b in digits {
        let Some(d) = (b as char).to_digit(radix) else {
            break;
        };
        value = value.wrapping_mul(radix).wrapping_add(d);
    }
    value
}
