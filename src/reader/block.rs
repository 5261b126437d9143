//! Load blocks: one fixed-size file read plus the lines sliced from it.
//!
//! A line can straddle two reads. Bytes after the last terminator of a block
//! (the rollover) are copied in front of the next block's fresh data so every
//! line is recorded exactly once, from a single contiguous buffer.

use super::line::LineRecord;

const CR: u8 = 0x0d;
const LF: u8 = 0x0a;
const CRLF: u16 = 0x0d0a;

/// Byte order mark of a UTF-16LE file.
pub const WIDE_BOM: [u8; 2] = [0xff, 0xfe];

/// Encoding announced by the first bytes of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Starts with [`WIDE_BOM`]
    Wide,
    Narrow,
    /// Too few bytes to tell: what was read so far is a prefix of the mark
    Undecided,
}

impl ByteOrder {
    pub fn sniff(head: &[u8]) -> Self {
        if head.starts_with(&WIDE_BOM) {
            ByteOrder::Wide
        } else if WIDE_BOM.starts_with(head) {
            ByteOrder::Undecided
        } else {
            ByteOrder::Narrow
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Narrow,
    /// 16-bit units, down-converted to one byte per unit when a line is closed
    Wide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    /// Lines end with the two-byte CR LF marker
    #[default]
    CrLf,
    /// Lines end with LF, an optional preceding CR is dropped from the content
    Lf,
}

impl LineEnding {
    #[inline]
    fn matches(self, window: u16) -> bool {
        match self {
            LineEnding::CrLf => window == CRLF,
            LineEnding::Lf => window as u8 == LF,
        }
    }

    /// Terminator length given the closing window and the line length so far.
    #[inline]
    fn term_len(self, window: u16, line_len: usize) -> usize {
        let has_cr = (window >> 8) as u8 == CR && line_len >= 2;
        match self {
            LineEnding::CrLf => 2,
            LineEnding::Lf if has_cr => 2,
            LineEnding::Lf => 1,
        }
    }
}

pub fn align_up(n: usize, page: usize) -> usize {
    let page = page.max(1);
    n.div_ceil(page) * page
}

#[derive(Debug, Default)]
pub struct Block {
    pub buf: Vec<u8>,
    /// File offset of the first freshly read byte
    pub file_start: u64,
    /// File offset one past the last freshly read byte
    pub file_stop: u64,
    /// Offset of the first line (start of the rollover, if any)
    pub first_full_line_start: usize,
    /// Offset where fresh file data is written
    pub write_start: usize,
    /// End of valid bytes (rollover plus fresh data)
    pub data_len: usize,
    /// End of narrow line data; differs from `data_len` in wide mode
    pub data_end: usize,
    /// End of the last complete line in the raw data; rollover starts here
    pub last_full_line_end: usize,
    /// Global index of the first line sliced from this block
    pub first_line: usize,
    pub line_count: usize,
    /// Lines are appended by a host rather than read from a file
    pub in_memory: bool,
}

impl Block {
    /// First block of a file.
    pub fn first(block_size: usize) -> Self {
        Self {
            buf: vec![0; block_size],
            ..Self::default()
        }
    }

    /// Block following `prev`, pre-filled with its rollover.
    ///
    /// The rollover is placed right before a page boundary so the fresh read
    /// starts page-aligned.
    pub fn after(prev: &Block, block_size: usize, page_size: usize) -> Self {
        let rollover = prev.rollover();
        let rounded = align_up(rollover.len(), page_size);
        let mut buf = vec![0; rounded + block_size];
        let first = rounded - rollover.len();
        buf[first..rounded].copy_from_slice(rollover);

        Self {
            buf,
            file_start: prev.file_stop,
            file_stop: prev.file_stop,
            first_full_line_start: first,
            write_start: rounded,
            data_len: rounded,
            data_end: rounded,
            last_full_line_end: first,
            first_line: prev.first_line + prev.line_count,
            line_count: 0,
            in_memory: false,
        }
    }

    /// Growable block for lines appended one at a time.
    pub fn in_memory(first_line: usize) -> Self {
        Self {
            first_line,
            in_memory: true,
            ..Self::default()
        }
    }

    /// Append one complete line to an in-memory block.
    pub fn push_line(&mut self, content: &[u8]) -> LineRecord {
        debug_assert!(self.in_memory, "push_line on a file block");
        let start = self.buf.len();
        self.buf.extend_from_slice(content);
        self.data_len = self.buf.len();
        self.data_end = self.data_len;
        self.last_full_line_end = self.data_len;
        let index = self.first_line + self.line_count;
        self.line_count += 1;
        LineRecord::new(index, start, content.len(), 0)
    }

    /// Unterminated tail carried into the next block.
    pub fn rollover(&self) -> &[u8] {
        &self.buf[self.last_full_line_end.min(self.data_len)..self.data_len]
    }

    /// Space for the next file read.
    pub fn read_area(&mut self) -> &mut [u8] {
        &mut self.buf[self.write_start..]
    }

    /// Record that `n` fresh bytes were read into `read_area`.
    pub fn commit_read(&mut self, n: usize) {
        self.data_len = (self.write_start + n).min(self.buf.len());
        self.file_stop = self.file_start + n as u64;
    }

    /// Scan `[start, data_len)` for terminators and return the closed lines.
    ///
    /// Lines are numbered from `first_line`. Updates `data_end`,
    /// `last_full_line_end` and `line_count`.
    pub fn split_lines(
        &mut self,
        start: usize,
        encoding: Encoding,
        ending: LineEnding,
    ) -> Vec<LineRecord> {
        let start = start.min(self.data_len);
        let lines = match encoding {
            Encoding::Narrow => self.split_narrow(start, ending),
            Encoding::Wide => self.split_wide(start, ending),
        };
        self.line_count = lines.len();
        lines
    }

    fn split_narrow(&mut self, start: usize, ending: LineEnding) -> Vec<LineRecord> {
        let mut lines = Vec::new();
        let mut window: u16 = 0;
        let mut line_start = start;

        for pos in start..self.data_len {
            window = (window << 8) | self.buf[pos] as u16;
            if ending.matches(window) {
                let end = pos + 1;
                let term = ending.term_len(window, end - line_start);
                let index = self.first_line + lines.len();
                lines.push(LineRecord::new(
                    index,
                    line_start,
                    end - line_start - term,
                    term,
                ));
                line_start = end;
            }
        }

        self.data_end = self.data_len;
        self.last_full_line_end = line_start;
        lines
    }

    fn split_wide(&mut self, start: usize, ending: LineEnding) -> Vec<LineRecord> {
        let mut lines = Vec::new();
        let mut window: u16 = 0;
        // Read position of the current line's first unit, and narrow write cursor
        let mut line_start_w = start;
        let mut out = start;

        let mut pos = start;
        while pos + 1 < self.data_len {
            let unit = u16::from_le_bytes([self.buf[pos], self.buf[pos + 1]]);
            window = (window << 8) | (unit & 0xff);
            pos += 2;

            if ending.matches(window) {
                let line_start = out;
                let mut p = line_start_w;
                while p < pos {
                    // `out` never passes `p`, so the copy cannot clobber unread units
                    self.buf[out] = self.buf[p];
                    out += 1;
                    p += 2;
                }
                let len = out - line_start;
                let term = ending.term_len(window, len);
                let index = self.first_line + lines.len();
                lines.push(LineRecord::new(index, line_start, len - term, term));
                line_start_w = pos;
            }
        }

        self.data_end = out;
        self.last_full_line_end = line_start_w;
        lines
    }

    /// Release buffer space that no line or rollover refers to.
    pub fn shrink_to_data(&mut self) {
        self.buf.truncate(self.data_len);
        self.buf.shrink_to_fit();
    }

    /// Drop the rollover once the next block has copied it.
    pub fn trim_rollover(&mut self) {
        // Narrow line data never extends past the raw end of the last line
        let keep = self.last_full_line_end.min(self.buf.len());
        self.buf.truncate(keep);
        self.buf.shrink_to_fit();
        self.data_len = self.data_len.min(keep);
        self.data_end = self.data_end.min(keep);
    }
}
