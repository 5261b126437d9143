//! Append-only store of ingested lines.
//!
//! Raw bytes live in [`Block`]s, one per file read (or one growable block for
//! host-appended lines). Records live in a [`BlockArray`] so lookups by global
//! index never touch the block list; the owning block of a line is found by a
//! scan over block boundaries that starts from the last block used.

use super::block::Block;
use super::block_array::{BlockArray, StoreError, DEFAULT_BLOCK_CAPACITY};
use super::line::{LineRecord, LineView, NO_COLOR};
use crate::parser::{LineFields, TraceFormat};

#[derive(Debug)]
pub struct LineStore {
    blocks: Vec<Block>,
    lines: BlockArray<LineRecord>,
    format: Option<TraceFormat>,
    // Block used by the previous lookup
    last_block: usize,
    // Most recent block read from a file; host blocks may follow it
    last_file_block: Option<usize>,
}

impl Default for LineStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LineStore {
    pub fn new() -> Self {
        Self::with_records_per_block(DEFAULT_BLOCK_CAPACITY)
    }

    pub fn with_records_per_block(capacity: usize) -> Self {
        Self {
            blocks: Vec::new(),
            lines: BlockArray::new(capacity),
            format: None,
            last_block: 0,
            last_file_block: None,
        }
    }

    /// Total number of lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Most recent file block. The next file read continues from its rollover,
    /// even when host lines were appended after it.
    pub fn last_file_block(&self) -> Option<&Block> {
        self.last_file_block.and_then(|i| self.blocks.get(i))
    }

    pub fn last_file_block_mut(&mut self) -> Option<&mut Block> {
        self.last_file_block.and_then(|i| self.blocks.get_mut(i))
    }

    /// Append a parsed file block together with the lines sliced from it.
    ///
    /// Lines are numbered from the current end of the store, which may have
    /// moved past `block.first_line` if host lines were appended meanwhile.
    pub fn append_block(&mut self, mut block: Block, records: Vec<LineRecord>) {
        debug_assert!(!block.in_memory);
        debug_assert_eq!(block.line_count, records.len());
        block.first_line = self.len();
        for (i, mut record) in records.into_iter().enumerate() {
            record.index = (block.first_line + i) as u32;
            self.lines.push(record);
        }
        self.last_file_block = Some(self.blocks.len());
        self.blocks.push(block);
    }

    /// Append one line supplied by a host, returning its index.
    pub fn append_line(&mut self, content: &[u8]) -> usize {
        let first_line = self.len();
        if !self.blocks.last().is_some_and(|b| b.in_memory) {
            self.blocks.push(Block::in_memory(first_line));
        }
        let last = self.blocks.len() - 1;
        let record = self.blocks[last].push_line(content);
        self.lines.push(record);
        first_line
    }

    /// Owning block of line `index`.
    pub fn block_of(&mut self, index: usize) -> Option<usize> {
        if index >= self.len() {
            return None;
        }

        let contains = |b: &Block| index >= b.first_line && index < b.first_line + b.line_count;
        if self.blocks.get(self.last_block).is_some_and(contains) {
            return Some(self.last_block);
        }

        let from = match self.blocks.get(self.last_block) {
            Some(b) if index >= b.first_line => self.last_block + 1,
            _ => 0,
        };
        let found = self.blocks[from..].iter().position(contains)? + from;
        self.last_block = found;
        Some(found)
    }

    /// Random access to a record; out of range is an explicit error.
    pub fn record(&self, index: usize) -> Result<&LineRecord, StoreError> {
        self.lines.get(index)
    }

    pub fn record_mut(&mut self, index: usize) -> Result<&mut LineRecord, StoreError> {
        self.lines.get_mut(index)
    }

    /// Borrow line `index`, parsing its fields on first access.
    pub fn line(&mut self, index: usize) -> Option<LineView<'_>> {
        let block = self.block_of(index)?;
        let buf = &self.blocks[block].buf;
        let record = self.lines.get_mut(index).ok()?;

        if !record.parsed {
            let content = record.content(buf);
            record.fields = match &self.format {
                Some(format) => format.parse(content),
                None => LineFields::whole(content.len()),
            };
            record.parsed = true;
        }

        let record: &LineRecord = record;
        Some(LineView {
            record,
            content: record.content(buf),
        })
    }

    pub fn format(&self) -> Option<&TraceFormat> {
        self.format.as_ref()
    }

    /// Replace the active format; every line is re-parsed on next access.
    pub fn set_format(&mut self, format: Option<TraceFormat>) {
        self.format = format;
        for record in self.lines.iter_mut() {
            record.parsed = false;
        }
    }

    pub fn clear_colors(&mut self) {
        for record in self.lines.iter_mut() {
            record.color = NO_COLOR;
        }
    }

    /// Set the color of line `index` only if it currently equals `expected`.
    pub fn compare_and_set_color(&mut self, index: usize, expected: u8, color: u8) -> bool {
        match self.lines.get_mut(index) {
            Ok(record) if record.color == expected => {
                record.color = color;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::block::{Encoding, LineEnding};

    fn file_block(store: &LineStore, data: &[u8]) -> (Block, Vec<LineRecord>) {
        let mut block = match store.last_file_block() {
            None => Block::first(data.len()),
            Some(prev) => Block::after(prev, data.len(), 1),
        };
        block.read_area()[..data.len()].copy_from_slice(data);
        block.commit_read(data.len());
        let start = block.first_full_line_start;
        let lines = block.split_lines(start, Encoding::Narrow, LineEnding::CrLf);
        (block, lines)
    }

    fn text(store: &mut LineStore, index: usize) -> Option<String> {
        store
            .line(index)
            .map(|l| String::from_utf8_lossy(l.content).into_owned())
    }

    #[test]
    fn test_append_blocks_and_lookup() {
        let mut store = LineStore::with_records_per_block(2);
        let (b, l) = file_block(&store, b"a\r\nb\r\nc");
        store.append_block(b, l);
        let (b, l) = file_block(&store, b"d\r\ne\r\n");
        store.append_block(b, l);

        assert_eq!(store.len(), 4);
        assert_eq!(store.blocks().len(), 2);
        let total: usize = store.blocks().iter().map(|b| b.line_count).sum();
        assert_eq!(total, store.len());

        assert_eq!(text(&mut store, 0).as_deref(), Some("a"));
        assert_eq!(text(&mut store, 2).as_deref(), Some("cd"));
        assert_eq!(text(&mut store, 3).as_deref(), Some("e"));
        assert_eq!(text(&mut store, 4), None);
    }

    #[test]
    fn test_block_of_uses_cache_both_directions() {
        let mut store = LineStore::new();
        for chunk in [b"1\r\n2\r\n".as_slice(), b"3\r\n", b"4\r\n5\r\n6\r\n"] {
            let (b, l) = file_block(&store, chunk);
            store.append_block(b, l);
        }
        assert_eq!(store.block_of(5), Some(2));
        assert_eq!(store.block_of(4), Some(2));
        assert_eq!(store.block_of(2), Some(1));
        assert_eq!(store.block_of(0), Some(0));
        assert_eq!(store.block_of(3), Some(2));
        assert_eq!(store.block_of(6), None);
    }

    #[test]
    fn test_host_lines_between_file_blocks() {
        let mut store = LineStore::new();
        let (b, l) = file_block(&store, b"A\r\nB");
        store.append_block(b, l);
        assert_eq!(store.append_line(b"host"), 1);

        let (b, l) = file_block(&store, b"\r\nC\r\n");
        store.append_block(b, l);
        assert_eq!(store.blocks().len(), 3);
        assert_eq!(store.blocks()[2].first_line, 2);

        let lines: Vec<_> = (0..store.len())
            .map(|i| text(&mut store, i).unwrap())
            .collect();
        assert_eq!(lines, vec!["A", "host", "B", "C"]);
        for i in 0..store.len() {
            assert_eq!(store.record(i).unwrap().index as usize, i);
        }

        // a later host line opens a fresh in-memory block
        assert_eq!(store.append_line(b"tail"), 4);
        assert_eq!(store.blocks().len(), 4);
        assert_eq!(text(&mut store, 4).as_deref(), Some("tail"));
    }

    #[test]
    fn test_record_out_of_range_is_invalid_index() {
        let mut store = LineStore::new();
        store.append_line(b"only");
        assert!(store.record(0).is_ok());
        assert_eq!(
            store.record(1).unwrap_err(),
            StoreError::InvalidIndex { index: 1, count: 1 }
        );
    }

    #[test]
    fn test_append_line_indices_are_dense() {
        let mut store = LineStore::with_records_per_block(3);
        for i in 0..10 {
            assert_eq!(store.append_line(format!("line {}", i).as_bytes()), i);
        }
        assert_eq!(store.blocks().len(), 1);
        for i in 0..10 {
            let line = store.line(i).unwrap();
            assert_eq!(line.index(), i);
            assert_eq!(line.msg(), format!("line {}", i).as_bytes());
        }
    }

    #[test]
    fn test_lazy_parse_and_format_reset() {
        let mut store = LineStore::new();
        store.append_line(b"12:00|42|hello");

        assert_eq!(store.line(0).unwrap().msg(), b"12:00|42|hello");

        store.set_format(Some(TraceFormat::new("time|tid|msg", Some("|")).unwrap()));
        let line = store.line(0).unwrap();
        assert_eq!(line.msg(), b"hello");
        assert_eq!(line.tid(), 42);
        assert_eq!(line.time(), Some(b"12:00".as_slice()));

        store.set_format(None);
        assert_eq!(store.line(0).unwrap().tid(), 0);
    }

    #[test]
    fn test_colors() {
        let mut store = LineStore::new();
        store.append_line(b"a");
        store.append_line(b"b");

        assert!(store.compare_and_set_color(0, NO_COLOR, 3));
        assert!(!store.compare_and_set_color(0, NO_COLOR, 4));
        assert_eq!(store.line(0).unwrap().color(), 3);
        assert!(!store.compare_and_set_color(9, NO_COLOR, 4));

        store.clear_colors();
        assert_eq!(store.line(0).unwrap().color(), NO_COLOR);
    }
}
