//! Background ingestion of a trace file into a [`LineStore`].
//!
//! A load reads fixed-size blocks sequentially from where the previous load
//! stopped, slices each block into lines and appends it to the shared store.
//! Progress is reported over a channel; at most one load runs per file.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::block::{Block, ByteOrder, Encoding, LineEnding, WIDE_BOM};
use super::source::TraceSource;
use super::store::LineStore;

pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;
/// Larger sizes are clamped; line offsets within a block are 32-bit.
pub const MAX_BLOCK_SIZE: usize = 1024 * 1024 * 1024;
pub const DEFAULT_PAGE_SIZE: usize = 4096;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("trace file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("loader thread panicked")]
    Panicked,
}

impl LoadError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            LoadError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            LoadError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderOptions {
    /// Bytes read per block
    pub block_size: usize,
    /// Alignment of each block's fresh read inside its buffer
    pub page_size: usize,
    pub line_ending: LineEnding,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            line_ending: LineEnding::default(),
        }
    }
}

/// What one load invocation ingested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub blocks: usize,
    pub lines: usize,
    pub bytes: u64,
}

#[derive(Debug)]
pub enum LoadEvent {
    /// Sent once before the first block
    Begin,
    /// A block was appended; `offset` is the file offset consumed so far
    Block { lines: usize, offset: u64 },
    /// Sent once when the load finishes or fails
    End(Result<LoadSummary, LoadError>),
}

/// Snapshot of a file's ingestion state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadProgress {
    pub bytes: u64,
    pub lines: usize,
    pub wide: bool,
    pub loading: bool,
}

#[derive(Debug, Default)]
struct LoadState {
    loading: AtomicBool,
    consumed: AtomicU64,
    wide: AtomicBool,
}

/// Clears the loading flag when the worker exits, panics included.
struct LoadingGuard(Arc<LoadState>);

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.0.loading.store(false, Ordering::Release);
    }
}

/// A trace file and the store its lines are loaded into.
#[derive(Debug, Clone)]
pub struct TraceFile {
    path: PathBuf,
    options: LoaderOptions,
    store: Arc<Mutex<LineStore>>,
    state: Arc<LoadState>,
}

impl TraceFile {
    pub fn new(path: impl Into<PathBuf>, options: LoaderOptions) -> Self {
        Self {
            path: path.into(),
            options: LoaderOptions {
                block_size: options.block_size.clamp(1, MAX_BLOCK_SIZE),
                page_size: options.page_size.max(1),
                ..options
            },
            store: Arc::new(Mutex::new(LineStore::new())),
            state: Arc::new(LoadState::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    pub fn store(&self) -> Arc<Mutex<LineStore>> {
        Arc::clone(&self.store)
    }

    /// Read-only view over the lines loaded so far.
    pub fn source(&self) -> TraceSource {
        TraceSource::new(self.store())
    }

    pub fn is_loading(&self) -> bool {
        self.state.loading.load(Ordering::Acquire)
    }

    pub fn progress(&self) -> LoadProgress {
        let lines = self
            .store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        LoadProgress {
            bytes: self.state.consumed.load(Ordering::Acquire),
            lines,
            wide: self.state.wide.load(Ordering::Acquire),
            loading: self.is_loading(),
        }
    }

    /// Load up to `stop` (the whole file when `None`) on a background thread.
    ///
    /// Returns `None` without doing anything while another load is running.
    pub fn load(&self, stop: Option<u64>) -> Option<Receiver<LoadEvent>> {
        let guard = self.begin()?;
        let (tx, rx) = channel();
        let file = self.clone();

        thread::spawn(move || {
            let _guard = guard;
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                file.run(stop, &tx)
            }));

            match result {
                Ok(Some(status)) => {
                    let _ = tx.send(LoadEvent::End(status));
                }
                Ok(None) => {}
                Err(_) => {
                    let _ = tx.send(LoadEvent::End(Err(LoadError::Panicked)));
                }
            }
        });

        Some(rx)
    }

    /// Run a load on the calling thread.
    ///
    /// Returns an empty summary when another load is running or there is
    /// nothing new to read.
    pub fn load_blocking(&self, stop: Option<u64>) -> Result<LoadSummary, LoadError> {
        let Some(_guard) = self.begin() else {
            debug!(path = %self.path.display(), "load already in progress");
            return Ok(LoadSummary::default());
        };
        let (tx, _rx) = channel();
        self.run(stop, &tx).unwrap_or(Ok(LoadSummary::default()))
    }

    fn begin(&self) -> Option<LoadingGuard> {
        self.state
            .loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LoadingGuard(Arc::clone(&self.state)))
    }

    /// Worker body. `None` means the call had no work to do and sent nothing.
    fn run(
        &self,
        stop: Option<u64>,
        tx: &Sender<LoadEvent>,
    ) -> Option<Result<LoadSummary, LoadError>> {
        let mut consumed = self.state.consumed.load(Ordering::Acquire);

        let (mut file, size) = match self.open() {
            Ok(opened) => opened,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot open trace file");
                let _ = tx.send(LoadEvent::Begin);
                return Some(Err(e));
            }
        };

        let stop = stop.map_or(size, |s| s.min(size));
        if stop <= consumed {
            return None;
        }

        // Nothing consumed yet: the encoding is still open
        if consumed == 0 {
            match self.sniff(&mut file, stop) {
                Ok(ByteOrder::Narrow) => {}
                Ok(ByteOrder::Undecided) => return None,
                Ok(ByteOrder::Wide) => {
                    debug!(path = %self.path.display(), "byte order mark found, wide mode");
                    self.state.wide.store(true, Ordering::Release);
                    consumed = WIDE_BOM.len() as u64;
                    self.state.consumed.store(consumed, Ordering::Release);
                    if stop <= consumed {
                        return None;
                    }
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "cannot read trace file");
                    let _ = tx.send(LoadEvent::Begin);
                    return Some(Err(e));
                }
            }
        }

        let _ = tx.send(LoadEvent::Begin);
        let result = self.read_blocks(file, consumed, stop, tx);
        match &result {
            Ok(summary) => info!(
                path = %self.path.display(),
                lines = summary.lines,
                bytes = summary.bytes,
                "trace load finished"
            ),
            Err(e) => warn!(path = %self.path.display(), error = %e, "trace load failed"),
        }
        Some(result)
    }

    fn open(&self) -> Result<(File, u64), LoadError> {
        let file = File::open(&self.path).map_err(|e| LoadError::from_io(&self.path, e))?;
        let size = file
            .metadata()
            .map_err(|e| LoadError::from_io(&self.path, e))?
            .len();
        Ok((file, size))
    }

    /// Byte order from the first bytes of the file, at most `stop` of them.
    fn sniff(&self, file: &mut File, stop: u64) -> Result<ByteOrder, LoadError> {
        let mut head = [0u8; WIDE_BOM.len()];
        let want = stop.min(head.len() as u64) as usize;
        let io_err = |e| LoadError::from_io(&self.path, e);
        file.seek(SeekFrom::Start(0)).map_err(io_err)?;
        let n = read_full(file, &mut head[..want]).map_err(io_err)?;
        Ok(ByteOrder::sniff(&head[..n]))
    }

    fn read_blocks(
        &self,
        mut file: File,
        mut consumed: u64,
        stop: u64,
        tx: &Sender<LoadEvent>,
    ) -> Result<LoadSummary, LoadError> {
        let LoaderOptions {
            block_size,
            page_size,
            line_ending,
        } = self.options;
        let io_err = |e| LoadError::from_io(&self.path, e);
        let mut summary = LoadSummary::default();

        file.seek(SeekFrom::Start(consumed)).map_err(io_err)?;
        let encoding = if self.state.wide.load(Ordering::Acquire) {
            Encoding::Wide
        } else {
            Encoding::Narrow
        };

        loop {
            let mut block = {
                let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
                match store.last_file_block() {
                    Some(prev) => Block::after(prev, block_size, page_size),
                    None => Block::first(block_size),
                }
            };
            block.file_start = consumed;

            let want = block_size.min((stop - consumed) as usize);
            let n = read_full(&mut file, &mut block.read_area()[..want]).map_err(io_err)?;
            block.commit_read(n);
            if n == 0 {
                break;
            }

            let start = block.first_full_line_start;
            let records = block.split_lines(start, encoding, line_ending);
            block.shrink_to_data();
            let lines = records.len();

            {
                let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(prev) = store.last_file_block_mut() {
                    prev.trim_rollover();
                }
                store.append_block(block, records);
            }

            consumed += n as u64;
            self.state.consumed.store(consumed, Ordering::Release);
            summary.blocks += 1;
            summary.lines += lines;
            summary.bytes += n as u64;

            debug!(lines, offset = consumed, "block loaded");
            let _ = tx.send(LoadEvent::Block {
                lines,
                offset: consumed,
            });

            if n < want || consumed >= stop {
                break;
            }
        }

        Ok(summary)
    }
}

/// Fill `buf` from `reader`, stopping early only at end of file.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_file(data: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        file
    }

    fn options(block_size: usize, page_size: usize) -> LoaderOptions {
        LoaderOptions {
            block_size,
            page_size,
            ..LoaderOptions::default()
        }
    }

    fn messages(file: &TraceFile) -> Vec<String> {
        let store = file.store();
        let mut store = store.lock().unwrap();
        (0..store.len())
            .map(|i| String::from_utf8_lossy(store.line(i).unwrap().msg()).into_owned())
            .collect()
    }

    #[test]
    fn test_block_size_is_clamped() {
        let file = TraceFile::new("trace.log", options(usize::MAX, 0));
        assert_eq!(file.options().block_size, MAX_BLOCK_SIZE);
        assert_eq!(file.options().page_size, 1);
        let file = TraceFile::new("trace.log", options(0, 4096));
        assert_eq!(file.options().block_size, 1);
    }

    #[test]
    fn test_load_three_lines() {
        let tmp = temp_file(b"A\r\nB\r\nC\r\n");
        let file = TraceFile::new(tmp.path(), LoaderOptions::default());

        let summary = file.load_blocking(None).unwrap();
        assert_eq!(summary.lines, 3);
        assert_eq!(summary.bytes, 9);
        assert_eq!(messages(&file), vec!["A", "B", "C"]);

        let store = file.store();
        let store = store.lock().unwrap();
        for i in 0..3 {
            assert_eq!(store.record(i).unwrap().index as usize, i);
        }
    }

    #[test]
    fn test_tiny_blocks_match_large_block() {
        let tmp = temp_file(b"AB\r\nCD\r\n");
        let large = TraceFile::new(tmp.path(), LoaderOptions::default());
        large.load_blocking(None).unwrap();

        for block_size in 1..=9 {
            let small = TraceFile::new(tmp.path(), options(block_size, 4));
            small.load_blocking(None).unwrap();
            assert_eq!(messages(&small), messages(&large), "block {}", block_size);
        }
        assert_eq!(messages(&large), vec!["AB", "CD"]);
    }

    #[test]
    fn test_block_count_invariant() {
        let mut data = Vec::new();
        for i in 0..100 {
            data.extend_from_slice(format!("{}\tmessage number {}\r\n", i, i).as_bytes());
        }
        let tmp = temp_file(&data);
        let file = TraceFile::new(tmp.path(), options(64, 16));
        let summary = file.load_blocking(None).unwrap();
        assert!(summary.blocks > 1);

        let store = file.store();
        let store = store.lock().unwrap();
        let total: usize = store.blocks().iter().map(|b| b.line_count).sum();
        assert_eq!(total, 100);
        assert_eq!(store.len(), 100);
    }

    #[test]
    fn test_missing_file_reports_not_found() {
        let file = TraceFile::new("/nonexistent/trace.log", LoaderOptions::default());
        let rx = file.load(None).unwrap();

        let events: Vec<_> = rx.iter().collect();
        assert!(matches!(events.first(), Some(LoadEvent::Begin)));
        assert!(matches!(
            events.last(),
            Some(LoadEvent::End(Err(LoadError::NotFound { .. })))
        ));
        assert_eq!(file.progress().lines, 0);
    }

    #[test]
    fn test_events_are_bracketed() {
        let tmp = temp_file(b"one\r\ntwo\r\nthree\r\n");
        let file = TraceFile::new(tmp.path(), options(6, 1));
        let events: Vec<_> = file.load(None).unwrap().iter().collect();

        assert!(matches!(events.first(), Some(LoadEvent::Begin)));
        let ends = events
            .iter()
            .filter(|e| matches!(e, LoadEvent::End(_)))
            .count();
        assert_eq!(ends, 1);
        match events.last() {
            Some(LoadEvent::End(Ok(summary))) => assert_eq!(summary.lines, 3),
            other => panic!("unexpected last event {:?}", other),
        }
        let blocks = events
            .iter()
            .filter(|e| matches!(e, LoadEvent::Block { .. }))
            .count();
        assert_eq!(blocks, 3);
        assert!(!file.is_loading());
    }

    #[test]
    fn test_load_while_loading_is_noop() {
        let tmp = temp_file(b"x\r\n");
        let file = TraceFile::new(tmp.path(), LoaderOptions::default());

        let guard = file.begin().unwrap();
        assert!(file.load(None).is_none());
        assert_eq!(file.load_blocking(None).unwrap(), LoadSummary::default());
        drop(guard);

        assert_eq!(file.load_blocking(None).unwrap().lines, 1);
    }

    #[test]
    fn test_stop_offset_is_clamped_and_resumed() {
        let tmp = temp_file(b"A\r\nB\r\nC\r\n");
        let file = TraceFile::new(tmp.path(), options(2, 1));

        let summary = file.load_blocking(Some(3)).unwrap();
        assert_eq!(summary.bytes, 3);
        assert_eq!(messages(&file), vec!["A"]);

        // nothing beyond what was consumed
        assert_eq!(file.load_blocking(Some(2)).unwrap(), LoadSummary::default());

        let summary = file.load_blocking(Some(1 << 20)).unwrap();
        assert_eq!(summary.bytes, 6);
        assert_eq!(messages(&file), vec!["A", "B", "C"]);
        assert_eq!(file.progress().bytes, 9);
    }

    #[test]
    fn test_growing_file_completes_pending_line() {
        let mut tmp = temp_file(b"A\r\nB");
        let file = TraceFile::new(tmp.path(), LoaderOptions::default());
        file.load_blocking(None).unwrap();
        assert_eq!(messages(&file), vec!["A"]);

        tmp.write_all(b"\r\nC\r\n").unwrap();
        tmp.flush().unwrap();
        let summary = file.load_blocking(None).unwrap();
        assert_eq!(summary.lines, 2);
        assert_eq!(messages(&file), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_wide_file() {
        let mut data = WIDE_BOM.to_vec();
        for unit in "first\r\nsecond\r\n".encode_utf16() {
            data.extend_from_slice(&unit.to_le_bytes());
        }
        let tmp = temp_file(&data);
        let file = TraceFile::new(tmp.path(), options(8, 4));
        file.load_blocking(None).unwrap();

        assert!(file.progress().wide);
        assert_eq!(messages(&file), vec!["first", "second"]);
    }

    fn wide(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    #[test]
    fn test_wide_mode_detected_when_bom_arrives_alone() {
        let mut tmp = temp_file(&WIDE_BOM);
        let file = TraceFile::new(tmp.path(), LoaderOptions::default());
        assert_eq!(file.load_blocking(None).unwrap(), LoadSummary::default());
        assert!(file.progress().wide);
        assert_eq!(file.progress().bytes, 2);

        tmp.write_all(&wide("first\r\nsecond\r\n")).unwrap();
        tmp.flush().unwrap();
        file.load_blocking(None).unwrap();
        assert_eq!(messages(&file), vec!["first", "second"]);
    }

    #[test]
    fn test_partial_bom_waits_for_more_data() {
        let mut tmp = temp_file(&WIDE_BOM[..1]);
        let file = TraceFile::new(tmp.path(), LoaderOptions::default());
        assert_eq!(file.load_blocking(None).unwrap(), LoadSummary::default());
        assert_eq!(file.progress().bytes, 0);

        tmp.write_all(&WIDE_BOM[1..]).unwrap();
        tmp.write_all(&wide("x\r\n")).unwrap();
        tmp.flush().unwrap();
        file.load_blocking(None).unwrap();
        assert!(file.progress().wide);
        assert_eq!(messages(&file), vec!["x"]);
    }

    #[test]
    fn test_wide_file_with_tiny_blocks() {
        let mut data = WIDE_BOM.to_vec();
        data.extend(wide("ab\r\ncd\r\n"));
        let tmp = temp_file(&data);

        for block_size in 1..=3 {
            let file = TraceFile::new(tmp.path(), options(block_size, 1));
            file.load_blocking(None).unwrap();
            assert!(file.progress().wide, "block {}", block_size);
            assert_eq!(messages(&file), vec!["ab", "cd"], "block {}", block_size);
        }
    }

    #[test]
    fn test_growing_wide_file_completes_pending_line() {
        let mut data = WIDE_BOM.to_vec();
        data.extend(wide("A\r\nB"));
        let mut tmp = temp_file(&data);
        let file = TraceFile::new(tmp.path(), options(8, 4));
        file.load_blocking(None).unwrap();
        assert_eq!(messages(&file), vec!["A"]);

        tmp.write_all(&wide("\r\nC\r\n")).unwrap();
        tmp.flush().unwrap();
        file.load_blocking(None).unwrap();
        assert_eq!(messages(&file), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_host_lines_between_loads_keep_pending_line() {
        let mut tmp = temp_file(b"A\r\nB");
        let file = TraceFile::new(tmp.path(), LoaderOptions::default());
        file.load_blocking(None).unwrap();
        file.store().lock().unwrap().append_line(b"host");

        tmp.write_all(b"\r\nC\r\n").unwrap();
        tmp.flush().unwrap();
        let summary = file.load_blocking(None).unwrap();
        assert_eq!(summary.lines, 2);
        assert_eq!(messages(&file), vec!["A", "host", "B", "C"]);

        let store = file.store();
        let store = store.lock().unwrap();
        for i in 0..store.len() {
            assert_eq!(store.record(i).unwrap().index as usize, i);
        }
    }

    #[test]
    fn test_lf_line_ending() {
        let tmp = temp_file(b"a\nb\r\nc\n");
        let file = TraceFile::new(
            tmp.path(),
            LoaderOptions {
                line_ending: LineEnding::Lf,
                ..LoaderOptions::default()
            },
        );
        file.load_blocking(None).unwrap();
        assert_eq!(messages(&file), vec!["a", "b", "c"]);
    }
}
