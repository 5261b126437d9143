use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::line::{Line, LineView};
use super::store::LineStore;
use super::LineSource;
use crate::filter::search::QuickSearch;
use crate::index::bitset::BitSet;
use crate::parser::{FormatError, LineDesc, TraceFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

/// Read-only view over a shared [`LineStore`].
///
/// The visible line count is a snapshot that only moves on [`refresh`], so a
/// consumer sees a stable range while a load appends in the background.
///
/// [`refresh`]: TraceSource::refresh
#[derive(Debug, Clone)]
pub struct TraceSource {
    store: Arc<Mutex<LineStore>>,
    count: usize,
}

impl TraceSource {
    pub fn new(store: Arc<Mutex<LineStore>>) -> Self {
        let mut source = Self { store, count: 0 };
        source.refresh();
        source
    }

    fn lock(&self) -> MutexGuard<'_, LineStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resynchronize with the store. Returns true if new lines became visible.
    pub fn refresh(&mut self) -> bool {
        let count = self.lock().len();
        let grew = count > self.count;
        self.count = count;
        grew
    }

    /// Owned copy of line `index`, or an empty line if out of range.
    pub fn line(&self, index: usize) -> Line {
        self.with_line(index, |line| line.to_line())
            .unwrap_or_default()
    }

    /// Parse every line with `spec` from now on.
    ///
    /// On error the previous format stays active.
    pub fn set_format(&self, spec: &str, separators: Option<&str>) -> Result<(), FormatError> {
        let format = TraceFormat::new(spec, separators)?;
        self.lock().set_format(Some(format));
        Ok(())
    }

    pub fn clear_format(&self) {
        self.lock().set_format(None);
    }

    /// Fields captured by the active format.
    pub fn desc(&self) -> LineDesc {
        self.lock()
            .format()
            .map(TraceFormat::desc)
            .unwrap_or_default()
    }

    /// Adjust the active counter of one line. Returns false if out of range.
    pub fn update_line_active(&self, index: usize, delta: i32) -> bool {
        if index >= self.count {
            return false;
        }
        match self.lock().record_mut(index) {
            Ok(record) => {
                record.active += delta;
                true
            }
            Err(_) => false,
        }
    }

    /// Adjust the active counter of every line set in `lines`.
    pub fn update_lines_active(&self, lines: &BitSet, delta: i32) {
        let mut store = self.lock();
        for index in lines.iter_ones().take_while(|&i| i < self.count) {
            if let Ok(record) = store.record_mut(index) {
                record.active += delta;
            }
        }
    }

    /// Indices of lines with a positive active counter.
    pub fn active_line_indices(&self) -> Vec<usize> {
        let store = self.lock();
        (0..self.count)
            .filter(|&i| store.record(i).is_ok_and(|r| r.active > 0))
            .collect()
    }

    /// Next line at or after (or before) `from` whose message contains the
    /// pattern.
    pub fn find(&self, search: &QuickSearch, from: usize, direction: Direction) -> Option<usize> {
        if self.count == 0 {
            return None;
        }
        let mut store = self.lock();
        let mut matches = |i: usize| store.line(i).is_some_and(|l| search.is_match(l.msg()));

        match direction {
            Direction::Forward => (from..self.count).find(|&i| matches(i)),
            Direction::Backward => (0..=from.min(self.count - 1)).rev().find(|&i| matches(i)),
        }
    }
}

impl LineSource for TraceSource {
    fn line_count(&self) -> usize {
        self.count
    }

    fn with_line<R>(&self, index: usize, f: impl FnOnce(LineView<'_>) -> R) -> Option<R> {
        if index >= self.count {
            return None;
        }
        let mut store = self.lock();
        store.line(index).map(f)
    }

    fn clear_colors(&self) {
        self.lock().clear_colors();
    }

    fn compare_and_set_color(&self, index: usize, expected: u8, color: u8) -> bool {
        index < self.count && self.lock().compare_and_set_color(index, expected, color)
    }
}
