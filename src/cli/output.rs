//! Rendering of selected lines to stdout.

use std::io::{self, Write};

use crate::index::bitset::BitSet;
use crate::reader::source::TraceSource;
use crate::theme::Palette;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Raw line content, painted with the filter color
    Text,
    /// One JSON object per line
    Json,
    Count,
}

pub struct Printer<'a, W: Write> {
    out: W,
    palette: &'a Palette,
    mode: OutputMode,
}

impl<'a, W: Write> Printer<'a, W> {
    pub fn new(out: W, palette: &'a Palette, mode: OutputMode) -> Self {
        Self { out, palette, mode }
    }

    /// Print the selected lines with index `>= from`. Returns how many matched.
    ///
    /// In count mode only the number is written.
    pub fn print(&mut self, source: &TraceSource, selection: &BitSet, from: usize) -> io::Result<usize> {
        let mut printed = 0;
        for index in selection.iter_ones().skip_while(|&i| i < from) {
            printed += 1;
            match self.mode {
                OutputMode::Count => {}
                OutputMode::Text => {
                    let line = source.line(index);
                    writeln!(self.out, "{}", self.palette.paint(&line.content, line.color))?;
                }
                OutputMode::Json => {
                    let line = source.line(index);
                    serde_json::to_writer(&mut self.out, &line).map_err(io::Error::other)?;
                    writeln!(self.out)?;
                }
            }
        }

        if self.mode == OutputMode::Count {
            writeln!(self.out, "{}", printed)?;
        }
        self.out.flush()?;
        Ok(printed)
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
