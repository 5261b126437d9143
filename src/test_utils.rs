use std::sync::{Arc, Mutex};

use crate::reader::source::TraceSource;
use crate::reader::store::LineStore;

/// In-memory trace source holding `lines` in order.
pub fn source_from_lines(lines: &[&str]) -> TraceSource {
    let mut store = LineStore::new();
    for line in lines {
        store.append_line(line.as_bytes());
    }
    TraceSource::new(Arc::new(Mutex::new(store)))
}

/// In-memory trace source with `count` lines `line 0`, `line 1`, ...
pub fn numbered_source(count: usize) -> TraceSource {
    let lines: Vec<String> = (0..count).map(|i| format!("line {}", i)).collect();
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    source_from_lines(&refs)
}
