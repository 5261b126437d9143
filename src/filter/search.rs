use std::fmt;

/// Single-pattern substring search (Quick Search variant of Boyer-Moore).
///
/// Only the bad-character table is used. After a mismatch at window `j`, the
/// byte at `j + m` (one past the window) must take part in the next attempt,
/// so its table entry gives the shift.
#[derive(Clone)]
pub struct QuickSearch {
    pattern: Vec<u8>,
    ignore_case: bool,
    shift: [usize; 256],
}

#[inline]
fn fold(b: u8, ignore_case: bool) -> u8 {
    if ignore_case {
        b.to_ascii_uppercase()
    } else {
        b
    }
}

impl QuickSearch {
    pub fn new(pattern: impl AsRef<[u8]>, ignore_case: bool) -> Self {
        let pattern = pattern.as_ref().to_vec();
        let m = pattern.len();
        let mut shift = [m + 1; 256];
        for (i, &b) in pattern.iter().enumerate() {
            shift[fold(b, ignore_case) as usize] = m - i;
        }
        Self {
            pattern,
            ignore_case,
            shift,
        }
    }

    pub fn pattern(&self) -> &[u8] {
        &self.pattern
    }

    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    /// Offset of the first match in `buf`.
    pub fn find(&self, buf: &[u8]) -> Option<usize> {
        let m = self.pattern.len();
        let n = buf.len();
        if m == 0 {
            return Some(0);
        }

        let mut j = 0;
        while j + m <= n {
            if self.window_matches(&buf[j..j + m]) {
                return Some(j);
            }
            match buf.get(j + m) {
                Some(&next) => j += self.shift[fold(next, self.ignore_case) as usize],
                None => break,
            }
        }
        None
    }

    pub fn is_match(&self, buf: &[u8]) -> bool {
        self.find(buf).is_some()
    }

    fn window_matches(&self, window: &[u8]) -> bool {
        if self.ignore_case {
            self.pattern.eq_ignore_ascii_case(window)
        } else {
            self.pattern == window
        }
    }
}

impl fmt::Debug for QuickSearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuickSearch")
            .field("pattern", &String::from_utf8_lossy(&self.pattern))
            .field("ignore_case", &self.ignore_case)
            .finish()
    }
}

impl fmt::Display for QuickSearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", String::from_utf8_lossy(&self.pattern))
    }
}
