pub mod block;
pub mod block_array;
pub mod line;
pub mod loader;
pub mod source;
pub mod store;

pub use line::{Line, LineView};

/// Line access used by filter evaluation.
///
/// Every call is independent: implementations lock per call, so a caller
/// walking many lines may observe the source growing in between.
pub trait LineSource {
    /// Number of lines visible to the caller
    fn line_count(&self) -> usize;

    /// Run `f` on line `index`; `None` if the index is out of range.
    fn with_line<R>(&self, index: usize, f: impl FnOnce(LineView<'_>) -> R) -> Option<R>;

    /// Reset every line's color annotation.
    fn clear_colors(&self);

    /// Color line `index` if its color still equals `expected`.
    fn compare_and_set_color(&self, index: usize, expected: u8, color: u8) -> bool;
}
