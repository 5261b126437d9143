//! Filter color palette.
//!
//! Lines carry a small color index; index 0 means "not colored". The palette
//! maps the remaining indices to names used in config files and on the
//! command line, and to terminal colors for output.

use colored::{Color, ColoredString, Colorize};
use strsim::jaro_winkler;
use thiserror::Error;

use crate::reader::line::NO_COLOR;

const SIMILARITY_THRESHOLD: f64 = 0.8;

/// Built-in entries for indices 1..=15.
const STANDARD: [(&str, Color); 15] = [
    ("red", Color::Red),
    ("green", Color::Green),
    ("yellow", Color::Yellow),
    ("blue", Color::Blue),
    ("magenta", Color::Magenta),
    ("cyan", Color::Cyan),
    ("white", Color::White),
    ("gray", Color::BrightBlack),
    ("light_red", Color::BrightRed),
    ("light_green", Color::BrightGreen),
    ("light_yellow", Color::BrightYellow),
    ("light_blue", Color::BrightBlue),
    ("light_magenta", Color::BrightMagenta),
    ("light_cyan", Color::BrightCyan),
    ("black", Color::Black),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown color '{name}'{}", hint(.suggestion))]
pub struct UnknownColor {
    pub name: String,
    pub suggestion: Option<String>,
}

/// Immutable mapping between color indices, names and terminal colors.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    entries: Vec<(&'static str, Color)>,
}

impl Default for Palette {
    fn default() -> Self {
        Self::standard()
    }
}

impl Palette {
    pub fn standard() -> Self {
        Self {
            entries: STANDARD.to_vec(),
        }
    }

    /// Number of usable colors, "no color" excluded.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a color name (or a numeric index) to its index.
    ///
    /// `none` maps to the "no color" index.
    pub fn index_of(&self, name: &str) -> Result<u8, UnknownColor> {
        let normalized = normalize(name);
        if normalized == "none" {
            return Ok(NO_COLOR);
        }
        if let Ok(index) = normalized.parse::<u8>() {
            if (index as usize) <= self.len() {
                return Ok(index);
            }
        }
        if let Some(pos) = self.entries.iter().position(|(n, _)| *n == normalized) {
            return Ok(pos as u8 + 1);
        }

        let suggestion = self
            .entries
            .iter()
            .map(|(n, _)| (*n, jaro_winkler(&normalized, n)))
            .filter(|(_, score)| *score >= SIMILARITY_THRESHOLD)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(n, _)| n.to_string());

        Err(UnknownColor {
            name: name.to_string(),
            suggestion,
        })
    }

    pub fn name(&self, index: u8) -> Option<&'static str> {
        self.entry(index).map(|(n, _)| n)
    }

    pub fn color(&self, index: u8) -> Option<Color> {
        self.entry(index).map(|(_, c)| c)
    }

    /// `text` in the color at `index`; uncolored for index 0 or unknown indices.
    pub fn paint(&self, text: &str, index: u8) -> ColoredString {
        match self.color(index) {
            Some(color) => text.color(color),
            None => text.normal(),
        }
    }

    fn entry(&self, index: u8) -> Option<(&'static str, Color)> {
        if index == NO_COLOR {
            return None;
        }
        self.entries.get(index as usize - 1).copied()
    }
}

/// Lowercase with `-`/space as `_`; `grey`, `bright_*` and `lightX` spellings folded.
fn normalize(name: &str) -> String {
    let name = name
        .trim()
        .to_lowercase()
        .replace(['-', ' '], "_")
        .replace("grey", "gray");
    if matches!(name.as_str(), "dark_gray" | "darkgray" | "bright_black") {
        return "gray".to_string();
    }
    let light = name
        .strip_prefix("bright_")
        .or_else(|| name.strip_prefix("light").filter(|r| !r.is_empty() && !r.starts_with('_')));
    match light {
        Some(rest) => format!("light_{}", rest),
        None => name.clone(),
    }
}

fn hint(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|s| format!(", did you mean '{}'?", s))
        .unwrap_or_default()
}
