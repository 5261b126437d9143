//! Config error types for traceview.
//!
//! Errors render in Cargo style with the file location and, for mistyped
//! keys, a suggestion.

use std::fmt;
use std::path::PathBuf;

use strsim::jaro_winkler;

const SIMILARITY_THRESHOLD: f64 = 0.8;

/// Keys accepted at the top level and inside a filter entry.
const KNOWN_KEYS: &[&str] = &[
    "format",
    "separator",
    "line_ending",
    "block_size",
    "filters",
    "text",
    "tid",
    "user",
    "range",
    "any",
    "all",
    "color",
    "enabled",
    "ignore_case",
];

/// Error loading or parsing a config file.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading the config file.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// YAML parse error.
    Parse {
        path: PathBuf,
        message: String,
        line: Option<usize>,
        column: Option<usize>,
        suggestion: Option<String>,
    },

    /// Semantic error after parsing.
    Validation { path: PathBuf, message: String },
}

impl ConfigError {
    pub fn from_saphyr_error(path: PathBuf, err: impl fmt::Display) -> Self {
        let message = err.to_string();
        let (line, column) = location(&message);
        let suggestion = unknown_field(&message).and_then(suggest_key);
        ConfigError::Parse {
            path,
            message: message.lines().next().unwrap_or_default().to_string(),
            line,
            column,
            suggestion,
        }
    }

    /// Format error in Cargo-style format.
    pub fn format_cargo_style(&self) -> String {
        match self {
            ConfigError::Io { path, source } => {
                format!(
                    "error: cannot read config file\n  --> {}\n  |\n  = {}\n",
                    path.display(),
                    source
                )
            }
            ConfigError::Parse {
                path,
                message,
                line,
                column,
                suggestion,
            } => {
                let location = match (line, column) {
                    (Some(l), Some(c)) => format!("{}:{}:{}", path.display(), l, c),
                    (Some(l), None) => format!("{}:{}", path.display(), l),
                    _ => format!("{}", path.display()),
                };
                let mut output = format!("error: {}\n  --> {}\n  |\n", message, location);
                if let Some(suggestion) = suggestion {
                    output.push_str(&format!("  = help: did you mean `{}`?\n", suggestion));
                }
                output
            }
            ConfigError::Validation { path, message } => {
                format!("error: {}\n  --> {}\n  |\n", message, path.display())
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_cargo_style())
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Name from serde's "unknown field `name`" message.
fn unknown_field(message: &str) -> Option<&str> {
    let rest = &message[message.find("unknown field `")? + "unknown field `".len()..];
    rest.split('`').next()
}

fn suggest_key(name: &str) -> Option<String> {
    KNOWN_KEYS
        .iter()
        .map(|&k| (k, jaro_winkler(name, k)))
        .filter(|(_, score)| *score >= SIMILARITY_THRESHOLD)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(k, _)| k.to_string())
}

/// First `line N` / `column N` pair mentioned in a parser message.
fn location(message: &str) -> (Option<usize>, Option<usize>) {
    let number_after = |key: &str| {
        let start = message.find(key)? + key.len();
        let digits: String = message[start..]
            .chars()
            .skip_while(|c| c.is_whitespace())
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse().ok()
    };
    (number_after("line"), number_after("column"))
}
