//! Config loading for traceview.
//!
//! Loads the YAML files found by discovery and validates filter entries.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::discovery::DiscoveryResult;
use crate::config::error::ConfigError;
use crate::config::types::{Config, FilterRule, FilterSpec, RawConfig, RawFilter};
use crate::filter::{Leaf, LeafKind};
use crate::parser::TraceFormat;
use crate::theme::Palette;

/// Expand a leading `~` to the home directory.
pub fn expand_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path_str == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }

    path.to_path_buf()
}

fn load_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    // An empty or comment-only file is an empty config
    if content
        .lines()
        .all(|l| l.trim().is_empty() || l.trim_start().starts_with('#'))
    {
        return Ok(RawConfig::default());
    }

    serde_saphyr::from_str(&content)
        .map_err(|e| ConfigError::from_saphyr_error(path.to_path_buf(), e))
}

/// Validate one file's raw config.
fn validate(raw: RawConfig, path: &Path, palette: &Palette) -> Result<Config, ConfigError> {
    let invalid = |message: String| ConfigError::Validation {
        path: path.to_path_buf(),
        message,
    };

    check_format(raw.format.as_deref(), raw.separator.as_deref()).map_err(invalid)?;
    if raw.block_size == Some(0) {
        return Err(invalid("block_size must be greater than zero".to_string()));
    }

    let filters = raw
        .filters
        .iter()
        .enumerate()
        .map(|(i, f)| validate_filter(f, &format!("filters[{}]", i), palette))
        .collect::<Result<Vec<_>, String>>()
        .map_err(invalid)?;

    Ok(Config {
        format: raw.format,
        separator: raw.separator,
        line_ending: raw.line_ending.unwrap_or_default(),
        block_size: raw.block_size,
        filters,
    })
}

/// Format and separator are independent, so a separator without a format
/// is checked against the plain `msg` format.
fn check_format(format: Option<&str>, separator: Option<&str>) -> Result<(), String> {
    if format.is_none() && separator.is_none() {
        return Ok(());
    }
    TraceFormat::new(format.unwrap_or("msg"), separator)
        .map(|_| ())
        .map_err(|e| format!("invalid format: {}", e))
}

fn validate_filter(raw: &RawFilter, at: &str, palette: &Palette) -> Result<FilterSpec, String> {
    let mut rules = Vec::new();
    let leaf = |kind: LeafKind, text: String| -> Result<FilterRule, String> {
        Leaf::parse(kind, &text, raw.ignore_case).map_err(|e| format!("{}: {}", at, e))?;
        Ok(FilterRule::Leaf {
            kind,
            text,
            ignore_case: raw.ignore_case,
        })
    };
    let nested = |children: &[RawFilter], key: &str| -> Result<Vec<FilterSpec>, String> {
        children
            .iter()
            .enumerate()
            .map(|(i, f)| validate_filter(f, &format!("{}.{}[{}]", at, key, i), palette))
            .collect()
    };

    if let Some(text) = &raw.text {
        rules.push(leaf(LeafKind::Text, text.clone())?);
    }
    if let Some(tid) = &raw.tid {
        rules.push(leaf(LeafKind::Thread, tid.to_string())?);
    }
    if let Some(user) = &raw.user {
        rules.push(leaf(LeafKind::User, user.clone())?);
    }
    if let Some(range) = &raw.range {
        rules.push(leaf(LeafKind::Range, range.to_string())?);
    }
    if let Some(any) = &raw.any {
        rules.push(FilterRule::Any(nested(any, "any")?));
    }
    if let Some(all) = &raw.all {
        rules.push(FilterRule::All(nested(all, "all")?));
    }

    if rules.len() != 1 {
        return Err(format!(
            "{}: expected exactly one of text, tid, user, range, any, all (found {})",
            at,
            rules.len()
        ));
    }

    let color = match &raw.color {
        Some(name) => palette
            .index_of(name)
            .map_err(|e| format!("{}: {}", at, e))?,
        None => 0,
    };

    Ok(FilterSpec {
        rule: rules.remove(0),
        color,
        enabled: raw.enabled.unwrap_or(true),
    })
}

/// Load and validate a single config file.
pub fn load_single_file(path: &Path, palette: &Palette) -> Result<Config, ConfigError> {
    validate(load_file(path)?, path, palette)
}

/// Load config from discovered config files.
///
/// The global config is loaded first; keys set in the project config override
/// it, and a non-empty project filter list replaces the global one.
/// Returns the default config if no config file exists.
pub fn load(discovery: &DiscoveryResult, palette: &Palette) -> Result<Config, ConfigError> {
    let mut config = Config::default();

    if let Some(global_path) = &discovery.global_config {
        config = load_single_file(global_path, palette)?;
    }

    if let Some(project_path) = &discovery.project_config {
        let project = load_single_file(project_path, palette)?;
        config.format = project.format.or(config.format);
        config.separator = project.separator.or(config.separator);
        config.block_size = project.block_size.or(config.block_size);
        if project.line_ending != Default::default() {
            config.line_ending = project.line_ending;
        }
        if !project.filters.is_empty() {
            config.filters = project.filters;
        }
    }

    Ok(config)
}
