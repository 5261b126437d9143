//! Config discovery for traceview.
//!
//! Walks parent directories to find `traceview.yaml` and checks for a global
//! config at `~/.config/traceview/config.yaml`.

use std::path::{Path, PathBuf};

/// Project config filename to search for in parent directories.
pub const PROJECT_CONFIG_NAME: &str = "traceview.yaml";

/// Global config filename within the traceview config directory.
pub const GLOBAL_CONFIG_NAME: &str = "config.yaml";

/// Result of config discovery.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryResult {
    /// Directory containing `traceview.yaml`.
    pub project_root: Option<PathBuf>,
    /// Full path to the project config file.
    pub project_config: Option<PathBuf>,
    /// Full path to the global config file.
    pub global_config: Option<PathBuf>,
}

impl DiscoveryResult {
    /// Returns true if any config was found (project or global).
    pub fn has_config(&self) -> bool {
        self.project_config.is_some() || self.global_config.is_some()
    }
}

/// Discover config files starting from the current working directory.
pub fn discover() -> DiscoveryResult {
    discover_verbose().0
}

/// Same as [`discover`], also returning every directory that was searched.
pub fn discover_verbose() -> (DiscoveryResult, Vec<PathBuf>) {
    let global = dirs::config_dir().map(|dir| dir.join("traceview").join(GLOBAL_CONFIG_NAME));

    match std::env::current_dir() {
        Ok(dir) => {
            let cwd = dir.canonicalize().unwrap_or(dir);
            discover_from(&cwd, global.as_deref())
        }
        Err(_) => (
            DiscoveryResult {
                global_config: global.filter(|p| is_file(p)),
                ..DiscoveryResult::default()
            },
            Vec::new(),
        ),
    }
}

/// Walk `start` and its ancestors; `global` is used if it exists.
pub fn discover_from(start: &Path, global: Option<&Path>) -> (DiscoveryResult, Vec<PathBuf>) {
    let mut result = DiscoveryResult {
        global_config: global.filter(|p| is_file(p)).map(Path::to_path_buf),
        ..DiscoveryResult::default()
    };
    let mut searched_paths = Vec::new();

    for ancestor in start.ancestors() {
        searched_paths.push(ancestor.to_path_buf());

        let config_path = ancestor.join(PROJECT_CONFIG_NAME);
        if is_file(&config_path) {
            result.project_root = Some(ancestor.to_path_buf());
            result.project_config = Some(config_path);
            break;
        }
    }

    (result, searched_paths)
}

fn is_file(path: &Path) -> bool {
    path.try_exists().unwrap_or(false) && path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_finds_config_in_start_dir() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join(PROJECT_CONFIG_NAME);
        fs::write(&config_path, "format: msg\n").unwrap();

        let (result, searched) = discover_from(temp.path(), None);
        assert_eq!(result.project_config, Some(config_path));
        assert_eq!(result.project_root.as_deref(), Some(temp.path()));
        assert_eq!(searched.len(), 1);
    }

    #[test]
    fn test_finds_config_in_parent_dir() {
        let temp = TempDir::new().unwrap();
        let subdir = temp.path().join("level1").join("level2");
        fs::create_dir_all(&subdir).unwrap();
        let config_path = temp.path().join(PROJECT_CONFIG_NAME);
        fs::write(&config_path, "format: msg\n").unwrap();

        let (result, searched) = discover_from(&subdir, None);
        assert_eq!(result.project_config, Some(config_path));
        assert_eq!(searched.len(), 3);
        assert_eq!(searched[0], subdir);
    }

    #[test]
    fn test_directory_named_like_config_is_ignored() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(PROJECT_CONFIG_NAME)).unwrap();

        let (result, _) = discover_from(temp.path(), None);
        assert_ne!(
            result.project_config,
            Some(temp.path().join(PROJECT_CONFIG_NAME))
        );
    }

    #[test]
    fn test_global_config_only_when_present() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join(GLOBAL_CONFIG_NAME);

        let (result, _) = discover_from(temp.path(), Some(&global));
        assert!(result.global_config.is_none());

        fs::write(&global, "block_size: 4096\n").unwrap();
        let (result, _) = discover_from(temp.path(), Some(&global));
        assert_eq!(result.global_config, Some(global));
        assert!(result.has_config());
    }

    #[test]
    fn test_has_config() {
        assert!(!DiscoveryResult::default().has_config());
        let with_project = DiscoveryResult {
            project_config: Some(PathBuf::from("/test/traceview.yaml")),
            ..Default::default()
        };
        assert!(with_project.has_config());
    }
}
