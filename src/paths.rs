//! Configuration file location
//!
//! - **Development**: in debug builds a `config.yaml` in the current working
//!   directory wins, so `cargo run` picks up the project's file.
//! - **Installed** (default): `<config dir>/logue-librarian/config.yaml`
//!   (`~/.config` on Linux, `%APPDATA%` on Windows).

use std::path::{Path, PathBuf};

/// Directory name under the platform config directory
const APP_NAME: &str = "logue-librarian";

const CONFIG_FILE: &str = "config.yaml";

/// Platform config directory for the librarian
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

pub fn default_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

/// Pick the config file: explicit path, then dev-mode cwd file, then default.
///
/// Called before logging is initialized.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    #[cfg(debug_assertions)]
    {
        let cwd_config = std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(CONFIG_FILE);
        if cwd_config.exists() {
            eprintln!("[paths] Using config.yaml from current directory");
            return cwd_config;
        }
    }

    default_config_path()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins() {
        let path = PathBuf::from("/tmp/custom.yaml");
        assert_eq!(resolve_config_path(Some(&path)), path);
    }

    #[test]
    fn test_default_path_layout() {
        let path = default_config_path();
        assert!(path.ends_with("logue-librarian/config.yaml"));
    }
}
