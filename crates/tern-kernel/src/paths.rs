//! XDG base directories and tern's own paths.
//!
//! | Purpose | XDG Variable | Default |
//! |---------|--------------|---------|
//! | Config | `$XDG_CONFIG_HOME` | `~/.config` |
//! | Data | `$XDG_DATA_HOME` | `~/.local/share` |
//!
//! Embedders compose their own paths on top of the primitives:
//!
//! ```
//! use tern_kernel::paths::xdg_config_home;
//!
//! let plugin_dir = xdg_config_home().join("tern").join("plugins");
//! # let _ = plugin_dir;
//! ```

use std::path::PathBuf;

use directories::BaseDirs;

/// The user's home directory: `$HOME`, then the platform's idea of it.
///
/// `None` when neither is known; `~` then fails to expand.
pub fn home_dir() -> Option<PathBuf> {
    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => Some(PathBuf::from(home)),
        _ => BaseDirs::new().map(|d| d.home_dir().to_path_buf()),
    }
}

/// `$XDG_CONFIG_HOME`, or `~/.config`.
pub fn xdg_config_home() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.config_dir().to_path_buf())
        .unwrap_or_else(|| fallback_home().join(".config"))
}

/// `$XDG_DATA_HOME`, or `~/.local/share`.
pub fn xdg_data_home() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| fallback_home().join(".local").join("share"))
}

fn fallback_home() -> PathBuf {
    home_dir().unwrap_or_else(std::env::temp_dir)
}

/// tern's config directory.
pub fn config_dir() -> PathBuf {
    xdg_config_home().join("tern")
}

/// The rc file loaded by interactive evaluators.
pub fn rc_path() -> PathBuf {
    config_dir().join("rc.tern")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rc_lives_under_config_dir() {
        let rc = rc_path();
        assert!(rc.starts_with(config_dir()));
        assert_eq!(rc.file_name().and_then(|n| n.to_str()), Some("rc.tern"));
    }

    #[test]
    fn config_dir_is_under_xdg_config() {
        assert!(config_dir().starts_with(xdg_config_home()));
    }
}
