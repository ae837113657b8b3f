//! Filesystem layout under the operator's home directory.
//!
//! ```text
//! ~/.calsync/
//!   config.yaml
//!   data/
//!     <backend>/        (per-backend state, e.g. OAuth tokens)
//! ```
//!
//! Every helper takes `home` explicitly; [`home`] resolves it for callers
//! outside tests.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const CONFIG_FILE: &str = "config.yaml";

pub fn calsync_root(home: &Path) -> PathBuf {
    home.join(".calsync")
}

pub fn config_path(home: &Path) -> PathBuf {
    calsync_root(home).join(CONFIG_FILE)
}

pub fn data_dir(home: &Path) -> PathBuf {
    calsync_root(home).join("data")
}

pub fn backend_data_dir(home: &Path, backend: &str) -> PathBuf {
    data_dir(home).join(backend)
}

/// Expand a leading `~` against `home`. Other paths are returned unchanged.
pub fn expand_tilde(path: &Path, home: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted_at_dot_calsync() {
        let home = Path::new("/home/op");
        assert_eq!(config_path(home), PathBuf::from("/home/op/.calsync/config.yaml"));
        assert_eq!(
            backend_data_dir(home, "google_calendar"),
            PathBuf::from("/home/op/.calsync/data/google_calendar")
        );
    }

    #[test]
    fn tilde_expansion() {
        let home = Path::new("/home/op");
        assert_eq!(
            expand_tilde(Path::new("~/wow/CalendarSync.yaml"), home),
            PathBuf::from("/home/op/wow/CalendarSync.yaml")
        );
        assert_eq!(expand_tilde(Path::new("~"), home), PathBuf::from("/home/op"));
        assert_eq!(
            expand_tilde(Path::new("/abs/file.yaml"), home),
            PathBuf::from("/abs/file.yaml")
        );
    }
}
