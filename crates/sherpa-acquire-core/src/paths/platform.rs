//! Data root resolution: explicit override, environment variable, or
//! platform default.

use std::env;
use std::path::PathBuf;

use super::error::PathError;

/// Environment variable that overrides the data root outright.
pub const DATA_ROOT_ENV: &str = "SHERPA_ACQUIRE_DATA_ROOT";

/// Resolve the root directory under which all module/model directories
/// live.
///
/// Resolution order:
/// 1. `SHERPA_ACQUIRE_DATA_ROOT` environment variable
/// 2. Platform default data directory (e.g. `~/.local/share/sherpa-acquire`
///    on Linux), via the `dirs` crate
pub fn data_root() -> Result<PathBuf, PathError> {
    if let Ok(path) = env::var(DATA_ROOT_ENV) {
        if !path.trim().is_empty() {
            return normalize_user_path(&path);
        }
    }

    let base = dirs::data_local_dir().ok_or(PathError::NoDataDir)?;
    Ok(base.join("sherpa-acquire"))
}

/// Normalize a user-provided path, expanding `~` and making it absolute.
pub(super) fn normalize_user_path(raw: &str) -> Result<PathBuf, PathError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PathError::EmptyPath);
    }

    let expanded = if trimmed.starts_with("~/") || trimmed == "~" {
        let home = dirs::home_dir().ok_or(PathError::NoHomeDir)?;
        if trimmed == "~" {
            home
        } else {
            home.join(trimmed.trim_start_matches("~/"))
        }
    } else {
        PathBuf::from(trimmed)
    };

    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(expanded))
            .map_err(|e| PathError::CurrentDirError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::test_utils::{ENV_LOCK, EnvVarGuard};

    #[test]
    fn data_root_prefers_explicit_env_override() {
        let _guard = ENV_LOCK.lock().unwrap();
        let _env = EnvVarGuard::set(DATA_ROOT_ENV, "/tmp/sherpa-acquire-test-root");
        let resolved = data_root().unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/sherpa-acquire-test-root"));
    }

    #[test]
    fn normalize_user_path_rejects_empty() {
        assert!(matches!(normalize_user_path(""), Err(PathError::EmptyPath)));
    }

    #[test]
    fn normalize_user_path_expands_tilde() {
        let home = dirs::home_dir().unwrap();
        let resolved = normalize_user_path("~/models").unwrap();
        assert_eq!(resolved, home.join("models"));
    }
}
