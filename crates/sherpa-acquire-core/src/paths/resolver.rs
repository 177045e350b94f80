//! C1 Path Resolver: derives the on-disk layout for every module and model
//! from a single data root, with no hidden state and no I/O of its own.
//!
//! Layout:
//! ```text
//! <data_root>/<module-kind>/<model-name>/<relative file path>
//! ```
//! Module kinds and model names are always lowered kebab-case path
//! segments (see `ModuleKind::as_kebab`); callers are responsible for using
//! model names that are already safe path segments, since the resolver's
//! job is to compose paths, not to sanitize arbitrary strings.

use std::path::{Path, PathBuf};

use crate::domain::module_kind::ModuleKind;

use super::error::PathError;
use super::platform::data_root;

/// Resolves filesystem locations for modules and models without touching
/// the filesystem itself.
///
/// Cheap to construct and clone; holds only a `PathBuf`. Construct once per
/// process via [`PathResolver::from_env`] and share it, rather than calling
/// [`data_root`] repeatedly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    data_root: PathBuf,
}

impl PathResolver {
    /// Build a resolver rooted at an explicit directory, bypassing
    /// environment/platform resolution entirely. Primarily useful in tests.
    #[must_use]
    pub fn with_root(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }

    /// Build a resolver rooted at the environment/platform-resolved data
    /// root (see [`data_root`]).
    pub fn from_env() -> Result<Self, PathError> {
        Ok(Self {
            data_root: data_root()?,
        })
    }

    #[must_use]
    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Root directory for all models of a given module kind, e.g.
    /// `<data_root>/tts`.
    #[must_use]
    pub fn module_root(&self, kind: ModuleKind) -> PathBuf {
        self.data_root.join(kind.as_kebab())
    }

    /// Root directory for a single model's files, e.g.
    /// `<data_root>/tts/kokoro-en-v1`.
    #[must_use]
    pub fn model_root(&self, kind: ModuleKind, model_name: &str) -> PathBuf {
        self.module_root(kind).join(model_name)
    }

    /// Absolute path to a single file within a model, validating that
    /// `relative_path` cannot escape the model's root directory.
    pub fn file_path(
        &self,
        kind: ModuleKind,
        model_name: &str,
        relative_path: &str,
    ) -> Result<PathBuf, PathError> {
        let relative = Path::new(relative_path);

        if relative_path.is_empty()
            || relative.is_absolute()
            || relative.components().any(|c| {
                matches!(
                    c,
                    std::path::Component::ParentDir | std::path::Component::RootDir
                )
            })
        {
            return Err(PathError::InvalidRelativePath(relative_path.to_string()));
        }

        Ok(self.model_root(kind, model_name).join(relative))
    }

    /// Path to the staging directory used while a model is being downloaded
    /// or extracted, kept separate from `model_root` so a crash mid-download
    /// can never leave a partially-written model looking complete.
    #[must_use]
    pub fn staging_root(&self, kind: ModuleKind, model_name: &str) -> PathBuf {
        self.module_root(kind).join(".staging").join(model_name)
    }
}
