//! C6 Model Registry: the catalog of models known to the acquisition core,
//! loaded either from the embedded default manifest or an operator-supplied
//! override file.
//!
//! Loading the embedded manifest is pure CPU/memory work (a `serde_json`
//! parse of a compiled-in string) and deliberately lives in this crate
//! rather than `sherpa-acquire-download`, since it needs no filesystem or
//! network access. Loading an external override file does touch the
//! filesystem, but it's a single `read_to_string` plus the same parse, not
//! worth a dedicated crate boundary.

use std::path::Path;

use thiserror::Error;

use crate::domain::model::{Manifest, ManifestEntry};
use crate::domain::module_kind::ModuleKind;

const EMBEDDED_MANIFEST_JSON: &str = include_str!("default_manifest.json");

/// Errors loading or parsing a manifest.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read manifest file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("failed to parse manifest {source_label}: {reason}")]
    Parse {
        source_label: String,
        reason: String,
    },
}

/// Object-safe view over a model registry, so callers can depend on a
/// `dyn ModelRegistryPort` and tests can substitute a stub without touching
/// the embedded manifest or the filesystem.
pub trait ModelRegistryPort: Send + Sync {
    fn find(&self, kind: ModuleKind, name: &str) -> Option<ManifestEntry>;
    fn list(&self, kind: ModuleKind) -> Vec<ManifestEntry>;
}

/// Loaded, queryable catalog of models.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    manifest: Manifest,
}

impl ModelRegistry {
    /// Load the manifest compiled into the binary. This never touches the
    /// filesystem and cannot fail at runtime; a malformed embedded manifest
    /// is a build-time defect caught by the accompanying unit test.
    #[must_use]
    pub fn embedded() -> Self {
        let manifest: Manifest = serde_json::from_str(EMBEDDED_MANIFEST_JSON)
            .expect("embedded default_manifest.json must be valid");
        Self { manifest }
    }

    /// Load a manifest from an operator-supplied override file, replacing
    /// the embedded defaults entirely. Use [`Self::embedded_merged_with`] to
    /// layer instead of replace.
    pub async fn load_from_path(path: &Path) -> Result<Self, RegistryError> {
        tracing::info!(path = %path.display(), "loading model registry override");
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| RegistryError::Io {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;

        let manifest: Manifest =
            serde_json::from_str(&contents).map_err(|e| RegistryError::Parse {
                source_label: path.display().to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self { manifest })
    }

    /// Load an override file and layer it on top of the embedded defaults:
    /// entries sharing an id are replaced, new ids are appended.
    pub async fn embedded_merged_with(path: &Path) -> Result<Self, RegistryError> {
        let mut base = Self::embedded();
        let overrides = Self::load_from_path(path).await?;
        base.merge(overrides.manifest);
        Ok(base)
    }

    fn merge(&mut self, overrides: Manifest) {
        for entry in overrides.entries {
            if let Some(existing) = self
                .manifest
                .entries
                .iter_mut()
                .find(|e| e.id == entry.id)
            {
                *existing = entry;
            } else {
                self.manifest.entries.push(entry);
            }
        }
    }

    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }
}

impl ModelRegistryPort for ModelRegistry {
    fn find(&self, kind: ModuleKind, name: &str) -> Option<ManifestEntry> {
        self.manifest.find(kind, name).cloned()
    }

    fn list(&self, kind: ModuleKind) -> Vec<ManifestEntry> {
        self.manifest.list(kind).into_iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_manifest_parses_and_is_nonempty() {
        let registry = ModelRegistry::embedded();
        assert!(!registry.manifest().entries.is_empty());
    }

    #[test]
    fn embedded_manifest_covers_every_streaming_capable_kind() {
        let registry = ModelRegistry::embedded();
        for kind in ModuleKind::STREAMING_CAPABLE {
            assert!(
                !registry.list(kind).is_empty(),
                "no embedded model for {kind}"
            );
        }
    }

    #[test]
    fn find_returns_none_for_unknown_model() {
        let registry = ModelRegistry::embedded();
        assert!(registry.find(ModuleKind::Asr, "does-not-exist").is_none());
    }

    #[tokio::test]
    async fn load_from_path_rejects_missing_file() {
        let err = ModelRegistry::load_from_path(Path::new("/nonexistent/manifest.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Io { .. }));
    }

    #[tokio::test]
    async fn embedded_merged_with_overrides_matching_entries() {
        let dir = tempfile::tempdir().unwrap();
        let override_path = dir.path().join("override.json");
        tokio::fs::write(
            &override_path,
            r#"{"schema_version":1,"entries":[{"id":{"kind":"SpeechRecognition","name":"streaming-zipformer-small-en"},"display_name":"Custom name","archive_url":null,"archive_format":"none","file_base_url":null,"files":[],"revision":2}]}"#,
        )
        .await
        .unwrap();

        let merged = ModelRegistry::embedded_merged_with(&override_path)
            .await
            .unwrap();
        let entry = merged
            .find(ModuleKind::Asr, "streaming-zipformer-small-en")
            .unwrap();
        assert_eq!(entry.display_name, "Custom name");
        assert_eq!(entry.revision, 2);
    }
}
