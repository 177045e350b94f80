//! Model registry data shapes.
//!
//! These types describe what the registry knows about a model *before* any
//! of it has been downloaded: its identity, where to fetch it from, and how
//! to tell a good copy from a bad one. Nothing here reads a file or opens a
//! socket — see `sherpa-acquire-download` for the side-effecting half.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::module_kind::ModuleKind;

/// Identifier for a model within its module kind's namespace.
///
/// Two different module kinds may each have a model named `small`; identity
/// is always the `(ModuleKind, name)` pair, never the name alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelId {
    kind: ModuleKind,
    name: String,
}

impl ModelId {
    /// Construct a model id. `name` is used verbatim as a path segment by
    /// the path resolver, so callers outside the registry loader should
    /// prefer looking ids up through the registry rather than constructing
    /// them from untrusted strings.
    pub fn new(kind: ModuleKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ModuleKind {
        self.kind
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// The archive format a model's bundle is packaged in, or none if the
/// registry entry lists loose files with no wrapping archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    TarBz2,
    TarGz,
    /// Bare `.tar`, no outer compression.
    Tar,
    Zip,
    /// Single-stream gzip, not a tar container (output is one file).
    Gz,
    /// Single-stream bzip2, not a tar container (output is one file).
    Bz2,
    #[default]
    None,
}

impl ArchiveFormat {
    /// Guess a format from a URL's filename suffix, matched longest-suffix
    /// first so `.tar.gz` is not mistaken for a bare `.gz`. Falls back to
    /// `None` (loose files) rather than guessing wrong.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        let lower = url.to_ascii_lowercase();
        if lower.ends_with(".tar.bz2") || lower.ends_with(".tbz2") || lower.ends_with(".tb2") {
            Self::TarBz2
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Self::TarGz
        } else if lower.ends_with(".tar") {
            Self::Tar
        } else if lower.ends_with(".zip") {
            Self::Zip
        } else if lower.ends_with(".gz") {
            Self::Gz
        } else if lower.ends_with(".bz2") {
            Self::Bz2
        } else {
            Self::None
        }
    }
}

/// A single file that must end up on disk for a model to be considered
/// complete, with the checksum used by the hash verifier (C2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    /// Path relative to the model's root directory, forward-slash separated
    /// even on Windows.
    pub relative_path: String,
    /// Expected size in bytes, used for HEAD-probe sanity checks and resume
    /// validation before a SHA-256 pass is warranted.
    pub size_bytes: u64,
    /// Expected SHA-256 digest, lowercase hex. `None` means this file is not
    /// integrity-checked (e.g. a generated sidecar written by the engine
    /// itself after load).
    pub sha256: Option<String>,
}

/// One entry in the model registry: a model's source, expected contents,
/// and classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: ModelId,
    pub display_name: String,
    /// Either a single archive URL that expands into `files`, or `None` if
    /// `files` each carry their own download URL (see `download_url`).
    pub archive_url: Option<String>,
    pub archive_format: ArchiveFormat,
    /// Per-file download URL, used only when `archive_url` is `None`.
    pub file_base_url: Option<String>,
    pub files: Vec<FileSpec>,
    /// Monotonically increasing revision, bumped whenever upstream content
    /// changes under a stable model id.
    pub revision: u32,
}

/// The full set of models the registry knows about, as loaded from either
/// the embedded default manifest or an operator-supplied override file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Manifest {
    pub schema_version: u32,
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    #[must_use]
    pub fn find(&self, kind: ModuleKind, name: &str) -> Option<&ManifestEntry> {
        self.entries
            .iter()
            .find(|entry| entry.id.kind() == kind && entry.id.name() == name)
    }

    #[must_use]
    pub fn list(&self, kind: ModuleKind) -> Vec<&ManifestEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.id.kind() == kind)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_format_from_url_recognizes_known_suffixes() {
        assert_eq!(
            ArchiveFormat::from_url("https://x/y/model.tar.bz2"),
            ArchiveFormat::TarBz2
        );
        assert_eq!(
            ArchiveFormat::from_url("https://x/y/model.zip"),
            ArchiveFormat::Zip
        );
        assert_eq!(
            ArchiveFormat::from_url("https://x/y/model.onnx"),
            ArchiveFormat::None
        );
    }

    #[test]
    fn model_id_display_is_kind_slash_name() {
        let id = ModelId::new(ModuleKind::Tts, "kokoro-en-v1");
        assert_eq!(id.to_string(), "tts/kokoro-en-v1");
    }

    #[test]
    fn manifest_find_is_scoped_by_kind() {
        let manifest = Manifest {
            schema_version: 1,
            entries: vec![ManifestEntry {
                id: ModelId::new(ModuleKind::Asr, "small"),
                display_name: "Small ASR".into(),
                archive_url: Some("https://example.invalid/small.tar.bz2".into()),
                archive_format: ArchiveFormat::TarBz2,
                file_base_url: None,
                files: vec![],
                revision: 1,
            }],
        };

        assert!(manifest.find(ModuleKind::Asr, "small").is_some());
        assert!(manifest.find(ModuleKind::Tts, "small").is_none());
    }
}
