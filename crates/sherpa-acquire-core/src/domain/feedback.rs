//! The feedback event union emitted by the acquisition and streaming
//! components (C5 Feedback Bus).
//!
//! A single enum is used across download progress, extraction, verification,
//! and module lifecycle events rather than one channel per component, so a
//! host application can subscribe once and match on `event_name()` or the
//! serialized `type` tag for cross-language consumers. Every acquisition
//! terminates in exactly one of `Success`, `Failed`, or `Cancel` (per the
//! error-handling design's "exactly one terminal event" rule); everything
//! else is an intermediate progress report and must never be mistaken for
//! one of those three.

use serde::{Deserialize, Serialize};

use super::model::ModelId;

/// Cross-component progress and lifecycle events.
///
/// Serialized with an explicit `type` tag (snake_case) so that non-Rust
/// consumers (a host app's UI layer, a log sink) can dispatch on the wire
/// shape without knowing the Rust enum layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedbackEvent {
    /// The orchestrator has accepted a model and begun the acquisition
    /// state machine (entry into `VerifyA`, per the acquisition state
    /// machine).
    Prepare { model_id: ModelId },

    /// A download for `model_id` has begun.
    DownloadStarted { model_id: ModelId },

    /// Byte-level download progress for `model_id`.
    DownloadProgress {
        model_id: ModelId,
        bytes_downloaded: u64,
        total_bytes: u64,
        /// Exponentially-weighted average bytes/sec, smoothed to avoid
        /// jitter from individual chunk timings.
        speed_bps: f64,
        eta_seconds: Option<f64>,
    },

    /// The download completed and the archive (if any) is queued for
    /// extraction.
    DownloadCompleted { model_id: ModelId },

    /// An individual download attempt failed and will be retried; this is
    /// an intermediate report, never the terminal `Failed` event.
    DownloadFailed { model_id: ModelId, error: String },

    /// The download was cancelled by the caller.
    DownloadCancelled { model_id: ModelId },

    /// Archive extraction has begun for the staged file at `file_path`.
    ExtractStarted { model_id: ModelId, file_path: String },

    /// Archive extraction progress, reported per entry rather than per byte
    /// since archive members vary wildly in size.
    ExtractProgress {
        model_id: ModelId,
        entries_done: u64,
        entries_total: u64,
    },

    /// Archive extraction finished writing every entry into the model
    /// directory.
    ExtractCompleted { model_id: ModelId },

    /// Hash verification progress for a single file within a model.
    VerifyProgress {
        model_id: ModelId,
        relative_path: String,
        bytes_processed: u64,
        total_bytes: u64,
    },

    /// A file's hash cache sidecar was still valid for its current mtime,
    /// so verification completed without reading the file body.
    VerifyCacheHit {
        model_id: ModelId,
        relative_path: String,
    },

    /// A single file passed verification (hash computed and matched, or no
    /// expected hash was registered and the file merely had to exist).
    VerifySuccess {
        model_id: ModelId,
        relative_path: String,
    },

    /// A single file's computed digest did not match the registry's
    /// expectation; the orchestrator will delete and re-download it.
    VerifyHashMismatch {
        model_id: ModelId,
        relative_path: String,
        expected: String,
        actual: String,
    },

    /// A full health check of a model has finished (C7a).
    VerifyCompleted { model_id: ModelId, healthy: bool },

    /// The subclass `initialize()` hook is running against a verified
    /// model's files (C9, between `Acquiring` and `Ready`).
    Load { model_id: ModelId },

    /// A partial download, a failed extraction, or a stale staging archive
    /// was removed from disk. `path` is the removed path, for audit
    /// logging; removal is best-effort and never masks the triggering
    /// error.
    Clean { model_id: ModelId, path: String },

    /// The whole acquire → load pipeline for `model_id` reached `Ready`.
    Success { model_id: ModelId },

    /// Terminal failure: the pipeline exhausted its retries or hit an
    /// unrecoverable error. Exactly one `Failed` (or `Success`, or
    /// `Cancel`) is emitted per acquisition.
    Failed { model_id: ModelId, error: String },

    /// The caller's cancellation token fired; this is the terminal event
    /// for a cancelled acquisition, not `Failed`.
    Cancel { model_id: ModelId },

    /// A module's lifecycle state changed (see C9).
    ModuleStateChanged { model_id: ModelId, state: String },
}

impl FeedbackEvent {
    /// Stable wire name, independent of how the enum itself is spelled,
    /// used for logging and for documentation that must not drift silently
    /// when variants are renamed.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Prepare { .. } => "prepare",
            Self::DownloadStarted { .. } => "download:started",
            Self::DownloadProgress { .. } => "download:progress",
            Self::DownloadCompleted { .. } => "download:completed",
            Self::DownloadFailed { .. } => "download:failed",
            Self::DownloadCancelled { .. } => "download:cancelled",
            Self::ExtractStarted { .. } => "extract:started",
            Self::ExtractProgress { .. } => "extract:progress",
            Self::ExtractCompleted { .. } => "extract:completed",
            Self::VerifyProgress { .. } => "verify:progress",
            Self::VerifyCacheHit { .. } => "verify:cache_hit",
            Self::VerifySuccess { .. } => "verify:success",
            Self::VerifyHashMismatch { .. } => "verify:hash_mismatch",
            Self::VerifyCompleted { .. } => "verify:completed",
            Self::Load { .. } => "load",
            Self::Clean { .. } => "clean",
            Self::Success { .. } => "success",
            Self::Failed { .. } => "failed",
            Self::Cancel { .. } => "cancel",
            Self::ModuleStateChanged { .. } => "module:state_changed",
        }
    }

    #[must_use]
    pub const fn model_id(&self) -> &ModelId {
        match self {
            Self::Prepare { model_id }
            | Self::DownloadStarted { model_id }
            | Self::DownloadProgress { model_id, .. }
            | Self::DownloadCompleted { model_id }
            | Self::DownloadFailed { model_id, .. }
            | Self::DownloadCancelled { model_id }
            | Self::ExtractStarted { model_id, .. }
            | Self::ExtractProgress { model_id, .. }
            | Self::ExtractCompleted { model_id }
            | Self::VerifyProgress { model_id, .. }
            | Self::VerifyCacheHit { model_id, .. }
            | Self::VerifySuccess { model_id, .. }
            | Self::VerifyHashMismatch { model_id, .. }
            | Self::VerifyCompleted { model_id, .. }
            | Self::Load { model_id }
            | Self::Clean { model_id, .. }
            | Self::Success { model_id }
            | Self::Failed { model_id, .. }
            | Self::Cancel { model_id }
            | Self::ModuleStateChanged { model_id, .. } => model_id,
        }
    }

    /// Whether this is one of the three terminal events a single
    /// acquisition may emit exactly once (`Success`, `Failed`, `Cancel`).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Failed { .. } | Self::Cancel { .. })
    }
}
