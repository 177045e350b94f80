//! C7 Acquisition Orchestrator: drives a single model through
//! verify → download → extract → verify, retrying the whole cycle with
//! exponential backoff when a step fails recoverably, and cleaning up any
//! partial state before giving up.
//!
//! The cycle is: if the model's files already verify clean, there is
//! nothing to do. Otherwise fetch (an archive to extract, or loose files
//! downloaded directly to their final paths), then verify again. A file
//! that still doesn't match after a fetch is treated the same as a
//! transient failure — delete it and retry the whole cycle — since a
//! corrupt download and a corrupt upstream file look identical from here.

use std::path::Path;
use std::time::Duration;

use sherpa_acquire_core::domain::feedback::FeedbackEvent;
use sherpa_acquire_core::domain::model::{ArchiveFormat, FileSpec, ManifestEntry};
use sherpa_acquire_core::feedback::DeliveryContext;
use sherpa_acquire_core::paths::PathResolver;
use tokio_util::sync::CancellationToken;

use crate::archive;
use crate::downloader::{self, DownloadOptions};
use crate::error::{AcquireError, AcquireResult};
use crate::hash::{self, FileHealth};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const BACKOFF_MULTIPLIER: u32 = 2;
const MAX_BACKOFF: Duration = Duration::from_secs(16);

#[derive(Debug, Clone, Copy)]
pub struct AcquisitionOptions {
    pub max_attempts: u32,
    pub download: DownloadOptions,
}

impl Default for AcquisitionOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            download: DownloadOptions::default(),
        }
    }
}

fn backoff_for_attempt(attempt: u32) -> Duration {
    let millis = INITIAL_BACKOFF.as_millis() as u64 * u64::from(BACKOFF_MULTIPLIER).pow(attempt.saturating_sub(1));
    Duration::from_millis(millis).min(MAX_BACKOFF)
}

const PROBE_FILE_BYTES: usize = 1024;

/// Check that `data_root` has room for at least a trivial write before
/// starting an acquisition attempt. There's no portable free-space API in
/// std, so this writes and immediately removes a 1 KiB probe file and
/// treats success as sufficient headroom.
async fn probe_disk_space(data_root: &Path) -> AcquireResult<()> {
    tokio::fs::create_dir_all(data_root)
        .await
        .map_err(|e| AcquireError::Io(e.into()))?;

    let probe_path = data_root.join(".acquire-space-probe");
    let write_result = tokio::fs::write(&probe_path, vec![0u8; PROBE_FILE_BYTES]).await;
    let _ = tokio::fs::remove_file(&probe_path).await;

    write_result.map_err(|_| AcquireError::InsufficientSpace {
        path: data_root.display().to_string(),
    })
}

/// Bring `entry`'s model on disk at `resolver`'s layout into a state that
/// verifies clean against the registry, downloading and extracting
/// whatever is missing or corrupt. Idempotent: calling this on an already
/// healthy model does no I/O beyond the verification pass itself.
pub async fn prepare_model(
    client: &reqwest::Client,
    resolver: &PathResolver,
    entry: &ManifestEntry,
    cancel: &CancellationToken,
    feedback: &DeliveryContext,
    options: AcquisitionOptions,
) -> AcquireResult<()> {
    feedback.emit(FeedbackEvent::Prepare {
        model_id: entry.id.clone(),
    });

    let model_root = resolver.model_root(entry.id.kind(), entry.id.name());
    let staging_root = resolver.staging_root(entry.id.kind(), entry.id.name());

    probe_disk_space(resolver.data_root()).await?;

    let mut attempt = 0;
    loop {
        attempt += 1;

        if cancel.is_cancelled() {
            cleanup(&model_root, &staging_root, entry, feedback).await;
            feedback.emit(FeedbackEvent::Cancel {
                model_id: entry.id.clone(),
            });
            return Err(AcquireError::Cancelled);
        }

        match run_one_cycle(client, resolver, entry, cancel, feedback).await {
            Ok(()) => {
                feedback.emit(FeedbackEvent::Success {
                    model_id: entry.id.clone(),
                });
                return Ok(());
            }
            Err(err) if err.is_cancelled() => {
                cleanup(&model_root, &staging_root, entry, feedback).await;
                feedback.emit(FeedbackEvent::Cancel {
                    model_id: entry.id.clone(),
                });
                return Err(err);
            }
            Err(err) if !err.is_recoverable() || attempt >= options.max_attempts => {
                cleanup(&model_root, &staging_root, entry, feedback).await;
                feedback.emit(FeedbackEvent::Failed {
                    model_id: entry.id.clone(),
                    error: err.to_string(),
                });
                return Err(err);
            }
            Err(err) => {
                tracing::warn!(
                    model = %entry.id,
                    attempt,
                    error = %err,
                    "acquisition cycle failed, retrying"
                );
                let delay = backoff_for_attempt(attempt);
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        cleanup(&model_root, &staging_root, entry, feedback).await;
                        feedback.emit(FeedbackEvent::Cancel { model_id: entry.id.clone() });
                        return Err(AcquireError::Cancelled);
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

async fn run_one_cycle(
    client: &reqwest::Client,
    resolver: &PathResolver,
    entry: &ManifestEntry,
    cancel: &CancellationToken,
    feedback: &DeliveryContext,
) -> AcquireResult<()> {
    let report = verify_entry(resolver, entry, feedback).await?;
    if report.iter().all(|(_, health)| *health == FileHealth::Healthy) {
        return Ok(());
    }

    fetch_entry(client, resolver, entry, cancel, feedback).await?;

    let report = verify_entry(resolver, entry, feedback).await?;
    if let Some((spec, health)) = report.into_iter().find(|(_, health)| *health != FileHealth::Healthy) {
        let path = resolver.file_path(entry.id.kind(), entry.id.name(), &spec.relative_path)?;
        let _ = tokio::fs::remove_file(&path).await;
        return Err(AcquireError::other(format!(
            "{} still unhealthy after fetch: {health:?}",
            spec.relative_path
        )));
    }

    Ok(())
}

/// Verify every file the registry expects for `entry`, reporting per-file
/// outcomes on `feedback` and returning the health alongside each spec.
pub async fn verify_entry(
    resolver: &PathResolver,
    entry: &ManifestEntry,
    feedback: &DeliveryContext,
) -> AcquireResult<Vec<(FileSpec, FileHealth)>> {
    let mut results = Vec::with_capacity(entry.files.len());

    for spec in &entry.files {
        let path = resolver.file_path(entry.id.kind(), entry.id.name(), &spec.relative_path)?;
        let health = hash::verify_file(&path, spec.size_bytes, spec.sha256.as_deref()).await?;

        match &health {
            FileHealth::Healthy => feedback.emit(FeedbackEvent::VerifySuccess {
                model_id: entry.id.clone(),
                relative_path: spec.relative_path.clone(),
            }),
            FileHealth::ChecksumMismatch { expected, actual } => {
                feedback.emit(FeedbackEvent::VerifyHashMismatch {
                    model_id: entry.id.clone(),
                    relative_path: spec.relative_path.clone(),
                    expected: expected.clone(),
                    actual: actual.clone(),
                });
            }
            FileHealth::Missing | FileHealth::SizeMismatch { .. } => {}
        }

        results.push((spec.clone(), health));
    }

    Ok(results)
}

async fn fetch_entry(
    client: &reqwest::Client,
    resolver: &PathResolver,
    entry: &ManifestEntry,
    cancel: &CancellationToken,
    feedback: &DeliveryContext,
) -> AcquireResult<()> {
    let model_root = resolver.model_root(entry.id.kind(), entry.id.name());
    tokio::fs::create_dir_all(&model_root)
        .await
        .map_err(|e| AcquireError::Io(e.into()))?;

    if let Some(archive_url) = &entry.archive_url {
        fetch_via_archive(client, resolver, entry, archive_url, cancel, feedback).await
    } else {
        fetch_loose_files(client, resolver, entry, cancel, feedback).await
    }
}

async fn fetch_via_archive(
    client: &reqwest::Client,
    resolver: &PathResolver,
    entry: &ManifestEntry,
    archive_url: &str,
    cancel: &CancellationToken,
    feedback: &DeliveryContext,
) -> AcquireResult<()> {
    let staging_root = resolver.staging_root(entry.id.kind(), entry.id.name());
    tokio::fs::create_dir_all(&staging_root)
        .await
        .map_err(|e| AcquireError::Io(e.into()))?;

    let archive_name = archive_url.rsplit('/').next().unwrap_or("archive.bin");
    let archive_path = staging_root.join(archive_name);
    let model_root = resolver.model_root(entry.id.kind(), entry.id.name());

    feedback.emit(FeedbackEvent::DownloadStarted {
        model_id: entry.id.clone(),
    });
    download_with_progress(client, archive_url, &archive_path, cancel, entry, feedback).await?;
    feedback.emit(FeedbackEvent::DownloadCompleted {
        model_id: entry.id.clone(),
    });

    feedback.emit(FeedbackEvent::ExtractStarted {
        model_id: entry.id.clone(),
        file_path: archive_path.display().to_string(),
    });
    let format = if entry.archive_format == ArchiveFormat::None {
        ArchiveFormat::from_url(archive_url)
    } else {
        entry.archive_format
    };
    archive::extract(archive_path.clone(), model_root, format, None).await?;
    feedback.emit(FeedbackEvent::ExtractCompleted {
        model_id: entry.id.clone(),
    });

    let _ = tokio::fs::remove_file(&archive_path).await;
    Ok(())
}

async fn fetch_loose_files(
    client: &reqwest::Client,
    resolver: &PathResolver,
    entry: &ManifestEntry,
    cancel: &CancellationToken,
    feedback: &DeliveryContext,
) -> AcquireResult<()> {
    let Some(base_url) = &entry.file_base_url else {
        return Err(AcquireError::other(format!(
            "model {} has neither archive_url nor file_base_url",
            entry.id
        )));
    };

    for spec in &entry.files {
        let path = resolver.file_path(entry.id.kind(), entry.id.name(), &spec.relative_path)?;
        let existing = hash::verify_file(&path, spec.size_bytes, spec.sha256.as_deref()).await?;
        if existing == FileHealth::Healthy {
            continue;
        }

        let url = format!("{}/{}", base_url.trim_end_matches('/'), spec.relative_path);

        feedback.emit(FeedbackEvent::DownloadStarted {
            model_id: entry.id.clone(),
        });
        download_with_progress(client, &url, &path, cancel, entry, feedback).await?;
        feedback.emit(FeedbackEvent::DownloadCompleted {
            model_id: entry.id.clone(),
        });
    }

    Ok(())
}

async fn download_with_progress(
    client: &reqwest::Client,
    url: &str,
    dest_path: &Path,
    cancel: &CancellationToken,
    entry: &ManifestEntry,
    feedback: &DeliveryContext,
) -> AcquireResult<()> {
    let (tx, mut rx) = tokio::sync::watch::channel(downloader::DownloadProgress {
        bytes_downloaded: 0,
        total_bytes: 0,
        speed_bps: 0.0,
        eta_seconds: None,
    });

    let model_id = entry.id.clone();
    let feedback = feedback.clone();
    let watcher = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let progress = *rx.borrow();
            feedback.emit(FeedbackEvent::DownloadProgress {
                model_id: model_id.clone(),
                bytes_downloaded: progress.bytes_downloaded,
                total_bytes: progress.total_bytes,
                speed_bps: progress.speed_bps,
                eta_seconds: progress.eta_seconds,
            });
        }
    });

    let result = downloader::download_file(
        client,
        url,
        dest_path,
        cancel,
        Some(tx),
        AcquisitionOptions::default().download,
    )
    .await;

    watcher.abort();
    result
}

/// Best-effort teardown of partial state after a failed or cancelled
/// acquisition: the staging archive and, if no healthy file survived, the
/// model directory itself. Never masks the triggering error.
async fn cleanup(model_root: &Path, staging_root: &Path, entry: &ManifestEntry, feedback: &DeliveryContext) {
    if tokio::fs::remove_dir_all(staging_root).await.is_ok() {
        feedback.emit(FeedbackEvent::Clean {
            model_id: entry.id.clone(),
            path: staging_root.display().to_string(),
        });
    }

    let any_healthy = futures_util::future::join_all(entry.files.iter().map(|spec| {
        let model_root = model_root.to_path_buf();
        let relative = spec.relative_path.clone();
        async move { tokio::fs::metadata(model_root.join(relative)).await.is_ok() }
    }))
    .await
    .into_iter()
    .any(|exists| exists);

    if !any_healthy && tokio::fs::remove_dir_all(model_root).await.is_ok() {
        feedback.emit(FeedbackEvent::Clean {
            model_id: entry.id.clone(),
            path: model_root.display().to_string(),
        });
    }
}
