//! C4 Resumable Downloader.
//!
//! Large model files are downloaded in parallel range chunks when the server
//! advertises `Accept-Ranges: bytes` and a known `Content-Length`, falling
//! back to a single sequential stream otherwise. Chunk progress is persisted
//! to a `<dest>.download.metadata` sidecar next to the in-flight
//! `<dest>.download` file, so a process crash mid-download loses at most the
//! chunk that was in flight, not the whole file. The final file only appears
//! at `dest_path` once every byte has landed, via an atomic rename.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{AcquireError, AcquireResult, IoFailure};
use crate::http_client::apply_github_proxy;
use crate::progress::ProgressThrottle;

/// Smoothing factor for the exponentially-weighted-average speed estimate.
/// Small values favor stability over responsiveness to bursty throughput.
const EWA_SMOOTHING: f64 = 0.02;

const DEFAULT_MAX_RETRIES: u32 = 5;
const INITIAL_BACKOFF: std::time::Duration = std::time::Duration::from_millis(500);
const MAX_BACKOFF: std::time::Duration = std::time::Duration::from_secs(30);

const MIN_CHUNK_BYTES: u64 = 1024 * 1024;
const MAX_CHUNK_BYTES: u64 = 10 * 1024 * 1024;
/// Hard ceiling on concurrent chunk requests, independent of whatever the
/// caller asks for: a model host should never see more than this many
/// simultaneous connections from one download.
const MAX_PARALLEL_CHUNKS: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct DownloadOptions {
    pub max_retries: u32,
    /// Requested chunk concurrency; clamped to [`MAX_PARALLEL_CHUNKS`].
    pub max_parallel_chunks: usize,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            max_parallel_chunks: MAX_PARALLEL_CHUNKS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    pub bytes_downloaded: u64,
    pub total_bytes: u64,
    pub speed_bps: f64,
    pub eta_seconds: Option<f64>,
}

impl DownloadProgress {
    const fn zero(total_bytes: u64) -> Self {
        Self {
            bytes_downloaded: 0,
            total_bytes,
            speed_bps: 0.0,
            eta_seconds: None,
        }
    }
}

/// One range chunk of a multi-chunk download, tracked across process
/// restarts via the metadata sidecar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct ChunkInfo {
    index: usize,
    /// Inclusive start byte offset.
    start: u64,
    /// Inclusive end byte offset.
    end: u64,
    /// Bytes of this chunk already written to the part file. A resumed
    /// attempt requests `bytes={start + downloaded}-{end}` rather than
    /// refetching from `start`.
    #[serde(default)]
    downloaded: u64,
    completed: bool,
    #[serde(default)]
    retry_count: u32,
    #[serde(default)]
    last_error: Option<String>,
}

impl ChunkInfo {
    const fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Persisted alongside the in-flight `<dest>.download` file so a resumed
/// process can tell which chunks still need fetching without re-probing
/// anything other than confirming the source hasn't changed shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DownloadMetadata {
    url: String,
    total_bytes: u64,
    chunks: Vec<ChunkInfo>,
    created_at: DateTime<Utc>,
}

/// Download `url` to `dest_path`, using parallel range chunks when the
/// server supports them and falling back to a single resumable stream
/// otherwise. Retries transient failures with exponential backoff.
pub async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest_path: &Path,
    cancel: &CancellationToken,
    progress_tx: Option<watch::Sender<DownloadProgress>>,
    options: DownloadOptions,
) -> AcquireResult<()> {
    let url = apply_github_proxy(url);

    if let Some(parent) = dest_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AcquireError::Io(IoFailure::from(e)))?;
    }

    let probe = probe_source(client, &url, cancel).await?;

    if let (Some(total_bytes), true) = (probe.total_bytes, probe.accept_ranges) {
        if total_bytes > MIN_CHUNK_BYTES {
            return download_chunked(
                client,
                &url,
                dest_path,
                total_bytes,
                cancel,
                progress_tx,
                options,
            )
            .await;
        }
    }

    download_single_stream(client, &url, dest_path, cancel, progress_tx, options).await
}

struct SourceProbe {
    total_bytes: Option<u64>,
    accept_ranges: bool,
}

/// Determine the remote file's size and whether it supports byte ranges via
/// `HEAD`, falling back to a one-byte `GET Range` request for servers that
/// reject `HEAD` outright (some CDNs fronting model hosts do).
async fn probe_source(client: &reqwest::Client, url: &str, cancel: &CancellationToken) -> AcquireResult<SourceProbe> {
    let head = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(AcquireError::Cancelled),
        result = client.head(url).send() => result,
    };

    if let Ok(response) = head {
        if response.status().is_success() {
            let accept_ranges = response
                .headers()
                .get(reqwest::header::ACCEPT_RANGES)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.eq_ignore_ascii_case("bytes"));
            return Ok(SourceProbe {
                total_bytes: response.content_length(),
                accept_ranges,
            });
        }
    }

    let probe_response = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(AcquireError::Cancelled),
        result = client
            .get(url)
            .header(reqwest::header::RANGE, "bytes=0-0")
            .send() => result.map_err(|e| AcquireError::Network(e.to_string()))?,
    };

    let accept_ranges = probe_response.status() == reqwest::StatusCode::PARTIAL_CONTENT;
    let total_bytes = probe_response
        .headers()
        .get(reqwest::header::CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.rsplit('/').next())
        .and_then(|v| v.parse::<u64>().ok())
        .or_else(|| probe_response.content_length());

    Ok(SourceProbe {
        total_bytes,
        accept_ranges,
    })
}

/// `<dest>.download` working path, renamed into place only once complete.
#[must_use]
pub fn part_path_for(dest_path: &Path) -> PathBuf {
    let mut name = dest_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".download");
    dest_path.with_file_name(name)
}

fn metadata_path_for(dest_path: &Path) -> PathBuf {
    let mut name = dest_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".download.metadata");
    dest_path.with_file_name(name)
}

fn plan_chunks(total_bytes: u64, max_parallel_chunks: usize) -> Vec<ChunkInfo> {
    let divisor = max_parallel_chunks.max(1) as u64;
    let chunk_size = (total_bytes / divisor).max(MIN_CHUNK_BYTES).min(MAX_CHUNK_BYTES);

    let mut chunks = Vec::new();
    let mut start = 0u64;
    let mut index = 0usize;
    while start < total_bytes {
        let end = (start + chunk_size - 1).min(total_bytes - 1);
        chunks.push(ChunkInfo {
            index,
            start,
            end,
            downloaded: 0,
            completed: false,
            retry_count: 0,
            last_error: None,
        });
        start = end + 1;
        index += 1;
    }
    chunks
}

async fn load_or_plan_metadata(
    dest_path: &Path,
    url: &str,
    total_bytes: u64,
    max_parallel_chunks: usize,
) -> DownloadMetadata {
    let metadata_path = metadata_path_for(dest_path);
    if let Ok(contents) = tokio::fs::read_to_string(&metadata_path).await {
        if let Ok(existing) = serde_json::from_str::<DownloadMetadata>(&contents) {
            if existing.url == url && existing.total_bytes == total_bytes {
                return existing;
            }
        }
    }

    DownloadMetadata {
        url: url.to_string(),
        total_bytes,
        chunks: plan_chunks(total_bytes, max_parallel_chunks),
        created_at: Utc::now(),
    }
}

async fn persist_metadata(dest_path: &Path, metadata: &DownloadMetadata) -> AcquireResult<()> {
    let contents = serde_json::to_string(metadata)
        .map_err(|e| AcquireError::other(format!("failed to serialize download metadata: {e}")))?;
    tokio::fs::write(metadata_path_for(dest_path), contents)
        .await
        .map_err(|e| AcquireError::Io(IoFailure::from(e)))
}

async fn download_chunked(
    client: &reqwest::Client,
    url: &str,
    dest_path: &Path,
    total_bytes: u64,
    cancel: &CancellationToken,
    progress_tx: Option<watch::Sender<DownloadProgress>>,
    options: DownloadOptions,
) -> AcquireResult<()> {
    let part_path = part_path_for(dest_path);
    let max_parallel_chunks = options.max_parallel_chunks.clamp(1, MAX_PARALLEL_CHUNKS);

    let metadata = load_or_plan_metadata(dest_path, url, total_bytes, max_parallel_chunks).await;

    {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&part_path)
            .await
            .map_err(|e| AcquireError::Io(IoFailure::from(e)))?;
        file.set_len(total_bytes)
            .await
            .map_err(|e| AcquireError::Io(IoFailure::from(e)))?;
    }
    persist_metadata(dest_path, &metadata).await?;

    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .open(&part_path)
        .await
        .map_err(|e| AcquireError::Io(IoFailure::from(e)))?;
    let file = Arc::new(Mutex::new(file));

    // Sums both fully completed chunks and the partial progress of chunks
    // still in flight from a previous process, so a resumed total reflects
    // exactly what's already on disk.
    let already_done: u64 = metadata.chunks.iter().map(|c| c.downloaded).sum();
    let downloaded = Arc::new(AtomicU64::new(already_done));
    let metadata = Arc::new(Mutex::new(metadata));
    let semaphore = Arc::new(Semaphore::new(max_parallel_chunks));

    let progress_handle = progress_tx.map(|tx| {
        spawn_progress_reporter(Arc::clone(&downloaded), total_bytes, tx, cancel.clone())
    });

    let pending: Vec<ChunkInfo> = metadata
        .lock()
        .await
        .chunks
        .iter()
        .cloned()
        .filter(|c| !c.completed)
        .collect();

    let mut joins = JoinSet::new();
    for chunk in pending {
        let client = client.clone();
        let url = url.to_string();
        let file = Arc::clone(&file);
        let downloaded = Arc::clone(&downloaded);
        let metadata = Arc::clone(&metadata);
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();
        let dest_path = dest_path.to_path_buf();
        let max_retries = options.max_retries;

        joins.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            download_chunk_with_retry(
                &client,
                &url,
                chunk,
                &file,
                &downloaded,
                &metadata,
                &dest_path,
                cancel.clone(),
                max_retries,
            )
            .await
        });
    }

    let mut first_error: Option<AcquireError> = None;
    while let Some(result) = joins.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
                joins.abort_all();
            }
            Err(join_err) => {
                if first_error.is_none() {
                    first_error = Some(AcquireError::other(format!("chunk task panicked: {join_err}")));
                }
                joins.abort_all();
            }
        }
    }

    if let Some(handle) = progress_handle {
        handle.abort();
    }

    if let Some(err) = first_error {
        return Err(err);
    }

    drop(file);

    let actual_len = tokio::fs::metadata(&part_path)
        .await
        .map_err(|e| AcquireError::Io(IoFailure::from(e)))?
        .len();
    if actual_len != total_bytes {
        return Err(AcquireError::IncompleteDownload {
            expected: total_bytes,
            actual: actual_len,
        });
    }

    tokio::fs::rename(&part_path, dest_path)
        .await
        .map_err(|e| AcquireError::Io(IoFailure::from(e)))?;
    let _ = tokio::fs::remove_file(metadata_path_for(dest_path)).await;

    Ok(())
}

fn spawn_progress_reporter(
    downloaded: Arc<AtomicU64>,
    total_bytes: u64,
    tx: watch::Sender<DownloadProgress>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(100));
        let mut speed_bps = 0.0_f64;
        let mut last_tick = Instant::now();
        let mut last_downloaded = downloaded.load(Ordering::Relaxed);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                _ = interval.tick() => {}
            }

            let current = downloaded.load(Ordering::Relaxed);
            let now = Instant::now();
            let elapsed = now.duration_since(last_tick).as_secs_f64();
            if elapsed > 0.0 {
                let instantaneous = (current.saturating_sub(last_downloaded)) as f64 / elapsed;
                speed_bps = EWA_SMOOTHING * instantaneous + (1.0 - EWA_SMOOTHING) * speed_bps;
                last_tick = now;
                last_downloaded = current;
            }

            let eta_seconds = if speed_bps > 0.0 && total_bytes > current {
                Some((total_bytes - current) as f64 / speed_bps)
            } else {
                None
            };
            let _ = tx.send(DownloadProgress {
                bytes_downloaded: current,
                total_bytes,
                speed_bps,
                eta_seconds,
            });

            if current >= total_bytes {
                return;
            }
        }
    })
}

/// Writes `chunk`'s current state into the shared metadata and flushes the
/// sidecar to disk, so a crash after this point resumes from `chunk.start +
/// chunk.downloaded` rather than refetching the whole span.
async fn persist_chunk(
    metadata: &Arc<Mutex<DownloadMetadata>>,
    dest_path: &Path,
    chunk: &ChunkInfo,
) -> AcquireResult<()> {
    let snapshot = {
        let mut guard = metadata.lock().await;
        if let Some(entry) = guard.chunks.iter_mut().find(|c| c.index == chunk.index) {
            *entry = chunk.clone();
        }
        guard.clone()
    };
    persist_metadata(dest_path, &snapshot).await
}

#[allow(clippy::too_many_arguments)]
async fn download_chunk_with_retry(
    client: &reqwest::Client,
    url: &str,
    mut chunk: ChunkInfo,
    file: &Arc<Mutex<tokio::fs::File>>,
    downloaded: &Arc<AtomicU64>,
    metadata: &Arc<Mutex<DownloadMetadata>>,
    dest_path: &Path,
    cancel: CancellationToken,
    max_retries: u32,
) -> AcquireResult<()> {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        chunk.retry_count += 1;
        match download_chunk_once(client, url, &mut chunk, file, downloaded, &cancel).await {
            Ok(()) => {
                chunk.completed = true;
                chunk.last_error = None;
                persist_chunk(metadata, dest_path, &chunk).await?;
                return Ok(());
            }
            Err(err) if err.is_cancelled() => {
                chunk.last_error = Some(err.to_string());
                persist_chunk(metadata, dest_path, &chunk).await?;
                return Err(err);
            }
            Err(err) if !err.is_recoverable() || chunk.retry_count >= max_retries => {
                chunk.last_error = Some(err.to_string());
                persist_chunk(metadata, dest_path, &chunk).await?;
                return Err(AcquireError::RetriesExhausted {
                    attempts: chunk.retry_count,
                    last_error: err.to_string(),
                });
            }
            Err(err) => {
                chunk.last_error = Some(err.to_string());
                persist_chunk(metadata, dest_path, &chunk).await?;
                tracing::warn!(
                    chunk = chunk.index,
                    attempt = chunk.retry_count,
                    downloaded = chunk.downloaded,
                    error = %err,
                    "chunk download failed, retrying"
                );
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(AcquireError::Cancelled),
                    () = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

/// Makes one attempt at `chunk`, resuming from `chunk.start +
/// chunk.downloaded` rather than always `chunk.start` so neither a retry
/// within this process nor a resume after a restart refetches bytes already
/// on disk. Updates `chunk.downloaded` as bytes are written, so a caller
/// that persists `chunk` after an error still records the partial progress
/// made before the failure.
async fn download_chunk_once(
    client: &reqwest::Client,
    url: &str,
    chunk: &mut ChunkInfo,
    file: &Arc<Mutex<tokio::fs::File>>,
    downloaded: &Arc<AtomicU64>,
    cancel: &CancellationToken,
) -> AcquireResult<()> {
    let range_start = chunk.start + chunk.downloaded;
    if range_start > chunk.end {
        return Ok(());
    }

    let response = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(AcquireError::Cancelled),
        result = client
            .get(url)
            .header(reqwest::header::RANGE, format!("bytes={}-{}", range_start, chunk.end))
            .send() => result.map_err(|e| AcquireError::Network(e.to_string()))?,
    };

    let status = response.status();
    // A range server that considers this span already satisfied (e.g. a
    // resumed chunk whose bytes were already written by a prior process)
    // answers 416; treat that the same as a completed chunk.
    if status == reqwest::StatusCode::RANGE_NOT_SATISFIABLE {
        let remaining = chunk.len() - chunk.downloaded;
        downloaded.fetch_add(remaining, Ordering::Relaxed);
        chunk.downloaded = chunk.len();
        return Ok(());
    }
    if status != reqwest::StatusCode::PARTIAL_CONTENT && !status.is_success() {
        return Err(AcquireError::UnexpectedStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    let mut stream = response.bytes_stream();
    let mut offset = range_start;

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AcquireError::Cancelled),
            next = stream.next() => next,
        };
        let Some(bytes) = next else { break };
        let bytes = bytes.map_err(|e| AcquireError::Network(e.to_string()))?;

        {
            let mut guard = file.lock().await;
            guard
                .seek(std::io::SeekFrom::Start(offset))
                .await
                .map_err(|e| AcquireError::Io(IoFailure::from(e)))?;
            guard
                .write_all(&bytes)
                .await
                .map_err(|e| AcquireError::Io(IoFailure::from(e)))?;
        }

        offset += bytes.len() as u64;
        chunk.downloaded += bytes.len() as u64;
        downloaded.fetch_add(bytes.len() as u64, Ordering::Relaxed);
    }

    Ok(())
}

/// Single-stream fallback used when the server doesn't support ranges or
/// doesn't advertise a content length, resuming from a `.download` sibling
/// left by a previous attempt.
async fn download_single_stream(
    client: &reqwest::Client,
    url: &str,
    dest_path: &Path,
    cancel: &CancellationToken,
    progress_tx: Option<watch::Sender<DownloadProgress>>,
    options: DownloadOptions,
) -> AcquireResult<()> {
    let part_path = part_path_for(dest_path);

    let mut attempt = 0;
    let mut backoff = INITIAL_BACKOFF;

    loop {
        attempt += 1;
        match try_download_once(client, url, &part_path, cancel, progress_tx.as_ref()).await {
            Ok(()) => {
                tokio::fs::rename(&part_path, dest_path)
                    .await
                    .map_err(|e| AcquireError::Io(IoFailure::from(e)))?;
                return Ok(());
            }
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) if !err.is_recoverable() || attempt >= options.max_retries => {
                return Err(AcquireError::RetriesExhausted {
                    attempts: attempt,
                    last_error: err.to_string(),
                });
            }
            Err(err) => {
                tracing::warn!(attempt, error = %err, "download attempt failed, retrying");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(AcquireError::Cancelled),
                    () = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

async fn try_download_once(
    client: &reqwest::Client,
    url: &str,
    part_path: &Path,
    cancel: &CancellationToken,
    progress_tx: Option<&watch::Sender<DownloadProgress>>,
) -> AcquireResult<()> {
    let resume_offset = existing_part_size(part_path).await?;

    let mut request = client.get(url);
    if resume_offset > 0 {
        request = request.header(reqwest::header::RANGE, format!("bytes={resume_offset}-"));
    }

    let response = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(AcquireError::Cancelled),
        result = request.send() => result.map_err(|e| AcquireError::Network(e.to_string()))?,
    };

    let status = response.status();
    let (mut file, start_offset) = if resume_offset > 0 && status == reqwest::StatusCode::PARTIAL_CONTENT {
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(part_path)
            .await
            .map_err(|e| AcquireError::Io(IoFailure::from(e)))?;
        (file, resume_offset)
    } else if status.is_success() {
        // Either we asked for the whole file, or the server ignored our
        // Range request (full 200 OK) — either way, start from scratch.
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(part_path)
            .await
            .map_err(|e| AcquireError::Io(IoFailure::from(e)))?;
        (file, 0)
    } else {
        return Err(AcquireError::UnexpectedStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    };

    file.seek(std::io::SeekFrom::Start(start_offset))
        .await
        .map_err(|e| AcquireError::Io(IoFailure::from(e)))?;

    let content_length = response.content_length().unwrap_or(0);
    let total_bytes = start_offset + content_length;

    stream_body_to_file(
        response,
        &mut file,
        start_offset,
        total_bytes,
        cancel,
        progress_tx,
    )
    .await
}

async fn stream_body_to_file(
    response: reqwest::Response,
    file: &mut tokio::fs::File,
    start_offset: u64,
    total_bytes: u64,
    cancel: &CancellationToken,
    progress_tx: Option<&watch::Sender<DownloadProgress>>,
) -> AcquireResult<()> {
    let mut stream = response.bytes_stream();
    let mut downloaded = start_offset;
    let mut speed_bps = 0.0_f64;
    let mut last_tick = Instant::now();
    let mut last_downloaded = start_offset;
    let mut throttle = ProgressThrottle::default_interval();

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AcquireError::Cancelled),
            next = stream.next() => next,
        };

        let Some(chunk) = next else { break };
        let chunk = chunk.map_err(|e| AcquireError::Network(e.to_string()))?;

        file.write_all(&chunk)
            .await
            .map_err(|e| AcquireError::Io(IoFailure::from(e)))?;

        downloaded += chunk.len() as u64;

        let now = Instant::now();
        let elapsed = now.duration_since(last_tick).as_secs_f64();
        if elapsed > 0.0 {
            let instantaneous = (downloaded - last_downloaded) as f64 / elapsed;
            speed_bps = EWA_SMOOTHING * instantaneous + (1.0 - EWA_SMOOTHING) * speed_bps;
            last_tick = now;
            last_downloaded = downloaded;
        }

        if throttle.should_emit() {
            if let Some(tx) = progress_tx {
                let eta_seconds = if speed_bps > 0.0 && total_bytes > downloaded {
                    Some((total_bytes - downloaded) as f64 / speed_bps)
                } else {
                    None
                };
                let _ = tx.send(DownloadProgress {
                    bytes_downloaded: downloaded,
                    total_bytes,
                    speed_bps,
                    eta_seconds,
                });
            }
        }
    }

    file.flush().await.map_err(|e| AcquireError::Io(IoFailure::from(e)))?;

    if let Some(tx) = progress_tx {
        let _ = tx.send(DownloadProgress {
            bytes_downloaded: downloaded,
            total_bytes: total_bytes.max(downloaded),
            speed_bps,
            eta_seconds: Some(0.0),
        });
    }

    Ok(())
}

async fn existing_part_size(part_path: &Path) -> AcquireResult<u64> {
    match tokio::fs::metadata(part_path).await {
        Ok(metadata) => Ok(metadata.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(AcquireError::Io(IoFailure::from(e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_path_appends_download_suffix() {
        let dest = Path::new("/data/asr/small/encoder.onnx");
        assert_eq!(
            part_path_for(dest),
            Path::new("/data/asr/small/encoder.onnx.download")
        );
    }

    #[test]
    fn download_progress_zero_has_no_eta() {
        let progress = DownloadProgress::zero(1000);
        assert_eq!(progress.bytes_downloaded, 0);
        assert_eq!(progress.eta_seconds, None);
    }

    #[tokio::test]
    async fn existing_part_size_is_zero_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("nope.download");
        assert_eq!(existing_part_size(&part).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn existing_part_size_reflects_file_length() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("partial.download");
        tokio::fs::write(&part, b"0123456789").await.unwrap();
        assert_eq!(existing_part_size(&part).await.unwrap(), 10);
    }

    #[test]
    fn plan_chunks_covers_the_whole_file_with_no_gaps_or_overlaps() {
        let chunks = plan_chunks(25 * 1024 * 1024, 4);
        assert_eq!(chunks.first().unwrap().start, 0);
        assert_eq!(chunks.last().unwrap().end, 25 * 1024 * 1024 - 1);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start);
        }
    }

    #[test]
    fn plan_chunks_clamps_chunk_size_to_the_configured_bounds() {
        // A huge file with high parallelism would otherwise produce chunks
        // far bigger than MAX_CHUNK_BYTES.
        let chunks = plan_chunks(1024 * 1024 * 1024, 2);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.len() <= MAX_CHUNK_BYTES);
            assert!(chunk.len() >= MIN_CHUNK_BYTES);
        }
    }

    #[test]
    fn plan_chunks_handles_a_file_smaller_than_one_chunk() {
        let chunks = plan_chunks(500, 8);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].end, 499);
    }

    #[test]
    fn plan_chunks_starts_every_chunk_with_zero_progress() {
        for chunk in plan_chunks(25 * 1024 * 1024, 4) {
            assert_eq!(chunk.downloaded, 0);
            assert_eq!(chunk.retry_count, 0);
            assert!(chunk.last_error.is_none());
            assert!(!chunk.completed);
        }
    }

    #[test]
    fn chunk_info_round_trips_partial_progress_through_json() {
        let chunk = ChunkInfo {
            index: 2,
            start: 100,
            end: 999,
            downloaded: 400,
            completed: false,
            retry_count: 3,
            last_error: Some("connection reset".into()),
        };
        let json = serde_json::to_string(&chunk).unwrap();
        let restored: ChunkInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, chunk);
        // A resumed attempt should pick up partway through the chunk, not
        // from its start.
        assert_eq!(restored.start + restored.downloaded, 500);
    }

    #[test]
    fn chunk_info_missing_progress_fields_default_to_fresh() {
        // Metadata sidecars written before progress tracking existed lack
        // these fields; they must decode as an unstarted chunk rather than
        // fail to parse.
        let json = r#"{"index":0,"start":0,"end":99,"completed":false}"#;
        let chunk: ChunkInfo = serde_json::from_str(json).unwrap();
        assert_eq!(chunk.downloaded, 0);
        assert_eq!(chunk.retry_count, 0);
        assert!(chunk.last_error.is_none());
    }
}
