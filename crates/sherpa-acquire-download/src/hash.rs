//! C2 Hash & File Verifier.
//!
//! Computes SHA-256 digests off the async runtime (hashing a multi-hundred
//! megabyte model file would otherwise stall every other task sharing the
//! worker thread) and compares against a model's registered expectations.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

use crate::error::{AcquireError, AcquireResult, IoFailure};

/// Progress update emitted every [`HASH_PROGRESS_CHUNK_BYTES`] processed,
/// mirroring the cadence the resumable downloader uses for its own
/// progress so a UI can show both with the same throttle.
pub const HASH_PROGRESS_CHUNK_BYTES: u64 = 64 * 1024 * 1024;

const READ_BUF_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashProgress {
    pub bytes_processed: u64,
    pub total_bytes: u64,
}

/// Outcome of checking a single file against its expected size/hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileHealth {
    Healthy,
    SizeMismatch { expected: u64, actual: u64 },
    ChecksumMismatch { expected: String, actual: String },
    Missing,
}

/// Compute the SHA-256 of a file, reporting progress on `progress_tx` every
/// [`HASH_PROGRESS_CHUNK_BYTES`] bytes. Runs the actual hashing synchronously
/// inside `spawn_blocking` so callers can run many verifications
/// concurrently without starving the async runtime.
pub async fn sha256_file(
    path: PathBuf,
    progress_tx: Option<mpsc::Sender<HashProgress>>,
) -> AcquireResult<String> {
    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|e| AcquireError::Io(IoFailure::from(e)))?;
    let total_bytes = metadata.len();

    tokio::task::spawn_blocking(move || hash_file_blocking(&path, total_bytes, progress_tx))
        .await
        .map_err(|e| AcquireError::other(format!("hash task panicked: {e}")))?
}

fn hash_file_blocking(
    path: &Path,
    total_bytes: u64,
    progress_tx: Option<mpsc::Sender<HashProgress>>,
) -> AcquireResult<String> {
    use std::io::Read;

    let mut file = std::fs::File::open(path).map_err(|e| AcquireError::Io(IoFailure::from(e)))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUF_BYTES];
    let mut processed: u64 = 0;
    let mut since_last_report: u64 = 0;

    loop {
        let read = file
            .read(&mut buf)
            .map_err(|e| AcquireError::Io(IoFailure::from(e)))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
        processed += read as u64;
        since_last_report += read as u64;

        if since_last_report >= HASH_PROGRESS_CHUNK_BYTES {
            since_last_report = 0;
            if let Some(tx) = &progress_tx {
                let _ = tx.blocking_send(HashProgress {
                    bytes_processed: processed,
                    total_bytes,
                });
            }
        }
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify a file exists, matches its expected size, and (if a digest was
/// registered) matches its expected SHA-256.
///
/// Re-hashing a multi-gigabyte model on every health check would make
/// frequent verification too expensive to actually run, so this consults
/// the file's hash cache sidecar first (see [`cached_digest`]) and only
/// falls back to a full read when the sidecar is missing or stale.
pub async fn verify_file(
    path: &Path,
    expected_size: u64,
    expected_sha256: Option<&str>,
) -> AcquireResult<FileHealth> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FileHealth::Missing),
        Err(e) => return Err(AcquireError::Io(IoFailure::from(e))),
    };

    if metadata.len() != expected_size {
        return Ok(FileHealth::SizeMismatch {
            expected: expected_size,
            actual: metadata.len(),
        });
    }

    let Some(expected) = expected_sha256 else {
        return Ok(FileHealth::Healthy);
    };

    let actual = match cached_digest(path, &metadata).await {
        Some(digest) => digest,
        None => {
            let digest = sha256_file(path.to_path_buf(), None).await?;
            write_cache_sidecar(path, &metadata, &digest).await;
            digest
        }
    };

    if actual.eq_ignore_ascii_case(expected) {
        Ok(FileHealth::Healthy)
    } else {
        Ok(FileHealth::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}

/// Path of `path`'s hash cache sidecar: `<path>.sha256`, living alongside
/// the file it describes.
fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".sha256");
    PathBuf::from(name)
}

/// Read `path`'s hash cache sidecar and return its recorded digest, but only
/// if the sidecar's recorded mtime still matches `metadata`'s — otherwise
/// the file changed underneath the cache and it must not be trusted.
///
/// Sidecar format is two newline-separated lines: the mtime as Unix seconds,
/// then the lowercase hex digest. Any parse failure is treated as a cache
/// miss rather than an error, since the sidecar is purely an optimization.
async fn cached_digest(path: &Path, metadata: &std::fs::Metadata) -> Option<String> {
    let sidecar = sidecar_path(path);
    let contents = tokio::fs::read_to_string(&sidecar).await.ok()?;
    let mut lines = contents.lines();
    let cached_mtime: u64 = lines.next()?.trim().parse().ok()?;
    let digest = lines.next()?.trim();

    let current_mtime = mtime_unix_secs(metadata)?;
    if cached_mtime == current_mtime && digest.len() == 64 {
        Some(digest.to_string())
    } else {
        None
    }
}

/// Write (or overwrite) `path`'s hash cache sidecar with the digest just
/// computed. Best-effort: a failure to write the sidecar doesn't affect the
/// verification result, it just means the next check re-hashes.
async fn write_cache_sidecar(path: &Path, metadata: &std::fs::Metadata, digest: &str) {
    let Some(mtime) = mtime_unix_secs(metadata) else {
        return;
    };
    let sidecar = sidecar_path(path);
    let contents = format!("{mtime}\n{digest}\n");
    if let Err(e) = tokio::fs::write(&sidecar, contents).await {
        tracing::debug!(path = %sidecar.display(), error = %e, "failed to write hash cache sidecar");
    }
}

fn mtime_unix_secs(metadata: &std::fs::Metadata) -> Option<u64> {
    metadata
        .modified()
        .ok()?
        .duration_since(std::time::UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}

/// Streaming SHA-256 for use while a file is still being written to (the
/// resumable downloader hashes on the fly rather than re-reading the whole
/// file after the last chunk lands).
#[derive(Default)]
pub struct IncrementalHasher {
    hasher: Sha256,
}

impl IncrementalHasher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    #[must_use]
    pub fn finalize(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

/// Async convenience wrapper over [`IncrementalHasher`] for callers that
/// already have a `tokio::fs::File` open and want to hash while reading
/// (used by resume validation to confirm the on-disk prefix of a partial
/// download still matches before appending further bytes).
pub async fn hash_prefix(
    file: &mut tokio::fs::File,
    byte_count: u64,
) -> AcquireResult<String> {
    let mut hasher = IncrementalHasher::new();
    let mut remaining = byte_count;
    let mut buf = vec![0u8; READ_BUF_BYTES];

    while remaining > 0 {
        let to_read = remaining.min(buf.len() as u64) as usize;
        let read = file
            .read(&mut buf[..to_read])
            .await
            .map_err(|e| AcquireError::Io(IoFailure::from(e)))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
        remaining -= read as u64;
    }

    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sha256_file_matches_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        let digest = sha256_file(path, None).await.unwrap();
        assert_eq!(
            digest,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn verify_file_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.bin");
        let result = verify_file(&path, 10, None).await.unwrap();
        assert_eq!(result, FileHealth::Missing);
    }

    #[tokio::test]
    async fn verify_file_reports_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.bin");
        tokio::fs::write(&path, b"12345").await.unwrap();

        let result = verify_file(&path, 100, None).await.unwrap();
        assert_eq!(
            result,
            FileHealth::SizeMismatch {
                expected: 100,
                actual: 5
            }
        );
    }

    #[tokio::test]
    async fn verify_file_detects_checksum_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        let result = verify_file(&path, 11, Some("0000000000000000000000000000000000000000000000000000000000000000"))
            .await
            .unwrap();
        assert!(matches!(result, FileHealth::ChecksumMismatch { .. }));
    }

    #[tokio::test]
    async fn verify_file_healthy_when_size_and_hash_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        let result = verify_file(
            &path,
            11,
            Some("b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"),
        )
        .await
        .unwrap();
        assert_eq!(result, FileHealth::Healthy);
    }

    #[tokio::test]
    async fn verify_file_writes_cache_sidecar_after_full_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        verify_file(
            &path,
            11,
            Some("b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"),
        )
        .await
        .unwrap();

        let sidecar = sidecar_path(&path);
        assert!(tokio::fs::try_exists(&sidecar).await.unwrap());
    }

    #[tokio::test]
    async fn verify_file_uses_cached_digest_even_if_file_contents_change_without_mtime_bump() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        let mtime = mtime_unix_secs(&metadata).unwrap();
        tokio::fs::write(
            sidecar_path(&path),
            format!("{mtime}\nb94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9\n"),
        )
        .await
        .unwrap();

        // Different expected digest than the file's real contents: if the
        // cache is consulted, verification reports the cached (mismatched)
        // digest rather than re-reading the file.
        let result = verify_file(
            &path,
            11,
            Some("0000000000000000000000000000000000000000000000000000000000000000"),
        )
        .await
        .unwrap();
        assert!(matches!(result, FileHealth::ChecksumMismatch { actual, .. }
            if actual == "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"));
    }

    #[tokio::test]
    async fn cached_digest_is_none_when_sidecar_mtime_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        tokio::fs::write(&path, b"hello world").await.unwrap();
        tokio::fs::write(sidecar_path(&path), "1\nabc\n").await.unwrap();

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        assert!(cached_digest(&path, &metadata).await.is_none());
    }
}
