//! C3 Archive Extractor.
//!
//! Model bundles ship as `.tar.bz2`, `.tar.gz`, or `.zip` archives. Every
//! format is extracted the same defensive way: each entry's path is
//! validated against its destination directory *before* any bytes are
//! written, so a malicious or corrupted archive cannot write outside the
//! model's directory tree (Zip Slip and its tar equivalent).
//!
//! Extraction runs inside `spawn_blocking` since the underlying `tar`/`zip`
//! crates are synchronous.

use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use sherpa_acquire_core::ArchiveFormat;
use tokio::sync::mpsc;

use crate::error::{AcquireError, AcquireResult, IoFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractProgress {
    pub entries_done: u64,
    pub entries_total: u64,
}

/// Extract `archive_path` (format `format`) into `dest_dir`, creating it if
/// necessary. Reports coarse per-entry progress rather than per-byte, since
/// archive members vary from a few bytes (tokens.txt) to hundreds of
/// megabytes (an ONNX encoder) and a byte-accurate estimate would need a
/// second pass over the archive just to sum member sizes.
pub async fn extract(
    archive_path: PathBuf,
    dest_dir: PathBuf,
    format: ArchiveFormat,
    progress_tx: Option<mpsc::Sender<ExtractProgress>>,
) -> AcquireResult<()> {
    tokio::task::spawn_blocking(move || extract_blocking(&archive_path, &dest_dir, format, progress_tx))
        .await
        .map_err(|e| AcquireError::other(format!("extraction task panicked: {e}")))?
}

fn extract_blocking(
    archive_path: &Path,
    dest_dir: &Path,
    format: ArchiveFormat,
    progress_tx: Option<mpsc::Sender<ExtractProgress>>,
) -> AcquireResult<()> {
    fs::create_dir_all(dest_dir).map_err(|e| AcquireError::Io(IoFailure::from(e)))?;

    match format {
        ArchiveFormat::TarBz2 => {
            let file = fs::File::open(archive_path).map_err(|e| AcquireError::Io(IoFailure::from(e)))?;
            let decompressed = bzip2::read::BzDecoder::new(file);
            extract_tar(decompressed, dest_dir, progress_tx)
        }
        ArchiveFormat::TarGz => {
            let file = fs::File::open(archive_path).map_err(|e| AcquireError::Io(IoFailure::from(e)))?;
            let decompressed = flate2::read::GzDecoder::new(file);
            extract_tar(decompressed, dest_dir, progress_tx)
        }
        ArchiveFormat::Tar => {
            let file = fs::File::open(archive_path).map_err(|e| AcquireError::Io(IoFailure::from(e)))?;
            extract_tar(file, dest_dir, progress_tx)
        }
        ArchiveFormat::Zip => extract_zip(archive_path, dest_dir, progress_tx),
        ArchiveFormat::Gz => {
            let file = fs::File::open(archive_path).map_err(|e| AcquireError::Io(IoFailure::from(e)))?;
            let mut decoder = flate2::read::GzDecoder::new(file);
            extract_single_stream(&mut decoder, archive_path, dest_dir, "gz", &progress_tx)
        }
        ArchiveFormat::Bz2 => {
            let file = fs::File::open(archive_path).map_err(|e| AcquireError::Io(IoFailure::from(e)))?;
            let mut decoder = bzip2::read::BzDecoder::new(file);
            extract_single_stream(&mut decoder, archive_path, dest_dir, "bz2", &progress_tx)
        }
        ArchiveFormat::None => Err(AcquireError::Extract(
            "cannot extract a model with no archive format".into(),
        )),
    }
}

/// Extract a single-stream compressed file (`.gz`/`.bz2`, not a tar
/// container): the output filename is the source filename with its final
/// compressed extension stripped, written inside `dest_dir`.
fn extract_single_stream<R: Read>(
    reader: &mut R,
    archive_path: &Path,
    dest_dir: &Path,
    extension: &str,
    progress_tx: &Option<mpsc::Sender<ExtractProgress>>,
) -> AcquireResult<()> {
    let source_name = archive_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AcquireError::Extract("archive path has no file name".into()))?;
    let output_name = source_name
        .strip_suffix(&format!(".{extension}"))
        .unwrap_or(source_name);

    let out_path = dest_dir.join(output_name);
    let mut out = fs::File::create(&out_path).map_err(|e| AcquireError::Io(IoFailure::from(e)))?;
    std::io::copy(reader, &mut out).map_err(|e| AcquireError::Io(IoFailure::from(e)))?;

    report(progress_tx, 1, 1);
    Ok(())
}

fn extract_tar<R: Read>(
    reader: R,
    dest_dir: &Path,
    progress_tx: Option<mpsc::Sender<ExtractProgress>>,
) -> AcquireResult<()> {
    let mut archive = tar::Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|e| AcquireError::Extract(e.to_string()))?;

    let mut done: u64 = 0;
    for entry in entries {
        let mut entry = entry.map_err(|e| AcquireError::Extract(e.to_string()))?;
        let raw_path = entry
            .path()
            .map_err(|e| AcquireError::Extract(e.to_string()))?
            .to_path_buf();

        let Some(safe_path) = safe_join(dest_dir, &raw_path) else {
            return Err(AcquireError::UnsafeArchiveEntry {
                path: raw_path.display().to_string(),
            });
        };

        if let Some(parent) = safe_path.parent() {
            fs::create_dir_all(parent).map_err(|e| AcquireError::Io(IoFailure::from(e)))?;
        }
        entry
            .unpack(&safe_path)
            .map_err(|e| AcquireError::Extract(e.to_string()))?;

        done += 1;
        report(&progress_tx, done, 0);
    }

    Ok(())
}

fn extract_zip(
    archive_path: &Path,
    dest_dir: &Path,
    progress_tx: Option<mpsc::Sender<ExtractProgress>>,
) -> AcquireResult<()> {
    let file = fs::File::open(archive_path).map_err(|e| AcquireError::Io(IoFailure::from(e)))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| AcquireError::Extract(e.to_string()))?;

    let total = zip.len() as u64;
    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| AcquireError::Extract(e.to_string()))?;
        let Some(raw_path) = entry.enclosed_name().map(Path::to_path_buf) else {
            return Err(AcquireError::UnsafeArchiveEntry {
                path: entry.name().to_string(),
            });
        };

        let Some(safe_path) = safe_join(dest_dir, &raw_path) else {
            return Err(AcquireError::UnsafeArchiveEntry {
                path: raw_path.display().to_string(),
            });
        };

        if entry.is_dir() {
            fs::create_dir_all(&safe_path).map_err(|e| AcquireError::Io(IoFailure::from(e)))?;
        } else {
            if let Some(parent) = safe_path.parent() {
                fs::create_dir_all(parent).map_err(|e| AcquireError::Io(IoFailure::from(e)))?;
            }
            let mut out =
                fs::File::create(&safe_path).map_err(|e| AcquireError::Io(IoFailure::from(e)))?;
            std::io::copy(&mut entry, &mut out).map_err(|e| AcquireError::Io(IoFailure::from(e)))?;
        }

        report(&progress_tx, (i + 1) as u64, total);
    }

    Ok(())
}

/// Join `dest_dir` with an archive-supplied relative path, rejecting
/// anything that would climb out of `dest_dir` (`..`, an absolute path, or
/// a root/prefix component).
fn safe_join(dest_dir: &Path, relative: &Path) -> Option<PathBuf> {
    if relative.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    }) {
        return None;
    }
    Some(dest_dir.join(relative))
}

fn report(progress_tx: &Option<mpsc::Sender<ExtractProgress>>, entries_done: u64, entries_total: u64) {
    if let Some(tx) = progress_tx {
        let _ = tx.try_send(ExtractProgress {
            entries_done,
            entries_total,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_join_rejects_parent_dir_traversal() {
        let dest = Path::new("/data/asr/small");
        assert!(safe_join(dest, Path::new("../../etc/passwd")).is_none());
    }

    #[test]
    fn safe_join_rejects_absolute_paths() {
        let dest = Path::new("/data/asr/small");
        assert!(safe_join(dest, Path::new("/etc/passwd")).is_none());
    }

    #[test]
    fn safe_join_accepts_nested_relative_paths() {
        let dest = Path::new("/data/asr/small");
        let joined = safe_join(dest, Path::new("sub/dir/file.onnx")).unwrap();
        assert_eq!(joined, Path::new("/data/asr/small/sub/dir/file.onnx"));
    }

    #[tokio::test]
    async fn extract_rejects_no_archive_format() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("whatever.bin");
        tokio::fs::write(&archive_path, b"").await.unwrap();

        let err = extract(
            archive_path,
            dir.path().join("out"),
            ArchiveFormat::None,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AcquireError::Extract(_)));
    }

    #[tokio::test]
    async fn extract_tar_gz_round_trip_writes_expected_file() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("bundle.tar.gz");

        // Build a tiny tar.gz containing one file with known contents.
        let tar_gz = fs::File::create(&archive_path).unwrap();
        let encoder = flate2::write::GzEncoder::new(tar_gz, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let mut header = tar::Header::new_gnu();
        let contents = b"hello model";
        header.set_size(contents.len() as u64);
        header.set_cksum();
        builder
            .append_data(&mut header, "tokens.txt", &contents[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let dest_dir = dir.path().join("out");
        extract(archive_path, dest_dir.clone(), ArchiveFormat::TarGz, None)
            .await
            .unwrap();

        let extracted = fs::read(dest_dir.join("tokens.txt")).unwrap();
        assert_eq!(extracted, contents);
    }
}
