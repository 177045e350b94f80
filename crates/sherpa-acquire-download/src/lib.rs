//! Filesystem and network side of model acquisition.
//!
//! Everything here does real I/O: hashing files, extracting archives,
//! downloading over HTTP, and orchestrating those three into a single
//! acquire-a-model operation. The pure data model and path layout live in
//! `sherpa-acquire-core`, which this crate depends on but never the other
//! way around.

pub mod archive;
pub mod error;
pub mod hash;
pub mod health;
pub mod http_client;
pub mod orchestrator;
pub mod progress;
pub mod task_runner;

mod downloader;

pub use archive::{extract, ExtractProgress};
pub use downloader::{download_file, part_path_for, DownloadOptions, DownloadProgress};
pub use error::{AcquireError, AcquireResult, IoFailure};
pub use hash::{sha256_file, verify_file, FileHealth, HashProgress, IncrementalHasher};
pub use health::{
    repair_model, verify_model, FileVerificationResult, ModelOperationLock, OperationGuard,
    VerificationReport,
};
pub use http_client::{apply_github_proxy, build_client};
pub use orchestrator::{prepare_model, verify_entry, AcquisitionOptions};
pub use progress::ProgressThrottle;
pub use task_runner::{run_cancellable, TaskHandle, TaskRunner};

#[cfg(test)]
use mockall as _;
#[cfg(test)]
use tokio_test as _;
