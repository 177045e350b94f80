//! Domain types, path resolution, the model registry, the feedback bus, and
//! the environment store for the model acquisition core — the parts of the
//! system that need no filesystem or network I/O of their own.
//!
//! Acquisition and streaming logic that does touch the filesystem or the
//! network lives in `sherpa-acquire-download` and `sherpa-acquire-module`,
//! both of which depend on this crate for their shared vocabulary.
#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod environment;
pub mod feedback;
pub mod paths;
pub mod registry;

pub use domain::{ArchiveFormat, FeedbackEvent, FileSpec, Manifest, ManifestEntry, ModelId, ModuleKind};
pub use environment::EnvironmentStore;
pub use feedback::{DeliveryContext, FeedbackSink, NullSink};
pub use paths::{DirectoryCreationStrategy, PathError, PathResolver, data_root, ensure_directory};
pub use registry::{ModelRegistry, ModelRegistryPort, RegistryError};

#[cfg(test)]
use mockall as _;
#[cfg(test)]
use tempfile as _;
#[cfg(test)]
use tokio_test as _;
