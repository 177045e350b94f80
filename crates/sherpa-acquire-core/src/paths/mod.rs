//! Path resolution for the acquisition core (C1 Path Resolver).
//!
//! This module provides the canonical on-disk layout for every module and
//! model:
//! - `data_root` resolution (explicit env var, or platform default)
//! - `PathResolver` for deriving module/model/file paths from a root
//! - Directory creation and writability checks
//!
//! # Design
//!
//! - Returns `PathBuf` and `PathError` for clear error handling
//! - No interactive/terminal I/O - adapters handle user prompts separately
//! - OS-specific logic is kept private in `platform`

mod ensure;
mod error;
mod platform;
mod resolver;

#[cfg(test)]
mod test_utils;

pub use ensure::{DirectoryCreationStrategy, ensure_directory, verify_writable};
pub use error::PathError;
pub use platform::{DATA_ROOT_ENV, data_root};
pub use resolver::PathResolver;
