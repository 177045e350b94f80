//! Core domain types.
//!
//! Pure data types that describe the acquisition domain, independent of any
//! I/O, filesystem layout, or wire transport. Nothing in this module touches
//! a file, a socket, or the clock.

pub mod feedback;
pub mod model;
pub mod module_kind;

pub use feedback::FeedbackEvent;
pub use model::{ArchiveFormat, FileSpec, Manifest, ManifestEntry, ModelId};
pub use module_kind::ModuleKind;
