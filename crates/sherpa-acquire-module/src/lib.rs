//! Module lifecycle (C9) and streaming pipeline (C10) over a pluggable
//! native speech engine.
//!
//! This crate never links a concrete speech engine itself; [`engine`]
//! defines the capability traits a native adapter crate implements, and
//! [`lifecycle`]/[`pipeline`] are written entirely against those traits.

#![deny(unused_crate_dependencies)]

#[cfg(test)]
use reqwest as _;
#[cfg(test)]
use tempfile as _;
#[cfg(test)]
use tokio_test as _;

pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod pipeline;

pub use error::{ModuleError, ModuleResult};
pub use lifecycle::{ModuleLifecycle, ModuleState, SpeechModule};
pub use pipeline::{IntakeQueue, PaddingRing, PipelineConfig, PipelineEvent, VadStreamingPipeline};
