//! Native engine capability set.
//!
//! The acquisition and lifecycle logic in this crate never binds to a
//! concrete speech engine (that would pull a native library into a crate
//! whose whole point is to be engine-agnostic). Instead it depends on these
//! traits, and a separate crate supplies a concrete adapter — e.g. one
//! backed by `sherpa-rs` — that implements them.
//!
//! Each trait is `Send + Sync` and object-safe so a module can hold
//! `Box<dyn Trait>` without this crate knowing the concrete type. Online
//! engines (ASR, KWS) need per-utterance state that doesn't fit an
//! object-safe method signature as an associated type, so their streaming
//! half is factored into a second, equally object-safe trait returned from
//! `create_stream`.
//!
//! `dispose`-the-verb from the source material is just `Drop` on the
//! concrete handle in idiomatic Rust, with one exception: native FFI
//! teardown can itself fail, and that failure needs to be observable rather
//! than swallowed in a destructor. So every trait below also exposes an
//! explicit `close`, matching how a caller would shut things down before
//! letting the handle's `Drop` run as a safety net.

mod asr_offline;
mod asr_online;
mod denoiser;
mod kws;
mod tts;
mod vad;

pub use asr_offline::OfflineAsrEngine;
pub use asr_online::{OnlineAsrEngine, OnlineAsrStream};
pub use denoiser::DenoiserEngine;
pub use kws::{KwsDetection, KwsEngine, KwsStream};
pub use tts::{TtsEngine, TtsSamples};
pub use vad::VadEngine;

use crate::error::ModuleError;

/// Shared construction inputs every engine needs: where its model files
/// live and what sample rate the host will feed it at. Concrete engines
/// accept this plus their own engine-specific config (thread count, decoding
/// method, …) through their own constructor — only the two fields every
/// engine needs regardless of kind live here.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root directory of the model's files, as resolved by the acquisition
    /// core (`PathResolver::model_root`).
    pub model_dir: std::path::PathBuf,
    /// Sample rate the host will present audio at.
    pub sample_rate: u32,
}

/// Result of one ASR decode pass: recognized text plus whether the engine
/// considers the utterance finished.
#[derive(Debug, Clone, Default)]
pub struct AsrResult {
    pub text: String,
    pub is_endpoint: bool,
}

/// A trait method every engine trait repeats: explicit, fallible teardown
/// of native resources. Implementors should make a second call a no-op
/// rather than erroring, since disposal call sites (see
/// [`crate::lifecycle`]) are written to tolerate being invoked more than
/// once in races with a finalizer.
pub trait NativeHandle: Send + Sync {
    fn close(&mut self) -> Result<(), ModuleError>;
}
