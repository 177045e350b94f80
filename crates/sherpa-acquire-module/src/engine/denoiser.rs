use crate::engine::NativeHandle;
use crate::error::ModuleError;

/// A speech-enhancement engine that denoises a buffer of samples in one
/// call. No streaming state: each call is independent, matching the source
/// material's `run(denoiser, samples, sampleRate) -> samples`.
pub trait DenoiserEngine: NativeHandle {
    fn run(&self, sample_rate: u32, samples: &[f32]) -> Result<Vec<f32>, ModuleError>;
}
