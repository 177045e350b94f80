use crate::engine::NativeHandle;
use crate::error::ModuleError;

/// Audio produced by one `generate` call.
#[derive(Debug, Clone)]
pub struct TtsSamples {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// A text-to-speech engine.
///
/// `generate` is async (via [`async_trait`]) rather than a plain method:
/// some concrete engines perform synthesis through an async native
/// pipeline, and trait objects are the whole point here, so the method
/// needs to stay callable without knowing which.
#[async_trait::async_trait]
pub trait TtsEngine: NativeHandle {
    async fn generate(&self, text: &str, speed: f32, voice_id: &str) -> Result<TtsSamples, ModuleError>;
}
