use crate::engine::NativeHandle;
use crate::error::ModuleError;

/// One keyword-spotting decode outcome.
#[derive(Debug, Clone, Default)]
pub struct KwsDetection {
    /// The keyword label that fired, if the stream has one buffered.
    pub keyword: Option<String>,
}

/// A streaming keyword spotter, shaped the same way as
/// [`super::OnlineAsrEngine`]: the engine only constructs streams, and all
/// per-utterance decoding state lives on the stream.
pub trait KwsEngine: NativeHandle {
    fn create_stream(&self) -> Result<Box<dyn KwsStream>, ModuleError>;
}

pub trait KwsStream: Send {
    fn accept_waveform(&mut self, sample_rate: u32, samples: &[f32]);
    fn is_ready(&self) -> bool;
    fn decode(&mut self);
    fn get_result(&self) -> KwsDetection;
    fn is_endpoint(&self) -> bool;
    fn reset(&mut self);
}
