use crate::engine::{AsrResult, NativeHandle};
use crate::error::ModuleError;

/// A streaming speech recognizer.
///
/// `OnlineAsrEngine` itself only constructs per-utterance streams; all
/// per-utterance state (decoder context, partial hypothesis) lives on the
/// [`OnlineAsrStream`] it returns. Associated types would break `dyn
/// OnlineAsrEngine` usability (the whole point of this trait), so the
/// stream is an owned, boxed trait object instead.
pub trait OnlineAsrEngine: NativeHandle {
    fn create_stream(&self) -> Result<Box<dyn OnlineAsrStream>, ModuleError>;
}

/// Per-utterance streaming state for an [`OnlineAsrEngine`].
///
/// Every method here is a native call and must be invoked under the
/// module's serializing lock — see the streaming pipeline's dispatch loop.
pub trait OnlineAsrStream: Send {
    /// Feed one window of samples at `sample_rate` into the stream.
    fn accept_waveform(&mut self, sample_rate: u32, samples: &[f32]);

    /// Whether enough buffered audio is present for another `decode` call.
    fn is_ready(&self) -> bool;

    /// Advance the decoder by one step. Call only when [`Self::is_ready`].
    fn decode(&mut self);

    /// The current best hypothesis for the in-progress utterance.
    fn get_result(&self) -> AsrResult;

    /// Whether the decoder considers the current utterance complete (a
    /// trailing-silence or a hard endpoint rule fired).
    fn is_endpoint(&self) -> bool;

    /// Reset decoder state for the next utterance, keeping the stream
    /// object (and any warmed-up native buffers) alive for reuse.
    fn reset(&mut self);
}
