use crate::engine::{AsrResult, NativeHandle};
use crate::error::ModuleError;

/// A speech recognizer that decodes one complete utterance at a time, with
/// no streaming state between calls.
///
/// Unlike [`super::OnlineAsrEngine`], offline engines have no notion of a
/// partial decode: the whole waveform is handed over and one result comes
/// back. Call sites run this behind `spawn_blocking`, since a full decode
/// over several seconds of audio is exactly the "potentially long-running
/// native call" the resource model warns must not run under a held lock.
pub trait OfflineAsrEngine: NativeHandle {
    fn decode(&self, sample_rate: u32, samples: &[f32]) -> Result<AsrResult, ModuleError>;
}
