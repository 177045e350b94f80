use crate::engine::NativeHandle;

/// A voice activity detector with an internal queue of completed speech
/// segments, matching the native engine's own `front`/`pop` shape rather
/// than returning segments from `accept_waveform` directly — multiple
/// segments can complete from a single call when a window spans more than
/// one utterance boundary.
pub trait VadEngine: NativeHandle {
    /// Feed one window of samples. May complete zero or more segments,
    /// retrievable afterward via [`Self::front`]/[`Self::pop`].
    fn accept_waveform(&mut self, samples: &[f32]);

    /// Whether the detector currently considers itself mid-speech.
    fn is_speech_detected(&self) -> bool;

    /// Whether the completed-segment queue is empty.
    fn is_empty(&self) -> bool;

    /// The oldest completed segment's samples, without removing it.
    fn front(&self) -> Option<Vec<f32>>;

    /// Remove the oldest completed segment.
    fn pop(&mut self);

    /// Force any buffered-but-undetected audio through as a final segment
    /// (end of stream).
    fn flush(&mut self);
}
