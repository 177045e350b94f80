//! C10 Streaming Pipeline: audio intake, windowed native-engine dispatch,
//! leading-padding, and segment emission for the streaming-capable module
//! kinds (VAD, KWS, online ASR).

mod intake;
mod ring;
mod vad_pipeline;

pub use intake::IntakeQueue;
pub use ring::PaddingRing;
pub use vad_pipeline::{PipelineConfig, PipelineEvent, VadStreamingPipeline};
