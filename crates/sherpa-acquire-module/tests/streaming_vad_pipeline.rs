//! End-to-end streaming VAD scenario: feed silence, then a tone, then
//! silence, and check that speaking-state and segment events land where
//! they should.

use std::time::Duration;

use sherpa_acquire_download::TaskRunner;
use sherpa_acquire_module::engine::{NativeHandle, VadEngine};
use sherpa_acquire_module::pipeline::{PipelineConfig, PipelineEvent, VadStreamingPipeline};
use sherpa_acquire_module::ModuleError;

/// A synthetic VAD: a window counts as "loud" when its mean absolute
/// amplitude exceeds a threshold. Consecutive loud windows accumulate into
/// one pending segment, finalized into the ready queue on the first quiet
/// window that follows. This stands in for a real native detector while
/// exercising exactly the `front`/`pop`/`is_speech_detected` contract the
/// pipeline drives.
struct ToneVad {
    threshold: f32,
    speaking: bool,
    pending_segment: Vec<f32>,
    ready: Vec<Vec<f32>>,
}

impl ToneVad {
    fn new(threshold: f32) -> Self {
        Self {
            threshold,
            speaking: false,
            pending_segment: Vec::new(),
            ready: Vec::new(),
        }
    }
}

impl NativeHandle for ToneVad {
    fn close(&mut self) -> Result<(), ModuleError> {
        Ok(())
    }
}

impl VadEngine for ToneVad {
    fn accept_waveform(&mut self, samples: &[f32]) {
        let mean_abs = samples.iter().map(|s| s.abs()).sum::<f32>() / samples.len() as f32;
        let loud = mean_abs > self.threshold;
        if loud {
            self.speaking = true;
            self.pending_segment.extend_from_slice(samples);
        } else if self.speaking {
            self.speaking = false;
            self.ready.push(std::mem::take(&mut self.pending_segment));
        }
    }

    fn is_speech_detected(&self) -> bool {
        self.speaking
    }

    fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }

    fn front(&self) -> Option<Vec<f32>> {
        self.ready.first().cloned()
    }

    fn pop(&mut self) {
        if !self.ready.is_empty() {
            self.ready.remove(0);
        }
    }

    fn flush(&mut self) {
        if self.speaking && !self.pending_segment.is_empty() {
            self.ready.push(std::mem::take(&mut self.pending_segment));
        }
        self.speaking = false;
    }
}

fn silence(samples: usize) -> Vec<f32> {
    vec![0.0; samples]
}

fn tone(samples: usize) -> Vec<f32> {
    (0..samples)
        .map(|i| (i as f32 * 0.3).sin())
        .collect()
}

#[tokio::test]
async fn speaking_state_and_segment_bracket_the_tone() {
    let sample_rate = 16_000u32;
    let window_size = 512usize;

    let config = PipelineConfig {
        window_size,
        sample_rate,
        padding_seconds: 0.2,
        min_silence_duration_ms: 300,
    };

    let (pipeline, mut events) = VadStreamingPipeline::new(Box::new(ToneVad::new(0.05)), config);

    let mut runner = TaskRunner::new(2);
    pipeline.spawn_drain(&mut runner);

    let mut audio = Vec::new();
    audio.extend(silence(2 * sample_rate as usize));
    audio.extend(tone(sample_rate as usize));
    audio.extend(silence(sample_rate as usize));
    pipeline.push_samples(&audio);

    let mut saw_speaking_started = 0;
    let mut saw_speaking_finished = 0;
    let mut segments: Vec<Vec<f32>> = Vec::new();

    loop {
        match tokio::time::timeout(Duration::from_millis(200), events.recv()).await {
            Ok(Some(PipelineEvent::SpeakingStarted)) => saw_speaking_started += 1,
            Ok(Some(PipelineEvent::SpeakingFinished)) => {
                saw_speaking_finished += 1;
                break;
            }
            Ok(Some(PipelineEvent::Segment { samples })) => segments.push(samples),
            Ok(None) => break,
            Err(_) => break,
        }
    }

    runner.cancel_all();
    runner.join_all().await;

    assert_eq!(saw_speaking_started, 1, "speaking-started must fire exactly once");
    assert_eq!(saw_speaking_finished, 1, "speaking-finished must fire exactly once");
    assert_eq!(segments.len(), 1, "exactly one segment should bracket the single tone burst");

    let padding_len = (0.2 * sample_rate as f32).round() as usize;
    let padding_capacity = padding_len.max(16).next_power_of_two();
    let segment = &segments[0];
    assert!(
        segment.len() >= padding_capacity,
        "segment must carry at least a full padding ring's worth of lead-in"
    );
    // The ring keeps appending through the window that first crosses the
    // detection threshold (the window itself is ambiguous between "still
    // silence" and "now speech"), so only the portion of the prefix before
    // that final window is guaranteed pure silence.
    let leading_silence = padding_capacity - window_size;
    assert!(
        segment[..leading_silence].iter().all(|s| *s == 0.0),
        "bulk of the padding prefix must be pre-tone silence"
    );
    assert!(
        segment.iter().skip(leading_silence).any(|s| s.abs() > 0.05),
        "segment must include the tone's energy"
    );
}

#[tokio::test]
async fn flush_emits_a_trailing_partial_window() {
    let config = PipelineConfig {
        window_size: 512,
        sample_rate: 16_000,
        padding_seconds: 0.1,
        min_silence_duration_ms: 100,
    };

    let (pipeline, mut events) = VadStreamingPipeline::new(Box::new(ToneVad::new(0.05)), config);
    let mut runner = TaskRunner::new(2);
    pipeline.spawn_drain(&mut runner);

    // Fewer samples than one window: never dispatched by the periodic
    // drain, only reachable via an explicit flush.
    pipeline.push_samples(&tone(100));
    tokio::time::sleep(Duration::from_millis(30)).await;
    pipeline.flush().await;

    let mut saw_segment = false;
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(100), events.recv()).await {
        if matches!(event, PipelineEvent::Segment { .. }) {
            saw_segment = true;
            break;
        }
    }

    runner.cancel_all();
    runner.join_all().await;

    assert!(saw_segment, "flush must surface the trailing partial window as a segment");
}

#[tokio::test]
async fn dispose_stops_the_drain_task_without_panicking() {
    let config = PipelineConfig {
        window_size: 512,
        sample_rate: 16_000,
        padding_seconds: 0.1,
        min_silence_duration_ms: 100,
    };

    let (pipeline, _events) = VadStreamingPipeline::new(Box::new(ToneVad::new(0.05)), config);
    let mut runner = TaskRunner::new(2);
    pipeline.spawn_drain(&mut runner);

    pipeline.push_samples(&tone(16_000));
    pipeline.dispose();
    tokio::time::sleep(Duration::from_millis(30)).await;

    runner.join_all().await;
}
