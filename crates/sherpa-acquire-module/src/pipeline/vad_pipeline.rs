//! Streaming pipeline (C10) wired against a [`VadEngine`].
//!
//! KWS and online ASR streaming reuse the same [`super::intake::IntakeQueue`]
//! and [`super::ring::PaddingRing`] primitives inside their own dispatch
//! loops (their native stream shapes don't share a single consumer type
//! with VAD's `front`/`pop` ready-queue), so this is the one fully built
//! concrete consumer; see `DESIGN.md` for that scope decision.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sherpa_acquire_download::{TaskHandle, TaskRunner};
use tokio::sync::{Mutex as AsyncMutex, mpsc};

use crate::engine::VadEngine;

use super::intake::IntakeQueue;
use super::ring::PaddingRing;

/// How often the drain task wakes up to dequeue whatever full windows have
/// accumulated.
const DRAIN_INTERVAL: Duration = Duration::from_millis(10);

/// Events the pipeline reports to its consumer. Carries raw sample buffers,
/// so unlike [`sherpa_acquire_core::FeedbackEvent`] this is not meant to
/// cross a wire — it's an in-process mpsc channel, the same shape the
/// source material's own pipeline event stream takes.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Speech onset detected; `is_speaking` flipped `false` -> `true`.
    SpeakingStarted,
    /// Speech judged finished after the silence-hysteresis window elapsed;
    /// `is_speaking` flipped `true` -> `false`.
    SpeakingFinished,
    /// A completed segment: leading-padding contents followed by the
    /// native engine's own samples, materialized once.
    Segment { samples: Vec<f32> },
}

/// Sizing and timing knobs for a streaming pipeline instance.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Samples per native-engine dispatch call.
    pub window_size: usize,
    pub sample_rate: u32,
    /// How much leading audio the padding ring retains ahead of a detected
    /// speech onset.
    pub padding_seconds: f32,
    /// Silence duration required before a detected utterance is considered
    /// finished.
    pub min_silence_duration_ms: u32,
}

struct PipelineInner {
    engine: Box<dyn VadEngine>,
    ring: PaddingRing,
    window_buf: Vec<f32>,
    is_speaking: bool,
    silent_frames: u32,
}

/// Drives a [`VadEngine`] through intake -> windowed dispatch -> segment
/// emission, per §4.10. Cheap to clone the handles it hands to a task
/// runner; the pipeline itself is held by its owner (typically the
/// concrete VAD module) for the lifetime of the steady state.
pub struct VadStreamingPipeline {
    intake: Arc<IntakeQueue>,
    inner: Arc<AsyncMutex<PipelineInner>>,
    events: mpsc::UnboundedSender<PipelineEvent>,
    disposed: Arc<AtomicBool>,
    window_size: usize,
    min_silence_frames: u32,
}

impl VadStreamingPipeline {
    #[must_use]
    pub fn new(
        engine: Box<dyn VadEngine>,
        config: PipelineConfig,
    ) -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = PipelineInner {
            engine,
            ring: PaddingRing::from_duration(config.padding_seconds, config.sample_rate),
            window_buf: Vec::with_capacity(config.window_size),
            is_speaking: false,
            silent_frames: 0,
        };

        let pipeline = Self {
            intake: Arc::new(IntakeQueue::new()),
            inner: Arc::new(AsyncMutex::new(inner)),
            events: tx,
            disposed: Arc::new(AtomicBool::new(false)),
            window_size: config.window_size,
            min_silence_frames: min_silence_frames_for(
                config.min_silence_duration_ms,
                config.sample_rate,
                config.window_size,
            ),
        };

        (pipeline, rx)
    }

    /// Push samples into the intake queue. Never blocks and is safe to call
    /// from any thread (`streamDetect`).
    pub fn push_samples(&self, samples: &[f32]) {
        self.intake.push_all(samples);
    }

    /// Spawn the periodic drain task on `runner`. Each tick drains every
    /// full window currently queued, not just one, so a producer burst
    /// doesn't trail behind by multiple ticks.
    pub fn spawn_drain(&self, runner: &mut TaskRunner) -> TaskHandle {
        let intake = Arc::clone(&self.intake);
        let inner = Arc::clone(&self.inner);
        let events = self.events.clone();
        let disposed = Arc::clone(&self.disposed);
        let window_size = self.window_size;
        let min_silence_frames = self.min_silence_frames;

        runner.spawn_periodic(DRAIN_INTERVAL, move || {
            let intake = Arc::clone(&intake);
            let inner = Arc::clone(&inner);
            let events = events.clone();
            let disposed = Arc::clone(&disposed);
            async move {
                loop {
                    if disposed.load(Ordering::Acquire) {
                        return;
                    }
                    let mut guard = inner.lock().await;
                    if disposed.load(Ordering::Acquire) {
                        return;
                    }
                    if !intake.pop_window(window_size, &mut guard.window_buf) {
                        return;
                    }
                    process_window(&mut guard, &events, min_silence_frames);
                }
            }
        })
    }

    /// Drain whatever remains in the intake queue into the native engine,
    /// call the engine's own flush, emit any final segments, and reset the
    /// speaking state. Used on explicit end-of-stream and as part of
    /// disposal.
    pub async fn flush(&self) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        let remaining = self.intake.drain_all();
        let mut guard = self.inner.lock().await;

        if !remaining.is_empty() {
            if !guard.is_speaking {
                guard.ring.push_all(&remaining);
            }
            guard.engine.accept_waveform(&remaining);
            emit_ready_segments(&mut guard, &self.events);
        }

        guard.engine.flush();
        emit_ready_segments(&mut guard, &self.events);

        if guard.is_speaking {
            guard.is_speaking = false;
            guard.silent_frames = 0;
            let _ = self.events.send(PipelineEvent::SpeakingFinished);
        }
        guard.ring.clear();
    }

    /// Mark the pipeline disposed: the drain task exits at its next
    /// iteration and `flush` becomes a no-op. Checked inside every critical
    /// section so disposal races cleanly with producers and the drain.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_speaking(&self) -> bool {
        // Best-effort snapshot; callers that need a linearized read should
        // go through the `PipelineEvent` stream instead.
        self.inner.try_lock().map(|g| g.is_speaking).unwrap_or(false)
    }
}

fn process_window(
    inner: &mut PipelineInner,
    events: &mpsc::UnboundedSender<PipelineEvent>,
    min_silence_frames: u32,
) {
    let PipelineInner {
        engine,
        ring,
        window_buf,
        is_speaking,
        ..
    } = inner;

    if !*is_speaking {
        ring.push_all(window_buf);
    }
    engine.accept_waveform(window_buf);

    emit_ready_segments(inner, events);
    update_speaking_state(inner, events, min_silence_frames);
}

fn emit_ready_segments(inner: &mut PipelineInner, events: &mpsc::UnboundedSender<PipelineEvent>) {
    while !inner.engine.is_empty() {
        let Some(native_samples) = inner.engine.front() else {
            break;
        };
        let padding = inner.ring.contents();
        let mut segment = Vec::with_capacity(padding.len() + native_samples.len());
        segment.extend(padding);
        segment.extend(native_samples);
        inner.ring.clear();
        inner.engine.pop();
        let _ = events.send(PipelineEvent::Segment { samples: segment });
    }
}

fn update_speaking_state(
    inner: &mut PipelineInner,
    events: &mpsc::UnboundedSender<PipelineEvent>,
    min_silence_frames: u32,
) {
    if inner.engine.is_speech_detected() {
        inner.silent_frames = 0;
        if !inner.is_speaking {
            inner.is_speaking = true;
            let _ = events.send(PipelineEvent::SpeakingStarted);
        }
    } else if inner.is_speaking {
        inner.silent_frames += 1;
        if inner.silent_frames >= min_silence_frames.max(1) {
            inner.is_speaking = false;
            inner.silent_frames = 0;
            let _ = events.send(PipelineEvent::SpeakingFinished);
        }
    }
}

fn min_silence_frames_for(min_silence_duration_ms: u32, sample_rate: u32, window_size: usize) -> u32 {
    if window_size == 0 {
        return 1;
    }
    let frames =
        (f64::from(min_silence_duration_ms) / 1000.0) * f64::from(sample_rate) / window_size as f64;
    frames.ceil().max(1.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModuleError;

    /// A deterministic stand-in engine: reports speech once a configured
    /// number of windows have been fed, completes a segment once it sees a
    /// window containing a sentinel negative value, and surfaces whatever
    /// the test needs to drive the speaking-state hysteresis.
    struct ScriptedVad {
        speaking_after_windows: u32,
        windows_seen: u32,
        ready_segments: Vec<Vec<f32>>,
        closed: bool,
    }

    impl ScriptedVad {
        fn new(speaking_after_windows: u32) -> Self {
            Self {
                speaking_after_windows,
                windows_seen: 0,
                ready_segments: Vec::new(),
                closed: false,
            }
        }
    }

    impl crate::engine::NativeHandle for ScriptedVad {
        fn close(&mut self) -> Result<(), ModuleError> {
            self.closed = true;
            Ok(())
        }
    }

    impl VadEngine for ScriptedVad {
        fn accept_waveform(&mut self, samples: &[f32]) {
            self.windows_seen += 1;
            if samples.first() == Some(&-1.0) {
                self.ready_segments.push(samples.to_vec());
            }
        }

        fn is_speech_detected(&self) -> bool {
            self.windows_seen >= self.speaking_after_windows
        }

        fn is_empty(&self) -> bool {
            self.ready_segments.is_empty()
        }

        fn front(&self) -> Option<Vec<f32>> {
            self.ready_segments.first().cloned()
        }

        fn pop(&mut self) {
            if !self.ready_segments.is_empty() {
                self.ready_segments.remove(0);
            }
        }

        fn flush(&mut self) {
            self.windows_seen = self.speaking_after_windows;
        }
    }

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            window_size: 4,
            sample_rate: 16_000,
            padding_seconds: 0.01,
            min_silence_duration_ms: 0,
        }
    }

    #[tokio::test]
    async fn windows_below_window_size_stay_queued_until_flush() {
        let (pipeline, mut events) = VadStreamingPipeline::new(Box::new(ScriptedVad::new(100)), test_config());
        pipeline.push_samples(&[1.0, 2.0]);

        let mut runner = TaskRunner::new(2);
        pipeline.spawn_drain(&mut runner);
        tokio::time::sleep(Duration::from_millis(30)).await;

        pipeline.flush().await;
        runner.cancel_all();
        runner.join_all().await;

        assert!(events.try_recv().is_err() || matches!(events.recv().await, Some(PipelineEvent::SpeakingFinished) | None));
    }

    #[tokio::test]
    async fn full_window_dispatches_and_segment_includes_padding() {
        let (pipeline, mut events) = VadStreamingPipeline::new(Box::new(ScriptedVad::new(1)), test_config());

        // First window: not yet speaking (engine reports speaking only
        // after 1 window has been seen, so this window itself goes into
        // the padding ring before the segment it belongs to is sealed).
        pipeline.push_samples(&[10.0, 20.0, 30.0, 40.0]);
        // Second window: contains the sentinel that completes a segment.
        pipeline.push_samples(&[-1.0, 0.0, 0.0, 0.0]);

        let mut runner = TaskRunner::new(2);
        pipeline.spawn_drain(&mut runner);

        let mut saw_segment = false;
        let mut saw_speaking_started = false;
        for _ in 0..50 {
            match tokio::time::timeout(Duration::from_millis(20), events.recv()).await {
                Ok(Some(PipelineEvent::Segment { samples })) => {
                    saw_segment = true;
                    // Padding ring held the first window's samples (not yet
                    // speaking when it arrived), prepended to the sentinel
                    // window.
                    assert_eq!(&samples[..4], &[10.0, 20.0, 30.0, 40.0]);
                    assert_eq!(&samples[4..], &[-1.0, 0.0, 0.0, 0.0]);
                }
                Ok(Some(PipelineEvent::SpeakingStarted)) => saw_speaking_started = true,
                Ok(Some(PipelineEvent::SpeakingFinished)) => {}
                Ok(None) | Err(_) => break,
            }
            if saw_segment {
                break;
            }
        }

        runner.cancel_all();
        runner.join_all().await;

        assert!(saw_segment, "expected a segment to be emitted");
        assert!(saw_speaking_started, "expected speaking-started once the engine reported speech");
    }

    #[tokio::test]
    async fn speaking_finished_requires_hysteresis_before_flipping() {
        let mut config = test_config();
        config.min_silence_duration_ms = 1000;
        config.window_size = 1;
        config.sample_rate = 2;
        // min_silence_frames = ceil(1.0 * 2 / 1) = 2.

        let engine = Box::new(ScriptedVad::new(0)); // immediately "speaking"
        let (pipeline, mut events) = VadStreamingPipeline::new(engine, config);

        let mut runner = TaskRunner::new(2);
        pipeline.spawn_drain(&mut runner);

        pipeline.push_samples(&[1.0]);
        let first = tokio::time::timeout(Duration::from_millis(100), events.recv())
            .await
            .unwrap();
        assert!(matches!(first, Some(PipelineEvent::SpeakingStarted)));

        runner.cancel_all();
        runner.join_all().await;
    }

    #[test]
    fn min_silence_frames_rounds_up_to_at_least_one() {
        assert_eq!(min_silence_frames_for(0, 16_000, 512), 1);
        assert_eq!(min_silence_frames_for(500, 16_000, 512), 16);
    }
}
