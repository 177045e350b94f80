//! C9 Module Lifecycle: the template every speech module follows from
//! construction through acquisition, native-engine initialization, the
//! steady state, and deterministic teardown.
//!
//! The source material expresses this as inheritance (`SherpaOnnxModuleBase`
//! and per-kind subclasses). Rust has no such base class, so the design is
//! inverted: [`SpeechModule`] is a small capability interface a concrete
//! module implements (`initialize` to build its native engine, `on_destroy`
//! to release it), and [`ModuleLifecycle`] is a standalone value that *owns*
//! acquisition, the task runner, and the disposal flag, driving the
//! capability through its states rather than being inherited from. This
//! matches §9's design note: "capability interface + shared lifecycle
//! object (value, not base class)".

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sherpa_acquire_core::domain::model::ManifestEntry;
use sherpa_acquire_core::feedback::DeliveryContext;
use sherpa_acquire_core::paths::PathResolver;
use sherpa_acquire_core::registry::ModelRegistryPort;
use sherpa_acquire_core::{FeedbackEvent, ModelId};
use sherpa_acquire_download::{AcquisitionOptions, TaskRunner, prepare_model};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::engine::EngineConfig;
use crate::error::{ModuleError, ModuleResult};

/// How long `dispose` waits for in-flight streaming/drain tasks to notice
/// cancellation and finish before giving up on a clean drain (§4.8's
/// "drains active tasks up to ~2 s").
const DISPOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Default width of a module's own task runner. Modules only ever run a
/// handful of concurrent background tasks (one periodic drain loop, the
/// occasional one-shot decode), so this is intentionally small; callers
/// with unusual needs can't currently override it without going through
/// `ModuleLifecycle::with_runner_capacity`.
const DEFAULT_MAX_CONCURRENT_TASKS: usize = 4;

/// States a module moves through. Transitions are monotone except that
/// both `Ready` and `Failed` lead into `Disposing` → `Disposed` — those are
/// two different terminal outcomes of the same upstream step, never a
/// regression from one into the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Constructing,
    Acquiring,
    Loading,
    Ready,
    Disposing,
    Disposed,
    Failed,
}

impl ModuleState {
    /// Wire/log-friendly name, stable independently of the Rust variant
    /// name so `FeedbackEvent::ModuleStateChanged`'s payload doesn't change
    /// shape if this enum is ever reordered.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Constructing => "constructing",
            Self::Acquiring => "acquiring",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Disposing => "disposing",
            Self::Disposed => "disposed",
            Self::Failed => "failed",
        }
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Constructing => 0,
            Self::Acquiring => 1,
            Self::Loading => 2,
            Self::Ready => 3,
            Self::Failed => 4,
            Self::Disposing => 5,
            Self::Disposed => 6,
        }
    }
}

/// The capability a concrete speech module (ASR, VAD, TTS, KWS,
/// enhancement) supplies to a [`ModuleLifecycle`]: how to build its native
/// engine once files are verified on disk, and how to release it on
/// teardown.
///
/// `on_destroy` must tolerate being called when `initialize` never
/// succeeded (acquisition failed before it ran) and being called more than
/// once (a racing finalizer and an explicit `dispose` both reaching it) —
/// concrete implementations typically guard their native handle behind an
/// `Option` that `take()` empties on first teardown.
#[async_trait::async_trait]
pub trait SpeechModule: Send + Sync {
    /// Build the native engine from a verified model directory. Called at
    /// most once per lifecycle, after acquisition succeeds and before the
    /// module is considered `Ready`.
    async fn initialize(
        &self,
        config: EngineConfig,
        feedback: &DeliveryContext,
        cancel: &CancellationToken,
    ) -> ModuleResult<()>;

    /// Release native resources. Must be idempotent and safe to call on an
    /// unintialized module.
    fn on_destroy(&self);
}

/// Owns a single module's acquisition, disposal flag, and background task
/// runner, and drives a [`SpeechModule`] through construction → acquiring →
/// loading → ready, or into failure/cancellation, per §4.9 and §4.12.
///
/// Cheap to put behind an `Arc` and share with a streaming pipeline (C10),
/// which needs the lifecycle's cancellation token and task runner but must
/// never hold a back-reference of its own per §9's "runners own no
/// back-pointers" design note.
pub struct ModuleLifecycle {
    model_id: ModelId,
    module: Arc<dyn SpeechModule>,
    state: std::sync::Mutex<ModuleState>,
    disposed: AtomicBool,
    feedback: DeliveryContext,
    cancel: CancellationToken,
    runner: AsyncMutex<TaskRunner>,
}

impl ModuleLifecycle {
    /// Construct a lifecycle in `Constructing` state. Nothing happens until
    /// [`Self::acquire_and_initialize`] is called.
    #[must_use]
    pub fn new(model_id: ModelId, module: Arc<dyn SpeechModule>, feedback: DeliveryContext) -> Self {
        Self::with_runner_capacity(model_id, module, feedback, DEFAULT_MAX_CONCURRENT_TASKS)
    }

    /// As [`Self::new`], but with an explicit task runner width — used by
    /// streaming modules (VAD/KWS/online ASR) that want headroom for a
    /// periodic drain loop plus the occasional one-shot flush.
    #[must_use]
    pub fn with_runner_capacity(
        model_id: ModelId,
        module: Arc<dyn SpeechModule>,
        feedback: DeliveryContext,
        max_concurrent_tasks: usize,
    ) -> Self {
        Self {
            model_id,
            module,
            state: std::sync::Mutex::new(ModuleState::Constructing),
            disposed: AtomicBool::new(false),
            feedback,
            cancel: CancellationToken::new(),
            runner: AsyncMutex::new(TaskRunner::new(max_concurrent_tasks)),
        }
    }

    #[must_use]
    pub fn model_id(&self) -> &ModelId {
        &self.model_id
    }

    #[must_use]
    pub fn state(&self) -> ModuleState {
        *self.state.lock().expect("module state lock poisoned")
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// A child of this lifecycle's internal cancellation token. Streaming
    /// components driven by this module should select on this token so
    /// disposal reaches them without the lifecycle tracking them
    /// individually (the design note's "runners own no back-pointers").
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// Lock this module's own task runner (C8) to submit background work —
    /// a streaming pipeline's periodic drain, a one-shot flush. Held only
    /// for the duration of a `submit`/`spawn_periodic` call, never across
    /// an `.await` that also touches the native engine.
    pub async fn runner(&self) -> MutexGuard<'_, TaskRunner> {
        self.runner.lock().await
    }

    fn set_state(&self, new: ModuleState) {
        let mut guard = self.state.lock().expect("module state lock poisoned");
        debug_assert!(
            new.rank() >= guard.rank(),
            "module state regressed from {guard:?} to {new:?}"
        );
        *guard = new;
        drop(guard);
        self.feedback.emit(FeedbackEvent::ModuleStateChanged {
            model_id: self.model_id.clone(),
            state: new.as_str().to_string(),
        });
    }

    fn find_entry(&self, registry: &dyn ModelRegistryPort) -> ModuleResult<ManifestEntry> {
        registry
            .find(self.model_id.kind(), self.model_id.name())
            .ok_or_else(|| {
                ModuleError::PreconditionError(format!("no registry entry for {}", self.model_id))
            })
    }

    /// Drive this module from `Constructing` to `Ready`: resolve its
    /// metadata, run the acquisition pipeline (C7), then call the
    /// subclass's `initialize` hook. Cancellation or failure anywhere in
    /// this path disposes the module and returns an error rather than
    /// leaving it half-built (§4.9: "on cancellation... skip initialize";
    /// "on exception, emit Failed").
    ///
    /// Calling this on an already-disposed lifecycle is a precondition
    /// violation, not a silent no-op, since a caller doing so has already
    /// lost track of the module's lifetime.
    pub async fn acquire_and_initialize(
        &self,
        registry: &dyn ModelRegistryPort,
        resolver: &PathResolver,
        client: &reqwest::Client,
        sample_rate: u32,
    ) -> ModuleResult<()> {
        if self.is_disposed() {
            return Err(ModuleError::DisposedError);
        }

        self.set_state(ModuleState::Acquiring);

        let entry = match self.find_entry(registry) {
            Ok(entry) => entry,
            Err(err) => {
                self.set_state(ModuleState::Failed);
                self.dispose().await;
                return Err(err);
            }
        };

        // `prepare_model` (C7) already emits its own Prepare/Verify/
        // Download/Extract/Success/Failed/Cancel events scoped to
        // acquisition; this lifecycle only needs to react to the outcome,
        // not re-report it.
        if let Err(err) = prepare_model(
            client,
            resolver,
            &entry,
            &self.cancel,
            &self.feedback,
            AcquisitionOptions::default(),
        )
        .await
        {
            self.set_state(if err.is_cancelled() {
                ModuleState::Disposing
            } else {
                ModuleState::Failed
            });
            self.dispose().await;
            return Err(ModuleError::Acquisition(err));
        }

        if self.cancel.is_cancelled() {
            self.feedback.emit(FeedbackEvent::Cancel {
                model_id: self.model_id.clone(),
            });
            self.dispose().await;
            return Err(ModuleError::OperationCancelled);
        }

        self.set_state(ModuleState::Loading);
        self.feedback.emit(FeedbackEvent::Load {
            model_id: self.model_id.clone(),
        });

        let model_dir = resolver.model_root(self.model_id.kind(), self.model_id.name());
        let config = EngineConfig { model_dir, sample_rate };

        match self
            .module
            .initialize(config, &self.feedback, &self.cancel)
            .await
        {
            Ok(()) => {
                self.set_state(ModuleState::Ready);
                self.feedback.emit(FeedbackEvent::Success {
                    model_id: self.model_id.clone(),
                });
                Ok(())
            }
            Err(err) if err.is_cancelled() => {
                self.feedback.emit(FeedbackEvent::Cancel {
                    model_id: self.model_id.clone(),
                });
                self.dispose().await;
                Err(err)
            }
            Err(err) => {
                self.feedback.emit(FeedbackEvent::Failed {
                    model_id: self.model_id.clone(),
                    error: err.user_message(),
                });
                self.set_state(ModuleState::Failed);
                self.dispose().await;
                Err(err)
            }
        }
    }

    /// The fundamental invariant (§4.9): dispose exactly once, however it's
    /// reached — an explicit call, a concurrent racing call, a failure path
    /// inside `acquire_and_initialize`, or the `Drop` safety net. Cancels
    /// every in-flight task, drains them with a bounded timeout, then calls
    /// the subclass teardown hook and marks `Disposed`.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.set_state(ModuleState::Disposing);
        self.cancel.cancel();

        {
            let mut runner = self.runner.lock().await;
            if tokio::time::timeout(DISPOSE_DRAIN_TIMEOUT, runner.join_all())
                .await
                .is_err()
            {
                tracing::warn!(
                    model = %self.model_id,
                    "module disposal timed out waiting for background tasks to drain"
                );
            }
        }

        self.module.on_destroy();
        self.set_state(ModuleState::Disposed);
    }
}

impl Drop for ModuleLifecycle {
    /// Safety net for a caller that drops the lifecycle without awaiting
    /// `dispose()`. Cancellation and the native-resource release happen
    /// synchronously here (no unbounded background drain makes sense
    /// inside `drop`); the task runner's own `Drop` aborts anything still
    /// running once this value goes away.
    fn drop(&mut self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        self.module.on_destroy();
        self.set_state(ModuleState::Disposed);
    }
}
