//! C7a Model Health Service: out-of-band verification and repair of an
//! already-acquired model, independent of the initial acquisition flow.
//!
//! A verify or repair call takes an exclusive [`ModelOperationLock`] on the
//! model it targets, so a health check running concurrently with (or
//! against) an in-flight acquisition for the same model fails fast with
//! [`AcquireError::OperationInProgress`] rather than racing on the same
//! files.

use std::collections::HashSet;
use std::sync::{OnceLock, RwLock};

use sherpa_acquire_core::domain::model::ManifestEntry;
use sherpa_acquire_core::feedback::DeliveryContext;
use sherpa_acquire_core::paths::PathResolver;
use sherpa_acquire_core::{FeedbackEvent, ModelId};
use tokio_util::sync::CancellationToken;

use crate::error::{AcquireError, AcquireResult};
use crate::hash::FileHealth;
use crate::orchestrator::{self, AcquisitionOptions};

fn locked_models() -> &'static RwLock<HashSet<String>> {
    static LOCKED: OnceLock<RwLock<HashSet<String>>> = OnceLock::new();
    LOCKED.get_or_init(|| RwLock::new(HashSet::new()))
}

/// RAII guard for a single model's exclusive operation lock. Releases the
/// lock when dropped, including on an early return or panic unwind.
pub struct OperationGuard {
    model: String,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        locked_models().write().expect("lock poisoned").remove(&self.model);
    }
}

/// Per-model mutual exclusion for verify/repair/acquire calls. Backed by a
/// process-wide set rather than a per-model `Mutex` so the lock itself
/// needs no prior registration step — any caller naming a `ModelId` can
/// attempt to acquire it.
pub struct ModelOperationLock;

impl ModelOperationLock {
    pub fn acquire(model_id: &ModelId) -> AcquireResult<OperationGuard> {
        let key = model_id.to_string();
        let mut guard = locked_models().write().expect("lock poisoned");
        if !guard.insert(key.clone()) {
            return Err(AcquireError::OperationInProgress { model: key });
        }
        Ok(OperationGuard { model: key })
    }
}

/// Health of a single file within a model, as reported by a verification
/// pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileVerificationResult {
    pub relative_path: String,
    pub health: FileHealth,
}

/// Outcome of a full health check over one model's registered files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub model_id: ModelId,
    pub overall_healthy: bool,
    pub files: Vec<FileVerificationResult>,
}

/// Verify every file `entry` registers, without downloading or modifying
/// anything. Takes the model's operation lock for the duration of the
/// check so it can't interleave with a concurrent repair or acquisition.
pub async fn verify_model(
    resolver: &PathResolver,
    entry: &ManifestEntry,
    feedback: &DeliveryContext,
) -> AcquireResult<VerificationReport> {
    let _guard = ModelOperationLock::acquire(&entry.id)?;

    let results = orchestrator::verify_entry(resolver, entry, feedback).await?;
    let overall_healthy = results.iter().all(|(_, health)| *health == FileHealth::Healthy);

    feedback.emit(FeedbackEvent::VerifyCompleted {
        model_id: entry.id.clone(),
        healthy: overall_healthy,
    });

    Ok(VerificationReport {
        model_id: entry.id.clone(),
        overall_healthy,
        files: results
            .into_iter()
            .map(|(spec, health)| FileVerificationResult {
                relative_path: spec.relative_path,
                health,
            })
            .collect(),
    })
}

/// Delete any unhealthy file belonging to `entry` and re-run acquisition so
/// it's re-fetched. Files that already verify clean are left untouched,
/// rather than re-downloading a whole model over one corrupt file.
pub async fn repair_model(
    client: &reqwest::Client,
    resolver: &PathResolver,
    entry: &ManifestEntry,
    cancel: &CancellationToken,
    feedback: &DeliveryContext,
) -> AcquireResult<()> {
    let guard = ModelOperationLock::acquire(&entry.id)?;

    let report = orchestrator::verify_entry(resolver, entry, feedback).await?;
    for (spec, health) in &report {
        if *health != FileHealth::Healthy {
            let path = resolver.file_path(entry.id.kind(), entry.id.name(), &spec.relative_path)?;
            let _ = tokio::fs::remove_file(&path).await;
        }
    }

    // Hold the guard across the re-acquire too: prepare_model takes no lock
    // of its own, and releasing early would let a concurrent verify/repair
    // call interleave between the deletes above and the fetch below.
    let result = orchestrator::prepare_model(
        client,
        resolver,
        entry,
        cancel,
        feedback,
        AcquisitionOptions::default(),
    )
    .await;
    drop(guard);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use sherpa_acquire_core::ModuleKind;

    #[test]
    fn acquiring_twice_for_the_same_model_fails() {
        let id = ModelId::new(ModuleKind::Asr, "health-lock-test-a");
        let _first = ModelOperationLock::acquire(&id).unwrap();
        let second = ModelOperationLock::acquire(&id);
        assert!(matches!(second, Err(AcquireError::OperationInProgress { .. })));
    }

    #[test]
    fn releasing_the_guard_allows_reacquisition() {
        let id = ModelId::new(ModuleKind::Asr, "health-lock-test-b");
        {
            let _guard = ModelOperationLock::acquire(&id).unwrap();
        }
        assert!(ModelOperationLock::acquire(&id).is_ok());
    }

    #[test]
    fn locks_are_scoped_per_model_id() {
        let a = ModelId::new(ModuleKind::Asr, "health-lock-test-c1");
        let b = ModelId::new(ModuleKind::Asr, "health-lock-test-c2");
        let _guard_a = ModelOperationLock::acquire(&a).unwrap();
        assert!(ModelOperationLock::acquire(&b).is_ok());
    }
}
