//! Manual smoke-test binary for the acquisition core.
//!
//! Not part of the library surface: this exists so a developer can run
//! `cargo run -p sherpa-acquire-cli -- asr streaming-zipformer-small-en`
//! and watch a real acquisition happen against the embedded registry,
//! without writing a throwaway test harness every time.

use std::sync::Arc;

use sherpa_acquire_core::{
    DeliveryContext, ModelId, ModelRegistry, ModelRegistryPort, ModuleKind, PathResolver,
};
use sherpa_acquire_module::engine::EngineConfig;
use sherpa_acquire_module::{ModuleLifecycle, ModuleResult, SpeechModule};
use tokio_util::sync::CancellationToken;

/// Sample rate used when probing a module's `initialize` hook. Real hosts
/// negotiate this with their audio input device; this binary has none.
const SMOKE_TEST_SAMPLE_RATE: u32 = 16_000;

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn parse_kind(raw: &str) -> anyhow::Result<ModuleKind> {
    ModuleKind::ALL
        .into_iter()
        .find(|kind| kind.as_kebab() == raw)
        .ok_or_else(|| anyhow::anyhow!("unknown module kind {raw:?}"))
}

/// Stands in for a concrete native-engine-backed module: this binary's job
/// is to exercise acquisition and the lifecycle state machine, not to link
/// a real speech engine.
struct SmokeTestModule;

#[async_trait::async_trait]
impl SpeechModule for SmokeTestModule {
    async fn initialize(
        &self,
        config: EngineConfig,
        _feedback: &DeliveryContext,
        _cancel: &CancellationToken,
    ) -> ModuleResult<()> {
        tracing::info!(
            model_dir = %config.model_dir.display(),
            sample_rate = config.sample_rate,
            "initialize: no native engine wired into this smoke-test binary"
        );
        Ok(())
    }

    fn on_destroy(&self) {
        tracing::info!("module disposed");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let kind_arg = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: sherpa-acquire-cli <module-kind> <model-name>"))?;
    let name = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: sherpa-acquire-cli <module-kind> <model-name>"))?;

    let kind = parse_kind(&kind_arg)?;
    let registry = ModelRegistry::embedded();
    registry
        .find(kind, &name)
        .ok_or_else(|| anyhow::anyhow!("no registry entry for {kind}/{name}"))?;

    let resolver = PathResolver::from_env()?;
    let client = sherpa_acquire_download::build_client()?;

    let (feedback, mut rx) = DeliveryContext::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            tracing::info!(event = event.event_name(), model = %event.model_id(), "{event:?}");
        }
    });

    let lifecycle = Arc::new(ModuleLifecycle::new(
        ModelId::new(kind, name.clone()),
        Arc::new(SmokeTestModule),
        feedback.clone(),
    ));

    let ctrl_c_task = {
        let lifecycle = Arc::clone(&lifecycle);
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::warn!("ctrl-c received, disposing module");
            lifecycle.dispose().await;
        })
    };

    let result = lifecycle
        .acquire_and_initialize(&registry, &resolver, &client, SMOKE_TEST_SAMPLE_RATE)
        .await;

    ctrl_c_task.abort();
    drop(lifecycle);
    drop(feedback);
    let _ = printer.await;

    match result {
        Ok(()) => {
            println!("{kind}/{name} ready at {}", resolver.model_root(kind, &name).display());
            Ok(())
        }
        Err(err) => Err(anyhow::anyhow!(err.user_message())),
    }
}
