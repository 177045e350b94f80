//! C11 Environment Store: a small process-wide, runtime-mutable key/value
//! overlay on top of `std::env`, with change notification.
//!
//! Unlike `std::env::var`, values set here are visible to every component
//! without requiring a process restart, and other components can
//! `subscribe()` to be notified when a key they care about changes (for
//! example, the download queue watching for a github proxy override being
//! set mid-session by a host application's settings UI).
//!
//! Layering for any given key is: explicit `set()` call > process
//! environment variable > caller-supplied default.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::sync::RwLock;

use tokio::sync::watch;

/// Environment variable consulted by the downloader to rewrite GitHub
/// release URLs through a mirror, for environments where GitHub is slow or
/// blocked. Named to mirror the upstream engine's own `SherpaOnnx.GithubProxy`
/// setting.
pub const GITHUB_PROXY_ENV: &str = "SHERPA_ONNX_GITHUB_PROXY";

static GLOBAL: OnceLock<EnvironmentStore> = OnceLock::new();

/// A runtime-mutable key/value overlay, with change notification.
pub struct EnvironmentStore {
    overrides: RwLock<HashMap<String, String>>,
    generation_tx: watch::Sender<u64>,
}

impl EnvironmentStore {
    fn new() -> Self {
        let (generation_tx, _rx) = watch::channel(0);
        Self {
            overrides: RwLock::new(HashMap::new()),
            generation_tx,
        }
    }

    /// The single process-wide store. Components should hold a reference to
    /// this rather than constructing their own `EnvironmentStore`, so that a
    /// `set()` from one component is visible to all others.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(Self::new)
    }

    /// Read a value, checking the in-process override map first and falling
    /// back to the real process environment.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self
            .overrides
            .read()
            .expect("environment store lock poisoned")
            .get(key)
        {
            return Some(value.clone());
        }
        std::env::var(key).ok()
    }

    /// Read a value, or fall back to `default` if unset in both the
    /// override map and the process environment.
    #[must_use]
    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Set an in-process override, visible to every holder of this store
    /// without touching the real process environment. Bumps the change
    /// generation so subscribers wake up.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        tracing::debug!(key = %key, "environment store override set");
        self.overrides
            .write()
            .expect("environment store lock poisoned")
            .insert(key, value.into());
        self.bump_generation();
    }

    /// Remove an in-process override. The real process environment variable
    /// (if any) is left untouched and becomes visible again on the next
    /// `get()`.
    pub fn remove(&self, key: &str) {
        self.overrides
            .write()
            .expect("environment store lock poisoned")
            .remove(key);
        self.bump_generation();
    }

    /// Subscribe to change notifications. The receiver yields a
    /// monotonically increasing generation number; subscribers that care
    /// about a specific key should re-read it after each notification
    /// rather than trying to decode which key changed.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation_tx.subscribe()
    }

    /// Convenience accessor for the github release-mirror proxy, see
    /// [`GITHUB_PROXY_ENV`].
    #[must_use]
    pub fn github_proxy(&self) -> Option<String> {
        self.get(GITHUB_PROXY_ENV).filter(|v| !v.trim().is_empty())
    }

    fn bump_generation(&self) {
        let next = *self.generation_tx.borrow() + 1;
        // An error here only means there are no receivers left; that's fine.
        let _ = self.generation_tx.send(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let store = EnvironmentStore::new();
        assert_eq!(store.get("NOT_SET_ANYWHERE"), None);
        store.set("FOO", "bar");
        assert_eq!(store.get("FOO"), Some("bar".to_string()));
    }

    #[test]
    fn remove_falls_back_to_process_env() {
        let store = EnvironmentStore::new();
        store.set("PATH", "/overridden");
        assert_eq!(store.get("PATH"), Some("/overridden".to_string()));
        store.remove("PATH");
        // Whatever PATH the test process actually has, it should differ
        // from our override and be present (PATH is always set in practice).
        assert_ne!(store.get("PATH"), Some("/overridden".to_string()));
    }

    #[test]
    fn get_or_uses_default_when_unset() {
        let store = EnvironmentStore::new();
        assert_eq!(store.get_or("NOT_SET_ANYWHERE", "fallback"), "fallback");
    }

    #[test]
    fn subscribers_see_generation_bump_on_set() {
        let store = EnvironmentStore::new();
        let mut rx = store.subscribe();
        let before = *rx.borrow();
        store.set("FOO", "bar");
        // has_changed / blocking_recv not needed; borrow reflects latest value
        // once `send` has completed synchronously above.
        assert!(*rx.borrow_and_update() > before);
    }

    #[test]
    fn github_proxy_ignores_blank_override() {
        let store = EnvironmentStore::new();
        store.set(GITHUB_PROXY_ENV, "   ");
        assert_eq!(store.github_proxy(), None);
        store.set(GITHUB_PROXY_ENV, "https://mirror.example/");
        assert_eq!(
            store.github_proxy(),
            Some("https://mirror.example/".to_string())
        );
    }
}
