//! Shared HTTP client construction and GitHub release-mirror rewriting.

use std::time::Duration;

use sherpa_acquire_core::EnvironmentStore;

/// Default per-request timeout. Generous because model files are large and
/// a slow-but-progressing connection shouldn't be killed; this bounds
/// hangs, not slow transfers (reqwest's timeout is a total-request timeout,
/// so the resumable downloader chunks large transfers into bounded range
/// requests rather than relying on this alone).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the shared `reqwest::Client` used for every acquisition HTTP call.
pub fn build_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .user_agent(concat!("sherpa-acquire/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Rewrite a GitHub release/raw URL through the configured mirror, if one
/// is set via [`sherpa_acquire_core::environment::GITHUB_PROXY_ENV`]. Any
/// other host is returned unchanged.
#[must_use]
pub fn apply_github_proxy(url: &str) -> String {
    let Some(proxy) = EnvironmentStore::global().github_proxy() else {
        return url.to_string();
    };

    if url.starts_with("https://github.com/") || url.starts_with("https://raw.githubusercontent.com/") {
        let trimmed_proxy = proxy.trim_end_matches('/');
        format!("{trimmed_proxy}/{url}")
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sherpa_acquire_core::environment::GITHUB_PROXY_ENV;
    use std::sync::Mutex;

    // EnvironmentStore::global() is process-wide; serialize tests that
    // mutate GITHUB_PROXY_ENV so they can't interleave.
    static GITHUB_PROXY_TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn proxy_leaves_non_github_urls_alone() {
        let _guard = GITHUB_PROXY_TEST_LOCK.lock().unwrap();
        EnvironmentStore::global().set(GITHUB_PROXY_ENV, "https://mirror.example");
        assert_eq!(
            apply_github_proxy("https://huggingface.co/x/y"),
            "https://huggingface.co/x/y"
        );
        EnvironmentStore::global().remove(GITHUB_PROXY_ENV);
    }

    #[test]
    fn proxy_rewrites_github_release_urls_when_set() {
        let _guard = GITHUB_PROXY_TEST_LOCK.lock().unwrap();
        EnvironmentStore::global().set(GITHUB_PROXY_ENV, "https://mirror.example/");
        let rewritten = apply_github_proxy("https://github.com/k2-fsa/sherpa-onnx/releases/x.tar.bz2");
        assert_eq!(
            rewritten,
            "https://mirror.example/https://github.com/k2-fsa/sherpa-onnx/releases/x.tar.bz2"
        );
        EnvironmentStore::global().remove(GITHUB_PROXY_ENV);
    }
}
