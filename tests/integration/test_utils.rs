//! Shared test utilities for integration tests
//!
//! Config loading reads process-wide environment variables, so tests that touch them
//! run one at a time and restore the previous values afterwards.

use std::sync::Mutex;
use tempfile::TempDir;

/// Serializes environment access across tests in this binary.
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const TRACKED: &[&str] = &[
    "HOME",
    "XDG_CONFIG_HOME",
    "SHOTQUEUE_ENV",
    "SHOTQUEUE__GRAMMAR__MAX_OPTIONS",
    "SHOTQUEUE__CHECKPOINT__STALENESS_WINDOW_SECS",
    "SHOTQUEUE__BACKEND__ENDPOINT",
];

struct EnvState(Vec<(&'static str, Option<String>)>);

impl EnvState {
    fn capture() -> Self {
        Self(
            TRACKED
                .iter()
                .map(|name| (*name, std::env::var(name).ok()))
                .collect(),
        )
    }

    fn restore(self) {
        for (name, value) in self.0 {
            match value {
                Some(orig) => std::env::set_var(name, orig),
                None => std::env::remove_var(name),
            }
        }
    }
}

/// Run `f` with HOME and XDG_CONFIG_HOME pointed into `test_dir` and every
/// `SHOTQUEUE__*` override used by the tests cleared.
pub fn with_isolated_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let env_state = EnvState::capture();

    let test_home = test_dir.path().join("home");
    let test_config_home = test_dir.path().join("xdg");
    std::fs::create_dir_all(&test_home).unwrap();
    std::fs::create_dir_all(&test_config_home).unwrap();

    std::env::set_var("HOME", test_home.to_str().unwrap());
    std::env::set_var("XDG_CONFIG_HOME", test_config_home.to_str().unwrap());
    for name in TRACKED.iter().filter(|n| n.starts_with("SHOTQUEUE")) {
        std::env::remove_var(name);
    }

    let result = f();

    env_state.restore();

    result
}
