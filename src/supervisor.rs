//! Generic "run this forever, back off on failure" wrapper (§4.6).
//!
//! Grounded on `async_repeat_until_cancelled` from the upstream
//! `app_utils.py`: same backoff-index formula
//! (`min(consecutive_failures, len(schedule) - 1)`), same "a clean return is
//! unexpected and gets restarted" treatment, same prompt-cancellation
//! requirement for both the task and any in-flight sleep.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Default schedule used throughout the application unless a feed overrides
/// its own (see [`crate::feeds::config::DEFAULT_EXCEPTION_BACKOFF_SCHEDULE`]).
pub const DEFAULT_SCHEDULE: &[u64] = &[1, 2, 4, 8, 16, 32, 64];

/// Run `make_task()` forever until `cancel` fires.
///
/// `make_task` is a factory rather than a single future because the task
/// must be re-created on every iteration (it is consumed by `await`); this
/// mirrors passing a coroutine function, not a coroutine, to the Python
/// original.
pub async fn repeat_until_cancelled<F, Fut, E>(
    name: &str,
    schedule: &[u64],
    cancel: CancellationToken,
    mut make_task: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    let mut consecutive_failures: usize = 0;

    loop {
        if cancel.is_cancelled() {
            return;
        }

        let outcome = tokio::select! {
            result = make_task() => Some(result),
            _ = cancel.cancelled() => None,
        };

        let Some(result) = outcome else {
            return;
        };

        match result {
            Ok(()) => {
                warn!(task = name, "supervised task completed without error; restarting");
                consecutive_failures = 0;
                continue;
            }
            Err(e) => {
                error!(task = name, error = %e, consecutive_failures, "supervised task failed");
                let index = consecutive_failures.min(schedule.len().saturating_sub(1));
                let delay = Duration::from_secs(*schedule.get(index).unwrap_or(&1));
                consecutive_failures += 1;

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return,
                }
            }
        }
    }
}
