use std::future::Future;

use tokio::task::JoinHandle;
use tracing::Instrument;

/// Spawns a task that keeps the caller's span, so events emitted by background
/// tasks stay attributed to the component that started them
pub fn spawn_in_current_span<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(future.in_current_span())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawned_future_runs_to_completion() {
        let span = tracing::info_span!("mqtt");
        let handle = {
            let _entered = span.enter();
            spawn_in_current_span(async { 40 + 2 })
        };
        assert_eq!(handle.await.unwrap(), 42);
    }
}
