use anyhow::{anyhow, Result};

/// Spawn a blocking task and return the future that resolves to its outcome
pub fn spawn_blocking_task<F, R>(func: F) -> tokio::task::JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(func)
}

/// Run a fallible blocking closure off the async executor and flatten the join error
pub async fn run_blocking<F, R>(func: F) -> Result<R>
where
    F: FnOnce() -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    spawn_blocking_task(func)
        .await
        .map_err(|err| anyhow!("blocking task panicked or was cancelled: {err}"))?
}
