pub mod approval;
pub mod auth;
pub mod error;
pub mod inventory;
pub mod middleware;
pub mod queue;

use error::ApiError;
use tracing::error;

/// Run a blocking store call off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Store(anyhow::anyhow!("task join error: {}", e))
        })?
        .map_err(ApiError::Store)
}
