//! Route handlers

pub mod camera;
pub mod detect;
pub mod history;
pub mod stats;

use crate::ApiError;

/// Run blocking detector or controller work off the async runtime
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::internal(format!("worker task failed: {}", e)))
}
