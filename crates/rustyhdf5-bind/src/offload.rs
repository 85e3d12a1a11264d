//! Running blocking store calls off the async executor.
//!
//! Store operations are synchronous. [`offload`] moves one blocking closure
//! onto tokio's blocking pool so async callers don't stall their worker
//! thread. The closure owns whatever handles it uses, so two offloaded calls
//! never touch the same handle unless the caller clones it in deliberately.

use crate::error::{Error, Result};

/// Run `f` on the blocking thread pool and await its result.
pub async fn offload<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::InvalidState(format!("blocking task did not complete: {e}")))?
}
