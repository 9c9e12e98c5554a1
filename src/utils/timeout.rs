//! Deadlines for network operations.

use crate::error::{ProtocolError, Result};
use std::future::Future;
use std::time::Duration;

/// Default deadline for establishing a connection
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default deadline for each inbound message of a discovery session
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Run `fut`, failing with [`ProtocolError::Timeout`] if it does not finish within `duration`
pub async fn with_timeout_error<F, T>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}
