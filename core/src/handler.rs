//! Seam between a message transport and the code that processes its payloads.

use std::future::Future;
use std::pin::Pin;

/// Error type returned by handlers. The transport only needs to log it.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Processes one raw message payload.
///
/// Returning `Ok(())` acknowledges the message. Returning an error asks the
/// transport to redeliver it, and eventually to dead-letter it.
pub trait MessageHandler: Send + Sync {
    /// Handle one payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the message should be redelivered.
    fn handle<'a>(
        &'a self,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>>;
}
