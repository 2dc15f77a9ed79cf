use crate::error::Error;

/// Receives key refresh failures.
///
/// Refresh failures never fail a request in flight, so they are handed to a
/// sink instead. Any `Fn(&Error) + Send + Sync` closure is a sink, which lets
/// tests collect failures into a channel or a shared vector.
pub trait ErrorSink: Send + Sync {
    fn report(&self, error: &Error);
}

impl<F> ErrorSink for F
where
    F: Fn(&Error) + Send + Sync,
{
    fn report(&self, error: &Error) {
        self(error)
    }
}

/// Default sink, logs refresh failures as `tracing` warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, error: &Error) {
        tracing::warn!(error = %error, "JWKS refresh failed, keeping current keys");
    }
}
