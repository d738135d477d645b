// Asynchronous error reporting channel.
use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::client::subscription::panic_message;
use crate::counters::ClientCounters;
use crate::error::ClientError;

/// Handler invoked, in report order, for every asynchronous error.
pub type ErrorHandler = Arc<dyn Fn(ClientError) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as an [`ErrorHandler`].
///
/// ```
/// use courier_client::error_handler;
///
/// let handler = error_handler(|err| async move {
///     eprintln!("async error: {err}");
/// });
/// # drop(handler);
/// ```
pub fn error_handler<F, Fut>(handler: F) -> ErrorHandler
where
    F: Fn(ClientError) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |err| Box::pin(handler(err)))
}

/// Sending half of the error channel. Reporting never waits.
#[derive(Clone)]
pub(crate) struct ErrorReporter {
    tx: mpsc::Sender<ClientError>,
    counters: Arc<ClientCounters>,
}

impl ErrorReporter {
    pub(crate) fn spawn(
        depth: usize,
        handler: Option<ErrorHandler>,
        counters: Arc<ClientCounters>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        let handle = tokio::spawn(run_error_reporter(rx, handler));
        (Self { tx, counters }, handle)
    }

    pub(crate) fn report(&self, err: ClientError) {
        match self.tx.try_send(err) {
            Ok(()) => {}
            Err(TrySendError::Full(err)) => {
                self.counters
                    .dropped_error_reports
                    .fetch_add(1, Ordering::Relaxed);
                metrics::counter!("courier_client_error_reports_dropped_total").increment(1);
                tracing::warn!(error = %err, "error queue full; dropping report");
            }
            Err(TrySendError::Closed(err)) => {
                tracing::debug!(error = %err, "error reporter stopped; dropping report");
            }
        }
    }
}

async fn run_error_reporter(mut rx: mpsc::Receiver<ClientError>, handler: Option<ErrorHandler>) {
    while let Some(err) = rx.recv().await {
        match &handler {
            Some(handler) => {
                let kind = err.kind();
                if let Err(panic) = AssertUnwindSafe(async { handler(err).await })
                    .catch_unwind()
                    .await
                {
                    tracing::warn!(
                        ?kind,
                        panic = panic_message(panic.as_ref()),
                        "error handler panicked"
                    );
                }
            }
            None => tracing::warn!(
                kind = ?err.kind(),
                sid = ?err.subscription_id(),
                error = %err,
                "unhandled asynchronous error"
            ),
        }
    }
    tracing::debug!("error reporter stopped");
}
