// Subscription state and its dispatch task.
use courier_common::Message;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use tokio::sync::watch;

use crate::client::queue::{DeliveryQueue, EnqueueOutcome, PendingLimits};
use crate::client::reporter::ErrorReporter;
use crate::counters::ClientCounters;
use crate::error::ClientError;

/// Callback invoked once per delivered message.
pub(crate) type MessageHandler =
    Arc<dyn Fn(Message) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

pub(crate) fn message_handler<F, Fut>(handler: F) -> MessageHandler
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |message| Box::pin(handler(message)))
}

/// Per-subscription limits. Unset fields fall back to the client defaults.
///
/// ```
/// use courier_client::SubscribeOptions;
///
/// let options = SubscribeOptions::default().pending_msgs_limit(5);
/// assert_eq!(options.pending_msgs_limit, Some(5));
/// assert_eq!(options.pending_bytes_limit, None);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    pub pending_msgs_limit: Option<usize>,
    pub pending_bytes_limit: Option<usize>,
}

impl SubscribeOptions {
    pub fn pending_msgs_limit(mut self, limit: usize) -> Self {
        self.pending_msgs_limit = Some(limit);
        self
    }

    pub fn pending_bytes_limit(mut self, limit: usize) -> Self {
        self.pending_bytes_limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    /// Unsubscribed; queued messages are still being delivered.
    Draining,
    Closed,
}

const STATUS_ACTIVE: u8 = 0;
const STATUS_DRAINING: u8 = 1;
const STATUS_CLOSED: u8 = 2;

impl SubscriptionStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            STATUS_ACTIVE => SubscriptionStatus::Active,
            STATUS_DRAINING => SubscriptionStatus::Draining,
            _ => SubscriptionStatus::Closed,
        }
    }
}

/// Point-in-time view of a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionInfo {
    pub id: u64,
    pub subject: String,
    pub status: SubscriptionStatus,
    pub pending_msgs: usize,
    pub pending_bytes: usize,
    pub limits: PendingLimits,
    pub delivered: u64,
    pub dropped: u64,
}

pub(crate) struct Subscription {
    id: u64,
    subject: Arc<str>,
    queue: DeliveryQueue,
    status: AtomicU8,
    delivered: AtomicU64,
    dropped: AtomicU64,
    // Flipped to true by the dispatch task on exit; any number of waiters.
    exited: watch::Sender<bool>,
}

pub(crate) struct SubscriptionConfig {
    pub(crate) id: u64,
    pub(crate) subject: Arc<str>,
    pub(crate) limits: PendingLimits,
    pub(crate) handler: MessageHandler,
    pub(crate) reporter: ErrorReporter,
    pub(crate) counters: Arc<ClientCounters>,
}

impl Subscription {
    /// Build the subscription and start its dispatch task.
    pub(crate) fn spawn(config: SubscriptionConfig) -> Arc<Self> {
        let subscription = Arc::new(Self {
            id: config.id,
            subject: config.subject,
            queue: DeliveryQueue::new(config.limits),
            status: AtomicU8::new(STATUS_ACTIVE),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            exited: watch::Sender::new(false),
        });
        tokio::spawn(run_subscription_dispatch_task(
            Arc::clone(&subscription),
            config.handler,
            config.reporter,
            config.counters,
        ));
        subscription
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn subject(&self) -> &str {
        &self.subject
    }

    pub(crate) fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Called by the dispatcher; never waits.
    pub(crate) fn enqueue(&self, message: Message) -> EnqueueOutcome {
        if self.status() != SubscriptionStatus::Active {
            return EnqueueOutcome::Closed;
        }
        let size = message.size();
        let outcome = self.queue.enqueue(message, size);
        match outcome {
            EnqueueOutcome::Accepted => {
                metrics::counter!("courier_client_sub_queue_enqueued_total").increment(1);
            }
            EnqueueOutcome::Rejected => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("courier_client_sub_queue_dropped_total").increment(1);
            }
            EnqueueOutcome::Closed => {}
        }
        outcome
    }

    /// Stop accepting messages; the dispatch task exits once the queue drains.
    /// Returns false if the subscription was already unsubscribed.
    pub(crate) fn unsubscribe(&self) -> bool {
        let transitioned = self
            .status
            .compare_exchange(
                STATUS_ACTIVE,
                STATUS_DRAINING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if transitioned {
            self.queue.close();
            tracing::debug!(sid = self.id, subject = %self.subject, "subscription draining");
        }
        transitioned
    }

    /// Wait until the dispatch task has exited. Safe to await from several tasks.
    pub(crate) async fn wait_closed(&self) {
        let mut exited = self.exited.subscribe();
        let signalled = exited.wait_for(|exited| *exited).await.is_ok();
        if !signalled {
            tracing::warn!(sid = self.id, "dispatch task exit signal lost");
        }
    }

    pub(crate) fn info(&self) -> SubscriptionInfo {
        let (pending_msgs, pending_bytes) = self.queue.pending();
        SubscriptionInfo {
            id: self.id,
            subject: self.subject.to_string(),
            status: self.status(),
            pending_msgs,
            pending_bytes,
            limits: self.queue.limits(),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

async fn run_subscription_dispatch_task(
    subscription: Arc<Subscription>,
    handler: MessageHandler,
    reporter: ErrorReporter,
    counters: Arc<ClientCounters>,
) {
    while let Some(message) = subscription.queue.dequeue().await {
        metrics::counter!("courier_client_sub_queue_dequeued_total").increment(1);
        let subject = message.subject().to_string();
        subscription.delivered.fetch_add(1, Ordering::Relaxed);

        // The callback runs inside the future so a panic while building it is caught too.
        let outcome = AssertUnwindSafe(async { handler(message).await })
            .catch_unwind()
            .await;
        let reason = match outcome {
            Ok(Ok(())) => continue,
            Ok(Err(err)) => format!("{err:#}"),
            Err(panic) => format!("callback panicked: {}", panic_message(panic.as_ref())),
        };
        counters.callback_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("courier_client_callback_failures_total").increment(1);
        reporter.report(ClientError::CallbackFailure {
            subscription_id: subscription.id,
            subject,
            reason,
        });
    }
    subscription.status.store(STATUS_CLOSED, Ordering::Release);
    subscription.exited.send_replace(true);
    tracing::debug!(sid = subscription.id, "dispatch task exited");
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
