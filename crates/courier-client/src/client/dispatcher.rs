//! Connection-wide inbound dispatcher.
//!
//! # Purpose
//! Receives decoded inbound messages from the transport and places each one
//! on its subscription's delivery queue, applying pending limits first.
//!
//! # Design notes
//! `on_inbound_message` never waits: resolve, enqueue or drop, report. A slow
//! callback only ever backs up its own queue, so ingestion for every other
//! subscription keeps flowing. Overload is purely per message; once a queue
//! drains below its limits the next message is accepted with no extra state.
use courier_common::Message;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::client::queue::EnqueueOutcome;
use crate::client::registry::SubscriptionRegistry;
use crate::client::reporter::ErrorReporter;
use crate::counters::ClientCounters;
use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Enqueued,
    /// No live subscription for the message's id.
    NoSubscription,
    /// The subscription is draining or closed.
    Unsubscribed,
    /// Pending limits exceeded; reported as a slow consumer.
    Dropped,
}

pub struct Dispatcher {
    registry: Arc<SubscriptionRegistry>,
    reporter: ErrorReporter,
    counters: Arc<ClientCounters>,
}

impl Dispatcher {
    pub(crate) fn new(
        registry: Arc<SubscriptionRegistry>,
        reporter: ErrorReporter,
        counters: Arc<ClientCounters>,
    ) -> Self {
        Self {
            registry,
            reporter,
            counters,
        }
    }

    /// Route one inbound message to the subscription named by its id.
    pub fn on_inbound_message(&self, message: Message) -> DispatchOutcome {
        let subscription_id = message.subscription_id();
        self.counters.record_inbound(message.size());
        let Some(subscription) = self.registry.lookup(subscription_id) else {
            tracing::trace!(sid = subscription_id, "no subscription for inbound message");
            return DispatchOutcome::NoSubscription;
        };
        match subscription.enqueue(message) {
            EnqueueOutcome::Accepted => DispatchOutcome::Enqueued,
            EnqueueOutcome::Closed => DispatchOutcome::Unsubscribed,
            EnqueueOutcome::Rejected => {
                self.counters
                    .slow_consumer_drops
                    .fetch_add(1, Ordering::Relaxed);
                self.reporter
                    .report(ClientError::SlowConsumer { subscription_id });
                DispatchOutcome::Dropped
            }
        }
    }
}
