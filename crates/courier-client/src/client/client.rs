//! Client facade over the dispatch engine.
//!
//! # Purpose
//! Owns one connection's registry, dispatcher, error reporter and transport,
//! and exposes subscribe/publish/request to callers.
//!
//! # Design notes
//! A subscription is registered locally before the protocol subscribe is sent
//! so a reply that races the subscribe is still routed. Unsubscribe removes the
//! local entry first; the registry lookup then decides idempotency.
use bytes::Bytes;
use courier_common::{Message, validate_pattern, validate_subject};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::client::dispatcher::Dispatcher;
use crate::client::inbox::InboxGenerator;
use crate::client::queue::PendingLimits;
use crate::client::registry::SubscriptionRegistry;
use crate::client::reporter::{ErrorHandler, ErrorReporter};
use crate::client::request::PendingRequest;
use crate::client::subscription::{
    MessageHandler, SubscribeOptions, Subscription, SubscriptionConfig, SubscriptionInfo,
    message_handler,
};
use crate::client::transport::{Connect, Transport};
use crate::config::ClientConfig;
use crate::counters::{ClientCounters, ClientStats};
use crate::error::{ClientError, Result};

/// Handle to one connection. Clones share the connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    registry: Arc<SubscriptionRegistry>,
    reporter: ErrorReporter,
    counters: Arc<ClientCounters>,
    inbox: InboxGenerator,
    closed: watch::Sender<bool>,
}

impl Client {
    /// Connect without an error handler; asynchronous errors are logged.
    pub async fn connect(connector: &dyn Connect, config: ClientConfig) -> Result<Self> {
        Self::build(connector, config, None).await
    }

    pub async fn connect_with_error_handler(
        connector: &dyn Connect,
        config: ClientConfig,
        handler: ErrorHandler,
    ) -> Result<Self> {
        Self::build(connector, config, Some(handler)).await
    }

    async fn build(
        connector: &dyn Connect,
        config: ClientConfig,
        handler: Option<ErrorHandler>,
    ) -> Result<Self> {
        let counters = Arc::new(ClientCounters::default());
        let (reporter, _reporter_task) =
            ErrorReporter::spawn(config.error_queue_depth, handler, Arc::clone(&counters));
        let registry = Arc::new(SubscriptionRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            reporter.clone(),
            Arc::clone(&counters),
        ));
        let transport = connector.connect(dispatcher).await?;
        let inbox = InboxGenerator::new(&config.inbox_prefix);
        tracing::debug!(
            error_queue_depth = config.error_queue_depth,
            inbox_prefix = %config.inbox_prefix,
            "client connected"
        );
        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                registry,
                reporter,
                counters,
                inbox,
                closed: watch::Sender::new(false),
            }),
        })
    }

    /// Subscribe `callback` to `subject`, which may contain wildcards.
    ///
    /// Each subscription gets its own queue and dispatch task, so a slow
    /// callback only delays its own deliveries. Returns the subscription id.
    pub async fn subscribe<F, Fut>(
        &self,
        subject: &str,
        callback: F,
        options: SubscribeOptions,
    ) -> Result<u64>
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let config = &self.inner.config;
        let limits = PendingLimits {
            msgs: options
                .pending_msgs_limit
                .or(config.default_pending_msgs_limit),
            bytes: options
                .pending_bytes_limit
                .or(config.default_pending_bytes_limit),
        };
        self.subscribe_with_handler(subject, message_handler(callback), limits)
            .await
    }

    /// Subscribe with exactly `limits`; config defaults are not consulted.
    async fn subscribe_with_handler(
        &self,
        subject: &str,
        handler: MessageHandler,
        limits: PendingLimits,
    ) -> Result<u64> {
        self.ensure_open()?;
        validate_pattern(subject)?;
        let inner = &self.inner;
        let subscription = Subscription::spawn(SubscriptionConfig {
            id: inner.registry.allocate_id(),
            subject: Arc::from(subject),
            limits,
            handler,
            reporter: inner.reporter.clone(),
            counters: Arc::clone(&inner.counters),
        });
        let sid = inner.registry.register(subscription);
        if let Err(err) = inner.transport.send_subscribe(subject, sid).await {
            inner.registry.remove(sid);
            return Err(err.into());
        }
        tracing::debug!(sid, subject, ?limits, "subscribed");
        Ok(sid)
    }

    /// Stop delivery for `sid`. Queued messages are still delivered.
    /// Unknown or already removed ids are a no-op.
    pub async fn unsubscribe(&self, sid: u64) -> Result<()> {
        if self.inner.registry.remove(sid).is_none() {
            return Ok(());
        }
        tracing::debug!(sid, "unsubscribed");
        if self.is_closed() {
            return Ok(());
        }
        self.inner.transport.send_unsubscribe(sid).await?;
        Ok(())
    }

    pub async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        self.send(subject, None, payload).await
    }

    /// Publish with a reply subject set.
    pub async fn publish_request(&self, subject: &str, reply: &str, payload: Bytes) -> Result<()> {
        validate_subject(reply)?;
        self.send(subject, Some(reply), payload).await
    }

    async fn send(&self, subject: &str, reply: Option<&str>, payload: Bytes) -> Result<()> {
        self.ensure_open()?;
        validate_subject(subject)?;
        self.inner.counters.record_outbound(payload.len());
        self.inner
            .transport
            .send_publish(subject, reply, payload)
            .await?;
        Ok(())
    }

    /// Unsubscribe and wait until every message already queued for `sid` has
    /// been handed to its callback. Must not be awaited from that callback.
    /// Returns immediately if `sid` was already removed by another caller.
    pub async fn unsubscribe_and_wait(&self, sid: u64) -> Result<()> {
        let Some(subscription) = self.inner.registry.lookup(sid) else {
            return Ok(());
        };
        self.unsubscribe(sid).await?;
        subscription.wait_closed().await;
        Ok(())
    }

    /// Publish `payload` on `subject` and wait up to `timeout` for the first reply.
    ///
    /// Later replies to the same inbox are discarded. The inbox subscription is
    /// removed before this returns, whichever way the request ended. Closing
    /// the client while waiting fails the request with `ConnectionClosed`.
    pub async fn request(&self, subject: &str, payload: Bytes, timeout: Duration) -> Result<Message> {
        self.ensure_open()?;
        validate_subject(subject)?;
        let mut pending = PendingRequest::new(self.inner.inbox.next_inbox());
        let sid = self
            .subscribe_with_handler(
                pending.inbox(),
                pending.reply_handler(),
                PendingLimits {
                    msgs: Some(1),
                    bytes: None,
                },
            )
            .await?;

        let published = self
            .publish_request(subject, pending.inbox(), payload)
            .await;
        if let Err(err) = published {
            self.teardown_inbox(sid).await;
            return Err(err);
        }
        let reply = tokio::select! {
            reply = pending.wait(timeout) => reply,
            () = self.closed_signal() => {
                tracing::debug!(subject, "request abandoned: client closed");
                return Err(ClientError::ConnectionClosed);
            }
        };
        self.teardown_inbox(sid).await;

        reply.ok_or_else(|| {
            metrics::counter!("courier_client_request_timeouts_total").increment(1);
            tracing::debug!(
                subject,
                ?timeout,
                inbox = pending.inbox(),
                state = ?pending.state(),
                "request timed out"
            );
            ClientError::RequestTimeout {
                subject: subject.to_string(),
                timeout,
            }
        })
    }

    async fn teardown_inbox(&self, sid: u64) {
        if let Err(err) = self.unsubscribe(sid).await {
            tracing::debug!(sid, error = %err, "inbox unsubscribe failed");
        }
    }

    /// A fresh reply subject, unique for this client.
    pub fn new_inbox(&self) -> String {
        self.inner.inbox.next_inbox()
    }

    pub fn subscription_info(&self, sid: u64) -> Option<SubscriptionInfo> {
        self.inner
            .registry
            .lookup(sid)
            .map(|subscription| subscription.info())
    }

    /// Ids of local subscriptions whose pattern matches `subject`, in id order.
    pub fn matching_subscriptions(&self, subject: &str) -> Vec<u64> {
        self.inner
            .registry
            .match_subject(subject)
            .iter()
            .map(|subscription| subscription.id())
            .collect()
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn stats(&self) -> ClientStats {
        self.inner.counters.snapshot()
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Resolves once `close` has run.
    async fn closed_signal(&self) {
        let mut closed = self.inner.closed.subscribe();
        let signalled = closed.wait_for(|closed| *closed).await.is_ok();
        if !signalled {
            std::future::pending::<()>().await;
        }
    }

    /// Remove every subscription and close the transport. Idempotent.
    ///
    /// Subscriptions drain their queues in the background; callbacks already
    /// running are allowed to finish.
    pub async fn close(&self) {
        if self.inner.closed.send_replace(true) {
            return;
        }
        let removed = self.inner.registry.remove_all();
        if let Err(err) = self.inner.transport.close().await {
            tracing::warn!(error = %err, "transport close failed");
        }
        tracing::debug!(subscriptions = removed.len(), "client closed");
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(())
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.registry.remove_all();
    }
}
