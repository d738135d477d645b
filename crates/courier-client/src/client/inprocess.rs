// Transport backed by a broker running in this process.
use anyhow::{Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use courier_broker::{Broker, ConnectionId, InboundSink};
use courier_common::Message;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::client::dispatcher::Dispatcher;
use crate::client::transport::{Connect, Transport};

impl InboundSink for Dispatcher {
    fn deliver(&self, message: Message) {
        self.on_inbound_message(message);
    }
}

/// Connects clients to a shared in-process [`Broker`].
///
/// ```
/// use courier_broker::Broker;
/// use courier_client::{Client, ClientConfig, InProcessConnector};
/// use std::sync::Arc;
///
/// let broker = Arc::new(Broker::new());
/// let rt = tokio::runtime::Runtime::new().expect("rt");
/// rt.block_on(async {
///     let client = Client::connect(
///         &InProcessConnector::new(broker.clone()),
///         ClientConfig::optimized_defaults(),
///     )
///     .await
///     .expect("connect");
///     let sid = client
///         .subscribe("updates", |_msg| async { Ok(()) }, Default::default())
///         .await
///         .expect("subscribe");
///     assert_eq!(sid, 1);
///     assert_eq!(broker.route_count(), 1);
///     client.close().await;
///     assert_eq!(broker.route_count(), 0);
/// });
/// ```
#[derive(Clone)]
pub struct InProcessConnector {
    broker: Arc<Broker>,
}

impl InProcessConnector {
    pub fn new(broker: Arc<Broker>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl Connect for InProcessConnector {
    async fn connect(&self, dispatcher: Arc<Dispatcher>) -> Result<Arc<dyn Transport>> {
        let conn = self.broker.attach(dispatcher);
        tracing::debug!(%conn, "attached to in-process broker");
        Ok(Arc::new(InProcessTransport {
            broker: Arc::clone(&self.broker),
            conn,
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct InProcessTransport {
    broker: Arc<Broker>,
    conn: ConnectionId,
    closed: AtomicBool,
}

impl InProcessTransport {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            bail!("connection {} is closed", self.conn);
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn send_publish(
        &self,
        subject: &str,
        reply: Option<&str>,
        payload: Bytes,
    ) -> Result<()> {
        self.ensure_open()?;
        self.broker.publish(subject, reply, payload)?;
        Ok(())
    }

    async fn send_subscribe(&self, pattern: &str, subscription_id: u64) -> Result<()> {
        self.ensure_open()?;
        self.broker.subscribe(self.conn, subscription_id, pattern)?;
        Ok(())
    }

    async fn send_unsubscribe(&self, subscription_id: u64) -> Result<()> {
        self.ensure_open()?;
        self.broker.unsubscribe(self.conn, subscription_id);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.broker.detach(self.conn);
            tracing::debug!(conn = %self.conn, "detached from in-process broker");
        }
        Ok(())
    }
}

impl Drop for InProcessTransport {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.broker.detach(self.conn);
        }
    }
}
