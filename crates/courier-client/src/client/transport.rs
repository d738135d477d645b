// Connection seam between the client core and whatever carries its frames.
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::client::dispatcher::Dispatcher;

/// Outbound half of a connection.
///
/// Implementations encode and send; inbound traffic is handed to the
/// [`Dispatcher`] given to [`Connect::connect`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_publish(&self, subject: &str, reply: Option<&str>, payload: Bytes)
    -> Result<()>;

    /// Register interest in `pattern`; inbound messages carry `subscription_id`.
    async fn send_subscribe(&self, pattern: &str, subscription_id: u64) -> Result<()>;

    async fn send_unsubscribe(&self, subscription_id: u64) -> Result<()>;

    /// Tear the connection down. Later sends may fail.
    async fn close(&self) -> Result<()>;
}

/// Establishes a [`Transport`] that feeds inbound messages to `dispatcher`.
#[async_trait]
pub trait Connect: Send + Sync {
    async fn connect(&self, dispatcher: Arc<Dispatcher>) -> Result<Arc<dyn Transport>>;
}
