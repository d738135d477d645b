// Subject-based pub/sub and request/reply client.
//
// CLIENT-SIDE DISPATCH MODEL
// --------------------------
// Inbound messages arrive on one connection but are consumed by many
// subscriptions. The dispatcher never waits: it resolves the subscription id a
// message carries, checks that subscription's pending limits and either
// enqueues or drops (reporting a slow consumer). Every subscription has its
// own bounded queue and its own dispatch task, so a callback that sleeps or
// publishes delays only its own subscription.
//
// Asynchronous faults (slow consumers, failing callbacks) never surface as
// errors of the call that triggered them. They flow through one bounded error
// channel to the handler given at connect time.
//
// The wire transport is pluggable through `Transport`/`Connect`; the
// in-process connector binds a client to a `courier_broker::Broker`.
pub mod client;
pub mod config;
pub mod counters;
pub mod error;

pub use client::client::Client;
pub use client::dispatcher::{DispatchOutcome, Dispatcher};
pub use client::inprocess::{InProcessConnector, InProcessTransport};
pub use client::queue::PendingLimits;
pub use client::reporter::{ErrorHandler, error_handler};
pub use client::subscription::{SubscribeOptions, SubscriptionInfo, SubscriptionStatus};
pub use client::transport::{Connect, Transport};
pub use config::ClientConfig;
pub use counters::ClientStats;
pub use courier_common::Message;
pub use error::{ClientError, ErrorKind, Result};
