// Client-side modules: delivery queues, subscriptions, dispatch, request/reply and transports.
#![allow(clippy::module_inception)]
pub mod client;
pub mod dispatcher;
pub(crate) mod inbox;
pub mod inprocess;
pub mod queue;
pub(crate) mod registry;
pub mod reporter;
pub(crate) mod request;
pub mod subscription;
pub mod transport;
