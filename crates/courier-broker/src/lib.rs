// In-process message server that routes published subjects to subscribed connections.
// The route table is mutated only on subscribe/unsubscribe; the publish hot path
// reads an immutable snapshot so it never waits behind a writer.
use arc_swap::ArcSwap;
use bytes::Bytes;
use courier_common::{Message, SubjectError, subject_matches, validate_pattern, validate_subject};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub type Result<T> = std::result::Result<T, BrokerError>;

#[derive(thiserror::Error, Debug)]
pub enum BrokerError {
    #[error(transparent)]
    InvalidSubject(#[from] SubjectError),
    #[error("connection not attached: {0}")]
    UnknownConnection(ConnectionId),
}

/// Receiver side of an attached connection.
///
/// `deliver` is called synchronously from `Broker::publish` and must not block.
pub trait InboundSink: Send + Sync {
    fn deliver(&self, message: Message);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Clone)]
struct Route {
    conn: ConnectionId,
    subscription_id: u64,
    pattern: Arc<str>,
    sink: Arc<dyn InboundSink>,
}

#[derive(Default)]
struct RouteTable {
    connections: HashMap<ConnectionId, Arc<dyn InboundSink>>,
    // (connection, sid) -> pattern
    routes: HashMap<(ConnectionId, u64), Arc<str>>,
}

/// In-process broker for subject-based pub/sub.
///
/// ```
/// use bytes::Bytes;
/// use courier_broker::{Broker, InboundSink};
/// use courier_common::Message;
/// use parking_lot::Mutex;
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct Collect(Mutex<Vec<Message>>);
///
/// impl InboundSink for Collect {
///     fn deliver(&self, message: Message) {
///         self.0.lock().push(message);
///     }
/// }
///
/// let broker = Broker::new();
/// let sink = Arc::new(Collect::default());
/// let conn = broker.attach(sink.clone());
/// broker.subscribe(conn, 1, "orders.>").expect("subscribe");
/// let routed = broker
///     .publish("orders.created", None, Bytes::from_static(b"hello"))
///     .expect("publish");
/// assert_eq!(routed, 1);
/// assert_eq!(sink.0.lock()[0].subscription_id(), 1);
/// ```
pub struct Broker {
    // Snapshot used by publish: lock-free read, rebuilt on mutation.
    snapshot: ArcSwap<Vec<Route>>,
    table: Mutex<RouteTable>,
    next_connection: AtomicU64,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("routes", &self.snapshot.load().len())
            .finish()
    }
}

impl Broker {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Vec::new()),
            table: Mutex::new(RouteTable::default()),
            next_connection: AtomicU64::new(1),
        }
    }

    pub fn attach(&self, sink: Arc<dyn InboundSink>) -> ConnectionId {
        let conn = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed));
        self.table.lock().connections.insert(conn, sink);
        tracing::debug!(%conn, "connection attached");
        conn
    }

    /// Remove a connection and every route it owns.
    pub fn detach(&self, conn: ConnectionId) -> bool {
        let mut table = self.table.lock();
        let attached = table.connections.remove(&conn).is_some();
        table.routes.retain(|(owner, _), _| *owner != conn);
        self.rebuild_snapshot(&table);
        tracing::debug!(%conn, attached, "connection detached");
        attached
    }

    pub fn subscribe(&self, conn: ConnectionId, subscription_id: u64, pattern: &str) -> Result<()> {
        validate_pattern(pattern)?;
        let mut table = self.table.lock();
        if !table.connections.contains_key(&conn) {
            return Err(BrokerError::UnknownConnection(conn));
        }
        table
            .routes
            .insert((conn, subscription_id), Arc::from(pattern));
        self.rebuild_snapshot(&table);
        Ok(())
    }

    /// Unsubscribing an unknown sid is a no-op.
    pub fn unsubscribe(&self, conn: ConnectionId, subscription_id: u64) -> bool {
        let mut table = self.table.lock();
        let removed = table.routes.remove(&(conn, subscription_id)).is_some();
        if removed {
            self.rebuild_snapshot(&table);
        }
        removed
    }

    /// Route a message to every matching subscription; returns the delivery count.
    pub fn publish(&self, subject: &str, reply: Option<&str>, payload: Bytes) -> Result<usize> {
        validate_subject(subject)?;
        let routes = self.snapshot.load();
        let mut template: Option<Message> = None;
        let mut delivered = 0usize;
        for route in routes
            .iter()
            .filter(|route| subject_matches(&route.pattern, subject))
        {
            let message = match &template {
                Some(message) => message.with_subscription_id(route.subscription_id),
                None => {
                    let message =
                        Message::new(route.subscription_id, subject, reply, payload.clone());
                    template = Some(message.clone());
                    message
                }
            };
            tracing::trace!(conn = %route.conn, sid = route.subscription_id, subject, "routing message");
            route.sink.deliver(message);
            delivered += 1;
        }
        metrics::counter!("courier_broker_routed_total").increment(delivered as u64);
        Ok(delivered)
    }

    pub fn route_count(&self) -> usize {
        self.snapshot.load().len()
    }

    fn rebuild_snapshot(&self, table: &RouteTable) {
        let mut routes: Vec<Route> = table
            .routes
            .iter()
            .filter_map(|((conn, sid), pattern)| {
                table.connections.get(conn).map(|sink| Route {
                    conn: *conn,
                    subscription_id: *sid,
                    pattern: Arc::clone(pattern),
                    sink: Arc::clone(sink),
                })
            })
            .collect();
        // Stable fan-out order: by connection, then subscription id.
        routes.sort_by_key(|route| (route.conn.0, route.subscription_id));
        self.snapshot.store(Arc::new(routes));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collect(Mutex<Vec<Message>>);

    impl InboundSink for Collect {
        fn deliver(&self, message: Message) {
            self.0.lock().push(message);
        }
    }

    impl Collect {
        fn sids(&self) -> Vec<u64> {
            self.0.lock().iter().map(Message::subscription_id).collect()
        }
    }

    #[test]
    fn publish_fans_out_to_every_matching_route() {
        let broker = Broker::new();
        let sink = Arc::new(Collect::default());
        let conn = broker.attach(sink.clone());
        broker.subscribe(conn, 1, "foo").expect("subscribe");
        broker.subscribe(conn, 2, "foo.*").expect("subscribe");
        broker.subscribe(conn, 3, ">").expect("subscribe");

        let routed = broker
            .publish("foo", Some("reply.to"), Bytes::from_static(b"x"))
            .expect("publish");
        assert_eq!(routed, 2);
        assert_eq!(sink.sids(), vec![1, 3]);
        let messages = sink.0.lock();
        assert!(messages.iter().all(|m| m.reply() == Some("reply.to")));
        assert!(messages.iter().all(|m| m.subject() == "foo"));
    }

    #[test]
    fn unmatched_subject_routes_nowhere() {
        let broker = Broker::new();
        let sink = Arc::new(Collect::default());
        let conn = broker.attach(sink.clone());
        broker.subscribe(conn, 1, "bar").expect("subscribe");
        let routed = broker
            .publish("foo", None, Bytes::from_static(b"x"))
            .expect("publish");
        assert_eq!(routed, 0);
        assert!(sink.sids().is_empty());
    }

    #[test]
    fn unsubscribe_removes_route_and_is_idempotent() {
        let broker = Broker::new();
        let sink = Arc::new(Collect::default());
        let conn = broker.attach(sink.clone());
        broker.subscribe(conn, 1, "foo").expect("subscribe");
        assert_eq!(broker.route_count(), 1);
        assert!(broker.unsubscribe(conn, 1));
        assert!(!broker.unsubscribe(conn, 1));
        assert_eq!(broker.route_count(), 0);
        broker
            .publish("foo", None, Bytes::from_static(b"x"))
            .expect("publish");
        assert!(sink.sids().is_empty());
    }

    #[test]
    fn detach_drops_all_routes_for_connection() {
        let broker = Broker::new();
        let first = Arc::new(Collect::default());
        let second = Arc::new(Collect::default());
        let a = broker.attach(first.clone());
        let b = broker.attach(second.clone());
        broker.subscribe(a, 1, "foo").expect("subscribe");
        broker.subscribe(b, 1, "foo").expect("subscribe");
        assert!(broker.detach(a));
        assert!(!broker.detach(a));
        broker
            .publish("foo", None, Bytes::from_static(b"x"))
            .expect("publish");
        assert!(first.sids().is_empty());
        assert_eq!(second.sids(), vec![1]);
    }

    #[test]
    fn subscribe_requires_attached_connection() {
        let broker = Broker::new();
        let sink = Arc::new(Collect::default());
        let conn = broker.attach(sink);
        broker.detach(conn);
        let err = broker.subscribe(conn, 1, "foo").expect_err("detached");
        assert!(matches!(err, BrokerError::UnknownConnection(_)));
    }

    #[test]
    fn invalid_subjects_are_rejected() {
        let broker = Broker::new();
        let sink = Arc::new(Collect::default());
        let conn = broker.attach(sink);
        assert!(matches!(
            broker.subscribe(conn, 1, "foo.>.bar"),
            Err(BrokerError::InvalidSubject(_))
        ));
        assert!(matches!(
            broker.publish("foo.*", None, Bytes::new()),
            Err(BrokerError::InvalidSubject(_))
        ));
    }

    #[test]
    fn broker_error_display() {
        let err = BrokerError::UnknownConnection(ConnectionId(4));
        assert!(err.to_string().contains("conn-4"));
        let err = BrokerError::from(SubjectError::Empty);
        assert!(err.to_string().contains("empty"));
    }
}
