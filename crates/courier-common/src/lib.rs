// Shared data types and small helpers used across crates.
use bytes::Bytes;
use std::sync::Arc;

pub mod subject;

pub use subject::{SubjectError, subject_matches, validate_pattern, validate_subject};

/// A message delivered to a subscription.
///
/// Messages are immutable once built; subjects are reference counted and the
/// payload is a `Bytes`, so cloning one to hand it across tasks is cheap.
///
/// ```
/// use bytes::Bytes;
/// use courier_common::Message;
///
/// let msg = Message::new(7, "orders.created", Some("_INBOX.abc.1"), Bytes::from_static(b"hi"));
/// assert_eq!(msg.subscription_id(), 7);
/// assert_eq!(msg.reply(), Some("_INBOX.abc.1"));
/// assert_eq!(msg.size(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    subscription_id: u64,
    subject: Arc<str>,
    reply: Option<Arc<str>>,
    payload: Bytes,
}

impl Message {
    pub fn new(
        subscription_id: u64,
        subject: &str,
        reply: Option<&str>,
        payload: Bytes,
    ) -> Self {
        Self {
            subscription_id,
            subject: Arc::from(subject),
            reply: reply.map(Arc::from),
            payload,
        }
    }

    /// Re-address the same subject/reply/payload to another subscription.
    pub fn with_subscription_id(&self, subscription_id: u64) -> Self {
        Self {
            subscription_id,
            subject: Arc::clone(&self.subject),
            reply: self.reply.clone(),
            payload: self.payload.clone(),
        }
    }

    pub fn subscription_id(&self) -> u64 {
        self.subscription_id
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn reply(&self) -> Option<&str> {
        self.reply.as_deref()
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Size counted against pending byte limits.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::Message;
    use bytes::Bytes;

    #[test]
    fn readdressing_keeps_content() {
        let msg = Message::new(1, "foo", None, Bytes::from_static(b"abc"));
        let other = msg.with_subscription_id(9);
        assert_eq!(other.subscription_id(), 9);
        assert_eq!(other.subject(), "foo");
        assert_eq!(other.reply(), None);
        assert_eq!(other.payload(), msg.payload());
    }

    #[test]
    fn size_is_payload_length() {
        let msg = Message::new(1, "foo", Some("bar"), Bytes::from_static(b"AAA0"));
        assert_eq!(msg.size(), 4);
        assert_eq!(msg.into_payload(), Bytes::from_static(b"AAA0"));
    }
}
