// Client error kinds, both returned from calls and reported asynchronously.
use courier_common::SubjectError;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// A message was dropped because the subscription's pending limits were reached.
    #[error("slow consumer: message dropped for subscription {subscription_id}")]
    SlowConsumer { subscription_id: u64 },
    #[error("request on {subject} timed out after {timeout:?}")]
    RequestTimeout { subject: String, timeout: Duration },
    /// A subscription callback returned an error or panicked.
    #[error("callback for subscription {subscription_id} failed on {subject}: {reason}")]
    CallbackFailure {
        subscription_id: u64,
        subject: String,
        reason: String,
    },
    #[error(transparent)]
    InvalidSubject(#[from] SubjectError),
    #[error("connection closed")]
    ConnectionClosed,
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SlowConsumer,
    RequestTimeout,
    CallbackFailure,
    InvalidSubject,
    ConnectionClosed,
    Transport,
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::SlowConsumer { .. } => ErrorKind::SlowConsumer,
            ClientError::RequestTimeout { .. } => ErrorKind::RequestTimeout,
            ClientError::CallbackFailure { .. } => ErrorKind::CallbackFailure,
            ClientError::InvalidSubject(_) => ErrorKind::InvalidSubject,
            ClientError::ConnectionClosed => ErrorKind::ConnectionClosed,
            ClientError::Transport(_) => ErrorKind::Transport,
        }
    }

    /// The subscription an asynchronous error is tagged with, if any.
    pub fn subscription_id(&self) -> Option<u64> {
        match self {
            ClientError::SlowConsumer { subscription_id }
            | ClientError::CallbackFailure {
                subscription_id, ..
            } => Some(*subscription_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_and_subscription_tags() {
        let err = ClientError::SlowConsumer { subscription_id: 3 };
        assert_eq!(err.kind(), ErrorKind::SlowConsumer);
        assert_eq!(err.subscription_id(), Some(3));

        let err = ClientError::CallbackFailure {
            subscription_id: 5,
            subject: "foo".to_string(),
            reason: "boom".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::CallbackFailure);
        assert_eq!(err.subscription_id(), Some(5));

        let err = ClientError::RequestTimeout {
            subject: "foo".to_string(),
            timeout: Duration::from_millis(100),
        };
        assert_eq!(err.kind(), ErrorKind::RequestTimeout);
        assert_eq!(err.subscription_id(), None);

        assert_eq!(
            ClientError::from(SubjectError::Empty).kind(),
            ErrorKind::InvalidSubject
        );
        assert_eq!(
            ClientError::from(anyhow::anyhow!("down")).kind(),
            ErrorKind::Transport
        );
    }

    #[test]
    fn client_error_display() {
        let err = ClientError::SlowConsumer { subscription_id: 1 };
        assert!(err.to_string().contains("subscription 1"));

        let err = ClientError::RequestTimeout {
            subject: "svc.echo".to_string(),
            timeout: Duration::from_millis(100),
        };
        assert!(err.to_string().contains("svc.echo"));
        assert!(err.to_string().contains("100ms"));

        let err = ClientError::CallbackFailure {
            subscription_id: 2,
            subject: "foo".to_string(),
            reason: "boom".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("2"));
        assert!(rendered.contains("foo"));
        assert!(rendered.contains("boom"));

        assert_eq!(ClientError::ConnectionClosed.to_string(), "connection closed");
        let err = ClientError::from(anyhow::anyhow!("socket reset"));
        assert_eq!(err.to_string(), "socket reset");
    }
}
