//! Request/reply correlation.
//!
//! # Purpose
//! Tracks one outstanding request: its inbox subject and the single-assignment
//! slot that either the first reply or the timeout fills.
//!
//! # Design notes
//! The slot moves `Pending -> Resolved` or `Pending -> TimedOut` exactly once
//! under its mutex; whichever side loses finds the slot already settled and
//! does nothing. The reply travels over a oneshot so the waiter never polls.
use courier_common::Message;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::client::subscription::{MessageHandler, message_handler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestState {
    Pending,
    Resolved,
    TimedOut,
}

#[derive(Debug)]
enum Slot {
    Pending(oneshot::Sender<Message>),
    Resolved,
    TimedOut,
}

#[derive(Debug, Clone)]
struct ReplySlot(Arc<Mutex<Slot>>);

impl ReplySlot {
    fn resolve(&self, message: Message) -> bool {
        let mut slot = self.0.lock();
        match std::mem::replace(&mut *slot, Slot::Resolved) {
            Slot::Pending(tx) => {
                // The receiver lives until `wait` returns, and `wait` times the
                // slot out before dropping it.
                let _ = tx.send(message);
                true
            }
            settled => {
                *slot = settled;
                false
            }
        }
    }

    fn time_out(&self) -> bool {
        let mut slot = self.0.lock();
        if matches!(*slot, Slot::Pending(_)) {
            *slot = Slot::TimedOut;
            true
        } else {
            false
        }
    }

    fn state(&self) -> RequestState {
        match *self.0.lock() {
            Slot::Pending(_) => RequestState::Pending,
            Slot::Resolved => RequestState::Resolved,
            Slot::TimedOut => RequestState::TimedOut,
        }
    }
}

pub(crate) struct PendingRequest {
    inbox: String,
    slot: ReplySlot,
    rx: oneshot::Receiver<Message>,
}

impl PendingRequest {
    pub(crate) fn new(inbox: String) -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            inbox,
            slot: ReplySlot(Arc::new(Mutex::new(Slot::Pending(tx)))),
            rx,
        }
    }

    pub(crate) fn inbox(&self) -> &str {
        &self.inbox
    }

    pub(crate) fn state(&self) -> RequestState {
        self.slot.state()
    }

    /// Callback for the inbox subscription. Only the first reply settles the slot.
    pub(crate) fn reply_handler(&self) -> MessageHandler {
        let slot = self.slot.clone();
        message_handler(move |message: Message| {
            let slot = slot.clone();
            async move {
                if !slot.resolve(message) {
                    tracing::trace!("late reply discarded");
                }
                Ok(())
            }
        })
    }

    /// Wait up to `timeout` for the reply. `None` means the timer won.
    pub(crate) async fn wait(&mut self, timeout: Duration) -> Option<Message> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(reply) => reply.ok(),
            Err(_) if self.slot.time_out() => None,
            // A reply settled the slot between the timer firing and `time_out`.
            Err(_) => self.rx.try_recv().ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn reply(payload: &'static [u8]) -> Message {
        Message::new(1, "_INBOX.test.1", None, Bytes::from_static(payload))
    }

    #[tokio::test(start_paused = true)]
    async fn first_reply_wins() {
        let mut request = PendingRequest::new("_INBOX.test.1".to_string());
        let handler = request.reply_handler();
        handler(reply(b"first")).await.expect("handler");
        handler(reply(b"second")).await.expect("handler");
        assert_eq!(request.state(), RequestState::Resolved);

        let message = request
            .wait(Duration::from_secs(1))
            .await
            .expect("resolved");
        assert_eq!(message.payload().as_ref(), b"first");
        assert_eq!(request.state(), RequestState::Resolved);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_wins_without_reply() {
        let mut request = PendingRequest::new("_INBOX.test.1".to_string());
        assert_eq!(request.inbox(), "_INBOX.test.1");
        let handler = request.reply_handler();
        assert!(request.wait(Duration::from_millis(50)).await.is_none());
        assert_eq!(request.state(), RequestState::TimedOut);

        // A reply arriving after the timeout is a no-op.
        handler(reply(b"late")).await.expect("handler");
        assert_eq!(request.state(), RequestState::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn reply_before_deadline_resolves() {
        let mut request = PendingRequest::new("_INBOX.test.1".to_string());
        let handler = request.reply_handler();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handler(reply(b"pong")).await
        });
        let message = request
            .wait(Duration::from_millis(100))
            .await
            .expect("resolved");
        assert_eq!(message.payload().as_ref(), b"pong");
    }
}
