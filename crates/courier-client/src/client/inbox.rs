// Unique reply subjects for request/reply.
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::sync::atomic::{AtomicU64, Ordering};

const INBOX_TOKEN_LEN: usize = 22;

/// Generates `{prefix}.{token}.{n}` subjects. The token is random per
/// generator and `n` counts up from 1, so inboxes never repeat within a client.
#[derive(Debug)]
pub(crate) struct InboxGenerator {
    base: String,
    counter: AtomicU64,
}

impl InboxGenerator {
    pub(crate) fn new(prefix: &str) -> Self {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(INBOX_TOKEN_LEN)
            .map(char::from)
            .collect();
        Self {
            base: format!("{prefix}.{token}"),
            counter: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_inbox(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}.{n}", self.base)
    }
}
