//! Deferred notification messages
//!
//! Messages queued during a unit of work are delivered at commit, and only
//! into recipient queues that are live at that moment (a non-empty liveness
//! sorted set). Payloads are serialized at delivery time, so a message for a
//! queue nobody reads never costs a serialization.

use serde::Serialize;
use velostore_core::RecordId;

/// Where recipient queues live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRouting {
    /// Partition holding queues and liveness sets
    pub partition: usize,
    /// Class whose per-recipient lock guards queue delivery
    pub lock_class: &'static str,
    /// Prefix of the list each message is pushed onto
    pub queue_prefix: &'static str,
    /// Prefix of the sorted set whose cardinality marks a live queue
    pub liveness_prefix: &'static str,
}

impl Default for MessageRouting {
    fn default() -> Self {
        Self {
            partition: 0,
            lock_class: "MessageQueue",
            queue_prefix: "notification_queue:",
            liveness_prefix: "notification_session_queue_offset:",
        }
    }
}

impl MessageRouting {
    /// List key of a recipient's queue
    pub fn queue_key(&self, recipient: RecordId) -> String {
        format!("{}{}", self.queue_prefix, recipient)
    }

    /// Liveness key of a recipient's queue
    pub fn liveness_key(&self, recipient: RecordId) -> String {
        format!("{}{}", self.liveness_prefix, recipient)
    }
}

/// Payload serialized on delivery
pub trait MessagePayload: Send {
    /// JSON form
    fn to_json(&self) -> serde_json::Result<String>;
}

impl<T: Serialize + Send> MessagePayload for T {
    fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// A message waiting for commit
pub(crate) struct QueuedMessage {
    pub(crate) recipient: RecordId,
    pub(crate) payload: Box<dyn MessagePayload>,
}
