//! Single-slot mailboxes keyed by client name.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

/// Holds at most one pending message per client name.
///
/// Writing overwrites any unread message. Entries are not tied to sessions:
/// a message may be queued for a name that is not connected.
#[derive(Default)]
pub struct MailboxStore {
    slots: Mutex<HashMap<String, Value>>,
}

impl MailboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `message` for `name`. Returns `true` if an unread message was replaced.
    pub fn put(&self, name: &str, message: Value) -> bool {
        self.slots.lock().insert(name.to_string(), message).is_some()
    }

    /// Read and clear the slot for `name`.
    pub fn take(&self, name: &str) -> Option<Value> {
        self.slots.lock().remove(name)
    }

    /// Drop any pending message for `name`.
    pub fn clear(&self, name: &str) -> bool {
        self.slots.lock().remove(name).is_some()
    }

    /// Number of names with a pending message.
    pub fn pending(&self) -> usize {
        self.slots.lock().len()
    }
}
