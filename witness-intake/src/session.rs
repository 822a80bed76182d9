//! Collaborators at the edge of the core: the live form and the announcer

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use tracing::info;

use crate::attachments::AttachmentSet;
use crate::types::{FieldValue, FormSnapshot};

/// Live form state owned by the host (DOM, TUI, test double, ...)
pub trait FormSession {
    /// Names of fields currently carrying a value
    fn field_names(&self) -> Vec<String>;

    fn value(&self, name: &str) -> Option<FieldValue>;

    /// Write a value back (draft restoration)
    fn set_value(&mut self, name: &str, value: FieldValue);

    fn clear_value(&mut self, name: &str);

    fn set_visible(&mut self, name: &str, visible: bool);

    fn attachments(&self) -> &AttachmentSet;

    fn attachments_mut(&mut self) -> &mut AttachmentSet;

    /// Empty every field and drop attachments
    fn reset(&mut self);

    /// Current values of every named field
    fn snapshot(&self) -> FormSnapshot {
        let mut snapshot = FormSnapshot::new();
        for name in self.field_names() {
            if let Some(value) = self.value(&name) {
                snapshot.insert(name, value);
            }
        }
        snapshot
    }
}

/// Plain-text, fire-and-forget status messages (screen reader live region)
pub trait Announcer: Send + Sync {
    fn announce(&self, message: &str);
}

/// Announcer that writes to the log
#[derive(Debug, Default)]
pub struct TracingAnnouncer;

impl Announcer for TracingAnnouncer {
    fn announce(&self, message: &str) {
        info!(target: "witness_intake::announce", "{}", message);
    }
}

/// Announcer that keeps every message, in order
#[derive(Debug, Default)]
pub struct RecordingAnnouncer {
    messages: Mutex<Vec<String>>,
}

impl RecordingAnnouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }
}

impl Announcer for RecordingAnnouncer {
    fn announce(&self, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }
    }
}

/// In-memory form, used by the binary and in tests
#[derive(Debug, Clone, Default)]
pub struct MemoryForm {
    values: BTreeMap<String, FieldValue>,
    hidden: BTreeSet<String>,
    attachments: AttachmentSet,
}

impl MemoryForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: FormSnapshot) -> Self {
        Self {
            values: snapshot.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_value(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    pub fn is_visible(&self, name: &str) -> bool {
        !self.hidden.contains(name)
    }
}

impl FormSession for MemoryForm {
    fn field_names(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    fn value(&self, name: &str) -> Option<FieldValue> {
        self.values.get(name).cloned()
    }

    fn set_value(&mut self, name: &str, value: FieldValue) {
        self.values.insert(name.to_string(), value);
    }

    fn clear_value(&mut self, name: &str) {
        self.values.remove(name);
    }

    fn set_visible(&mut self, name: &str, visible: bool) {
        if visible {
            self.hidden.remove(name);
        } else {
            self.hidden.insert(name.to_string());
        }
    }

    fn attachments(&self) -> &AttachmentSet {
        &self.attachments
    }

    fn attachments_mut(&mut self) -> &mut AttachmentSet {
        &mut self.attachments
    }

    fn reset(&mut self) {
        self.values.clear();
        self.attachments.clear();
    }
}
