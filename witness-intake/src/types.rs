//! Type definitions shared by the draft store, field crypto and submission pipeline

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Value of a single named form field
///
/// Multi-value controls (checkbox groups, multi-selects) hold an ordered list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Single(String),
    Multiple(Vec<String>),
}

impl FieldValue {
    /// True when the field carries nothing worth transmitting
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Single(value) => value.is_empty(),
            FieldValue::Multiple(values) => values.is_empty(),
        }
    }

    /// True when the value equals `candidate` or, for lists, contains it
    pub fn contains(&self, candidate: &str) -> bool {
        match self {
            FieldValue::Single(value) => value == candidate,
            FieldValue::Multiple(values) => values.iter().any(|v| v == candidate),
        }
    }

    /// Single value, or `None` for multi-value fields
    pub fn as_single(&self) -> Option<&str> {
        match self {
            FieldValue::Single(value) => Some(value),
            FieldValue::Multiple(_) => None,
        }
    }

    /// Text handed to the encryption layer: strings as-is, lists as JSON
    pub fn to_plaintext(&self) -> Result<String, serde_json::Error> {
        match self {
            FieldValue::Single(value) => Ok(value.clone()),
            FieldValue::Multiple(values) => serde_json::to_string(values),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Single(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Single(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(values: Vec<String>) -> Self {
        FieldValue::Multiple(values)
    }
}

/// Field name -> value(s) for every named field present at snapshot time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormSnapshot(BTreeMap<String, FieldValue>);

impl FormSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from raw `(name, value)` entries.
    ///
    /// A repeated name turns into a list, in entry order.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut snapshot = Self::new();
        for (name, value) in entries {
            snapshot.push(name.into(), value.into());
        }
        snapshot
    }

    /// Append one raw entry, promoting the field to a list on repetition
    pub fn push(&mut self, name: String, value: String) {
        match self.0.remove(&name) {
            None => {
                self.0.insert(name, FieldValue::Single(value));
            }
            Some(FieldValue::Single(first)) => {
                self.0.insert(name, FieldValue::Multiple(vec![first, value]));
            }
            Some(FieldValue::Multiple(mut values)) => {
                values.push(value);
                self.0.insert(name, FieldValue::Multiple(values));
            }
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.0.remove(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for FormSnapshot {
    type Item = (String, FieldValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Listing entry for an attached file (never the content)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub name: String,
    pub size: u64,
    /// Declared MIME type
    #[serde(rename = "type")]
    pub mime_type: String,
}

/// Autosaved draft as stored in the local slot
///
/// Wire form: `{ "data": {...}, "timestamp": "<ISO-8601>", "files": [...] }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftRecord {
    #[serde(rename = "data")]
    pub snapshot: FormSnapshot,
    #[serde(rename = "timestamp")]
    pub captured_at: DateTime<Utc>,
    #[serde(rename = "files", default)]
    pub attached_file_meta: Vec<FileMeta>,
}

/// Client-generated acknowledgment token for one submission attempt
///
/// Derived from time and randomness; not a server-trusted identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(String);

impl ReportId {
    /// `WC-<base36 millis>-<9 random base36 chars>`, uppercased
    pub fn generate(now: DateTime<Utc>) -> Self {
        const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

        let millis = u64::try_from(now.timestamp_millis()).unwrap_or_default();
        let mut rng = rand::thread_rng();
        let random: String = (0..9)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();

        ReportId(format!("WC-{}-{}", to_base36(millis), random).to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Metadata sent in the clear alongside every submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadMetadata {
    /// ISO 8601 timestamp of collection
    pub timestamp: DateTime<Utc>,
    pub report_id: ReportId,
    pub client_timezone: String,
    /// Identifier of the recipient public key used for `encryptedFields`
    pub key_id: String,
    pub client_agent: String,
}

/// Body of the single POST to the intake endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    /// Non-sensitive fields, never containing a sensitive key
    pub plaintext_fields: BTreeMap<String, FieldValue>,
    /// Sensitive field name -> base64 EC01 blob
    pub encrypted_fields: BTreeMap<String, String>,
    pub metadata: PayloadMetadata,
}

/// Result of a successful submission
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReceipt {
    pub report_id: ReportId,
    /// JSON body returned by the endpoint
    pub response: serde_json::Value,
}
