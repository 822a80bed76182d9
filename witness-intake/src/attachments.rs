//! Evidence attachments held in memory for the current session

use tracing::debug;

use crate::config::{ALLOWED_FILE_TYPES, MAX_FILE_SIZE};
use crate::types::FileMeta;

/// Admission rules applied before a file joins the set
#[derive(Debug, Clone)]
pub struct AttachmentPolicy {
    pub max_file_size: u64,
    pub allowed_types: Vec<String>,
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
            allowed_types: ALLOWED_FILE_TYPES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl AttachmentPolicy {
    /// Why `file` is refused, or `None` if it is admissible
    pub fn check(&self, file: &Attachment) -> Option<String> {
        if !self.allowed_types.iter().any(|t| t == &file.mime_type) {
            return Some(format!("{}: File type not allowed", file.name));
        }
        if file.size() > self.max_file_size {
            return Some(format!(
                "{}: File too large (max {})",
                file.name,
                format_file_size(self.max_file_size).replace(' ', "")
            ));
        }
        None
    }
}

/// In-memory file handle; content is never persisted
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            content,
        }
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn meta(&self) -> FileMeta {
        FileMeta {
            name: self.name.clone(),
            size: self.size(),
            mime_type: self.mime_type.clone(),
        }
    }
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("size", &self.size())
            .finish()
    }
}

/// Ordered set of admitted files
#[derive(Debug, Clone, Default)]
pub struct AttachmentSet {
    files: Vec<Attachment>,
}

impl AttachmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every admissible file; returns one message per rejected file
    pub fn admit(
        &mut self,
        policy: &AttachmentPolicy,
        files: impl IntoIterator<Item = Attachment>,
    ) -> Vec<String> {
        let mut rejections = Vec::new();
        for file in files {
            match policy.check(&file) {
                Some(reason) => rejections.push(reason),
                None => {
                    debug!("Attached {} ({})", file.name, format_file_size(file.size()));
                    self.files.push(file);
                }
            }
        }
        rejections
    }

    pub fn remove(&mut self, index: usize) -> Option<Attachment> {
        (index < self.files.len()).then(|| self.files.remove(index))
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn metadata(&self) -> Vec<FileMeta> {
        self.files.iter().map(Attachment::meta).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attachment> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Human-readable size: `0 Bytes`, `1.5 KB`, `10 MB`
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}
