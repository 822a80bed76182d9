//! Secure incident report intake
//!
//! Draft persistence, field-level encryption of sensitive answers, and a
//! single-flight submission pipeline. The live form and the accessibility
//! announcer are collaborators supplied by the host.

pub mod attachments;
pub mod config;
pub mod context;
pub mod crypto;
pub mod disclosure;
pub mod draft;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod transport;
pub mod types;
pub mod validation;

pub use attachments::{Attachment, AttachmentPolicy, AttachmentSet};
pub use config::IntakeConfig;
pub use context::IntakeContext;
pub use crypto::{FieldCrypto, KeySource, SENSITIVE_FIELDS};
pub use draft::{DraftStore, FileStore, KeyValueStore, MemoryStore};
pub use error::{
    CryptoError, FieldError, IntakeError, PersistenceError, SubmitError, TransmissionError,
    ValidationError,
};
pub use pipeline::{SubmissionPipeline, SubmissionState};
pub use session::{Announcer, FormSession, MemoryForm, RecordingAnnouncer, TracingAnnouncer};
pub use transport::{HttpTransport, Transport};
pub use types::{
    DraftRecord, FieldValue, FileMeta, FormSnapshot, PayloadMetadata, ReportId,
    SubmissionPayload, SubmissionReceipt,
};
pub use validation::FormRules;
