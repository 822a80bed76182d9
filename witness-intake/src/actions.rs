//! Input/output types for the witness-intake binary

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use witness_intake::{DraftRecord, FieldValue, FormSnapshot, ReportId, SubmissionPayload};

/// Binary input - determines which action to perform
#[derive(Debug, Deserialize)]
#[serde(tag = "action")]
pub enum Input {
    /// SaveDraft: Mirror form values and file listing into the draft slot
    SaveDraft(FormInput),
    /// RestoreDraft: Read back the draft if it is still fresh
    RestoreDraft(EmptyInput),
    /// ClearDraft: Delete the draft
    ClearDraft(EmptyInput),
    /// Submit: Validate, encrypt and send the report
    Submit(FormInput),
    /// GenerateKeyPair: Create a recipient key pair
    GenerateKeyPair(EmptyInput),
    /// DecryptPayload: Open the encrypted fields of a received payload (recipient side)
    DecryptPayload(DecryptPayloadInput),
}

#[derive(Debug, Deserialize)]
pub struct EmptyInput {}

/// Form values plus files to attach
#[derive(Debug, Deserialize)]
pub struct FormInput {
    pub fields: FormSnapshot,
    #[serde(default)]
    pub files: Vec<FileInput>,
}

/// A file on disk offered as evidence
#[derive(Debug, Deserialize)]
pub struct FileInput {
    pub path: PathBuf,
    /// Declared MIME type
    #[serde(rename = "type")]
    pub mime_type: String,
    /// Display name; defaults to the file name of `path`
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecryptPayloadInput {
    pub payload: SubmissionPayload,
}

/// Binary output - union of possible response types
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Output {
    SaveDraft(SaveDraftOutput),
    RestoreDraft(RestoreDraftOutput),
    ClearDraft(ClearDraftOutput),
    Submit(SubmitOutput),
    GenerateKeyPair(GenerateKeyPairOutput),
    DecryptPayload(DecryptPayloadOutput),
}

#[derive(Debug, Serialize)]
pub struct SaveDraftOutput {
    pub success: bool,
    pub saved_fields: usize,
    pub saved_files: usize,
    /// Files refused by the attachment policy
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected_files: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RestoreDraftOutput {
    pub success: bool,
    /// `null` when there is no fresh draft
    pub draft: Option<DraftRecord>,
}

#[derive(Debug, Serialize)]
pub struct ClearDraftOutput {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct SubmitOutput {
    pub success: bool,
    pub report_id: ReportId,
    /// JSON body returned by the intake endpoint
    pub response: serde_json::Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected_files: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateKeyPairOutput {
    pub key_id: String,
    /// Compressed secp256k1 public key, hex (goes into INTAKE_PUBLIC_KEY)
    pub public_key: String,
    /// Secret key, hex (kept by the recipient only)
    pub secret_key: String,
}

#[derive(Debug, Serialize)]
pub struct DecryptPayloadOutput {
    pub report_id: ReportId,
    pub plaintext_fields: BTreeMap<String, FieldValue>,
    pub decrypted_fields: BTreeMap<String, String>,
}

/// Field-scoped validation problem
#[derive(Debug, Serialize)]
pub struct FieldErrorOutput {
    pub field: String,
    pub message: String,
}

/// Error response from the binary
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub field_errors: Vec<FieldErrorOutput>,
}
