//! witness-intake command-line driver
//!
//! Reads one JSON action from stdin and writes one JSON result to stdout:
//! 1. SaveDraft / RestoreDraft / ClearDraft: local draft slot
//! 2. Submit: validate, encrypt sensitive fields, POST to the intake endpoint
//! 3. GenerateKeyPair / DecryptPayload: recipient-side key tooling
//!
//! Logs go to stderr (`RUST_LOG`, default `info`).

mod actions;

use actions::*;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use witness_intake::crypto::{self, generate_key_pair};
use witness_intake::{
    Attachment, FormSession, IntakeConfig, IntakeContext, KeySource, MemoryForm, SubmitError,
    TracingAnnouncer,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Draft directory used when INTAKE_DRAFT_DIR is not set
const DEFAULT_DRAFT_DIR: &str = ".witness-intake";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Load environment variables first so .env RUST_LOG is available to tracing
    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    match process().await {
        Ok(output) => print_json(&output),
        Err(e) => {
            error!("{}", e);
            print_json(&error_response(e.as_ref()));
            std::process::exit(1);
        }
    }
}

/// Failure output; validation problems are listed per field
fn error_response(e: &(dyn std::error::Error + Send + Sync + 'static)) -> ErrorResponse {
    let field_errors = match e.downcast_ref::<SubmitError>() {
        Some(SubmitError::Validation(invalid)) => invalid
            .errors
            .iter()
            .map(|fe| FieldErrorOutput {
                field: fe.field.clone(),
                message: fe.message.clone(),
            })
            .collect(),
        _ => Vec::new(),
    };
    ErrorResponse {
        success: false,
        error: e.to_string(),
        field_errors,
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize output: {}", e),
    }
}

async fn process() -> Result<Output, BoxError> {
    let mut body = String::new();
    std::io::stdin().read_to_string(&mut body)?;
    let input: Input = serde_json::from_str(&body).map_err(|e| format!("Invalid input JSON: {}", e))?;

    let mut config = IntakeConfig::from_env()?;
    if config.draft_dir.is_none() {
        config.draft_dir = Some(PathBuf::from(DEFAULT_DRAFT_DIR));
    }

    let secret_key = std::env::var("INTAKE_SECRET_KEY").ok();
    dispatch(input, &config, secret_key.as_deref()).await
}

/// Run one action against an already-built configuration
async fn dispatch(input: Input, config: &IntakeConfig, secret_key: Option<&str>) -> Result<Output, BoxError> {
    match input {
        Input::SaveDraft(form_input) => handle_save_draft(config, form_input).await,
        Input::RestoreDraft(_) => handle_restore_draft(config),
        Input::ClearDraft(_) => handle_clear_draft(config),
        Input::Submit(form_input) => handle_submit(config, form_input).await,
        Input::GenerateKeyPair(_) => handle_generate_key_pair(config),
        Input::DecryptPayload(decrypt_input) => handle_decrypt_payload(decrypt_input, secret_key),
    }
}

fn context_for(config: &IntakeConfig) -> Result<IntakeContext, BoxError> {
    Ok(IntakeContext::from_config(config, Arc::new(TracingAnnouncer))?)
}

/// Build the live form from input values and files read from disk
async fn load_form(
    context: &IntakeContext,
    form_input: FormInput,
) -> Result<(MemoryForm, Vec<String>), BoxError> {
    let mut form = MemoryForm::from_snapshot(form_input.fields);

    let mut files = Vec::with_capacity(form_input.files.len());
    for file in form_input.files {
        let content = tokio::fs::read(&file.path)
            .await
            .map_err(|e| format!("Failed to read {}: {}", file.path.display(), e))?;
        let name = file.name.unwrap_or_else(|| {
            file.path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.path.display().to_string())
        });
        files.push(Attachment::new(name, file.mime_type, content));
    }

    let rejected = if files.is_empty() {
        Vec::new()
    } else {
        context.add_files(&mut form, files)
    };
    for reason in &rejected {
        warn!("Attachment rejected: {}", reason);
    }
    context.apply_disclosure(&mut form);
    Ok((form, rejected))
}

/// Handle SaveDraft action
async fn handle_save_draft(config: &IntakeConfig, form_input: FormInput) -> Result<Output, BoxError> {
    let context = context_for(config)?;
    let (form, rejected_files) = load_form(&context, form_input).await?;
    context.autosave(&form);

    Ok(Output::SaveDraft(SaveDraftOutput {
        success: true,
        saved_fields: form.field_names().len(),
        saved_files: form.attachments().len(),
        rejected_files,
    }))
}

/// Handle RestoreDraft action
fn handle_restore_draft(config: &IntakeConfig) -> Result<Output, BoxError> {
    let context = context_for(config)?;
    let draft = context.drafts().restore();
    if draft.is_none() {
        info!("No draft to restore");
    }
    Ok(Output::RestoreDraft(RestoreDraftOutput {
        success: true,
        draft,
    }))
}

/// Handle ClearDraft action
fn handle_clear_draft(config: &IntakeConfig) -> Result<Output, BoxError> {
    let context = context_for(config)?;
    context.clear_saved();
    Ok(Output::ClearDraft(ClearDraftOutput { success: true }))
}

/// Handle Submit action
/// Requires: INTAKE_PUBLIC_KEY, otherwise nobody could read the report
async fn handle_submit(config: &IntakeConfig, form_input: FormInput) -> Result<Output, BoxError> {
    if matches!(config.key_source, KeySource::Generate) {
        return Err("INTAKE_PUBLIC_KEY must be set to submit a report".into());
    }

    let context = context_for(config)?;
    let (form, rejected_files) = load_form(&context, form_input).await?;

    // Keep the latest values recoverable if the submission fails
    context.autosave(&form);

    let receipt = context.submit(&form).await?;
    Ok(Output::Submit(SubmitOutput {
        success: true,
        report_id: receipt.report_id,
        response: receipt.response,
        rejected_files,
    }))
}

/// Handle GenerateKeyPair action (public key is not sensitive, the secret is)
fn handle_generate_key_pair(config: &IntakeConfig) -> Result<Output, BoxError> {
    let (secret, public) = generate_key_pair();
    Ok(Output::GenerateKeyPair(GenerateKeyPairOutput {
        key_id: config.key_id.clone(),
        public_key: hex::encode(public.serialize_compressed()),
        secret_key: hex::encode(secret.serialize()),
    }))
}

/// Handle DecryptPayload action
/// Requires: INTAKE_SECRET_KEY (recipient secret, hex)
fn handle_decrypt_payload(input: DecryptPayloadInput, secret_key: Option<&str>) -> Result<Output, BoxError> {
    let secret_hex = secret_key.ok_or("INTAKE_SECRET_KEY environment variable not found")?;
    let secret = crypto::parse_private_key(secret_hex)?;

    let payload = input.payload;
    let decrypted_fields = crypto::open_fields(&secret, &payload.encrypted_fields)?;

    Ok(Output::DecryptPayload(DecryptPayloadOutput {
        report_id: payload.metadata.report_id,
        plaintext_fields: payload.plaintext_fields,
        decrypted_fields,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use witness_intake::{FieldCrypto, FormSnapshot, PayloadMetadata, ReportId, SubmissionPayload};

    fn config_in(dir: &std::path::Path) -> IntakeConfig {
        IntakeConfig {
            draft_dir: Some(dir.to_path_buf()),
            ..IntakeConfig::default()
        }
    }

    fn form_input(fields: FormSnapshot, files: Vec<FileInput>) -> FormInput {
        FormInput { fields, files }
    }

    #[test]
    fn test_parse_actions() {
        let input: Input = serde_json::from_str(r#"{"action":"RestoreDraft"}"#).unwrap();
        assert!(matches!(input, Input::RestoreDraft(_)));

        let input: Input = serde_json::from_str(
            r#"{"action":"Submit","fields":{"violations":["force","other"]},"files":[{"path":"clip.mp4","type":"video/mp4"}]}"#,
        )
        .unwrap();
        match input {
            Input::Submit(form) => {
                assert_eq!(form.files[0].mime_type, "video/mp4");
                assert!(form.files[0].name.is_none());
                assert!(form.fields.get("violations").unwrap().contains("other"));
            }
            other => panic!("unexpected input: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_save_restore_clear_draft() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let clip = dir.path().join("clip.mp4");
        let tool = dir.path().join("tool.exe");
        std::fs::write(&clip, vec![0u8; 2048]).unwrap();
        std::fs::write(&tool, b"MZ").unwrap();

        let fields = FormSnapshot::from_entries([("incidentLocation", "Halsted and 18th")]);
        let files = vec![
            FileInput {
                path: clip,
                mime_type: "video/mp4".into(),
                name: None,
            },
            FileInput {
                path: tool,
                mime_type: "application/x-msdownload".into(),
                name: None,
            },
        ];
        match dispatch(Input::SaveDraft(form_input(fields, files)), &config, None).await.unwrap() {
            Output::SaveDraft(saved) => {
                assert_eq!(saved.saved_files, 1);
                assert_eq!(saved.rejected_files.len(), 1);
                assert!(saved.rejected_files[0].starts_with("tool.exe"));
            }
            other => panic!("unexpected output: {:?}", other),
        }

        let restored = match dispatch(Input::RestoreDraft(EmptyInput {}), &config, None).await.unwrap() {
            Output::RestoreDraft(restored) => restored.draft.unwrap(),
            other => panic!("unexpected output: {:?}", other),
        };
        assert_eq!(
            restored.snapshot.get("incidentLocation").and_then(|v| v.as_single()),
            Some("Halsted and 18th")
        );
        assert_eq!(restored.attached_file_meta[0].name, "clip.mp4");
        assert_eq!(restored.attached_file_meta[0].size, 2048);

        dispatch(Input::ClearDraft(EmptyInput {}), &config, None).await.unwrap();
        match dispatch(Input::RestoreDraft(EmptyInput {}), &config, None).await.unwrap() {
            Output::RestoreDraft(restored) => assert!(restored.draft.is_none()),
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_refused_without_recipient_key() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let fields = FormSnapshot::from_entries([("incidentLocation", "Halsted and 18th")]);

        let err = dispatch(Input::Submit(form_input(fields, Vec::new())), &config, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("INTAKE_PUBLIC_KEY"));
        assert!(error_response(err.as_ref()).field_errors.is_empty());
    }

    #[tokio::test]
    async fn test_submit_validation_errors_are_listed_per_field() {
        let dir = tempfile::tempdir().unwrap();
        let (_, public) = generate_key_pair();
        let config = IntakeConfig {
            key_source: KeySource::PublicKeyHex(hex::encode(public.serialize_compressed())),
            ..config_in(dir.path())
        };

        let err = dispatch(Input::Submit(form_input(FormSnapshot::new(), Vec::new())), &config, None)
            .await
            .unwrap_err();
        let response = error_response(err.as_ref());

        assert!(!response.success);
        assert!(response.field_errors.iter().any(|fe| fe.field == "incidentDescription"));
        assert!(response.field_errors.iter().any(|fe| fe.field == "privacyConsent"));
    }

    #[tokio::test]
    async fn test_generated_key_opens_payload() {
        let config = IntakeConfig::default();
        let keys = match dispatch(Input::GenerateKeyPair(EmptyInput {}), &config, None).await.unwrap() {
            Output::GenerateKeyPair(keys) => keys,
            other => panic!("unexpected output: {:?}", other),
        };
        assert_eq!(keys.key_id, config.key_id);

        let public = crypto::parse_public_key(&keys.public_key).unwrap();
        let sealer = FieldCrypto::with_public_key(public, &keys.key_id);
        let fields = FormSnapshot::from_entries([("submitterEmail", "a@b.com"), ("agency", "cpd")]);
        let sealed = sealer.seal_fields(&fields, &[]).unwrap();

        let now = Utc::now();
        let report_id = ReportId::generate(now);
        let payload = SubmissionPayload {
            plaintext_fields: sealed.plaintext,
            encrypted_fields: sealed.encrypted,
            metadata: PayloadMetadata {
                timestamp: now,
                report_id: report_id.clone(),
                client_timezone: "America/Chicago".into(),
                key_id: keys.key_id.clone(),
                client_agent: "witness-intake-test".into(),
            },
        };

        let input = Input::DecryptPayload(DecryptPayloadInput { payload });
        match dispatch(input, &config, Some(&keys.secret_key)).await.unwrap() {
            Output::DecryptPayload(opened) => {
                assert_eq!(opened.report_id, report_id);
                assert_eq!(opened.decrypted_fields["submitterEmail"], "a@b.com");
                assert!(opened.plaintext_fields.contains_key("agency"));
                assert!(!opened.plaintext_fields.contains_key("submitterEmail"));
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_decrypt_requires_secret_key() {
        let payload = SubmissionPayload {
            plaintext_fields: Default::default(),
            encrypted_fields: Default::default(),
            metadata: PayloadMetadata {
                timestamp: Utc::now(),
                report_id: ReportId::generate(Utc::now()),
                client_timezone: "UTC".into(),
                key_id: "k".into(),
                client_agent: "test".into(),
            },
        };
        let err = dispatch(
            Input::DecryptPayload(DecryptPayloadInput { payload }),
            &IntakeConfig::default(),
            None,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("INTAKE_SECRET_KEY"));
    }
}
