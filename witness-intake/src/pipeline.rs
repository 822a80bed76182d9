//! Submission pipeline: validate -> collect -> encrypt -> transmit -> resolve
//!
//! At most one attempt is in flight. A request that arrives while the pipeline
//! is busy is refused with `SubmitError::InFlight` and has no side effects.

use chrono::{Local, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

use crate::crypto::FieldCrypto;
use crate::draft::DraftStore;
use crate::error::{CryptoError, SubmitError};
use crate::session::{Announcer, FormSession};
use crate::transport::Transport;
use crate::types::{PayloadMetadata, ReportId, SubmissionPayload, SubmissionReceipt};
use crate::validation::FormRules;

pub const MSG_IN_PROGRESS: &str = "Encrypting and submitting report";
pub const MSG_FAILED: &str =
    "Submission failed. Please try again. Your form data has been saved so you won't lose your work.";
pub const MSG_ENCRYPTION_SETUP: &str =
    "Encryption setup failed. Please refresh the page and try again.";

/// Pipeline phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    Validating,
    Encrypting,
    Transmitting,
    Succeeded,
    Failed,
}

/// Marks one attempt in flight; the pipeline is back to `Idle` when dropped,
/// including when the submit future itself is dropped mid-flight.
struct Flight<'a> {
    state: &'a Mutex<SubmissionState>,
}

impl<'a> Flight<'a> {
    fn begin(state: &'a Mutex<SubmissionState>) -> Option<Self> {
        let mut current = state.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != SubmissionState::Idle {
            return None;
        }
        *current = SubmissionState::Validating;
        Some(Self { state })
    }

    fn advance(&self, next: SubmissionState) {
        let mut current = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug!("Submission {:?} -> {:?}", *current, next);
        *current = next;
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        let mut current = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *current = SubmissionState::Idle;
    }
}

pub struct SubmissionPipeline {
    crypto: Arc<FieldCrypto>,
    drafts: DraftStore,
    transport: Arc<dyn Transport>,
    announcer: Arc<dyn Announcer>,
    rules: FormRules,
    endpoint: String,
    client_timezone: String,
    state: Mutex<SubmissionState>,
}

impl SubmissionPipeline {
    pub fn new(
        crypto: Arc<FieldCrypto>,
        drafts: DraftStore,
        transport: Arc<dyn Transport>,
        announcer: Arc<dyn Announcer>,
        endpoint: impl Into<String>,
        client_timezone: impl Into<String>,
    ) -> Self {
        Self {
            crypto,
            drafts,
            transport,
            announcer,
            rules: FormRules::default(),
            endpoint: endpoint.into(),
            client_timezone: client_timezone.into(),
            state: Mutex::new(SubmissionState::Idle),
        }
    }

    pub fn with_rules(mut self, rules: FormRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn state(&self) -> SubmissionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_idle(&self) -> bool {
        self.state() == SubmissionState::Idle
    }

    /// Run one submission attempt against the live form
    pub async fn submit<F>(&self, form: &F) -> Result<SubmissionReceipt, SubmitError>
    where
        F: FormSession + ?Sized,
    {
        let Some(flight) = Flight::begin(&self.state) else {
            debug!("Submit ignored: attempt already in flight");
            return Err(SubmitError::InFlight);
        };

        if !self.crypto.is_ready() {
            flight.advance(SubmissionState::Failed);
            error!("Submission refused: no encryption key loaded");
            self.announce_error(MSG_ENCRYPTION_SETUP);
            return Err(CryptoError::EncryptionUnavailable.into());
        }

        // Validate
        let snapshot = form.snapshot();
        if let Err(invalid) = self.rules.validate(&snapshot, Local::now().date_naive()) {
            info!("Submission blocked by {} validation error(s)", invalid.errors.len());
            let mut announced: Vec<&str> = Vec::new();
            for field_error in &invalid.errors {
                if !announced.contains(&field_error.message.as_str()) {
                    self.announcer.announce(&field_error.message);
                    announced.push(&field_error.message);
                }
            }
            return Err(invalid.into());
        }

        // Collect
        let collected_at = Utc::now();
        let report_id = ReportId::generate(collected_at);
        let files = form.attachments().metadata();
        self.announcer.announce(MSG_IN_PROGRESS);
        info!(
            "Submitting report {} ({} fields, {} attachments)",
            report_id,
            snapshot.len(),
            files.len()
        );

        // Encrypt
        flight.advance(SubmissionState::Encrypting);
        let sealed = match self.crypto.seal_fields(&snapshot, &files) {
            Ok(sealed) => sealed,
            Err(e) => {
                flight.advance(SubmissionState::Failed);
                error!("Submission error: {}", e);
                self.announce_error(MSG_FAILED);
                return Err(e.into());
            }
        };

        let payload = SubmissionPayload {
            plaintext_fields: sealed.plaintext,
            encrypted_fields: sealed.encrypted,
            metadata: PayloadMetadata {
                timestamp: collected_at,
                report_id: report_id.clone(),
                client_timezone: self.client_timezone.clone(),
                key_id: self.crypto.key_id().to_string(),
                client_agent: format!("witness-intake/{}", env!("CARGO_PKG_VERSION")),
            },
        };

        // Transmit
        flight.advance(SubmissionState::Transmitting);
        let response = match self.transport.send(&self.endpoint, &payload).await {
            Ok(response) => response,
            Err(e) => {
                flight.advance(SubmissionState::Failed);
                warn!("Submission error: {}", e);
                self.announce_error(MSG_FAILED);
                return Err(e.into());
            }
        };

        // Resolve
        flight.advance(SubmissionState::Succeeded);
        self.drafts.clear();
        self.announcer.announce(&format!(
            "Report submitted successfully. Your report ID is {}",
            report_id
        ));
        info!("Report {} submitted", report_id);

        Ok(SubmissionReceipt {
            report_id,
            response,
        })
    }

    fn announce_error(&self, message: &str) {
        self.announcer.announce(&format!("Error: {}", message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachments::{Attachment, AttachmentPolicy};
    use crate::crypto::{decrypt_field, is_sensitive, KeySource, MAX_FIELD_PLAINTEXT};
    use crate::draft::MemoryStore;
    use crate::error::TransmissionError;
    use crate::session::{MemoryForm, RecordingAnnouncer};
    use crate::types::FieldValue;
    use async_trait::async_trait;
    use libsecp256k1::SecretKey;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<SubmissionPayload>>,
        fail: bool,
    }

    impl RecordingTransport {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<SubmissionPayload> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(
            &self,
            _endpoint: &str,
            payload: &SubmissionPayload,
        ) -> Result<serde_json::Value, TransmissionError> {
            self.sent.lock().unwrap().push(payload.clone());
            if self.fail {
                return Err(TransmissionError::Status {
                    status: 503,
                    snippet: "unavailable".into(),
                });
            }
            Ok(serde_json::json!({ "id": "server-1" }))
        }
    }

    /// Parks inside `send` until released
    #[derive(Default)]
    struct GatedTransport {
        entered: Notify,
        release: Notify,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn send(
            &self,
            _endpoint: &str,
            _payload: &SubmissionPayload,
        ) -> Result<serde_json::Value, TransmissionError> {
            *self.calls.lock().unwrap() += 1;
            self.entered.notify_one();
            self.release.notified().await;
            Ok(serde_json::json!({}))
        }
    }

    struct Harness {
        pipeline: SubmissionPipeline,
        drafts: DraftStore,
        announcer: Arc<RecordingAnnouncer>,
        secret: SecretKey,
    }

    fn harness(transport: Arc<dyn Transport>) -> Harness {
        let (crypto, secret) = FieldCrypto::initialize(&KeySource::Generate, "test-key").unwrap();
        let drafts = DraftStore::new(Arc::new(MemoryStore::new()));
        let announcer = Arc::new(RecordingAnnouncer::new());
        let pipeline = SubmissionPipeline::new(
            Arc::new(crypto),
            drafts.clone(),
            transport,
            announcer.clone(),
            "http://intake.test/api/submit-report",
            "America/Chicago",
        );
        Harness {
            pipeline,
            drafts,
            announcer,
            secret: secret.unwrap(),
        }
    }

    fn valid_form() -> MemoryForm {
        let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
        MemoryForm::new()
            .with_value("incidentDate", today)
            .with_value("incidentLocation", "18th St and Halsted")
            .with_value("incidentDescription", "Two agents detained a vendor")
            .with_value("relationship", "witness")
            .with_value("privacyConsent", "on")
            .with_value("submitterEmail", "a@b.com")
    }

    #[tokio::test]
    async fn test_success_splits_fields_and_clears_draft() {
        let transport = Arc::new(RecordingTransport::default());
        let h = harness(transport.clone());
        let form = valid_form();
        h.drafts.save(&form.snapshot(), &[]);

        let receipt = h.pipeline.submit(&form).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        let payload = &sent[0];
        assert_eq!(
            payload.plaintext_fields.get("relationship"),
            Some(&FieldValue::from("witness"))
        );
        assert!(!payload.encrypted_fields.contains_key("relationship"));
        assert!(payload.plaintext_fields.keys().all(|k| !is_sensitive(k)));
        assert!(payload.encrypted_fields.keys().all(|k| is_sensitive(k)));
        assert_eq!(
            decrypt_field(&h.secret, &payload.encrypted_fields["submitterEmail"]).unwrap(),
            "a@b.com"
        );

        assert_eq!(payload.metadata.report_id, receipt.report_id);
        assert_eq!(payload.metadata.client_timezone, "America/Chicago");
        assert_eq!(payload.metadata.key_id, "test-key");
        assert_eq!(receipt.response["id"], "server-1");

        assert!(h.drafts.restore().is_none());
        assert!(h.announcer.contains(&format!(
            "Report submitted successfully. Your report ID is {}",
            receipt.report_id
        )));
        assert!(h.pipeline.is_idle());
    }

    #[tokio::test]
    async fn test_every_collected_field_lands_in_one_map() {
        let transport = Arc::new(RecordingTransport::default());
        let h = harness(transport.clone());
        let form = valid_form()
            .with_value("submitterPhone", "")
            .with_value("violations", vec!["force".to_string(), "other".to_string()])
            .with_value("violationOtherDescription", "Phone seized");

        h.pipeline.submit(&form).await.unwrap();

        let payload = &transport.sent()[0];
        for name in form.snapshot().keys() {
            let in_plain = payload.plaintext_fields.contains_key(name);
            let in_sealed = payload.encrypted_fields.contains_key(name);
            if name == "submitterPhone" {
                assert!(!in_plain && !in_sealed);
            } else {
                assert!(in_plain ^ in_sealed, "{} must be in exactly one map", name);
            }
        }
    }

    #[tokio::test]
    async fn test_validation_failure_never_encrypts_or_sends() {
        let transport = Arc::new(RecordingTransport::default());
        let h = harness(transport.clone());
        let mut form = valid_form();
        form.clear_value("incidentDescription");
        form.clear_value("relationship");
        h.drafts.save(&form.snapshot(), &[]);

        let err = h.pipeline.submit(&form).await.unwrap_err();

        match err {
            SubmitError::Validation(invalid) => {
                assert_eq!(invalid.first_field(), Some("incidentDescription"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(transport.sent().is_empty());
        assert!(h.drafts.restore().is_some());
        assert!(h.announcer.contains("Please select your relationship to this incident."));
        assert!(!h.announcer.contains(MSG_IN_PROGRESS));
        assert!(h.pipeline.is_idle());
    }

    #[tokio::test]
    async fn test_transmission_failure_preserves_draft_and_attachments() {
        let transport = Arc::new(RecordingTransport::failing());
        let h = harness(transport.clone());
        let mut form = valid_form();
        form.attachments_mut().admit(
            &AttachmentPolicy::default(),
            vec![Attachment::new("clip.mp4", "video/mp4", vec![1, 2, 3])],
        );
        let before = form.snapshot();
        h.drafts.save(&before, &form.attachments().metadata());

        let err = h.pipeline.submit(&form).await.unwrap_err();

        assert!(matches!(err, SubmitError::Transmission(_)));
        assert!(err.is_retryable());
        assert_eq!(h.drafts.restore().unwrap().snapshot, before);
        assert_eq!(form.attachments().len(), 1);
        assert!(h.announcer.contains(&format!("Error: {}", MSG_FAILED)));
        assert!(h.pipeline.is_idle());

        // retry rebuilds the payload with a fresh id
        let _ = h.pipeline.submit(&form).await;
        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_ne!(sent[0].metadata.report_id, sent[1].metadata.report_id);
        assert!(sent[1].encrypted_fields.contains_key("files"));
    }

    #[tokio::test]
    async fn test_missing_key_refuses_submission() {
        let transport = Arc::new(RecordingTransport::default());
        let drafts = DraftStore::new(Arc::new(MemoryStore::new()));
        let announcer = Arc::new(RecordingAnnouncer::new());
        let pipeline = SubmissionPipeline::new(
            Arc::new(FieldCrypto::unavailable("none")),
            drafts.clone(),
            transport.clone(),
            announcer.clone(),
            "http://intake.test",
            "UTC",
        );
        let form = valid_form();
        drafts.save(&form.snapshot(), &[]);

        let err = pipeline.submit(&form).await.unwrap_err();

        assert!(matches!(
            err,
            SubmitError::Encryption(CryptoError::EncryptionUnavailable)
        ));
        assert!(transport.sent().is_empty());
        assert!(drafts.restore().is_some());
        assert!(announcer.contains(MSG_ENCRYPTION_SETUP));
    }

    #[tokio::test]
    async fn test_encryption_failure_aborts_whole_attempt() {
        let transport = Arc::new(RecordingTransport::default());
        let h = harness(transport.clone());
        let form = valid_form().with_value("incidentDescription", "x".repeat(MAX_FIELD_PLAINTEXT + 1));
        h.drafts.save(&form.snapshot(), &[]);

        let err = h.pipeline.submit(&form).await.unwrap_err();

        assert!(matches!(
            err,
            SubmitError::Encryption(CryptoError::EncryptionFailure(_))
        ));
        assert!(transport.sent().is_empty());
        assert_eq!(h.drafts.restore().unwrap().snapshot, form.snapshot());
        assert!(h.pipeline.is_idle());
    }

    #[tokio::test]
    async fn test_second_submit_while_in_flight_is_ignored() {
        let transport = Arc::new(GatedTransport::default());
        let h = harness(transport.clone());
        let form = valid_form();

        let (first, second) = tokio::join!(h.pipeline.submit(&form), async {
            transport.entered.notified().await;
            assert_eq!(h.pipeline.state(), SubmissionState::Transmitting);
            let second = h.pipeline.submit(&form).await;
            transport.release.notify_one();
            second
        });

        assert!(first.is_ok());
        assert!(matches!(second, Err(SubmitError::InFlight)));
        assert_eq!(*transport.calls.lock().unwrap(), 1);
        assert!(h.pipeline.is_idle());
    }

    #[tokio::test]
    async fn test_abandoned_attempt_returns_to_idle() {
        let transport = Arc::new(GatedTransport::default());
        let h = harness(transport.clone());
        let form = valid_form();
        h.drafts.save(&form.snapshot(), &[]);

        {
            let attempt = h.pipeline.submit(&form);
            tokio::pin!(attempt);
            tokio::select! {
                _ = &mut attempt => panic!("transport never released"),
                _ = transport.entered.notified() => {}
            }
            assert_eq!(h.pipeline.state(), SubmissionState::Transmitting);
        }

        assert!(h.pipeline.is_idle());
        assert!(h.drafts.restore().is_some());
    }
}
