//! Intake context: the components wired together once at startup
//!
//! Each component receives only the references it needs; nothing is global.

use libsecp256k1::SecretKey;
use std::sync::Arc;
use tracing::{error, info};

use crate::attachments::{format_file_size, Attachment, AttachmentPolicy};
use crate::config::IntakeConfig;
use crate::crypto::FieldCrypto;
use crate::disclosure::{self, DisclosureRule, DISCLOSURE_RULES};
use crate::draft::{DraftStore, FileStore, KeyValueStore, MemoryStore};
use crate::error::{IntakeError, SubmitError};
use crate::pipeline::{SubmissionPipeline, MSG_ENCRYPTION_SETUP};
use crate::session::{Announcer, FormSession};
use crate::transport::{HttpTransport, Transport};
use crate::types::{DraftRecord, FieldValue, SubmissionReceipt};
use crate::validation::FormRules;

pub struct IntakeContext {
    drafts: DraftStore,
    crypto: Arc<FieldCrypto>,
    pipeline: SubmissionPipeline,
    announcer: Arc<dyn Announcer>,
    attachment_policy: AttachmentPolicy,
    generated_secret: Option<SecretKey>,
}

impl IntakeContext {
    /// Wire up the context from explicit collaborators.
    ///
    /// A key that cannot be loaded is announced and leaves the context in a
    /// state where every submission is refused.
    pub fn new(
        config: &IntakeConfig,
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn Transport>,
        announcer: Arc<dyn Announcer>,
    ) -> Self {
        let (crypto, generated_secret) = match FieldCrypto::initialize(&config.key_source, &config.key_id) {
            Ok((crypto, secret)) => (crypto, secret),
            Err(e) => {
                error!("Encryption initialization failed: {}", e);
                announcer.announce(&format!("Error: {}", MSG_ENCRYPTION_SETUP));
                (FieldCrypto::unavailable(&config.key_id), None)
            }
        };
        let crypto = Arc::new(crypto);
        let drafts = DraftStore::with_ttl(store, config.draft_ttl);
        let pipeline = SubmissionPipeline::new(
            crypto.clone(),
            drafts.clone(),
            transport,
            announcer.clone(),
            config.endpoint.clone(),
            config.client_timezone.clone(),
        );

        info!("Intake context initialized (endpoint {})", config.endpoint);
        Self {
            drafts,
            crypto,
            pipeline,
            announcer,
            attachment_policy: config.attachments.clone(),
            generated_secret,
        }
    }

    /// Context backed by the configured draft directory and HTTP transport
    pub fn from_config(config: &IntakeConfig, announcer: Arc<dyn Announcer>) -> Result<Self, IntakeError> {
        let store: Arc<dyn KeyValueStore> = match &config.draft_dir {
            Some(dir) => Arc::new(FileStore::new(dir)),
            None => Arc::new(MemoryStore::new()),
        };
        let transport = Arc::new(HttpTransport::new(config.request_timeout)?);
        Ok(Self::new(config, store, transport, announcer))
    }

    pub fn with_rules(mut self, rules: FormRules) -> Self {
        self.pipeline = self.pipeline.with_rules(rules);
        self
    }

    pub fn crypto(&self) -> &FieldCrypto {
        &self.crypto
    }

    pub fn pipeline(&self) -> &SubmissionPipeline {
        &self.pipeline
    }

    pub fn drafts(&self) -> &DraftStore {
        &self.drafts
    }

    /// Secret half of a key pair generated at startup, handed out once
    pub fn take_generated_secret(&mut self) -> Option<SecretKey> {
        self.generated_secret.take()
    }

    /// Mirror the live form into the draft slot
    pub fn autosave<F: FormSession + ?Sized>(&self, form: &F) {
        self.drafts.save(&form.snapshot(), &form.attachments().metadata());
    }

    /// Write a fresh draft back into the form.
    ///
    /// Only values are restored; files listed in the draft must be re-selected.
    pub fn restore_into<F: FormSession + ?Sized>(&self, form: &mut F) -> Option<DraftRecord> {
        let record = self.drafts.restore()?;

        for (name, value) in record.snapshot.iter() {
            form.set_value(name, value.clone());
        }
        self.apply_disclosure(form);

        if !record.snapshot.is_empty() {
            info!(
                "Form data restored from {}",
                record.captured_at.to_rfc3339()
            );
            self.announcer.announce("Previous form data has been restored");
        }
        if !record.attached_file_meta.is_empty() {
            self.announcer.announce(&format!(
                "{} previously selected file(s) need to be selected again",
                record.attached_file_meta.len()
            ));
        }
        Some(record)
    }

    /// Delete the saved draft on user request
    pub fn clear_saved(&self) {
        self.drafts.clear();
        self.announcer.announce("Saved form data cleared");
    }

    /// Set a field, re-evaluate disclosure and autosave
    pub fn update_field<F: FormSession + ?Sized>(&self, form: &mut F, name: &str, value: FieldValue) {
        let shown_before = self.apply_disclosure(form);
        form.set_value(name, value);
        for rule in self.apply_disclosure(form) {
            if !shown_before.contains(&rule) {
                self.announcer.announce(rule.announcement);
            }
        }
        self.autosave(form);
    }

    /// Show dependents whose trigger is selected; hide and empty the rest.
    ///
    /// Returns the rules whose dependent is visible.
    pub fn apply_disclosure<F: FormSession + ?Sized>(&self, form: &mut F) -> Vec<&'static DisclosureRule> {
        let snapshot = form.snapshot();
        let mut shown = Vec::new();
        for decision in disclosure::evaluate(DISCLOSURE_RULES, &snapshot) {
            let dependent = decision.rule.dependent;
            form.set_visible(dependent, decision.visible);
            if decision.visible {
                shown.push(decision.rule);
            } else {
                form.clear_value(dependent);
            }
        }
        shown
    }

    /// Admit files into the form's attachment set; rejections are announced
    pub fn add_files<F, I>(&self, form: &mut F, files: I) -> Vec<String>
    where
        F: FormSession + ?Sized,
        I: IntoIterator<Item = Attachment>,
    {
        let rejections = form.attachments_mut().admit(&self.attachment_policy, files);
        if !rejections.is_empty() {
            self.announcer
                .announce(&format!("File validation errors: {}", rejections.join(", ")));
        }
        let count = form.attachments().len();
        self.announcer.announce(&format!("{} files selected", count));
        self.autosave(form);
        rejections
    }

    pub fn remove_file<F: FormSession + ?Sized>(&self, form: &mut F, index: usize) -> Option<Attachment> {
        let removed = form.attachments_mut().remove(index)?;
        self.announcer.announce(&format!(
            "{} removed ({})",
            removed.name,
            format_file_size(removed.size())
        ));
        self.autosave(form);
        Some(removed)
    }

    pub async fn submit<F: FormSession + ?Sized>(&self, form: &F) -> Result<SubmissionReceipt, SubmitError> {
        self.pipeline.submit(form).await
    }

    /// Start over after a successful submission
    pub fn reset_for_new_report<F: FormSession + ?Sized>(&self, form: &mut F) {
        form.reset();
        self.drafts.clear();
        for rule in DISCLOSURE_RULES {
            form.set_visible(rule.dependent, false);
        }
        self.announcer.announce("New report form ready");
    }
}
