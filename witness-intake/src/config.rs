//! Runtime configuration and fixed intake constants

use chrono::Duration as ChronoDuration;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::attachments::AttachmentPolicy;
use crate::crypto::KeySource;
use crate::error::IntakeError;

/// The one local storage slot the draft lives in
pub const DRAFT_STORAGE_KEY: &str = "witness-chicago-form-data";

/// Drafts older than this are discarded on restore
pub const DRAFT_TTL_HOURS: i64 = 24;

/// Per-file ceiling enforced before a file joins the attachment set
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB

pub const DEFAULT_ENDPOINT: &str = "/api/submit-report";
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_KEY_ID: &str = "witness-chicago-2025";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Declared MIME types accepted as evidence
pub const ALLOWED_FILE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "video/mp4",
    "video/webm",
    "video/quicktime",
    "audio/mp3",
    "audio/wav",
    "audio/ogg",
    "audio/m4a",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/plain",
];

/// Intake configuration, built once at startup and passed down explicitly
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// Absolute URL of the single submission endpoint
    pub endpoint: String,
    pub key_source: KeySource,
    pub key_id: String,
    /// Directory backing the draft slot; `None` keeps drafts in memory
    pub draft_dir: Option<PathBuf>,
    /// Age past which a stored draft is discarded
    pub draft_ttl: ChronoDuration,
    pub request_timeout: Duration,
    pub client_timezone: String,
    pub attachments: AttachmentPolicy,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            endpoint: resolve_endpoint(DEFAULT_BASE_URL, DEFAULT_ENDPOINT),
            key_source: KeySource::Generate,
            key_id: DEFAULT_KEY_ID.to_string(),
            draft_dir: None,
            draft_ttl: ChronoDuration::hours(DRAFT_TTL_HOURS),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            client_timezone: local_timezone(),
            attachments: AttachmentPolicy::default(),
        }
    }
}

impl IntakeConfig {
    /// Read configuration from the environment (after `.env`, if present)
    pub fn from_env() -> Result<Self, IntakeError> {
        dotenvy::dotenv().ok();

        let base_url = env::var("INTAKE_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let endpoint = env::var("INTAKE_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());

        let key_source = match env::var("INTAKE_PUBLIC_KEY") {
            Ok(hex_key) if !hex_key.trim().is_empty() => KeySource::PublicKeyHex(hex_key),
            _ => {
                tracing::warn!("INTAKE_PUBLIC_KEY not set, generating a throwaway key pair");
                KeySource::Generate
            }
        };

        let request_timeout = match env::var("INTAKE_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(raw.parse::<u64>().map_err(|_| {
                IntakeError::Config(format!("INTAKE_TIMEOUT_SECS must be a number, got {:?}", raw))
            })?),
            Err(_) => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        Ok(Self {
            endpoint: resolve_endpoint(&base_url, &endpoint),
            key_source,
            key_id: env::var("INTAKE_KEY_ID").unwrap_or_else(|_| DEFAULT_KEY_ID.to_string()),
            draft_dir: env::var("INTAKE_DRAFT_DIR").ok().map(PathBuf::from),
            draft_ttl: ChronoDuration::hours(DRAFT_TTL_HOURS),
            request_timeout,
            client_timezone: env::var("INTAKE_CLIENT_TIMEZONE").unwrap_or_else(|_| local_timezone()),
            attachments: AttachmentPolicy::default(),
        })
    }
}

/// Join a relative endpoint path onto the base URL; absolute URLs pass through
pub fn resolve_endpoint(base_url: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

/// `TZ` when set, else the local UTC offset (e.g. `-05:00`)
fn local_timezone() -> String {
    env::var("TZ")
        .ok()
        .filter(|tz| !tz.is_empty())
        .unwrap_or_else(|| chrono::Local::now().offset().to_string())
}
