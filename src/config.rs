#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Environment-backed configuration shared across the crate.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

use anyhow::{Context, Result};
use postgrest::Postgrest;
use reqwest::Client;
use state::InitCell;

/// Truncation length for code payloads submitted to the AI backend. The
/// prefix is kept and the remainder dropped.
pub const PAYLOAD_TRUNCATE: usize = 60_000;

/// Marker appended to a truncated code payload so truncation stays visible.
pub const TRUNCATION_MARKER: &str = "...[TRUNCATED]";

/// Default ceiling on downloaded submission archives (100 MiB).
pub const DEFAULT_MAX_ARCHIVE_BYTES: u64 = 100 * 1024 * 1024;

/// Supabase credentials loaded from the environment, if available.
#[derive(Clone)]
struct SupabaseEnv {
    /// Fully qualified PostgREST endpoint.
    rest_endpoint: String,
    /// API key used for PostgREST requests.
    api_key:       String,
}

impl SupabaseEnv {
    /// Builds a Supabase credential bundle from environment-provided values.
    fn new(url: String, key: String) -> Self {
        let rest_endpoint = format!("{}/rest/v1", url.trim_end_matches('/'));
        Self {
            rest_endpoint,
            api_key: key,
        }
    }
}

/// OpenAI credentials and optional tuning parameters sourced from the
/// environment.
#[derive(Clone)]
pub struct OpenAiEnv {
    /// Base URL for the OpenAI-compatible API endpoint, if overridden.
    api_base:    Option<String>,
    /// API key used to authenticate OpenAI requests.
    api_key:     String,
    /// Model identifier for chat completions.
    model:       String,
    /// Optional temperature override.
    temperature: Option<f32>,
    /// Optional top-p override.
    top_p:       Option<f32>,
}

impl OpenAiEnv {
    /// Construct an `OpenAiEnv` from environment variables; returns `None`
    /// when the API key is missing, which downgrades the quality scorer to
    /// its deterministic zero-score mode.
    fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok()?.trim().to_owned();
        if api_key.is_empty() {
            return None;
        }

        let api_base = std::env::var("OPENAI_ENDPOINT")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        let model = std::env::var("OPENAI_MODEL")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "gpt-4o".to_string());
        let temperature = std::env::var("OPENAI_TEMPERATURE")
            .ok()
            .and_then(|s| s.parse::<f32>().ok())
            .or(Some(0.3));
        let top_p = std::env::var("OPENAI_TOP_P")
            .ok()
            .and_then(|s| s.parse::<f32>().ok());

        Some(Self {
            api_base,
            api_key,
            model,
            temperature,
            top_p,
        })
    }

    /// Returns the API base URL override, if any.
    pub fn api_base(&self) -> Option<&str> {
        self.api_base.as_deref()
    }

    /// Returns the API key used for OpenAI requests.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Returns the model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the configured temperature, if any.
    pub fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    /// Returns the configured top_p, if any.
    pub fn top_p(&self) -> Option<f32> {
        self.top_p
    }
}

/// Runtime configuration shared across the crate.
pub struct ConfigState {
    /// Supabase credentials, if configured.
    supabase:          Option<SupabaseEnv>,
    /// Lazily constructed Supabase PostgREST client.
    postgrest:         InitCell<Postgrest>,
    /// Shared reqwest HTTP client reused across network helpers.
    http_client:       Client,
    /// Cached OpenAI configuration, if available.
    openai:            Option<OpenAiEnv>,
    /// Hosting API base URL.
    github_api_base:   String,
    /// Token for the hosting API, if configured (enables private
    /// repositories and comment posting).
    github_token:      Option<String>,
    /// Shared secret for change-event signature verification.
    webhook_secret:    Option<String>,
    /// Course label injected into AI prompts.
    course:            String,
    /// Root directory for ephemeral submission workspaces.
    staging_dir:       PathBuf,
    /// Deadline for archive downloads.
    download_timeout:  Duration,
    /// Deadline for AI completion calls.
    ai_timeout:        Duration,
    /// Ceiling on downloaded archive size in bytes.
    max_archive_bytes: u64,
}

impl ConfigState {
    /// Construct a new configuration instance by reading the environment.
    fn new() -> Result<Self> {
        let supabase =
            match (std::env::var("SUPABASE_URL").ok(), std::env::var("SUPABASE_ANON_KEY").ok()) {
                (Some(url), Some(key)) if !url.trim().is_empty() && !key.trim().is_empty() => {
                    Some(SupabaseEnv::new(url, key))
                }
                _ => None,
            };

        let http_client = Client::builder()
            // Avoid macOS dynamic store lookups that fail in sandboxed environments.
            .no_proxy()
            .build()
            .context("Failed to construct shared HTTP client")?;

        let github_api_base = std::env::var("GITHUB_API_BASE")
            .ok()
            .map(|value| value.trim().trim_end_matches('/').to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "https://api.github.com".to_string());
        let github_token = std::env::var("GITHUB_TOKEN")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        let webhook_secret = std::env::var("GITHUB_WEBHOOK_SECRET")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        let course = std::env::var("GAVEL_COURSE").unwrap_or_else(|_| "General".to_string());
        let staging_dir = std::env::var("GAVEL_STAGING_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("gavel-submissions"));

        let max_archive_bytes = std::env::var("GAVEL_MAX_ARCHIVE_BYTES")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_MAX_ARCHIVE_BYTES);

        Ok(Self {
            supabase,
            postgrest: InitCell::new(),
            http_client,
            openai: OpenAiEnv::from_env(),
            github_api_base,
            github_token,
            webhook_secret,
            course,
            staging_dir,
            download_timeout: read_timeout_secs("GAVEL_DOWNLOAD_TIMEOUT_SECS", 30),
            ai_timeout: read_timeout_secs("GAVEL_AI_TIMEOUT_SECS", 60),
            max_archive_bytes,
        })
    }

    /// Returns the configured PostgREST client if credentials are available.
    pub fn postgrest(&self) -> Option<Postgrest> {
        if let Some(client) = self.postgrest.try_get() {
            return Some(client.clone());
        }

        let creds = self.supabase.as_ref()?;
        let client = Postgrest::new(creds.rest_endpoint.clone())
            .insert_header("apiKey", creds.api_key.clone());
        self.postgrest.set(client);
        Some(self.postgrest.get().clone())
    }

    /// Returns a clone of the shared reqwest HTTP client.
    pub fn http_client(&self) -> Client {
        self.http_client.clone()
    }

    /// Returns the OpenAI configuration, if the API key is present.
    pub fn openai(&self) -> Option<&OpenAiEnv> {
        self.openai.as_ref()
    }

    /// Returns the hosting API base URL.
    pub fn github_api_base(&self) -> &str {
        &self.github_api_base
    }

    /// Returns the hosting API token, if configured.
    pub fn github_token(&self) -> Option<&str> {
        self.github_token.as_deref()
    }

    /// Returns the change-event signature secret, if configured.
    pub fn webhook_secret(&self) -> Option<&str> {
        self.webhook_secret.as_deref()
    }

    /// Returns the course label used in AI prompts.
    pub fn course(&self) -> &str {
        &self.course
    }

    /// Returns the workspace staging directory.
    pub fn staging_dir(&self) -> &PathBuf {
        &self.staging_dir
    }

    /// Returns the archive download deadline.
    pub fn download_timeout(&self) -> Duration {
        self.download_timeout
    }

    /// Returns the AI completion deadline.
    pub fn ai_timeout(&self) -> Duration {
        self.ai_timeout
    }

    /// Returns the archive size ceiling in bytes.
    pub fn max_archive_bytes(&self) -> u64 {
        self.max_archive_bytes
    }
}

/// Shared configuration handle used throughout the crate.
#[derive(Clone)]
pub struct ConfigHandle(Arc<ConfigState>);

impl std::ops::Deref for ConfigHandle {
    type Target = ConfigState;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Global storage for the lazily constructed configuration state.
static CONFIG_SLOT: OnceLock<Mutex<Option<Arc<ConfigState>>>> = OnceLock::new();

/// Returns the mutex guarding the global configuration slot.
fn slot() -> &'static Mutex<Option<Arc<ConfigState>>> {
    CONFIG_SLOT.get_or_init(|| Mutex::new(None))
}

/// Ensure the global configuration has been initialized and return a handle.
pub fn ensure_initialized() -> Result<ConfigHandle> {
    let slot = slot();
    let mut guard = slot.lock().expect("config slot poisoned");
    if let Some(cfg) = guard.as_ref() {
        return Ok(ConfigHandle(Arc::clone(cfg)));
    }

    let cfg = ConfigState::new().map(Arc::new)?;
    *guard = Some(Arc::clone(&cfg));
    Ok(ConfigHandle(cfg))
}

/// Returns the active configuration, initializing it on demand.
pub fn get() -> ConfigHandle {
    ensure_initialized().expect("configuration initialization failed")
}

/// Returns the configured PostgREST client, if Supabase has been configured.
pub fn postgrest_client() -> Option<Postgrest> {
    get().postgrest()
}

/// Returns a clone of the shared reqwest HTTP client.
pub fn http_client() -> Client {
    get().http_client()
}

/// Parses an environment variable into a `Duration`, falling back to
/// `default_secs` when parsing fails or the variable is missing.
fn read_timeout_secs(env: &str, default_secs: u64) -> Duration {
    std::env::var(env)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}
