#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Adapter around the AI text-completion backend.
//!
//! Every failure mode — missing credential, transport error, deadline
//! expiry, unparsable response — is caught at this boundary and downgraded
//! to a zero-score [`AiQuality::Failed`]; nothing here returns an error to
//! the pipeline.

use std::{path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result, anyhow};
use async_openai::{
    Client as OpenAIClient,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, ResponseFormat,
    },
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::config::{self, PAYLOAD_TRUNCATE, TRUNCATION_MARKER};

/// Score ceiling in fixed-rubric mode.
pub const FIXED_MAX_SCORE: u32 = 60;

/// Score ceiling in custom-rubric mode.
pub const CUSTOM_MAX_SCORE: u32 = 100;

/// Completion budget for fixed-rubric analysis.
const FIXED_MAX_TOKENS: u32 = 500;

/// Completion budget for custom-rubric analysis.
const CUSTOM_MAX_TOKENS: u32 = 1500;

/// File extensions considered code when bundling a submission.
const CODE_EXTENSIONS: &[&str] = &[
    "js", "jsx", "ts", "tsx", "py", "java", "sol", "rs", "go", "html", "css",
];

/// Directories skipped when bundling a submission.
const IGNORED_DIRS: &[&str] = &["node_modules", ".git", "dist", "build", "__pycache__", "target"];

/// A successfully scored AI quality assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiQualityScore {
    /// Score clamped into the mode's range.
    pub score:     u32,
    /// The mode's score ceiling.
    pub max_score: u32,
    /// Narrative assessment from the backend.
    pub feedback:  String,
    /// Requirements the backend judged satisfied.
    pub passed:    Vec<String>,
    /// Issues or missing requirements the backend reported.
    pub errors:    Vec<String>,
}

/// Outcome of one AI quality analysis.
///
/// The two variants force callers to handle scorer failure explicitly
/// instead of trusting a flag buried inside an otherwise-valid result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiQuality {
    /// The backend produced a well-formed, in-range score.
    Scored(AiQualityScore),
    /// The analysis could not run or its response was unusable; scores 0.
    Failed {
        /// The ceiling the analysis would have had.
        max_score: u32,
        /// Explanation of what went wrong.
        feedback:  String,
    },
}

impl AiQuality {
    /// Builds the scored variant.
    pub fn scored(
        score: u32,
        max_score: u32,
        feedback: String,
        passed: Vec<String>,
        errors: Vec<String>,
    ) -> Self {
        AiQuality::Scored(AiQualityScore {
            score: score.min(max_score),
            max_score,
            feedback,
            passed,
            errors,
        })
    }

    /// Builds the failed variant.
    pub fn failed(max_score: u32, feedback: String) -> Self {
        AiQuality::Failed { max_score, feedback }
    }

    /// Returns the awarded score; always 0 for failures.
    pub fn score(&self) -> u32 {
        match self {
            AiQuality::Scored(result) => result.score,
            AiQuality::Failed { .. } => 0,
        }
    }

    /// Returns the score ceiling of the analysis mode.
    pub fn max_score(&self) -> u32 {
        match self {
            AiQuality::Scored(result) => result.max_score,
            AiQuality::Failed { max_score, .. } => *max_score,
        }
    }

    /// Returns the narrative feedback.
    pub fn feedback(&self) -> &str {
        match self {
            AiQuality::Scored(result) => &result.feedback,
            AiQuality::Failed { feedback, .. } => feedback,
        }
    }

    /// Returns whether the analysis failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, AiQuality::Failed { .. })
    }

    /// Flattens into the serializable report shape used in responses and
    /// persisted records.
    pub fn report(&self) -> AiQualityReport {
        match self {
            AiQuality::Scored(result) => AiQualityReport {
                score:     result.score,
                max_score: result.max_score,
                feedback:  result.feedback.clone(),
                passed:    result.passed.clone(),
                errors:    result.errors.clone(),
                failed:    false,
            },
            AiQuality::Failed { max_score, feedback } => AiQualityReport {
                score:     0,
                max_score: *max_score,
                feedback:  feedback.clone(),
                passed:    vec![],
                errors:    vec![format!("Analysis Error: {feedback}")],
                failed:    true,
            },
        }
    }
}

/// Flat, serializable view of an [`AiQuality`] outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiQualityReport {
    /// Awarded score, 0 on failure.
    pub score:     u32,
    /// Score ceiling of the analysis mode.
    pub max_score: u32,
    /// Narrative assessment or failure explanation.
    pub feedback:  String,
    /// Requirements judged satisfied.
    pub passed:    Vec<String>,
    /// Issues reported by the backend, or the failure cause.
    pub errors:    Vec<String>,
    /// Whether the analysis failed rather than scored.
    pub failed:    bool,
}

/// A concatenated multi-file code payload with bookkeeping that keeps
/// truncation observable in output.
#[derive(Debug, Clone)]
pub struct CodeBundle {
    /// Number of files included.
    pub files:     usize,
    /// Characters in the payload before truncation.
    pub chars:     usize,
    /// Whether the payload was cut at the truncation limit.
    pub truncated: bool,
    /// The payload submitted to the backend.
    pub text:      String,
}

impl CodeBundle {
    /// Walks `root` and concatenates every code file into one payload, each
    /// prefixed with a `// File:` header carrying its relative path.
    /// Dependency and build directories are skipped. The payload keeps its
    /// prefix and drops the remainder past the truncation limit.
    pub fn collect(root: &Path) -> Self {
        let mut files = 0usize;
        let mut text = String::new();

        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .map(|name| !IGNORED_DIRS.contains(&name))
                    .unwrap_or(true)
            });

        for entry in walker.flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            let is_code = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| CODE_EXTENSIONS.contains(&ext))
                .unwrap_or(false);
            if !is_code {
                continue;
            }
            let Ok(contents) = std::fs::read_to_string(entry.path()) else {
                tracing::warn!("Skipping unreadable file {}", entry.path().display());
                continue;
            };
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            text.push_str(&format!("\n\n// File: {}\n{contents}", relative.display()));
            files += 1;
        }

        Self::from_text(files, text)
    }

    /// Builds a bundle from an already-concatenated payload, applying the
    /// truncation limit.
    pub fn from_text(files: usize, text: String) -> Self {
        let chars = text.chars().count();
        if chars > PAYLOAD_TRUNCATE {
            let mut kept: String = text.chars().take(PAYLOAD_TRUNCATE).collect();
            kept.push_str(TRUNCATION_MARKER);
            Self {
                files,
                chars,
                truncated: true,
                text: kept,
            }
        } else {
            Self {
                files,
                chars,
                truncated: false,
                text,
            }
        }
    }

    /// Returns whether the bundle holds any code at all.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// One-line description of what was actually analyzed, including
    /// whether truncation applied.
    pub fn analyzed_note(&self) -> String {
        if self.truncated {
            format!(
                "Analyzed {} file(s); payload truncated from {} to {} characters.",
                self.files, self.chars, PAYLOAD_TRUNCATE
            )
        } else {
            format!("Analyzed {} file(s), {} characters.", self.files, self.chars)
        }
    }
}

/// The AI text-completion backend, abstracted so tests can substitute fakes
/// without process-wide state.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Sends one system+user prompt pair and returns the raw completion
    /// text.
    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String>;
}

/// Production [`CompletionBackend`] over the OpenAI chat completions API.
pub struct OpenAiBackend {
    /// Configured chat completions client.
    client:      OpenAIClient<OpenAIConfig>,
    /// Model identifier for requests.
    model:       String,
    /// Optional temperature override.
    temperature: Option<f32>,
    /// Optional top-p override.
    top_p:       Option<f32>,
}

impl OpenAiBackend {
    /// Builds a backend from the global configuration; `None` when no API
    /// key is configured.
    pub fn from_config() -> Option<Self> {
        let cfg = config::get();
        let openai = cfg.openai()?;

        let mut client_config = OpenAIConfig::new().with_api_key(openai.api_key());
        if let Some(base) = openai.api_base() {
            client_config = client_config.with_api_base(base);
        }

        Some(Self {
            client:      OpenAIClient::with_config(client_config),
            model:       openai.model().to_string(),
            temperature: openai.temperature(),
            top_p:       openai.top_p(),
        })
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user)
                .build()?
                .into(),
        ];

        let response = self
            .client
            .chat()
            .create(CreateChatCompletionRequest {
                model: self.model.clone(),
                messages,
                temperature: self.temperature,
                top_p: self.top_p,
                n: Some(1),
                stream: Some(false),
                max_completion_tokens: Some(max_tokens),
                response_format: Some(ResponseFormat::JsonObject),
                ..Default::default()
            })
            .await?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow!("No content in completion response"))
    }
}

/// Two-mode scorer over an injected completion backend.
#[derive(Clone)]
pub struct AiQualityScorer {
    /// The backend handle; `None` means no credential is configured and
    /// every call returns [`AiQuality::Failed`] deterministically.
    backend: Option<Arc<dyn CompletionBackend>>,
    /// Course label injected into prompts.
    course:  String,
    /// Deadline for one completion call.
    timeout: Duration,
}

impl AiQualityScorer {
    /// Creates a scorer over an explicit backend handle.
    pub fn new(backend: Option<Arc<dyn CompletionBackend>>, course: String, timeout: Duration) -> Self {
        Self {
            backend,
            course,
            timeout,
        }
    }

    /// Creates a scorer from the global configuration. The backend is
    /// absent when no API key is set.
    pub fn from_config() -> Self {
        let cfg = config::get();
        let backend = OpenAiBackend::from_config()
            .map(|backend| Arc::new(backend) as Arc<dyn CompletionBackend>);
        Self::new(backend, cfg.course().to_string(), cfg.ai_timeout())
    }

    /// Returns whether a backend credential is configured.
    pub fn configured(&self) -> bool {
        self.backend.is_some()
    }

    /// Fixed-rubric mode: scores a single file's content against a static
    /// criteria description, range 0 to 60.
    pub async fn score_fixed(&self, code: &str, criteria: &str) -> AiQuality {
        if code.trim().is_empty() {
            return AiQuality::failed(
                FIXED_MAX_SCORE,
                "No code was provided for quality analysis.".to_string(),
            );
        }
        if criteria.trim().is_empty() {
            return AiQuality::failed(
                FIXED_MAX_SCORE,
                "No analysis criteria were provided.".to_string(),
            );
        }

        let system = format!(
            "You are a Senior Code Reviewer for {}. Analyze the code based on the criteria. \
             Return a JSON object with \"score\" (0-{FIXED_MAX_SCORE}) and \"feedback\" (string).",
            self.course
        );
        let user = format!(
            "Code to analyze:\n```\n{code}\n```\n\nAnalysis Criteria:\n{criteria}\n\nReturn ONLY \
             the JSON object, no additional text."
        );

        match self.complete_checked(&system, &user, FIXED_MAX_TOKENS, FIXED_MAX_SCORE).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Fixed-rubric analysis failed: {e:#}");
                AiQuality::failed(FIXED_MAX_SCORE, format!("AI analysis failed: {e}"))
            }
        }
    }

    /// Custom-rubric mode: scores a multi-file bundle against an
    /// instructor-supplied rubric, range 0 to 100, with passed/errors
    /// lists.
    pub async fn score_custom(&self, bundle: &CodeBundle, rubric: &str) -> AiQuality {
        if bundle.is_empty() {
            return AiQuality::failed(
                CUSTOM_MAX_SCORE,
                "No code files were found in the submission.".to_string(),
            );
        }
        if rubric.trim().is_empty() {
            return AiQuality::failed(
                CUSTOM_MAX_SCORE,
                "No grading criteria were provided.".to_string(),
            );
        }

        let system = format!(
            "You are a Senior Code Reviewer and Grading Assistant for {course}.\n\nThe \
             instructor has provided specific grading criteria that you MUST follow \
             strictly.\n\n**INSTRUCTOR'S CUSTOM GRADING RULES:**\n{rubric}\n\n**YOUR TASK:**\n1. \
             Analyze the submitted code against the instructor's specific criteria above\n2. \
             Award a score from 0-{max} based on how well the code meets these requirements\n3. \
             Provide detailed feedback explaining what was found and what's missing\n4. List \
             specific items that passed the criteria\n5. List specific errors or missing \
             requirements\n\n**OUTPUT FORMAT (JSON):**\n{{\n  \"score\": <number 0-{max}>,\n  \
             \"feedback\": \"<detailed paragraph explaining your assessment>\",\n  \"passed\": \
             [\"<specific requirement that was met>\", \"...\"],\n  \"errors\": [\"<specific \
             issue or missing requirement>\", \"...\"]\n}}\n\nBe strict but fair. Focus on the \
             instructor's criteria, not generic best practices unless specified.",
            course = self.course,
            max = CUSTOM_MAX_SCORE,
        );
        let user = format!(
            "Code to analyze:\n```\n{}\n```\n\nGrade this code based on the instructor's \
             criteria provided in the system prompt.\nReturn ONLY the JSON object, no additional \
             text.",
            bundle.text
        );

        match self.complete_checked(&system, &user, CUSTOM_MAX_TOKENS, CUSTOM_MAX_SCORE).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Custom-rubric analysis failed: {e:#}");
                AiQuality::failed(CUSTOM_MAX_SCORE, format!("AI analysis failed: {e}"))
            }
        }
    }

    /// Runs one timeboxed completion call and validates its response shape.
    async fn complete_checked(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
        max_score: u32,
    ) -> Result<AiQuality> {
        let Some(backend) = self.backend.as_ref() else {
            // Missing credential is a configuration error, downgraded here
            // so the pipeline keeps going.
            return Ok(AiQuality::failed(
                max_score,
                "AI analysis is not configured; no API credential is available.".to_string(),
            ));
        };

        let raw = tokio::time::timeout(self.timeout, backend.complete(system, user, max_tokens))
            .await
            .map_err(|_| anyhow!("completion call timed out after {:?}", self.timeout))?
            .context("completion call failed")?;

        Ok(parse_quality_response(&raw, max_score))
    }
}

/// Validates the backend's JSON response: a numeric `score` field is
/// required, everything else is optional. Malformed responses become
/// [`AiQuality::Failed`], never an error.
fn parse_quality_response(raw: &str, max_score: u32) -> AiQuality {
    let parsed: serde_json::Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            return AiQuality::failed(
                max_score,
                format!("AI returned an unparsable response: {e}"),
            );
        }
    };

    let Some(score) = parsed.get("score").and_then(serde_json::Value::as_f64) else {
        return AiQuality::failed(
            max_score,
            "AI response is missing a numeric score field.".to_string(),
        );
    };

    let clamped = score.round().clamp(0.0, f64::from(max_score)) as u32;
    let feedback = parsed
        .get("feedback")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("No feedback provided")
        .to_string();
    let list = |key: &str| -> Vec<String> {
        parsed
            .get(key)
            .and_then(serde_json::Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default()
    };

    AiQuality::scored(clamped, max_score, feedback, list("passed"), list("errors"))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedBackend(String);

    #[async_trait]
    impl CompletionBackend for CannedBackend {
        async fn complete(&self, _system: &str, _user: &str, _max_tokens: u32) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    fn scorer_with(response: &str) -> AiQualityScorer {
        AiQualityScorer::new(
            Some(Arc::new(CannedBackend(response.to_string()))),
            "General".to_string(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn unconfigured_scorer_fails_deterministically() {
        let scorer = AiQualityScorer::new(None, "General".to_string(), Duration::from_secs(5));

        let first = scorer.score_fixed("let x = 1;", "clean code").await;
        let second = scorer.score_fixed("let x = 1;", "clean code").await;

        assert_eq!(first, second);
        assert!(first.is_failed());
        assert_eq!(first.score(), 0);
        assert_eq!(first.max_score(), FIXED_MAX_SCORE);
    }

    #[tokio::test]
    async fn missing_score_field_is_a_failure() {
        let scorer = scorer_with(r#"{"feedback": "looks fine"}"#);
        let result = scorer.score_fixed("let x = 1;", "clean code").await;

        assert!(result.is_failed());
        assert_eq!(result.score(), 0);
        assert!(result.feedback().contains("missing a numeric score"));
    }

    #[tokio::test]
    async fn unparsable_response_is_a_failure() {
        let scorer = scorer_with("I cannot grade this.");
        let result = scorer.score_fixed("let x = 1;", "clean code").await;

        assert!(result.is_failed());
        assert_eq!(result.score(), 0);
    }

    #[tokio::test]
    async fn valid_score_is_clamped_into_range() {
        let scorer = scorer_with(r#"{"score": 950, "feedback": "generous"}"#);
        let result = scorer.score_fixed("let x = 1;", "clean code").await;

        assert!(!result.is_failed());
        assert_eq!(result.score(), FIXED_MAX_SCORE);
    }

    #[tokio::test]
    async fn custom_mode_keeps_passed_and_errors() {
        let scorer = scorer_with(
            r#"{"score": 72, "feedback": "good", "passed": ["uses functions"], "errors": ["no tests"]}"#,
        );
        let bundle = CodeBundle::from_text(1, "// File: a.js\nlet x = 1;".to_string());
        let result = scorer.score_custom(&bundle, "grade on modularity").await;

        match result {
            AiQuality::Scored(scored) => {
                assert_eq!(scored.score, 72);
                assert_eq!(scored.max_score, CUSTOM_MAX_SCORE);
                assert_eq!(scored.passed, vec!["uses functions"]);
                assert_eq!(scored.errors, vec!["no tests"]);
            }
            AiQuality::Failed { .. } => panic!("expected a scored result"),
        }
    }

    #[tokio::test]
    async fn empty_payload_never_reaches_the_backend() {
        let scorer = scorer_with(r#"{"score": 60}"#);
        let result = scorer.score_fixed("   ", "clean code").await;
        assert!(result.is_failed());

        let bundle = CodeBundle::from_text(0, String::new());
        let result = scorer.score_custom(&bundle, "anything").await;
        assert!(result.is_failed());
    }

    #[test]
    fn bundle_truncation_is_observable() {
        let text = "x".repeat(PAYLOAD_TRUNCATE + 100);
        let bundle = CodeBundle::from_text(3, text);

        assert!(bundle.truncated);
        assert_eq!(bundle.chars, PAYLOAD_TRUNCATE + 100);
        assert!(bundle.text.ends_with(TRUNCATION_MARKER));
        assert!(bundle.analyzed_note().contains("truncated"));
    }

    #[test]
    fn bundle_collects_code_files_with_headers() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(tmp.path().join("Scripts")).unwrap();
        std::fs::create_dir_all(tmp.path().join("node_modules/dep")).unwrap();
        std::fs::write(tmp.path().join("Scripts/index.js"), "let x = 1;").unwrap();
        std::fs::write(tmp.path().join("node_modules/dep/index.js"), "ignored").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "not code").unwrap();

        let bundle = CodeBundle::collect(tmp.path());

        assert_eq!(bundle.files, 1);
        assert!(bundle.text.contains("// File: Scripts/index.js"));
        assert!(bundle.text.contains("let x = 1;"));
        assert!(!bundle.text.contains("ignored"));
    }

    #[test]
    fn report_shape_round_trips() {
        let quality = AiQuality::scored(42, 100, "fine".to_string(), vec!["a".into()], vec![]);
        let report = quality.report();
        let json = serde_json::to_string(&report).unwrap();
        let back: AiQualityReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report, back);
    }
}
