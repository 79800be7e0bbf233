#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! The grading pipeline: intake validation, dedup gate, acquisition,
//! structural and AI checks, aggregation, and persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::{
    acquire::RepositoryAcquirer,
    aggregate::{self, Summary},
    error::{GradeError, ValidationError},
    github::{self, RepoRef},
    quality::{AiQuality, AiQualityReport, AiQualityScorer, CodeBundle, FIXED_MAX_SCORE},
    store::{DedupGate, RecordStore, ReviewRecord},
    structural::{StructuralCheckResult, StructuralChecker, StructuralConfig},
};

/// One grading request as received at the intake boundary.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    /// URL of the repository holding the submitted work.
    pub repository_url:      String,
    /// Branch to grade.
    pub branch_name:         String,
    /// Instructor-supplied free-text grading rubric.
    pub custom_instructions: String,
    /// Submitter identifier; part of the dedup key even when absent.
    #[builder(default)]
    pub submitter_id:        Option<String>,
}

impl Submission {
    /// Validates the intake fields and resolves the repository URL into an
    /// `owner/repo` pair. Nothing else runs when this fails.
    pub fn validate(&self) -> Result<RepoRef, ValidationError> {
        let repo = github::parse_repo_url(&self.repository_url)
            .map_err(|_| ValidationError::InvalidRepositoryUrl(self.repository_url.clone()))?;
        if self.branch_name.trim().is_empty() {
            return Err(ValidationError::MissingBranchName);
        }
        if self.custom_instructions.trim().is_empty() {
            return Err(ValidationError::MissingInstructions);
        }
        Ok(repo)
    }

    /// Label used to name the submission's ephemeral workspace.
    fn workspace_label(&self) -> &str {
        self.submitter_id.as_deref().unwrap_or("submission")
    }
}

/// A coursework module's complete rubric: structural checks plus the fixed
/// AI criteria applied to its designated entry file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRubric {
    /// Structural presence/absence rubric.
    pub structural: StructuralConfig,
    /// File whose content is analyzed in fixed-rubric mode, relative to
    /// the submission root.
    pub entry_file: String,
    /// Static criteria description for the AI analysis.
    pub criteria:   String,
}

impl ModuleRubric {
    /// The built-in HTML/CSS basics module: structural rubric plus a
    /// JavaScript quality analysis of `Scripts/index.js`.
    pub fn html_css_basics() -> Self {
        Self {
            structural: StructuralConfig::html_css_basics(),
            entry_file: "Scripts/index.js".to_string(),
            criteria:   "Evaluate this JavaScript code based on:\n1. Clean code principles \
                         (readability, simplicity)\n2. Variable naming conventions (descriptive, \
                         consistent)\n3. Code modularity (functions are focused, reusable)\n4. \
                         Error handling and edge cases\n5. Modern JavaScript practices (ES6+, \
                         avoiding deprecated patterns)\n6. Comments and documentation"
                .to_string(),
        }
    }
}

/// The full result blob written into a record's `content` column, and
/// re-parsed verbatim on a dedup hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordContent {
    /// Structural section of the result.
    pub structural: StructuralCheckResult,
    /// AI quality section of the result.
    pub ai_quality: AiQualityReport,
    /// Combined totals.
    pub summary:    Summary,
}

/// The grading output returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeReport {
    /// Whether this result came from the dedup gate rather than a fresh
    /// run.
    pub already_graded: bool,
    /// Structural section.
    pub structural:     StructuralCheckResult,
    /// AI quality section.
    pub ai_quality:     AiQualityReport,
    /// Combined totals.
    pub summary:        Summary,
    /// Id of the persisted record, when persistence is configured.
    pub record_id:      Option<String>,
    /// When the result was produced (or originally produced, for cached
    /// results).
    pub created_at:     DateTime<Utc>,
}

/// Orchestrates one grading call end to end.
///
/// Components are injected at construction; tests substitute fakes for the
/// store and the AI backend without any process-wide state.
pub struct Grader {
    /// Fetches submission content into ephemeral workspaces.
    acquirer: RepositoryAcquirer,
    /// AI quality adapter.
    scorer:   AiQualityScorer,
    /// Durable record store; `None` disables dedup and persistence.
    store:    Option<Arc<dyn RecordStore>>,
}

impl Grader {
    /// Creates a grader from explicit parts.
    pub fn new(
        acquirer: RepositoryAcquirer,
        scorer: AiQualityScorer,
        store: Option<Arc<dyn RecordStore>>,
    ) -> Self {
        Self {
            acquirer,
            scorer,
            store,
        }
    }

    /// Grades a submission against the instructor's custom rubric, scoring
    /// the whole code bundle in the 0-100 range.
    pub async fn grade_submission(&self, submission: &Submission) -> Result<GradeReport, GradeError> {
        let repo = submission.validate()?;

        if let Some(cached) = self.check_dedup(&repo, submission).await {
            return Ok(cached);
        }

        // The workspace guard spans everything below; its drop removes the
        // downloaded archive and extraction tree on every exit path.
        let workspace = self
            .acquirer
            .acquire(&repo, &submission.branch_name, submission.workspace_label())
            .await?;

        let bundle = CodeBundle::collect(workspace.content_root());
        tracing::info!("{}", bundle.analyzed_note());

        let structural = StructuralCheckResult {
            score:     0,
            max_score: 0,
            passed:    vec![],
            errors:    vec![],
        };
        let quality = self.scorer.score_custom(&bundle, &submission.custom_instructions).await;
        // Surface what was actually analyzed so truncation is never silent.
        let quality = match quality {
            AiQuality::Scored(mut scored) => {
                scored.feedback = format!("{} {}", bundle.analyzed_note(), scored.feedback);
                AiQuality::Scored(scored)
            }
            failed => failed,
        };

        self.finish(&repo, submission, structural, quality).await
    }

    /// Grades a submission against a module rubric: structural checks run
    /// alongside a fixed-rubric AI analysis of the module's entry file.
    pub async fn grade_module(
        &self,
        submission: &Submission,
        rubric: &ModuleRubric,
    ) -> Result<GradeReport, GradeError> {
        let repo = github::parse_repo_url(&submission.repository_url)
            .map_err(|_| ValidationError::InvalidRepositoryUrl(submission.repository_url.clone()))?;
        if submission.branch_name.trim().is_empty() {
            return Err(ValidationError::MissingBranchName.into());
        }

        if let Some(cached) = self.check_dedup(&repo, submission).await {
            return Ok(cached);
        }

        let workspace = self
            .acquirer
            .acquire(&repo, &submission.branch_name, submission.workspace_label())
            .await?;
        let root = workspace.content_root();

        let checker = StructuralChecker::new(rubric.structural.clone());
        let entry = root.join(&rubric.entry_file);
        let code = std::fs::read_to_string(&entry).unwrap_or_default();

        // Both checks are independent; aggregation waits on the pair.
        let (structural, quality) = tokio::join!(
            async { checker.check(root) },
            async {
                if code.trim().is_empty() {
                    AiQuality::failed(
                        FIXED_MAX_SCORE,
                        format!(
                            "Entry file {} is missing or empty; cannot perform code quality \
                             analysis.",
                            rubric.entry_file
                        ),
                    )
                } else {
                    self.scorer.score_fixed(&code, &rubric.criteria).await
                }
            }
        );

        self.finish(&repo, submission, structural, quality).await
    }

    /// Queries the dedup gate and, on a hit, replays the stored result
    /// verbatim as a cached report.
    async fn check_dedup(&self, repo: &RepoRef, submission: &Submission) -> Option<GradeReport> {
        let store = self.store.as_ref()?;
        let gate = DedupGate::new(Arc::clone(store));
        let record = gate
            .check(
                &repo.key(),
                &submission.branch_name,
                submission.submitter_id.as_deref(),
            )
            .await?;

        match serde_json::from_str::<RecordContent>(&record.content) {
            Ok(content) => {
                tracing::info!(
                    "Returning cached result {} for {}@{}",
                    record.id,
                    repo.key(),
                    submission.branch_name
                );
                Some(GradeReport {
                    already_graded: true,
                    structural:     content.structural,
                    ai_quality:     content.ai_quality,
                    summary:        content.summary,
                    record_id:      Some(record.id),
                    created_at:     record.created_at,
                })
            }
            Err(e) => {
                // A record we cannot replay is treated as a miss; the new
                // run will persist a fresh, parseable one.
                tracing::warn!("Stored content for record {} is unreadable: {e}", record.id);
                None
            }
        }
    }

    /// Aggregates the two sections, persists the result, and assembles the
    /// final report.
    async fn finish(
        &self,
        repo: &RepoRef,
        submission: &Submission,
        structural: StructuralCheckResult,
        quality: AiQuality,
    ) -> Result<GradeReport, GradeError> {
        let summary = aggregate::aggregate(&structural, &quality);
        let ai_quality = quality.report();

        let content = RecordContent {
            structural: structural.clone(),
            ai_quality: ai_quality.clone(),
            summary: summary.clone(),
        };

        let record_id = match self.store.as_ref() {
            Some(store) => {
                let record = ReviewRecord::new(
                    repo.key(),
                    submission.branch_name.clone(),
                    submission.submitter_id.clone(),
                    serde_json::to_string(&content).map_err(crate::error::PersistenceError::from)?,
                    summary.score_summary(),
                );
                // A failed final save surfaces: returning an unpersisted
                // result as if it were saved would lose it.
                store.create(&record).await?;
                tracing::info!("Saved review record {}", record.id);
                Some(record.id)
            }
            None => {
                tracing::warn!("No record store configured; result will not be persisted");
                None
            }
        };

        Ok(GradeReport {
            already_graded: false,
            structural,
            ai_quality,
            summary,
            record_id,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission() -> Submission {
        Submission {
            repository_url:      "https://github.com/octo/site".to_string(),
            branch_name:         "main".to_string(),
            custom_instructions: "Grade for modularity.".to_string(),
            submitter_id:        Some("jane".to_string()),
        }
    }

    #[test]
    fn valid_submission_resolves_owner_repo() {
        let repo = submission().validate().expect("valid");
        assert_eq!(repo.key(), "octo/site");
    }

    #[test]
    fn blank_fields_are_rejected() {
        let mut s = submission();
        s.branch_name = "  ".to_string();
        assert!(matches!(s.validate(), Err(ValidationError::MissingBranchName)));

        let mut s = submission();
        s.custom_instructions = String::new();
        assert!(matches!(s.validate(), Err(ValidationError::MissingInstructions)));

        let mut s = submission();
        s.repository_url = "ftp://example.com/x".to_string();
        assert!(matches!(s.validate(), Err(ValidationError::InvalidRepositoryUrl(_))));
    }

    #[test]
    fn record_content_round_trips() {
        let content = RecordContent {
            structural: StructuralCheckResult {
                score:     35,
                max_score: 40,
                passed:    vec!["Found file: index.html".to_string()],
                errors:    vec!["Missing directory: Assets/".to_string()],
            },
            ai_quality: AiQualityReport {
                score:     48,
                max_score: 60,
                feedback:  "Readable and modular.".to_string(),
                passed:    vec![],
                errors:    vec![],
                failed:    false,
            },
            summary:    aggregate::aggregate(
                &StructuralCheckResult {
                    score:     35,
                    max_score: 40,
                    passed:    vec![],
                    errors:    vec![],
                },
                &AiQuality::scored(48, 60, String::new(), vec![], vec![]),
            ),
        };

        let blob = serde_json::to_string(&content).expect("serialize");
        let back: RecordContent = serde_json::from_str(&blob).expect("parse");
        assert_eq!(content, back);
    }
}
