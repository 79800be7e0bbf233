#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Change-event intake: signature verification, event filtering,
//! classification persistence, and the instructor approve/reject actions.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{
    error::EventError,
    github::{self, GitHubClient},
    review::{BranchClassification, ReviewClassifier},
    store::{RecordStatus, RecordStore, ReviewRecord},
};

/// Keyed hash used over raw event payloads.
type HmacSha256 = Hmac<Sha256>;

/// Actions that trigger classification; everything else is acknowledged
/// and ignored.
const PROCESSED_ACTIONS: &[&str] = &["opened", "synchronize"];

/// A verified change event as delivered to the intake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// What happened to the change request.
    pub action:              String,
    /// Branch the change request comes from.
    pub branch_name:         String,
    /// Diff text or representative code sample for the change.
    #[serde(default)]
    pub diff_or_code_sample: String,
    /// URL of the change request on the hosting surface.
    pub source_url:          String,
}

/// The content blob persisted for a classified change event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecordContent {
    /// URL of the change request, used later to post instructor feedback.
    pub source_url:     String,
    /// The classifier's verdict at intake time.
    pub classification: BranchClassification,
}

/// Outcome of one delivered event.
#[derive(Debug)]
pub enum EventDisposition {
    /// The event was classified and persisted for instructor review.
    Processed {
        /// Id of the persisted record.
        record_id:      String,
        /// The classification stored with it.
        classification: BranchClassification,
    },
    /// The event was authentic but carried an action outside the
    /// processed set.
    Ignored {
        /// The action that was acknowledged.
        action: String,
    },
}

/// Verifies a `sha256=<hex>` signature header against the raw payload.
///
/// The comparison runs in constant time; any malformed or mismatched
/// signature rejects the event before classification runs.
pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    signature: Option<&str>,
) -> Result<(), EventError> {
    let header = signature.ok_or(EventError::MissingSignature)?;
    let hex_digest = header
        .strip_prefix("sha256=")
        .ok_or(EventError::MalformedSignature)?;
    let expected = hex::decode(hex_digest).map_err(|_| EventError::MalformedSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| EventError::MalformedSignature)?;
    mac.update(payload);
    mac.verify_slice(&expected)
        .map_err(|_| EventError::SignatureMismatch)
}

/// Computes the `sha256=<hex>` signature for a payload. Test and tooling
/// helper for producing deliverable events.
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("any key length works");
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Receives change events and carries out instructor decisions on the
/// persisted reviews.
pub struct WebhookHandler {
    /// Shared secret for event verification; intake refuses to run
    /// without one.
    secret:     Option<String>,
    /// The classification engine.
    classifier: ReviewClassifier,
    /// Store holding review records.
    store:      Arc<dyn RecordStore>,
    /// Hosting client used to post instructor feedback.
    github:     GitHubClient,
}

impl WebhookHandler {
    /// Creates a handler from explicit parts.
    pub fn new(
        secret: Option<String>,
        classifier: ReviewClassifier,
        store: Arc<dyn RecordStore>,
        github: GitHubClient,
    ) -> Self {
        Self {
            secret,
            classifier,
            store,
            github,
        }
    }

    /// Verifies, filters, classifies, and persists one delivered event.
    ///
    /// Unverifiable events are rejected before any classification; actions
    /// outside the processed set are acknowledged without side effects.
    pub async fn handle_event(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<EventDisposition, EventError> {
        let secret = self.secret.as_deref().ok_or(EventError::MissingSecret)?;
        verify_signature(secret, payload, signature)?;

        let event: ChangeEvent = serde_json::from_slice(payload)?;

        if !PROCESSED_ACTIONS.contains(&event.action.as_str()) {
            tracing::info!("Ignoring change event with action `{}`", event.action);
            return Ok(EventDisposition::Ignored { action: event.action });
        }

        let classification = self
            .classifier
            .classify(&event.branch_name, &event.diff_or_code_sample);
        tracing::info!(
            "Classified {} as {} ({})",
            event.branch_name,
            classification.status,
            classification.severity
        );

        let repo_key = github::parse_repo_url(&event.source_url)
            .map(|repo| repo.key())
            .unwrap_or_else(|_| event.source_url.clone());
        let content = EventRecordContent {
            source_url:     event.source_url.clone(),
            classification: classification.clone(),
        };
        let record = ReviewRecord::new(
            repo_key,
            event.branch_name.clone(),
            None,
            serde_json::to_string(&content).map_err(EventError::MalformedPayload)?,
            classification.status.to_string(),
        );
        self.store
            .create(&record)
            .await
            .map_err(EventError::Persistence)?;

        Ok(EventDisposition::Processed {
            record_id: record.id,
            classification,
        })
    }

    /// Approves a pending review: transitions the record and posts its
    /// feedback to the change request as a comment.
    pub async fn approve(&self, id: &str) -> Result<ReviewRecord> {
        let record = self.store.find_by_id(id).await?;
        if record.status == RecordStatus::Approved {
            bail!("Review {id} is already approved");
        }

        let updated = self.store.update_status(id, RecordStatus::Approved).await?;

        if let Some((repo, number, feedback)) = self.review_surface(&updated) {
            let body = format!("## Review Approved by Instructor\n\n{feedback}");
            if let Err(e) = self.github.post_issue_comment(&repo, number, &body).await {
                tracing::warn!("Could not post approval feedback for {id}: {e:#}");
            }
        }

        Ok(updated)
    }

    /// Rejects a pending review: transitions the record and posts a
    /// change-request review, falling back to a plain comment when the
    /// hosting API refuses the structured review.
    pub async fn reject(&self, id: &str) -> Result<ReviewRecord> {
        let record = self.store.find_by_id(id).await?;
        if record.status == RecordStatus::Rejected {
            bail!("Review {id} is already rejected");
        }

        let updated = self.store.update_status(id, RecordStatus::Rejected).await?;

        if let Some((repo, number, feedback)) = self.review_surface(&updated) {
            let body = format!("## Changes Requested by Instructor\n\n{feedback}");
            if let Err(e) = self.github.post_change_request(&repo, number, &body).await {
                tracing::warn!("Structured change request for {id} was refused, falling back to a comment: {e:#}");
                if let Err(e) = self.github.post_issue_comment(&repo, number, &body).await {
                    tracing::warn!("Could not post rejection feedback for {id}: {e:#}");
                }
            }
        }

        Ok(updated)
    }

    /// Lists reviews still awaiting instructor action.
    pub async fn pending(&self) -> Result<Vec<ReviewRecord>> {
        self.store.list_pending().await.context("Could not list pending reviews")
    }

    /// Extracts the change-request surface (repo, number, feedback) from a
    /// record, when its content blob carries one. Grading records have no
    /// source URL; instructor actions on them only transition status.
    fn review_surface(&self, record: &ReviewRecord) -> Option<(github::RepoRef, u64, String)> {
        if !self.github.authenticated() {
            tracing::warn!("No hosting credential configured; feedback will not be posted");
            return None;
        }
        let content: EventRecordContent = serde_json::from_str(&record.content).ok()?;
        let (repo, number) = github::parse_pull_url(&content.source_url)?;
        Some((repo, number, content.classification.feedback))
    }
}
