#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Durable review records and the dedup gate that keeps the AI backend from
//! being invoked twice for an identical submission.

use std::{fmt::Display, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use postgrest::Postgrest;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{config, error::PersistenceError};

/// Table holding review records.
const REVIEWS_TABLE: &str = "reviews";

/// Lifecycle status of a persisted review record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    /// Awaiting instructor action.
    #[serde(rename = "PENDING")]
    Pending,
    /// Approved by an instructor.
    #[serde(rename = "APPROVED")]
    Approved,
    /// Rejected by an instructor.
    #[serde(rename = "REJECTED")]
    Rejected,
}

impl Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RecordStatus::Pending => "PENDING",
            RecordStatus::Approved => "APPROVED",
            RecordStatus::Rejected => "REJECTED",
        };
        write!(f, "{label}")
    }
}

/// One persisted grading or change-request review.
///
/// Created once per non-cached grading call or incoming change event,
/// mutated only by an instructor approve/reject action, never deleted by
/// the grading path. Other components treat `content` as an opaque blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRecord {
    /// Client-generated UUID.
    pub id:            String,
    /// Canonical `owner/repo` key.
    pub repo_key:      String,
    /// Branch the record was produced for.
    pub branch_name:   String,
    /// Submitter identifier; `None` for anonymous submissions.
    pub submitter_id:  Option<String>,
    /// Opaque JSON blob holding the full result at write time.
    pub content:       String,
    /// Short `total/max` score rendering for listings.
    pub score_summary: String,
    /// Lifecycle status.
    pub status:        RecordStatus,
    /// Creation timestamp.
    pub created_at:    DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at:    DateTime<Utc>,
}

impl ReviewRecord {
    /// Builds a fresh `PENDING` record with a client-side UUID and
    /// timestamps.
    pub fn new(
        repo_key: impl Into<String>,
        branch_name: impl Into<String>,
        submitter_id: Option<String>,
        content: String,
        score_summary: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            repo_key: repo_key.into(),
            branch_name: branch_name.into(),
            submitter_id,
            content,
            score_summary: score_summary.into(),
            status: RecordStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The durable record store consumed by the grading and review paths.
///
/// Injected explicitly into the components that persist or read records, so
/// tests can substitute in-memory fakes.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persists a new record.
    async fn create(&self, record: &ReviewRecord) -> Result<(), PersistenceError>;

    /// Returns the most recent record matching the exact dedup tuple, or
    /// `None`. A `submitter_id` of `None` matches only records stored with
    /// an explicit null submitter.
    async fn find_latest(
        &self,
        repo_key: &str,
        branch_name: &str,
        submitter_id: Option<&str>,
    ) -> Result<Option<ReviewRecord>, PersistenceError>;

    /// Returns the record with the given id.
    async fn find_by_id(&self, id: &str) -> Result<ReviewRecord, PersistenceError>;

    /// Transitions a record's status, touching `updated_at`. Returns the
    /// updated record.
    async fn update_status(
        &self,
        id: &str,
        status: RecordStatus,
    ) -> Result<ReviewRecord, PersistenceError>;

    /// Counts records, optionally restricted to one status.
    async fn count(&self, status: Option<RecordStatus>) -> Result<u64, PersistenceError>;

    /// Lists records still awaiting instructor action, most recent first.
    async fn list_pending(&self) -> Result<Vec<ReviewRecord>, PersistenceError>;
}

/// Production [`RecordStore`] over the Supabase PostgREST endpoint.
pub struct PostgrestStore {
    /// Configured PostgREST client.
    client: Postgrest,
}

impl PostgrestStore {
    /// Creates a store over an explicit client.
    pub fn new(client: Postgrest) -> Self {
        Self { client }
    }

    /// Creates a store from the global configuration; fails when Supabase
    /// credentials are absent.
    pub fn from_config() -> Result<Self, PersistenceError> {
        config::postgrest_client()
            .map(Self::new)
            .ok_or(PersistenceError::Unconfigured)
    }

    /// Decodes a PostgREST response body into a list of records, mapping
    /// non-success statuses onto the persistence taxonomy.
    async fn decode_rows(
        response: reqwest::Response,
    ) -> Result<Vec<ReviewRecord>, PersistenceError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(PersistenceError::Backend { message: body });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl RecordStore for PostgrestStore {
    async fn create(&self, record: &ReviewRecord) -> Result<(), PersistenceError> {
        let body = serde_json::to_string(record)?;
        let response = self.client.from(REVIEWS_TABLE).insert(body).execute().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PersistenceError::Backend { message });
        }
        Ok(())
    }

    async fn find_latest(
        &self,
        repo_key: &str,
        branch_name: &str,
        submitter_id: Option<&str>,
    ) -> Result<Option<ReviewRecord>, PersistenceError> {
        let mut query = self
            .client
            .from(REVIEWS_TABLE)
            .select("*")
            .eq("repo_key", repo_key)
            .eq("branch_name", branch_name);
        query = match submitter_id {
            Some(submitter) => query.eq("submitter_id", submitter),
            None => query.is("submitter_id", "null"),
        };

        let response = query.order("created_at.desc").limit(1).execute().await?;
        let mut rows = Self::decode_rows(response).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0))
        })
    }

    async fn find_by_id(&self, id: &str) -> Result<ReviewRecord, PersistenceError> {
        let response = self
            .client
            .from(REVIEWS_TABLE)
            .select("*")
            .eq("id", id)
            .limit(1)
            .execute()
            .await?;

        let mut rows = Self::decode_rows(response).await?;
        if rows.is_empty() {
            return Err(PersistenceError::NotFound { id: id.to_string() });
        }
        Ok(rows.remove(0))
    }

    async fn update_status(
        &self,
        id: &str,
        status: RecordStatus,
    ) -> Result<ReviewRecord, PersistenceError> {
        let body = json!({
            "status": status,
            "updated_at": Utc::now(),
        })
        .to_string();

        let response = self
            .client
            .from(REVIEWS_TABLE)
            .eq("id", id)
            .update(body)
            .execute()
            .await?;

        let mut rows = Self::decode_rows(response).await?;
        if rows.is_empty() {
            return Err(PersistenceError::NotFound { id: id.to_string() });
        }
        Ok(rows.remove(0))
    }

    async fn count(&self, status: Option<RecordStatus>) -> Result<u64, PersistenceError> {
        let mut query = self.client.from(REVIEWS_TABLE).select("id");
        if let Some(status) = status {
            query = query.eq("status", status.to_string());
        }

        let response = query.execute().await?;
        let http_status = response.status();
        let body = response.text().await?;
        if !http_status.is_success() {
            return Err(PersistenceError::Backend { message: body });
        }
        let rows: Vec<serde_json::Value> = serde_json::from_str(&body)?;
        Ok(rows.len() as u64)
    }

    async fn list_pending(&self) -> Result<Vec<ReviewRecord>, PersistenceError> {
        let response = self
            .client
            .from(REVIEWS_TABLE)
            .select("*")
            .eq("status", RecordStatus::Pending.to_string())
            .order("created_at.desc")
            .execute()
            .await?;

        Self::decode_rows(response).await
    }
}

/// Short-circuits grading when an identical submission was already scored.
///
/// The gate takes no lock on the key: two concurrent identical requests may
/// both miss and both persist. That duplication is an accepted cost; the
/// invariant defended here is only that a *completed* prior grading is
/// never recomputed.
#[derive(Clone)]
pub struct DedupGate {
    /// Store queried for prior results.
    store: Arc<dyn RecordStore>,
}

impl DedupGate {
    /// Creates a gate over the given store.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Returns the most recent record for the exact dedup tuple, or `None`.
    ///
    /// A store failure fails open: the miss is logged and grading proceeds,
    /// since re-scoring is preferable to refusing service while the store
    /// is down.
    pub async fn check(
        &self,
        repo_key: &str,
        branch_name: &str,
        submitter_id: Option<&str>,
    ) -> Option<ReviewRecord> {
        match self.store.find_latest(repo_key, branch_name, submitter_id).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(
                    "Dedup lookup for {repo_key}@{branch_name} failed, proceeding as a miss: {e}"
                );
                None
            }
        }
    }
}
