use std::{
    io::{Read, Write},
    net::TcpListener,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use gavel::{
    acquire::RepositoryAcquirer,
    error::{GradeError, PersistenceError},
    github::GitHubClient,
    grade::{Grader, ModuleRubric, RecordContent, Submission},
    quality::{AiQualityScorer, CompletionBackend},
    store::{RecordStatus, RecordStore, ReviewRecord},
    structural::StructuralConfig,
};

/// Serves every incoming request with the same zip archive, forever.
fn serve_archive(archive: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
    let base = format!("http://{}", listener.local_addr().expect("local addr"));

    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/zip\r\nContent-Length: \
                 {}\r\nConnection: close\r\n\r\n",
                archive.len()
            );
            let _ = stream.write_all(header.as_bytes());
            let _ = stream.write_all(&archive);
        }
    });

    base
}

/// A zipball-shaped archive: one root folder wrapping the submission.
fn submission_archive() -> Vec<u8> {
    use zip::write::SimpleFileOptions;

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = SimpleFileOptions::default();
        writer.add_directory("site-main/", options).unwrap();
        writer.add_directory("site-main/Scripts/", options).unwrap();
        writer.start_file("site-main/Scripts/index.js", options).unwrap();
        writer
            .write_all(b"function greet(name) {\n  return `hello ${name}`;\n}\n")
            .unwrap();
        writer.start_file("site-main/index.html", options).unwrap();
        writer.write_all(b"<html></html>").unwrap();
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

struct CountingBackend {
    calls:    Arc<AtomicUsize>,
    response: String,
}

#[async_trait]
impl CompletionBackend for CountingBackend {
    async fn complete(
        &self,
        _system: &str,
        _user: &str,
        _max_tokens: u32,
    ) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

#[derive(Default)]
struct MemoryStore {
    rows:       Mutex<Vec<ReviewRecord>>,
    fail_reads: bool,
    fail_writes: bool,
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create(&self, record: &ReviewRecord) -> Result<(), PersistenceError> {
        if self.fail_writes {
            return Err(PersistenceError::Backend {
                message: "store rejected the write".to_string(),
            });
        }
        self.rows.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn find_latest(
        &self,
        repo_key: &str,
        branch_name: &str,
        submitter_id: Option<&str>,
    ) -> Result<Option<ReviewRecord>, PersistenceError> {
        if self.fail_reads {
            return Err(PersistenceError::Backend {
                message: "store is unavailable".to_string(),
            });
        }
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|row| {
                row.repo_key == repo_key
                    && row.branch_name == branch_name
                    && row.submitter_id.as_deref() == submitter_id
            })
            .max_by_key(|row| row.created_at)
            .cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<ReviewRecord, PersistenceError> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|row| row.id == id)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound { id: id.to_string() })
    }

    async fn update_status(
        &self,
        id: &str,
        status: RecordStatus,
    ) -> Result<ReviewRecord, PersistenceError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| PersistenceError::NotFound { id: id.to_string() })?;
        row.status = status;
        row.updated_at = chrono::Utc::now();
        Ok(row.clone())
    }

    async fn count(&self, status: Option<RecordStatus>) -> Result<u64, PersistenceError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|row| status.is_none_or(|s| row.status == s))
            .count() as u64)
    }

    async fn list_pending(&self) -> Result<Vec<ReviewRecord>, PersistenceError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|row| row.status == RecordStatus::Pending)
            .cloned()
            .collect())
    }
}

fn rubric() -> ModuleRubric {
    ModuleRubric {
        structural: StructuralConfig {
            module_name:          "Fixture".to_string(),
            required_directories: vec!["Scripts".to_string()],
            required_files:       vec!["Scripts/index.js".to_string()],
            directory_points:     5,
            file_points:          5,
            max_score:            10,
        },
        entry_file: "Scripts/index.js".to_string(),
        criteria:   "Evaluate readability.".to_string(),
    }
}

fn submission() -> Submission {
    Submission {
        repository_url:      "https://github.com/octo/site".to_string(),
        branch_name:         "main".to_string(),
        custom_instructions: "Grade for readability.".to_string(),
        submitter_id:        Some("jane".to_string()),
    }
}

struct Pipeline {
    grader:  Grader,
    calls:   Arc<AtomicUsize>,
    store:   Arc<MemoryStore>,
    staging: tempfile::TempDir,
}

fn pipeline(api_base: &str, ai_response: &str, store: MemoryStore) -> Pipeline {
    let http = reqwest::Client::builder().no_proxy().build().expect("client");
    let github = GitHubClient::new(http, api_base.to_string(), None);
    let staging = tempfile::tempdir().expect("staging dir");
    let acquirer = RepositoryAcquirer::new(
        github,
        staging.path().to_path_buf(),
        Duration::from_secs(10),
        10 * 1024 * 1024,
    );

    let calls = Arc::new(AtomicUsize::new(0));
    let backend = CountingBackend {
        calls:    Arc::clone(&calls),
        response: ai_response.to_string(),
    };
    let scorer = AiQualityScorer::new(
        Some(Arc::new(backend)),
        "General".to_string(),
        Duration::from_secs(10),
    );

    let store = Arc::new(store);
    let grader = Grader::new(acquirer, scorer, Some(store.clone() as Arc<dyn RecordStore>));
    Pipeline {
        grader,
        calls,
        store,
        staging,
    }
}

#[tokio::test]
async fn module_grading_runs_end_to_end_and_persists() {
    let base = serve_archive(submission_archive());
    let p = pipeline(&base, r#"{"score": 45, "feedback": "tidy code"}"#, MemoryStore::default());

    let report = p.grader.grade_module(&submission(), &rubric()).await.expect("grade");

    assert!(!report.already_graded);
    assert_eq!(report.structural.score, 10);
    assert_eq!(report.ai_quality.score, 45);
    assert_eq!(report.summary.total_score, 55);
    assert_eq!(report.summary.max_total_score, 70);
    assert_eq!(report.summary.percentage, 78.57);
    assert_eq!(p.calls.load(Ordering::SeqCst), 1);

    // The persisted blob re-parses to the exact sections of the report.
    let rows = p.store.rows.lock().unwrap();
    assert_eq!(rows.len(), 1);
    let content: RecordContent = serde_json::from_str(&rows[0].content).expect("parse blob");
    assert_eq!(content.structural, report.structural);
    assert_eq!(content.ai_quality, report.ai_quality);
    assert_eq!(content.summary, report.summary);
    assert_eq!(rows[0].score_summary, "55/70");
    assert_eq!(rows[0].status, RecordStatus::Pending);
}

#[tokio::test]
async fn second_identical_call_hits_the_dedup_gate() {
    let base = serve_archive(submission_archive());
    let p = pipeline(&base, r#"{"score": 45, "feedback": "tidy code"}"#, MemoryStore::default());

    let first = p.grader.grade_module(&submission(), &rubric()).await.expect("first");
    let second = p.grader.grade_module(&submission(), &rubric()).await.expect("second");

    assert!(!first.already_graded);
    assert!(second.already_graded);
    assert_eq!(second.record_id, first.record_id);
    assert_eq!(second.summary, first.summary);
    // The AI backend ran exactly once across both calls.
    assert_eq!(p.calls.load(Ordering::SeqCst), 1);
    assert_eq!(p.store.rows.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn different_submitter_is_a_different_dedup_key() {
    let base = serve_archive(submission_archive());
    let p = pipeline(&base, r#"{"score": 45, "feedback": "tidy code"}"#, MemoryStore::default());

    p.grader.grade_module(&submission(), &rubric()).await.expect("first");

    let mut other = submission();
    other.submitter_id = None;
    let report = p.grader.grade_module(&other, &rubric()).await.expect("second");

    assert!(!report.already_graded);
    assert_eq!(p.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn dedup_read_failure_fails_open() {
    let base = serve_archive(submission_archive());
    let store = MemoryStore {
        fail_reads: true,
        ..MemoryStore::default()
    };
    let p = pipeline(&base, r#"{"score": 45, "feedback": "tidy code"}"#, store);

    let report = p.grader.grade_module(&submission(), &rubric()).await.expect("grade");

    assert!(!report.already_graded);
    assert_eq!(p.calls.load(Ordering::SeqCst), 1);
    assert_eq!(p.store.rows.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn final_save_failure_surfaces() {
    let base = serve_archive(submission_archive());
    let store = MemoryStore {
        fail_writes: true,
        ..MemoryStore::default()
    };
    let p = pipeline(&base, r#"{"score": 45, "feedback": "tidy code"}"#, store);

    let err = p.grader.grade_module(&submission(), &rubric()).await.unwrap_err();
    assert!(matches!(err, GradeError::Persistence(_)));
}

#[tokio::test]
async fn scorer_failure_degrades_to_zero_score_and_still_cleans_up() {
    let base = serve_archive(submission_archive());
    let p = pipeline(&base, "not json at all", MemoryStore::default());

    let report = p.grader.grade_module(&submission(), &rubric()).await.expect("grade");

    assert!(report.ai_quality.failed);
    assert_eq!(report.ai_quality.score, 0);
    assert_eq!(report.structural.score, 10);
    assert_eq!(report.summary.total_score, 10);

    // The workspace guard removed the downloaded archive and tree.
    let leftovers: Vec<_> = std::fs::read_dir(p.staging.path()).expect("read staging").collect();
    assert!(leftovers.is_empty(), "staging dir should be empty: {leftovers:?}");
}

#[tokio::test]
async fn custom_grading_scores_the_whole_bundle() {
    let base = serve_archive(submission_archive());
    let p = pipeline(
        &base,
        r#"{"score": 82, "feedback": "solid", "passed": ["modular"], "errors": []}"#,
        MemoryStore::default(),
    );

    let report = p.grader.grade_submission(&submission()).await.expect("grade");

    assert_eq!(report.ai_quality.max_score, 100);
    assert_eq!(report.ai_quality.score, 82);
    assert_eq!(report.structural.max_score, 0);
    assert_eq!(report.summary.max_total_score, 100);
    assert_eq!(report.summary.percentage, 82.0);
    assert!(report.ai_quality.feedback.contains("Analyzed 2 file(s)"));
}

#[tokio::test]
async fn validation_failures_do_no_work() {
    let base = serve_archive(submission_archive());
    let p = pipeline(&base, r#"{"score": 45, "feedback": "x"}"#, MemoryStore::default());

    let mut bad = submission();
    bad.repository_url = "https://example.com/owner/repo".to_string();
    let err = p.grader.grade_submission(&bad).await.unwrap_err();

    assert!(matches!(err, GradeError::Validation(_)));
    assert_eq!(p.calls.load(Ordering::SeqCst), 0);
    assert_eq!(p.store.rows.lock().unwrap().len(), 0);
}
