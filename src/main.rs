#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # gavel
//!
//! Command-line entry points for the grading assistant: grade a submission
//! branch, classify a change-request branch, replay change events, and act
//! on pending reviews.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result, bail};
use bpaf::*;
use colored::Colorize;
use dotenvy::dotenv;
use gavel::{
    acquire::RepositoryAcquirer,
    aggregate::GradingStatus,
    config,
    github::GitHubClient,
    grade::{GradeReport, Grader, ModuleRubric, Submission},
    quality::AiQualityScorer,
    review::ReviewClassifier,
    store::{PostgrestStore, RecordStore, ReviewRecord},
    webhook::{EventDisposition, WebhookHandler, sign_payload},
};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Panel, Style, Width, object::Rows},
};
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Grade a branch against instructor-supplied criteria
    Grade(Option<String>, String, String, String),
    /// Grade a branch against a module rubric
    Module(Option<String>, Option<PathBuf>, String, Option<String>),
    /// Classify a change-request branch locally
    Review(String, Option<PathBuf>),
    /// Deliver a change event from a payload file
    Event(Option<String>, PathBuf),
    /// List reviews awaiting instructor action
    Pending,
    /// Approve a pending review
    Approve(String),
    /// Reject a pending review
    Reject(String),
    /// List the branches of a repository
    Branches(String),
    /// Report which collaborators are configured
    Health,
}

/// Parse the command line arguments and return a `Cmd` enum
fn options() -> Cmd {
    /// parses the repository URL
    fn url() -> impl Parser<String> {
        positional("URL").help("Repository URL (https://github.com/owner/repo)")
    }

    /// parses a required branch name
    fn branch() -> impl Parser<String> {
        positional("BRANCH").help("Branch to grade")
    }

    /// parses the submitter option
    fn submitter() -> impl Parser<Option<String>> {
        short('s')
            .long("submitter")
            .help("Submitter identifier, part of the dedup key")
            .argument("NAME")
            .optional()
    }

    let grade = {
        /// parses instructor criteria text
        fn instructions() -> impl Parser<String> {
            positional("CRITERIA").help("Instructor grading criteria text")
        }

        construct!(Cmd::Grade(submitter(), url(), branch(), instructions()))
            .to_options()
            .command("grade")
            .help("Grade a submission branch against instructor criteria")
    };

    let module = {
        /// parses the module rubric file option
        fn rubric() -> impl Parser<Option<PathBuf>> {
            short('r')
                .long("rubric")
                .help("Module rubric JSON file (defaults to the built-in HTML/CSS module)")
                .argument::<PathBuf>("FILE")
                .optional()
        }

        /// parses an optional branch name
        fn opt_branch() -> impl Parser<Option<String>> {
            positional("BRANCH").help("Branch to grade (defaults to main)").optional()
        }

        construct!(Cmd::Module(submitter(), rubric(), url(), opt_branch()))
            .to_options()
            .command("module")
            .help("Grade a submission branch against a module rubric")
    };

    let review = {
        /// parses the diff file positional
        fn diff_file() -> impl Parser<Option<PathBuf>> {
            positional::<PathBuf>("DIFF")
                .help("File holding the diff or code sample")
                .optional()
        }

        construct!(Cmd::Review(branch(), diff_file()))
            .to_options()
            .command("review")
            .help("Classify a change-request branch from its name and diff")
    };

    let event = {
        /// parses the signature option
        fn signature() -> impl Parser<Option<String>> {
            long("signature")
                .help("sha256=<hex> signature header; computed locally when omitted")
                .argument("SIG")
                .optional()
        }

        /// parses the payload file positional
        fn payload() -> impl Parser<PathBuf> {
            positional::<PathBuf>("PAYLOAD").help("File holding the raw event payload")
        }

        construct!(Cmd::Event(signature(), payload()))
            .to_options()
            .command("event")
            .help("Verify and process a change event payload")
    };

    /// parses a review record id
    fn record_id() -> impl Parser<String> {
        positional("ID").help("Review record id")
    }

    let pending = pure(Cmd::Pending)
        .to_options()
        .command("pending")
        .help("List reviews awaiting instructor action");

    let approve = construct!(Cmd::Approve(record_id()))
        .to_options()
        .command("approve")
        .help("Approve a review and post its feedback");

    let reject = construct!(Cmd::Reject(record_id()))
        .to_options()
        .command("reject")
        .help("Reject a review and request changes");

    let branches = construct!(Cmd::Branches(url()))
        .to_options()
        .command("branches")
        .help("List the branches of a repository");

    let health = pure(Cmd::Health)
        .to_options()
        .command("health")
        .help("Report which collaborators are configured");

    let cmd = construct!([
        grade, module, review, event, pending, approve, reject, branches, health
    ]);

    cmd.to_options()
        .descr("Automated grading assistant and change-request reviewer")
        .run()
}

/// Builds the grading pipeline from the environment-backed configuration.
fn build_grader() -> Grader {
    let github = GitHubClient::from_config();
    let acquirer = RepositoryAcquirer::from_config(github);
    let scorer = AiQualityScorer::from_config();
    Grader::new(acquirer, scorer, record_store())
}

/// Returns the configured record store, if Supabase credentials are set.
fn record_store() -> Option<Arc<dyn RecordStore>> {
    PostgrestStore::from_config()
        .ok()
        .map(|store| Arc::new(store) as Arc<dyn RecordStore>)
}

/// Builds the event handler; fails when no record store is configured,
/// since events exist only to be persisted for instructor review.
fn build_webhook_handler() -> Result<WebhookHandler> {
    let store = record_store()
        .context("SUPABASE_URL and SUPABASE_ANON_KEY must be set to manage reviews")?;
    let cfg = config::get();
    Ok(WebhookHandler::new(
        cfg.webhook_secret().map(str::to_owned),
        ReviewClassifier::default(),
        store,
        GitHubClient::from_config(),
    ))
}

/// One row of the grade report table.
#[derive(Tabled)]
struct SectionRow {
    /// Which section of the grade the row describes.
    #[tabled(rename = "Section")]
    section: String,
    /// Score as `earned/possible`.
    #[tabled(rename = "Score")]
    score:   String,
    /// Supporting detail for the row.
    #[tabled(rename = "Notes")]
    notes:   String,
}

/// Renders a grade report as a table plus a colored status line.
fn show_report(report: &GradeReport) {
    if report.already_graded {
        eprintln!(
            "{}",
            "This submission was already graded; returning the stored review.".yellow()
        );
    }

    let mut rows = Vec::new();
    if report.structural.max_score > 0 {
        let notes = if report.structural.errors.is_empty() {
            "All checks passed".to_string()
        } else {
            report.structural.errors.join("\n")
        };
        rows.push(SectionRow {
            section: "Structural".to_string(),
            score:   format!("{}/{}", report.structural.score, report.structural.max_score),
            notes,
        });
    }
    rows.push(SectionRow {
        section: "AI Quality".to_string(),
        score:   format!("{}/{}", report.ai_quality.score, report.ai_quality.max_score),
        notes:   report.ai_quality.feedback.clone(),
    });

    eprintln!(
        "{}",
        Table::new(&rows)
            .with(Panel::header("Grading Overview"))
            .with(Panel::footer(format!(
                "Total: {}/{} ({:.2}%)",
                report.summary.total_score,
                report.summary.max_total_score,
                report.summary.percentage
            )))
            .with(Modify::new(Rows::new(1..)).with(Width::wrap(48).keep_words(true)))
            .with(
                Modify::new(Rows::first())
                    .with(Alignment::center())
                    .with(Alignment::center_vertical()),
            )
            .with(Style::modern())
    );

    let status = report.summary.status.to_string();
    let status = match report.summary.status {
        GradingStatus::Excellent | GradingStatus::Good => status.green(),
        GradingStatus::Satisfactory | GradingStatus::NeedsImprovement => status.yellow(),
        GradingStatus::Unsatisfactory => status.red(),
    };
    eprintln!("Status: {status}");

    if let Some(id) = &report.record_id {
        eprintln!("Record: {id}");
    }
}

/// One row of the pending-review listing.
#[derive(Tabled)]
struct PendingRow {
    /// Record id.
    #[tabled(rename = "Id")]
    id:      String,
    /// Repository key.
    #[tabled(rename = "Repository")]
    repo:    String,
    /// Branch name.
    #[tabled(rename = "Branch")]
    branch:  String,
    /// Score or classification summary.
    #[tabled(rename = "Summary")]
    summary: String,
    /// Creation timestamp.
    #[tabled(rename = "Created")]
    created: String,
}

impl From<&ReviewRecord> for PendingRow {
    fn from(record: &ReviewRecord) -> Self {
        Self {
            id:      record.id.clone(),
            repo:    record.repo_key.clone(),
            branch:  record.branch_name.clone(),
            summary: record.score_summary.clone(),
            created: record.created_at.to_rfc3339(),
        }
    }
}

/// Prints a one-line configured/missing report for a collaborator.
fn health_line(name: &str, configured: bool) {
    let state = if configured {
        "configured".green()
    } else {
        "missing".red()
    };
    eprintln!("{name:<24} {state}");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false);
    let filter_layer = LevelFilter::from_level(Level::INFO);
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    let cmd = options();

    match cmd {
        Cmd::Grade(submitter, url, branch, instructions) => {
            let submission = Submission::builder()
                .repository_url(url)
                .branch_name(branch)
                .custom_instructions(instructions)
                .submitter_id(submitter)
                .build();
            let report = build_grader().grade_submission(&submission).await?;
            show_report(&report);
        }
        Cmd::Module(submitter, rubric_file, url, branch) => {
            let rubric = match rubric_file {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("Could not read rubric {}", path.display()))?;
                    serde_json::from_str::<ModuleRubric>(&text)
                        .with_context(|| format!("Could not parse rubric {}", path.display()))?
                }
                None => ModuleRubric::html_css_basics(),
            };
            let submission = Submission::builder()
                .repository_url(url)
                .branch_name(branch.unwrap_or_else(|| "main".to_string()))
                .custom_instructions(rubric.criteria.clone())
                .submitter_id(submitter)
                .build();
            let report = build_grader().grade_module(&submission, &rubric).await?;
            show_report(&report);
        }
        Cmd::Review(branch, diff_file) => {
            let diff = match diff_file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Could not read diff {}", path.display()))?,
                None => String::new(),
            };
            let classification = ReviewClassifier::default().classify(&branch, &diff);
            println!("{}", classification.feedback);
            eprintln!(
                "Status: {} Severity: {}",
                classification.status, classification.severity
            );
        }
        Cmd::Event(signature, payload_file) => {
            let payload = std::fs::read(&payload_file)
                .with_context(|| format!("Could not read payload {}", payload_file.display()))?;
            let handler = build_webhook_handler()?;
            let signature = match signature {
                Some(sig) => sig,
                None => {
                    let secret = config::get()
                        .webhook_secret()
                        .map(str::to_owned)
                        .context("GITHUB_WEBHOOK_SECRET must be set to sign the payload")?;
                    sign_payload(&secret, &payload)
                }
            };
            match handler.handle_event(&payload, Some(&signature)).await? {
                EventDisposition::Processed {
                    record_id,
                    classification,
                } => {
                    eprintln!(
                        "Saved review {record_id} ({} / {})",
                        classification.status, classification.severity
                    );
                    println!("{}", classification.feedback);
                }
                EventDisposition::Ignored { action } => {
                    eprintln!("Event with action `{action}` acknowledged but not processed");
                }
            }
        }
        Cmd::Pending => {
            let handler = build_webhook_handler()?;
            let pending = handler.pending().await?;
            if pending.is_empty() {
                eprintln!("No reviews awaiting action.");
            } else {
                let rows: Vec<PendingRow> = pending.iter().map(PendingRow::from).collect();
                eprintln!(
                    "{}",
                    Table::new(&rows)
                        .with(Panel::header("Pending Reviews"))
                        .with(Modify::new(Rows::new(1..)).with(Width::wrap(36).keep_words(true)))
                        .with(Style::modern())
                );
            }
        }
        Cmd::Approve(id) => {
            let handler = build_webhook_handler()?;
            let record = handler.approve(&id).await?;
            eprintln!("Review {} is now {}", record.id, record.status);
        }
        Cmd::Reject(id) => {
            let handler = build_webhook_handler()?;
            let record = handler.reject(&id).await?;
            eprintln!("Review {} is now {}", record.id, record.status);
        }
        Cmd::Branches(url) => {
            let repo = gavel::github::parse_repo_url(&url)?;
            let branches = GitHubClient::from_config().list_branches(&repo).await?;
            if branches.is_empty() {
                bail!("No branches found for {repo}");
            }
            eprintln!(
                "{}",
                Table::new(&branches)
                    .with(Panel::header(format!("Branches of {repo}")))
                    .with(Style::modern())
            );
        }
        Cmd::Health => {
            let cfg = config::get();
            eprintln!("{}", "Collaborator configuration".bold());
            health_line("Hosting API token", cfg.github_token().is_some());
            health_line("AI credential", cfg.openai().is_some());
            health_line("Record store", cfg.postgrest().is_some());
            health_line("Webhook secret", cfg.webhook_secret().is_some());
        }
    };

    Ok(())
}
