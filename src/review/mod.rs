#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Heuristic classification of change-request branches.
//!
//! A pure function of (branch name, diff text): no I/O, no persisted state
//! between calls, and no way to panic on malformed input — unknown branch
//! shapes fall through to the [`BranchKind::Other`] variant.

pub mod feedback;
pub mod signals;

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use signals::{DiffSignals, PatternSignals};

/// Line-count ceiling for a feature change before it draws an issue.
const FEATURE_LINE_LIMIT: usize = 500;

/// Line-count ceiling for a hotfix before it draws a critical issue.
const HOTFIX_LINE_LIMIT: usize = 100;

/// File-count ceiling for a hotfix.
const HOTFIX_FILE_LIMIT: usize = 5;

/// Issue budget for a feature branch to stay approved.
const FEATURE_ISSUE_BUDGET: usize = 3;

/// Issue budget for a hotfix to stay out of needs-changes.
const HOTFIX_ISSUE_BUDGET: usize = 2;

/// Marker prefix identifying a critical issue in a hotfix review.
const CRITICAL_MARKER: &str = "CRITICAL";

/// The mutually exclusive branch categories, selected by name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchKind {
    /// `main` or `master`.
    Main,
    /// `feature/*`.
    Feature,
    /// `hotfix/*`.
    Hotfix,
    /// Everything else.
    Other,
}

impl Display for BranchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            BranchKind::Main => "MAIN",
            BranchKind::Feature => "FEATURE",
            BranchKind::Hotfix => "HOTFIX",
            BranchKind::Other => "OTHER",
        };
        write!(f, "{label}")
    }
}

/// Recommendation produced by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassificationStatus {
    /// The change can merge as-is.
    #[serde(rename = "APPROVED")]
    Approved,
    /// The change must not merge.
    #[serde(rename = "REJECTED")]
    Rejected,
    /// The change needs rework before approval.
    #[serde(rename = "NEEDS_CHANGES")]
    NeedsChanges,
    /// Outside the heuristics; a human must look.
    #[serde(rename = "PENDING")]
    Pending,
}

impl Display for ClassificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ClassificationStatus::Approved => "APPROVED",
            ClassificationStatus::Rejected => "REJECTED",
            ClassificationStatus::NeedsChanges => "NEEDS_CHANGES",
            ClassificationStatus::Pending => "PENDING",
        };
        write!(f, "{label}")
    }
}

/// How serious the findings are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Must be addressed before anything merges.
    #[serde(rename = "CRITICAL")]
    Critical,
    /// Significant rework needed.
    #[serde(rename = "MAJOR")]
    Major,
    /// Small or no findings.
    #[serde(rename = "MINOR")]
    Minor,
    /// Informational only.
    #[serde(rename = "INFO")]
    Info,
}

impl Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Severity::Critical => "CRITICAL",
            Severity::Major => "MAJOR",
            Severity::Minor => "MINOR",
            Severity::Info => "INFO",
        };
        write!(f, "{label}")
    }
}

/// The classifier's full verdict on one change request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchClassification {
    /// Which branch category matched.
    pub kind:        BranchKind,
    /// The recommendation.
    pub status:      ClassificationStatus,
    /// Finding severity.
    pub severity:    Severity,
    /// True only when `status` is approving for this variant's rules.
    pub approved:    bool,
    /// What the change does well.
    pub positives:   Vec<String>,
    /// Problems found.
    pub issues:      Vec<String>,
    /// Non-blocking improvement ideas.
    pub suggestions: Vec<String>,
    /// Assembled feedback, ending in the recommendation line for `status`.
    pub feedback:    String,
}

/// Maps (branch name, diff text) to a classification.
pub struct ReviewClassifier {
    /// Signal extraction heuristics.
    signals: Box<dyn DiffSignals>,
}

impl Default for ReviewClassifier {
    fn default() -> Self {
        Self::new(Box::new(PatternSignals::new()))
    }
}

impl ReviewClassifier {
    /// Creates a classifier over explicit heuristics.
    pub fn new(signals: Box<dyn DiffSignals>) -> Self {
        Self { signals }
    }

    /// Classifies one change request. First matching variant wins; the
    /// default-branch variant is terminal and runs no further heuristics.
    pub fn classify(&self, branch_name: &str, diff: &str) -> BranchClassification {
        let branch = branch_name.trim();

        if branch == "main" || branch == "master" {
            self.classify_main(branch)
        } else if branch.starts_with("feature/") {
            self.classify_feature(branch, diff)
        } else if branch.starts_with("hotfix/") {
            self.classify_hotfix(branch, diff)
        } else {
            self.classify_other(branch)
        }
    }

    /// Direct commits to the default branch are always rejected.
    fn classify_main(&self, branch: &str) -> BranchClassification {
        BranchClassification {
            kind:        BranchKind::Main,
            status:      ClassificationStatus::Rejected,
            severity:    Severity::Critical,
            approved:    false,
            positives:   vec![],
            issues:      vec![format!("Direct commits to the {branch} branch are not allowed")],
            suggestions: vec![format!("Create a feature branch from {branch} and open a pull request")],
            feedback:    feedback::main_branch(branch),
        }
    }

    /// Feature branches: new work is expected, tests should come with it,
    /// and the change should stay reviewable.
    fn classify_feature(&self, branch: &str, diff: &str) -> BranchClassification {
        let mut positives = Vec::new();
        let mut issues = Vec::new();
        let mut suggestions = Vec::new();

        let has_new_functions = self.signals.detect_new_functions(diff);
        let has_tests = self.signals.detect_tests(diff);
        let has_documentation = self.signals.detect_documentation(diff);
        let lines_changed = self.signals.count_changed_lines(diff);

        if has_new_functions {
            positives.push("New functions detected - good feature implementation".to_string());

            if has_tests {
                positives.push("Test files included - excellent".to_string());
            } else {
                issues.push("New functions added but no test files detected".to_string());
                suggestions.push("Add unit tests for the new functions".to_string());
            }

            if !has_documentation {
                suggestions.push("Consider adding documentation comments to new functions".to_string());
            }
        } else {
            suggestions.push("Consider breaking down changes into smaller, focused features".to_string());
        }

        if lines_changed > FEATURE_LINE_LIMIT {
            issues.push(format!("Large changeset detected ({FEATURE_LINE_LIMIT}+ lines)"));
            suggestions.push(
                "Consider splitting this into multiple smaller pull requests for easier review"
                    .to_string(),
            );
        }

        let status = if issues.len() <= FEATURE_ISSUE_BUDGET {
            ClassificationStatus::Approved
        } else {
            ClassificationStatus::NeedsChanges
        };
        let severity = match status {
            ClassificationStatus::Approved => Severity::Minor,
            _ => Severity::Major,
        };

        self.verdict(BranchKind::Feature, branch, status, severity, positives, issues, suggestions)
    }

    /// Hotfix branches: surgical changes only, under stricter thresholds.
    fn classify_hotfix(&self, branch: &str, diff: &str) -> BranchClassification {
        let mut positives = Vec::new();
        let mut issues = Vec::new();
        let mut suggestions = Vec::new();

        let lines_changed = self.signals.count_changed_lines(diff);
        let has_new_functions = self.signals.detect_new_functions(diff);
        let affected_files = self.signals.count_affected_files(diff);
        let has_tests = self.signals.detect_tests(diff);

        if lines_changed > HOTFIX_LINE_LIMIT {
            issues.push(format!(
                "{CRITICAL_MARKER}: Hotfix changes exceed {HOTFIX_LINE_LIMIT} lines"
            ));
            suggestions.push("Consider creating a feature branch for extensive changes".to_string());
        } else {
            positives.push("Change scope is appropriately minimal".to_string());
        }

        if has_new_functions {
            issues.push("WARNING: New functions detected in hotfix".to_string());
            suggestions.push("Move new functionality to a feature branch".to_string());
        } else {
            positives.push("No new functions - appropriate for hotfix".to_string());
        }

        if affected_files > HOTFIX_FILE_LIMIT {
            issues.push(format!("Changes affect more than {HOTFIX_FILE_LIMIT} files"));
            suggestions.push("Hotfixes should be surgical and focused on specific files".to_string());
        } else {
            positives.push("Limited file scope - focused fix".to_string());
        }

        if !has_tests {
            issues.push("No test updates detected".to_string());
            suggestions.push("Add regression tests to prevent this issue from recurring".to_string());
        }

        let has_critical = issues.iter().any(|issue| issue.contains(CRITICAL_MARKER));
        let status = if has_critical {
            ClassificationStatus::Rejected
        } else if issues.len() > HOTFIX_ISSUE_BUDGET {
            ClassificationStatus::NeedsChanges
        } else {
            ClassificationStatus::Approved
        };
        let severity = if has_critical {
            Severity::Critical
        } else if status == ClassificationStatus::Approved {
            Severity::Minor
        } else {
            Severity::Major
        };

        self.verdict(BranchKind::Hotfix, branch, status, severity, positives, issues, suggestions)
    }

    /// Unrecognized branch shapes get a manual-review verdict.
    fn classify_other(&self, branch: &str) -> BranchClassification {
        BranchClassification {
            kind:        BranchKind::Other,
            status:      ClassificationStatus::Pending,
            severity:    Severity::Info,
            approved:    false,
            positives:   vec![],
            issues:      vec![],
            suggestions: vec!["Follow standard branch naming conventions".to_string()],
            feedback:    feedback::other_branch(branch),
        }
    }

    /// Assembles the final classification for the rule-driven variants.
    #[allow(clippy::too_many_arguments)]
    fn verdict(
        &self,
        kind: BranchKind,
        branch: &str,
        status: ClassificationStatus,
        severity: Severity,
        positives: Vec<String>,
        issues: Vec<String>,
        suggestions: Vec<String>,
    ) -> BranchClassification {
        let feedback = feedback::assemble(kind, branch, &positives, &issues, &suggestions, status);
        BranchClassification {
            kind,
            status,
            severity,
            approved: status == ClassificationStatus::Approved,
            positives,
            issues,
            suggestions,
            feedback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(branch: &str, diff: &str) -> BranchClassification {
        ReviewClassifier::default().classify(branch, diff)
    }

    #[test]
    fn main_branch_is_terminally_rejected() {
        let result = classify("main", "function anything() {}");
        assert_eq!(result.kind, BranchKind::Main);
        assert_eq!(result.status, ClassificationStatus::Rejected);
        assert_eq!(result.severity, Severity::Critical);
        assert!(!result.approved);
    }

    #[test]
    fn feature_with_functions_and_tests_has_no_missing_test_issue() {
        let diff = "function login(user) {}\ndescribe('login', () => it('works', () => {}));";
        let result = classify("feature/login", diff);

        assert_eq!(result.kind, BranchKind::Feature);
        assert!(!result.issues.iter().any(|i| i.contains("no test files")));
        assert_eq!(result.status, ClassificationStatus::Approved);
        assert!(result.approved);
    }

    #[test]
    fn feature_without_functions_gets_a_suggestion_not_an_issue() {
        let result = classify("feature/cleanup", "let renamed = oldName;");
        assert!(result.issues.is_empty());
        assert!(
            result
                .suggestions
                .iter()
                .any(|s| s.contains("smaller, focused features"))
        );
    }

    #[test]
    fn oversized_feature_diff_draws_an_issue() {
        let diff = "+line\n".repeat(501);
        let result = classify("feature/big", &diff);
        assert!(result.issues.iter().any(|i| i.contains("Large changeset")));
    }

    #[test]
    fn oversized_hotfix_is_rejected_with_one_critical_issue() {
        let diff = "context line\n".repeat(150);
        let result = classify("hotfix/outage", &format!("{diff}test update"));

        assert_eq!(result.kind, BranchKind::Hotfix);
        assert_eq!(result.status, ClassificationStatus::Rejected);
        assert_eq!(result.severity, Severity::Critical);
        assert!(!result.approved);
        assert_eq!(
            result.issues.iter().filter(|i| i.contains("CRITICAL")).count(),
            1
        );
    }

    #[test]
    fn minimal_hotfix_with_tests_is_approved() {
        let diff = "diff --git a/src/fix.js b/src/fix.js\n+++ b/src/fix.js\n-let broken = \
                    true;\n+let broken = false;\n+// covered by regression test suite\n";
        let result = classify("hotfix/flag", diff);

        assert_eq!(result.status, ClassificationStatus::Approved);
        assert!(result.approved);
    }

    #[test]
    fn hotfix_adding_functions_draws_a_warning_issue() {
        let result = classify("hotfix/new-stuff", "function extra() {} // test added");
        assert!(result.issues.iter().any(|i| i.starts_with("WARNING")));
    }

    #[test]
    fn unknown_branches_are_pending_regardless_of_diff() {
        for diff in ["", "function x() {}", "anything at all"] {
            let result = classify("chore/deps", diff);
            assert_eq!(result.kind, BranchKind::Other);
            assert_eq!(result.status, ClassificationStatus::Pending);
            assert!(!result.approved);
        }
    }

    #[test]
    fn empty_branch_name_falls_through_to_other() {
        let result = classify("", "function x() {}");
        assert_eq!(result.kind, BranchKind::Other);
        assert_eq!(result.status, ClassificationStatus::Pending);
    }

    #[test]
    fn feedback_ends_with_the_recommendation_for_its_status() {
        let cases = [
            ("main", "x"),
            ("feature/a", "function a() {} test"),
            ("feature/b", "let x;"),
            ("hotfix/c", &"line\n".repeat(150)),
            ("hotfix/d", "-a\n+b\ntest"),
            ("chore/e", "x"),
        ];
        for (branch, diff) in cases {
            let result = classify(branch, diff);
            let expected = feedback::recommendation_line(result.status);
            assert!(
                result.feedback.trim_end().ends_with(expected),
                "feedback for {branch} must end with {expected:?}"
            );
            assert_eq!(result.feedback.matches("AI Recommendation").count(), 1);
        }
    }
}
