use gavel::review::{
    BranchKind, ClassificationStatus, ReviewClassifier, Severity, feedback::recommendation_line,
};

fn classify(branch: &str, diff: &str) -> gavel::review::BranchClassification {
    ReviewClassifier::default().classify(branch, diff)
}

#[test]
fn default_branches_are_rejected_whatever_the_diff() {
    for branch in ["main", "master"] {
        for diff in ["", "function x() {}", "harmless one-liner"] {
            let result = classify(branch, diff);
            assert_eq!(result.kind, BranchKind::Main);
            assert_eq!(result.status, ClassificationStatus::Rejected);
            assert_eq!(result.severity, Severity::Critical);
            assert!(!result.approved);
        }
    }
}

#[test]
fn feature_with_function_and_test_marker_has_no_missing_tests_issue() {
    let diff = "function login(user) { return user; }\nit('logs in', () => {});";
    let result = classify("feature/x", diff);

    assert!(!result.issues.iter().any(|i| i.contains("no test files")));
    assert!(result.positives.iter().any(|p| p.contains("Test files included")));
}

#[test]
fn feature_with_function_but_no_tests_draws_an_issue() {
    let result = classify("feature/x", "function login(user) { return user; }");
    assert!(result.issues.iter().any(|i| i.contains("no test files detected")));
    assert!(result.suggestions.iter().any(|s| s.contains("unit tests")));
}

#[test]
fn feature_line_limit_is_exclusive_at_500() {
    let at_limit = "x\n".repeat(500);
    let result = classify("feature/sized", &at_limit);
    assert!(!result.issues.iter().any(|i| i.contains("Large changeset")));

    let over_limit = "x\n".repeat(501);
    let result = classify("feature/sized", &over_limit);
    assert!(result.issues.iter().any(|i| i.contains("Large changeset")));
}

#[test]
fn hotfix_of_150_lines_with_tests_has_one_critical_issue_and_is_rejected() {
    let mut diff = "context\n".repeat(149);
    diff.push_str("covered by test");
    let result = classify("hotfix/y", &diff);

    assert_eq!(result.kind, BranchKind::Hotfix);
    assert_eq!(
        result.issues.iter().filter(|i| i.contains("CRITICAL")).count(),
        1
    );
    assert_eq!(result.status, ClassificationStatus::Rejected);
    assert_eq!(result.severity, Severity::Critical);
    assert!(!result.approved);
}

#[test]
fn hotfix_line_limit_is_exclusive_at_100() {
    let mut diff = "context\n".repeat(99);
    diff.push_str("covered by test");
    let result = classify("hotfix/y", &diff);
    assert!(result.issues.iter().all(|i| !i.contains("CRITICAL")));
    assert_eq!(result.status, ClassificationStatus::Approved);
}

#[test]
fn hotfix_touching_many_files_draws_an_issue() {
    let mut diff = String::from("covered by test\n");
    for i in 0..6 {
        diff.push_str(&format!("diff --git a/f{i}.js b/f{i}.js\n"));
    }
    let result = classify("hotfix/wide", &diff);
    assert!(result.issues.iter().any(|i| i.contains("more than 5 files")));
}

#[test]
fn hotfix_without_tests_accumulates_issues_into_needs_changes() {
    // No tests, new function, wide file scope: three non-critical issues.
    let mut diff = String::from("function patch() {}\n");
    for i in 0..6 {
        diff.push_str(&format!("diff --git a/f{i}.js b/f{i}.js\n"));
    }
    let result = classify("hotfix/busy", &diff);

    assert!(result.issues.len() > 2);
    assert!(result.issues.iter().all(|i| !i.contains("CRITICAL")));
    assert_eq!(result.status, ClassificationStatus::NeedsChanges);
    assert_eq!(result.severity, Severity::Major);
    assert!(!result.approved);
}

#[test]
fn unrecognized_branches_are_pending_regardless_of_diff() {
    for diff in ["", "function x() {}", &"line\n".repeat(1000)] {
        let result = classify("chore/z", diff);
        assert_eq!(result.kind, BranchKind::Other);
        assert_eq!(result.status, ClassificationStatus::Pending);
        assert_eq!(result.severity, Severity::Info);
        assert!(!result.approved);
    }
}

#[test]
fn every_variant_ends_with_the_recommendation_for_its_status() {
    let wide_hotfix = {
        let mut diff = String::from("function patch() {}\n");
        for i in 0..6 {
            diff.push_str(&format!("diff --git a/f{i}.js b/f{i}.js\n"));
        }
        diff
    };
    let cases: Vec<(&str, String)> = vec![
        ("main", "anything".to_string()),
        ("master", String::new()),
        ("feature/ok", "function a() {} it('works', () => {})".to_string()),
        ("feature/bare", "let x;".to_string()),
        ("feature/huge", "x\n".repeat(600)),
        ("hotfix/big", "line\n".repeat(150)),
        ("hotfix/ok", "-old\n+new\ntest".to_string()),
        ("hotfix/busy", wide_hotfix),
        ("chore/z", "x".to_string()),
        ("", "x".to_string()),
    ];

    for (branch, diff) in cases {
        let result = classify(branch, &diff);
        let expected = recommendation_line(result.status);
        assert!(
            result.feedback.trim_end().ends_with(expected),
            "feedback for `{branch}` must end with {expected:?}"
        );
        assert_eq!(
            result.feedback.matches("AI Recommendation").count(),
            1,
            "feedback for `{branch}` must carry exactly one recommendation line"
        );
        match result.status {
            ClassificationStatus::Approved => assert!(result.approved),
            _ => assert!(!result.approved),
        }
    }
}
