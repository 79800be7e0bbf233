#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Heuristic signal extraction over change-request diff text.
//!
//! The classifier's rules depend only on the [`DiffSignals`] trait, so
//! these pattern heuristics can later be swapped for real diff-AST
//! analysis without touching the classification state machine.

use regex::RegexSet;

/// Capabilities the classifier needs from a diff analysis.
pub trait DiffSignals: Send + Sync {
    /// Whether the diff introduces new function definitions.
    fn detect_new_functions(&self, diff: &str) -> bool;

    /// Whether the diff touches tests.
    fn detect_tests(&self, diff: &str) -> bool;

    /// Whether the diff carries documentation.
    fn detect_documentation(&self, diff: &str) -> bool;

    /// Number of changed lines in the diff.
    fn count_changed_lines(&self, diff: &str) -> usize;

    /// Number of files the diff touches.
    fn count_affected_files(&self, diff: &str) -> usize;
}

/// Pattern- and keyword-based [`DiffSignals`] implementation.
pub struct PatternSignals {
    /// Function-definition patterns across the languages students submit.
    function_patterns: RegexSet,
}

impl PatternSignals {
    /// Compiles the signal patterns.
    pub fn new() -> Self {
        let function_patterns = RegexSet::new([
            r"function\s+\w+\s*\(",
            r"const\s+\w+\s*=\s*(async\s+)?\(",
            r"async\s+function",
            r"fn\s+\w+\s*\(",
            r"def\s+\w+\s*\(",
        ])
        .expect("function patterns are valid");

        Self { function_patterns }
    }
}

impl Default for PatternSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl DiffSignals for PatternSignals {
    fn detect_new_functions(&self, diff: &str) -> bool {
        self.function_patterns.is_match(diff)
    }

    fn detect_tests(&self, diff: &str) -> bool {
        diff.contains("test")
            || diff.contains(".spec.")
            || diff.contains("describe(")
            || diff.contains("it(")
    }

    fn detect_documentation(&self, diff: &str) -> bool {
        diff.contains("/**")
            || diff.contains("///")
            || diff.contains("README")
            || diff.contains("@param")
            || diff.contains("@returns")
    }

    fn count_changed_lines(&self, diff: &str) -> usize {
        if diff.is_empty() {
            return 0;
        }
        diff.lines().count()
    }

    fn count_affected_files(&self, diff: &str) -> usize {
        if diff.trim().is_empty() {
            return 0;
        }

        // Unified diffs name each file in a `diff --git` header; some
        // tools emit only the `+++` side.
        let headers = diff.lines().filter(|line| line.starts_with("diff --git")).count();
        if headers > 0 {
            return headers;
        }

        let plus_headers = diff
            .lines()
            .filter(|line| line.starts_with("+++ ") && !line.contains("/dev/null"))
            .count();
        if plus_headers > 0 {
            return plus_headers;
        }

        // Free-form code samples count as one file.
        1
    }
}
