#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Deterministic, configuration-driven presence/absence checks over a
//! submission tree.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// The structural rubric for one coursework module: required directories and
/// files, per-item point values, and a score ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuralConfig {
    /// Human-readable module name, used in feedback and reports.
    pub module_name:          String,
    /// Directories that must exist, checked in order.
    pub required_directories: Vec<String>,
    /// Files that must exist, checked in order, relative to the submission
    /// root.
    pub required_files:       Vec<String>,
    /// Points awarded per present directory.
    pub directory_points:     u32,
    /// Points awarded per present file.
    pub file_points:          u32,
    /// Ceiling on the accumulated score.
    pub max_score:            u32,
}

impl StructuralConfig {
    /// The built-in HTML/CSS basics rubric: three directories and five files
    /// at five points each, capped at 40.
    pub fn html_css_basics() -> Self {
        Self {
            module_name:          "HTML/CSS Basics".to_string(),
            required_directories: vec![
                "Styles".to_string(),
                "Scripts".to_string(),
                "Assets".to_string(),
            ],
            required_files:       vec![
                "index.html".to_string(),
                "Styles/index.css".to_string(),
                "Scripts/index.js".to_string(),
                "Styles/loginForm.css".to_string(),
                "Styles/moodSelecter.css".to_string(),
            ],
            directory_points:     5,
            file_points:          5,
            max_score:            40,
        }
    }

    /// Loads a rubric from a JSON file.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Checks that the configured maximum matches the sum of all per-item
    /// points. A mismatch is logged, not fatal: the cap in
    /// [`StructuralChecker::check`] keeps scores in range either way.
    pub fn validate(&self) -> bool {
        let total = self.required_directories.len() as u32 * self.directory_points
            + self.required_files.len() as u32 * self.file_points;
        if total != self.max_score {
            tracing::warn!(
                "Rubric for `{}` is inconsistent: items sum to {total} but max_score is {}",
                self.module_name,
                self.max_score
            );
            return false;
        }
        true
    }
}

/// The outcome of running a structural rubric against a submission tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralCheckResult {
    /// Points accumulated, capped at the rubric maximum.
    pub score:     u32,
    /// The rubric maximum.
    pub max_score: u32,
    /// Satisfied checks, in rubric order.
    pub passed:    Vec<String>,
    /// Failed checks, in rubric order.
    pub errors:    Vec<String>,
}

/// Runs a [`StructuralConfig`] against submission roots.
#[derive(Debug, Clone)]
pub struct StructuralChecker {
    /// The rubric this checker applies.
    config: StructuralConfig,
}

impl StructuralChecker {
    /// Creates a checker, running the rubric self-check once up front.
    pub fn new(config: StructuralConfig) -> Self {
        config.validate();
        Self { config }
    }

    /// Returns the rubric this checker applies.
    pub fn config(&self) -> &StructuralConfig {
        &self.config
    }

    /// Checks every configured directory and file under `root`.
    ///
    /// A directory entry only passes when the path is specifically a
    /// directory, and a file entry only when it is a regular file; a
    /// same-named entry of the other kind fails the check. The accumulated
    /// score is capped at the rubric maximum even when the configuration
    /// drifted out of sync with its item list.
    pub fn check(&self, root: &Path) -> StructuralCheckResult {
        let mut result = StructuralCheckResult {
            score:     0,
            max_score: self.config.max_score,
            passed:    Vec::new(),
            errors:    Vec::new(),
        };

        for dir in &self.config.required_directories {
            if root.join(dir).is_dir() {
                result.score += self.config.directory_points;
                result.passed.push(format!("Found directory: {dir}/"));
            } else {
                result.errors.push(format!("Missing directory: {dir}/"));
            }
        }

        for file in &self.config.required_files {
            if root.join(file).is_file() {
                result.score += self.config.file_points;
                result.passed.push(format!("Found file: {file}"));
            } else {
                result.errors.push(format!("Missing file: {file}"));
            }
        }

        if result.score > self.config.max_score {
            result.score = self.config.max_score;
        }

        tracing::info!(
            "Structural check for `{}`: {}/{}",
            self.config.module_name,
            result.score,
            result.max_score
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn rubric() -> StructuralConfig {
        StructuralConfig {
            module_name:          "Fixture".to_string(),
            required_directories: vec!["Styles".to_string(), "Scripts".to_string()],
            required_files:       vec!["index.html".to_string(), "Styles/index.css".to_string()],
            directory_points:     5,
            file_points:          5,
            max_score:            20,
        }
    }

    #[test]
    fn full_marks_for_complete_tree() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(tmp.path().join("Styles")).unwrap();
        fs::create_dir_all(tmp.path().join("Scripts")).unwrap();
        fs::write(tmp.path().join("index.html"), "<html></html>").unwrap();
        fs::write(tmp.path().join("Styles/index.css"), "body {}").unwrap();

        let result = StructuralChecker::new(rubric()).check(tmp.path());
        assert_eq!(result.score, 20);
        assert_eq!(result.errors.len(), 0);
        assert_eq!(result.passed, vec![
            "Found directory: Styles/",
            "Found directory: Scripts/",
            "Found file: index.html",
            "Found file: Styles/index.css",
        ]);
    }

    #[test]
    fn missing_items_score_nothing_and_keep_order() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(tmp.path().join("Styles")).unwrap();

        let result = StructuralChecker::new(rubric()).check(tmp.path());
        assert_eq!(result.score, 5);
        assert_eq!(result.errors, vec![
            "Missing directory: Scripts/",
            "Missing file: index.html",
            "Missing file: Styles/index.css",
        ]);
    }

    #[test]
    fn file_where_directory_expected_fails() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(tmp.path().join("Styles"), "not a directory").unwrap();

        let result = StructuralChecker::new(rubric()).check(tmp.path());
        assert!(result.errors.contains(&"Missing directory: Styles/".to_string()));
    }

    #[test]
    fn directory_where_file_expected_fails() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(tmp.path().join("index.html")).unwrap();

        let result = StructuralChecker::new(rubric()).check(tmp.path());
        assert!(result.errors.contains(&"Missing file: index.html".to_string()));
    }

    #[test]
    fn drifted_config_is_capped_at_max() {
        let mut config = rubric();
        // Items sum to 20 but the ceiling says 10.
        config.max_score = 10;
        assert!(!config.validate());

        let tmp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(tmp.path().join("Styles")).unwrap();
        fs::create_dir_all(tmp.path().join("Scripts")).unwrap();
        fs::write(tmp.path().join("index.html"), "x").unwrap();
        fs::write(tmp.path().join("Styles/index.css"), "x").unwrap();

        let result = StructuralChecker::new(config).check(tmp.path());
        assert_eq!(result.score, 10);
        assert_eq!(result.passed.len(), 4);
    }

    #[test]
    fn builtin_rubric_is_consistent() {
        assert!(StructuralConfig::html_css_basics().validate());
    }
}
