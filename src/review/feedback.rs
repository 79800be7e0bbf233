#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Feedback text assembly for branch classifications.

use super::{BranchKind, ClassificationStatus};

/// Returns the terminal recommendation line for a status.
///
/// The line is derived from the final status and nowhere else, so the
/// recommendation can never disagree with the classification it closes.
pub fn recommendation_line(status: ClassificationStatus) -> &'static str {
    match status {
        ClassificationStatus::Approved => "### AI Recommendation: APPROVE",
        ClassificationStatus::Rejected => "### AI Recommendation: REJECT",
        ClassificationStatus::NeedsChanges | ClassificationStatus::Pending => {
            "### AI Recommendation: REQUEST CHANGES"
        }
    }
}

/// Assembles the feedback body for the feature/hotfix variants from their
/// signal lists, closing with the recommendation line for `status`.
pub fn assemble(
    kind: BranchKind,
    branch_name: &str,
    positives: &[String],
    issues: &[String],
    suggestions: &[String],
    status: ClassificationStatus,
) -> String {
    let mut feedback = format!("## {kind} Branch Review: `{branch_name}`\n\n");

    let mut section = |title: &str, items: &[String]| {
        if !items.is_empty() {
            feedback.push_str(&format!("### {title}\n"));
            for item in items {
                feedback.push_str(&format!("- {item}\n"));
            }
            feedback.push('\n');
        }
    };
    section("Strengths", positives);
    section("Issues Found", issues);
    section("Suggestions", suggestions);

    feedback.push_str(recommendation_line(status));
    feedback
}

/// Feedback for a direct commit to the default branch.
pub fn main_branch(branch_name: &str) -> String {
    format!(
        "## CRITICAL WARNING: Direct Commit to {branch_name}\n\n### Issue\nDirect commits to the \
         {branch_name} branch are not allowed.\n\n### Required Actions\n1. Create a feature \
         branch from {branch_name}\n2. Make your changes in the feature branch\n3. Open a pull \
         request for review\n4. Only merge to {branch_name} through approved pull requests\n\n### \
         Branch Naming Convention\n- Feature: `feature/your-feature-name`\n- Hotfix: \
         `hotfix/issue-description`\n- Bugfix: `bugfix/bug-description`\n\n{}",
        recommendation_line(ClassificationStatus::Rejected)
    )
}

/// Feedback for branches outside the recognized naming conventions.
pub fn other_branch(branch_name: &str) -> String {
    format!(
        "## Branch Review: `{branch_name}`\n\n### Branch Type\nOther/Custom\n\n### \
         Recommendation\nConsider following standard branch naming conventions:\n- `feature/` - \
         For new features\n- `hotfix/` - For urgent production fixes\n- `bugfix/` - For bug \
         fixes\n- `chore/` - For maintenance tasks\n\n### Current Assessment\nManual review \
         recommended\n\n{}",
        recommendation_line(ClassificationStatus::Pending)
    )
}
