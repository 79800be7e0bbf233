#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Combines structural and AI quality results into a total, a percentage,
//! and a qualitative status.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{quality::AiQuality, structural::StructuralCheckResult};

/// Qualitative grading status derived from the overall percentage.
///
/// Thresholds are inclusive lower bounds: exactly 90.00% is `Excellent`,
/// exactly 60.00% is `NeedsImprovement`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GradingStatus {
    /// 90% and above.
    Excellent,
    /// 80% up to (but not including) 90%.
    Good,
    /// 70% up to 80%.
    Satisfactory,
    /// 60% up to 70%.
    #[serde(rename = "Needs Improvement")]
    NeedsImprovement,
    /// Below 60%, or an empty rubric.
    Unsatisfactory,
}

impl GradingStatus {
    /// Maps a percentage onto its status band.
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 90.0 {
            GradingStatus::Excellent
        } else if percentage >= 80.0 {
            GradingStatus::Good
        } else if percentage >= 70.0 {
            GradingStatus::Satisfactory
        } else if percentage >= 60.0 {
            GradingStatus::NeedsImprovement
        } else {
            GradingStatus::Unsatisfactory
        }
    }
}

impl Display for GradingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            GradingStatus::Excellent => "Excellent",
            GradingStatus::Good => "Good",
            GradingStatus::Satisfactory => "Satisfactory",
            GradingStatus::NeedsImprovement => "Needs Improvement",
            GradingStatus::Unsatisfactory => "Unsatisfactory",
        };
        write!(f, "{label}")
    }
}

/// The combined outcome of one grading call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Structural score plus AI score.
    pub total_score:     u32,
    /// Structural maximum plus AI maximum.
    pub max_total_score: u32,
    /// `total / max × 100`, rounded to two decimal places; 0 when the
    /// maximum is 0.
    pub percentage:      f64,
    /// Qualitative band for the percentage.
    pub status:          GradingStatus,
}

impl Summary {
    /// Renders the score as `total/max`, the shape stored alongside
    /// persisted records.
    pub fn score_summary(&self) -> String {
        format!("{}/{}", self.total_score, self.max_total_score)
    }
}

/// Combines a structural result and an AI quality result into a [`Summary`].
///
/// An empty rubric (both maximums zero) yields 0% and `Unsatisfactory`
/// rather than dividing by zero.
pub fn aggregate(structural: &StructuralCheckResult, ai: &AiQuality) -> Summary {
    let total_score = structural.score + ai.score();
    let max_total_score = structural.max_score + ai.max_score();

    let percentage = if max_total_score == 0 {
        0.0
    } else {
        round2(f64::from(total_score) / f64::from(max_total_score) * 100.0)
    };

    Summary {
        total_score,
        max_total_score,
        percentage,
        status: GradingStatus::from_percentage(percentage),
    }
}

/// Rounds to two decimal places.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
