//! Attempt-level aggregation

use crate::proctoring::geometry::round1;
use chrono::{DateTime, Utc};
use sdk::types::{Attempt, GradingResult, SessionSummary};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Totals {
    pub total_score: f64,
    pub total_max: f64,
    pub percentage: f64,
}

impl Totals {
    /// Sums every result as given; one result per question is the caller's job
    pub fn from_results(results: &[GradingResult]) -> Self {
        let total_score: f64 = results.iter().map(|r| r.final_score).sum();
        let total_max: f64 = results.iter().map(|r| r.max_marks).sum();

        let percentage = if total_max > 0.0 {
            round1(total_score / total_max * 100.0)
        } else {
            0.0
        };

        Self {
            total_score,
            total_max,
            percentage,
        }
    }
}

pub fn summarize(
    attempt: &Attempt,
    results: &[GradingResult],
    graded_at: DateTime<Utc>,
) -> SessionSummary {
    let totals = Totals::from_results(results);

    SessionSummary {
        attempt_id: attempt.id.clone(),
        candidate_id: attempt.candidate_id.clone(),
        exam_set: attempt.exam_set.clone(),
        total_score: totals.total_score,
        total_max: totals.total_max,
        percentage: totals.percentage,
        graded_at,
    }
}
