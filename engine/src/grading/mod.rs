//! Grading cascade
//!
//! Answers are routed by [`GradingStrategy`] to exactly one grader:
//!
//! - `auto`: single-answer comparison against the question bank key
//! - `keyword`: idea matching, with an AI second opinion when it scores zero
//! - `ai_rubric`: model-scored spoken answer with a category breakdown
//!
//! Graders produce an [`Assessment`]; [`Grader::grade`] turns that into a
//! [`GradingResult`] and [`aggregate::summarize`] folds the results of an
//! attempt into a [`sdk::types::SessionSummary`].

pub mod aggregate;
pub mod ai;
pub mod deterministic;
pub mod dispatch;
pub mod rubric;

pub use aggregate::{summarize, Totals};
pub use ai::{AiGrader, AiGradingSettings};
pub use deterministic::{grade_keyword, grade_mcq};
pub use dispatch::Grader;
pub use rubric::{GradingStrategy, KeywordRubric, Rubric, SpeakingRubric};

use sdk::types::{AnswerRecord, CategoryScore, GradingResult, GradingType};
use std::collections::BTreeMap;

/// Outcome of one grader before it is attached to a question
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub max_marks: f64,
    pub auto_score: Option<f64>,
    pub ai_score: Option<f64>,
    pub feedback: String,
    pub breakdown: Option<BTreeMap<String, CategoryScore>>,
}

impl Assessment {
    /// Rule-based score
    pub fn auto(score: f64, max_marks: f64, feedback: impl Into<String>) -> Self {
        Self {
            max_marks,
            auto_score: Some(score),
            ai_score: None,
            feedback: feedback.into(),
            breakdown: None,
        }
    }

    /// Model-based score; `None` when the model could not produce one
    pub fn ai(score: Option<f64>, max_marks: f64, feedback: impl Into<String>) -> Self {
        Self {
            max_marks,
            auto_score: None,
            ai_score: score,
            feedback: feedback.into(),
            breakdown: None,
        }
    }

    pub fn with_breakdown(mut self, breakdown: BTreeMap<String, CategoryScore>) -> Self {
        self.breakdown = Some(breakdown);
        self
    }

    pub fn into_result(self, answer: &AnswerRecord, grading_type: GradingType) -> GradingResult {
        let result = GradingResult::new(
            answer.question_id.as_str(),
            answer.section_id.as_str(),
            grading_type,
            self.max_marks,
            self.auto_score,
            self.ai_score,
            self.feedback,
        );

        match self.breakdown {
            Some(breakdown) => result.with_breakdown(breakdown),
            None => result,
        }
    }
}
