//! Strategy dispatch

use super::ai::AiGrader;
use super::deterministic::grade_mcq;
use super::rubric::GradingStrategy;
use super::Assessment;
use sdk::types::{AnswerRecord, GradingResult};
use tracing::{debug, warn};

/// Routes each answer to one grader
pub struct Grader {
    ai: AiGrader,
}

impl Grader {
    pub fn new(ai: AiGrader) -> Self {
        Self { ai }
    }

    pub fn ai(&self) -> &AiGrader {
        &self.ai
    }

    /// Grade one stored answer. Never fails: collaborator problems degrade
    /// to a defined score and feedback.
    pub async fn grade(
        &self,
        answer: &AnswerRecord,
        strategy: &GradingStrategy,
        passage: &str,
    ) -> GradingResult {
        debug!(
            "Grading {}/{} as {}",
            answer.section_id,
            answer.question_id,
            strategy.grading_type()
        );

        let text = answer.answer_text.as_deref().unwrap_or_default();

        let assessment = match strategy {
            GradingStrategy::Auto => grade_auto(answer),
            GradingStrategy::Keyword(rubric) => {
                self.ai
                    .keyword_with_fallback(text, rubric, &answer.prompt, passage)
                    .await
            }
            GradingStrategy::AiRubric(rubric) => {
                self.ai.grade_speaking(text, rubric, &answer.prompt).await
            }
        };

        assessment.into_result(answer, strategy.grading_type())
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn grade_auto(answer: &AnswerRecord) -> Assessment {
    match (non_empty(&answer.selected_option), non_empty(&answer.correct_answer)) {
        (Some(selected), Some(correct)) => grade_mcq(selected, correct),
        _ => {
            warn!(
                "No answer key or selection for {}/{}, scoring zero",
                answer.section_id, answer.question_id
            );
            Assessment::auto(0.0, 1.0, "Could not grade")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::rubric::{Idea, KeywordRubric};
    use sdk::types::GradingType;

    fn answer(selected: Option<&str>, correct: Option<&str>, text: Option<&str>) -> AnswerRecord {
        AnswerRecord {
            candidate_id: "c1".to_string(),
            exam_set: "A".to_string(),
            subject: "english".to_string(),
            section_id: "s1".to_string(),
            question_id: "q1".to_string(),
            question_number: Some(1),
            prompt: "Question".to_string(),
            correct_answer: correct.map(String::from),
            selected_option: selected.map(String::from),
            answer_text: text.map(String::from),
        }
    }

    fn grader() -> Grader {
        Grader::new(AiGrader::unconfigured())
    }

    #[tokio::test]
    async fn test_auto_correct() {
        let result = grader()
            .grade(&answer(Some("b"), Some("B"), None), &GradingStrategy::Auto, "")
            .await;

        assert_eq!(result.grading_type, GradingType::Auto);
        assert_eq!(result.final_score, 1.0);
        assert_eq!(result.max_marks, 1.0);
        assert_eq!(result.question_id, "q1");
        assert_eq!(result.section_id, "s1");
    }

    #[tokio::test]
    async fn test_auto_without_key_could_not_grade() {
        let result = grader()
            .grade(&answer(Some("A"), None, None), &GradingStrategy::Auto, "")
            .await;
        assert_eq!(result.final_score, 0.0);
        assert_eq!(result.max_marks, 1.0);
        assert_eq!(result.feedback, "Could not grade");

        let result = grader()
            .grade(&answer(Some("  "), Some("A"), None), &GradingStrategy::Auto, "")
            .await;
        assert_eq!(result.feedback, "Could not grade");
    }

    #[tokio::test]
    async fn test_keyword_strategy_uses_answer_text() {
        let strategy = GradingStrategy::Keyword(KeywordRubric {
            max_marks: 2.0,
            ideas: vec![Idea {
                id: "i1".to_string(),
                required_any: vec!["evaporation".to_string()],
                banned: vec![],
                supporting: vec![],
                marks: 2.0,
            }],
        });

        let result = grader()
            .grade(&answer(None, None, Some("Evaporation of water")), &strategy, "")
            .await;

        assert_eq!(result.grading_type, GradingType::Keyword);
        assert_eq!(result.auto_score, Some(2.0));
        assert_eq!(result.final_score, 2.0);
    }
}
