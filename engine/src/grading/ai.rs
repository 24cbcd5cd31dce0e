//! AI-assisted grading
//!
//! Two entry points:
//!
//! - [`AiGrader::keyword_with_fallback`]: deterministic keyword grading first;
//!   the model is only consulted when that scored nothing.
//! - [`AiGrader::grade_speaking`]: rubric-based assessment of a transcribed
//!   spoken answer, with a per-category breakdown.
//!
//! Every model failure (unreachable, rate limited, unparsable) degrades to a
//! defined result. Nothing here returns an error to the caller.

use super::deterministic::grade_keyword;
use super::rubric::{KeywordRubric, SpeakingRubric};
use super::Assessment;
use crate::config::{GradingConfig, LlmConfig};
use crate::llm::{extract_json_object, CompletionRequest, LLMProvider};
use crate::rate_limiter::RateLimiter;
use sdk::types::CategoryScore;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

const KEYWORD_SOURCE: &str = "ai-keyword";
const SPEAKING_SOURCE: &str = "ai-speaking";

/// Model names and length guards for AI grading
#[derive(Debug, Clone)]
pub struct AiGradingSettings {
    pub keyword_model: String,
    pub speaking_model: String,
    pub min_answer_chars: usize,
    pub speaking_min_answer_chars: usize,
    pub speaking_default_max: f64,
}

impl AiGradingSettings {
    pub fn from_config(llm: &LlmConfig, grading: &GradingConfig) -> Self {
        Self {
            keyword_model: llm.keyword_model.clone(),
            speaking_model: llm.speaking_model.clone(),
            min_answer_chars: grading.ai_min_answer_chars,
            speaking_min_answer_chars: grading.speaking_min_answer_chars,
            speaking_default_max: grading.speaking_default_max,
        }
    }
}

impl Default for AiGradingSettings {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default(), &GradingConfig::default())
    }
}

pub struct AiGrader {
    provider: Option<Arc<dyn LLMProvider>>,
    limiter: Arc<RateLimiter>,
    settings: AiGradingSettings,
}

impl AiGrader {
    pub fn new(
        provider: Option<Arc<dyn LLMProvider>>,
        limiter: Arc<RateLimiter>,
        settings: AiGradingSettings,
    ) -> Self {
        Self {
            provider,
            limiter,
            settings,
        }
    }

    /// Grader with no model behind it; every AI path takes its fallback
    pub fn unconfigured() -> Self {
        Self::new(
            None,
            Arc::new(RateLimiter::per_minute(0)),
            AiGradingSettings::default(),
        )
    }

    /// Whether a configured provider reports itself healthy
    pub async fn is_available(&self) -> bool {
        match &self.provider {
            Some(provider) => provider.check_health().await,
            None => false,
        }
    }

    /// Keyword grading with an AI second opinion for zero scores.
    ///
    /// A successful AI result is reported as `ai_score` with "[AI]" feedback.
    /// Any failure returns the deterministic result unchanged.
    pub async fn keyword_with_fallback(
        &self,
        answer: &str,
        rubric: &KeywordRubric,
        question_prompt: &str,
        passage: &str,
    ) -> Assessment {
        let deterministic = grade_keyword(answer, rubric);

        if deterministic.auto_score.unwrap_or(0.0) > 0.0 {
            return deterministic;
        }

        let Some(provider) = &self.provider else {
            return deterministic;
        };

        if answer.trim().chars().count() <= self.settings.min_answer_chars {
            return deterministic;
        }

        if let Err(e) = self.limiter.acquire(KEYWORD_SOURCE).await {
            warn!("Skipping AI keyword fallback: {}", e);
            return deterministic;
        }

        let prompt = keyword_prompt(answer, rubric, question_prompt, passage);
        let request = CompletionRequest::prompt(prompt)
            .with_model(&self.settings.keyword_model)
            .with_temperature(0.2)
            .with_max_tokens(200);

        let text = match provider.complete(&request).await {
            Ok(text) => text,
            Err(e) => {
                warn!("AI keyword fallback failed, keeping deterministic score: {}", e);
                return deterministic;
            }
        };

        let parsed = match extract_json_object(&text) {
            Ok(value) => value,
            Err(e) => {
                warn!("AI keyword fallback returned unusable output: {}", e);
                return deterministic;
            }
        };

        let Some(score) = parsed.get("score").and_then(json_number) else {
            warn!("AI keyword fallback response has no numeric score");
            return deterministic;
        };

        let score = bounded(score, rubric.max_marks);
        let feedback = parsed
            .get("feedback")
            .and_then(|f| f.as_str())
            .unwrap_or_default();

        info!("AI keyword fallback awarded {}/{}", score, rubric.max_marks);
        Assessment::ai(Some(score), rubric.max_marks, format!("[AI] {}", feedback))
    }

    /// Rubric-based grading of a spoken answer transcript
    pub async fn grade_speaking(
        &self,
        answer: &str,
        rubric: &SpeakingRubric,
        question_prompt: &str,
    ) -> Assessment {
        let max_marks = rubric
            .max_marks
            .unwrap_or(self.settings.speaking_default_max);

        if answer.trim().chars().count() < self.settings.speaking_min_answer_chars {
            return Assessment::ai(Some(0.0), max_marks, "Response too short to evaluate");
        }

        let Some(provider) = &self.provider else {
            return Assessment::ai(
                None,
                max_marks,
                "AI grading unavailable - API key not configured",
            );
        };

        if let Err(e) = self.limiter.acquire(SPEAKING_SOURCE).await {
            warn!("Skipping AI speaking grading: {}", e);
            return Assessment::ai(None, max_marks, format!("AI grading error: {}", e));
        }

        let request = CompletionRequest::prompt(speaking_prompt(answer, rubric, question_prompt))
            .with_model(&self.settings.speaking_model)
            .with_temperature(0.3)
            .with_max_tokens(1000);

        let text = match provider.complete(&request).await {
            Ok(text) => text,
            Err(e) => {
                warn!("AI speaking grading failed: {}", e);
                return Assessment::ai(None, max_marks, format!("AI grading error: {}", e));
            }
        };

        let parsed = match extract_json_object(&text) {
            Ok(value) => value,
            Err(e) => {
                debug!("Unparsable speaking response: {}", e);
                return Assessment::ai(None, max_marks, "Could not parse AI response");
            }
        };

        let breakdown: BTreeMap<String, CategoryScore> = rubric
            .categories
            .keys()
            .map(|name| (name.clone(), category_score(parsed.get(name))))
            .collect();

        let total = parsed
            .get("total")
            .and_then(json_number)
            .unwrap_or_else(|| breakdown.values().map(|c| c.score).sum());

        let feedback = parsed
            .get("overall_feedback")
            .and_then(|f| f.as_str())
            .unwrap_or_default()
            .to_string();

        Assessment::ai(Some(bounded(total, max_marks)), max_marks, feedback)
            .with_breakdown(breakdown)
    }
}

/// Clamp into `[0, max]`; a bad ceiling collapses to 0 instead of panicking
fn bounded(score: f64, max: f64) -> f64 {
    score.clamp(0.0, max.max(0.0))
}

/// Numbers sometimes come back as strings ("7.5")
fn json_number(value: &serde_json::Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .filter(|n| n.is_finite())
}

fn category_score(value: Option<&serde_json::Value>) -> CategoryScore {
    let Some(value) = value else {
        return CategoryScore::default();
    };

    CategoryScore {
        score: value.get("score").and_then(json_number).unwrap_or(0.0),
        level: value
            .get("level")
            .and_then(json_number)
            .map(|l| l.max(0.0) as u32),
        reason: value
            .get("reason")
            .and_then(|r| r.as_str())
            .unwrap_or_default()
            .to_string(),
    }
}

pub(crate) fn keyword_prompt(
    answer: &str,
    rubric: &KeywordRubric,
    question_prompt: &str,
    passage: &str,
) -> String {
    let criteria = rubric
        .ideas
        .iter()
        .map(|idea| {
            format!(
                "- {}: Award {} mark(s) if answer contains any of: {}",
                idea.id,
                idea.marks,
                idea.required_any.join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let context = if passage.is_empty() {
        String::new()
    } else {
        format!(
            "\nREFERENCE PASSAGE (use this to verify the student's answer):\n{}\n",
            passage
        )
    };

    format!(
        "Grade this student answer. Be strict but fair. The answer must be based on information from the reference passage.\n\
         {context}\n\
         Question: {question}\n\
         Student Answer: {answer}\n\
         Max Marks: {max}\n\
         \n\
         Grading Criteria:\n\
         {criteria}\n\
         \n\
         Respond with JSON only:\n\
         {{\"score\": <number 0 to {max}>, \"feedback\": \"<brief explanation>\"}}",
        context = context,
        question = question_prompt,
        answer = answer,
        max = rubric.max_marks,
        criteria = criteria,
    )
}

pub(crate) fn speaking_prompt(answer: &str, rubric: &SpeakingRubric, question_prompt: &str) -> String {
    let mut rubric_text = String::new();
    for (name, category) in &rubric.categories {
        let _ = writeln!(
            rubric_text,
            "\n{} (max {} marks):",
            name.to_uppercase(),
            category.max
        );
        for level in &category.levels {
            let _ = writeln!(
                rubric_text,
                "  Level {} ({} marks): {}",
                level.level, level.marks, level.description
            );
        }
    }

    let names: Vec<&str> = rubric.categories.keys().map(String::as_str).collect();
    let schema = rubric
        .categories
        .iter()
        .map(|(name, category)| {
            format!(
                "\"{}\": {{\"score\": <number 0-{}>, \"level\": <level number>, \"reason\": \"<brief explanation>\"}}",
                name, category.max
            )
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You are an English language examiner. Grade the following spoken response using ONLY the rubric provided.\n\
         \n\
         QUESTION/PROMPT:\n{question}\n\
         \n\
         STUDENT'S RESPONSE:\n{answer}\n\
         \n\
         GRADING RUBRIC:\n{rubric_text}\n\
         Instructions:\n\
         1. Evaluate the response for each category: {names}\n\
         2. The response is a transcript, so judge pronunciation-like criteria by word choice clarity and sentence structure\n\
         3. Assign a specific mark within each level range based on how well the response meets the criteria\n\
         4. Be fair but strict - award marks only where criteria are clearly met\n\
         \n\
         Respond in this exact JSON format:\n\
         {{{schema}, \"total\": <sum of all scores>, \"overall_feedback\": \"<2-3 sentence summary>\"}}",
        question = question_prompt,
        answer = answer,
        rubric_text = rubric_text,
        names = names.join(", "),
        schema = schema,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::rubric::{Idea, MarksLabel, RubricCategory, RubricLevel};

    fn keyword_rubric() -> KeywordRubric {
        KeywordRubric {
            max_marks: 2.0,
            ideas: vec![Idea {
                id: "i1".to_string(),
                required_any: vec!["chlorophyll".to_string(), "sunlight".to_string()],
                banned: vec![],
                supporting: vec![],
                marks: 2.0,
            }],
        }
    }

    fn speaking_rubric() -> SpeakingRubric {
        let mut categories = BTreeMap::new();
        categories.insert(
            "grammar".to_string(),
            RubricCategory {
                max: 10.0,
                levels: vec![RubricLevel {
                    level: 5,
                    marks: MarksLabel::Text("9-10".to_string()),
                    description: "Accurate".to_string(),
                }],
            },
        );
        SpeakingRubric {
            max_marks: None,
            categories,
        }
    }

    #[test]
    fn test_keyword_prompt_contents() {
        let prompt = keyword_prompt("plants eat", &keyword_rubric(), "How do plants feed?", "Title\n\nText");

        assert!(prompt.contains("REFERENCE PASSAGE"));
        assert!(prompt.contains("Title\n\nText"));
        assert!(prompt.contains("Question: How do plants feed?"));
        assert!(prompt.contains("Student Answer: plants eat"));
        assert!(prompt.contains("Max Marks: 2"));
        assert!(prompt.contains("- i1: Award 2 mark(s) if answer contains any of: chlorophyll, sunlight"));
        assert!(prompt.contains(r#"{"score": <number 0 to 2>"#));
    }

    #[test]
    fn test_keyword_prompt_without_passage() {
        let prompt = keyword_prompt("a", &keyword_rubric(), "q", "");
        assert!(!prompt.contains("REFERENCE PASSAGE"));
    }

    #[test]
    fn test_speaking_prompt_lists_levels() {
        let prompt = speaking_prompt("I like my town", &speaking_rubric(), "Describe your town");

        assert!(prompt.contains("GRAMMAR (max 10 marks):"));
        assert!(prompt.contains("Level 5 (9-10 marks): Accurate"));
        assert!(prompt.contains(r#""grammar": {"score""#));
        assert!(prompt.contains("\"total\""));
    }

    #[tokio::test]
    async fn test_unconfigured_speaking() {
        let grader = AiGrader::unconfigured();
        let result = grader
            .grade_speaking("This is a long enough answer", &speaking_rubric(), "q")
            .await;

        assert_eq!(result.ai_score, None);
        assert_eq!(result.max_marks, 40.0);
        assert_eq!(result.feedback, "AI grading unavailable - API key not configured");
    }

    #[tokio::test]
    async fn test_short_speaking_answer_scores_zero() {
        let grader = AiGrader::unconfigured();
        let result = grader.grade_speaking("short", &speaking_rubric(), "q").await;

        assert_eq!(result.ai_score, Some(0.0));
        assert_eq!(result.feedback, "Response too short to evaluate");
    }

    #[tokio::test]
    async fn test_unconfigured_keyword_returns_deterministic() {
        let grader = AiGrader::unconfigured();
        let result = grader
            .keyword_with_fallback("plants make food", &keyword_rubric(), "q", "")
            .await;

        assert_eq!(result.auto_score, Some(0.0));
        assert_eq!(result.ai_score, None);
        assert!(result.feedback.contains("Not matched"));
    }

    struct FixedReply(&'static str);

    #[async_trait::async_trait]
    impl LLMProvider for FixedReply {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _request: &CompletionRequest) -> crate::llm::Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn test_speaking_with_negative_ceiling_does_not_panic() {
        let grader = AiGrader::new(
            Some(Arc::new(FixedReply(r#"{"total": 5}"#))),
            Arc::new(RateLimiter::per_minute(0)),
            AiGradingSettings::default(),
        );
        let rubric = SpeakingRubric {
            max_marks: Some(-1.0),
            ..speaking_rubric()
        };

        let result = grader
            .grade_speaking("This answer is long enough to grade", &rubric, "q")
            .await;
        assert_eq!(result.ai_score, Some(0.0));
    }

    struct Unhealthy;

    #[async_trait::async_trait]
    impl LLMProvider for Unhealthy {
        fn name(&self) -> &str {
            "unhealthy"
        }

        async fn complete(&self, _request: &CompletionRequest) -> crate::llm::Result<String> {
            Ok(String::new())
        }

        async fn check_health(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_availability_follows_provider_health() {
        let limiter = || Arc::new(RateLimiter::per_minute(0));
        let none = AiGrader::unconfigured();
        assert!(!none.is_available().await);

        let healthy = AiGrader::new(
            Some(Arc::new(FixedReply("{}"))),
            limiter(),
            AiGradingSettings::default(),
        );
        assert!(healthy.is_available().await);

        let down = AiGrader::new(Some(Arc::new(Unhealthy)), limiter(), AiGradingSettings::default());
        assert!(!down.is_available().await);
    }

    #[test]
    fn test_bounded_clamps_into_range() {
        assert_eq!(bounded(5.0, 2.0), 2.0);
        assert_eq!(bounded(-1.0, 2.0), 0.0);
        assert_eq!(bounded(5.0, -1.0), 0.0);
        assert_eq!(bounded(5.0, f64::NAN), 0.0);
    }

    #[test]
    fn test_json_number_accepts_strings() {
        assert_eq!(json_number(&serde_json::json!(7.5)), Some(7.5));
        assert_eq!(json_number(&serde_json::json!("8")), Some(8.0));
        assert_eq!(json_number(&serde_json::json!("eight")), None);
    }
}
