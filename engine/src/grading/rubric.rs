//! Rubric documents
//!
//! Rubric JSON is parsed into raw serde structs and then validated into a
//! [`Rubric`]: a lookup from (section, question) to a closed
//! [`GradingStrategy`]. Shape problems are reported once, at load time, as
//! `EngineError::Config`.
//!
//! ```json
//! {
//!   "sections": {
//!     "reading": {
//!       "grading_type": "keyword",
//!       "max_marks": 2,
//!       "ideas": [ ... ],
//!       "questions": {
//!         "q7": { "grading_type": "ai_rubric", "categories": { ... } }
//!       }
//!     }
//!   }
//! }
//! ```

use sdk::errors::EngineError;
use sdk::types::GradingType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// One scorable sub-criterion of a free-text answer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Idea {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub required_any: Vec<String>,
    #[serde(default)]
    pub banned: Vec<String>,
    #[serde(default)]
    pub supporting: Vec<String>,
    #[serde(default = "default_marks")]
    pub marks: f64,
}

fn default_marks() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordRubric {
    pub max_marks: f64,
    pub ideas: Vec<Idea>,
}

/// Marks label for a rubric level, either a number or a range like "7-8"
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MarksLabel {
    Number(f64),
    Text(String),
}

impl fmt::Display for MarksLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarksLabel::Number(n) => write!(f, "{}", n),
            MarksLabel::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RubricLevel {
    pub level: u32,
    pub marks: MarksLabel,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RubricCategory {
    pub max: f64,
    #[serde(default)]
    pub levels: Vec<RubricLevel>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpeakingRubric {
    /// Overall ceiling; the configured default applies when absent
    pub max_marks: Option<f64>,
    pub categories: BTreeMap<String, RubricCategory>,
}

/// How one question is graded, with the configuration that strategy needs
#[derive(Debug, Clone, PartialEq)]
pub enum GradingStrategy {
    Auto,
    Keyword(KeywordRubric),
    AiRubric(SpeakingRubric),
}

impl GradingStrategy {
    pub fn grading_type(&self) -> GradingType {
        match self {
            GradingStrategy::Auto => GradingType::Auto,
            GradingStrategy::Keyword(_) => GradingType::Keyword,
            GradingStrategy::AiRubric(_) => GradingType::AiRubric,
        }
    }
}

static AUTO: GradingStrategy = GradingStrategy::Auto;

// Raw document shape

#[derive(Debug, Default, Deserialize)]
struct RawRubric {
    #[serde(default)]
    sections: BTreeMap<String, RawSection>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSection {
    #[serde(flatten)]
    entry: RawEntry,
    #[serde(default)]
    questions: BTreeMap<String, RawEntry>,
}

#[derive(Debug, Default, Clone, Deserialize)]
struct RawEntry {
    #[serde(default)]
    grading_type: Option<GradingType>,
    #[serde(default)]
    max_marks: Option<f64>,
    #[serde(default)]
    ideas: Option<Vec<Idea>>,
    #[serde(default)]
    categories: Option<BTreeMap<String, RubricCategory>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct SectionRubric {
    default: Option<GradingStrategy>,
    questions: HashMap<String, GradingStrategy>,
}

/// Validated rubric for one (subject, exam set)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rubric {
    sections: HashMap<String, SectionRubric>,
}

impl Rubric {
    /// Rubric that grades everything as `auto`
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json_str(source: &str) -> Result<Self, EngineError> {
        let raw: RawRubric = serde_json::from_str(source)
            .map_err(|e| EngineError::Config(format!("Malformed rubric document: {}", e)))?;

        let mut sections = HashMap::new();
        for (section_id, section) in raw.sections {
            let default = match section.entry.grading_type {
                Some(grading_type) => Some(build_strategy(
                    grading_type,
                    &section.entry,
                    &RawEntry::default(),
                    &section_id,
                )?),
                None => None,
            };

            let mut questions = HashMap::new();
            for (question_id, entry) in &section.questions {
                let grading_type = entry
                    .grading_type
                    .or(section.entry.grading_type)
                    .unwrap_or(GradingType::Auto);
                let label = format!("{}/{}", section_id, question_id);
                let strategy = build_strategy(grading_type, entry, &section.entry, &label)?;
                questions.insert(question_id.clone(), strategy);
            }

            sections.insert(section_id, SectionRubric { default, questions });
        }

        Ok(Self { sections })
    }

    /// Question entry, then section default, then `auto`
    pub fn strategy_for(&self, section_id: &str, question_id: &str) -> &GradingStrategy {
        let Some(section) = self.sections.get(section_id) else {
            return &AUTO;
        };

        section
            .questions
            .get(question_id)
            .or(section.default.as_ref())
            .unwrap_or(&AUTO)
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Build a strategy, taking each payload field from `entry` and falling back
/// to `fallback` (the section entry) when the question does not set it
fn build_strategy(
    grading_type: GradingType,
    entry: &RawEntry,
    fallback: &RawEntry,
    label: &str,
) -> Result<GradingStrategy, EngineError> {
    match grading_type {
        GradingType::Auto => Ok(GradingStrategy::Auto),
        GradingType::Keyword => {
            let ideas = entry
                .ideas
                .as_ref()
                .or(fallback.ideas.as_ref())
                .ok_or_else(|| {
                    EngineError::Config(format!("Keyword rubric for {} has no ideas", label))
                })?;
            let max_marks = entry.max_marks.or(fallback.max_marks).unwrap_or(1.0);
            check_marks(max_marks, "max_marks", label)?;
            for idea in ideas {
                check_marks(idea.marks, &format!("idea '{}' marks", idea.id), label)?;
            }
            Ok(GradingStrategy::Keyword(KeywordRubric {
                max_marks,
                ideas: ideas.clone(),
            }))
        }
        GradingType::AiRubric => {
            let categories = entry
                .categories
                .as_ref()
                .or(fallback.categories.as_ref())
                .filter(|c| !c.is_empty())
                .ok_or_else(|| {
                    EngineError::Config(format!("AI rubric for {} has no categories", label))
                })?;
            let max_marks = entry.max_marks.or(fallback.max_marks);
            if let Some(max_marks) = max_marks {
                check_marks(max_marks, "max_marks", label)?;
            }
            for (name, category) in categories {
                check_marks(category.max, &format!("category '{}' max", name), label)?;
            }
            Ok(GradingStrategy::AiRubric(SpeakingRubric {
                max_marks,
                categories: categories.clone(),
            }))
        }
    }
}

/// Marks must be finite and non-negative
fn check_marks(value: f64, field: &str, label: &str) -> Result<(), EngineError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(EngineError::Config(format!(
            "Rubric for {} has invalid {}: {}",
            label, field, value
        )))
    }
}
