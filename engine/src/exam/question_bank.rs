//! Question bank documents
//!
//! The bank is the server-side source of answer keys and of the reference
//! passages handed to AI grading. Candidates never supply either.

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QuestionBank {
    #[serde(default)]
    pub sections: Vec<BankSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BankSection {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(default)]
    pub questions: Vec<BankQuestion>,
}

/// Reading passage attached to a section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Reference {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BankQuestion {
    pub id: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default, rename = "referenceId")]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub options: Vec<BankOption>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BankOption {
    pub key: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub correct: bool,
}

impl QuestionBank {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json_str(source: &str) -> Result<Self, EngineError> {
        serde_json::from_str(source)
            .map_err(|e| EngineError::Config(format!("Malformed question bank: {}", e)))
    }

    pub fn section(&self, section_id: &str) -> Option<&BankSection> {
        self.sections.iter().find(|s| s.id == section_id)
    }

    pub fn question(&self, section_id: &str, question_id: &str) -> Option<&BankQuestion> {
        self.section(section_id)?
            .questions
            .iter()
            .find(|q| q.id == question_id)
    }

    /// Key of the first option marked correct
    pub fn correct_option(&self, section_id: &str, question_id: &str) -> Option<String> {
        self.question(section_id, question_id)?
            .options
            .iter()
            .find(|o| o.correct)
            .map(|o| o.key.clone())
    }

    /// Passage text for grading context.
    ///
    /// The question's own reference when it names one that exists, otherwise
    /// every reference of the section. Empty when nothing applies.
    pub fn passage_context(&self, section_id: &str, question_id: &str) -> String {
        let Some(section) = self.section(section_id) else {
            return String::new();
        };
        let Some(question) = section.questions.iter().find(|q| q.id == question_id) else {
            return String::new();
        };

        let referenced = question
            .reference_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .and_then(|id| section.references.iter().find(|r| r.id == id));

        if let Some(reference) = referenced {
            return format!("{}\n\n{}", reference.title, reference.text);
        }

        section
            .references
            .iter()
            .map(|r| format!("{}\n{}", r.title, r.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn question_count(&self) -> usize {
        self.sections.iter().map(|s| s.questions.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANK: &str = r#"{
        "sections": [
            {
                "id": "reading",
                "title": "Reading",
                "references": [
                    {"id": "p1", "title": "Plants", "text": "Plants use sunlight."},
                    {"id": "p2", "title": "Water", "text": "Water evaporates."}
                ],
                "questions": [
                    {"id": "r1", "prompt": "Why?", "referenceId": "p2",
                     "options": [{"key": "A", "text": "x"}, {"key": "B", "text": "y", "correct": true}]},
                    {"id": "r2", "prompt": "How?"},
                    {"id": "r3", "referenceId": "missing"}
                ]
            },
            {"id": "grammar", "questions": [{"id": "g1"}]}
        ]
    }"#;

    #[test]
    fn test_correct_option() {
        let bank = QuestionBank::from_json_str(BANK).unwrap();
        assert_eq!(bank.correct_option("reading", "r1"), Some("B".to_string()));
        assert_eq!(bank.correct_option("reading", "r2"), None);
        assert_eq!(bank.correct_option("nope", "r1"), None);
        assert_eq!(bank.question_count(), 4);
    }

    #[test]
    fn test_passage_for_specific_reference() {
        let bank = QuestionBank::from_json_str(BANK).unwrap();
        assert_eq!(bank.passage_context("reading", "r1"), "Water\n\nWater evaporates.");
    }

    #[test]
    fn test_passage_falls_back_to_all_references() {
        let bank = QuestionBank::from_json_str(BANK).unwrap();
        let expected = "Plants\nPlants use sunlight.\n\nWater\nWater evaporates.";
        assert_eq!(bank.passage_context("reading", "r2"), expected);
        // unknown reference id behaves like no reference id
        assert_eq!(bank.passage_context("reading", "r3"), expected);
    }

    #[test]
    fn test_passage_empty_without_references() {
        let bank = QuestionBank::from_json_str(BANK).unwrap();
        assert_eq!(bank.passage_context("grammar", "g1"), "");
        assert_eq!(bank.passage_context("reading", "unknown"), "");
        assert_eq!(QuestionBank::empty().passage_context("a", "b"), "");
    }

    #[test]
    fn test_malformed_bank_is_config_error() {
        let err = QuestionBank::from_json_str(r#"{"sections": {"a": 1}}"#).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
