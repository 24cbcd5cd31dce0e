//! Per-(subject, exam set) document loading
//!
//! Lookup order, first existing file wins:
//!
//! | document      | set-specific                  | default              |
//! |---------------|-------------------------------|----------------------|
//! | rubric        | `<subject>_set<set>.json`     | `<subject>.json`     |
//! | question bank | `<subject>_exam_<set>.json`   | `<subject>_exam.json`|
//!
//! A missing document yields an empty one. A present but malformed document
//! is a configuration error.

use super::question_bank::QuestionBank;
use crate::config::GradingConfig;
use crate::grading::Rubric;
use sdk::errors::EngineError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Read-only grading configuration shared by every candidate of a pair
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExamCatalog {
    pub rubric: Rubric,
    pub question_bank: QuestionBank,
}

/// Subject and set become file names, so keep them to plain segments
pub fn validate_segment(kind: &str, value: &str) -> Result<(), EngineError> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if valid {
        Ok(())
    } else {
        Err(EngineError::InvalidInput(format!(
            "Invalid {} '{}': use letters, digits, '-' or '_'",
            kind, value
        )))
    }
}

fn first_existing(candidates: [PathBuf; 2]) -> Option<PathBuf> {
    candidates.into_iter().find(|p| p.is_file())
}

pub fn rubric_path(dir: &Path, subject: &str, exam_set: &str) -> Option<PathBuf> {
    first_existing([
        dir.join(format!("{}_set{}.json", subject, exam_set)),
        dir.join(format!("{}.json", subject)),
    ])
}

pub fn question_bank_path(dir: &Path, subject: &str, exam_set: &str) -> Option<PathBuf> {
    first_existing([
        dir.join(format!("{}_exam_{}.json", subject, exam_set)),
        dir.join(format!("{}_exam.json", subject)),
    ])
}

async fn read_document(path: &Path) -> Result<String, EngineError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| EngineError::Config(format!("Failed to read {}: {}", path.display(), e)))
}

pub async fn load_rubric(dir: &Path, subject: &str, exam_set: &str) -> Result<Rubric, EngineError> {
    match rubric_path(dir, subject, exam_set) {
        Some(path) => {
            debug!("Loading rubric {}", path.display());
            Rubric::from_json_str(&read_document(&path).await?)
        }
        None => {
            warn!(
                "No rubric for {} set {}, every question grades as auto",
                subject, exam_set
            );
            Ok(Rubric::empty())
        }
    }
}

pub async fn load_question_bank(
    dir: &Path,
    subject: &str,
    exam_set: &str,
) -> Result<QuestionBank, EngineError> {
    match question_bank_path(dir, subject, exam_set) {
        Some(path) => {
            debug!("Loading question bank {}", path.display());
            QuestionBank::from_json_str(&read_document(&path).await?)
        }
        None => {
            warn!(
                "No question bank for {} set {}, answer keys unavailable",
                subject, exam_set
            );
            Ok(QuestionBank::empty())
        }
    }
}

/// Loads each (subject, exam set) pair once and hands out shared copies
pub struct CatalogCache {
    rubrics_dir: PathBuf,
    question_bank_dir: PathBuf,
    entries: RwLock<HashMap<(String, String), Arc<ExamCatalog>>>,
}

impl CatalogCache {
    pub fn new(rubrics_dir: impl Into<PathBuf>, question_bank_dir: impl Into<PathBuf>) -> Self {
        Self {
            rubrics_dir: rubrics_dir.into(),
            question_bank_dir: question_bank_dir.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &GradingConfig) -> Self {
        Self::new(&config.rubrics_dir, &config.question_bank_dir)
    }

    pub async fn get(&self, subject: &str, exam_set: &str) -> Result<Arc<ExamCatalog>, EngineError> {
        validate_segment("subject", subject)?;
        validate_segment("exam set", exam_set)?;

        let key = (subject.to_string(), exam_set.to_string());
        if let Some(catalog) = self.entries.read().await.get(&key) {
            return Ok(Arc::clone(catalog));
        }

        // Loading under the write lock keeps concurrent misses to one read
        let mut entries = self.entries.write().await;
        if let Some(catalog) = entries.get(&key) {
            return Ok(Arc::clone(catalog));
        }

        let catalog = Arc::new(ExamCatalog {
            rubric: load_rubric(&self.rubrics_dir, subject, exam_set).await?,
            question_bank: load_question_bank(&self.question_bank_dir, subject, exam_set).await?,
        });

        info!(
            "Loaded exam catalog for {} set {} ({} questions)",
            subject,
            exam_set,
            catalog.question_bank.question_count()
        );
        entries.insert(key, Arc::clone(&catalog));
        Ok(catalog)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
