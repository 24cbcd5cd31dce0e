//! Attempt lifecycle
//!
//! `ExamService` owns every write that can create an attempt (answers,
//! incidents, explicit starts) and the finish action. All of them run under
//! a per-candidate lock, so two requests for the same candidate apply in
//! order while other candidates proceed independently.
//!
//! An attempt created implicitly by an incident starts on
//! [`DEFAULT_EXAM_SET`]. The first stored answer fixes the attempt's exam
//! set to the one the answer was given for.

pub mod catalog;
pub mod question_bank;

pub use catalog::{CatalogCache, ExamCatalog};
pub use question_bank::QuestionBank;

use crate::grading::{summarize, Grader};
use crate::proctoring::now_millis;
use crate::store::{current_or_new_attempt, KeyedLocks, SessionStore};
use chrono::Utc;
use sdk::errors::EngineError;
use sdk::types::{
    AnswerRecord, AnswerSubmission, Attempt, ExamResults, IncidentRecord, SessionSummary,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Exam set for attempts started before any answer names one
pub const DEFAULT_EXAM_SET: &str = "A";

fn require(field: &str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        Err(EngineError::InvalidInput(format!("{} is required", field)))
    } else {
        Ok(())
    }
}

pub struct ExamService {
    sessions: Arc<dyn SessionStore>,
    catalogs: Arc<CatalogCache>,
    grader: Arc<Grader>,
    locks: KeyedLocks,
}

impl ExamService {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        catalogs: Arc<CatalogCache>,
        grader: Arc<Grader>,
    ) -> Self {
        Self {
            sessions,
            catalogs,
            grader,
            locks: KeyedLocks::new(),
        }
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Begin a fresh attempt; later answers attach to it
    pub async fn start_attempt(
        &self,
        candidate_id: &str,
        exam_set: &str,
    ) -> Result<Attempt, EngineError> {
        require("candidate_id", candidate_id)?;
        catalog::validate_segment("exam set", exam_set)?;

        let _guard = self.locks.lock(candidate_id).await;
        let attempt = self.sessions.start_attempt(candidate_id, exam_set).await?;
        info!("Started attempt {} (set {})", attempt.id, exam_set);
        Ok(attempt)
    }

    /// Persist one answer with its key resolved from the question bank
    pub async fn submit_answer(
        &self,
        submission: AnswerSubmission,
    ) -> Result<AnswerRecord, EngineError> {
        require("candidate_id", &submission.candidate_id)?;
        require("section_id", &submission.section_id)?;
        require("question_id", &submission.question_id)?;
        catalog::validate_segment("subject", &submission.subject)?;
        catalog::validate_segment("exam set", &submission.exam_set)?;

        let catalog = self
            .catalogs
            .get(&submission.subject, &submission.exam_set)
            .await?;
        let correct_answer = catalog
            .question_bank
            .correct_option(&submission.section_id, &submission.question_id);

        let record = AnswerRecord {
            candidate_id: submission.candidate_id,
            exam_set: submission.exam_set,
            subject: submission.subject,
            section_id: submission.section_id,
            question_id: submission.question_id,
            question_number: submission.question_number,
            prompt: submission.prompt,
            correct_answer,
            selected_option: submission.selected_option,
            answer_text: submission.answer,
        };

        let _guard = self.locks.lock(&record.candidate_id).await;
        let attempt =
            current_or_new_attempt(self.sessions.as_ref(), &record.candidate_id, &record.exam_set)
                .await?;
        if attempt.exam_set != record.exam_set
            && self
                .sessions
                .claim_exam_set(&attempt.id, &record.exam_set)
                .await?
        {
            info!(
                "Attempt {} moved from set {} to set {}",
                attempt.id, attempt.exam_set, record.exam_set
            );
        }
        self.sessions.save_answer(&attempt.id, &record).await?;

        debug!(
            "Saved answer {}/{} for attempt {}",
            record.section_id, record.question_id, attempt.id
        );
        Ok(record)
    }

    /// Store a client-reported incident against the current attempt
    pub async fn record_incident(
        &self,
        candidate_id: &str,
        mut incident: IncidentRecord,
    ) -> Result<(), EngineError> {
        require("candidate_id", candidate_id)?;
        require("incident_type", &incident.incident_type)?;

        if incident.recorded_at <= 0 {
            incident.recorded_at = now_millis();
        }

        let _guard = self.locks.lock(candidate_id).await;
        let attempt =
            current_or_new_attempt(self.sessions.as_ref(), candidate_id, DEFAULT_EXAM_SET).await?;
        self.sessions.record_incident(&attempt.id, &incident).await?;
        info!(
            "Incident {} recorded for attempt {}",
            incident.incident_type, attempt.id
        );
        Ok(())
    }

    /// Grade every stored answer of the latest attempt and persist the outcome.
    ///
    /// Grading is sequential. Re-finishing replaces the earlier grading.
    pub async fn finish_exam(&self, candidate_id: &str) -> Result<SessionSummary, EngineError> {
        require("candidate_id", candidate_id)?;

        let _guard = self.locks.lock(candidate_id).await;

        let attempt = self
            .sessions
            .latest_attempt(candidate_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("No attempt found for candidate {}", candidate_id))
            })?;

        let answers = self.sessions.list_answers(&attempt.id).await?;
        info!(
            "Grading attempt {} ({} answers)",
            attempt.id,
            answers.len()
        );

        let mut results = Vec::with_capacity(answers.len());
        for answer in &answers {
            let catalog = self.catalogs.get(&answer.subject, &answer.exam_set).await?;
            let strategy = catalog
                .rubric
                .strategy_for(&answer.section_id, &answer.question_id);
            let passage = catalog
                .question_bank
                .passage_context(&answer.section_id, &answer.question_id);

            results.push(self.grader.grade(answer, strategy, &passage).await);
        }

        let summary = summarize(&attempt, &results, Utc::now());
        self.sessions
            .save_grading(&attempt.id, &results, &summary)
            .await?;

        info!(
            "Attempt {} graded: {}/{} ({}%)",
            attempt.id, summary.total_score, summary.total_max, summary.percentage
        );
        Ok(summary)
    }

    /// Summary and per-question grading of the latest graded attempt
    pub async fn results(&self, candidate_id: &str) -> Result<ExamResults, EngineError> {
        require("candidate_id", candidate_id)?;

        let not_found =
            || EngineError::NotFound(format!("No results found for candidate {}", candidate_id));

        let attempt = self
            .sessions
            .latest_attempt(candidate_id)
            .await?
            .ok_or_else(not_found)?;
        let summary = self
            .sessions
            .load_summary(&attempt.id)
            .await?
            .ok_or_else(not_found)?;
        let grading = self.sessions.load_grading(&attempt.id).await?;

        Ok(ExamResults { summary, grading })
    }
}
