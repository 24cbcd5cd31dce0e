/// SQLite-backed session store
///
/// Attempts, answers, incidents, grading rows and summaries. All queries are
/// parameterized. Errors carry anyhow context internally and surface as
/// `EngineError::Database` at the trait boundary.
use crate::store::SessionStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sdk::errors::EngineError;
use sdk::types::{
    AnswerRecord, Attempt, CategoryScore, GradingResult, GradingType, IncidentRecord,
    SessionSummary,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Session repository for database operations
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn insert_attempt(&self, candidate_id: &str, exam_set: &str) -> Result<Attempt> {
        let now = Utc::now();
        let id = format!("{}_{}", candidate_id, now.format("%Y%m%d_%H%M%S%3f"));
        let started_at = now.timestamp_millis();

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO attempts (id, candidate_id, exam_set, started_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(candidate_id)
        .bind(exam_set)
        .bind(started_at)
        .execute(&self.pool)
        .await
        .context("Failed to create attempt")?;

        if inserted.rows_affected() == 0 {
            // Same candidate started twice within one millisecond
            debug!("Attempt {} already exists, reusing it", id);
        }

        Ok(Attempt {
            id,
            candidate_id: candidate_id.to_string(),
            exam_set: exam_set.to_string(),
            started_at,
        })
    }

    async fn fetch_latest_attempt(&self, candidate_id: &str) -> Result<Option<Attempt>> {
        let row = sqlx::query(
            "SELECT id, candidate_id, exam_set, started_at FROM attempts WHERE candidate_id = ? ORDER BY started_at DESC, rowid DESC LIMIT 1",
        )
        .bind(candidate_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch latest attempt")?;

        Ok(row.map(|r| Attempt {
            id: r.get("id"),
            candidate_id: r.get("candidate_id"),
            exam_set: r.get("exam_set"),
            started_at: r.get("started_at"),
        }))
    }

    async fn update_unanswered_exam_set(&self, attempt_id: &str, exam_set: &str) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE attempts SET exam_set = ? WHERE id = ? AND NOT EXISTS (SELECT 1 FROM answers WHERE attempt_id = ?)",
        )
        .bind(exam_set)
        .bind(attempt_id)
        .bind(attempt_id)
        .execute(&self.pool)
        .await
        .context("Failed to update attempt exam set")?;

        Ok(updated.rows_affected() > 0)
    }

    async fn upsert_answer(&self, attempt_id: &str, answer: &AnswerRecord) -> Result<()> {
        let now = Utc::now().timestamp_millis();

        sqlx::query(
            "INSERT INTO answers (attempt_id, subject, section_id, question_id, candidate_id, exam_set, question_number, prompt, correct_answer, selected_option, answer_text, saved_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (attempt_id, subject, section_id, question_id) DO UPDATE SET
                candidate_id = excluded.candidate_id,
                exam_set = excluded.exam_set,
                question_number = excluded.question_number,
                prompt = excluded.prompt,
                correct_answer = excluded.correct_answer,
                selected_option = excluded.selected_option,
                answer_text = excluded.answer_text,
                saved_at = excluded.saved_at",
        )
        .bind(attempt_id)
        .bind(&answer.subject)
        .bind(&answer.section_id)
        .bind(&answer.question_id)
        .bind(&answer.candidate_id)
        .bind(&answer.exam_set)
        .bind(answer.question_number.map(i64::from))
        .bind(&answer.prompt)
        .bind(&answer.correct_answer)
        .bind(&answer.selected_option)
        .bind(&answer.answer_text)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to save answer")?;

        Ok(())
    }

    async fn fetch_answers(&self, attempt_id: &str) -> Result<Vec<AnswerRecord>> {
        let rows = sqlx::query(
            "SELECT candidate_id, exam_set, subject, section_id, question_id, question_number, prompt, correct_answer, selected_option, answer_text
             FROM answers WHERE attempt_id = ? ORDER BY rowid ASC",
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch answers")?;

        Ok(rows
            .into_iter()
            .map(|r| AnswerRecord {
                candidate_id: r.get("candidate_id"),
                exam_set: r.get("exam_set"),
                subject: r.get("subject"),
                section_id: r.get("section_id"),
                question_id: r.get("question_id"),
                question_number: r
                    .get::<Option<i64>, _>("question_number")
                    .and_then(|n| u32::try_from(n).ok()),
                prompt: r.get("prompt"),
                correct_answer: r.get("correct_answer"),
                selected_option: r.get("selected_option"),
                answer_text: r.get("answer_text"),
            })
            .collect())
    }

    async fn insert_incident(&self, attempt_id: &str, incident: &IncidentRecord) -> Result<()> {
        let recorded_at = if incident.recorded_at > 0 {
            incident.recorded_at
        } else {
            Utc::now().timestamp_millis()
        };

        sqlx::query(
            "INSERT INTO incidents (attempt_id, incident_type, details, question_context, recorded_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(attempt_id)
        .bind(&incident.incident_type)
        .bind(&incident.details)
        .bind(&incident.question_context)
        .bind(recorded_at)
        .execute(&self.pool)
        .await
        .context("Failed to record incident")?;

        Ok(())
    }

    async fn fetch_incidents(&self, attempt_id: &str) -> Result<Vec<IncidentRecord>> {
        let rows = sqlx::query(
            "SELECT incident_type, details, question_context, recorded_at FROM incidents WHERE attempt_id = ? ORDER BY id ASC",
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch incidents")?;

        Ok(rows
            .into_iter()
            .map(|r| IncidentRecord {
                incident_type: r.get("incident_type"),
                details: r.get("details"),
                question_context: r.get("question_context"),
                recorded_at: r.get("recorded_at"),
            })
            .collect())
    }

    async fn replace_grading(
        &self,
        attempt_id: &str,
        results: &[GradingResult],
        summary: &SessionSummary,
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin grading transaction")?;

        sqlx::query("DELETE FROM grading_results WHERE attempt_id = ?")
            .bind(attempt_id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear previous grading")?;

        for (position, result) in results.iter().enumerate() {
            let breakdown = result
                .breakdown
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .context("Failed to serialize grading breakdown")?;

            sqlx::query(
                "INSERT INTO grading_results (attempt_id, position, question_id, section_id, grading_type, max_marks, auto_score, ai_score, final_score, feedback, breakdown)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(attempt_id)
            .bind(position as i64)
            .bind(&result.question_id)
            .bind(&result.section_id)
            .bind(result.grading_type.as_str())
            .bind(result.max_marks)
            .bind(result.auto_score)
            .bind(result.ai_score)
            .bind(result.final_score)
            .bind(&result.feedback)
            .bind(breakdown)
            .execute(&mut *tx)
            .await
            .context("Failed to save grading row")?;
        }

        sqlx::query(
            "INSERT INTO summaries (attempt_id, candidate_id, exam_set, total_score, total_max, percentage, graded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (attempt_id) DO UPDATE SET
                total_score = excluded.total_score,
                total_max = excluded.total_max,
                percentage = excluded.percentage,
                graded_at = excluded.graded_at",
        )
        .bind(attempt_id)
        .bind(&summary.candidate_id)
        .bind(&summary.exam_set)
        .bind(summary.total_score)
        .bind(summary.total_max)
        .bind(summary.percentage)
        .bind(summary.graded_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .context("Failed to save summary")?;

        tx.commit()
            .await
            .context("Failed to commit grading transaction")?;

        Ok(())
    }

    async fn fetch_summary(&self, attempt_id: &str) -> Result<Option<SessionSummary>> {
        let row = sqlx::query(
            "SELECT attempt_id, candidate_id, exam_set, total_score, total_max, percentage, graded_at FROM summaries WHERE attempt_id = ?",
        )
        .bind(attempt_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch summary")?;

        row.map(|r| -> Result<SessionSummary> {
            let graded_at: String = r.get("graded_at");
            let graded_at = DateTime::parse_from_rfc3339(&graded_at)
                .context("Invalid graded_at timestamp")?
                .with_timezone(&Utc);

            Ok(SessionSummary {
                attempt_id: r.get("attempt_id"),
                candidate_id: r.get("candidate_id"),
                exam_set: r.get("exam_set"),
                total_score: r.get("total_score"),
                total_max: r.get("total_max"),
                percentage: r.get("percentage"),
                graded_at,
            })
        })
        .transpose()
    }

    async fn fetch_grading(&self, attempt_id: &str) -> Result<Vec<GradingResult>> {
        let rows = sqlx::query(
            "SELECT question_id, section_id, grading_type, max_marks, auto_score, ai_score, final_score, feedback, breakdown
             FROM grading_results WHERE attempt_id = ? ORDER BY position ASC",
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch grading results")?;

        Ok(rows.into_iter().map(grading_from_row).collect())
    }
}

fn grading_from_row(r: SqliteRow) -> GradingResult {
    let grading_type = r.get::<String, _>("grading_type");
    let breakdown = r
        .get::<Option<String>, _>("breakdown")
        .and_then(|raw| match serde_json::from_str::<BTreeMap<String, CategoryScore>>(&raw) {
            Ok(map) => Some(map),
            Err(e) => {
                warn!("Dropping unreadable grading breakdown: {}", e);
                None
            }
        });

    // Stored rows are read back verbatim rather than recomputed
    GradingResult {
        question_id: r.get("question_id"),
        section_id: r.get("section_id"),
        grading_type: GradingType::parse(&grading_type).unwrap_or(GradingType::Auto),
        max_marks: r.get("max_marks"),
        auto_score: r.get("auto_score"),
        ai_score: r.get("ai_score"),
        final_score: r.get("final_score"),
        feedback: r.get("feedback"),
        breakdown,
    }
}

fn db_error(err: anyhow::Error) -> EngineError {
    EngineError::Database(format!("{:#}", err))
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn start_attempt(
        &self,
        candidate_id: &str,
        exam_set: &str,
    ) -> Result<Attempt, EngineError> {
        self.insert_attempt(candidate_id, exam_set)
            .await
            .map_err(db_error)
    }

    async fn latest_attempt(&self, candidate_id: &str) -> Result<Option<Attempt>, EngineError> {
        self.fetch_latest_attempt(candidate_id)
            .await
            .map_err(db_error)
    }

    async fn claim_exam_set(
        &self,
        attempt_id: &str,
        exam_set: &str,
    ) -> Result<bool, EngineError> {
        self.update_unanswered_exam_set(attempt_id, exam_set)
            .await
            .map_err(db_error)
    }

    async fn save_answer(
        &self,
        attempt_id: &str,
        answer: &AnswerRecord,
    ) -> Result<(), EngineError> {
        self.upsert_answer(attempt_id, answer)
            .await
            .map_err(db_error)
    }

    async fn list_answers(&self, attempt_id: &str) -> Result<Vec<AnswerRecord>, EngineError> {
        self.fetch_answers(attempt_id).await.map_err(db_error)
    }

    async fn record_incident(
        &self,
        attempt_id: &str,
        incident: &IncidentRecord,
    ) -> Result<(), EngineError> {
        self.insert_incident(attempt_id, incident)
            .await
            .map_err(db_error)
    }

    async fn list_incidents(&self, attempt_id: &str) -> Result<Vec<IncidentRecord>, EngineError> {
        self.fetch_incidents(attempt_id).await.map_err(db_error)
    }

    async fn save_grading(
        &self,
        attempt_id: &str,
        results: &[GradingResult],
        summary: &SessionSummary,
    ) -> Result<(), EngineError> {
        self.replace_grading(attempt_id, results, summary)
            .await
            .map_err(db_error)
    }

    async fn load_summary(&self, attempt_id: &str) -> Result<Option<SessionSummary>, EngineError> {
        self.fetch_summary(attempt_id).await.map_err(db_error)
    }

    async fn load_grading(&self, attempt_id: &str) -> Result<Vec<GradingResult>, EngineError> {
        self.fetch_grading(attempt_id).await.map_err(db_error)
    }
}
