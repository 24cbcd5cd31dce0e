//! Command handlers for CLI operations
//!
//! - serve: run the HTTP/WebSocket server until Ctrl-C
//! - grade: grade a candidate's latest attempt offline
//! - results: print stored results
//! - config: print the effective configuration

use anyhow::{Context, Result};
use sdk::types::{ExamResults, SessionSummary};
use serde_json::json;
use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::server::{self, AppState};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

async fn open_database(config: &Config) -> Result<Database> {
    Database::new(&config.database_path())
        .await
        .context("Failed to open session database")
}

/// Serve until Ctrl-C, then close the database
pub async fn handle_serve(config: &Config, bind: Option<String>) -> Result<()> {
    let database = open_database(config).await?;
    let state = AppState::from_config(config, Arc::new(database.sessions()))?;

    let bind_addr = bind.unwrap_or_else(|| config.server.bind_addr.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
    };

    let served = server::serve(listener, state, &config.server, shutdown).await;
    database.close().await?;
    served?;
    Ok(())
}

/// Grade a candidate's latest attempt against the configured documents
pub async fn handle_grade(candidate_id: &str, config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_database(config).await?;
    let state = AppState::from_config(config, Arc::new(database.sessions()))?;

    let graded = state.exams.finish_exam(candidate_id).await;
    database.close().await?;
    let summary = graded.with_context(|| format!("Failed to grade {}", candidate_id))?;

    print_summary(&summary, format)
}

pub async fn handle_results(
    candidate_id: &str,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let database = open_database(config).await?;
    let state = AppState::from_config(config, Arc::new(database.sessions()))?;

    let results = state.exams.results(candidate_id).await;
    database.close().await?;
    let results = results.with_context(|| format!("No results for {}", candidate_id))?;

    print_results(&results, format)
}

pub fn handle_config(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            let rendered =
                toml::to_string_pretty(config).context("Failed to render configuration")?;
            println!("{}", rendered);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
    }
    Ok(())
}

fn print_summary(summary: &SessionSummary, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("Attempt:    {}", summary.attempt_id);
            println!("Candidate:  {}", summary.candidate_id);
            println!("Exam set:   {}", summary.exam_set);
            println!(
                "Score:      {} / {} ({}%)",
                summary.total_score, summary.total_max, summary.percentage
            );
            println!(
                "Graded at:  {}",
                summary.graded_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        OutputFormat::Json => {
            let output = json!({
                "total_score": summary.total_score,
                "total_max": summary.total_max,
                "percentage": summary.percentage,
                "attempt_id": summary.attempt_id,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn print_results(results: &ExamResults, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            print_summary(&results.summary, format)?;
            println!();

            for result in &results.grading {
                println!(
                    "  {}/{} [{}] {} / {}",
                    result.section_id,
                    result.question_id,
                    result.grading_type,
                    result.final_score,
                    result.max_marks
                );
                if !result.feedback.is_empty() {
                    println!("    {}", result.feedback);
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(results)?);
        }
    }
    Ok(())
}
