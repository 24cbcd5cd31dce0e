//! Rule-based graders: multiple choice and keyword/idea matching

use super::rubric::KeywordRubric;
use super::Assessment;

/// Flat bonus for a matched idea that also mentions a supporting phrase
pub const SUPPORTING_BONUS: f64 = 0.25;

/// Case-insensitive single-answer comparison, worth 1 mark.
///
/// An empty selection or an empty key never scores.
pub fn grade_mcq(selected: &str, correct: &str) -> Assessment {
    let selected = selected.trim();
    let correct = correct.trim();

    let is_correct =
        !selected.is_empty() && !correct.is_empty() && selected.eq_ignore_ascii_case(correct);

    let feedback = if is_correct {
        "Correct".to_string()
    } else {
        format!("Incorrect. Correct answer: {}", correct)
    };

    Assessment::auto(if is_correct { 1.0 } else { 0.0 }, 1.0, feedback)
}

/// Score free text against the rubric's ideas.
///
/// Each idea is judged on its own and the results summed, capped at
/// `max_marks`. A banned phrase zeroes the idea before any other check.
pub fn grade_keyword(answer: &str, rubric: &KeywordRubric) -> Assessment {
    if answer.trim().is_empty() {
        return Assessment::auto(0.0, rubric.max_marks, "No answer provided");
    }

    let answer_lower = answer.to_lowercase();
    let mentions = |phrases: &[String]| {
        phrases
            .iter()
            .filter(|p| !p.is_empty())
            .any(|p| answer_lower.contains(&p.to_lowercase()))
    };

    let mut total = 0.0;
    let mut feedback = Vec::with_capacity(rubric.ideas.len());

    for idea in &rubric.ideas {
        if mentions(&idea.banned) {
            feedback.push(format!("[{}] Contains misconception - 0 marks", idea.id));
            continue;
        }

        if mentions(&idea.required_any) {
            let mut score = idea.marks;
            if mentions(&idea.supporting) {
                // the bonus can never lift an idea above its own marks
                score = (score + SUPPORTING_BONUS).min(idea.marks);
            }
            total += score;
            feedback.push(format!("[{}] Matched - {} marks", idea.id, score));
        } else {
            feedback.push(format!("[{}] Not matched - 0 marks", idea.id));
        }
    }

    let feedback = if feedback.is_empty() {
        "Graded by keyword matching".to_string()
    } else {
        feedback.join("; ")
    };

    Assessment::auto(total.min(rubric.max_marks), rubric.max_marks, feedback)
}
