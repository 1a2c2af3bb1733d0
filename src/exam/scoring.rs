// src/exam/scoring.rs
//
// Pure scoring engine with negative marking. Deterministic: identical
// inputs always produce the identical outcome, no side effects.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Pass mark as a fraction of the question count, applied to the RAW
/// score (correct - wrong), not the percentage. A candidate passes a
/// 45-question exam with a raw score of 18 or better.
pub const PASS_MARK_RATIO: f64 = 0.4;

/// Authoritative answer key for one question, in exam order.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct AnswerKey {
    pub id: i64,
    pub answer: String,
}

/// What one question contributed to the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionBreakdown {
    pub question_id: i64,
    /// The option the candidate selected, if any.
    pub supplied_answer: Option<String>,
    pub correct_answer: String,
    pub is_correct: bool,
}

/// Aggregate result of scoring one answer set against one key set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringOutcome {
    pub breakdown: Vec<QuestionBreakdown>,
    pub total_questions: i64,
    pub correct: i64,
    pub wrong: i64,
    pub unattempted: i64,
    /// correct - wrong; may be negative.
    pub score: i64,
    /// score / total * 100, rounded to 2 decimals. Deliberately NOT
    /// clamped at zero: a heavily negative-marked attempt reports a
    /// negative percentage.
    pub percentage: f64,
    /// Raw-score pass check: score >= total * PASS_MARK_RATIO.
    pub passed: bool,
}

/// Scores an answer map against the answer keys, in key order.
///
/// Each question is worth +1 when answered correctly, -1 when answered
/// incorrectly, and 0 when left unattempted.
pub fn score(keys: &[AnswerKey], answers: &HashMap<i64, String>) -> ScoringOutcome {
    let mut breakdown = Vec::with_capacity(keys.len());
    let mut correct = 0i64;
    let mut wrong = 0i64;
    let mut unattempted = 0i64;

    for key in keys {
        let supplied = answers.get(&key.id);
        let is_correct = supplied.is_some_and(|ans| ans == &key.answer);

        match supplied {
            None => unattempted += 1,
            Some(_) if is_correct => correct += 1,
            Some(_) => wrong += 1,
        }

        breakdown.push(QuestionBreakdown {
            question_id: key.id,
            supplied_answer: supplied.cloned(),
            correct_answer: key.answer.clone(),
            is_correct,
        });
    }

    aggregate(breakdown, correct, wrong, unattempted)
}

/// Recomputes an outcome from an edited breakdown (admin result edits).
/// Correctness is re-derived from the supplied/correct answers in the
/// breakdown itself; client-sent `is_correct` flags are not trusted.
pub fn rescore_breakdown(breakdown: Vec<QuestionBreakdown>) -> ScoringOutcome {
    let mut correct = 0i64;
    let mut wrong = 0i64;
    let mut unattempted = 0i64;

    let breakdown: Vec<QuestionBreakdown> = breakdown
        .into_iter()
        .map(|entry| {
            let is_correct = entry
                .supplied_answer
                .as_deref()
                .is_some_and(|ans| ans == entry.correct_answer);
            match &entry.supplied_answer {
                None => unattempted += 1,
                Some(_) if is_correct => correct += 1,
                Some(_) => wrong += 1,
            }
            QuestionBreakdown { is_correct, ..entry }
        })
        .collect();

    aggregate(breakdown, correct, wrong, unattempted)
}

fn aggregate(
    breakdown: Vec<QuestionBreakdown>,
    correct: i64,
    wrong: i64,
    unattempted: i64,
) -> ScoringOutcome {
    let total = breakdown.len() as i64;
    let score = correct - wrong;
    let percentage = if total == 0 {
        0.0
    } else {
        round2(score as f64 / total as f64 * 100.0)
    };
    let passed = score as f64 >= total as f64 * PASS_MARK_RATIO;

    ScoringOutcome {
        breakdown,
        total_questions: total,
        correct,
        wrong,
        unattempted,
        score,
        percentage,
        passed,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(n: i64) -> Vec<AnswerKey> {
        (1..=n)
            .map(|id| AnswerKey { id, answer: format!("opt-{id}") })
            .collect()
    }

    fn correct_answer(id: i64) -> String {
        format!("opt-{id}")
    }

    #[test]
    fn counts_always_sum_to_total() {
        let keys = keys(45);
        let mut answers = HashMap::new();
        answers.insert(1, correct_answer(1));
        answers.insert(2, "nonsense".to_string());
        answers.insert(7, correct_answer(7));

        let outcome = score(&keys, &answers);

        assert_eq!(
            outcome.correct + outcome.wrong + outcome.unattempted,
            outcome.total_questions
        );
        assert_eq!(outcome.breakdown.len(), 45);
    }

    #[test]
    fn scoring_is_deterministic() {
        let keys = keys(45);
        let mut answers = HashMap::new();
        answers.insert(3, correct_answer(3));
        answers.insert(9, "wrong".to_string());

        assert_eq!(score(&keys, &answers), score(&keys, &answers));
    }

    #[test]
    fn one_correct_one_wrong_rest_unattempted() {
        let keys = keys(45);
        let mut answers = HashMap::new();
        answers.insert(1, correct_answer(1));
        answers.insert(2, "wrong".to_string());

        let outcome = score(&keys, &answers);

        assert_eq!(outcome.correct, 1);
        assert_eq!(outcome.wrong, 1);
        assert_eq!(outcome.unattempted, 43);
        assert_eq!(outcome.score, 0);
        assert_eq!(outcome.percentage, 0.00);
        assert!(!outcome.passed); // 0 < 45 * 0.4 = 18
    }

    #[test]
    fn full_marks() {
        let keys = keys(45);
        let answers: HashMap<i64, String> =
            (1..=45).map(|id| (id, correct_answer(id))).collect();

        let outcome = score(&keys, &answers);

        assert_eq!(outcome.score, 45);
        assert_eq!(outcome.percentage, 100.00);
        assert!(outcome.passed);
    }

    #[test]
    fn negative_marking_cancels_out() {
        let keys = keys(45);
        let mut answers = HashMap::new();
        for id in 1..=20 {
            answers.insert(id, correct_answer(id));
        }
        for id in 21..=40 {
            answers.insert(id, "wrong".to_string());
        }

        let outcome = score(&keys, &answers);

        assert_eq!(outcome.correct, 20);
        assert_eq!(outcome.wrong, 20);
        assert_eq!(outcome.unattempted, 5);
        assert_eq!(outcome.score, 0);
        assert_eq!(outcome.percentage, 0.00);
        assert!(!outcome.passed);
    }

    #[test]
    fn percentage_goes_negative_and_is_not_clamped() {
        let keys = keys(45);
        let answers: HashMap<i64, String> =
            (1..=45).map(|id| (id, "wrong".to_string())).collect();

        let outcome = score(&keys, &answers);

        assert_eq!(outcome.score, -45);
        assert_eq!(outcome.percentage, -100.00);
        assert!(!outcome.passed);
    }

    #[test]
    fn percentage_rounds_to_two_decimals() {
        let keys = keys(45);
        let mut answers = HashMap::new();
        answers.insert(1, correct_answer(1));

        let outcome = score(&keys, &answers);

        // 1 / 45 * 100 = 2.2222...
        assert_eq!(outcome.percentage, 2.22);
    }

    #[test]
    fn pass_threshold_uses_raw_score() {
        let keys = keys(45);
        // Raw score 18 = exactly 45 * 0.4.
        let answers: HashMap<i64, String> =
            (1..=18).map(|id| (id, correct_answer(id))).collect();

        let outcome = score(&keys, &answers);

        assert_eq!(outcome.score, 18);
        assert!(outcome.passed);
    }

    #[test]
    fn empty_key_set_scores_zero() {
        let outcome = score(&[], &HashMap::new());
        assert_eq!(outcome.total_questions, 0);
        assert_eq!(outcome.percentage, 0.0);
    }

    #[test]
    fn rescore_rederives_correctness_from_answers() {
        let breakdown = vec![
            QuestionBreakdown {
                question_id: 1,
                supplied_answer: Some("a".to_string()),
                correct_answer: "a".to_string(),
                // Client claims wrong; re-derivation says correct.
                is_correct: false,
            },
            QuestionBreakdown {
                question_id: 2,
                supplied_answer: Some("b".to_string()),
                correct_answer: "c".to_string(),
                is_correct: true,
            },
            QuestionBreakdown {
                question_id: 3,
                supplied_answer: None,
                correct_answer: "d".to_string(),
                is_correct: false,
            },
        ];

        let outcome = rescore_breakdown(breakdown);

        assert_eq!(outcome.correct, 1);
        assert_eq!(outcome.wrong, 1);
        assert_eq!(outcome.unattempted, 1);
        assert_eq!(outcome.score, 0);
        assert!(outcome.breakdown[0].is_correct);
        assert!(!outcome.breakdown[1].is_correct);
    }
}
