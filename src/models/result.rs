// src/models/result.rs

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};

use crate::exam::scoring::QuestionBreakdown;

/// Represents the 'exam_results' table in the database.
/// One row per completed exam attempt.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExamResult {
    pub id: i64,
    pub user_id: i64,
    pub total_questions: i64,
    pub correct_count: i64,
    pub wrong_count: i64,
    pub unattempted_count: i64,

    /// Raw score with negative marking: correct - wrong. May be negative.
    pub score: i64,

    /// score / total * 100, rounded to 2 decimals. Not clamped at zero.
    pub percentage: f64,

    pub passed: bool,
    pub time_taken_seconds: i64,

    /// Per-question record of what was supplied against the answer key.
    pub breakdown: Json<Vec<QuestionBreakdown>>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Aggregated row for the admin result listing, joined with `users`.
#[derive(Debug, Serialize, FromRow)]
pub struct ResultListEntry {
    pub id: i64,
    pub user_id: i64,
    pub candidate_name: String,
    pub hall_ticket: Option<String>,
    pub score: i64,
    pub percentage: f64,
    pub passed: bool,
    pub time_taken_seconds: i64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for an admin replacing a result's per-question breakdown.
/// Aggregates are recomputed server-side, never taken from the client.
#[derive(Debug, Deserialize)]
pub struct UpdateResultRequest {
    pub breakdown: Vec<QuestionBreakdown>,
}

/// Portal-wide exam statistics for the admin dashboard.
#[derive(Debug, Serialize)]
pub struct ExamStatistics {
    pub total_candidates: i64,
    pub total_attempts: i64,
    pub average_score: f64,
    pub highest_score: i64,
    pub pass_rate: f64,
}
