// src/exam/providers.rs
//
// Collaborator contracts the exam core depends on, plus their Postgres
// implementations. The core only ever sees the traits; tests drive the
// same seams with in-memory fakes.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, types::Json};

use crate::exam::scoring::{self, AnswerKey};
use crate::models::question::Question;
use crate::models::result::ExamResult;

#[derive(Debug)]
pub enum CollaboratorError {
    /// The question bank cannot supply a full exam set.
    InsufficientPool { available: usize, required: usize },
    /// The store refused the payload. Not retryable.
    Rejected(String),
    /// Network/storage failure. Retryable; the session must survive it.
    Unavailable(String),
    NotFound,
}

impl fmt::Display for CollaboratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollaboratorError::InsufficientPool { available, required } => {
                write!(f, "question pool has {available} questions, exam needs {required}")
            }
            CollaboratorError::Rejected(msg) => write!(f, "submission rejected: {msg}"),
            CollaboratorError::Unavailable(msg) => write!(f, "collaborator unavailable: {msg}"),
            CollaboratorError::NotFound => write!(f, "result not found"),
        }
    }
}

impl std::error::Error for CollaboratorError {}

impl From<sqlx::Error> for CollaboratorError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => CollaboratorError::NotFound,
            other => CollaboratorError::Unavailable(other.to_string()),
        }
    }
}

/// Reference to a persisted result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultReference {
    pub id: i64,
}

/// Supplies the randomized question set a session is built from.
#[async_trait]
pub trait QuestionSetProvider: Send + Sync {
    async fn fetch_exam_set(&self, count: usize) -> Result<Vec<Question>, CollaboratorError>;
}

/// Persists a completed attempt. Receives the raw answer snapshot and
/// scores it against its own authoritative key; nothing score-shaped is
/// accepted from the caller.
#[async_trait]
pub trait ResultSubmitter: Send + Sync {
    async fn submit(
        &self,
        candidate_id: i64,
        question_ids: &[i64],
        answers: &HashMap<i64, String>,
        elapsed_seconds: i64,
    ) -> Result<ResultReference, CollaboratorError>;
}

/// Reads back persisted results.
#[async_trait]
pub trait ResultReader: Send + Sync {
    async fn fetch_by_id(&self, id: i64) -> Result<ExamResult, CollaboratorError>;
    async fn fetch_latest_for_candidate(
        &self,
        candidate_id: i64,
    ) -> Result<ExamResult, CollaboratorError>;
}

/// Draws random questions from the 'questions' table.
#[derive(Clone)]
pub struct PgQuestionSetProvider {
    pool: PgPool,
}

impl PgQuestionSetProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuestionSetProvider for PgQuestionSetProvider {
    async fn fetch_exam_set(&self, count: usize) -> Result<Vec<Question>, CollaboratorError> {
        let questions = sqlx::query_as::<_, Question>(
            r#"
            SELECT id, prompt, options, answer, category, difficulty, created_at
            FROM questions
            ORDER BY RANDOM()
            LIMIT $1
            "#,
        )
        .bind(count as i64)
        .fetch_all(&self.pool)
        .await?;

        if questions.len() < count {
            return Err(CollaboratorError::InsufficientPool {
                available: questions.len(),
                required: count,
            });
        }

        Ok(questions)
    }
}

/// Scores and persists completed attempts in the 'exam_results' table,
/// and reads them back.
#[derive(Clone)]
pub struct PgResultStore {
    pool: PgPool,
}

impl PgResultStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetches the authoritative answer keys for the session's question
    /// set, in the session's original order.
    async fn fetch_keys(&self, question_ids: &[i64]) -> Result<Vec<AnswerKey>, CollaboratorError> {
        let mut query_builder = QueryBuilder::<Postgres>::new(
            "SELECT id, answer FROM questions WHERE id IN (",
        );
        let mut separated = query_builder.separated(",");
        for id in question_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let rows: Vec<AnswerKey> =
            query_builder.build_query_as().fetch_all(&self.pool).await?;

        let mut by_id: HashMap<i64, String> =
            rows.into_iter().map(|k| (k.id, k.answer)).collect();

        question_ids
            .iter()
            .map(|id| {
                by_id
                    .remove(id)
                    .map(|answer| AnswerKey { id: *id, answer })
                    .ok_or_else(|| {
                        CollaboratorError::Rejected(format!(
                            "question {id} no longer exists in the bank"
                        ))
                    })
            })
            .collect()
    }
}

#[async_trait]
impl ResultSubmitter for PgResultStore {
    async fn submit(
        &self,
        candidate_id: i64,
        question_ids: &[i64],
        answers: &HashMap<i64, String>,
        elapsed_seconds: i64,
    ) -> Result<ResultReference, CollaboratorError> {
        if question_ids.is_empty() {
            return Err(CollaboratorError::Rejected("empty question set".to_string()));
        }

        let keys = self.fetch_keys(question_ids).await?;
        let outcome = scoring::score(&keys, answers);

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO exam_results
                (user_id, total_questions, correct_count, wrong_count,
                 unattempted_count, score, percentage, passed,
                 time_taken_seconds, breakdown)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(candidate_id)
        .bind(outcome.total_questions)
        .bind(outcome.correct)
        .bind(outcome.wrong)
        .bind(outcome.unattempted)
        .bind(outcome.score)
        .bind(outcome.percentage)
        .bind(outcome.passed)
        .bind(elapsed_seconds)
        .bind(Json(&outcome.breakdown))
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            candidate_id,
            result_id = id,
            score = outcome.score,
            passed = outcome.passed,
            "exam result persisted"
        );

        Ok(ResultReference { id })
    }
}

#[async_trait]
impl ResultReader for PgResultStore {
    async fn fetch_by_id(&self, id: i64) -> Result<ExamResult, CollaboratorError> {
        let result = sqlx::query_as::<_, ExamResult>(
            "SELECT * FROM exam_results WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        result.ok_or(CollaboratorError::NotFound)
    }

    async fn fetch_latest_for_candidate(
        &self,
        candidate_id: i64,
    ) -> Result<ExamResult, CollaboratorError> {
        let result = sqlx::query_as::<_, ExamResult>(
            r#"
            SELECT * FROM exam_results
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(candidate_id)
        .fetch_optional(&self.pool)
        .await?;

        result.ok_or(CollaboratorError::NotFound)
    }
}
