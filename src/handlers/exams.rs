// src/handlers/exams.rs
//
// Candidate-facing exam session endpoints plus admin result management.
// The session itself lives in the in-memory registry; these handlers
// only resolve it and call the state machine.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, types::Json as SqlJson};
use tokio::sync::Mutex;

use crate::{
    error::AppError,
    exam::{
        clock::SessionClock,
        providers::{PgQuestionSetProvider, PgResultStore, ResultReader},
        registry::SessionRegistry,
        scoring,
        service,
        session::{
            Cursor, ExamSession, QUESTIONS_PER_SECTION, SECTION_COUNT, SessionStatus,
        },
    },
    models::{
        question::PublicQuestion,
        result::{ExamResult, ExamStatistics, ResultListEntry, UpdateResultRequest},
        user::{ROLE_CANDIDATE, User},
    },
    state::AppState,
    utils::jwt::Claims,
};

fn status_label(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::InProgress => "in_progress",
        SessionStatus::Expired => "expired",
        SessionStatus::Submitting => "submitting",
        SessionStatus::Submitted => "submitted",
    }
}

#[derive(Debug, Serialize)]
struct ExamStartResponse {
    hall_ticket: String,
    sections: Vec<Vec<PublicQuestion>>,
    section_count: usize,
    per_section: usize,
    deadline: DateTime<Utc>,
    remaining_seconds: i64,
}

/// Starts a fresh exam for the authenticated candidate: draws a random
/// question set, builds the session, and arms its countdown clock.
/// Any previous in-progress session for the candidate is discarded.
pub async fn start_exam(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    if user.role != ROLE_CANDIDATE {
        return Err(AppError::Forbidden("Only candidates can take the exam".to_string()));
    }
    let hall_ticket = user
        .hall_ticket
        .ok_or(AppError::Forbidden("Candidate has no hall ticket assigned".to_string()))?;

    let provider = PgQuestionSetProvider::new(state.pool.clone());
    let now = Utc::now();
    let session = service::start_session(
        &provider,
        user_id,
        hall_ticket.clone(),
        SECTION_COUNT,
        QUESTIONS_PER_SECTION,
        Duration::minutes(state.config.exam_duration_minutes),
        now,
    )
    .await?;

    let response = ExamStartResponse {
        hall_ticket,
        sections: session
            .sections()
            .iter()
            .map(|s| s.iter().map(PublicQuestion::from).collect())
            .collect(),
        section_count: SECTION_COUNT,
        per_section: QUESTIONS_PER_SECTION,
        deadline: session.deadline(),
        remaining_seconds: session.remaining_seconds(now),
    };

    let session = Arc::new(Mutex::new(session));
    let submitter = Arc::new(PgResultStore::new(state.pool.clone()));
    let clock = SessionClock::spawn(session.clone(), submitter);
    state.sessions.insert(user_id, session, clock);

    tracing::info!(candidate_id = user_id, "exam session started");

    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct SessionView {
    status: &'static str,
    cursor: Cursor,
    remaining_seconds: i64,
    answered: Vec<i64>,
    deadline: DateTime<Utc>,
    current_question: PublicQuestion,
}

async fn resolve_session(
    sessions: &SessionRegistry,
    claims: &Claims,
) -> Result<Arc<Mutex<ExamSession>>, AppError> {
    sessions
        .get(claims.user_id()?)
        .ok_or(AppError::NotFound("No active exam session".to_string()))
}

async fn view_of(session: &Arc<Mutex<ExamSession>>) -> Result<SessionView, AppError> {
    let guard = session.lock().await;
    Ok(SessionView {
        status: status_label(guard.status()),
        cursor: guard.cursor(),
        remaining_seconds: guard.remaining_seconds(Utc::now()),
        answered: guard.answered_ids(),
        deadline: guard.deadline(),
        current_question: PublicQuestion::from(guard.current_question()?),
    })
}

/// Returns the candidate's current session state.
pub async fn get_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let session = resolve_session(&state.sessions, &claims).await?;
    Ok(Json(view_of(&session).await?))
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub answer: String,
    /// When true, behaves as "save & next".
    #[serde(default)]
    pub advance: bool,
}

/// Records (or overwrites) the answer for the question under the cursor.
pub async fn record_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<AnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = resolve_session(&state.sessions, &claims).await?;
    {
        let mut guard = session.lock().await;
        guard.record_answer(payload.answer)?;
        if payload.advance {
            guard.advance()?;
        }
    }
    Ok(Json(view_of(&session).await?))
}

/// Skips ahead without touching the answer map.
pub async fn skip_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let session = resolve_session(&state.sessions, &claims).await?;
    session.lock().await.advance()?;
    Ok(Json(view_of(&session).await?))
}

#[derive(Debug, Deserialize)]
pub struct JumpRequest {
    pub section: usize,
    pub question: usize,
}

/// Jumps the cursor to an arbitrary question.
pub async fn jump_to_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<JumpRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = resolve_session(&state.sessions, &claims).await?;
    session.lock().await.jump_to(payload.section, payload.question)?;
    Ok(Json(view_of(&session).await?))
}

/// Submits the candidate's exam. The answers are scored server-side
/// against the question bank's own key; the request carries no score.
/// A concurrent clock-driven submission loses (or wins) the race via
/// the session's status guard, never both.
pub async fn submit_exam(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let session = resolve_session(&state.sessions, &claims).await?;

    let submitter = PgResultStore::new(state.pool.clone());
    let reference = service::submit_session(&session, &submitter, Utc::now()).await?;

    // Submission persisted; tear the session (and its clock) down.
    state.sessions.remove(user_id);

    tracing::info!(candidate_id = user_id, result_id = reference.id, "exam submitted");

    Ok(Json(serde_json::json!({
        "id": reference.id,
        "message": "Exam submitted successfully"
    })))
}

/// Lists the authenticated candidate's own results, newest first.
pub async fn my_results(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let results = sqlx::query_as::<_, ExamResult>(
        "SELECT * FROM exam_results WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(claims.user_id()?)
    .fetch_all(&pool)
    .await?;

    Ok(Json(results))
}

/// Fetches a single result. Candidates may only read their own.
pub async fn get_result(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let reader = PgResultStore::new(pool);
    let result = reader.fetch_by_id(id).await?;

    if !claims.is_admin() && result.user_id != claims.user_id()? {
        return Err(AppError::Forbidden("Not your result".to_string()));
    }

    Ok(Json(result))
}

/// Lists all results with candidate details. Admin only.
pub async fn list_results(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let results = sqlx::query_as::<_, ResultListEntry>(
        r#"
        SELECT
            r.id, r.user_id, u.name AS candidate_name, u.hall_ticket,
            r.score, r.percentage, r.passed, r.time_taken_seconds, r.created_at
        FROM exam_results r
        JOIN users u ON r.user_id = u.id
        ORDER BY r.created_at DESC
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list results: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(results))
}

/// Replaces a result's per-question breakdown. Admin only.
/// All aggregates are recomputed from the edited breakdown with the
/// same scoring rules used at submission time.
pub async fn update_result(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateResultRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.breakdown.is_empty() {
        return Err(AppError::BadRequest("Breakdown cannot be empty".to_string()));
    }

    let outcome = scoring::rescore_breakdown(payload.breakdown);

    let updated = sqlx::query_as::<_, ExamResult>(
        r#"
        UPDATE exam_results SET
            total_questions = $1, correct_count = $2, wrong_count = $3,
            unattempted_count = $4, score = $5, percentage = $6,
            passed = $7, breakdown = $8
        WHERE id = $9
        RETURNING *
        "#,
    )
    .bind(outcome.total_questions)
    .bind(outcome.correct)
    .bind(outcome.wrong)
    .bind(outcome.unattempted)
    .bind(outcome.score)
    .bind(outcome.percentage)
    .bind(outcome.passed)
    .bind(SqlJson(&outcome.breakdown))
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Result not found".to_string()))?;

    Ok(Json(updated))
}

/// Deletes a result by ID. Admin only.
pub async fn delete_result(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM exam_results WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete result: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Result not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Portal-wide statistics for the admin dashboard.
pub async fn get_statistics(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let (total_candidates,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = $1")
            .bind(ROLE_CANDIDATE)
            .fetch_one(&pool)
            .await?;

    let (total_attempts, average_score, highest_score, pass_rate): (i64, f64, i64, f64) =
        sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(AVG(score), 0)::double precision,
                COALESCE(MAX(score), 0),
                COALESCE(AVG(CASE WHEN passed THEN 1.0 ELSE 0.0 END), 0)::double precision
            FROM exam_results
            "#,
        )
        .fetch_one(&pool)
        .await?;

    Ok(Json(ExamStatistics {
        total_candidates,
        total_attempts,
        average_score,
        highest_score,
        pass_rate,
    }))
}
