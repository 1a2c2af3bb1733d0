// src/exam/service.rs
//
// Orchestration between the session state machine and its collaborators.
// `submit_session` is the single submission path shared by the candidate
// handler and the clock's forced submission, so both race through the
// same `begin_submit` guard.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::exam::providers::{
    CollaboratorError, QuestionSetProvider, ResultReference, ResultSubmitter,
};
use crate::exam::session::{ExamSession, SessionError};

#[derive(Debug)]
pub enum SubmitError {
    /// Another submission already won the race (or already finished).
    AlreadySubmitting,
    /// The collaborator failed; the session was returned to
    /// `InProgress` with its answers intact and can be retried.
    Collaborator(CollaboratorError),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::AlreadySubmitting => {
                write!(f, "exam submission already in progress or completed")
            }
            SubmitError::Collaborator(e) => write!(f, "submission failed: {e}"),
        }
    }
}

impl std::error::Error for SubmitError {}

#[derive(Debug)]
pub enum StartError {
    Provider(CollaboratorError),
    Session(SessionError),
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartError::Provider(e) => write!(f, "failed to fetch exam set: {e}"),
            StartError::Session(e) => write!(f, "failed to build session: {e}"),
        }
    }
}

impl std::error::Error for StartError {}

/// Fetches a randomized exam set and builds a fresh session from it.
pub async fn start_session(
    provider: &dyn QuestionSetProvider,
    candidate_id: i64,
    hall_ticket: String,
    section_count: usize,
    per_section: usize,
    duration: Duration,
    now: DateTime<Utc>,
) -> Result<ExamSession, StartError> {
    let questions = provider
        .fetch_exam_set(section_count * per_section)
        .await
        .map_err(StartError::Provider)?;

    ExamSession::new(
        candidate_id,
        hall_ticket,
        questions,
        section_count,
        per_section,
        duration,
        now,
    )
    .map_err(StartError::Session)
}

/// Submits a session to the result store.
///
/// The `begin_submit` check-and-transition runs under the session lock,
/// so exactly one of any concurrent callers reaches the collaborator.
/// The lock is released before the collaborator call; on failure the
/// session transitions back to `InProgress` for a manual retry.
pub async fn submit_session(
    session: &Arc<Mutex<ExamSession>>,
    submitter: &dyn ResultSubmitter,
    now: DateTime<Utc>,
) -> Result<ResultReference, SubmitError> {
    let snapshot = {
        let mut guard = session.lock().await;
        guard.begin_submit(now).map_err(|e| match e {
            SessionError::AlreadySubmitting => SubmitError::AlreadySubmitting,
            // begin_submit only fails with AlreadySubmitting.
            other => SubmitError::Collaborator(CollaboratorError::Rejected(other.to_string())),
        })?
    };

    match submitter
        .submit(
            snapshot.candidate_id,
            &snapshot.question_ids,
            &snapshot.answers,
            snapshot.elapsed_seconds,
        )
        .await
    {
        Ok(reference) => {
            session.lock().await.complete_submit();
            Ok(reference)
        }
        Err(err) => {
            session.lock().await.fail_submit();
            tracing::warn!(
                candidate_id = snapshot.candidate_id,
                "exam submission failed, session left resumable: {err}"
            );
            Err(SubmitError::Collaborator(err))
        }
    }
}
