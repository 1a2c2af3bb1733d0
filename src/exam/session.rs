// src/exam/session.rs
//
// The in-memory exam session aggregate: a partitioned question set, a
// cursor, an answer map and a deadline, guarded by a small status
// machine. All state transitions happen through methods on this type;
// the caller owns the session (behind a lock) and passes it explicitly,
// there is no ambient/global session.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};

use crate::models::question::Question;

/// Number of sections an exam is partitioned into.
pub const SECTION_COUNT: usize = 3;
/// Questions per section.
pub const QUESTIONS_PER_SECTION: usize = 15;
/// Exam length in minutes.
pub const EXAM_DURATION_MINUTES: i64 = 90;

/// Session lifecycle.
///
/// `InProgress -> Submitting -> Submitted`, or
/// `InProgress -> Expired -> Submitting -> Submitted`.
/// `Submitted` is terminal; a failed submission returns to `InProgress`
/// so the candidate can retry without losing answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    InProgress,
    Expired,
    Submitting,
    Submitted,
}

/// Pointer to the currently displayed question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Cursor {
    pub section: usize,
    pub question: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Fewer questions supplied than the exam needs. Fails closed.
    InsufficientQuestions { supplied: usize, required: usize },
    /// Navigation target outside the partition bounds. Never clamped.
    OutOfRange { section: usize, question: usize },
    /// Mutation attempted on a session that is no longer in progress.
    NotInProgress,
    /// Submission already started or finished.
    AlreadySubmitting,
    /// Cursor points outside the partitions. Unreachable if the
    /// navigation invariants hold; reported instead of panicking.
    CursorDesync,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::InsufficientQuestions { supplied, required } => {
                write!(f, "insufficient questions: got {supplied}, need {required}")
            }
            SessionError::OutOfRange { section, question } => {
                write!(f, "no question at section {section}, index {question}")
            }
            SessionError::NotInProgress => write!(f, "exam session is not in progress"),
            SessionError::AlreadySubmitting => {
                write!(f, "exam submission already in progress or completed")
            }
            SessionError::CursorDesync => write!(f, "session cursor is out of sync"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Everything the submission collaborator needs, captured atomically at
/// the moment the session transitions to `Submitting`.
#[derive(Debug, Clone)]
pub struct SubmissionSnapshot {
    pub candidate_id: i64,
    pub question_ids: Vec<i64>,
    pub answers: HashMap<i64, String>,
    pub elapsed_seconds: i64,
}

#[derive(Debug)]
pub struct ExamSession {
    candidate_id: i64,
    hall_ticket: String,
    sections: Vec<Vec<Question>>,
    per_section: usize,
    cursor: Cursor,
    answers: HashMap<i64, String>,
    started_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
    status: SessionStatus,
}

impl ExamSession {
    /// Builds a session from an ordered question sequence.
    ///
    /// The first `section_count * per_section` questions are split into
    /// contiguous, order-preserving slices: section i holds elements
    /// [i * per_section, (i + 1) * per_section).
    pub fn new(
        candidate_id: i64,
        hall_ticket: String,
        questions: Vec<Question>,
        section_count: usize,
        per_section: usize,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        let required = section_count * per_section;
        if questions.len() < required {
            return Err(SessionError::InsufficientQuestions {
                supplied: questions.len(),
                required,
            });
        }

        let mut iter = questions.into_iter();
        let mut sections = Vec::with_capacity(section_count);
        for _ in 0..section_count {
            sections.push(iter.by_ref().take(per_section).collect::<Vec<_>>());
        }

        Ok(Self {
            candidate_id,
            hall_ticket,
            sections,
            per_section,
            cursor: Cursor { section: 0, question: 0 },
            answers: HashMap::new(),
            started_at: now,
            deadline: now + duration,
            status: SessionStatus::InProgress,
        })
    }

    pub fn candidate_id(&self) -> i64 {
        self.candidate_id
    }

    pub fn hall_ticket(&self) -> &str {
        &self.hall_ticket
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn sections(&self) -> &[Vec<Question>] {
        &self.sections
    }

    pub fn answers(&self) -> &HashMap<i64, String> {
        &self.answers
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    /// All question ids in exam order (section 0 first).
    pub fn question_ids(&self) -> Vec<i64> {
        self.sections.iter().flatten().map(|q| q.id).collect()
    }

    /// Ids of questions that currently have an answer recorded.
    pub fn answered_ids(&self) -> Vec<i64> {
        self.sections
            .iter()
            .flatten()
            .filter(|q| self.answers.contains_key(&q.id))
            .map(|q| q.id)
            .collect()
    }

    pub fn current_question(&self) -> Result<&Question, SessionError> {
        self.sections
            .get(self.cursor.section)
            .and_then(|s| s.get(self.cursor.question))
            .ok_or(SessionError::CursorDesync)
    }

    /// Seconds left until the deadline, clamped at zero. Read-only.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.deadline - now).num_seconds().max(0)
    }

    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.started_at).num_seconds().max(0)
    }

    /// Records (or overwrites) the answer for the question under the
    /// cursor. Last write wins; answers are never removed.
    pub fn record_answer(&mut self, option_value: String) -> Result<(), SessionError> {
        if self.status != SessionStatus::InProgress {
            return Err(SessionError::NotInProgress);
        }
        let question_id = self.current_question()?.id;
        self.answers.insert(question_id, option_value);
        Ok(())
    }

    /// Moves to the next question within the current section, then to
    /// the first question of the next section. At the last question of
    /// the last section the cursor stays put (no wraparound).
    pub fn advance(&mut self) -> Result<(), SessionError> {
        if self.status != SessionStatus::InProgress {
            return Err(SessionError::NotInProgress);
        }
        if self.cursor.question + 1 < self.per_section {
            self.cursor.question += 1;
        } else if self.cursor.section + 1 < self.sections.len() {
            self.cursor.section += 1;
            self.cursor.question = 0;
        }
        Ok(())
    }

    /// Jumps the cursor to an arbitrary question. Rejects out-of-range
    /// targets rather than clamping them. Does not touch answers.
    pub fn jump_to(&mut self, section: usize, question: usize) -> Result<(), SessionError> {
        if self.status != SessionStatus::InProgress {
            return Err(SessionError::NotInProgress);
        }
        if section >= self.sections.len() || question >= self.per_section {
            return Err(SessionError::OutOfRange { section, question });
        }
        self.cursor = Cursor { section, question };
        Ok(())
    }

    /// Deadline reached: `InProgress -> Expired`. Idempotent; calling
    /// on any other status is a no-op. Returns whether the transition
    /// happened, so the clock fires the forced submission exactly once.
    pub fn expire(&mut self) -> bool {
        if self.status == SessionStatus::InProgress {
            self.status = SessionStatus::Expired;
            true
        } else {
            false
        }
    }

    /// The atomic check-and-transition into `Submitting`.
    ///
    /// Callers must hold exclusive access (the session lock) across this
    /// call; the status check and the transition are a single step, so
    /// the user-submit and clock-expiry paths cannot both win.
    pub fn begin_submit(&mut self, now: DateTime<Utc>) -> Result<SubmissionSnapshot, SessionError> {
        match self.status {
            SessionStatus::Submitting | SessionStatus::Submitted => {
                Err(SessionError::AlreadySubmitting)
            }
            SessionStatus::InProgress | SessionStatus::Expired => {
                self.status = SessionStatus::Submitting;
                Ok(SubmissionSnapshot {
                    candidate_id: self.candidate_id,
                    question_ids: self.question_ids(),
                    answers: self.answers.clone(),
                    elapsed_seconds: self.elapsed_seconds(now),
                })
            }
        }
    }

    /// Collaborator accepted the submission: `Submitting -> Submitted`.
    pub fn complete_submit(&mut self) {
        if self.status == SessionStatus::Submitting {
            self.status = SessionStatus::Submitted;
        }
    }

    /// Collaborator failed: the session returns to `InProgress` with the
    /// answer map untouched, so the submission can be retried manually.
    pub fn fail_submit(&mut self) {
        if self.status == SessionStatus::Submitting {
            self.status = SessionStatus::InProgress;
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use sqlx::types::Json;

    use crate::models::question::Question;

    /// `n` questions with ids 1..=n; the correct answer for question i
    /// is its first option, "q{i}-a".
    pub fn question_bank(n: i64) -> Vec<Question> {
        (1..=n)
            .map(|id| Question {
                id,
                prompt: format!("Question {id}?"),
                options: Json(vec![
                    format!("q{id}-a"),
                    format!("q{id}-b"),
                    format!("q{id}-c"),
                    format!("q{id}-d"),
                ]),
                answer: format!("q{id}-a"),
                category: "General".to_string(),
                difficulty: "Medium".to_string(),
                created_at: None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::question_bank;
    use super::*;

    fn session() -> ExamSession {
        ExamSession::new(
            7,
            "2025J291234".to_string(),
            question_bank(45),
            SECTION_COUNT,
            QUESTIONS_PER_SECTION,
            Duration::minutes(EXAM_DURATION_MINUTES),
            Utc::now(),
        )
        .expect("45 questions should build a session")
    }

    #[test]
    fn partitions_are_contiguous_and_order_preserving() {
        let s = session();

        assert_eq!(s.sections().len(), 3);
        for section in s.sections() {
            assert_eq!(section.len(), 15);
        }

        // Section i holds ids [i*15+1, (i+1)*15] in original order,
        // covering all 45 exactly once.
        let ids = s.question_ids();
        assert_eq!(ids, (1..=45).collect::<Vec<i64>>());
    }

    #[test]
    fn too_few_questions_fails_closed() {
        let err = ExamSession::new(
            7,
            "ht".to_string(),
            question_bank(44),
            SECTION_COUNT,
            QUESTIONS_PER_SECTION,
            Duration::minutes(90),
            Utc::now(),
        )
        .unwrap_err();

        assert_eq!(
            err,
            SessionError::InsufficientQuestions { supplied: 44, required: 45 }
        );
    }

    #[test]
    fn advance_walks_sections_without_wraparound() {
        let mut s = session();

        // Walk to the end of section 0.
        for _ in 0..14 {
            s.advance().unwrap();
        }
        assert_eq!(s.cursor(), Cursor { section: 0, question: 14 });

        // Crossing a section boundary resets the question index.
        s.advance().unwrap();
        assert_eq!(s.cursor(), Cursor { section: 1, question: 0 });

        // At the very last question the cursor stays put.
        s.jump_to(2, 14).unwrap();
        s.advance().unwrap();
        assert_eq!(s.cursor(), Cursor { section: 2, question: 14 });
    }

    #[test]
    fn jump_rejects_out_of_range_without_clamping() {
        let mut s = session();

        assert_eq!(
            s.jump_to(3, 0).unwrap_err(),
            SessionError::OutOfRange { section: 3, question: 0 }
        );
        assert_eq!(
            s.jump_to(0, 15).unwrap_err(),
            SessionError::OutOfRange { section: 0, question: 15 }
        );
        // Failed jump leaves the cursor where it was.
        assert_eq!(s.cursor(), Cursor { section: 0, question: 0 });
    }

    #[test]
    fn record_answer_overwrites_last_write_wins() {
        let mut s = session();

        s.record_answer("q1-b".to_string()).unwrap();
        s.record_answer("q1-c".to_string()).unwrap();

        assert_eq!(s.answers().get(&1).map(String::as_str), Some("q1-c"));
        assert_eq!(s.answers().len(), 1);
    }

    #[test]
    fn skipping_never_removes_an_answer() {
        let mut s = session();

        s.record_answer("q1-a".to_string()).unwrap();
        s.advance().unwrap(); // skip question 2
        s.jump_to(0, 0).unwrap();

        assert_eq!(s.answers().len(), 1);
        assert!(s.answers().contains_key(&1));
    }

    #[test]
    fn remaining_time_clamps_at_zero() {
        let now = Utc::now();
        let s = ExamSession::new(
            7,
            "ht".to_string(),
            question_bank(45),
            SECTION_COUNT,
            QUESTIONS_PER_SECTION,
            Duration::seconds(60),
            now,
        )
        .unwrap();

        assert_eq!(s.remaining_seconds(now), 60);
        assert_eq!(s.remaining_seconds(now + Duration::seconds(61)), 0);
        assert_eq!(s.remaining_seconds(now + Duration::hours(5)), 0);
    }

    #[test]
    fn expire_is_idempotent_and_only_fires_in_progress() {
        let mut s = session();

        assert!(s.expire());
        assert_eq!(s.status(), SessionStatus::Expired);
        assert!(!s.expire());

        let mut submitted = session();
        submitted.begin_submit(Utc::now()).unwrap();
        submitted.complete_submit();
        assert!(!submitted.expire());
        assert_eq!(submitted.status(), SessionStatus::Submitted);
    }

    #[test]
    fn double_begin_submit_is_rejected() {
        let mut s = session();

        s.begin_submit(Utc::now()).unwrap();
        assert_eq!(
            s.begin_submit(Utc::now()).unwrap_err(),
            SessionError::AlreadySubmitting
        );

        s.complete_submit();
        assert_eq!(
            s.begin_submit(Utc::now()).unwrap_err(),
            SessionError::AlreadySubmitting
        );
        assert_eq!(s.status(), SessionStatus::Submitted);
    }

    #[test]
    fn expired_session_submits_with_answers_intact() {
        let mut s = session();
        s.record_answer("q1-a".to_string()).unwrap();
        s.advance().unwrap();
        s.record_answer("wrong".to_string()).unwrap();

        s.expire();
        let snapshot = s.begin_submit(Utc::now()).unwrap();

        assert_eq!(snapshot.answers.len(), 2);
        assert_eq!(snapshot.answers.get(&1).map(String::as_str), Some("q1-a"));
        assert_eq!(snapshot.question_ids.len(), 45);
    }

    #[test]
    fn failed_submit_returns_to_in_progress_with_answers() {
        let mut s = session();
        s.record_answer("q1-a".to_string()).unwrap();

        s.begin_submit(Utc::now()).unwrap();
        s.fail_submit();

        assert_eq!(s.status(), SessionStatus::InProgress);
        assert_eq!(s.answers().len(), 1);

        // Retry works.
        let snapshot = s.begin_submit(Utc::now()).unwrap();
        assert_eq!(snapshot.answers.len(), 1);
    }

    #[test]
    fn mutations_rejected_once_submission_starts() {
        let mut s = session();
        s.begin_submit(Utc::now()).unwrap();

        assert_eq!(
            s.record_answer("x".to_string()).unwrap_err(),
            SessionError::NotInProgress
        );
        assert_eq!(s.advance().unwrap_err(), SessionError::NotInProgress);
        assert_eq!(s.jump_to(0, 1).unwrap_err(), SessionError::NotInProgress);
    }
}
