// src/exam/clock.rs
//
// Countdown driving forced submission. One clock per live session,
// owned by the session's registry entry; dropping the entry aborts the
// task, so no tick can fire after the session is gone.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::exam::providers::ResultSubmitter;
use crate::exam::service::{self, SubmitError};
use crate::exam::session::{ExamSession, SessionStatus};

pub struct SessionClock {
    handle: JoinHandle<()>,
}

impl SessionClock {
    /// Spawns a 1-second tick loop. When the deadline is reached while
    /// the session is in progress, it transitions the session to
    /// `Expired` and attempts one forced submission with whatever
    /// answers are present, then stops. The loop also stops on its own
    /// the moment it observes a submission started elsewhere.
    pub fn spawn(
        session: Arc<Mutex<ExamSession>>,
        submitter: Arc<dyn ResultSubmitter>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let fire = {
                    let mut guard = session.lock().await;
                    match guard.status() {
                        SessionStatus::InProgress => {
                            guard.remaining_seconds(Utc::now()) == 0 && guard.expire()
                        }
                        // A submission started (or finished) elsewhere;
                        // this clock has nothing left to do.
                        SessionStatus::Submitting | SessionStatus::Submitted => return,
                        // Expired without a pending submission only
                        // happens if a forced attempt was interrupted;
                        // fall through and submit.
                        SessionStatus::Expired => true,
                    }
                };

                if !fire {
                    continue;
                }

                let candidate_id = { session.lock().await.candidate_id() };
                tracing::info!(candidate_id, "exam deadline reached, forcing submission");

                match service::submit_session(&session, submitter.as_ref(), Utc::now()).await {
                    Ok(reference) => {
                        tracing::info!(
                            candidate_id,
                            result_id = reference.id,
                            "forced submission persisted"
                        );
                    }
                    Err(SubmitError::AlreadySubmitting) => {
                        // Lost the race to a candidate-initiated submit.
                    }
                    Err(SubmitError::Collaborator(err)) => {
                        tracing::error!(
                            candidate_id,
                            "forced submission failed, session left resumable: {err}"
                        );
                    }
                }
                return;
            }
        });

        Self { handle }
    }

    /// Stops the clock. No further ticks are delivered.
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for SessionClock {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Duration;

    use super::*;
    use crate::exam::providers::{CollaboratorError, ResultReference};
    use crate::exam::session::test_support::question_bank;
    use crate::exam::session::{EXAM_DURATION_MINUTES, QUESTIONS_PER_SECTION, SECTION_COUNT};

    struct CountingSubmitter {
        calls: AtomicUsize,
        answers_seen: std::sync::Mutex<Option<HashMap<i64, String>>>,
    }

    impl CountingSubmitter {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                answers_seen: std::sync::Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl ResultSubmitter for CountingSubmitter {
        async fn submit(
            &self,
            _candidate_id: i64,
            _question_ids: &[i64],
            answers: &HashMap<i64, String>,
            _elapsed_seconds: i64,
        ) -> Result<ResultReference, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.answers_seen.lock().unwrap() = Some(answers.clone());
            Ok(ResultReference { id: 1 })
        }
    }

    fn session_with_duration(seconds: i64) -> Arc<Mutex<ExamSession>> {
        let session = ExamSession::new(
            7,
            "ht".to_string(),
            question_bank(45),
            SECTION_COUNT,
            QUESTIONS_PER_SECTION,
            Duration::seconds(seconds),
            Utc::now(),
        )
        .unwrap();
        Arc::new(Mutex::new(session))
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_forces_exactly_one_submission_with_answers_intact() {
        let session = session_with_duration(0);
        {
            let mut guard = session.lock().await;
            guard.record_answer("q1-a".to_string()).unwrap();
            guard.advance().unwrap();
            guard.record_answer("wrong".to_string()).unwrap();
        }
        let submitter = CountingSubmitter::new();

        let _clock = SessionClock::spawn(session.clone(), submitter.clone());
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;

        assert_eq!(submitter.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.lock().await.status(), SessionStatus::Submitted);

        // Exactly the answers present at expiry, none dropped, none added.
        let seen = submitter.answers_seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen.get(&1).map(String::as_str), Some("q1-a"));
        assert_eq!(seen.get(&2).map(String::as_str), Some("wrong"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_clock_never_fires() {
        let session = session_with_duration(0);
        let submitter = CountingSubmitter::new();

        let clock = SessionClock::spawn(session.clone(), submitter.clone());
        clock.cancel();
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;

        assert_eq!(submitter.calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.lock().await.status(), SessionStatus::InProgress);
    }

    #[tokio::test(start_paused = true)]
    async fn clock_stands_down_after_candidate_submission() {
        let session = session_with_duration(0);
        let submitter = CountingSubmitter::new();

        // Candidate submits first.
        service::submit_session(&session, submitter.as_ref(), Utc::now())
            .await
            .unwrap();
        assert_eq!(submitter.calls.load(Ordering::SeqCst), 1);

        // A clock firing afterwards must not submit again.
        let _clock = SessionClock::spawn(session.clone(), submitter.clone());
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;

        assert_eq!(submitter.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.lock().await.status(), SessionStatus::Submitted);
    }

    #[tokio::test(start_paused = true)]
    async fn clock_waits_out_a_live_deadline() {
        let session = session_with_duration(EXAM_DURATION_MINUTES * 60);
        let submitter = CountingSubmitter::new();

        let _clock = SessionClock::spawn(session.clone(), submitter.clone());
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;

        // Wall-clock deadline is 90 minutes away; nothing fires.
        assert_eq!(submitter.calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.lock().await.status(), SessionStatus::InProgress);
    }
}
