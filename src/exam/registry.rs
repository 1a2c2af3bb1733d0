// src/exam/registry.rs
//
// Live-session registry: at most one in-progress exam per candidate.
// The entry owns the session's clock, so removing (or replacing) an
// entry tears the clock down with it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;

use crate::exam::clock::SessionClock;
use crate::exam::session::ExamSession;

struct SessionEntry {
    session: Arc<Mutex<ExamSession>>,
    clock: SessionClock,
}

#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<StdMutex<HashMap<i64, SessionEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a candidate's session. Any previous entry is dropped,
    /// which aborts its clock before the new one starts ticking.
    pub fn insert(
        &self,
        candidate_id: i64,
        session: Arc<Mutex<ExamSession>>,
        clock: SessionClock,
    ) {
        let mut map = self.lock();
        if let Some(old) = map.insert(candidate_id, SessionEntry { session, clock }) {
            old.clock.cancel();
        }
    }

    pub fn get(&self, candidate_id: i64) -> Option<Arc<Mutex<ExamSession>>> {
        self.lock().get(&candidate_id).map(|entry| entry.session.clone())
    }

    /// Removes a candidate's session, cancelling its clock.
    pub fn remove(&self, candidate_id: i64) -> Option<Arc<Mutex<ExamSession>>> {
        self.lock().remove(&candidate_id).map(|entry| {
            entry.clock.cancel();
            entry.session
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<i64, SessionEntry>> {
        // The map is only touched in short, non-panicking sections;
        // recover the guard rather than propagating poison.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    use super::*;
    use crate::exam::providers::{CollaboratorError, ResultReference, ResultSubmitter};
    use crate::exam::session::test_support::question_bank;
    use crate::exam::session::{QUESTIONS_PER_SECTION, SECTION_COUNT, SessionStatus};

    struct CountingSubmitter {
        calls: AtomicUsize,
    }

    impl CountingSubmitter {
        fn new() -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl ResultSubmitter for CountingSubmitter {
        async fn submit(
            &self,
            _candidate_id: i64,
            _question_ids: &[i64],
            _answers: &HashMap<i64, String>,
            _elapsed_seconds: i64,
        ) -> Result<ResultReference, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ResultReference { id: 1 })
        }
    }

    fn armed_session(
        duration_seconds: i64,
        submitter: &Arc<CountingSubmitter>,
    ) -> (Arc<Mutex<ExamSession>>, SessionClock) {
        let session = Arc::new(Mutex::new(
            ExamSession::new(
                7,
                "ht".to_string(),
                question_bank(45),
                SECTION_COUNT,
                QUESTIONS_PER_SECTION,
                Duration::seconds(duration_seconds),
                Utc::now(),
            )
            .unwrap(),
        ));
        let clock = SessionClock::spawn(session.clone(), submitter.clone());
        (session, clock)
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_a_session_cancels_the_old_clock() {
        let registry = SessionRegistry::new();
        let old_submitter = CountingSubmitter::new();
        let new_submitter = CountingSubmitter::new();

        // The old session is already past its deadline when registered;
        // left alone, its clock would force a submission.
        let (old_session, old_clock) = armed_session(0, &old_submitter);
        registry.insert(7, old_session.clone(), old_clock);

        // A restart replaces the entry before the old clock ticks.
        let (new_session, new_clock) = armed_session(90 * 60, &new_submitter);
        registry.insert(7, new_session.clone(), new_clock);

        tokio::time::sleep(std::time::Duration::from_secs(3)).await;

        // The old clock was aborted with its entry: no forced submission
        // ever reached its store.
        assert_eq!(old_submitter.calls.load(Ordering::SeqCst), 0);
        assert_eq!(old_session.lock().await.status(), SessionStatus::InProgress);

        // The replacement's deadline is far off, so its clock is idle
        // and the registry resolves to the new session.
        assert_eq!(new_submitter.calls.load(Ordering::SeqCst), 0);
        let resolved = registry.get(7).expect("replacement session registered");
        assert!(Arc::ptr_eq(&resolved, &new_session));
    }

    #[tokio::test(start_paused = true)]
    async fn removing_an_entry_tears_its_clock_down() {
        let registry = SessionRegistry::new();
        let submitter = CountingSubmitter::new();

        let (session, clock) = armed_session(0, &submitter);
        registry.insert(7, session.clone(), clock);
        registry.remove(7);

        tokio::time::sleep(std::time::Duration::from_secs(3)).await;

        assert_eq!(submitter.calls.load(Ordering::SeqCst), 0);
        assert!(registry.get(7).is_none());
    }
}
