//! In-memory registry of running quiz attempts.
//!
//! Each session is owned by the registry and mutated only under its lock.
//! A timed session in progress has exactly one countdown task; the task
//! holds a weak reference to the registry and is aborted when the attempt
//! finishes, restarts or is removed. Subscribers get one closing event when
//! the countdown stops, so their streams end with it.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::quiz_engine::{Advance, QuizError, QuizSession, Tick};
use super::ServiceError;
use crate::config::Config;
use crate::metrics::{record_quiz_event, QUIZ_ANSWERS_TOTAL, QUIZ_SESSIONS_ACTIVE};
use crate::models::quiz::QuestionView;
use crate::models::quiz_event::{CloseReason, CountdownTick, QuizEvent, SessionClosed};
use crate::models::{QuizPhase, QuizQuestion, QuizResultView, QuizSessionView};

const EVENT_CHANNEL_CAPACITY: usize = 32;
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct SessionEntry {
    post_id: String,
    owner_id: Option<String>,
    session: QuizSession,
    timer: Option<JoinHandle<()>>,
    events: broadcast::Sender<QuizEvent>,
    last_activity: DateTime<Utc>,
}

impl SessionEntry {
    fn stop_timer(&mut self) {
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
    }

    fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    fn answered_count(&self) -> usize {
        self.session
            .state()
            .answers
            .values()
            .filter(|a| a.is_some())
            .count()
    }

    /// Tells subscribers that no more ticks follow.
    fn close_streams(&self, id: Uuid, reason: CloseReason) {
        let phase = self.session.phase();
        let score = (phase == QuizPhase::Finished).then(|| self.session.score());
        // No receivers is fine
        let _ = self.events.send(QuizEvent::Closed(SessionClosed {
            session_id: id.to_string(),
            reason,
            phase,
            score,
            at: Utc::now(),
        }));
    }
}

pub struct QuizSessionRegistry {
    sessions: Mutex<HashMap<Uuid, SessionEntry>>,
    tick_interval: Duration,
    idle_ttl: chrono::Duration,
}

fn parse_id(session_id: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(session_id).map_err(|_| ServiceError::NotFound("Quiz session"))
}

fn check_owner(entry: &SessionEntry, requester: Option<&str>) -> Result<(), ServiceError> {
    match &entry.owner_id {
        Some(owner) if requester != Some(owner.as_str()) => Err(ServiceError::Forbidden(
            "This quiz session belongs to another user".to_string(),
        )),
        _ => Ok(()),
    }
}

fn view(id: Uuid, entry: &SessionEntry) -> QuizSessionView {
    let session = &entry.session;
    let state = session.state();
    let selected_option = session.current_selection();

    QuizSessionView {
        session_id: id.to_string(),
        post_id: entry.post_id.clone(),
        phase: state.phase,
        total_questions: session.total_questions(),
        current_question_index: state.current_question_index,
        current_question: session.current_question().map(QuestionView::from),
        selected_option,
        answered_count: entry.answered_count(),
        can_advance: state.phase == QuizPhase::InProgress && selected_option.is_some(),
        started_at: state.started_at,
        time_limit_seconds: session.time_limit_seconds(),
        time_left_seconds: state.time_left_seconds,
    }
}

fn record_finished(session: &QuizSession) {
    record_quiz_event("finished");
    let score = session.score();
    QUIZ_ANSWERS_TOTAL
        .with_label_values(&["true"])
        .inc_by(score.score as u64);
    QUIZ_ANSWERS_TOTAL
        .with_label_values(&["false"])
        .inc_by((score.total - score.score) as u64);
}

impl QuizSessionRegistry {
    pub fn new(tick_interval: Duration, idle_ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            tick_interval,
            idle_ttl: chrono::Duration::from_std(idle_ttl)
                .unwrap_or_else(|_| chrono::Duration::hours(1)),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Duration::from_millis(config.quiz_tick_interval_ms.max(1)),
            Duration::from_secs(config.quiz_session_idle_seconds),
        )
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Registers a new attempt over `questions`. Fails fast on malformed
    /// question data.
    pub async fn create(
        &self,
        post_id: &str,
        owner_id: Option<&str>,
        questions: Vec<QuizQuestion>,
        time_limit_minutes: Option<u32>,
    ) -> Result<QuizSessionView, ServiceError> {
        let session = QuizSession::new(questions, time_limit_minutes)?;
        let id = Uuid::new_v4();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let entry = SessionEntry {
            post_id: post_id.to_string(),
            owner_id: owner_id.map(str::to_string),
            session,
            timer: None,
            events,
            last_activity: Utc::now(),
        };
        let snapshot = view(id, &entry);

        self.sessions.lock().await.insert(id, entry);
        QUIZ_SESSIONS_ACTIVE.inc();
        record_quiz_event("created");

        tracing::info!(
            "Quiz session {} created for post {} ({} questions)",
            id,
            post_id,
            snapshot.total_questions
        );
        Ok(snapshot)
    }

    pub async fn get(
        &self,
        session_id: &str,
        requester: Option<&str>,
    ) -> Result<QuizSessionView, ServiceError> {
        let id = parse_id(session_id)?;
        let sessions = self.sessions.lock().await;
        let entry = sessions
            .get(&id)
            .ok_or(ServiceError::NotFound("Quiz session"))?;
        check_owner(entry, requester)?;
        Ok(view(id, entry))
    }

    pub async fn start(
        self: &Arc<Self>,
        session_id: &str,
        requester: Option<&str>,
    ) -> Result<QuizSessionView, ServiceError> {
        let id = parse_id(session_id)?;
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .get_mut(&id)
            .ok_or(ServiceError::NotFound("Quiz session"))?;
        check_owner(entry, requester)?;

        entry.session.start(Utc::now())?;
        entry.touch();
        record_quiz_event("started");

        if entry.session.is_timed() {
            entry.stop_timer();
            entry.timer = Some(self.spawn_timer(id));
        }

        Ok(view(id, entry))
    }

    pub async fn select_answer(
        &self,
        session_id: &str,
        requester: Option<&str>,
        question_id: &str,
        option_index: usize,
    ) -> Result<QuizSessionView, ServiceError> {
        let id = parse_id(session_id)?;
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .get_mut(&id)
            .ok_or(ServiceError::NotFound("Quiz session"))?;
        check_owner(entry, requester)?;

        entry.session.select_answer(question_id, option_index)?;
        entry.touch();
        Ok(view(id, entry))
    }

    pub async fn advance(
        &self,
        session_id: &str,
        requester: Option<&str>,
    ) -> Result<QuizSessionView, ServiceError> {
        let id = parse_id(session_id)?;
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .get_mut(&id)
            .ok_or(ServiceError::NotFound("Quiz session"))?;
        check_owner(entry, requester)?;

        let step = entry.session.advance()?;
        entry.touch();
        if step == Advance::Finished {
            entry.stop_timer();
            record_finished(&entry.session);
            if entry.session.is_timed() {
                entry.close_streams(id, CloseReason::Completed);
            }
            tracing::info!("Quiz session {} finished", id);
        }

        Ok(view(id, entry))
    }

    pub async fn restart(
        &self,
        session_id: &str,
        requester: Option<&str>,
    ) -> Result<QuizSessionView, ServiceError> {
        let id = parse_id(session_id)?;
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .get_mut(&id)
            .ok_or(ServiceError::NotFound("Quiz session"))?;
        check_owner(entry, requester)?;

        entry.stop_timer();
        entry.session.restart();
        entry.touch();
        record_quiz_event("restarted");
        if entry.session.is_timed() {
            entry.close_streams(id, CloseReason::Restarted);
        }

        Ok(view(id, entry))
    }

    /// Score and per-option review of a finished attempt.
    pub async fn result(
        &self,
        session_id: &str,
        requester: Option<&str>,
    ) -> Result<QuizResultView, ServiceError> {
        let id = parse_id(session_id)?;
        let sessions = self.sessions.lock().await;
        let entry = sessions
            .get(&id)
            .ok_or(ServiceError::NotFound("Quiz session"))?;
        check_owner(entry, requester)?;

        let review = entry.session.review()?;
        Ok(QuizResultView {
            session_id: id.to_string(),
            post_id: entry.post_id.clone(),
            score: entry.session.score(),
            review,
        })
    }

    pub async fn remove(&self, session_id: &str, requester: Option<&str>) -> Result<(), ServiceError> {
        let id = parse_id(session_id)?;
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .get(&id)
            .ok_or(ServiceError::NotFound("Quiz session"))?;
        check_owner(entry, requester)?;

        if let Some(mut entry) = sessions.remove(&id) {
            entry.stop_timer();
            QUIZ_SESSIONS_ACTIVE.dec();
            tracing::info!("Quiz session {} removed", id);
        }
        Ok(())
    }

    /// Receiver for the countdown events of a timed session that has not
    /// finished yet.
    pub async fn subscribe(
        &self,
        session_id: &str,
        requester: Option<&str>,
    ) -> Result<broadcast::Receiver<QuizEvent>, ServiceError> {
        let id = parse_id(session_id)?;
        let sessions = self.sessions.lock().await;
        let entry = sessions
            .get(&id)
            .ok_or(ServiceError::NotFound("Quiz session"))?;
        check_owner(entry, requester)?;

        if !entry.session.is_timed() {
            return Err(ServiceError::BadRequest("This quiz has no time limit".to_string()));
        }
        if entry.session.phase() == QuizPhase::Finished {
            return Err(QuizError::InvalidTransition {
                action: "follow the countdown",
                phase: QuizPhase::Finished,
            }
            .into());
        }
        Ok(entry.events.subscribe())
    }

    /// Drops sessions idle for longer than the configured TTL. Sessions with
    /// a running countdown are kept. Returns the number of evicted sessions.
    pub async fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.lock().await;
        let expired: Vec<Uuid> = sessions
            .iter()
            .filter(|(_, e)| e.timer.is_none() && now - e.last_activity > self.idle_ttl)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            if let Some(mut entry) = sessions.remove(id) {
                entry.stop_timer();
                QUIZ_SESSIONS_ACTIVE.dec();
                record_quiz_event("evicted");
            }
        }

        if !expired.is_empty() {
            tracing::info!("Evicted {} idle quiz sessions", expired.len());
        }
        expired.len()
    }

    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let registry = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.evict_idle(Utc::now()).await;
            }
        })
    }

    fn spawn_timer(self: &Arc<Self>, id: Uuid) -> JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        let tick_interval = self.tick_interval;

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(tick_interval).await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                if !registry.tick_once(id).await {
                    break;
                }
            }
        })
    }

    /// One countdown step. Returns false once the countdown is over.
    async fn tick_once(&self, id: Uuid) -> bool {
        let mut sessions = self.sessions.lock().await;
        let Some(entry) = sessions.get_mut(&id) else {
            return false;
        };

        match entry.session.tick() {
            Tick::Running { remaining_seconds } => {
                let _ = entry.events.send(QuizEvent::Countdown(CountdownTick {
                    session_id: id.to_string(),
                    time_left_seconds: remaining_seconds,
                    time_limit_seconds: entry
                        .session
                        .time_limit_seconds()
                        .unwrap_or(remaining_seconds),
                    question_index: entry.session.state().current_question_index,
                    total_questions: entry.session.total_questions(),
                    answered_count: entry.answered_count(),
                    at: Utc::now(),
                }));
                true
            }
            Tick::Expired => {
                // The task is finishing on its own; dropping the handle is enough
                entry.timer = None;
                record_finished(&entry.session);
                entry.close_streams(id, CloseReason::TimeExpired);
                tracing::info!("Quiz session {} ran out of time", id);
                false
            }
            Tick::Idle => {
                entry.timer = None;
                false
            }
        }
    }
}
