//! Events pushed to the subscribers of a timed quiz session.
//!
//! A subscription sees countdown ticks while the attempt runs and exactly
//! one closing event when the countdown stops for good: time ran out, the
//! last question was answered, or the attempt was reset.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::quiz::{QuizPhase, QuizScore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    TimeExpired,
    Completed,
    Restarted,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuizEvent {
    Countdown(CountdownTick),
    Closed(SessionClosed),
}

#[derive(Debug, Clone, Serialize)]
pub struct CountdownTick {
    pub session_id: String,
    pub time_left_seconds: u32,
    pub time_limit_seconds: u32,
    pub question_index: usize,
    pub total_questions: usize,
    pub answered_count: usize,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionClosed {
    pub session_id: String,
    pub reason: CloseReason,
    pub phase: QuizPhase,
    /// Set when the attempt is finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<QuizScore>,
    pub at: DateTime<Utc>,
}

impl QuizEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            QuizEvent::Countdown(_) => "timer-tick",
            QuizEvent::Closed(closed) => match closed.reason {
                CloseReason::TimeExpired => "time-expired",
                CloseReason::Completed => "quiz-finished",
                CloseReason::Restarted => "quiz-reset",
            },
        }
    }

    pub fn is_closing(&self) -> bool {
        matches!(self, QuizEvent::Closed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn closed(reason: CloseReason, score: Option<QuizScore>) -> QuizEvent {
        QuizEvent::Closed(SessionClosed {
            session_id: "s1".to_string(),
            reason,
            phase: if score.is_some() {
                QuizPhase::Finished
            } else {
                QuizPhase::NotStarted
            },
            score,
            at: Utc::now(),
        })
    }

    #[test]
    fn closing_events_are_named_by_reason() {
        assert_eq!(closed(CloseReason::TimeExpired, None).name(), "time-expired");
        assert_eq!(closed(CloseReason::Completed, None).name(), "quiz-finished");
        assert_eq!(closed(CloseReason::Restarted, None).name(), "quiz-reset");
        assert!(closed(CloseReason::Restarted, None).is_closing());
    }

    #[test]
    fn finished_attempt_carries_its_score() {
        let score = QuizScore {
            score: 2,
            total: 3,
            percentage: 67,
        };
        let value = serde_json::to_value(closed(CloseReason::Completed, Some(score))).unwrap();
        assert_eq!(value["kind"], "closed");
        assert_eq!(value["reason"], "completed");
        assert_eq!(value["phase"], "finished");
        assert_eq!(value["score"], json!({"score": 2, "total": 3, "percentage": 67}));

        let reset = serde_json::to_value(closed(CloseReason::Restarted, None)).unwrap();
        assert!(reset.get("score").is_none());
    }
}
