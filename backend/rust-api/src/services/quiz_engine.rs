use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

use crate::models::quiz::{
    validate_questions, OptionReview, OptionVerdict, QuestionReview, QuizPhase, QuizQuestion,
    QuizScore, QuizState, QuizValidationError,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuizError {
    #[error("This quiz has no questions")]
    EmptyQuiz,
    #[error("Cannot {action} while the quiz is {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: QuizPhase,
    },
    #[error("Unknown question: {0}")]
    UnknownQuestion(String),
    #[error("Question {0} is not the current question")]
    NotCurrentQuestion(String),
    #[error("Option {option_index} does not exist for question {question_id}")]
    OptionOutOfRange {
        question_id: String,
        option_index: usize,
    },
    #[error("The current question has no answer yet")]
    NoAnswer,
    #[error(transparent)]
    Invalid(#[from] QuizValidationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    NextQuestion(usize),
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Not running or not timed; the caller should stop ticking
    Idle,
    Running { remaining_seconds: u32 },
    Expired,
}

/// State machine for one quiz attempt over a fixed, ordered question list.
///
/// `NotStarted -> InProgress -> Finished`, with `restart` resetting to
/// `NotStarted` from anywhere. A single owner drives every transition.
#[derive(Debug, Clone)]
pub struct QuizSession {
    questions: Vec<QuizQuestion>,
    time_limit_seconds: Option<u32>,
    state: QuizState,
}

impl QuizSession {
    /// Fails fast on malformed questions. An empty list is accepted so the
    /// caller can show an empty state, but such a session never starts.
    pub fn new(
        questions: Vec<QuizQuestion>,
        time_limit_minutes: Option<u32>,
    ) -> Result<Self, QuizError> {
        validate_questions(&questions)?;

        Ok(Self {
            questions,
            time_limit_seconds: time_limit_minutes
                .filter(|m| *m > 0)
                .map(|m| m.saturating_mul(60)),
            state: QuizState::not_started(),
        })
    }

    pub fn state(&self) -> &QuizState {
        &self.state
    }

    pub fn phase(&self) -> QuizPhase {
        self.state.phase
    }

    pub fn questions(&self) -> &[QuizQuestion] {
        &self.questions
    }

    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    pub fn is_timed(&self) -> bool {
        self.time_limit_seconds.is_some()
    }

    /// Configured limit, known before the attempt starts
    pub fn time_limit_seconds(&self) -> Option<u32> {
        self.time_limit_seconds
    }

    pub fn current_question(&self) -> Option<&QuizQuestion> {
        match self.state.phase {
            QuizPhase::InProgress => self.questions.get(self.state.current_question_index),
            QuizPhase::NotStarted | QuizPhase::Finished => None,
        }
    }

    /// Option recorded for the current question, if any
    pub fn current_selection(&self) -> Option<usize> {
        self.current_question()
            .and_then(|q| self.state.answers.get(&q.id).copied().flatten())
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), QuizError> {
        if self.state.phase != QuizPhase::NotStarted {
            return Err(QuizError::InvalidTransition {
                action: "start",
                phase: self.state.phase,
            });
        }
        if self.questions.is_empty() {
            return Err(QuizError::EmptyQuiz);
        }

        self.state = QuizState {
            current_question_index: 0,
            answers: HashMap::new(),
            phase: QuizPhase::InProgress,
            started_at: Some(now),
            time_limit_seconds: self.time_limit_seconds,
            time_left_seconds: self.time_limit_seconds,
        };
        Ok(())
    }

    /// Records (or overwrites) the choice for the current question.
    pub fn select_answer(&mut self, question_id: &str, option_index: usize) -> Result<(), QuizError> {
        if self.state.phase != QuizPhase::InProgress {
            return Err(QuizError::InvalidTransition {
                action: "select an answer",
                phase: self.state.phase,
            });
        }

        let (position, question) = self
            .questions
            .iter()
            .enumerate()
            .find(|(_, q)| q.id == question_id)
            .ok_or_else(|| QuizError::UnknownQuestion(question_id.to_string()))?;

        if position != self.state.current_question_index {
            return Err(QuizError::NotCurrentQuestion(question_id.to_string()));
        }
        if option_index >= question.options.len() {
            return Err(QuizError::OptionOutOfRange {
                question_id: question_id.to_string(),
                option_index,
            });
        }

        self.state
            .answers
            .insert(question.id.clone(), Some(option_index));
        Ok(())
    }

    pub fn advance(&mut self) -> Result<Advance, QuizError> {
        if self.state.phase != QuizPhase::InProgress {
            return Err(QuizError::InvalidTransition {
                action: "advance",
                phase: self.state.phase,
            });
        }
        if self.current_selection().is_none() {
            return Err(QuizError::NoAnswer);
        }

        let last = self.questions.len() - 1;
        if self.state.current_question_index < last {
            self.state.current_question_index += 1;
            Ok(Advance::NextQuestion(self.state.current_question_index))
        } else {
            self.state.phase = QuizPhase::Finished;
            Ok(Advance::Finished)
        }
    }

    pub fn restart(&mut self) {
        self.state = QuizState::not_started();
    }

    /// One second of countdown. At zero every unanswered question is
    /// recorded as "no answer" and the attempt finishes.
    pub fn tick(&mut self) -> Tick {
        if self.state.phase != QuizPhase::InProgress {
            return Tick::Idle;
        }
        let Some(left) = self.state.time_left_seconds else {
            return Tick::Idle;
        };

        let remaining = left.saturating_sub(1);
        self.state.time_left_seconds = Some(remaining);

        if remaining == 0 {
            self.expire();
            Tick::Expired
        } else {
            Tick::Running {
                remaining_seconds: remaining,
            }
        }
    }

    fn expire(&mut self) {
        for question in &self.questions {
            self.state.answers.entry(question.id.clone()).or_insert(None);
        }
        self.state.time_left_seconds = Some(0);
        self.state.phase = QuizPhase::Finished;
    }

    pub fn score(&self) -> QuizScore {
        calculate_score(&self.questions, &self.state.answers)
    }

    /// Per-option classification, available once the attempt is finished.
    pub fn review(&self) -> Result<Vec<QuestionReview>, QuizError> {
        if self.state.phase != QuizPhase::Finished {
            return Err(QuizError::InvalidTransition {
                action: "review",
                phase: self.state.phase,
            });
        }

        Ok(self
            .questions
            .iter()
            .map(|q| review_question(q, self.state.answers.get(&q.id).copied().flatten()))
            .collect())
    }
}

pub fn calculate_score(
    questions: &[QuizQuestion],
    answers: &HashMap<String, Option<usize>>,
) -> QuizScore {
    let total = questions.len();
    let score = questions
        .iter()
        .filter(|q| answers.get(&q.id).copied().flatten() == Some(q.correct_answer))
        .count();

    // round(100 * score / total), halves rounded up
    let percentage = if total == 0 {
        0
    } else {
        ((200 * score + total) / (2 * total)) as u32
    };

    QuizScore {
        score,
        total,
        percentage,
    }
}

fn review_question(question: &QuizQuestion, chosen: Option<usize>) -> QuestionReview {
    let options = question
        .options
        .iter()
        .enumerate()
        .map(|(index, text)| {
            let is_correct = index == question.correct_answer;
            let is_chosen = chosen == Some(index);
            let verdict = match (is_correct, is_chosen) {
                (true, true) => OptionVerdict::CorrectAndChosen,
                (true, false) => OptionVerdict::CorrectNotChosen,
                (false, true) => OptionVerdict::IncorrectAndChosen,
                (false, false) => OptionVerdict::Other,
            };
            OptionReview {
                text: text.clone(),
                verdict,
            }
        })
        .collect();

    QuestionReview {
        question_id: question.id.clone(),
        question: question.question.clone(),
        options,
        chosen,
        correct_answer: question.correct_answer,
        is_correct: chosen == Some(question.correct_answer),
        explanation: question.explanation.clone(),
    }
}
