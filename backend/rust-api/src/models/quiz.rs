use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// A single multiple-choice question embedded in a quiz post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
    /// 0-based index into `options`
    pub correct_answer: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Facile,
    Moyen,
    Difficile,
}

impl Difficulty {
    pub fn as_str(&self) -> &str {
        match self {
            Difficulty::Facile => "facile",
            Difficulty::Moyen => "moyen",
            Difficulty::Difficile => "difficile",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuizValidationError {
    #[error("A quiz needs at least one question")]
    NoQuestions,
    #[error("Question {index} has an empty id")]
    EmptyId { index: usize },
    #[error("Duplicate question id: {0}")]
    DuplicateId(String),
    #[error("Question {index} has an empty statement")]
    EmptyStatement { index: usize },
    #[error("Question {index} needs at least two options")]
    TooFewOptions { index: usize },
    #[error("Question {index} has an empty option")]
    EmptyOption { index: usize },
    #[error("Question {index}: correct answer {correct_answer} is not a valid option")]
    CorrectAnswerOutOfRange { index: usize, correct_answer: usize },
    #[error("Time limit must be at least one minute")]
    InvalidTimeLimit,
}

/// Structural checks every question list must pass before a session can run it.
/// An empty list is structurally valid; authoring rejects it separately.
pub fn validate_questions(questions: &[QuizQuestion]) -> Result<(), QuizValidationError> {
    let mut seen = HashSet::with_capacity(questions.len());

    for (index, q) in questions.iter().enumerate() {
        if q.id.trim().is_empty() {
            return Err(QuizValidationError::EmptyId { index });
        }
        if !seen.insert(q.id.as_str()) {
            return Err(QuizValidationError::DuplicateId(q.id.clone()));
        }
        if q.options.len() < 2 {
            return Err(QuizValidationError::TooFewOptions { index });
        }
        if q.correct_answer >= q.options.len() {
            return Err(QuizValidationError::CorrectAnswerOutOfRange {
                index,
                correct_answer: q.correct_answer,
            });
        }
    }

    Ok(())
}

/// Authoring-time rules: structural checks plus non-empty text everywhere.
pub fn validate_quiz_authoring(
    questions: &[QuizQuestion],
    time_limit_minutes: Option<u32>,
) -> Result<(), QuizValidationError> {
    if questions.is_empty() {
        return Err(QuizValidationError::NoQuestions);
    }
    if time_limit_minutes == Some(0) {
        return Err(QuizValidationError::InvalidTimeLimit);
    }

    validate_questions(questions)?;

    for (index, q) in questions.iter().enumerate() {
        if q.question.trim().is_empty() {
            return Err(QuizValidationError::EmptyStatement { index });
        }
        if q.options.iter().any(|opt| opt.trim().is_empty()) {
            return Err(QuizValidationError::EmptyOption { index });
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizPhase {
    NotStarted,
    InProgress,
    Finished,
}

impl QuizPhase {
    pub fn as_str(&self) -> &str {
        match self {
            QuizPhase::NotStarted => "not_started",
            QuizPhase::InProgress => "in_progress",
            QuizPhase::Finished => "finished",
        }
    }
}

impl std::fmt::Display for QuizPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one quiz attempt. Lives only in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuizState {
    pub current_question_index: usize,
    /// `None` marks a question left unanswered when the time ran out
    pub answers: HashMap<String, Option<usize>>,
    pub phase: QuizPhase,
    pub started_at: Option<DateTime<Utc>>,
    pub time_limit_seconds: Option<u32>,
    pub time_left_seconds: Option<u32>,
}

impl QuizState {
    pub fn not_started() -> Self {
        Self {
            current_question_index: 0,
            answers: HashMap::new(),
            phase: QuizPhase::NotStarted,
            started_at: None,
            time_limit_seconds: None,
            time_left_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuizScore {
    pub score: usize,
    pub total: usize,
    pub percentage: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionVerdict {
    CorrectAndChosen,
    CorrectNotChosen,
    IncorrectAndChosen,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionReview {
    pub text: String,
    pub verdict: OptionVerdict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionReview {
    pub question_id: String,
    pub question: String,
    pub options: Vec<OptionReview>,
    pub chosen: Option<usize>,
    pub correct_answer: usize,
    pub is_correct: bool,
    pub explanation: Option<String>,
}

/// A question as shown while the attempt runs: no correct answer, no explanation.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
}

impl From<&QuizQuestion> for QuestionView {
    fn from(q: &QuizQuestion) -> Self {
        Self {
            id: q.id.clone(),
            question: q.question.clone(),
            options: q.options.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateQuizSessionRequest {
    pub post_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SelectAnswerRequest {
    pub question_id: String,
    pub option_index: usize,
}

#[derive(Debug, Serialize)]
pub struct QuizSessionView {
    pub session_id: String,
    pub post_id: String,
    pub phase: QuizPhase,
    pub total_questions: usize,
    pub current_question_index: usize,
    pub current_question: Option<QuestionView>,
    pub selected_option: Option<usize>,
    pub answered_count: usize,
    pub can_advance: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub time_limit_seconds: Option<u32>,
    pub time_left_seconds: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct QuizResultView {
    pub session_id: String,
    pub post_id: String,
    #[serde(flatten)]
    pub score: QuizScore,
    pub review: Vec<QuestionReview>,
}
