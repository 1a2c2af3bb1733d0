// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

/// Number of options every question carries.
pub const OPTION_COUNT: usize = 4;

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    /// The question text shown to the candidate.
    pub prompt: String,

    /// Exactly four option strings, stored as a JSON array.
    pub options: Json<Vec<String>>,

    /// The correct option value. Must equal one of `options`.
    pub answer: String,

    /// Category tag (e.g. 'General', 'Technical', 'Aptitude').
    pub category: String,

    /// Difficulty tag (e.g. 'Easy', 'Medium', 'Hard').
    pub difficulty: String,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for sending a question to a candidate (excludes the answer).
#[derive(Debug, Clone, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub prompt: String,
    pub options: Vec<String>,
    pub category: String,
    pub difficulty: String,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            prompt: q.prompt.clone(),
            options: q.options.0.clone(),
            category: q.category.clone(),
            difficulty: q.difficulty.clone(),
        }
    }
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 1000))]
    pub prompt: String,
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    #[validate(length(min = 1, max = 500))]
    pub answer: String,
    #[validate(length(min = 1, max = 50))]
    pub category: String,
    #[validate(length(min = 1, max = 50))]
    pub difficulty: String,
}

impl CreateQuestionRequest {
    /// The answer must be one of the listed options, otherwise the
    /// question can never be answered correctly.
    pub fn answer_in_options(&self) -> bool {
        self.options.iter().any(|opt| opt == &self.answer)
    }
}

/// DTO for updating a question. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateQuestionRequest {
    pub prompt: Option<String>,
    pub options: Option<Vec<String>>,
    pub answer: Option<String>,
    pub category: Option<String>,
    pub difficulty: Option<String>,
}

/// DTO for bulk-importing questions.
#[derive(Debug, Deserialize)]
pub struct BulkCreateQuestionsRequest {
    pub questions: Vec<CreateQuestionRequest>,
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    if options.len() != OPTION_COUNT {
        return Err(validator::ValidationError::new("exactly_four_options_required"));
    }
    for opt in options {
        if opt.is_empty() || opt.len() > 500 {
            return Err(validator::ValidationError::new("option_length_invalid"));
        }
    }
    Ok(())
}
