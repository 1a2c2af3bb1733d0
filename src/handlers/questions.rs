// src/handlers/questions.rs
//
// Admin-only question bank management.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, QueryBuilder, types::Json as SqlJson};
use validator::Validate;

use crate::{
    error::AppError,
    models::question::{
        BulkCreateQuestionsRequest, CreateQuestionRequest, Question, UpdateQuestionRequest,
    },
};

/// Lists the full question bank, answers included.
pub async fn list_questions(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let questions =
        sqlx::query_as::<_, Question>("SELECT * FROM questions ORDER BY id DESC")
            .fetch_all(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to list questions: {:?}", e);
                AppError::InternalServerError(e.to_string())
            })?;

    Ok(Json(questions))
}

/// Fetches a single question by ID.
pub async fn get_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let question = sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;

    Ok(Json(question))
}

/// Creates a new question.
pub async fn create_question(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_new_question(&payload)?;

    let id = insert_question(&pool, &payload).await?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

/// Bulk-imports questions inside a single transaction: either every
/// question lands or none do.
pub async fn bulk_create_questions(
    State(pool): State<PgPool>,
    Json(payload): Json<BulkCreateQuestionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.questions.is_empty() {
        return Err(AppError::BadRequest("No questions supplied".to_string()));
    }
    for question in &payload.questions {
        validate_new_question(question)?;
    }

    let mut tx = pool.begin().await?;
    let mut ids = Vec::with_capacity(payload.questions.len());

    for question in &payload.questions {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO questions (prompt, options, answer, category, difficulty)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&question.prompt)
        .bind(SqlJson(&question.options))
        .bind(&question.answer)
        .bind(&question.category)
        .bind(&question.difficulty)
        .fetch_one(&mut *tx)
        .await?;
        ids.push(id);
    }

    tx.commit().await?;

    tracing::info!(count = ids.len(), "bulk question import completed");

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "ids": ids }))))
}

/// Updates a question by ID. Only supplied fields change; the merged
/// row is checked so the answer always remains one of the options.
pub async fn update_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.prompt.is_none()
        && payload.options.is_none()
        && payload.answer.is_none()
        && payload.category.is_none()
        && payload.difficulty.is_none()
    {
        return Ok(StatusCode::OK);
    }

    let existing = sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;

    // The invariant spans two columns, so check it against the merge
    // of stored and incoming values.
    let merged_options = payload.options.as_ref().unwrap_or(&existing.options.0);
    let merged_answer = payload.answer.as_deref().unwrap_or(&existing.answer);
    if !merged_options.iter().any(|opt| opt == merged_answer) {
        return Err(AppError::BadRequest(
            "Answer must be one of the question's options".to_string(),
        ));
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE questions SET ");
    let mut separated = builder.separated(", ");

    if let Some(prompt) = payload.prompt {
        separated.push("prompt = ");
        separated.push_bind_unseparated(prompt);
    }

    if let Some(options) = payload.options {
        separated.push("options = ");
        separated.push_bind_unseparated(serde_json::to_value(options).unwrap_or_default());
    }

    if let Some(answer) = payload.answer {
        separated.push("answer = ");
        separated.push_bind_unseparated(answer);
    }

    if let Some(category) = payload.category {
        separated.push("category = ");
        separated.push_bind_unseparated(category);
    }

    if let Some(difficulty) = payload.difficulty {
        separated.push("difficulty = ");
        separated.push_bind_unseparated(difficulty);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(StatusCode::OK)
}

/// Deletes a question by ID.
pub async fn delete_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM questions WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete question: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

fn validate_new_question(payload: &CreateQuestionRequest) -> Result<(), AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    if !payload.answer_in_options() {
        return Err(AppError::BadRequest(
            "Answer must be one of the question's options".to_string(),
        ));
    }
    Ok(())
}

async fn insert_question(pool: &PgPool, payload: &CreateQuestionRequest) -> Result<i64, AppError> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO questions (prompt, options, answer, category, difficulty)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(&payload.prompt)
    .bind(SqlJson(&payload.options))
    .bind(&payload.answer)
    .bind(&payload.category)
    .bind(&payload.difficulty)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(id)
}
