// src/handlers/users.rs
//
// Admin-only user account management.

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::AppError,
    models::user::{
        AdminCreateUserRequest, AdminUpdateUserRequest, ROLE_ADMIN, ROLE_CANDIDATE, User,
    },
    utils::{hash::hash_password, jwt::Claims},
};

fn valid_role(role: &str) -> bool {
    role == ROLE_ADMIN || role == ROLE_CANDIDATE
}

/// Lists all users in the system, newest first.
pub async fn list_users(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY id DESC")
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list users: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(Json(users))
}

/// Fetches a single user by ID.
pub async fn get_user(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// Creates a new user account with a specific role.
/// Candidates must be assigned a hall ticket number.
pub async fn create_user(
    State(pool): State<PgPool>,
    Json(payload): Json<AdminCreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    if !valid_role(&payload.role) {
        return Err(AppError::BadRequest(format!(
            "Role must be '{ROLE_CANDIDATE}' or '{ROLE_ADMIN}'"
        )));
    }
    if payload.role == ROLE_CANDIDATE && payload.hall_ticket.as_deref().unwrap_or("").is_empty() {
        return Err(AppError::BadRequest(
            "Candidates require a hall ticket number".to_string(),
        ));
    }

    let hashed_password = hash_password(&payload.password)?;

    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO users (name, email, phone, username, password, role, hall_ticket)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(&payload.phone)
    .bind(&payload.username)
    .bind(&hashed_password)
    .bind(&payload.role)
    .bind(&payload.hall_ticket)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        // Postgres error code for unique violation is 23505
        if e.to_string().contains("unique constraint") || e.to_string().contains("23505") {
            AppError::Conflict(format!(
                "Username '{}' or hall ticket already exists",
                payload.username
            ))
        } else {
            tracing::error!("Failed to create user: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

/// Updates user information. Only supplied fields change.
pub async fn update_user(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<AdminUpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.name.is_none()
        && payload.email.is_none()
        && payload.phone.is_none()
        && payload.username.is_none()
        && payload.password.is_none()
        && payload.role.is_none()
        && payload.hall_ticket.is_none()
    {
        return Ok(StatusCode::OK);
    }

    if let Some(role) = &payload.role {
        if !valid_role(role) {
            return Err(AppError::BadRequest(format!(
                "Role must be '{ROLE_CANDIDATE}' or '{ROLE_ADMIN}'"
            )));
        }
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET ");
    let mut separated = builder.separated(", ");

    if let Some(name) = payload.name {
        separated.push("name = ");
        separated.push_bind_unseparated(name);
    }

    if let Some(email) = payload.email {
        separated.push("email = ");
        separated.push_bind_unseparated(email);
    }

    if let Some(phone) = payload.phone {
        separated.push("phone = ");
        separated.push_bind_unseparated(phone);
    }

    if let Some(username) = payload.username {
        separated.push("username = ");
        separated.push_bind_unseparated(username);
    }

    if let Some(password) = payload.password {
        let hashed = hash_password(&password)?;
        separated.push("password = ");
        separated.push_bind_unseparated(hashed);
    }

    if let Some(role) = payload.role {
        separated.push("role = ");
        separated.push_bind_unseparated(role);
    }

    if let Some(hall_ticket) = payload.hall_ticket {
        separated.push("hall_ticket = ");
        separated.push_bind_unseparated(hall_ticket);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update user: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deletes a user by ID. Prevents deleting self.
pub async fn delete_user(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if id == claims.user_id()? {
        return Err(AppError::BadRequest("Cannot delete yourself".to_string()));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete user: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
