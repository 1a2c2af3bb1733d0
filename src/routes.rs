// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{auth, exams, questions, users},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, exams, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (pool, config, session registry).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_layer = middleware::from_fn_with_state(state.config.clone(), auth_middleware);

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .merge(
            Router::new()
                .route("/me", get(auth::me))
                .layer(auth_layer.clone()),
        );

    let exam_routes = Router::new()
        .route("/start", post(exams::start_exam))
        .route("/session", get(exams::get_session))
        .route("/answer", post(exams::record_answer))
        .route("/skip", post(exams::skip_question))
        .route("/jump", post(exams::jump_to_question))
        .route("/submit", post(exams::submit_exam))
        .route("/results/me", get(exams::my_results))
        .route("/results/{id}", get(exams::get_result))
        .layer(auth_layer.clone());

    let admin_routes = Router::new()
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/{id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route(
            "/questions",
            get(questions::list_questions).post(questions::create_question),
        )
        .route("/questions/bulk", post(questions::bulk_create_questions))
        .route(
            "/questions/{id}",
            get(questions::get_question)
                .put(questions::update_question)
                .delete(questions::delete_question),
        )
        .route("/results", get(exams::list_results))
        .route(
            "/results/{id}",
            put(exams::update_result).delete(exams::delete_result),
        )
        .route("/statistics", get(exams::get_statistics))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(auth_layer);

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/exams", exam_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
