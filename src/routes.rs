// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, attempt, auth, classroom, quiz, report},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, classroom, quiz, attempt, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (Database Pool + Config).
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

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let classroom_routes = Router::new()
        .route("/", post(classroom::create_classroom))
        .route("/{id}/enroll", post(classroom::enroll))
        .route("/{id}/quizzes", get(classroom::list_quizzes));

    let quiz_routes = Router::new()
        .route("/", post(quiz::create_quiz))
        .route("/{id}", put(quiz::update_quiz))
        .route("/{id}/publish", post(quiz::publish_quiz))
        .route("/{id}/archive", post(quiz::archive_quiz))
        .route("/{id}/take", get(quiz::get_quiz_for_taking))
        .route("/{id}/grading", get(quiz::get_quiz_for_grading))
        .route("/{id}/report", get(report::get_quiz_report))
        .route(
            "/{id}/attempts",
            post(attempt::start_attempt).get(attempt::list_my_attempts),
        );

    let attempt_routes = Router::new()
        .route("/{id}/submit", post(attempt::submit_attempt))
        .route("/{id}", get(attempt::get_attempt_review));

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users).post(admin::create_user))
        .route("/users/{id}", axum::routing::delete(admin::delete_user))
        .route(
            "/classrooms/{id}",
            axum::routing::delete(admin::delete_classroom),
        )
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware));

    let protected = Router::new()
        .nest("/api/classrooms", classroom_routes)
        .nest("/api/quizzes", quiz_routes)
        .nest("/api/attempts", attempt_routes)
        .nest("/api/admin", admin_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .merge(protected)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
