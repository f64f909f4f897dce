use crate::services::{generate_quiz_question, QuizQuestion};
use crate::startup::AppState;
use axum::{extract::State, Json};

/// `GET /api`: always answers 200 with a question, generated or canned.
pub async fn quiz_api(State(state): State<AppState>) -> Json<QuizQuestion> {
    Json(generate_quiz_question(state.provider.as_ref(), &state.picker).await)
}
