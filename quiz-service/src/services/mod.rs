pub mod quiz;

pub use quiz::{generate_quiz_question, Answer, QuizError, QuizQuestion};
