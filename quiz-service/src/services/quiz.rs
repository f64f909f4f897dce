//! Trivia question generation with shape validation and canned fallbacks.

use serde::{Deserialize, Serialize};
use service_core::fallback::FallbackPicker;
use service_core::observability::{record_fallback, record_upstream_error};
use service_core::providers::{ChatMessage, ChatProvider, GenerationParams, ProviderError};
use thiserror::Error;

pub const QUIZ_MAX_TOKENS: u32 = 300;
pub const QUIZ_TEMPERATURE: f32 = 0.8;

/// Every question offers exactly this many answers.
pub const ANSWER_COUNT: usize = 4;

pub const QUIZ_PROMPT: &str = "Generate a geography trivia question with exactly 4 possible \
answers, only one of which is correct. Respond with only a JSON object in this exact format \
and no other text:\n\
{\"question\": \"...\", \"answers\": [{\"text\": \"...\", \"correct\": true}, \
{\"text\": \"...\", \"correct\": false}, {\"text\": \"...\", \"correct\": false}, \
{\"text\": \"...\", \"correct\": false}]}\n\
Shuffle the answers so the correct one appears in a random position.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub answers: Vec<Answer>,
}

#[derive(Debug, Error)]
pub enum QuizError {
    #[error("upstream failed: {0}")]
    Upstream(#[from] ProviderError),

    #[error("upstream returned no content")]
    Empty,

    #[error("response is not a quiz question: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid quiz question: {0}")]
    Invalid(String),
}

impl QuizError {
    /// Metric label: unreachable upstream versus unusable output.
    pub fn category(&self) -> &'static str {
        match self {
            QuizError::Upstream(e) => e.category(),
            QuizError::Empty | QuizError::Parse(_) | QuizError::Invalid(_) => "malformed",
        }
    }
}

impl QuizQuestion {
    /// Shape check applied to everything the upstream returns.
    pub fn validate(&self) -> Result<(), QuizError> {
        if self.question.trim().is_empty() {
            return Err(QuizError::Invalid("question is empty".to_string()));
        }

        if self.answers.len() != ANSWER_COUNT {
            return Err(QuizError::Invalid(format!(
                "expected {} answers, got {}",
                ANSWER_COUNT,
                self.answers.len()
            )));
        }

        if self.answers.iter().any(|a| a.text.trim().is_empty()) {
            return Err(QuizError::Invalid("an answer has no text".to_string()));
        }

        let correct = self.answers.iter().filter(|a| a.correct).count();
        if correct != 1 {
            return Err(QuizError::Invalid(format!(
                "expected exactly one correct answer, got {}",
                correct
            )));
        }

        Ok(())
    }

    pub fn correct_answer(&self) -> Option<&Answer> {
        self.answers.iter().find(|a| a.correct)
    }
}

/// Parse and validate model output. A surrounding Markdown code fence is tolerated.
pub fn parse_quiz_question(raw: &str) -> Result<QuizQuestion, QuizError> {
    let question: QuizQuestion = serde_json::from_str(strip_code_fence(raw))?;
    question.validate()?;
    Ok(question)
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Ask the upstream model for a question; never fails.
#[tracing::instrument(skip_all)]
pub async fn generate_quiz_question(
    provider: &dyn ChatProvider,
    picker: &FallbackPicker,
) -> QuizQuestion {
    match request_question(provider).await {
        Ok(question) => {
            tracing::info!(question = %question.question, "Generated AI quiz question");
            question
        }
        Err(e) => {
            record_upstream_error("quiz", e.category());
            record_fallback("quiz");
            tracing::warn!(error = %e, "Quiz generation failed, using fallback question");
            fallback_question(picker)
        }
    }
}

async fn request_question(provider: &dyn ChatProvider) -> Result<QuizQuestion, QuizError> {
    let messages = [ChatMessage::user(QUIZ_PROMPT)];
    let params = GenerationParams::new(QUIZ_MAX_TOKENS, QUIZ_TEMPERATURE);

    let completion = provider.complete(&messages, &params).await?;
    let text = completion.text.ok_or(QuizError::Empty)?;

    parse_quiz_question(&text)
}

struct CannedQuestion {
    question: &'static str,
    answers: [(&'static str, bool); ANSWER_COUNT],
}

static FALLBACK_QUESTIONS: [CannedQuestion; 5] = [
    CannedQuestion {
        question: "What is the capital of Australia?",
        answers: [
            ("Sydney", false),
            ("Melbourne", false),
            ("Canberra", true),
            ("Perth", false),
        ],
    },
    CannedQuestion {
        question: "Which is the longest river in the world?",
        answers: [
            ("Amazon", false),
            ("Nile", true),
            ("Yangtze", false),
            ("Mississippi", false),
        ],
    },
    CannedQuestion {
        question: "Which country has the largest land area?",
        answers: [
            ("Russia", true),
            ("Canada", false),
            ("China", false),
            ("United States", false),
        ],
    },
    CannedQuestion {
        question: "What is the largest hot desert on Earth?",
        answers: [
            ("Gobi", false),
            ("Kalahari", false),
            ("Arabian", false),
            ("Sahara", true),
        ],
    },
    CannedQuestion {
        question: "Mount Everest sits on the border between Nepal and which country?",
        answers: [
            ("India", false),
            ("China", true),
            ("Bhutan", false),
            ("Pakistan", false),
        ],
    },
];

impl CannedQuestion {
    fn to_question(&self) -> QuizQuestion {
        QuizQuestion {
            question: self.question.to_string(),
            answers: self
                .answers
                .iter()
                .map(|&(text, correct)| Answer {
                    text: text.to_string(),
                    correct,
                })
                .collect(),
        }
    }
}

/// All canned questions, in a fixed order.
pub fn fallback_questions() -> Vec<QuizQuestion> {
    FALLBACK_QUESTIONS.iter().map(CannedQuestion::to_question).collect()
}

pub fn fallback_question(picker: &FallbackPicker) -> QuizQuestion {
    picker
        .pick(&FALLBACK_QUESTIONS)
        .unwrap_or(&FALLBACK_QUESTIONS[0])
        .to_question()
}
