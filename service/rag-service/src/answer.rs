use serde::{Deserialize, Serialize};

macro_rules! no_answer_reply {
    () => {
        "No relevant answer was found in the provided documents."
    };
}

/// Reply the generator is told to give when the contexts do not answer the question.
pub const NO_ANSWER_REPLY: &str = no_answer_reply!();

/// Default prompt; `{text}` receives the newline-joined contexts and
/// `{question}` the user query.
pub const DEFAULT_PROMPT_TEMPLATE: &str = concat!(
    "Answer strictly from the retrieved passages below. ",
    "Do not invent facts or add anything that does not appear in the passages.\n",
    "If the passages cannot answer the question directly, reply exactly: \"",
    no_answer_reply!(),
    "\"\n\nPassages:\n{text}\n\nQuestion:\n{question}\n",
);

/// Grounding contexts returned by a query, already deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerContext {
    pub contexts: Vec<String>,
}

impl AnswerContext {
    pub fn is_empty(&self) -> bool { self.contexts.is_empty() }

    /// Contexts joined the way they are handed to the generator.
    pub fn joined(&self) -> String { self.contexts.join("\n") }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("{message}")]
pub struct GeneratorError {
    pub message: String,
}

impl GeneratorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Text generation backend used to answer from retrieved context.
pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, GeneratorError>;
}

impl<F> Generator for F
where
    F: Fn(&str) -> Result<String, GeneratorError> + Send + Sync,
{
    fn generate(&self, prompt: &str) -> Result<String, GeneratorError> {
        self(prompt)
    }
}

/// Fill `{text}` and `{question}` in `template`. Placeholders inside the
/// substituted values are left alone.
pub fn render_prompt(template: &str, context: &AnswerContext, question: &str) -> String {
    template
        .split("{text}")
        .map(|part| part.replace("{question}", question))
        .collect::<Vec<_>>()
        .join(&context.joined())
}
