use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Model,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Model,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub system_instruction: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateOutput {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    MissingApiKey,
    HttpStatus { status: u16, body: String },
    Transport(String),
    Parse(String),
    Blocked(String),
    EmptyResponse { finish_reason: Option<String> },
}

impl LlmError {
    /// Gemini answers unknown or retired model names with
    /// "models/<name> is not found for API version v1beta, ...".
    pub fn is_model_not_found(&self) -> bool {
        let message = self.to_string();
        message.contains("not found for API version") && message.contains("models/")
    }
}

impl Display for LlmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingApiKey => write!(f, "missing GEMINI_API_KEY"),
            Self::HttpStatus { status, body } => {
                write!(f, "provider request failed with status {status}: {body}")
            }
            Self::Transport(msg) => write!(f, "provider transport error: {msg}"),
            Self::Parse(msg) => write!(f, "provider parse error: {msg}"),
            Self::Blocked(reason) => write!(f, "prompt was blocked by the provider: {reason}"),
            Self::EmptyResponse {
                finish_reason: Some(reason),
            } => write!(f, "provider returned empty response text (finish reason {reason})"),
            Self::EmptyResponse { finish_reason: None } => {
                write!(f, "provider returned empty response text")
            }
        }
    }
}

impl Error for LlmError {}

pub type LlmResult<T> = std::result::Result<T, LlmError>;

pub trait LlmProvider {
    fn generate(
        &self,
        request: GenerateRequest,
    ) -> impl std::future::Future<Output = LlmResult<GenerateOutput>> + Send;
}
