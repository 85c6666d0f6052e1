use crate::llm::provider::{
    ChatMessage, GenerateRequest, GenerationConfig, LlmProvider, LlmResult,
};

/// Per-conversation settings that stay fixed when a session is rebuilt on a
/// fallback model.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    pub system_instruction: Option<String>,
    pub generation: GenerationConfig,
}

/// A multi-turn conversation bound to one model.
///
/// History only grows on successful turns, so a failed request can be
/// retried without leaving a dangling user message behind.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSession {
    model: String,
    settings: ChatSettings,
    history: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(model: impl Into<String>, settings: ChatSettings) -> Self {
        Self {
            model: model.into(),
            settings,
            history: Vec::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    pub async fn send_message<P: LlmProvider>(
        &mut self,
        provider: &P,
        text: &str,
    ) -> LlmResult<String> {
        let user_turn = ChatMessage::user(text);
        let mut messages = self.history.clone();
        messages.push(user_turn.clone());

        let output = provider
            .generate(GenerateRequest {
                model: self.model.clone(),
                system_instruction: self.settings.system_instruction.clone(),
                messages,
                generation: self.settings.generation,
            })
            .await?;

        self.history.push(user_turn);
        self.history.push(ChatMessage::model(output.text.clone()));
        Ok(output.text)
    }
}
