use super::session::{ChatSession, ChatSettings};
use crate::llm::provider::{LlmProvider, LlmResult};

/// Sends `prompt` on a fresh session for `primary`, walking `fallbacks` in
/// order when the primary model is unknown to the API.
///
/// Only a model-not-found error triggers the walk. Fallback failures of any
/// kind move on to the next candidate; when none succeeds the primary's
/// error is returned.
pub async fn send_with_fallback<P: LlmProvider>(
    provider: &P,
    prompt: &str,
    primary: &str,
    fallbacks: &[String],
    settings: &ChatSettings,
) -> LlmResult<(ChatSession, String)> {
    let mut session = ChatSession::new(primary, settings.clone());
    let primary_err = match session.send_message(provider, prompt).await {
        Ok(text) => return Ok((session, text)),
        Err(err) if !err.is_model_not_found() => return Err(err),
        Err(err) => err,
    };

    for fallback in fallbacks {
        let mut session = ChatSession::new(fallback.as_str(), settings.clone());
        if let Ok(text) = session.send_message(provider, prompt).await {
            return Ok((session, text));
        }
    }

    Err(primary_err)
}
