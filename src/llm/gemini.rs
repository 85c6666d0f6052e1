use serde::{Deserialize, Serialize};

use super::provider::{
    ChatMessage, GenerateOutput, GenerateRequest, GenerationConfig, LlmError, LlmProvider,
    LlmResult,
};
use crate::http::client::HttpClient;

const ERROR_BODY_MAX_CHARS: usize = 400;

#[derive(Debug, Clone)]
pub struct GeminiProvider {
    http: HttpClient,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(http: HttpClient, api_key: Option<String>, base_url: String) -> LlmResult<Self> {
        let api_key = api_key
            .filter(|v| !v.trim().is_empty())
            .ok_or(LlmError::MissingApiKey)?;

        Ok(Self {
            http: http.with_api_key(api_key),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{model}:generateContent", self.base_url)
    }

    fn build_request(request: &GenerateRequest) -> GeminiGenerateRequest {
        GeminiGenerateRequest {
            contents: request.messages.iter().map(GeminiContent::from).collect(),
            system_instruction: request
                .system_instruction
                .as_ref()
                .map(|text| GeminiSystemInstruction {
                    parts: vec![GeminiRequestPart { text: text.clone() }],
                }),
            generation_config: GeminiGenerationConfig::from(request.generation),
        }
    }

    fn extract_text(resp: GeminiGenerateResponse) -> LlmResult<String> {
        let Some(candidate) = resp.candidates.into_iter().next() else {
            return Err(match resp.prompt_feedback.and_then(|f| f.block_reason) {
                Some(reason) => LlmError::Blocked(reason),
                None => LlmError::EmptyResponse {
                    finish_reason: None,
                },
            });
        };

        let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
        let texts: Vec<String> = parts
            .into_iter()
            .filter(|part| !part.thought)
            .filter_map(|part| part.text)
            .collect();

        if texts.is_empty() {
            return Err(LlmError::EmptyResponse {
                finish_reason: candidate.finish_reason,
            });
        }

        Ok(texts.concat())
    }
}

impl LlmProvider for GeminiProvider {
    async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateOutput> {
        let payload = Self::build_request(&request);
        let resp = self
            .http
            .post_json(&self.endpoint(&request.model), &payload)
            .await
            .map_err(|err| LlmError::Transport(err.to_string()))?;

        if !(200..300).contains(&resp.status) {
            let body = resp.body.chars().take(ERROR_BODY_MAX_CHARS).collect::<String>();
            return Err(LlmError::HttpStatus {
                status: resp.status,
                body,
            });
        }

        let parsed = serde_json::from_str::<GeminiGenerateResponse>(&resp.body)
            .map_err(|err| LlmError::Parse(err.to_string()))?;
        let text = Self::extract_text(parsed)?;
        Ok(GenerateOutput { text })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerateRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiRequestPart>,
}

impl From<&ChatMessage> for GeminiContent {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role.as_str(),
            parts: vec![GeminiRequestPart {
                text: message.text.clone(),
            }],
        }
    }
}

#[derive(Debug, Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiRequestPart>,
}

#[derive(Debug, Serialize)]
struct GeminiRequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

impl From<GenerationConfig> for GeminiGenerationConfig {
    fn from(config: GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerateResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}
