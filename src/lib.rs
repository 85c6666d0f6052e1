pub mod chat;
pub mod cli;
pub mod config;
pub mod http;
pub mod llm;
pub mod trace;

use anyhow::{Result, anyhow, bail};
use chat::{ChatSettings, send_with_fallback};
use cli::{CliArgs, ReplState, run_repl};
use config::AppConfig;
use http::client::HttpClient;
use http::debug::HttpDebugConfig;
use llm::gemini::GeminiProvider;
use llm::provider::{GenerationConfig, LlmProvider};
use std::time::{SystemTime, UNIX_EPOCH};
use trace::SessionTrace;

pub const MISSING_API_KEY_MESSAGE: &str =
    "Missing API key. Set GEMINI_API_KEY or pass --api-key.";

pub async fn run(args: CliArgs) -> Result<()> {
    let config = AppConfig::load(&args.config_overrides())?;
    let Some(api_key) = config.gemini_api_key.clone() else {
        bail!(MISSING_API_KEY_MESSAGE);
    };

    let session_id = generate_session_id();
    let trace = SessionTrace::create(&session_id)?;
    let http = HttpClient::with_default_timeout(HttpDebugConfig::from_verbose(args.verbose))
        .map_err(|err| anyhow!("Failed to build HTTP client: {err}"))?
        .with_trace(trace.clone());
    let provider = GeminiProvider::new(http, Some(api_key), config.gemini_base_url.clone())
        .map_err(|_| anyhow!(MISSING_API_KEY_MESSAGE))?;
    let settings = chat_settings(&config);

    match args.prompt.as_deref().filter(|prompt| !prompt.is_empty()) {
        Some(prompt) => {
            trace.log_session_start(&config.gemini_model, "prompt");
            let text = run_single_prompt(&provider, prompt, &config, &settings, &trace).await?;
            println!("{text}");
            Ok(())
        }
        None => {
            trace.log_session_start(&config.gemini_model, "repl");
            let mut state = ReplState::new(
                provider,
                config.gemini_model.clone(),
                config.fallback_models.clone(),
                settings,
                trace,
            );
            run_repl(&mut state).await
        }
    }
}

fn chat_settings(config: &AppConfig) -> ChatSettings {
    ChatSettings {
        system_instruction: config.system_instruction.clone(),
        generation: GenerationConfig {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        },
    }
}

async fn run_single_prompt<P: LlmProvider>(
    provider: &P,
    prompt: &str,
    config: &AppConfig,
    settings: &ChatSettings,
    trace: &SessionTrace,
) -> Result<String> {
    trace.log_user_input(prompt);
    let result = send_with_fallback(
        provider,
        prompt,
        &config.gemini_model,
        &config.fallback_models,
        settings,
    )
    .await;

    match result {
        Ok((session, text)) => {
            if session.model() != config.gemini_model {
                trace.log_fallback(&config.gemini_model, session.model());
            }
            trace.log_reply(&text);
            Ok(text)
        }
        Err(err) => {
            let message = format!("Request failed: {err}");
            trace.log_error(&message);
            Err(anyhow!(message))
        }
    }
}

fn generate_session_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis());
    format!("{millis:x}-{:x}", std::process::id())
}
