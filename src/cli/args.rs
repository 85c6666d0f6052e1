use clap::Parser;
use std::path::PathBuf;

use crate::config::{ConfigOverrides, parse_fallback_models};

#[derive(Debug, Parser, Clone, PartialEq)]
#[command(name = "gemini_chat")]
#[command(
    about = "Gemini chat agent (single prompt + REPL)",
    long_about = "Gemini chat agent (single prompt + REPL)\n\nAPI key lookup order:\n  --api-key, GEMINI_API_KEY, GOOGLE_API_KEY, gemini_api_key in the config file\n\nConfig file loading:\n  - --config <path> (explicit file, overrides default path discovery)\n  - Default search path when --config is not provided:\n    1. $XDG_CONFIG_HOME/gemini_chat/config.toml\n    2. ~/.config/gemini_chat/config.toml"
)]
pub struct CliArgs {
    /// Single prompt to run; omit to start the REPL.
    #[arg(long, short = 'p')]
    pub prompt: Option<String>,

    /// Gemini model name (default: gemini-2.5-pro).
    #[arg(long, short = 'm')]
    pub model: Option<String>,

    /// Optional system instruction.
    #[arg(long)]
    pub system: Option<String>,

    /// Sampling temperature between 0.0 and 2.0 (default: 0.2).
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Maximum number of output tokens (default: 512).
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// API key (or set GEMINI_API_KEY/GOOGLE_API_KEY).
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Comma-separated models to try when the primary model is not found
    /// (default: gemini-1.0-pro,gemini-pro).
    #[arg(long, value_name = "MODELS")]
    pub fallback_models: Option<String>,

    /// Load config from this file path instead of the default discovery path.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print redacted HTTP requests and responses to stderr.
    #[arg(long)]
    pub verbose: bool,
}

impl CliArgs {
    pub fn config_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_path: self.config.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            system_instruction: self.system.clone(),
            temperature: self.temperature,
            max_output_tokens: self.max_tokens,
            fallback_models: self.fallback_models.as_deref().map(parse_fallback_models),
        }
    }
}
