use anyhow::{Result, anyhow, bail};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::llm::{DEFAULT_FALLBACK_MODELS, DEFAULT_MODEL};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 512;

const CONFIG_DIR_NAME: &str = "gemini_chat";
const CONFIG_FILE_NAME: &str = "config.toml";
const MAX_TEMPERATURE: f32 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub config_path: Option<PathBuf>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub system_instruction: Option<String>,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub fallback_models: Vec<String>,
}

/// Values given on the command line. They win over the environment and the
/// config file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub system_instruction: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub fallback_models: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFileConfig {
    gemini_api_key: Option<String>,
    gemini_model: Option<String>,
    gemini_base_url: Option<String>,
    system_instruction: Option<String>,
    temperature: Option<f32>,
    max_output_tokens: Option<u32>,
    fallback_models: Option<Vec<String>>,
}

impl AppConfig {
    pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
        let (config_path, file_config) = match overrides.config_path.as_deref() {
            Some(path) => (path.to_path_buf(), load_explicit_file_config(path)?),
            None => {
                let path = discover_config_path()?;
                let file_config = load_file_config(&path)?;
                (path, file_config)
            }
        };
        let loaded_path = file_config.as_ref().map(|_| config_path.clone());
        let file = file_config.unwrap_or_default();

        // Existing process variables take precedence over .env entries.
        dotenvy::dotenv().ok();

        let (temperature, origin) =
            layered(overrides.temperature, file.temperature, DEFAULT_TEMPERATURE);
        if !(0.0..=MAX_TEMPERATURE).contains(&temperature) {
            return Err(origin.invalid(
                &config_path,
                "--temperature",
                "temperature",
                &format!("must be between 0.0 and {MAX_TEMPERATURE:.1}, got {temperature}"),
            ));
        }

        let (max_output_tokens, origin) = layered(
            overrides.max_output_tokens,
            file.max_output_tokens,
            DEFAULT_MAX_OUTPUT_TOKENS,
        );
        if max_output_tokens == 0 {
            return Err(origin.invalid(
                &config_path,
                "--max-tokens",
                "max_output_tokens",
                "must be at least 1",
            ));
        }

        let fallback_models = overrides
            .fallback_models
            .clone()
            .or_else(|| file.fallback_models.as_deref().map(clean_model_list))
            .unwrap_or_else(|| {
                DEFAULT_FALLBACK_MODELS
                    .iter()
                    .map(ToString::to_string)
                    .collect()
            });

        Ok(Self {
            config_path: loaded_path,
            gemini_api_key: non_empty_owned(overrides.api_key.as_deref())
                .or_else(|| env_non_empty("GEMINI_API_KEY"))
                .or_else(|| env_non_empty("GOOGLE_API_KEY"))
                .or_else(|| non_empty_owned(file.gemini_api_key.as_deref())),
            gemini_model: non_empty_owned(overrides.model.as_deref())
                .or_else(|| env_non_empty("GEMINI_MODEL"))
                .or_else(|| non_empty_owned(file.gemini_model.as_deref()))
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            gemini_base_url: env_non_empty("GEMINI_BASE_URL")
                .or_else(|| non_empty_owned(file.gemini_base_url.as_deref()))
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            system_instruction: non_empty_owned(overrides.system_instruction.as_deref())
                .or_else(|| non_empty_owned(file.system_instruction.as_deref())),
            temperature,
            max_output_tokens,
            fallback_models,
        })
    }
}

/// Splits a comma-separated model list, dropping blank entries.
pub fn parse_fallback_models(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|model| !model.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn clean_model_list(models: &[String]) -> Vec<String> {
    models
        .iter()
        .filter_map(|model| non_empty_owned(Some(model.as_str())))
        .collect()
}

/// Where a validated setting came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Flag,
    File,
    Default,
}

impl Origin {
    fn invalid(self, config_path: &Path, flag: &str, key: &str, reason: &str) -> anyhow::Error {
        match self {
            Self::Flag => anyhow!("Invalid value for {flag}: {reason}"),
            Self::File | Self::Default => config_error(config_path, key, reason),
        }
    }
}

fn layered<T>(flag: Option<T>, file: Option<T>, default: T) -> (T, Origin) {
    match (flag, file) {
        (Some(value), _) => (value, Origin::Flag),
        (None, Some(value)) => (value, Origin::File),
        (None, None) => (default, Origin::Default),
    }
}

fn discover_config_path() -> Result<PathBuf> {
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let trimmed = xdg.trim();
        if trimmed.is_empty() {
            bail!("Failed to resolve config path: XDG_CONFIG_HOME is set but empty");
        }

        return Ok(PathBuf::from(trimmed)
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME));
    }

    let home = dirs::home_dir()
        .ok_or_else(|| anyhow!("Failed to resolve config path: HOME directory is unavailable"))?;

    Ok(home
        .join(".config")
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME))
}

fn load_explicit_file_config(config_path: &Path) -> Result<Option<RawFileConfig>> {
    if !config_path.is_file() {
        bail!(
            "Failed to load config {}: file does not exist",
            config_path.display()
        );
    }
    load_file_config(config_path)
}

fn load_file_config(config_path: &Path) -> Result<Option<RawFileConfig>> {
    if !config_path.is_file() {
        return Ok(None);
    }

    let config_text = fs::read_to_string(config_path).map_err(|err| {
        anyhow!(
            "Failed to load config {}: unable to read file: {err}",
            config_path.display()
        )
    })?;

    toml::from_str(&config_text)
        .map(Some)
        .map_err(|err| anyhow!("Failed to load config {}: {err}", config_path.display()))
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .and_then(|value| non_empty_owned(Some(value.as_str())))
}

fn non_empty_owned(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(ToOwned::to_owned)
}

fn config_error(config_path: &Path, key_path: &str, reason: &str) -> anyhow::Error {
    anyhow!(
        "Failed to load config {}: {key_path}: {reason}",
        config_path.display()
    )
}
