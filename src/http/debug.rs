use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;

const REDACTION: &str = "***REDACTED***";
const DEFAULT_MAX_BODY_CHARS: usize = 4_000;

/// Ways a Gemini API key can travel: the `key` query parameter or one of the
/// auth headers.
const SECRET_NAMES: [&str; 3] = ["key", "x-goog-api-key", "authorization"];

/// Controls the `--verbose` HTTP log written to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpDebugConfig {
    pub enabled: bool,
    pub redact_secrets: bool,
    pub max_body_chars: usize,
}

impl HttpDebugConfig {
    pub fn from_verbose(verbose: bool) -> Self {
        Self {
            enabled: verbose,
            redact_secrets: true,
            max_body_chars: DEFAULT_MAX_BODY_CHARS,
        }
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self::from_verbose(false)
    }

    pub fn redactor(self) -> Redactor {
        Redactor {
            enabled: self.redact_secrets,
        }
    }
}

/// Masks API keys before a request or response is shown to a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Redactor {
    enabled: bool,
}

impl Redactor {
    /// Used for the on-disk trace, which never stores keys.
    pub const ALWAYS: Self = Self { enabled: true };

    pub fn url(self, url: &Url) -> String {
        if !self.enabled || !url.query_pairs().any(|(name, _)| is_secret_name(&name)) {
            return url.to_string();
        }

        let mut redacted = url.clone();
        {
            let mut query = redacted.query_pairs_mut();
            query.clear();
            for (name, value) in url.query_pairs() {
                let shown = if is_secret_name(&name) {
                    REDACTION
                } else {
                    &*value
                };
                query.append_pair(&name, shown);
            }
        }
        redacted.into()
    }

    pub fn header(self, name: &str, value: &HeaderValue) -> String {
        if self.enabled && is_secret_name(name) {
            return REDACTION.to_string();
        }
        value.to_str().unwrap_or("<non-utf8>").to_string()
    }

    /// `name: value` lines in wire order.
    pub fn header_lines(self, headers: &HeaderMap) -> Vec<String> {
        headers
            .iter()
            .map(|(name, value)| format!("{}: {}", name.as_str(), self.header(name.as_str(), value)))
            .collect()
    }

    /// Masks secret keys anywhere inside a JSON body. Non-JSON bodies pass
    /// through untouched.
    pub fn body(self, raw: &str) -> String {
        if !self.enabled {
            return raw.to_string();
        }

        let Ok(mut json) = serde_json::from_str::<Value>(raw) else {
            return raw.to_string();
        };
        if !redact_json_value(&mut json) {
            return raw.to_string();
        }
        serde_json::to_string(&json).unwrap_or_else(|_| raw.to_string())
    }
}

pub fn truncate_for_log(input: &str, max_chars: usize) -> String {
    match input.char_indices().nth(max_chars) {
        None => input.to_string(),
        Some((cut, _)) => {
            let dropped = input[cut..].chars().count();
            format!("{}... <truncated {dropped} chars>", &input[..cut])
        }
    }
}

/// Returns whether anything was masked.
fn redact_json_value(value: &mut Value) -> bool {
    match value {
        Value::Object(map) => {
            let mut changed = false;
            for (name, item) in map.iter_mut() {
                if is_secret_name(name) {
                    *item = Value::String(REDACTION.to_string());
                    changed = true;
                } else {
                    changed |= redact_json_value(item);
                }
            }
            changed
        }
        Value::Array(items) => items
            .iter_mut()
            .fold(false, |changed, item| redact_json_value(item) || changed),
        _ => false,
    }
}

fn is_secret_name(name: &str) -> bool {
    SECRET_NAMES
        .iter()
        .any(|secret| secret.eq_ignore_ascii_case(name))
}
