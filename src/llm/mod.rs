pub mod gemini;
pub mod provider;

pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_FALLBACK_MODELS: [&str; 2] = ["gemini-1.0-pro", "gemini-pro"];
