mod args;
mod commands;
mod repl;

pub use args::CliArgs;
pub use repl::{BANNER, PROMPT, ReplState, run_repl};
